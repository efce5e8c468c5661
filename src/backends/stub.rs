// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scripted in-memory engine for tests.
//!
//! Graphs are described up front with [`StubGraph`] and looked up by entry
//! class. A [`StubProbe`] shared with the test records every engine call and
//! exposes the queues the engine was given, so a test can act as the graph:
//! push events onto an observable queue or read what arrived on a command
//! queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::compiler::CompiledModule;
use crate::errors::{EngineError, EngineResult};
use crate::params::GraphArgs;
use crate::queue::{BlockingQueue, QueueHandle};
use crate::traits::{
    Capability, CapabilityKind, GraphEngine, GraphHandle, GraphInstance, PerfCounter,
};

const STUB_COMMAND_QUEUE_BYTES: usize = 1 << 20;

/// Behaviour of one scripted graph.
#[derive(Debug, Clone)]
pub struct StubGraph {
    pub capabilities: Vec<Capability>,
    pub is_graph: bool,
    /// How long the graph runs once started. `None` runs until stopped.
    pub run_for: Option<Duration>,
    /// Events pushed onto observable queues when the graph starts.
    pub on_start: Vec<(String, Vec<u8>)>,
    /// Once started, the graph faults after this long.
    pub fault_after: Option<Duration>,
    pub stop_fails: bool,
    /// `wait` blocks the engine thread for this long before returning.
    pub wait_stall: Option<Duration>,
}

impl Default for StubGraph {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            is_graph: true,
            run_for: None,
            on_start: Vec::new(),
            fault_after: None,
            stop_fails: false,
            wait_stall: None,
        }
    }
}

impl StubGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry that exists but is not a graph.
    pub fn not_a_graph() -> Self {
        Self {
            is_graph: false,
            ..Self::default()
        }
    }

    pub fn observable(mut self, name: &str) -> Self {
        self.capabilities
            .push(Capability::new(name, CapabilityKind::Observable));
        self
    }

    pub fn command(mut self, name: &str) -> Self {
        self.capabilities
            .push(Capability::new(name, CapabilityKind::Command));
        self
    }

    pub fn telemetry(mut self, name: &str) -> Self {
        self.capabilities
            .push(Capability::new(name, CapabilityKind::Telemetry));
        self
    }

    pub fn finishes_after(mut self, duration: Duration) -> Self {
        self.run_for = Some(duration);
        self
    }

    pub fn emits_on_start(mut self, endpoint: &str, payload: impl Into<Vec<u8>>) -> Self {
        self.on_start.push((endpoint.to_string(), payload.into()));
        self
    }

    pub fn faults_after(mut self, duration: Duration) -> Self {
        self.fault_after = Some(duration);
        self
    }

    /// `stop` reports an engine fault instead of stopping.
    pub fn fails_on_stop(mut self) -> Self {
        self.stop_fails = true;
        self
    }

    pub fn hangs_on_wait(mut self, duration: Duration) -> Self {
        self.wait_stall = Some(duration);
        self
    }
}

const STUB_FAULT: &str = "scripted graph fault";

#[derive(Default)]
struct ProbeState {
    calls: Vec<String>,
    observers: HashMap<String, QueueHandle>,
    commands: HashMap<String, QueueHandle>,
    last_args: Option<GraphArgs>,
    live: usize,
    pumps: usize,
}

/// Test-side view of a [`StubEngine`].
#[derive(Clone, Default)]
pub struct StubProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl StubProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Engine calls in order, e.g. `"start:graph#1"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Queue attached to the most recently wired observable endpoint `name`.
    pub fn observer(&self, name: &str) -> Option<QueueHandle> {
        self.lock().observers.get(name).cloned()
    }

    /// Command queue most recently created for endpoint `name`.
    pub fn command_queue(&self, name: &str) -> Option<QueueHandle> {
        self.lock().commands.get(name).cloned()
    }

    pub fn last_args(&self) -> Option<GraphArgs> {
        self.lock().last_args.clone()
    }

    /// Graphs instantiated and not yet released.
    pub fn live_graphs(&self) -> usize {
        self.lock().live
    }

    pub fn pump_count(&self) -> usize {
        self.lock().pumps
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

struct LiveGraph {
    spec: StubGraph,
    started_at: Option<Instant>,
    stopped: bool,
    observers: HashMap<String, QueueHandle>,
    commands: HashMap<String, QueueHandle>,
}

impl LiveGraph {
    fn has(&self, name: &str, kind: CapabilityKind) -> bool {
        self.spec
            .capabilities
            .iter()
            .any(|cap| cap.name == name && cap.kind == kind)
    }

    fn is_running(&self) -> EngineResult<bool> {
        let Some(started) = self.started_at else {
            return Ok(false);
        };
        if let Some(fault_after) = self.spec.fault_after {
            if started.elapsed() >= fault_after {
                return Err(EngineError::Fault(STUB_FAULT.to_string()));
            }
        }
        Ok(!self.stopped
            && self
                .spec
                .run_for
                .map_or(true, |run_for| started.elapsed() < run_for))
    }
}

pub struct StubEngine {
    graphs: HashMap<String, StubGraph>,
    live: HashMap<GraphHandle, LiveGraph>,
    next_handle: u64,
    probe: StubProbe,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            graphs: HashMap::new(),
            live: HashMap::new(),
            next_handle: 1,
            probe: StubProbe::default(),
        }
    }

    /// Makes `graph` available under the entry class `entry`.
    pub fn with_graph(mut self, entry: &str, graph: StubGraph) -> Self {
        self.graphs.insert(entry.to_string(), graph);
        self
    }

    pub fn probe(&self) -> StubProbe {
        self.probe.clone()
    }

    fn graph_mut(&mut self, handle: GraphHandle) -> EngineResult<&mut LiveGraph> {
        self.live
            .get_mut(&handle)
            .ok_or(EngineError::UnknownGraph(handle.0))
    }
}

impl GraphEngine for StubEngine {
    fn instantiate(
        &mut self,
        module: &CompiledModule,
        args: &GraphArgs,
    ) -> EngineResult<GraphInstance> {
        self.probe
            .record(format!("instantiate:{}", module.entry_class));
        let spec = self
            .graphs
            .get(&module.entry_class)
            .cloned()
            .ok_or_else(|| EngineError::MissingEntry {
                module: module.module_name.clone(),
                entry: module.entry_class.clone(),
            })?;
        if !spec.is_graph {
            return Err(EngineError::NotAGraph {
                entry: module.entry_class.clone(),
                reason: "entry is not a graph type".to_string(),
            });
        }

        let handle = GraphHandle(self.next_handle);
        self.next_handle += 1;

        let mut commands = HashMap::new();
        for cap in &spec.capabilities {
            if cap.kind == CapabilityKind::Command {
                commands.insert(
                    cap.name.clone(),
                    BlockingQueue::handle(STUB_COMMAND_QUEUE_BYTES),
                );
            }
        }

        {
            let mut state = self.probe.lock();
            state.last_args = Some(args.clone());
            state.live += 1;
            for (name, queue) in &commands {
                state.commands.insert(name.clone(), queue.clone());
            }
        }

        let capabilities = spec.capabilities.clone();
        self.live.insert(
            handle,
            LiveGraph {
                spec,
                started_at: None,
                stopped: false,
                observers: HashMap::new(),
                commands,
            },
        );
        Ok(GraphInstance {
            handle,
            capabilities,
        })
    }

    fn attach_observer(
        &mut self,
        handle: GraphHandle,
        name: &str,
        queue: QueueHandle,
    ) -> EngineResult<()> {
        let probe = self.probe.clone();
        let graph = self.graph_mut(handle)?;
        if !graph.has(name, CapabilityKind::Observable) {
            return Err(EngineError::UnknownEndpoint {
                name: name.to_string(),
                kind: CapabilityKind::Observable.as_str(),
            });
        }
        graph.observers.insert(name.to_string(), queue.clone());
        probe.lock().observers.insert(name.to_string(), queue);
        Ok(())
    }

    fn command_queue(&mut self, handle: GraphHandle, name: &str) -> EngineResult<QueueHandle> {
        let graph = self.graph_mut(handle)?;
        graph
            .commands
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEndpoint {
                name: name.to_string(),
                kind: CapabilityKind::Command.as_str(),
            })
    }

    fn start(&mut self, handle: GraphHandle) -> EngineResult<()> {
        self.probe.record(format!("start:{handle}"));
        let graph = self.graph_mut(handle)?;
        graph.started_at = Some(Instant::now());
        for (endpoint, payload) in &graph.spec.on_start {
            if let Some(queue) = graph.observers.get(endpoint) {
                let _ = queue.push(payload.clone());
            }
        }
        Ok(())
    }

    fn stop(&mut self, handle: GraphHandle) -> EngineResult<()> {
        self.probe.record(format!("stop:{handle}"));
        let graph = self.graph_mut(handle)?;
        if graph.spec.stop_fails {
            return Err(EngineError::Fault("stop refused".to_string()));
        }
        graph.stopped = true;
        Ok(())
    }

    fn wait(&mut self, handle: GraphHandle) -> EngineResult<()> {
        self.probe.record(format!("wait:{handle}"));
        let graph = self.graph_mut(handle)?;
        if let Some(stall) = graph.spec.wait_stall {
            std::thread::sleep(stall);
        }
        graph.stopped = true;
        Ok(())
    }

    fn is_running(&mut self, handle: GraphHandle) -> EngineResult<bool> {
        self.graph_mut(handle)?.is_running()
    }

    fn sample_counter(
        &mut self,
        handle: GraphHandle,
        endpoint: &str,
        counter: PerfCounter,
    ) -> EngineResult<f64> {
        let graph = self.graph_mut(handle)?;
        if !graph.has(endpoint, CapabilityKind::Telemetry) {
            return Err(EngineError::UnknownEndpoint {
                name: endpoint.to_string(),
                kind: CapabilityKind::Telemetry.as_str(),
            });
        }
        Ok(f64::from(counter.index() + 1))
    }

    fn release(&mut self, handle: GraphHandle) -> EngineResult<()> {
        self.probe.record(format!("release:{handle}"));
        let graph = self
            .live
            .remove(&handle)
            .ok_or(EngineError::UnknownGraph(handle.0))?;
        for queue in graph.commands.values() {
            queue.close_and_wake();
        }
        self.probe.lock().live -= 1;
        Ok(())
    }

    fn pump(&mut self) {
        self.probe.lock().pumps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn module(entry: &str) -> CompiledModule {
        CompiledModule::from_module_file(Path::new(&format!("/graphs/{entry}.wasm")))
    }

    #[test]
    fn test_unknown_entry_and_non_graph_are_rejected() {
        let mut engine = StubEngine::new().with_graph("plain", StubGraph::not_a_graph());

        assert!(matches!(
            engine.instantiate(&module("missing"), &GraphArgs::new()),
            Err(EngineError::MissingEntry { .. })
        ));
        assert!(matches!(
            engine.instantiate(&module("plain"), &GraphArgs::new()),
            Err(EngineError::NotAGraph { .. })
        ));
        assert_eq!(engine.probe().live_graphs(), 0);
    }

    #[test]
    fn test_scripted_graph_lifecycle() {
        let mut engine = StubEngine::new().with_graph(
            "beacon",
            StubGraph::new()
                .observable("frames")
                .command("ctl")
                .emits_on_start("frames", b"first".to_vec()),
        );
        let probe = engine.probe();

        let instance = engine
            .instantiate(&module("beacon"), &GraphArgs::new())
            .unwrap();
        let frames = BlockingQueue::handle(1024);
        engine
            .attach_observer(instance.handle, "frames", frames.clone())
            .unwrap();
        assert!(engine
            .attach_observer(instance.handle, "ctl", frames.clone())
            .is_err());

        engine.start(instance.handle).unwrap();
        assert!(engine.is_running(instance.handle).unwrap());
        assert_eq!(frames.pop_nonblocking(), Some(b"first".to_vec()));

        let ctl = engine.command_queue(instance.handle, "ctl").unwrap();
        engine.stop(instance.handle).unwrap();
        assert!(!engine.is_running(instance.handle).unwrap());

        engine.release(instance.handle).unwrap();
        assert!(ctl.is_closed());
        assert_eq!(probe.live_graphs(), 0);
        assert_eq!(
            probe.calls(),
            vec![
                "instantiate:beacon".to_string(),
                "start:graph#1".to_string(),
                "stop:graph#1".to_string(),
                "release:graph#1".to_string(),
            ]
        );
    }

    #[test]
    fn test_scripted_failures() {
        let mut engine = StubEngine::new().with_graph(
            "broken",
            StubGraph::new()
                .faults_after(Duration::ZERO)
                .fails_on_stop(),
        );

        let instance = engine
            .instantiate(&module("broken"), &GraphArgs::new())
            .unwrap();
        assert!(!engine.is_running(instance.handle).unwrap());

        engine.start(instance.handle).unwrap();
        assert!(matches!(
            engine.is_running(instance.handle),
            Err(EngineError::Fault(_))
        ));
        assert!(engine.stop(instance.handle).is_err());
        engine.release(instance.handle).unwrap();
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! wasmtime-backed [`GraphEngine`].
//!
//! Each graph gets its own [`Store`] holding a [`GraphHost`]. Compiled modules
//! are cached by path and modification time so repeated runs of the same
//! flowgraph skip wasmtime's compilation. Graph code is fuel metered: every call into the guest is given
//! `fuel_per_tick` units, which bounds how long one `work` call can hold the
//! engine thread.
//!
//! A graph module exports `memory`, its entry function (named after the entry
//! class), `start`, `work` and `stop`, and optionally `counter`. `work`
//! returns `0` once the graph has finished.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use wasmtime::{Config, Engine, ExternType, Instance, Linker, Module, Store, TypedFunc};

use super::error::{WasmError, WasmResult};
use super::host::{link_host, GraphHost};
use super::loader::load_module_bytes;
use crate::compiler::CompiledModule;
use crate::config::consts::{DEFAULT_COMMAND_QUEUE_BYTES, DEFAULT_FUEL_PER_TICK};
use crate::errors::{EngineError, EngineResult};
use crate::observability::messages::engine::{GraphCompleted, GraphFaulted, GraphInstantiated};
use crate::observability::messages::StructuredLog;
use crate::params::GraphArgs;
use crate::queue::QueueHandle;
use crate::traits::{CapabilityKind, GraphEngine, GraphHandle, GraphInstance, PerfCounter};

const REQUIRED_EXPORTS: [&str; 4] = ["memory", "start", "work", "stop"];

#[derive(Debug, Clone, Copy)]
pub struct WasmEngineSettings {
    pub fuel_per_tick: u64,
    pub command_queue_bytes: usize,
}

impl Default for WasmEngineSettings {
    fn default() -> Self {
        Self {
            fuel_per_tick: DEFAULT_FUEL_PER_TICK,
            command_queue_bytes: DEFAULT_COMMAND_QUEUE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Created,
    Running,
    Finished,
    Stopped,
    Faulted,
}

struct GraphExports {
    start: TypedFunc<(), ()>,
    work: TypedFunc<(), i32>,
    stop: TypedFunc<(), ()>,
    counter: Option<TypedFunc<(i32, i32), f64>>,
}

impl GraphExports {
    fn resolve(instance: &Instance, store: &mut Store<GraphHost>) -> wasmtime::Result<Self> {
        Ok(Self {
            start: instance.get_typed_func(&mut *store, "start")?,
            work: instance.get_typed_func(&mut *store, "work")?,
            stop: instance.get_typed_func(&mut *store, "stop")?,
            counter: instance.get_typed_func(&mut *store, "counter").ok(),
        })
    }
}

struct GraphSlot {
    store: Store<GraphHost>,
    exports: GraphExports,
    state: RunState,
    /// Set together with `RunState::Faulted`.
    fault: Option<EngineError>,
}

impl GraphSlot {
    fn refuel(&mut self, fuel: u64) -> EngineResult<()> {
        self.store.set_fuel(fuel)?;
        Ok(())
    }

    /// Runs one `work` call and updates the run state.
    fn step(&mut self, handle: GraphHandle, fuel: u64) -> EngineResult<()> {
        self.refuel(fuel)?;
        match self.exports.work.call(&mut self.store, ()) {
            Ok(0) => {
                self.state = RunState::Finished;
                GraphCompleted {
                    graph: handle,
                    entry: self.store.data().entry(),
                }
                .log();
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(error) => Err(self.fault(handle, error)),
        }
    }

    fn fault(&mut self, handle: GraphHandle, error: wasmtime::Error) -> EngineError {
        self.state = RunState::Faulted;
        let error = EngineError::from(error);
        GraphFaulted {
            graph: handle,
            entry: self.store.data().entry(),
            error: &error,
        }
        .log();
        self.fault = Some(error.clone());
        error
    }
}

/// Identifies one version of a module file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}

struct CachedModule {
    module: Module,
    stamp: Option<FileStamp>,
}

pub struct WasmGraphEngine {
    engine: Engine,
    linker: Linker<GraphHost>,
    modules: HashMap<PathBuf, CachedModule>,
    graphs: HashMap<GraphHandle, GraphSlot>,
    next_handle: u64,
    settings: WasmEngineSettings,
}

impl WasmGraphEngine {
    pub fn new(settings: WasmEngineSettings) -> WasmResult<Self> {
        let engine = create_engine()?;
        let mut linker = Linker::new(&engine);
        link_host(&mut linker)?;
        Ok(Self {
            engine,
            linker,
            modules: HashMap::new(),
            graphs: HashMap::new(),
            next_handle: 1,
            settings,
        })
    }

    /// Returns the module at `path`, compiling it on first use.
    ///
    /// A cached module is reused only while the file's modification time and
    /// length are unchanged; a rewritten file is compiled again and replaces
    /// the entry.
    fn module(&mut self, path: &Path) -> WasmResult<Module> {
        let stamp = FileStamp::read(path);
        if let Some(cached) = self.modules.get(path) {
            if stamp.is_some() && cached.stamp == stamp {
                return Ok(cached.module.clone());
            }
        }
        let bytes = load_module_bytes(path)?;
        let module =
            Module::new(&self.engine, bytes).map_err(|e| WasmError::Module(format!("{e:#}")))?;
        self.modules.insert(
            path.to_path_buf(),
            CachedModule {
                module: module.clone(),
                stamp,
            },
        );
        Ok(module)
    }

    fn slot(&mut self, handle: GraphHandle) -> EngineResult<&mut GraphSlot> {
        self.graphs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownGraph(handle.0))
    }

    fn endpoint(
        &mut self,
        handle: GraphHandle,
        name: &str,
        kind: CapabilityKind,
    ) -> EngineResult<(&mut GraphSlot, u32)> {
        let slot = self.slot(handle)?;
        let index = slot
            .store
            .data()
            .endpoint_index(name, kind)
            .ok_or_else(|| EngineError::UnknownEndpoint {
                name: name.to_string(),
                kind: kind.as_str(),
            })?;
        Ok((slot, index))
    }
}

fn create_engine() -> WasmResult<Engine> {
    let mut config = Config::new();
    config.wasm_threads(false);
    config.wasm_multi_memory(false);
    config.wasm_memory64(false);
    config.consume_fuel(true);
    config.epoch_interruption(false);

    Engine::new(&config).map_err(|e| WasmError::Engine(e.to_string()))
}

/// Checks the module shape before anything is instantiated.
fn verify_graph_module(module: &Module, compiled: &CompiledModule) -> EngineResult<()> {
    match module.get_export(&compiled.entry_class) {
        Some(ExternType::Func(_)) => {}
        Some(_) => {
            return Err(EngineError::NotAGraph {
                entry: compiled.entry_class.clone(),
                reason: "entry is not a function".to_string(),
            })
        }
        None => {
            return Err(EngineError::MissingEntry {
                module: compiled.module_name.clone(),
                entry: compiled.entry_class.clone(),
            })
        }
    }
    if let Some(missing) = REQUIRED_EXPORTS
        .iter()
        .find(|name| module.get_export(name).is_none())
    {
        return Err(EngineError::NotAGraph {
            entry: compiled.entry_class.clone(),
            reason: format!("missing export '{missing}'"),
        });
    }
    Ok(())
}

impl GraphEngine for WasmGraphEngine {
    fn instantiate(
        &mut self,
        compiled: &CompiledModule,
        args: &GraphArgs,
    ) -> EngineResult<GraphInstance> {
        let module = self.module(&compiled.path)?;
        verify_graph_module(&module, compiled)?;

        let host = GraphHost::new(
            compiled.entry_class.clone(),
            args.clone(),
            self.settings.command_queue_bytes,
        );
        let mut store = Store::new(&self.engine, host);
        store.set_fuel(self.settings.fuel_per_tick)?;

        let instance = self.linker.instantiate(&mut store, &module)?;
        let not_a_graph = |error: wasmtime::Error| EngineError::NotAGraph {
            entry: compiled.entry_class.clone(),
            reason: format!("{error:#}"),
        };
        let entry = instance
            .get_typed_func::<(), ()>(&mut store, &compiled.entry_class)
            .map_err(not_a_graph)?;
        let exports = GraphExports::resolve(&instance, &mut store).map_err(not_a_graph)?;

        store.data_mut().set_declaring(true);
        let declared = entry.call(&mut store, ());
        store.data_mut().set_declaring(false);
        declared?;

        let handle = GraphHandle(self.next_handle);
        self.next_handle += 1;
        let capabilities = store.data().capabilities().to_vec();

        GraphInstantiated {
            graph: handle,
            entry: &compiled.entry_class,
            capabilities: capabilities.len(),
        }
        .log();

        self.graphs.insert(
            handle,
            GraphSlot {
                store,
                exports,
                state: RunState::Created,
                fault: None,
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
        let (slot, index) = self.endpoint(handle, name, CapabilityKind::Observable)?;
        slot.store.data_mut().attach_observer(index, queue);
        Ok(())
    }

    fn command_queue(&mut self, handle: GraphHandle, name: &str) -> EngineResult<QueueHandle> {
        let (slot, index) = self.endpoint(handle, name, CapabilityKind::Command)?;
        slot.store
            .data()
            .command_queue(index)
            .ok_or_else(|| EngineError::UnknownEndpoint {
                name: name.to_string(),
                kind: CapabilityKind::Command.as_str(),
            })
    }

    fn start(&mut self, handle: GraphHandle) -> EngineResult<()> {
        let fuel = self.settings.fuel_per_tick;
        let slot = self.slot(handle)?;
        if slot.state != RunState::Created {
            return Ok(());
        }
        slot.refuel(fuel)?;
        match slot.exports.start.call(&mut slot.store, ()) {
            Ok(()) => {
                slot.state = RunState::Running;
                Ok(())
            }
            Err(error) => Err(slot.fault(handle, error)),
        }
    }

    fn stop(&mut self, handle: GraphHandle) -> EngineResult<()> {
        let fuel = self.settings.fuel_per_tick;
        let slot = self.slot(handle)?;
        match slot.state {
            RunState::Running => {
                slot.refuel(fuel)?;
                let stopped = slot.exports.stop.call(&mut slot.store, ());
                slot.state = RunState::Stopped;
                stopped.map_err(|error| slot.fault(handle, error))
            }
            RunState::Created => {
                slot.state = RunState::Stopped;
                Ok(())
            }
            RunState::Finished | RunState::Stopped | RunState::Faulted => Ok(()),
        }
    }

    fn wait(&mut self, handle: GraphHandle) -> EngineResult<()> {
        let fuel = self.settings.fuel_per_tick;
        let slot = self.slot(handle)?;
        while slot.state == RunState::Running {
            slot.step(handle, fuel)?;
        }
        Ok(())
    }

    fn is_running(&mut self, handle: GraphHandle) -> EngineResult<bool> {
        let slot = self.slot(handle)?;
        match (slot.state, &slot.fault) {
            (RunState::Faulted, Some(fault)) => Err(fault.clone()),
            (RunState::Faulted, None) => Err(EngineError::Fault("graph faulted".to_string())),
            (state, _) => Ok(state == RunState::Running),
        }
    }

    fn sample_counter(
        &mut self,
        handle: GraphHandle,
        endpoint: &str,
        counter: PerfCounter,
    ) -> EngineResult<f64> {
        let fuel = self.settings.fuel_per_tick;
        let (slot, index) = self.endpoint(handle, endpoint, CapabilityKind::Telemetry)?;
        let Some(sample) = slot.exports.counter.clone() else {
            return Ok(0.0);
        };
        slot.refuel(fuel)?;
        let value = sample.call(&mut slot.store, (index as i32, counter.index()))?;
        Ok(value)
    }

    fn release(&mut self, handle: GraphHandle) -> EngineResult<()> {
        let slot = self
            .graphs
            .remove(&handle)
            .ok_or(EngineError::UnknownGraph(handle.0))?;
        slot.store.data().close_commands();
        Ok(())
    }

    fn pump(&mut self) {
        let fuel = self.settings.fuel_per_tick;
        for (handle, slot) in self.graphs.iter_mut() {
            if slot.state == RunState::Running {
                // The slot records the fault; is_running reports it.
                let _ = slot.step(*handle, fuel);
            }
        }
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The seam between the session manager and the embedded graph engine.
//!
//! An engine is single threaded: it is created on the broker's engine thread
//! and every method below is only ever called from there, one call at a time.
//! For that reason the trait carries no `Send`/`Sync` bound and its methods
//! take `&mut self`.
//!
//! What a graph can do is reported up front by [`GraphEngine::instantiate`] as
//! a list of [`Capability`] entries, so sessions never probe graph internals
//! to discover endpoints.

use std::fmt::{Display, Formatter};

use crate::compiler::CompiledModule;
use crate::errors::EngineResult;
use crate::params::GraphArgs;
use crate::queue::QueueHandle;

/// Opaque reference to an instantiated graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle(pub u64);

impl Display for GraphHandle {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Produces serialized events for the caller.
    Observable,
    /// Accepts serialized commands from the caller.
    Command,
    /// Exposes performance counters.
    Telemetry,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Observable => "observable",
            CapabilityKind::Command => "command",
            CapabilityKind::Telemetry => "telemetry",
        }
    }
}

/// One named endpoint and what it can do. An endpoint with several
/// capabilities appears once per capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub kind: CapabilityKind,
}

impl Capability {
    pub fn new(name: impl Into<String>, kind: CapabilityKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Result of a successful instantiation.
#[derive(Debug, Clone)]
pub struct GraphInstance {
    pub handle: GraphHandle,
    pub capabilities: Vec<Capability>,
}

impl GraphInstance {
    /// Endpoint names with the given capability, in declaration order.
    pub fn endpoints(&self, kind: CapabilityKind) -> impl Iterator<Item = &str> {
        self.capabilities
            .iter()
            .filter(move |cap| cap.kind == kind)
            .map(|cap| cap.name.as_str())
    }
}

/// Fixed set of per-endpoint performance counters sampled by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerfCounter {
    WorkTimeTotal,
    WorkTimeAvg,
    WorkTime,
    WorkTimeVar,
    ThroughputAvg,
    NProduced,
    NProducedAvg,
    NProducedVar,
}

impl PerfCounter {
    pub const ALL: [PerfCounter; 8] = [
        PerfCounter::WorkTimeTotal,
        PerfCounter::WorkTimeAvg,
        PerfCounter::WorkTime,
        PerfCounter::WorkTimeVar,
        PerfCounter::ThroughputAvg,
        PerfCounter::NProduced,
        PerfCounter::NProducedAvg,
        PerfCounter::NProducedVar,
    ];

    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PerfCounter::WorkTimeTotal => "pc_work_time_total",
            PerfCounter::WorkTimeAvg => "pc_work_time_avg",
            PerfCounter::WorkTime => "pc_work_time",
            PerfCounter::WorkTimeVar => "pc_work_time_var",
            PerfCounter::ThroughputAvg => "pc_throughput_avg",
            PerfCounter::NProduced => "pc_nproduced",
            PerfCounter::NProducedAvg => "pc_nproduced_avg",
            PerfCounter::NProducedVar => "pc_nproduced_var",
        }
    }

    /// Index passed across the guest ABI.
    pub fn index(&self) -> i32 {
        match self {
            PerfCounter::WorkTimeTotal => 0,
            PerfCounter::WorkTimeAvg => 1,
            PerfCounter::WorkTime => 2,
            PerfCounter::WorkTimeVar => 3,
            PerfCounter::ThroughputAvg => 4,
            PerfCounter::NProduced => 5,
            PerfCounter::NProducedAvg => 6,
            PerfCounter::NProducedVar => 7,
        }
    }
}

pub trait GraphEngine {
    /// Loads the module, locates its entry, verifies it is a graph and runs
    /// the entry with `args`.
    fn instantiate(&mut self, module: &CompiledModule, args: &GraphArgs)
        -> EngineResult<GraphInstance>;

    /// Routes everything the observable endpoint `name` produces into `queue`.
    fn attach_observer(
        &mut self,
        handle: GraphHandle,
        name: &str,
        queue: QueueHandle,
    ) -> EngineResult<()>;

    /// Returns the queue the command endpoint `name` consumes from.
    fn command_queue(&mut self, handle: GraphHandle, name: &str) -> EngineResult<QueueHandle>;

    fn start(&mut self, handle: GraphHandle) -> EngineResult<()>;

    /// Requests the graph to stop. Does not wait for it.
    fn stop(&mut self, handle: GraphHandle) -> EngineResult<()>;

    /// Waits until the graph has fully stopped.
    fn wait(&mut self, handle: GraphHandle) -> EngineResult<()>;

    /// Whether the graph is still running. A graph that faulted reports the
    /// fault here instead of `false`.
    fn is_running(&mut self, handle: GraphHandle) -> EngineResult<bool>;

    fn sample_counter(
        &mut self,
        handle: GraphHandle,
        endpoint: &str,
        counter: PerfCounter,
    ) -> EngineResult<f64>;

    /// Drops every engine-side resource held for the graph.
    fn release(&mut self, handle: GraphHandle) -> EngineResult<()>;

    /// Lets the engine advance running graphs. Called by the broker while idle.
    fn pump(&mut self) {}
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One running flowgraph exposed as a bidirectional stream.
//!
//! A session moves through [`SessionPhase`]s:
//!
//! * **starting** ([`Session::start`]): resolve and compile the source, then in
//!   a single engine job marshal the parameters, instantiate the graph, wire
//!   its endpoints and start it. Finally register with the registry. A
//!   failure anywhere returns the error and leaves nothing behind.
//! * **running** ([`Session::run`]): a command loop feeds caller commands to
//!   the graph, one blocking output loop per observable endpoint pops events
//!   and hands them to the forwarder, an optional telemetry loop samples
//!   performance counters, and a completion watcher notices when the graph
//!   finishes on its own or faults.
//! * **draining**: entered when the caller half-closes or disconnects, the
//!   graph finishes or faults, an output is too large, the transport fails, or the
//!   registry asks the session to stop. Loops are cancelled, observable
//!   queues closed, the graph stopped and waited for, and everything already
//!   queued is still forwarded unless the session failed.
//! * **closed** / **errored**: the graph is released, queues are dropped and
//!   the session leaves the registry.
//!
//! Teardown runs exactly once. If a session is dropped without finishing,
//! its `Drop` impl queues the engine cleanup on the broker instead.

pub mod handle;
mod loops;
mod phase;
mod telemetry;
pub mod transport;

pub use handle::{SessionHandle, SessionId};
pub use phase::SessionPhase;
pub(crate) use phase::PhaseTracker;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::broker::RuntimeBroker;
use crate::compiler::{resolve_source, CompiledModule, GraphCompiler};
use crate::config::consts::{
    DEFAULT_COMPLETION_POLL_MS, DEFAULT_FLOWGRAPH_DIR, DEFAULT_MAX_MESSAGE_BYTES,
    DEFAULT_OBSERVABLE_QUEUE_BYTES, DEFAULT_TELEMETRY_INTERVAL_SECS, OUTPUT_CHANNEL_DEPTH,
};
use crate::errors::{EngineError, EngineResult, SessionError, SessionResult};
use crate::monitoring::Metrics;
use crate::observability::messages::session::{
    DrainStepFailed, SessionAbandoned, SessionClosed, SessionDraining, SessionRunning,
    SessionStartFailed, SessionStarting,
};
use crate::observability::messages::StructuredLog;
use crate::params::{marshal_parameters, Parameter};
use crate::queue::{BlockingQueue, QueueHandle};
use crate::registry::SessionRegistry;
use crate::traits::{
    CapabilityKind, GraphEngine, GraphHandle, GraphInstance, InboundStream, OutboundSink,
    StartRequest,
};

use loops::{command_loop, completion_watcher, spawn_output_loop, CommandExit, OutputEvent};
use telemetry::{telemetry_loop, TelemetryTarget};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory start requests are resolved against.
    pub graph_dir: PathBuf,
    /// Byte ceiling of each observable endpoint's queue.
    pub observable_queue_bytes: usize,
    /// Largest single event forwarded to the caller.
    pub max_message_bytes: usize,
    pub completion_poll_interval: Duration,
    /// Zero disables the telemetry loop.
    pub telemetry_interval: Duration,
    /// Bound on each stop/wait/release call while draining. `None` waits
    /// as long as the engine takes.
    pub drain_timeout: Option<Duration>,
    /// Command endpoints whose commands are not logged one by one.
    pub silenced_command_blocks: HashSet<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from(DEFAULT_FLOWGRAPH_DIR),
            observable_queue_bytes: DEFAULT_OBSERVABLE_QUEUE_BYTES,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            completion_poll_interval: Duration::from_millis(DEFAULT_COMPLETION_POLL_MS),
            telemetry_interval: Duration::from_secs(DEFAULT_TELEMETRY_INTERVAL_SECS),
            drain_timeout: None,
            silenced_command_blocks: HashSet::new(),
        }
    }
}

/// Process-wide collaborators shared by every session.
pub struct SessionContext {
    pub broker: RuntimeBroker,
    pub compiler: Arc<GraphCompiler>,
    pub registry: SessionRegistry,
    pub metrics: Option<Arc<Metrics>>,
    pub settings: SessionSettings,
}

/// Why the running phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    ClientClosed,
    GraphFinished,
    GraphFaulted,
    Shutdown,
    Oversize,
    TransportFailed,
}

impl EndReason {
    fn as_str(&self) -> &'static str {
        match self {
            EndReason::ClientClosed => "client closed its stream",
            EndReason::GraphFinished => "graph finished",
            EndReason::GraphFaulted => "graph faulted",
            EndReason::Shutdown => "shutdown requested",
            EndReason::Oversize => "oversize output",
            EndReason::TransportFailed => "transport failed",
        }
    }
}

/// Endpoint wiring produced by the launch job.
struct LaunchedGraph {
    handle: GraphHandle,
    observables: Vec<(String, QueueHandle)>,
    commands: HashMap<String, QueueHandle>,
    telemetry: Vec<String>,
}

pub struct Session {
    id: SessionId,
    ctx: Arc<SessionContext>,
    flowgraph: String,
    graph: GraphHandle,
    observables: Vec<(String, QueueHandle)>,
    commands: HashMap<String, QueueHandle>,
    telemetry: Vec<String>,
    phase: PhaseTracker,
    shutdown: CancellationToken,
    loops: CancellationToken,
    torn_down: bool,
}

impl Session {
    /// Launches the requested graph and registers the session.
    pub async fn start(ctx: Arc<SessionContext>, request: StartRequest) -> SessionResult<Session> {
        let id = SessionId::new();
        SessionStarting {
            session_id: id,
            filename: &request.filename,
            parameters: request.parameters.len(),
        }
        .log();

        let result = Self::launch(id, ctx, request).await;
        if let Err(err) = &result {
            SessionStartFailed {
                session_id: id,
                error: err,
            }
            .log();
        }
        result
    }

    async fn launch(
        id: SessionId,
        ctx: Arc<SessionContext>,
        request: StartRequest,
    ) -> SessionResult<Session> {
        let (path, kind) = resolve_source(&ctx.settings.graph_dir, &request.filename)?;
        let module = ctx.compiler.load(&path, kind).await?;

        let parameters = request.parameters;
        let queue_bytes = ctx.settings.observable_queue_bytes;
        let launched = ctx
            .broker
            .with_engine(move |engine| launch_graph(engine, &module, &parameters, queue_bytes))
            .await?;

        let (phase, phase_rx) = PhaseTracker::new(id);
        let shutdown = CancellationToken::new();
        let handle = SessionHandle {
            id,
            shutdown: shutdown.clone(),
            phase: phase_rx,
        };
        let registry = ctx.registry.clone();

        let mut session = Session {
            id,
            ctx,
            flowgraph: request.filename,
            graph: launched.handle,
            observables: launched.observables,
            commands: launched.commands,
            telemetry: launched.telemetry,
            phase,
            shutdown,
            loops: CancellationToken::new(),
            torn_down: false,
        };

        if let Err(err) = registry.register(handle).await {
            session.abandon().await;
            return Err(err);
        }
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn graph(&self) -> GraphHandle {
        self.graph
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.current()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn observable_endpoints(&self) -> impl Iterator<Item = &str> {
        self.observables.iter().map(|(name, _)| name.as_str())
    }

    pub fn command_endpoints(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(|name| name.as_str())
    }

    /// Runs the session until it ends, then tears it down.
    ///
    /// Returns `Ok(())` when the caller half-closed, the graph finished or
    /// the registry shut the session down; otherwise the error that ended it.
    pub async fn run<I, O>(mut self, inbound: I, outbound: O) -> SessionResult<()>
    where
        I: InboundStream,
        O: OutboundSink,
    {
        let running = SessionRunning {
            session_id: self.id,
            flowgraph: &self.flowgraph,
            graph: self.graph,
            observables: self.observables.len(),
            commands: self.commands.len(),
            telemetry: self.telemetry.len(),
        };
        let span = running.span("session");
        running.log();

        self.drive(inbound, outbound).instrument(span).await
    }

    async fn drive<I, O>(&mut self, inbound: I, outbound: O) -> SessionResult<()>
    where
        I: InboundStream,
        O: OutboundSink,
    {
        self.phase.advance(SessionPhase::Running);
        let settings = &self.ctx.settings;

        let mut command_task = tokio::spawn(command_loop(
            self.id,
            inbound,
            self.commands.clone(),
            Arc::new(settings.silenced_command_blocks.clone()),
            self.loops.clone(),
        ));

        let (out_tx, mut out_rx) = mpsc::channel::<OutputEvent>(OUTPUT_CHANNEL_DEPTH);
        let output_threads: Vec<_> = self
            .observables
            .iter()
            .map(|(name, queue)| {
                spawn_output_loop(
                    name.clone(),
                    queue.clone(),
                    settings.max_message_bytes,
                    out_tx.clone(),
                )
            })
            .collect();
        drop(out_tx);

        let telemetry_task = self.spawn_telemetry();
        let mut completion_task = tokio::spawn(completion_watcher(
            self.id,
            self.ctx.broker.clone(),
            self.graph,
            settings.completion_poll_interval,
            self.loops.clone(),
        ));

        let max_message_bytes = settings.max_message_bytes;
        let mut failure: Option<SessionError> = None;
        let mut delivered: u64 = 0;
        let mut outputs_open = true;
        let mut command_done = false;
        let mut completion_done = false;

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break EndReason::Shutdown,
                exit = &mut command_task, if !command_done => {
                    command_done = true;
                    match exit {
                        Ok(CommandExit::EndOfInput) => break EndReason::ClientClosed,
                        Ok(CommandExit::Cancelled) => {}
                        Ok(CommandExit::Failed(err)) => {
                            failure = Some(err);
                            break EndReason::TransportFailed;
                        }
                        Err(join_err) => {
                            failure = Some(SessionError::Transport(join_err.to_string()));
                            break EndReason::TransportFailed;
                        }
                    }
                }
                exit = &mut completion_task, if !completion_done => {
                    completion_done = true;
                    match exit {
                        Ok(Ok(())) => break EndReason::GraphFinished,
                        Ok(Err(err)) => {
                            failure = Some(SessionError::EngineFault(err));
                            break EndReason::GraphFaulted;
                        }
                        Err(join_err) => {
                            failure = Some(SessionError::EngineFault(EngineError::Fault(
                                join_err.to_string(),
                            )));
                            break EndReason::GraphFaulted;
                        }
                    }
                }
                event = out_rx.recv(), if outputs_open => match event {
                    Some(OutputEvent::Item(message)) => {
                        if let Err(err) = outbound.send(message).await {
                            failure = Some(err);
                            break EndReason::TransportFailed;
                        }
                        delivered += 1;
                    }
                    Some(OutputEvent::Oversize { endpoint, size }) => {
                        failure = Some(SessionError::OversizeMessage {
                            endpoint,
                            size,
                            max: max_message_bytes,
                        });
                        break EndReason::Oversize;
                    }
                    None => outputs_open = false,
                },
            }
        };

        SessionDraining {
            session_id: self.id,
            reason: reason.as_str(),
        }
        .log();
        self.phase.advance(SessionPhase::Draining);
        self.loops.cancel();
        self.close_observables();

        let graph = self.graph;
        self.engine_step("stop", move |engine| engine.stop(graph)).await;
        self.engine_step("wait", move |engine| engine.wait(graph)).await;

        // Everything produced before the queues closed still goes out, unless
        // the stream is already broken.
        if failure.is_none() && outputs_open {
            while let Some(event) = out_rx.recv().await {
                match event {
                    OutputEvent::Item(message) => {
                        if let Err(err) = outbound.send(message).await {
                            failure = Some(err);
                            break;
                        }
                        delivered += 1;
                    }
                    OutputEvent::Oversize { endpoint, size } => {
                        failure = Some(SessionError::OversizeMessage {
                            endpoint,
                            size,
                            max: max_message_bytes,
                        });
                        break;
                    }
                }
            }
        }
        drop(out_rx);

        for thread in output_threads {
            let _ = thread.await;
        }
        if !command_done {
            let _ = command_task.await;
        }
        if !completion_done {
            let _ = completion_task.await;
        }
        if let Some(task) = telemetry_task {
            let _ = task.await;
        }

        self.finish(failure.as_ref(), delivered).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_telemetry(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.ctx.settings.telemetry_interval;
        let metrics = self.ctx.metrics.clone()?;
        if interval.is_zero() || self.telemetry.is_empty() {
            return None;
        }
        Some(tokio::spawn(telemetry_loop(
            TelemetryTarget {
                session_id: self.id,
                flowgraph: self.flowgraph.clone(),
                graph: self.graph,
                endpoints: self.telemetry.clone(),
            },
            self.ctx.broker.clone(),
            metrics,
            interval,
            self.loops.clone(),
        )))
    }

    fn close_observables(&self) {
        for (_, queue) in &self.observables {
            queue.close_and_wake();
        }
    }

    /// Runs one teardown call on the engine, bounded by the drain timeout.
    /// Failures are logged and teardown carries on.
    async fn engine_step<F>(&self, step: &'static str, f: F)
    where
        F: FnOnce(&mut dyn GraphEngine) -> EngineResult<()> + Send + 'static,
    {
        let call = self.ctx.broker.with_engine(f);
        let result = match self.ctx.settings.drain_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(EngineError::Timeout { operation: step })),
            None => call.await,
        };
        if let Err(err) = result {
            DrainStepFailed {
                session_id: self.id,
                step,
                error: &err,
            }
            .log();
        }
    }

    async fn finish(&mut self, failure: Option<&SessionError>, delivered: u64) {
        let graph = self.graph;
        self.engine_step("release", move |engine| engine.release(graph))
            .await;
        self.observables.clear();
        self.commands.clear();

        let terminal = match failure {
            Some(_) => SessionPhase::Errored,
            None => SessionPhase::Closed,
        };
        self.phase.advance(terminal);
        self.torn_down = true;
        self.ctx.registry.deregister(self.id).await;

        SessionClosed {
            session_id: self.id,
            phase: terminal,
            delivered,
            error: failure.map(|err| err as &dyn std::error::Error),
        }
        .log();
    }

    /// Tears down a session that never ran.
    async fn abandon(&mut self) {
        self.loops.cancel();
        self.close_observables();
        let graph = self.graph;
        self.engine_step("stop", move |engine| engine.stop(graph)).await;
        self.engine_step("wait", move |engine| engine.wait(graph)).await;
        self.engine_step("release", move |engine| engine.release(graph))
            .await;
        self.observables.clear();
        self.commands.clear();
        self.phase.advance(SessionPhase::Errored);
        self.torn_down = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        SessionAbandoned {
            session_id: self.id,
        }
        .log();

        self.loops.cancel();
        self.close_observables();
        let graph = self.graph;
        let _ = self.ctx.broker.dispatch(move |engine| {
            let _ = engine.stop(graph);
            let _ = engine.wait(graph);
            let _ = engine.release(graph);
        });
        self.phase.advance(SessionPhase::Errored);
        self.ctx.registry.forget(self.id);
    }
}

/// Engine job run at session start.
///
/// Anything that fails after instantiation releases the graph before
/// returning, so a failed start never leaks engine state.
fn launch_graph(
    engine: &mut dyn GraphEngine,
    module: &CompiledModule,
    parameters: &[Parameter],
    queue_bytes: usize,
) -> EngineResult<LaunchedGraph> {
    let args = marshal_parameters(parameters)?;
    let instance = engine.instantiate(module, &args)?;

    let wired = wire_endpoints(engine, &instance, queue_bytes);
    if wired.is_err() {
        let _ = engine.release(instance.handle);
    }
    wired
}

fn wire_endpoints(
    engine: &mut dyn GraphEngine,
    instance: &GraphInstance,
    queue_bytes: usize,
) -> EngineResult<LaunchedGraph> {
    let handle = instance.handle;

    let mut observables = Vec::new();
    for name in instance.endpoints(CapabilityKind::Observable) {
        let queue = BlockingQueue::handle(queue_bytes);
        engine.attach_observer(handle, name, queue.clone())?;
        observables.push((name.to_string(), queue));
    }

    let mut commands = HashMap::new();
    for name in instance.endpoints(CapabilityKind::Command) {
        commands.insert(name.to_string(), engine.command_queue(handle, name)?);
    }

    let telemetry = instance
        .endpoints(CapabilityKind::Telemetry)
        .map(str::to_string)
        .collect();

    engine.start(handle)?;
    Ok(LaunchedGraph {
        handle,
        observables,
        commands,
        telemetry,
    })
}

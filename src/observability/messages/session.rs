// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for flowgraph sessions.
//!
//! This module contains message types for logging events related to:
//! * Session startup and the phase state machine
//! * Command routing from the caller into the graph
//! * Output forwarding and the oversize limit
//! * Drain, release and teardown
//!
//! Everything carries the session id. `SessionRunning` also opens the span
//! that the rest of a session's work runs inside.

use crate::observability::messages::StructuredLog;
use crate::session::{SessionId, SessionPhase};
use crate::traits::GraphHandle;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A `Start` message was accepted and the session is being launched.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use flowstream::observability::messages::session::SessionStarting;
/// use flowstream::session::SessionId;
///
/// let msg = SessionStarting {
///     session_id: SessionId::new(),
///     filename: "doppler.flow",
///     parameters: 2,
/// };
///
/// assert!(msg.to_string().contains("doppler.flow"));
/// ```
pub struct SessionStarting<'a> {
    pub session_id: SessionId,
    pub filename: &'a str,
    pub parameters: usize,
}

impl Display for SessionStarting<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} starting flowgraph '{}' with {} parameters",
            self.session_id, self.filename, self.parameters
        )
    }
}

impl StructuredLog for SessionStarting<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = %self.session_id,
            filename = self.filename,
            parameters = self.parameters,
            "{}", self
        );
    }
}

/// Startup failed before the graph was running. The caller gets the error as
/// the stream status.
///
/// # Log Level
/// `warn!` - Request failed
pub struct SessionStartFailed<'a> {
    pub session_id: SessionId,
    pub error: &'a dyn std::error::Error,
}

impl Display for SessionStartFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} failed to start: {}",
            self.session_id, self.error
        )
    }
}

impl StructuredLog for SessionStartFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = %self.session_id,
            error = %self.error,
            "{}", self
        );
    }
}

/// The graph is started, wired and registered.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionRunning<'a> {
    pub session_id: SessionId,
    pub flowgraph: &'a str,
    pub graph: GraphHandle,
    pub observables: usize,
    pub commands: usize,
    pub telemetry: usize,
}

impl Display for SessionRunning<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} running '{}' as {} ({} observable, {} command, {} telemetry endpoints)",
            self.session_id,
            self.flowgraph,
            self.graph,
            self.observables,
            self.commands,
            self.telemetry
        )
    }
}

impl StructuredLog for SessionRunning<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = %self.session_id,
            flowgraph = self.flowgraph,
            graph = %self.graph,
            observables = self.observables,
            commands = self.commands,
            telemetry = self.telemetry,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "session",
            span_name = name,
            session_id = %self.session_id,
            flowgraph = self.flowgraph,
            graph = %self.graph,
        )
    }
}

pub struct PhaseChanged {
    pub session_id: SessionId,
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl Display for PhaseChanged {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} moved from {} to {}",
            self.session_id, self.from, self.to
        )
    }
}

impl StructuredLog for PhaseChanged {
    fn log(&self) {
        tracing::debug!(
            session_id = %self.session_id,
            from = %self.from,
            to = %self.to,
            "{}", self
        );
    }
}

/// An illegal phase transition was attempted and ignored.
///
/// # Log Level
/// `debug!` - Expected during concurrent teardown
pub struct PhaseTransitionRefused {
    pub session_id: SessionId,
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl Display for PhaseTransitionRefused {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} ignored transition from {} to {}",
            self.session_id, self.from, self.to
        )
    }
}

impl StructuredLog for PhaseTransitionRefused {
    fn log(&self) {
        tracing::debug!(
            session_id = %self.session_id,
            from = %self.from,
            to = %self.to,
            "{}", self
        );
    }
}

pub struct RepeatedStartIgnored {
    pub session_id: SessionId,
}

impl Display for RepeatedStartIgnored {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} ignored a second start message",
            self.session_id
        )
    }
}

impl StructuredLog for RepeatedStartIgnored {
    fn log(&self) {
        tracing::warn!(session_id = %self.session_id, "{}", self);
    }
}

/// A command was addressed to an endpoint the graph does not accept
/// commands on. The command is dropped and the session continues.
///
/// # Log Level
/// `warn!` - Client error
pub struct UnknownCommandEndpoint<'a> {
    pub session_id: SessionId,
    pub error: &'a dyn std::error::Error,
}

impl Display for UnknownCommandEndpoint<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} dropped command: {}",
            self.session_id, self.error
        )
    }
}

impl StructuredLog for UnknownCommandEndpoint<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = %self.session_id,
            error = %self.error,
            "{}", self
        );
    }
}

/// Logged per command unless the endpoint is silenced in configuration.
///
/// # Log Level
/// `info!` - Operational event
pub struct CommandReceived<'a> {
    pub session_id: SessionId,
    pub endpoint: &'a str,
    pub size: usize,
}

impl Display for CommandReceived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} routing {}-byte command to '{}'",
            self.session_id, self.size, self.endpoint
        )
    }
}

impl StructuredLog for CommandReceived<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = %self.session_id,
            endpoint = self.endpoint,
            size = self.size,
            "{}", self
        );
    }
}

pub struct CommandRejected<'a> {
    pub session_id: SessionId,
    pub endpoint: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CommandRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} could not queue command for '{}': {}",
            self.session_id, self.endpoint, self.error
        )
    }
}

impl StructuredLog for CommandRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = %self.session_id,
            endpoint = self.endpoint,
            error = %self.error,
            "{}", self
        );
    }
}

/// An observable endpoint produced a message larger than the transport
/// allows. Logged from the output thread, which runs outside the session span.
///
/// # Log Level
/// `error!` - Session ends with an error
pub struct OversizeOutput<'a> {
    pub endpoint: &'a str,
    pub size: usize,
    pub max: usize,
}

impl Display for OversizeOutput<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Output from '{}' is {} bytes, exceeding the {}-byte message limit",
            self.endpoint, self.size, self.max
        )
    }
}

impl StructuredLog for OversizeOutput<'_> {
    fn log(&self) {
        tracing::error!(
            endpoint = self.endpoint,
            size = self.size,
            max = self.max,
            "{}", self
        );
    }
}

pub struct GraphFinished {
    pub session_id: SessionId,
    pub graph: GraphHandle,
}

impl Display for GraphFinished {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {}: {} is no longer running",
            self.session_id, self.graph
        )
    }
}

impl StructuredLog for GraphFinished {
    fn log(&self) {
        tracing::info!(
            session_id = %self.session_id,
            graph = %self.graph,
            "{}", self
        );
    }
}

pub struct CompletionPollFailed<'a> {
    pub session_id: SessionId,
    pub error: &'a dyn std::error::Error,
}

impl Display for CompletionPollFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} graph failed while running: {}",
            self.session_id, self.error
        )
    }
}

impl StructuredLog for CompletionPollFailed<'_> {
    fn log(&self) {
        tracing::error!(
            session_id = %self.session_id,
            error = %self.error,
            "{}", self
        );
    }
}

pub struct TelemetrySampleFailed<'a> {
    pub session_id: SessionId,
    pub error: &'a dyn std::error::Error,
}

impl Display for TelemetrySampleFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} failed to sample performance counters: {}",
            self.session_id, self.error
        )
    }
}

impl StructuredLog for TelemetrySampleFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = %self.session_id,
            error = %self.error,
            "{}", self
        );
    }
}

/// # Log Level
/// `info!` - Important operational event
pub struct SessionDraining<'a> {
    pub session_id: SessionId,
    pub reason: &'a str,
}

impl Display for SessionDraining<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Session {} draining: {}", self.session_id, self.reason)
    }
}

impl StructuredLog for SessionDraining<'_> {
    fn log(&self) {
        tracing::info!(
            session_id = %self.session_id,
            reason = self.reason,
            "{}", self
        );
    }
}

/// A stop, wait or release call failed during drain. Teardown continues.
///
/// # Log Level
/// `warn!` - Degraded teardown
pub struct DrainStepFailed<'a> {
    pub session_id: SessionId,
    pub step: &'static str,
    pub error: &'a dyn std::error::Error,
}

impl Display for DrainStepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} drain step '{}' failed: {}",
            self.session_id, self.step, self.error
        )
    }
}

impl StructuredLog for DrainStepFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            session_id = %self.session_id,
            step = self.step,
            error = %self.error,
            "{}", self
        );
    }
}

/// The session reached its terminal phase.
///
/// # Log Level
/// `info!` when closed cleanly, `warn!` when errored
pub struct SessionClosed<'a> {
    pub session_id: SessionId,
    pub phase: SessionPhase,
    pub delivered: u64,
    pub error: Option<&'a dyn std::error::Error>,
}

impl Display for SessionClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} {} after delivering {} messages",
            self.session_id, self.phase, self.delivered
        )?;
        if let Some(error) = self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

impl StructuredLog for SessionClosed<'_> {
    fn log(&self) {
        match self.error {
            Some(error) => tracing::warn!(
                session_id = %self.session_id,
                phase = %self.phase,
                delivered = self.delivered,
                error = %error,
                "{}", self
            ),
            None => tracing::info!(
                session_id = %self.session_id,
                phase = %self.phase,
                delivered = self.delivered,
                "{}", self
            ),
        }
    }
}

/// The session was dropped without finishing its drain. Engine cleanup was
/// handed to the broker.
///
/// # Log Level
/// `warn!` - Degraded teardown
pub struct SessionAbandoned {
    pub session_id: SessionId,
}

impl Display for SessionAbandoned {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} dropped before teardown; releasing its graph",
            self.session_id
        )
    }
}

impl StructuredLog for SessionAbandoned {
    fn log(&self) {
        tracing::warn!(session_id = %self.session_id, "{}", self);
    }
}

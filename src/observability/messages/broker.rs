// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the engine broker thread.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// The engine thread is up and accepting jobs.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BrokerStarted {
    pub tick_interval_ms: u64,
}

impl Display for BrokerStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Engine broker started (idle tick every {}ms)",
            self.tick_interval_ms
        )
    }
}

impl StructuredLog for BrokerStarted {
    fn log(&self) {
        tracing::info!(tick_interval_ms = self.tick_interval_ms, "{}", self);
    }
}

/// The engine thread has exited after its job channel closed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BrokerStopped {
    pub jobs_run: u64,
}

impl Display for BrokerStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Engine broker stopped after {} jobs", self.jobs_run)
    }
}

impl StructuredLog for BrokerStopped {
    fn log(&self) {
        tracing::info!(jobs_run = self.jobs_run, "{}", self);
    }
}

/// An engine job or idle pump panicked. The broker keeps running.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use flowstream::observability::messages::broker::JobPanicked;
///
/// let msg = JobPanicked { message: "index out of bounds" };
/// assert!(msg.to_string().contains("index out of bounds"));
/// ```
pub struct JobPanicked<'a> {
    pub message: &'a str,
}

impl Display for JobPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Engine job panicked: {}", self.message)
    }
}

impl StructuredLog for JobPanicked<'_> {
    fn log(&self) {
        tracing::error!(panic = self.message, "{}", self);
    }
}

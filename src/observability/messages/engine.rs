// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the embedded graph engine.
//!
//! These are emitted from the engine thread, so they carry the graph handle
//! and entry name rather than a session id; the session span supplies the rest
//! when the call originated from a session job.

use crate::observability::messages::StructuredLog;
use crate::traits::GraphHandle;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Module bytes were read from disk.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ModuleLoaded<'a> {
    pub module_path: &'a Path,
    pub size_bytes: usize,
}

impl Display for ModuleLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded graph module '{}' ({} bytes)",
            self.module_path.display(),
            self.size_bytes
        )
    }
}

impl StructuredLog for ModuleLoaded<'_> {
    fn log(&self) {
        tracing::debug!(
            module_path = %self.module_path.display(),
            size_bytes = self.size_bytes,
            "{}", self
        );
    }
}

/// Module bytes could not be read or were rejected.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ModuleLoadFailed<'a> {
    pub module_path: &'a Path,
    pub error: &'a dyn std::error::Error,
}

impl Display for ModuleLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to load graph module '{}': {}",
            self.module_path.display(),
            self.error
        )
    }
}

impl StructuredLog for ModuleLoadFailed<'_> {
    fn log(&self) {
        tracing::error!(
            module_path = %self.module_path.display(),
            error = %self.error,
            "{}", self
        );
    }
}

/// The entry ran and declared its endpoints.
///
/// # Log Level
/// `info!` - Important operational event
pub struct GraphInstantiated<'a> {
    pub graph: GraphHandle,
    pub entry: &'a str,
    pub capabilities: usize,
}

impl Display for GraphInstantiated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instantiated {} from entry '{}' with {} capabilities",
            self.graph, self.entry, self.capabilities
        )
    }
}

impl StructuredLog for GraphInstantiated<'_> {
    fn log(&self) {
        tracing::info!(
            graph = %self.graph,
            entry = self.entry,
            capabilities = self.capabilities,
            "{}", self
        );
    }
}

/// An observable endpoint produced an event its queue could not hold.
///
/// # Log Level
/// `error!` - Event dropped
pub struct EmitRejected<'a> {
    pub entry: &'a str,
    pub endpoint: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for EmitRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropped event from '{}.{}': {}",
            self.entry, self.endpoint, self.error
        )
    }
}

impl StructuredLog for EmitRejected<'_> {
    fn log(&self) {
        tracing::error!(
            entry = self.entry,
            endpoint = self.endpoint,
            error = %self.error,
            "{}", self
        );
    }
}

/// A call into graph code trapped. The graph stops running.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct GraphFaulted<'a> {
    pub graph: GraphHandle,
    pub entry: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for GraphFaulted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} ('{}') faulted: {}",
            self.graph, self.entry, self.error
        )
    }
}

impl StructuredLog for GraphFaulted<'_> {
    fn log(&self) {
        tracing::error!(
            graph = %self.graph,
            entry = self.entry,
            error = %self.error,
            "{}", self
        );
    }
}

pub struct GraphCompleted<'a> {
    pub graph: GraphHandle,
    pub entry: &'a str,
}

impl Display for GraphCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} ('{}') finished", self.graph, self.entry)
    }
}

impl StructuredLog for GraphCompleted<'_> {
    fn log(&self) {
        tracing::debug!(graph = %self.graph, entry = self.entry, "{}", self);
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for flowgraph compilation.
//!
//! This module contains message types for logging events related to:
//! * Invoking the external compiler tool
//! * Hits on the compile-once cache
//! * Compilation failures

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;
use tracing::Span;

/// A description is about to be compiled.
///
/// # Log Level
/// `info!` - Important operational event
pub struct CompileStarted<'a> {
    pub source: &'a Path,
    pub tool: &'a Path,
}

impl Display for CompileStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compiling flowgraph '{}' with '{}'",
            self.source.display(),
            self.tool.display()
        )
    }
}

impl StructuredLog for CompileStarted<'_> {
    fn log(&self) {
        tracing::info!(
            source = %self.source.display(),
            tool = %self.tool.display(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "compile",
            span_name = name,
            source = %self.source.display(),
            tool = %self.tool.display(),
        )
    }
}

/// The compiled module was served from the cache.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct CompileCacheHit<'a> {
    pub source: &'a Path,
    pub module_name: &'a str,
}

impl Display for CompileCacheHit<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Using cached module '{}' for '{}'",
            self.module_name,
            self.source.display()
        )
    }
}

impl StructuredLog for CompileCacheHit<'_> {
    fn log(&self) {
        tracing::debug!(
            source = %self.source.display(),
            module_name = self.module_name,
            "{}", self
        );
    }
}

/// Compilation produced a module.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use flowstream::observability::messages::compiler::CompileCompleted;
/// use std::path::Path;
/// use std::time::Duration;
///
/// let msg = CompileCompleted {
///     source: Path::new("flowgraphs/doppler.flow"),
///     module_name: "doppler_0f3c",
///     entry_class: "doppler",
///     elapsed: Duration::from_millis(420),
/// };
///
/// assert!(msg.to_string().contains("420ms"));
/// ```
pub struct CompileCompleted<'a> {
    pub source: &'a Path,
    pub module_name: &'a str,
    pub entry_class: &'a str,
    pub elapsed: Duration,
}

impl Display for CompileCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compiled '{}' into module '{}' (entry '{}') in {}ms",
            self.source.display(),
            self.module_name,
            self.entry_class,
            self.elapsed.as_millis()
        )
    }
}

impl StructuredLog for CompileCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            source = %self.source.display(),
            module_name = self.module_name,
            entry_class = self.entry_class,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "{}", self
        );
    }
}

/// Compilation failed. Nothing is cached, so the next request retries.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct CompileFailed<'a> {
    pub source: &'a Path,
    pub error: &'a dyn std::error::Error,
}

impl Display for CompileFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compilation of '{}' failed: {}",
            self.source.display(),
            self.error
        )
    }
}

impl StructuredLog for CompileFailed<'_> {
    fn log(&self) {
        tracing::error!(
            source = %self.source.display(),
            error = %self.error,
            "{}", self
        );
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message borrows what it reports, so building one costs nothing beyond
//! the log call itself. `Display` gives the line, [`StructuredLog::log`] emits
//! it at the message's level with its fields attached.
//!
//! # Organization
//!
//! * `broker` - engine thread lifecycle
//! * `compiler` - compilation and the compile-once cache
//! * `engine` - module loading and graph execution inside the engine
//! * `registry` - session registry actor
//! * `server` - gRPC server, signals and the metrics exporter
//! * `session` - session phases, routing and drain

use std::fmt::Display;

use tracing::Span;

pub mod broker;
pub mod compiler;
pub mod engine;
pub mod registry;
pub mod server;
pub mod session;

/// A log message that knows its own level and fields.
pub trait StructuredLog: Display {
    /// Emits the message as a tracing event.
    fn log(&self);

    /// Opens a span carrying the message's fields.
    fn span(&self, name: &str) -> Span {
        tracing::info_span!("flowstream", span_name = name, summary = %self)
    }
}

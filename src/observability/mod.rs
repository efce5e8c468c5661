// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic and operational log line in flowstream is produced from a
//! message struct in [`messages`]. A message type implements `Display` for the
//! human-readable line and [`messages::StructuredLog`] to emit it through
//! `tracing` with its fields attached, so log text never lives at the call site.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::broker` - engine thread lifecycle and job failures
//! * `messages::compiler` - flowgraph compilation and the module cache
//! * `messages::engine` - embedded graph engine events
//! * `messages::registry` - session registration and shutdown sweeps
//! * `messages::server` - process lifecycle and the metrics exporter
//! * `messages::session` - per-session lifecycle, routing and telemetry
//!
//! # Usage
//!
//! ```rust
//! use flowstream::observability::messages::registry::RegistryClosing;
//! use flowstream::observability::messages::StructuredLog;
//!
//! RegistryClosing { live: 3 }.log();
//! ```

pub mod messages;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the server process and the metrics exporter.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

/// The gRPC server is bound and serving.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServerListening {
    pub address: SocketAddr,
}

impl Display for ServerListening {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Flowgraph server listening on {}", self.address)
    }
}

impl StructuredLog for ServerListening {
    fn log(&self) {
        tracing::info!(address = %self.address, "{}", self);
    }
}

pub struct ExporterListening {
    pub address: SocketAddr,
}

impl Display for ExporterListening {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Metrics exporter listening on {}/metrics", self.address)
    }
}

impl StructuredLog for ExporterListening {
    fn log(&self) {
        tracing::info!(address = %self.address, "{}", self);
    }
}

/// A termination signal arrived and shutdown has begun.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ShutdownRequested<'a> {
    pub signal: &'a str,
}

impl Display for ShutdownRequested<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Received {}, shutting down", self.signal)
    }
}

impl StructuredLog for ShutdownRequested<'_> {
    fn log(&self) {
        tracing::info!(signal = self.signal, "{}", self);
    }
}

pub struct SessionsClosed {
    pub count: usize,
}

impl Display for SessionsClosed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Closed {} sessions before exit", self.count)
    }
}

impl StructuredLog for SessionsClosed {
    fn log(&self) {
        tracing::info!(count = self.count, "{}", self);
    }
}

pub struct ServerStopped;

impl Display for ServerStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Flowgraph server stopped")
    }
}

impl StructuredLog for ServerStopped {
    fn log(&self) {
        tracing::info!("{}", self);
    }
}

/// A `RunFlowgraph` stream was refused before a session existed.
///
/// # Log Level
/// `warn!` - Client error
pub struct StreamRejected<'a> {
    pub reason: &'a str,
}

impl Display for StreamRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Rejected flowgraph stream: {}", self.reason)
    }
}

impl StructuredLog for StreamRejected<'_> {
    fn log(&self) {
        tracing::warn!(reason = self.reason, "{}", self);
    }
}

/// The `/metrics` handler could not encode the registry.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct MetricsEncodeFailed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for MetricsEncodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Failed to encode metrics: {}", self.error)
    }
}

impl StructuredLog for MetricsEncodeFailed<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }
}

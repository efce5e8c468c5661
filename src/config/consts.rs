// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Address the gRPC server binds when none is configured
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:50051";
/// Address the Prometheus exporter binds when none is configured
pub const DEFAULT_EXPORTER_ADDRESS: &str = "0.0.0.0:9999";
/// Directory start requests are resolved against
pub const DEFAULT_FLOWGRAPH_DIR: &str = "./flowgraphs";

/// External tool that turns a flowgraph description into a loadable module
pub const DEFAULT_COMPILER_TOOL: &str = "graphc";
/// Extension of flowgraph descriptions (compiled before use)
pub const DESCRIPTION_EXTENSION: &str = "flow";
/// Extension of compiled graph modules (used as-is)
pub const MODULE_EXTENSION: &str = "wasm";

/// How long the engine thread waits for a job before pumping running graphs
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;
/// Fuel given to each call into graph code (10 million instructions)
pub const DEFAULT_FUEL_PER_TICK: u64 = 10_000_000;
/// Minimum allowed fuel per call
pub const MIN_FUEL_PER_TICK: u64 = 10_000;
/// Maximum allowed fuel per call. Bounds how long one graph can hold the engine.
pub const MAX_FUEL_PER_TICK: u64 = 500_000_000;
/// Byte capacity of each command endpoint queue (1 MiB)
pub const DEFAULT_COMMAND_QUEUE_BYTES: usize = 1024 * 1024;

/// Byte capacity of each observable endpoint queue (64 MiB)
pub const DEFAULT_OBSERVABLE_QUEUE_BYTES: usize = 64 * 1024 * 1024;
/// Largest output message forwarded to a caller (10 MiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;
/// How often a session asks the engine whether its graph is still running
pub const DEFAULT_COMPLETION_POLL_MS: u64 = 100;
/// Performance counter sampling period; 0 disables sampling
pub const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 15;
/// Output messages buffered between the output threads and the transport
pub const OUTPUT_CHANNEL_DEPTH: usize = 64;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::wasm::WasmEngineSettings;
use crate::broker::BrokerSettings;
use crate::compiler::CompilerSettings;
use crate::config::consts::{
    DEFAULT_BIND_ADDRESS, DEFAULT_COMMAND_QUEUE_BYTES, DEFAULT_COMPILER_TOOL,
    DEFAULT_COMPLETION_POLL_MS, DEFAULT_EXPORTER_ADDRESS, DEFAULT_FLOWGRAPH_DIR,
    DEFAULT_FUEL_PER_TICK, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_OBSERVABLE_QUEUE_BYTES,
    DEFAULT_TELEMETRY_INTERVAL_SECS, DEFAULT_TICK_INTERVAL_MS, MAX_FUEL_PER_TICK,
    MIN_FUEL_PER_TICK,
};
use crate::errors::ConfigError;
use crate::session::SessionSettings;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level server configuration.
///
/// Every field is optional; anything left out falls back to the built-in
/// default in [`crate::config::consts`]. Command-line flags are applied on top
/// of the loaded file by the binary.
///
/// # Example
/// ```yaml
/// bind_address: "0.0.0.0:50051"
/// flowgraph_dir: "./flowgraphs"
/// exporter_address: "0.0.0.0:9999"
/// telemetry_interval_secs: 15
/// silenced_command_blocks: [doppler_command_source]
/// compiler:
///   tool: graphc
/// engine:
///   tick_interval_ms: 10
///   fuel_per_tick: 10000000
/// session:
///   max_message_bytes: 10485760
///   drain_timeout_ms: 5000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub flowgraph_dir: Option<PathBuf>,
    pub exporter_address: Option<String>,
    /// Performance counter sampling period in seconds. `0` disables sampling.
    pub telemetry_interval_secs: Option<u64>,
    /// Command endpoints whose traffic is not logged per message.
    #[serde(default)]
    pub silenced_command_blocks: Vec<String>,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    pub tool: Option<PathBuf>,
    /// Where compiled modules are written. Defaults to a fresh temp dir.
    pub module_dir: Option<PathBuf>,
}

/// Settings for the engine thread and the embedded engine.
///
/// ```yaml
/// engine:
///   tick_interval_ms: 10        # idle wait before pumping running graphs
///   fuel_per_tick: 10000000     # instruction budget per call into a graph
///   command_queue_bytes: 1048576
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub tick_interval_ms: Option<u64>,
    pub fuel_per_tick: Option<u64>,
    pub command_queue_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub observable_queue_bytes: Option<usize>,
    pub max_message_bytes: Option<usize>,
    pub completion_poll_ms: Option<u64>,
    /// Bound on each stop/wait call during drain. Unbounded when unset.
    pub drain_timeout_ms: Option<u64>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> &str {
        self.bind_address.as_deref().unwrap_or(DEFAULT_BIND_ADDRESS)
    }

    pub fn exporter_address(&self) -> &str {
        self.exporter_address
            .as_deref()
            .unwrap_or(DEFAULT_EXPORTER_ADDRESS)
    }

    pub fn flowgraph_dir(&self) -> PathBuf {
        self.flowgraph_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FLOWGRAPH_DIR))
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(
            self.telemetry_interval_secs
                .unwrap_or(DEFAULT_TELEMETRY_INTERVAL_SECS),
        )
    }

    /// Parsed gRPC bind address.
    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        parse_address("bind_address", self.bind_address())
    }

    /// Parsed exporter bind address.
    pub fn exporter_socket(&self) -> Result<SocketAddr, ConfigError> {
        parse_address("exporter_address", self.exporter_address())
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            tick_interval: Duration::from_millis(
                self.engine
                    .tick_interval_ms
                    .unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
        }
    }

    pub fn engine_settings(&self) -> WasmEngineSettings {
        WasmEngineSettings {
            fuel_per_tick: self.engine.fuel_per_tick.unwrap_or(DEFAULT_FUEL_PER_TICK),
            command_queue_bytes: self
                .engine
                .command_queue_bytes
                .unwrap_or(DEFAULT_COMMAND_QUEUE_BYTES),
        }
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            tool: self
                .compiler
                .tool
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILER_TOOL)),
            module_dir: self.compiler.module_dir.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        let session = &self.session;
        SessionSettings {
            graph_dir: self.flowgraph_dir(),
            observable_queue_bytes: session
                .observable_queue_bytes
                .unwrap_or(DEFAULT_OBSERVABLE_QUEUE_BYTES),
            max_message_bytes: session
                .max_message_bytes
                .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
            completion_poll_interval: Duration::from_millis(
                session
                    .completion_poll_ms
                    .unwrap_or(DEFAULT_COMPLETION_POLL_MS),
            ),
            telemetry_interval: self.telemetry_interval(),
            drain_timeout: session.drain_timeout_ms.map(Duration::from_millis),
            silenced_command_blocks: self.silenced_command_blocks.iter().cloned().collect(),
        }
    }

    /// Checks the settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_socket()?;
        self.exporter_socket()?;

        if self.broker_settings().tick_interval.is_zero() {
            return Err(invalid("engine.tick_interval_ms", "must be greater than 0"));
        }

        let engine = self.engine_settings();
        if !(MIN_FUEL_PER_TICK..=MAX_FUEL_PER_TICK).contains(&engine.fuel_per_tick) {
            return Err(invalid(
                "engine.fuel_per_tick",
                format!("must be between {MIN_FUEL_PER_TICK} and {MAX_FUEL_PER_TICK}"),
            ));
        }
        if engine.command_queue_bytes == 0 {
            return Err(invalid("engine.command_queue_bytes", "must be greater than 0"));
        }

        let session = self.session_settings();
        if session.max_message_bytes == 0 {
            return Err(invalid("session.max_message_bytes", "must be greater than 0"));
        }
        if session.max_message_bytes > session.observable_queue_bytes {
            return Err(invalid(
                "session.max_message_bytes",
                format!(
                    "{} exceeds session.observable_queue_bytes ({})",
                    session.max_message_bytes, session.observable_queue_bytes
                ),
            ));
        }
        if session.completion_poll_interval.is_zero() {
            return Err(invalid("session.completion_poll_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(setting: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        setting,
        reason: reason.into(),
    }
}

fn parse_address(setting: &'static str, address: &str) -> Result<SocketAddr, ConfigError> {
    address
        .parse()
        .map_err(|e| invalid(setting, format!("'{address}' is not a socket address: {e}")))
}

/// Load a server config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load a server config from a YAML file and reject unusable settings
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use flowstream::config::{load_and_validate_config, ServerConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "flowstream=info";

/// flowstream - runs flowgraphs on behalf of remote callers over gRPC
#[derive(Parser, Debug)]
#[command(name = "flowstream")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the gRPC server binds
    #[arg(long)]
    bind_address: Option<String>,

    /// Directory flowgraph filenames are resolved against
    #[arg(long)]
    flowgraph_dir: Option<PathBuf>,

    /// Address of the Prometheus /metrics endpoint
    #[arg(long)]
    exporter_address: Option<String>,

    /// Performance counter sampling period in seconds (0 disables)
    #[arg(long)]
    perf_ctr_interval: Option<u64>,

    /// Command endpoints whose traffic is not logged (comma separated)
    #[arg(long, value_delimiter = ',')]
    silenced_command_blocks: Vec<String>,

    /// External tool used to compile flowgraph descriptions
    #[arg(long)]
    compiler: Option<PathBuf>,
}

impl Args {
    /// Flags override whatever the file set.
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind_address) = self.bind_address {
            config.bind_address = Some(bind_address);
        }
        if let Some(flowgraph_dir) = self.flowgraph_dir {
            config.flowgraph_dir = Some(flowgraph_dir);
        }
        if let Some(exporter_address) = self.exporter_address {
            config.exporter_address = Some(exporter_address);
        }
        if let Some(interval) = self.perf_ctr_interval {
            config.telemetry_interval_secs = Some(interval);
        }
        if !self.silenced_command_blocks.is_empty() {
            config.silenced_command_blocks = self.silenced_command_blocks;
        }
        if let Some(compiler) = self.compiler {
            config.compiler.tool = Some(compiler);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);

    flowstream::server::serve(config).await
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Prometheus metrics for running flowgraphs.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `flowstream_flowgraph_count` | Gauge | |
//! | `flowstream_performance_counter` | Gauge | `flowgraph`, `session`, `block`, `counter` |
//!
//! The flowgraph count is kept in step with the session registry. The
//! performance counters are sampled by each session's telemetry loop and
//! reset to zero when the session ends.

mod exporter;

pub use exporter::serve_exporter;

use prometheus::{Encoder, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::traits::PerfCounter;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),

    #[error("metrics exporter failed: {0}")]
    Exporter(#[from] std::io::Error),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Labels identifying one sampled counter.
#[derive(Debug, Clone, Copy)]
pub struct CounterLabels<'a> {
    pub flowgraph: &'a str,
    pub session: &'a str,
    pub block: &'a str,
    pub counter: PerfCounter,
}

pub struct Metrics {
    registry: Registry,
    flowgraph_count: IntGauge,
    performance_counter: GaugeVec,
}

impl Metrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let flowgraph_count = IntGauge::with_opts(Opts::new(
            "flowstream_flowgraph_count",
            "Number of flowgraphs currently running",
        ))?;
        registry.register(Box::new(flowgraph_count.clone()))?;

        let performance_counter = GaugeVec::new(
            Opts::new(
                "flowstream_performance_counter",
                "Performance counters sampled from running flowgraph blocks",
            ),
            &["flowgraph", "session", "block", "counter"],
        )?;
        registry.register(Box::new(performance_counter.clone()))?;

        Ok(Self {
            registry,
            flowgraph_count,
            performance_counter,
        })
    }

    pub fn set_flowgraph_count(&self, count: usize) {
        self.flowgraph_count.set(count as i64);
    }

    pub fn flowgraph_count(&self) -> i64 {
        self.flowgraph_count.get()
    }

    pub fn record_counter(&self, labels: CounterLabels<'_>, value: f64) {
        self.performance_counter
            .with_label_values(&[
                labels.flowgraph,
                labels.session,
                labels.block,
                labels.counter.as_str(),
            ])
            .set(value);
    }

    /// Current value of a counter gauge. Reading creates the series at zero.
    pub fn counter_value(&self, labels: CounterLabels<'_>) -> Option<f64> {
        self.performance_counter
            .get_metric_with_label_values(&[
                labels.flowgraph,
                labels.session,
                labels.block,
                labels.counter.as_str(),
            ])
            .ok()
            .map(|gauge| gauge.get())
    }

    /// Renders every metric in the Prometheus text format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counter: PerfCounter) -> CounterLabels<'static> {
        CounterLabels {
            flowgraph: "beacon.wasm",
            session: "s-1",
            block: "frames",
            counter,
        }
    }

    #[test]
    fn test_flowgraph_count_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_flowgraph_count(3);
        assert_eq!(metrics.flowgraph_count(), 3);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("flowstream_flowgraph_count 3"));
    }

    #[test]
    fn test_performance_counter_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.record_counter(labels(PerfCounter::NProduced), 42.0);
        assert_eq!(
            metrics.counter_value(labels(PerfCounter::NProduced)),
            Some(42.0)
        );

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("flowstream_performance_counter"));
        assert!(text.contains(r#"counter="pc_nproduced""#));
        assert!(text.contains(r#"block="frames""#));
    }
}

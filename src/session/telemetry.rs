// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::SessionId;
use crate::broker::RuntimeBroker;
use crate::monitoring::{CounterLabels, Metrics};
use crate::observability::messages::session::TelemetrySampleFailed;
use crate::observability::messages::StructuredLog;
use crate::traits::{GraphHandle, PerfCounter};

pub(super) struct TelemetryTarget {
    pub session_id: SessionId,
    pub flowgraph: String,
    pub graph: GraphHandle,
    pub endpoints: Vec<String>,
}

/// Samples every counter of every telemetry endpoint once per `period` and
/// publishes them. The gauges are reset to zero when the loop ends so a
/// finished session does not leave stale values behind.
pub(super) async fn telemetry_loop(
    target: TelemetryTarget,
    broker: RuntimeBroker,
    metrics: Arc<Metrics>,
    period: Duration,
    cancel: CancellationToken,
) {
    let session = target.session_id.to_string();
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let graph = target.graph;
        let endpoints = target.endpoints.clone();
        let sampled = broker
            .with_engine(move |engine| {
                let mut samples = Vec::with_capacity(endpoints.len() * PerfCounter::ALL.len());
                for endpoint in endpoints {
                    for counter in PerfCounter::ALL {
                        let value = engine.sample_counter(graph, &endpoint, counter)?;
                        samples.push((endpoint.clone(), counter, value));
                    }
                }
                Ok(samples)
            })
            .await;

        match sampled {
            Ok(samples) => {
                for (block, counter, value) in samples {
                    metrics.record_counter(
                        CounterLabels {
                            flowgraph: &target.flowgraph,
                            session: &session,
                            block: &block,
                            counter,
                        },
                        value,
                    );
                }
            }
            Err(err) => TelemetrySampleFailed {
                session_id: target.session_id,
                error: &err,
            }
            .log(),
        }
    }

    for block in &target.endpoints {
        for counter in PerfCounter::ALL {
            metrics.record_counter(
                CounterLabels {
                    flowgraph: &target.flowgraph,
                    session: &session,
                    block,
                    counter,
                },
                0.0,
            );
        }
    }
}

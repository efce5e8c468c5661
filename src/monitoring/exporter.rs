// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::{Metrics, MetricsResult};
use crate::observability::messages::server::{ExporterListening, MetricsEncodeFailed};
use crate::observability::messages::StructuredLog;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            MetricsEncodeFailed { error: &err }.log();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {err}"),
            )
                .into_response()
        }
    }
}

/// Serves `/metrics` on `listener` until `shutdown` is cancelled.
pub async fn serve_exporter(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> MetricsResult<()> {
    let address: SocketAddr = listener.local_addr()?;
    ExporterListening { address }.log();

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_exporter_serves_metrics_until_shutdown() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.set_flowgraph_count(2);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve_exporter(listener, metrics, shutdown.clone()));

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("flowstream_flowgraph_count 2"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}

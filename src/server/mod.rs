// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! gRPC front end and process wiring.
//!
//! [`FlowstreamService`] turns each `RunFlowgraph` stream into one
//! [`Session`]. [`serve`] builds every process-wide collaborator from a
//! [`ServerConfig`], serves until SIGINT or SIGTERM, and then tears down in
//! order: sessions, engine thread, metrics exporter.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use crate::backends::wasm::WasmGraphEngine;
use crate::broker::RuntimeBroker;
use crate::compiler::GraphCompiler;
use crate::config::consts::OUTPUT_CHANNEL_DEPTH;
use crate::config::ServerConfig;
use crate::monitoring::{serve_exporter, Metrics};
use crate::observability::messages::server::{
    ServerListening, ServerStopped, SessionsClosed, ShutdownRequested, StreamRejected,
};
use crate::observability::messages::StructuredLog;
use crate::proto::flowstream_v1::flowstream_server::{Flowstream, FlowstreamServer};
use crate::proto::{RunFlowgraphRequest, RunFlowgraphResponse};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionContext};
use crate::traits::{ClientMessage, GraphEngine, InboundStream};

#[cfg(test)]
mod integration_tests;

/// Room for the response envelope around a maximum-size payload.
const RESPONSE_OVERHEAD_BYTES: usize = 64 * 1024;

pub struct FlowstreamService {
    ctx: Arc<SessionContext>,
}

impl FlowstreamService {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }
}

fn reject(reason: &str) -> Status {
    StreamRejected { reason }.log();
    Status::invalid_argument(reason)
}

#[tonic::async_trait]
impl Flowstream for FlowstreamService {
    type RunFlowgraphStream = ReceiverStream<Result<RunFlowgraphResponse, Status>>;

    async fn run_flowgraph(
        &self,
        request: Request<Streaming<RunFlowgraphRequest>>,
    ) -> Result<Response<Self::RunFlowgraphStream>, Status> {
        let mut inbound = request.into_inner();
        let start = match inbound.next_message().await? {
            Some(ClientMessage::Start(start)) => start,
            Some(ClientMessage::Command(_)) => {
                return Err(reject("the first message must start a flowgraph"))
            }
            None => return Err(reject("stream ended before a flowgraph was started")),
        };

        let session = Session::start(self.ctx.clone(), start).await?;

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_DEPTH);
        let status = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = session.run(inbound, tx).await {
                let _ = status.send(Err(err.into())).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// The tonic router serving `ctx`, with message limits taken from its settings.
pub fn router(ctx: Arc<SessionContext>) -> Router {
    let max_message_bytes = ctx.settings.max_message_bytes;
    let service = FlowstreamServer::new(FlowstreamService::new(ctx))
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes + RESPONSE_OVERHEAD_BYTES);
    Server::builder().add_service(service)
}

/// Serves `ctx` on `listener` until `shutdown` resolves.
///
/// Once `shutdown` resolves every live session is closed, which ends their
/// streams; the call returns after the last connection is gone.
pub async fn serve_on<S>(
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    shutdown: S,
) -> Result<(), tonic::transport::Error>
where
    S: Future<Output = ()> + Send,
{
    let registry = ctx.registry.clone();
    router(ctx)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.await;
            let closed = registry.close_all().await;
            SessionsClosed {
                count: closed.len(),
            }
            .log();
        })
        .await
}

/// Runs the flowgraph server described by `config` until a termination signal.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = Arc::new(Metrics::new()?);
    let exporter_stop = CancellationToken::new();
    let exporter_listener = TcpListener::bind(config.exporter_socket()?).await?;
    let exporter = tokio::spawn(serve_exporter(
        exporter_listener,
        metrics.clone(),
        exporter_stop.clone(),
    ));

    let engine_settings = config.engine_settings();
    let broker = RuntimeBroker::spawn(
        move || Ok(Box::new(WasmGraphEngine::new(engine_settings)?) as Box<dyn GraphEngine>),
        config.broker_settings(),
    )?;
    let compiler = Arc::new(GraphCompiler::new(config.compiler_settings())?);
    let registry = SessionRegistry::spawn(Some(metrics.clone()));

    let ctx = Arc::new(SessionContext {
        broker: broker.clone(),
        compiler,
        registry,
        metrics: Some(metrics),
        settings: config.session_settings(),
    });

    let listener = TcpListener::bind(config.bind_socket()?).await?;
    ServerListening {
        address: listener.local_addr()?,
    }
    .log();

    let served = serve_on(listener, ctx, shutdown_signal()).await;

    tokio::task::spawn_blocking(move || broker.shutdown()).await?;
    exporter_stop.cancel();
    exporter.await??;
    ServerStopped.log();

    served?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let signal_name = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        },
        _ => {
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    };
    ShutdownRequested {
        signal: signal_name,
    }
    .log();
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    ShutdownRequested { signal: "ctrl-c" }.log();
}

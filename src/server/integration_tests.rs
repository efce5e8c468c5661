// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end tests: a real tonic server and client around the wasm engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Code;

use super::serve_on;
use crate::backends::wasm::{WasmEngineSettings, WasmGraphEngine};
use crate::broker::{BrokerSettings, RuntimeBroker};
use crate::compiler::{CompilerSettings, GraphCompiler};
use crate::monitoring::Metrics;
use crate::proto::flowstream_v1::flowstream_client::FlowstreamClient;
use crate::proto::flowstream_v1::run_flowgraph_request::Request;
use crate::proto::flowstream_v1::start_flowgraph_request::Parameter;
use crate::proto::flowstream_v1::value::Val;
use crate::proto::flowstream_v1::{SendCommandRequest, StartFlowgraphRequest, Value};
use crate::proto::{RunFlowgraphRequest, RunFlowgraphResponse};
use crate::registry::SessionRegistry;
use crate::session::{SessionContext, SessionSettings};
use crate::traits::GraphEngine;

const BEACON: &str = r#"
    (module
      (import "graph" "declare" (func $declare (param i32 i32 i32) (result i32)))
      (import "graph" "emit" (func $emit (param i32 i32 i32) (result i32)))
      (import "graph" "param_i64" (func $param_i64 (param i32 i32 i64) (result i64)))
      (memory (export "memory") 1)
      (data (i32.const 0) "out")
      (data (i32.const 16) "count")
      (data (i32.const 32) "beep")
      (global $out (mut i32) (i32.const -1))
      (global $left (mut i64) (i64.const 0))
      (func (export "beacon")
        (global.set $out (call $declare (i32.const 0) (i32.const 0) (i32.const 3)))
        (global.set $left (call $param_i64 (i32.const 16) (i32.const 5) (i64.const 1))))
      (func (export "start"))
      (func (export "stop") (global.set $left (i64.const 0)))
      (func (export "work") (result i32)
        (if (i64.eqz (global.get $left)) (then (return (i32.const 0))))
        (drop (call $emit (global.get $out) (i32.const 32) (i32.const 4)))
        (global.set $left (i64.sub (global.get $left) (i64.const 1)))
        (i32.const 1)))
"#;

const ECHO: &str = r#"
    (module
      (import "graph" "declare" (func $declare (param i32 i32 i32) (result i32)))
      (import "graph" "emit" (func $emit (param i32 i32 i32) (result i32)))
      (import "graph" "poll_command" (func $poll (param i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 0) "out")
      (data (i32.const 8) "ctl")
      (global $out (mut i32) (i32.const -1))
      (global $ctl (mut i32) (i32.const -1))
      (func (export "echo")
        (global.set $out (call $declare (i32.const 0) (i32.const 0) (i32.const 3)))
        (global.set $ctl (call $declare (i32.const 1) (i32.const 8) (i32.const 3))))
      (func (export "start"))
      (func (export "stop"))
      (func (export "work") (result i32)
        (local $len i32)
        (local.set $len (call $poll (global.get $ctl) (i32.const 64) (i32.const 256)))
        (if (i32.ge_s (local.get $len) (i32.const 0))
          (then (drop (call $emit (global.get $out) (i32.const 64) (local.get $len)))))
        (i32.const 1)))
"#;

struct TestServer {
    address: SocketAddr,
    ctx: Arc<SessionContext>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
    _graphs: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let graphs = tempfile::tempdir().unwrap();
        for (name, text) in [("beacon", BEACON), ("echo", ECHO)] {
            std::fs::write(
                graphs.path().join(format!("{name}.wasm")),
                wat::parse_str(text).unwrap(),
            )
            .unwrap();
        }

        let broker = RuntimeBroker::spawn(
            || {
                Ok(Box::new(WasmGraphEngine::new(WasmEngineSettings::default())?)
                    as Box<dyn GraphEngine>)
            },
            BrokerSettings {
                tick_interval: Duration::from_millis(5),
            },
        )
        .unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let ctx = Arc::new(SessionContext {
            broker,
            compiler: Arc::new(GraphCompiler::new(CompilerSettings::default()).unwrap()),
            registry: SessionRegistry::spawn(Some(metrics.clone())),
            metrics: Some(metrics),
            settings: SessionSettings {
                graph_dir: graphs.path().to_path_buf(),
                completion_poll_interval: Duration::from_millis(10),
                telemetry_interval: Duration::ZERO,
                ..SessionSettings::default()
            },
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve_on(listener, ctx.clone(), async move {
            let _ = stopped.await;
        }));

        Self {
            address,
            ctx,
            stop: Some(stop),
            task,
            _graphs: graphs,
        }
    }

    async fn client(&self) -> FlowstreamClient<tonic::transport::Channel> {
        FlowstreamClient::connect(format!("http://{}", self.address))
            .await
            .unwrap()
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        self.ctx.broker.shutdown();
    }
}

fn start(filename: &str, parameters: Vec<Parameter>) -> RunFlowgraphRequest {
    RunFlowgraphRequest {
        request: Some(Request::StartFlowgraphRequest(StartFlowgraphRequest {
            filename: filename.to_string(),
            parameters,
        })),
    }
}

fn command(block_id: &str, payload: &[u8]) -> RunFlowgraphRequest {
    RunFlowgraphRequest {
        request: Some(Request::SendCommandRequest(SendCommandRequest {
            block_id: block_id.to_string(),
            payload: payload.to_vec(),
        })),
    }
}

async fn collect(mut stream: tonic::Streaming<RunFlowgraphResponse>) -> Vec<RunFlowgraphResponse> {
    let mut received = Vec::new();
    while let Some(message) = stream.message().await.unwrap() {
        received.push(message);
    }
    received
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finished_graph_streams_every_event_then_ends() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(start(
        "beacon.wasm",
        vec![Parameter {
            key: "count".to_string(),
            value: Some(Value {
                val: Some(Val::IntegerValue(3)),
            }),
        }],
    ))
    .await
    .unwrap();

    let response = client
        .run_flowgraph(ReceiverStream::new(rx))
        .await
        .unwrap();
    let received = tokio::time::timeout(Duration::from_secs(10), collect(response.into_inner()))
        .await
        .unwrap();

    assert_eq!(received.len(), 3);
    assert!(received
        .iter()
        .all(|message| message.block_name == "out" && message.payload == b"beep"));

    drop(tx);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_are_echoed_until_half_close() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(start("echo.wasm", Vec::new())).await.unwrap();
    let mut stream = client
        .run_flowgraph(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    tx.send(command("ctl", b"ping")).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(10), stream.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed.block_name, "out");
    assert_eq!(echoed.payload, b"ping");

    drop(tx);
    let rest = tokio::time::timeout(Duration::from_secs(10), collect(stream))
        .await
        .unwrap();
    assert!(rest.is_empty());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_message_must_start_a_flowgraph() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(command("ctl", b"early")).await.unwrap();
    let status = client
        .run_flowgraph(ReceiverStream::new(rx))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    drop(tx);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_flowgraph_is_not_found() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(start("nowhere.wasm", Vec::new())).await.unwrap();
    let status = client
        .run_flowgraph(ReceiverStream::new(rx))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    drop(tx);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_closes_live_sessions() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(start("echo.wasm", Vec::new())).await.unwrap();
    let stream = client
        .run_flowgraph(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let registry = server.ctx.registry.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.live_sessions().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let ended = tokio::spawn(collect(stream));
    drop(client);
    server.shutdown().await;

    assert!(ended.await.unwrap().is_empty());
    assert!(registry.live_sessions().await.is_empty());
    drop(tx);
}

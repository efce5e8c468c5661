// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stream adapters for [`InboundStream`] and [`OutboundSink`].
//!
//! The gRPC service uses the tonic adapters; in-process callers and tests
//! drive sessions with plain `mpsc` channels.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tonic::{Status, Streaming};

use crate::errors::{SessionError, SessionResult};
use crate::proto::flowstream_v1::{
    run_flowgraph_request::Request, SendCommandRequest, StartFlowgraphRequest,
};
use crate::proto::{RunFlowgraphRequest, RunFlowgraphResponse};
use crate::traits::{
    ClientMessage, CommandMessage, InboundStream, OutboundSink, OutputMessage, StartRequest,
};

impl From<StartFlowgraphRequest> for StartRequest {
    fn from(request: StartFlowgraphRequest) -> Self {
        StartRequest {
            filename: request.filename,
            parameters: request.parameters.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<SendCommandRequest> for CommandMessage {
    fn from(request: SendCommandRequest) -> Self {
        CommandMessage {
            endpoint: request.block_id,
            payload: request.payload,
        }
    }
}

impl From<OutputMessage> for RunFlowgraphResponse {
    fn from(message: OutputMessage) -> Self {
        RunFlowgraphResponse {
            block_name: message.endpoint,
            payload: message.payload,
        }
    }
}

#[async_trait]
impl InboundStream for Streaming<RunFlowgraphRequest> {
    async fn next_message(&mut self) -> SessionResult<Option<ClientMessage>> {
        loop {
            let Some(request) = self.message().await? else {
                return Ok(None);
            };
            // A request without a body carries nothing to act on.
            match request.request {
                Some(Request::StartFlowgraphRequest(start)) => {
                    return Ok(Some(ClientMessage::Start(start.into())))
                }
                Some(Request::SendCommandRequest(command)) => {
                    return Ok(Some(ClientMessage::Command(command.into())))
                }
                None => continue,
            }
        }
    }
}

#[async_trait]
impl OutboundSink for mpsc::Sender<Result<RunFlowgraphResponse, Status>> {
    async fn send(&self, message: OutputMessage) -> SessionResult<()> {
        mpsc::Sender::send(self, Ok(message.into()))
            .await
            .map_err(|_| SessionError::Transport("caller stream closed".to_string()))
    }
}

#[async_trait]
impl InboundStream for mpsc::Receiver<ClientMessage> {
    async fn next_message(&mut self) -> SessionResult<Option<ClientMessage>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl OutboundSink for mpsc::Sender<OutputMessage> {
    async fn send(&self, message: OutputMessage) -> SessionResult<()> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| SessionError::Transport("output receiver dropped".to_string()))
    }
}

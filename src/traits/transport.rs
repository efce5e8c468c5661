// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::SessionResult;
use crate::params::Parameter;

/// Parsed start request: the graph source and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub filename: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub endpoint: String,
    pub payload: Vec<u8>,
}

/// A message read from the caller's side of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Start(StartRequest),
    Command(CommandMessage),
}

/// One serialized event produced by an observable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub endpoint: String,
    pub payload: Vec<u8>,
}

/// Caller-to-server half of a session stream.
///
/// `Ok(None)` means the caller half-closed; an error means the transport
/// failed.
#[async_trait]
pub trait InboundStream: Send + 'static {
    async fn next_message(&mut self) -> SessionResult<Option<ClientMessage>>;
}

/// Server-to-caller half of a session stream.
#[async_trait]
pub trait OutboundSink: Send + Sync + 'static {
    async fn send(&self, message: OutputMessage) -> SessionResult<()>;
}

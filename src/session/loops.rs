// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SessionId;
use crate::broker::RuntimeBroker;
use crate::errors::{EngineResult, SessionError};
use crate::observability::messages::session::{
    CommandReceived, CommandRejected, CompletionPollFailed, GraphFinished, OversizeOutput,
    RepeatedStartIgnored, UnknownCommandEndpoint,
};
use crate::observability::messages::StructuredLog;
use crate::queue::QueueHandle;
use crate::traits::{ClientMessage, GraphHandle, InboundStream, OutputMessage};

pub(super) enum CommandExit {
    /// The caller half-closed its side of the stream.
    EndOfInput,
    Cancelled,
    Failed(SessionError),
}

pub(super) enum OutputEvent {
    Item(OutputMessage),
    Oversize { endpoint: String, size: usize },
}

/// Reads caller messages and pushes commands onto their endpoint's queue
/// until the input ends, fails, or `cancel` fires.
pub(super) async fn command_loop<I: InboundStream>(
    session_id: SessionId,
    mut inbound: I,
    commands: HashMap<String, QueueHandle>,
    silenced: Arc<HashSet<String>>,
    cancel: CancellationToken,
) -> CommandExit {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return CommandExit::Cancelled,
            message = inbound.next_message() => message,
        };

        let command = match message {
            Ok(Some(ClientMessage::Command(command))) => command,
            Ok(Some(ClientMessage::Start(_))) => {
                RepeatedStartIgnored { session_id }.log();
                continue;
            }
            Ok(None) => return CommandExit::EndOfInput,
            Err(err) => return CommandExit::Failed(err),
        };

        let Some(queue) = commands.get(&command.endpoint) else {
            UnknownCommandEndpoint {
                session_id,
                error: &SessionError::InvalidEndpoint(command.endpoint),
            }
            .log();
            continue;
        };

        if !silenced.contains(&command.endpoint) {
            CommandReceived {
                session_id,
                endpoint: &command.endpoint,
                size: command.payload.len(),
            }
            .log();
        }
        if let Err(err) = queue.push(command.payload) {
            CommandRejected {
                session_id,
                endpoint: &command.endpoint,
                error: &err,
            }
            .log();
        }
    }
}

/// Pops one observable endpoint's queue on a blocking thread until the queue
/// is closed and empty, or the forwarder has gone away.
///
/// An item larger than `max_message_bytes` is reported once and ends the loop.
pub(super) fn spawn_output_loop(
    endpoint: String,
    queue: QueueHandle,
    max_message_bytes: usize,
    forward: mpsc::Sender<OutputEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(payload) = queue.pop_blocking() {
            if payload.len() > max_message_bytes {
                OversizeOutput {
                    endpoint: &endpoint,
                    size: payload.len(),
                    max: max_message_bytes,
                }
                .log();
                let _ = forward.blocking_send(OutputEvent::Oversize {
                    endpoint,
                    size: payload.len(),
                });
                return;
            }
            let event = OutputEvent::Item(OutputMessage {
                endpoint: endpoint.clone(),
                payload,
            });
            if forward.blocking_send(event).is_err() {
                return;
            }
        }
    })
}

/// Polls the engine until the graph stops running or `cancel` fires.
///
/// A graph that faulted, or an engine that can no longer answer, ends the
/// watch with the engine's error.
pub(super) async fn completion_watcher(
    session_id: SessionId,
    broker: RuntimeBroker,
    graph: GraphHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> EngineResult<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
        match broker.with_engine(move |engine| engine.is_running(graph)).await {
            Ok(true) => {}
            Ok(false) => {
                GraphFinished { session_id, graph }.log();
                return Ok(());
            }
            Err(err) => {
                CompletionPollFailed {
                    session_id,
                    error: &err,
                }
                .log();
                return Err(err);
            }
        }
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The set of live sessions, owned by a single actor task.
//!
//! Every membership change is a message on one ordered channel, so a
//! session is removed exactly once: either by its own `deregister` or by
//! `close_all`, never both. Removal cancels the session's shutdown token,
//! which drives it into draining if it is not already on its way out.
//!
//! Once `close_all` has begun, new registrations are refused with
//! [`SessionError::RegistryClosed`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::errors::{SessionError, SessionResult};
use crate::monitoring::Metrics;
use crate::observability::messages::registry::{
    RegistryClosed, RegistryClosing, RegistrationRefused, SessionDeregistered, SessionRegistered,
};
use crate::observability::messages::StructuredLog;
use crate::session::{SessionHandle, SessionId};

enum RegistryRequest {
    Register {
        handle: SessionHandle,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Deregister {
        id: SessionId,
        reply: Option<oneshot::Sender<bool>>,
    },
    CloseAll {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Live {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
}

/// Cloneable client of the registry actor.
#[derive(Clone)]
pub struct SessionRegistry {
    requests: mpsc::UnboundedSender<RegistryRequest>,
}

impl SessionRegistry {
    /// Starts the actor on the current tokio runtime.
    pub fn spawn(metrics: Option<Arc<Metrics>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = RegistryActor {
            sessions: HashMap::new(),
            closing: false,
            metrics,
        };
        tokio::spawn(actor.run(rx));
        Self { requests: tx }
    }

    pub async fn register(&self, handle: SessionHandle) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(RegistryRequest::Register { handle, reply })
            .map_err(|_| SessionError::RegistryClosed)?;
        rx.await.unwrap_or(Err(SessionError::RegistryClosed))
    }

    /// Removes `id` and cancels it. Returns whether it was still registered.
    pub async fn deregister(&self, id: SessionId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .requests
            .send(RegistryRequest::Deregister {
                id,
                reply: Some(reply),
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Deregisters without waiting for the outcome. Usable outside async code.
    pub fn forget(&self, id: SessionId) {
        let _ = self
            .requests
            .send(RegistryRequest::Deregister { id, reply: None });
    }

    /// Refuses new sessions, cancels every live one and returns their ids
    /// once all of them have reached a terminal phase.
    pub async fn close_all(&self) -> Vec<SessionId> {
        let (reply, rx) = oneshot::channel();
        if self
            .requests
            .send(RegistryRequest::CloseAll { reply })
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn live_sessions(&self) -> Vec<SessionId> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(RegistryRequest::Live { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

struct RegistryActor {
    sessions: HashMap<SessionId, SessionHandle>,
    closing: bool,
    metrics: Option<Arc<Metrics>>,
}

impl RegistryActor {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<RegistryRequest>) {
        while let Some(request) = requests.recv().await {
            match request {
                RegistryRequest::Register { handle, reply } => {
                    let _ = reply.send(self.register(handle));
                }
                RegistryRequest::Deregister { id, reply } => {
                    let removed = self.deregister(id);
                    if let Some(reply) = reply {
                        let _ = reply.send(removed);
                    }
                }
                RegistryRequest::CloseAll { reply } => self.close_all(reply),
                RegistryRequest::Live { reply } => {
                    let _ = reply.send(self.sessions.keys().copied().collect());
                }
            }
        }
    }

    fn register(&mut self, handle: SessionHandle) -> SessionResult<()> {
        if self.closing {
            RegistrationRefused {
                session_id: handle.id,
            }
            .log();
            return Err(SessionError::RegistryClosed);
        }
        let id = handle.id;
        self.sessions.insert(id, handle);
        self.publish_count();
        SessionRegistered {
            session_id: id,
            live: self.sessions.len(),
        }
        .log();
        Ok(())
    }

    fn deregister(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(handle) => {
                handle.shutdown.cancel();
                self.publish_count();
                SessionDeregistered {
                    session_id: id,
                    live: self.sessions.len(),
                }
                .log();
                true
            }
            None => false,
        }
    }

    fn close_all(&mut self, reply: oneshot::Sender<Vec<SessionId>>) {
        self.closing = true;
        let handles: Vec<SessionHandle> = self.sessions.drain().map(|(_, h)| h).collect();
        self.publish_count();
        RegistryClosing {
            live: handles.len(),
        }
        .log();

        for handle in &handles {
            handle.shutdown.cancel();
        }
        let ids: Vec<SessionId> = handles.iter().map(|h| h.id).collect();

        // Waiting happens off the actor so sessions can still deregister
        // themselves while they wind down.
        tokio::spawn(async move {
            for handle in handles {
                handle.wait_terminal().await;
            }
            RegistryClosed { closed: ids.len() }.log();
            let _ = reply.send(ids);
        });
    }

    fn publish_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_flowgraph_count(self.sessions.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    /// Registers a fake session that publishes `Closed` once cancelled.
    fn fake_session() -> (SessionHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = watch::channel(SessionPhase::Running);
        let shutdown = CancellationToken::new();
        let handle = SessionHandle {
            id: SessionId::new(),
            shutdown: shutdown.clone(),
            phase: rx,
        };
        let watcher = tokio::spawn(async move {
            shutdown.cancelled().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            tx.send_replace(SessionPhase::Closed);
        });
        (handle, watcher)
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = SessionRegistry::spawn(Some(metrics.clone()));
        let (handle, _watcher) = fake_session();
        let id = handle.id;
        let token = handle.shutdown.clone();

        registry.register(handle).await.unwrap();
        assert_eq!(registry.live_sessions().await, vec![id]);
        assert_eq!(metrics.flowgraph_count(), 1);

        assert!(registry.deregister(id).await);
        assert!(token.is_cancelled());
        assert!(!registry.deregister(id).await);
        assert!(registry.live_sessions().await.is_empty());
        assert_eq!(metrics.flowgraph_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all_waits_for_terminal_phase_and_refuses_new_sessions() {
        let registry = SessionRegistry::spawn(None);
        let mut phases = Vec::new();
        for _ in 0..3 {
            let (handle, _watcher) = fake_session();
            phases.push(handle.phase.clone());
            registry.register(handle).await.unwrap();
        }

        let closed = registry.close_all().await;

        assert_eq!(closed.len(), 3);
        assert!(phases.iter().all(|rx| rx.borrow().is_terminal()));

        let (late, _watcher) = fake_session();
        assert!(matches!(
            registry.register(late).await,
            Err(SessionError::RegistryClosed)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_session_is_removed_exactly_once() {
        let registry = SessionRegistry::spawn(None);

        let mut tasks = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _watcher) = fake_session();
                let id = handle.id;
                if registry.register(handle).await.is_err() {
                    return None;
                }
                if i % 2 == 0 {
                    tokio::task::yield_now().await;
                    return Some((id, registry.deregister(id).await));
                }
                Some((id, false))
            }));
        }

        tokio::time::sleep(Duration::from_millis(1)).await;
        let closed: HashSet<SessionId> = registry.close_all().await.into_iter().collect();

        let mut registered = HashSet::new();
        let mut self_removed = HashSet::new();
        for task in tasks {
            if let Some((id, removed)) = task.await.unwrap() {
                registered.insert(id);
                if removed {
                    self_removed.insert(id);
                }
            }
        }

        // Sessions registered after close_all was processed were refused, so
        // everything registered was removed by exactly one path.
        assert!(self_removed.is_disjoint(&closed));
        let union: HashSet<_> = self_removed.union(&closed).copied().collect();
        assert_eq!(union, registered);
        assert!(registry.live_sessions().await.is_empty());
    }
}

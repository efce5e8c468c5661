// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::{Display, Formatter};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::SessionPhase;

/// Opaque, collision-free session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the registry keeps for a live session: enough to stop it and to
/// observe when it has finished, nothing more.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub shutdown: CancellationToken,
    pub phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    /// Waits until the session reaches a terminal phase. A session that went
    /// away without publishing one counts as finished.
    pub async fn wait_terminal(mut self) {
        let _ = self.phase.wait_for(|phase| phase.is_terminal()).await;
    }
}

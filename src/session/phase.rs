// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Session lifecycle phases.
//!
//! ```text
//! Starting ──▶ Running ──▶ Draining ──▶ Closed
//!     │           │           │
//!     └───────────┴───────────┴──────▶ Errored
//! ```
//!
//! `Closed` and `Errored` are terminal. The current phase is published on a
//! `watch` channel so the registry can wait for a session to finish without
//! owning it.

use std::fmt::{Display, Formatter};

use tokio::sync::watch;

use super::SessionId;
use crate::observability::messages::session::{PhaseChanged, PhaseTransitionRefused};
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Starting,
    Running,
    Draining,
    Closed,
    Errored,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Closed | SessionPhase::Errored)
    }

    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Starting, Running) | (Running, Draining) | (Draining, Closed) => true,
            (current, Errored) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Draining => "draining",
            SessionPhase::Closed => "closed",
            SessionPhase::Errored => "errored",
        }
    }
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner side of a session's phase channel.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    session: SessionId,
    tx: watch::Sender<SessionPhase>,
}

impl PhaseTracker {
    pub(crate) fn new(session: SessionId) -> (Self, watch::Receiver<SessionPhase>) {
        let (tx, rx) = watch::channel(SessionPhase::Starting);
        (Self { session, tx }, rx)
    }

    pub(crate) fn current(&self) -> SessionPhase {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.tx.subscribe()
    }

    /// Moves to `next` if the transition is allowed. Returns whether it moved.
    pub(crate) fn advance(&self, next: SessionPhase) -> bool {
        let from = self.current();
        if !from.can_transition_to(next) {
            PhaseTransitionRefused {
                session_id: self.session,
                from,
                to: next,
            }
            .log();
            return false;
        }
        self.tx.send_replace(next);
        PhaseChanged {
            session_id: self.session,
            from,
            to: next,
        }
        .log();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionPhase::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Closed));
    }

    #[test]
    fn test_errored_is_reachable_and_absorbing() {
        for phase in [Starting, Running, Draining] {
            assert!(phase.can_transition_to(Errored));
        }
        for next in [Starting, Running, Draining, Closed, Errored] {
            assert!(!Errored.can_transition_to(next));
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_skipping_phases_is_refused() {
        assert!(!Starting.can_transition_to(Draining));
        assert!(!Starting.can_transition_to(Closed));
        assert!(!Running.can_transition_to(Closed));
        assert!(!Draining.can_transition_to(Running));
    }

    #[test]
    fn test_tracker_publishes_only_valid_transitions() {
        let (tracker, rx) = PhaseTracker::new(SessionId::new());
        assert_eq!(*rx.borrow(), Starting);

        assert!(tracker.advance(Running));
        assert!(!tracker.advance(Closed));
        assert_eq!(*rx.borrow(), Running);

        assert!(tracker.advance(Errored));
        assert!(!tracker.advance(Draining));
        assert_eq!(*rx.borrow(), Errored);
        assert!(rx.borrow().is_terminal());
    }
}

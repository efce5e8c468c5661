// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the session registry.

use crate::observability::messages::StructuredLog;
use crate::session::handle::SessionId;
use std::fmt::{Display, Formatter};

pub struct SessionRegistered {
    pub session_id: SessionId,
    pub live: usize,
}

impl Display for SessionRegistered {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} registered ({} live)",
            self.session_id, self.live
        )
    }
}

impl StructuredLog for SessionRegistered {
    fn log(&self) {
        tracing::debug!(
            session_id = %self.session_id,
            live = self.live,
            "{}", self
        );
    }
}

pub struct SessionDeregistered {
    pub session_id: SessionId,
    pub live: usize,
}

impl Display for SessionDeregistered {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session {} deregistered ({} live)",
            self.session_id, self.live
        )
    }
}

impl StructuredLog for SessionDeregistered {
    fn log(&self) {
        tracing::debug!(
            session_id = %self.session_id,
            live = self.live,
            "{}", self
        );
    }
}

/// A session tried to register after `close_all`.
///
/// # Log Level
/// `warn!` - Request refused during shutdown
pub struct RegistrationRefused {
    pub session_id: SessionId,
}

impl Display for RegistrationRefused {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Refused to register session {}: registry is closing",
            self.session_id
        )
    }
}

impl StructuredLog for RegistrationRefused {
    fn log(&self) {
        tracing::warn!(session_id = %self.session_id, "{}", self);
    }
}

/// `close_all` has signalled every live session.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RegistryClosing {
    pub live: usize,
}

impl Display for RegistryClosing {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Closing {} live sessions", self.live)
    }
}

impl StructuredLog for RegistryClosing {
    fn log(&self) {
        tracing::info!(live = self.live, "{}", self);
    }
}

/// Every session signalled by `close_all` reached a terminal phase.
///
/// # Log Level
/// `info!` - Important operational event
pub struct RegistryClosed {
    pub closed: usize,
}

impl Display for RegistryClosed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "All {} sessions closed", self.closed)
    }
}

impl StructuredLog for RegistryClosed {
    fn log(&self) {
        tracing::info!(closed = self.closed, "{}", self);
    }
}

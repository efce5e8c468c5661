// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error taxonomy surfaced to remote callers.
//!
//! Startup failures (`NotFound`, `UnsupportedType`, `Compile`, `EngineFault`)
//! are returned once, before any output is streamed. `OversizeMessage` and
//! `Transport` end a running stream. `InvalidEndpoint` is only ever logged.

use std::path::PathBuf;
use thiserror::Error;
use tonic::{Code, Status};

use super::{CompileError, EngineError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("graph source not found: {0:?}")]
    NotFound(PathBuf),

    #[error("unsupported graph source type: {0}")]
    UnsupportedType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("engine fault: {0}")]
    EngineFault(#[from] EngineError),

    #[error("no command endpoint named '{0}'")]
    InvalidEndpoint(String),

    #[error("message of {size} bytes from '{endpoint}' exceeds the {max} byte limit")]
    OversizeMessage {
        endpoint: String,
        size: usize,
        max: usize,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session registry is shutting down")]
    RegistryClosed,
}

impl SessionError {
    pub fn code(&self) -> Code {
        match self {
            SessionError::NotFound(_) => Code::NotFound,
            SessionError::UnsupportedType(_) | SessionError::InvalidRequest(_) => {
                Code::InvalidArgument
            }
            SessionError::Compile(_) => Code::FailedPrecondition,
            SessionError::EngineFault(_) => Code::Internal,
            SessionError::InvalidEndpoint(_) => Code::NotFound,
            SessionError::OversizeMessage { .. } => Code::ResourceExhausted,
            SessionError::Transport(_) | SessionError::RegistryClosed => Code::Unavailable,
        }
    }
}

impl From<SessionError> for Status {
    fn from(err: SessionError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

impl From<Status> for SessionError {
    fn from(status: Status) -> Self {
        SessionError::Transport(status.message().to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_distinguish_startup_failures() {
        let not_found = Status::from(SessionError::NotFound(PathBuf::from("missing.flow")));
        assert_eq!(not_found.code(), Code::NotFound);

        let unsupported = Status::from(SessionError::UnsupportedType("txt".into()));
        assert_eq!(unsupported.code(), Code::InvalidArgument);

        let compile = Status::from(SessionError::Compile(CompileError::UnexpectedOutput {
            count: 2,
        }));
        assert_eq!(compile.code(), Code::FailedPrecondition);
        assert!(compile.message().contains("unexpected number of files"));

        let engine = Status::from(SessionError::EngineFault(EngineError::NotAGraph {
            entry: "beacon".into(),
            reason: "missing export 'work'".into(),
        }));
        assert_eq!(engine.code(), Code::Internal);
        assert!(engine.message().contains("not a recognized graph type"));
    }
}

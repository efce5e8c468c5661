// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors surfaced from inside the embedded engine.
//!
//! Every failure that happens while holding engine access is reported as an
//! [`EngineError`]; the variants that carry a `String` carry the engine's own
//! description of what went wrong.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The compiled module does not expose the expected entry point.
    #[error("entry '{entry}' not found in module '{module}'")]
    MissingEntry { module: String, entry: String },

    /// The entry exists but is not a recognized graph type.
    #[error("'{entry}' is not a recognized graph type: {reason}")]
    NotAGraph { entry: String, reason: String },

    /// A start parameter carried no value, or a value of an unknown kind.
    #[error("unsupported value type for parameter '{key}'")]
    UnsupportedParameter { key: String },

    /// The handle does not name a live graph.
    #[error("unknown graph handle {0}")]
    UnknownGraph(u64),

    /// The graph does not expose an endpoint with this name and capability.
    #[error("graph has no {kind} endpoint named '{name}'")]
    UnknownEndpoint { name: String, kind: &'static str },

    /// `with_engine` was called while already holding engine access.
    #[error("reentrant engine access")]
    Reentrant,

    /// The broker thread has shut down.
    #[error("engine is not available")]
    Unavailable,

    /// A bounded engine call did not finish in time.
    #[error("engine call '{operation}' timed out")]
    Timeout { operation: &'static str },

    /// Any other failure raised by the engine, with its native text.
    #[error("{0}")]
    Fault(String),
}

impl From<wasmtime::Error> for EngineError {
    fn from(err: wasmtime::Error) -> Self {
        EngineError::Fault(format!("{err:#}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

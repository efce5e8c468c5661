// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for loading graph modules into wasmtime.
//!
//! These never leave the backend on their own: at the engine seam they are
//! turned into [`EngineError::Fault`] carrying the same text.

use thiserror::Error;

use crate::errors::EngineError;

#[derive(Error, Debug)]
pub enum WasmError {
    /// File I/O error during module loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The module file exceeds the size limit.
    #[error("WASM module too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    /// Module compilation error.
    #[error("WASM module error: {0}")]
    Module(String),

    /// Wasmtime engine creation or configuration error.
    #[error("engine creation error: {0}")]
    Engine(String),

    /// Host function registration error.
    #[error("host linking error: {0}")]
    Linker(String),
}

pub type WasmResult<T> = Result<T, WasmError>;

impl From<WasmError> for EngineError {
    fn from(err: WasmError) -> Self {
        EngineError::Fault(err.to_string())
    }
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WebAssembly graph engine.
//!
//! Graphs are WebAssembly core modules run by wasmtime on the engine thread.
//! See [`host`] for the functions a graph imports and [`engine`] for the
//! exports it must provide.

pub mod engine;
pub mod error;
pub mod host;
pub mod loader;

pub use engine::{WasmEngineSettings, WasmGraphEngine};
pub use error::{WasmError, WasmResult};

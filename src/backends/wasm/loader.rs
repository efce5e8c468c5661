// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph module file loading.
//!
//! Reads a module binary from disk and enforces the size limit. Parsing and
//! validation are left to wasmtime.

use std::path::Path;

use super::error::{WasmError, WasmResult};
use crate::observability::messages::engine::{ModuleLoadFailed, ModuleLoaded};
use crate::observability::messages::StructuredLog;

/// Maximum allowed size for graph modules (64 MB)
pub const MAX_MODULE_SIZE: usize = 64 * 1024 * 1024;

pub fn load_module_bytes<P: AsRef<Path>>(path: P) -> WasmResult<Vec<u8>> {
    let path = path.as_ref();
    let result = std::fs::read(path)
        .map_err(WasmError::from)
        .and_then(|bytes| {
            if bytes.len() > MAX_MODULE_SIZE {
                Err(WasmError::TooLarge {
                    size: bytes.len(),
                    max: MAX_MODULE_SIZE,
                })
            } else {
                Ok(bytes)
            }
        });

    match &result {
        Ok(bytes) => ModuleLoaded {
            module_path: path,
            size_bytes: bytes.len(),
        }
        .log(),
        Err(error) => ModuleLoadFailed {
            module_path: path,
            error,
        }
        .log(),
    }
    result
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host side of the graph ABI.
//!
//! Every graph module imports its host functions from the `graph` namespace:
//!
//! | import | signature | meaning |
//! |--------|-----------|---------|
//! | `declare` | `(kind, name_ptr, name_len) -> i32` | register an endpoint, returns its index (`-1` outside the entry) |
//! | `emit` | `(endpoint, ptr, len) -> i32` | push an event to an observable endpoint |
//! | `poll_command` | `(endpoint, out_ptr, out_cap) -> i32` | pop a pending command, `-1` when none |
//! | `param_i64` | `(key_ptr, key_len, default) -> i64` | integer argument |
//! | `param_f64` | `(key_ptr, key_len, default) -> f64` | float argument |
//! | `param_complex` | `(key_ptr, key_len, out_ptr) -> i32` | writes `re, im` as two little-endian f64 |
//! | `param_str` | `(key_ptr, key_len, out_ptr, out_cap) -> i32` | string argument length, `-1` when absent |
//!
//! Endpoint kinds are `0` observable, `1` command, `2` telemetry.

use std::collections::HashMap;

use wasmtime::{Caller, Extern, Linker, Memory};

use super::error::{WasmError, WasmResult};
use crate::errors::QueueError;
use crate::observability::messages::engine::EmitRejected;
use crate::observability::messages::StructuredLog;
use crate::params::GraphArgs;
use crate::queue::{BlockingQueue, QueueHandle};
use crate::traits::{Capability, CapabilityKind};

pub const HOST_NAMESPACE: &str = "graph";

pub const EMIT_OK: i32 = 0;
/// No observer attached, or the observer queue is closed.
pub const EMIT_DROPPED: i32 = 1;
/// The observer queue is full.
pub const EMIT_FULL: i32 = 2;

pub const NO_VALUE: i32 = -1;

/// Per-graph store data.
pub struct GraphHost {
    entry: String,
    declaring: bool,
    endpoints: Vec<String>,
    capabilities: Vec<Capability>,
    observers: HashMap<u32, QueueHandle>,
    commands: HashMap<u32, QueueHandle>,
    args: GraphArgs,
    command_queue_bytes: usize,
}

impl GraphHost {
    pub fn new(entry: impl Into<String>, args: GraphArgs, command_queue_bytes: usize) -> Self {
        Self {
            entry: entry.into(),
            declaring: false,
            endpoints: Vec::new(),
            capabilities: Vec::new(),
            observers: HashMap::new(),
            commands: HashMap::new(),
            args,
            command_queue_bytes,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub(crate) fn set_declaring(&mut self, declaring: bool) {
        self.declaring = declaring;
    }

    /// Index of the endpoint `name` if it was declared with `kind`.
    pub fn endpoint_index(&self, name: &str, kind: CapabilityKind) -> Option<u32> {
        let declared = self
            .capabilities
            .iter()
            .any(|cap| cap.kind == kind && cap.name == name);
        if !declared {
            return None;
        }
        self.endpoints
            .iter()
            .position(|endpoint| endpoint == name)
            .and_then(|index| u32::try_from(index).ok())
    }

    pub fn attach_observer(&mut self, index: u32, queue: QueueHandle) {
        self.observers.insert(index, queue);
    }

    pub fn command_queue(&self, index: u32) -> Option<QueueHandle> {
        self.commands.get(&index).cloned()
    }

    /// Closes every command queue so producers stop enqueueing.
    pub fn close_commands(&self) {
        for queue in self.commands.values() {
            queue.close_and_wake();
        }
    }

    fn declare(&mut self, kind: CapabilityKind, name: String) -> i32 {
        if !self.declaring {
            return NO_VALUE;
        }
        let index = match self.endpoints.iter().position(|endpoint| *endpoint == name) {
            Some(index) => index,
            None => {
                self.endpoints.push(name.clone());
                self.endpoints.len() - 1
            }
        };
        let Ok(index) = u32::try_from(index) else {
            return NO_VALUE;
        };
        if !self
            .capabilities
            .iter()
            .any(|cap| cap.kind == kind && cap.name == name)
        {
            if kind == CapabilityKind::Command {
                self.commands
                    .insert(index, BlockingQueue::handle(self.command_queue_bytes));
            }
            self.capabilities.push(Capability::new(name, kind));
        }
        index as i32
    }

    fn emit(&self, endpoint: i32, payload: Vec<u8>) -> i32 {
        let Some((index, queue)) = u32::try_from(endpoint)
            .ok()
            .and_then(|index| self.observers.get(&index).map(|queue| (index, queue)))
        else {
            return EMIT_DROPPED;
        };
        match queue.push(payload) {
            Ok(()) => EMIT_OK,
            Err(QueueError::Closed) => EMIT_DROPPED,
            Err(error) => {
                EmitRejected {
                    entry: &self.entry,
                    endpoint: self
                        .endpoints
                        .get(index as usize)
                        .map(String::as_str)
                        .unwrap_or("?"),
                    error: &error,
                }
                .log();
                EMIT_FULL
            }
        }
    }

    fn poll_command(&self, endpoint: i32) -> Option<Vec<u8>> {
        let index = u32::try_from(endpoint).ok()?;
        self.commands.get(&index)?.pop_nonblocking()
    }
}

fn kind_from_abi(kind: i32) -> Option<CapabilityKind> {
    match kind {
        0 => Some(CapabilityKind::Observable),
        1 => Some(CapabilityKind::Command),
        2 => Some(CapabilityKind::Telemetry),
        _ => None,
    }
}

fn memory(caller: &mut Caller<'_, GraphHost>) -> wasmtime::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("graph module does not export 'memory'"))
}

/// Checks that `len` bytes at `ptr` lie inside the guest's memory.
fn guest_range(
    caller: &Caller<'_, GraphHost>,
    memory: &Memory,
    ptr: i32,
    len: usize,
) -> wasmtime::Result<usize> {
    let offset = usize::try_from(ptr)?;
    match offset.checked_add(len) {
        Some(end) if end <= memory.data_size(caller) => Ok(offset),
        _ => Err(wasmtime::Error::msg(format!(
            "guest range {offset}+{len} is outside linear memory"
        ))),
    }
}

fn read_bytes(caller: &mut Caller<'_, GraphHost>, ptr: i32, len: i32) -> wasmtime::Result<Vec<u8>> {
    let memory = memory(caller)?;
    let len = usize::try_from(len)?;
    let offset = guest_range(caller, &memory, ptr, len)?;
    let mut buffer = vec![0u8; len];
    memory.read(&*caller, offset, &mut buffer)?;
    Ok(buffer)
}

fn read_key(caller: &mut Caller<'_, GraphHost>, ptr: i32, len: i32) -> wasmtime::Result<String> {
    let bytes = read_bytes(caller, ptr, len)?;
    Ok(String::from_utf8(bytes)?)
}

/// Copies as much of `bytes` as fits in `cap` and returns the full length.
fn write_bytes(
    caller: &mut Caller<'_, GraphHost>,
    ptr: i32,
    cap: i32,
    bytes: &[u8],
) -> wasmtime::Result<i32> {
    let memory = memory(caller)?;
    let count = bytes.len().min(usize::try_from(cap)?);
    let offset = guest_range(caller, &memory, ptr, count)?;
    memory.write(&mut *caller, offset, &bytes[..count])?;
    Ok(i32::try_from(bytes.len())?)
}

/// Registers the `graph` host functions.
pub fn link_host(linker: &mut Linker<GraphHost>) -> WasmResult<()> {
    register(linker).map_err(|e| WasmError::Linker(format!("{e:#}")))
}

fn register(linker: &mut Linker<GraphHost>) -> wasmtime::Result<()> {
    linker.func_wrap(
        HOST_NAMESPACE,
        "declare",
        |mut caller: Caller<'_, GraphHost>, kind: i32, ptr: i32, len: i32| -> wasmtime::Result<i32> {
            let Some(kind) = kind_from_abi(kind) else {
                return Ok(NO_VALUE);
            };
            let name = read_key(&mut caller, ptr, len)?;
            Ok(caller.data_mut().declare(kind, name))
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "emit",
        |mut caller: Caller<'_, GraphHost>, endpoint: i32, ptr: i32, len: i32| -> wasmtime::Result<i32> {
            let payload = read_bytes(&mut caller, ptr, len)?;
            Ok(caller.data().emit(endpoint, payload))
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "poll_command",
        |mut caller: Caller<'_, GraphHost>, endpoint: i32, ptr: i32, cap: i32| -> wasmtime::Result<i32> {
            match caller.data().poll_command(endpoint) {
                Some(command) => write_bytes(&mut caller, ptr, cap, &command),
                None => Ok(NO_VALUE),
            }
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "param_i64",
        |mut caller: Caller<'_, GraphHost>, ptr: i32, len: i32, default: i64| -> wasmtime::Result<i64> {
            let key = read_key(&mut caller, ptr, len)?;
            Ok(caller
                .data()
                .args
                .get(&key)
                .and_then(|arg| arg.as_i64())
                .unwrap_or(default))
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "param_f64",
        |mut caller: Caller<'_, GraphHost>, ptr: i32, len: i32, default: f64| -> wasmtime::Result<f64> {
            let key = read_key(&mut caller, ptr, len)?;
            Ok(caller
                .data()
                .args
                .get(&key)
                .and_then(|arg| arg.as_f64())
                .unwrap_or(default))
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "param_complex",
        |mut caller: Caller<'_, GraphHost>, ptr: i32, len: i32, out: i32| -> wasmtime::Result<i32> {
            let key = read_key(&mut caller, ptr, len)?;
            let Some((re, im)) = caller.data().args.get(&key).and_then(|arg| arg.as_complex())
            else {
                return Ok(NO_VALUE);
            };
            let mut encoded = [0u8; 16];
            encoded[..8].copy_from_slice(&re.to_le_bytes());
            encoded[8..].copy_from_slice(&im.to_le_bytes());
            write_bytes(&mut caller, out, 16, &encoded)?;
            Ok(1)
        },
    )?;

    linker.func_wrap(
        HOST_NAMESPACE,
        "param_str",
        |mut caller: Caller<'_, GraphHost>, ptr: i32, len: i32, out: i32, cap: i32| -> wasmtime::Result<i32> {
            let key = read_key(&mut caller, ptr, len)?;
            let Some(value) = caller
                .data()
                .args
                .get(&key)
                .and_then(|arg| arg.as_bytes())
                .map(<[u8]>::to_vec)
            else {
                return Ok(NO_VALUE);
            };
            write_bytes(&mut caller, out, cap, &value)
        },
    )?;

    Ok(())
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph engine implementations.
//!
//! * [`wasm`] - the production engine, hosting graphs as WebAssembly modules
//! * `stub` - a scripted in-memory engine for tests (test builds only)
//!
//! Both implement [`crate::traits::GraphEngine`] and are only ever touched from
//! the broker's engine thread.

#[cfg(test)]
pub mod stub;
pub mod wasm;

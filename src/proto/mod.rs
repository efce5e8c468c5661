// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

// Module declaration for generated protobuf code
#[path = "flowstream.v1.rs"]
pub mod flowstream_v1;

// Re-export the types for easier access
pub use flowstream_v1::{RunFlowgraphRequest, RunFlowgraphResponse};

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod engine;
pub mod transport;

pub use engine::{
    Capability, CapabilityKind, GraphEngine, GraphHandle, GraphInstance, PerfCounter,
};
pub use transport::{
    ClientMessage, CommandMessage, InboundStream, OutboundSink, OutputMessage, StartRequest,
};

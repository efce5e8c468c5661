// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;      // graph engines
pub mod broker;        // single-threaded engine access
pub mod compiler;      // compile-once flowgraph cache
pub mod config;        // server config + defaults
pub mod errors;        // error handling
pub mod monitoring;    // prometheus metrics + exporter
pub mod observability;
pub mod params;        // start parameter marshalling
pub mod proto;         // generated protobufs live here
pub mod queue;         // blocking byte queues
pub mod registry;      // live session registry
pub mod server;        // gRPC service + process wiring
pub mod session;       // per-stream session lifecycle
pub mod traits;        // engine + transport abstractions

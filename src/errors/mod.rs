// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod compile;
mod config;
mod engine;
mod queue;
mod session;

pub use compile::{CompileError, CompileResult};
pub use config::ConfigError;
pub use engine::{EngineError, EngineResult};
pub use queue::QueueError;
pub use session::{SessionError, SessionResult};

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while turning a graph description into a loadable module.
//!
//! None of these are retried: the same source fed to the same tool fails the
//! same way, so the caller gets the error once, at session start.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    /// The configured compiler executable could not be found.
    #[error("graph compiler '{tool}' not found")]
    ToolMissing { tool: PathBuf },

    /// The compiler ran and exited unsuccessfully.
    #[error("graph compiler failed for {source_path:?} (exit code {code:?}): {stderr}")]
    ToolFailed {
        source_path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    /// The compiler must leave exactly one artifact in its output directory.
    #[error("unexpected number of files output by the graph compiler: {count}")]
    UnexpectedOutput { count: usize },

    /// Scratch directory, rename or process spawn failure.
    #[error("I/O error while compiling: {0}")]
    Io(#[from] std::io::Error),
}

pub type CompileResult<T> = Result<T, CompileError>;

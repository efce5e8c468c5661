// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph source resolution and the compile-once module cache.
//!
//! A start request names a file inside the server's flowgraph directory.
//! Two kinds of source are accepted:
//!
//! * `.flow` graph descriptions, which an external compiler turns into a
//!   loadable module, and
//! * `.wasm` modules, which are loaded as they are.
//!
//! Compiling is slow and its output must be unique per source, so every
//! description is compiled at most once per process. Each source gets its own
//! once-cell in the cache. The map lock is only held to find or insert that
//! cell, so concurrent first requests for the same file queue up behind the
//! first compile while requests for other files go ahead.
//!
//! The compiler is invoked as `<tool> -d <scratch dir> <source>` and must
//! leave exactly one file in the scratch directory. That file is moved into
//! the module directory under a unique name; the entry class is the stem the
//! compiler chose.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use crate::config::consts::{DEFAULT_COMPILER_TOOL, DESCRIPTION_EXTENSION, MODULE_EXTENSION};
use crate::errors::{CompileError, CompileResult, SessionError, SessionResult};
use crate::observability::messages::compiler::{
    CompileCacheHit, CompileCompleted, CompileFailed, CompileStarted,
};
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A graph description that needs compiling.
    Description,
    /// A module that can be loaded directly.
    Module,
}

/// A loadable graph module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// The source the caller asked for.
    pub source: PathBuf,
    /// Unique name of the module; used as the engine's cache key.
    pub module_name: String,
    /// Name of the graph entry inside the module.
    pub entry_class: String,
    /// Location of the loadable module.
    pub path: PathBuf,
}

impl CompiledModule {
    /// Record for a module file used as-is. Its entry is named after the file.
    pub fn from_module_file(path: &Path) -> Self {
        let stem = file_stem(path);
        Self {
            source: path.to_path_buf(),
            module_name: stem.clone(),
            entry_class: stem,
            path: path.to_path_buf(),
        }
    }
}

/// Resolves `filename` inside `graph_dir`.
///
/// Rejects absolute paths and parent-directory components, then checks the
/// file exists before looking at its extension.
pub fn resolve_source(graph_dir: &Path, filename: &str) -> SessionResult<(PathBuf, SourceKind)> {
    let relative = Path::new(filename);
    if filename.is_empty() {
        return Err(SessionError::InvalidRequest(
            "start request has no filename".to_string(),
        ));
    }
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_absolute() || escapes {
        return Err(SessionError::InvalidRequest(format!(
            "filename '{filename}' must be relative to the flowgraph directory"
        )));
    }

    let joined = graph_dir.join(relative);
    let path = match std::fs::canonicalize(&joined) {
        Ok(path) if path.is_file() => path,
        _ => return Err(SessionError::NotFound(joined)),
    };

    let kind = match path.extension().and_then(|ext| ext.to_str()) {
        Some(DESCRIPTION_EXTENSION) => SourceKind::Description,
        Some(MODULE_EXTENSION) => SourceKind::Module,
        other => {
            return Err(SessionError::UnsupportedType(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };
    Ok((path, kind))
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub tool: PathBuf,
    /// Where compiled modules are kept. `None` uses a temporary directory
    /// removed when the compiler is dropped.
    pub module_dir: Option<PathBuf>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            tool: PathBuf::from(DEFAULT_COMPILER_TOOL),
            module_dir: None,
        }
    }
}

pub struct GraphCompiler {
    tool: PathBuf,
    module_dir: PathBuf,
    _owned_dir: Option<TempDir>,
    cache: Mutex<HashMap<PathBuf, Arc<OnceCell<CompiledModule>>>>,
}

impl GraphCompiler {
    pub fn new(settings: CompilerSettings) -> CompileResult<Self> {
        let (module_dir, owned_dir) = match settings.module_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                (dir, None)
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("flowstream-modules-")
                    .tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };
        Ok(Self {
            tool: settings.tool,
            module_dir,
            _owned_dir: owned_dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns a loadable module for a resolved source.
    pub async fn load(&self, path: &Path, kind: SourceKind) -> CompileResult<CompiledModule> {
        match kind {
            SourceKind::Module => Ok(CompiledModule::from_module_file(path)),
            SourceKind::Description => self.compile(path).await,
        }
    }

    /// Compiles `path` unless it was compiled before.
    ///
    /// A failed compile leaves nothing cached; the next request tries again.
    pub async fn compile(&self, path: &Path) -> CompileResult<CompiledModule> {
        let cell = self
            .cache
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .clone();

        if let Some(hit) = cell.get() {
            CompileCacheHit {
                source: path,
                module_name: &hit.module_name,
            }
            .log();
            return Ok(hit.clone());
        }

        let record = cell.get_or_try_init(|| self.compile_once(path)).await?;
        Ok(record.clone())
    }

    /// Number of sources with a compiled module.
    pub async fn cached(&self) -> usize {
        self.cache
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    async fn compile_once(&self, path: &Path) -> CompileResult<CompiledModule> {
        let started = Instant::now();
        CompileStarted {
            source: path,
            tool: &self.tool,
        }
        .log();

        match self.run_tool(path).await {
            Ok(record) => {
                CompileCompleted {
                    source: path,
                    module_name: &record.module_name,
                    entry_class: &record.entry_class,
                    elapsed: started.elapsed(),
                }
                .log();
                Ok(record)
            }
            Err(err) => {
                CompileFailed {
                    source: path,
                    error: &err,
                }
                .log();
                Err(err)
            }
        }
    }

    async fn run_tool(&self, path: &Path) -> CompileResult<CompiledModule> {
        let scratch = tempfile::Builder::new()
            .prefix("compile-")
            .tempdir_in(&self.module_dir)?;

        let output = Command::new(&self.tool)
            .arg("-d")
            .arg(scratch.path())
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => CompileError::ToolMissing {
                    tool: self.tool.clone(),
                },
                _ => CompileError::Io(err),
            })?;

        if !output.status.success() {
            return Err(CompileError::ToolFailed {
                source_path: path.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut artifacts = Vec::new();
        let mut entries = tokio::fs::read_dir(scratch.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            artifacts.push(entry.path());
        }
        if artifacts.len() != 1 {
            return Err(CompileError::UnexpectedOutput {
                count: artifacts.len(),
            });
        }
        let artifact = artifacts.remove(0);

        let entry_class = file_stem(&artifact);
        let module_name = format!("{}_{}", entry_class, Uuid::new_v4().simple());
        let file_name = match artifact.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{module_name}.{ext}"),
            None => module_name.clone(),
        };
        let target = self.module_dir.join(file_name);
        tokio::fs::rename(&artifact, &target).await?;

        Ok(CompiledModule {
            source: path.to_path_buf(),
            module_name,
            entry_class,
            path: target,
        })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

//! Execution Context: per-invocation state handed to every stage.
//!
//! Nothing in here is process-wide. The working directory replaces the
//! process cwd as the root for stage-local outputs, and `env` only ever
//! reaches the spawned child.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FetpypeError, Result};

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Root of stage-local output directories (`recon/`, `seg/out/`, ...)
    pub working_dir: PathBuf,
    /// Child-only environment overlay, applied after stage settings
    pub env: BTreeMap<String, String>,
    pub trace_id: String,
    /// Mirror container output lines on stdout as well as the log
    pub echo_to_terminal: bool,
}

impl ExecutionContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            echo_to_terminal: false,
        }
    }

    /// Context rooted at the current directory of the process.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| FetpypeError::io("read current directory", e))?;
        Ok(Self::new(cwd))
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_terminal_echo(mut self, echo: bool) -> Self {
        self.echo_to_terminal = echo;
        self
    }

    /// Path of a stage-local directory, without creating it.
    pub fn stage_dir(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(relative)
    }

    /// Path of a stage-local directory, created if absent.
    pub fn ensure_stage_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self.stage_dir(relative);
        fs::create_dir_all(&dir)
            .map_err(|e| FetpypeError::io(format!("create directory {}", dir.display()), e))?;
        Ok(dir)
    }
}

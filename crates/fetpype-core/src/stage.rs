//! Stage Trait: single contract shared by every pipeline stage
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ExecutionContext;
use crate::data_model::{DeclaredOutput, StageInvocation};
use crate::error::Result;

/// Stage families, each with its own placeholder vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Preprocessing,
    Reconstruction,
    Segmentation,
    Surface,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Preprocessing => "preprocessing",
            StageKind::Reconstruction => "reconstruction",
            StageKind::Segmentation => "segmentation",
            StageKind::Surface => "surface",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an invocation is in its lifecycle. Every invocation starts over
/// from `Validated`; none is resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Validated,
    PathsResolved,
    Rendered,
    Executed,
    Succeeded,
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Validated => "validated",
            StageState::PathsResolved => "paths_resolved",
            StageState::Rendered => "rendered",
            StageState::Executed => "executed",
            StageState::Succeeded => "succeeded",
            StageState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of planning: either a command to run, or inputs handed through
/// untouched because the step is disabled.
#[derive(Debug, Clone)]
pub enum StagePlan {
    Run(StageInvocation),
    PassThrough(Vec<DeclaredOutput>),
}

/// Contract of a container-backed pipeline stage
pub trait Stage: Send + Sync {
    /// Node name (e.g. "denoising", "nesvor", "bounti")
    fn id(&self) -> &str;

    fn kind(&self) -> StageKind;

    /// Validate the template, resolve paths and mounts, render the command.
    ///
    /// Must fail before touching the filesystem when the template is invalid.
    fn plan(&self, ctx: &ExecutionContext) -> Result<StagePlan>;
}

//! Stage Runner: plans one stage, executes it, and records what happened
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::container::ContainerKind;
use crate::context::ExecutionContext;
use crate::data_model::{DeclaredOutput, PathGroup};
use crate::error::Result;
use crate::executor::{check_outputs_exist, ContainerExecutor};
use crate::stage::{Stage, StageKind, StagePlan, StageState};

/// Audit line for one executed invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub engine: String,
    pub stage_id: String,
    pub stage: StageKind,
    pub container: ContainerKind,
    pub trace_id: String,
    /// blake3 of the rendered command; identical inputs give identical hashes
    pub command_hash: String,
    pub exit_code: i32,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub outputs: Vec<DeclaredOutput>,
    /// None when the stage was disabled and passed its inputs through
    pub record: Option<InvocationRecord>,
}

impl StageOutcome {
    /// First declared output, the one handed to downstream stages.
    pub fn primary(&self) -> Option<&PathGroup> {
        self.outputs.first().map(|o| &o.paths)
    }

    pub fn output(&self, tag: &str) -> Option<&PathGroup> {
        self.outputs.iter().find(|o| o.tag == tag).map(|o| &o.paths)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageRunner {
    prefix: String,
}

impl StageRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every streamed container line (e.g. with a subject id)
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn run(&self, stage: &dyn Stage, ctx: &ExecutionContext) -> Result<StageOutcome> {
        let span = info_span!(
            "stage",
            id = stage.id(),
            kind = %stage.kind(),
            trace_id = %ctx.trace_id
        );
        let _enter = span.enter();

        let invocation = match stage.plan(ctx) {
            Ok(StagePlan::Run(invocation)) => invocation,
            Ok(StagePlan::PassThrough(outputs)) => {
                info!("step disabled, passing inputs through");
                return Ok(StageOutcome {
                    outputs,
                    record: None,
                });
            }
            Err(e) => {
                warn!(state = %StageState::Failed, error = %e, "planning failed");
                return Err(e);
            }
        };

        // stage settings first, the context overlay wins
        let executor = ContainerExecutor::new()
            .echo_to_terminal(ctx.echo_to_terminal)
            .with_prefix(self.prefix.clone())
            .envs(invocation.env.iter().cloned())
            .envs(ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let started_at = Utc::now();
        let start = Instant::now();
        let result = executor.execute(&invocation.command);
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(state = %StageState::Failed, error = %e, "container call failed");
                return Err(e);
            }
        };
        debug!(state = %StageState::Executed, latency_ms);

        if invocation.check_outputs {
            let expected = invocation.outputs.iter().flat_map(|o| o.paths.iter());
            if let Err(e) = check_outputs_exist(expected) {
                warn!(state = %StageState::Failed, error = %e, "declared output missing");
                return Err(e);
            }
        }
        info!(state = %StageState::Succeeded, latency_ms, "stage finished");

        let record = InvocationRecord {
            engine: format!("fetpype@{}", crate::FETPYPE_VERSION),
            stage_id: stage.id().to_string(),
            stage: invocation.stage,
            container: invocation.container,
            trace_id: ctx.trace_id.clone(),
            command_hash: hash_command(&invocation.command),
            exit_code: result.exit_code,
            latency_ms,
            started_at,
        };

        Ok(StageOutcome {
            outputs: invocation.outputs,
            record: Some(record),
        })
    }
}

/// Fingerprint of a rendered command
pub fn hash_command(command: &str) -> String {
    format!("blake3:{}", blake3::hash(command.as_bytes()))
}

/// Log a lifecycle transition inside the current stage span
pub fn trace_state(state: StageState) {
    debug!(state = %state, "stage transition");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::StageInvocation;
    use crate::error::FetpypeError;
    use std::path::PathBuf;

    struct FixedStage {
        command: String,
        output: PathBuf,
        check: bool,
    }

    impl Stage for FixedStage {
        fn id(&self) -> &str {
            "fixed"
        }

        fn kind(&self) -> StageKind {
            StageKind::Preprocessing
        }

        fn plan(&self, _ctx: &ExecutionContext) -> Result<StagePlan> {
            Ok(StagePlan::Run(StageInvocation {
                stage: StageKind::Preprocessing,
                command: self.command.clone(),
                container: ContainerKind::Host,
                outputs: vec![DeclaredOutput::new(
                    "output_stacks",
                    PathGroup::single(&self.output),
                )],
                check_outputs: self.check,
                env: vec![("FETPYPE_STAGE_VAR".to_string(), "stage".to_string())],
            }))
        }
    }

    #[test]
    fn test_run_records_invocation() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("out.nii.gz");
        let stage = FixedStage {
            command: format!("touch {}", output.display()),
            output: output.clone(),
            check: true,
        };
        let ctx = ExecutionContext::new(tmp.path());

        let outcome = StageRunner::new().run(&stage, &ctx).unwrap();

        assert_eq!(outcome.primary(), Some(&PathGroup::single(&output)));
        let record = outcome.record.unwrap();
        assert_eq!(record.exit_code, 0);
        assert_eq!(record.command_hash, hash_command(&stage.command));
        assert_eq!(record.trace_id, ctx.trace_id);
    }

    #[test]
    fn test_run_checks_declared_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = FixedStage {
            command: "true".to_string(),
            output: tmp.path().join("missing.nii.gz"),
            check: true,
        };
        let err = StageRunner::new()
            .run(&stage, &ExecutionContext::new(tmp.path()))
            .unwrap_err();
        assert!(matches!(err, FetpypeError::PostconditionError { .. }));
    }

    #[test]
    fn test_context_env_overrides_stage_env() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("env.txt");
        let stage = FixedStage {
            command: format!("echo $FETPYPE_STAGE_VAR > {}", output.display()),
            output: output.clone(),
            check: false,
        };
        let ctx = ExecutionContext::new(tmp.path()).with_env("FETPYPE_STAGE_VAR", "context");

        StageRunner::new().run(&stage, &ctx).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written.trim(), "context");
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_command("echo a"), hash_command("echo a"));
        assert_ne!(hash_command("echo a"), hash_command("echo b"));
    }
}

//! Unified Error Model
//!
//! Every failure the core can produce, from template validation to the
//! post-run output check. Callers match on the variant instead of parsing
//! messages.
use std::path::PathBuf;
use thiserror::Error;

use crate::stage::StageKind;

#[derive(Error, Debug)]
pub enum FetpypeError {
    #[error("TEMPLATE/UNKNOWN_TAG: invalid tag <{tag}> in command {template}")]
    UnknownTag { tag: String, template: String },

    #[error("TEMPLATE/MISSING_MOUNT: docker command must have a <mount> tag: {template}")]
    MissingMountTag { template: String },

    #[error("TEMPLATE/NO_OUTPUT: {stage} command declares none of {expected}: {template}")]
    NoDeclaredOutput {
        stage: StageKind,
        expected: String,
        template: String,
    },

    #[error("PATH/UNSUPPORTED: {0}")]
    UnsupportedPathType(String),

    #[error("PATH/EMPTY_LIST: cannot resolve a directory from an empty path list")]
    EmptyPathList,

    #[error("TEMPLATE/INCOMPLETE: no value for <{tag}> while rendering {template}")]
    IncompleteRender { tag: String, template: String },

    #[error("META/READ: cannot read metadata of {}: {source}", path.display())]
    MetadataReadError {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(
        "EXEC/FAILED: container call failed with exit code {exit_code}.\nCommand: {command}\nOutput:\n{}",
        display_output(output)
    )]
    ContainerExecutionError {
        exit_code: i32,
        command: String,
        output: String,
    },

    #[error("EXEC/POSTCONDITION: declared output {} does not exist after execution", path.display())]
    PostconditionError { path: PathBuf },

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("INPUT/{0}")]
    InvalidInput(String),

    #[error("IO/{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn display_output(output: &str) -> &str {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        "<<no output>>"
    } else {
        trimmed
    }
}

impl FetpypeError {
    /// Wrap an I/O failure with a short description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for the errors raised before any filesystem or process side effect
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownTag { .. } | Self::MissingMountTag { .. } | Self::NoDeclaredOutput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FetpypeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_carries_command_and_output() {
        let err = FetpypeError::ContainerExecutionError {
            exit_code: 2,
            command: "docker run img tool".to_string(),
            output: "line one\nline two\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("docker run img tool"));
        assert!(msg.contains("line one\nline two"));
    }

    #[test]
    fn test_execution_error_without_output() {
        let err = FetpypeError::ContainerExecutionError {
            exit_code: 1,
            command: "false".to_string(),
            output: String::new(),
        };
        assert!(err.to_string().contains("<<no output>>"));
    }

    #[test]
    fn test_validation_classification() {
        let err = FetpypeError::MissingMountTag {
            template: "docker run img".to_string(),
        };
        assert!(err.is_validation());
        assert!(!FetpypeError::EmptyPathList.is_validation());
    }
}

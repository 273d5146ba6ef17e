//! Data Model: PathGroup, StageInvocation, ExecResult
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::container::ContainerKind;
use crate::error::{FetpypeError, Result};
use crate::stage::StageKind;

/// One logical input or output: a bare path or an ordered list of paths.
///
/// The variant is remembered so a stage can hand its outputs back in the
/// same shape the caller used for its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathGroup {
    Single(PathBuf),
    List(Vec<PathBuf>),
}

impl PathGroup {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        PathGroup::Single(path.into())
    }

    pub fn list<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        PathGroup::List(paths.into_iter().map(Into::into).collect())
    }

    /// Build a group from loosely typed workflow input.
    ///
    /// Accepts a string or an array of strings; anything else is
    /// `UnsupportedPathType`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(PathGroup::single(s)),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(PathBuf::from(s)),
                    other => Err(FetpypeError::UnsupportedPathType(format!(
                        "list entries must be path strings, got {}",
                        value_kind(other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(PathGroup::List),
            other => Err(FetpypeError::UnsupportedPathType(format!(
                "expected a path string or a list of path strings, got {}",
                value_kind(other)
            ))),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, PathGroup::Single(_))
    }

    pub fn len(&self) -> usize {
        match self {
            PathGroup::Single(_) => 1,
            PathGroup::List(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        let paths: &[PathBuf] = match self {
            PathGroup::Single(path) => std::slice::from_ref(path),
            PathGroup::List(paths) => paths,
        };
        paths.iter().map(PathBuf::as_path)
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.iter().map(Path::to_path_buf).collect()
    }

    /// Map every path while keeping the bare/list shape.
    pub fn map_paths<F>(&self, mut f: F) -> PathGroup
    where
        F: FnMut(&Path) -> PathBuf,
    {
        match self {
            PathGroup::Single(path) => PathGroup::Single(f(path.as_path())),
            PathGroup::List(paths) => PathGroup::List(paths.iter().map(|p| f(p.as_path())).collect()),
        }
    }

    /// Unwrap a bare path or a one-element list.
    pub fn into_single(self, what: &str) -> Result<PathBuf> {
        match self {
            PathGroup::Single(path) => Ok(path),
            PathGroup::List(mut paths) if paths.len() == 1 => Ok(paths.remove(0)),
            PathGroup::List(paths) => Err(FetpypeError::InvalidInput(format!(
                "{} must be a single path, got a list of {} elements",
                what,
                paths.len()
            ))),
        }
    }

    /// Paths joined by single spaces, the way tools take repeated arguments.
    pub fn join(&self, sep: &str) -> String {
        self.iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

impl From<PathBuf> for PathGroup {
    fn from(path: PathBuf) -> Self {
        PathGroup::Single(path)
    }
}

impl From<&str> for PathGroup {
    fn from(path: &str) -> Self {
        PathGroup::single(path)
    }
}

impl From<Vec<PathBuf>> for PathGroup {
    fn from(paths: Vec<PathBuf>) -> Self {
        PathGroup::List(paths)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// An output a stage promises to produce, keyed by the placeholder that
/// declared it (e.g. "output_stacks", "output_volume").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredOutput {
    pub tag: String,
    pub paths: PathGroup,
}

impl DeclaredOutput {
    pub fn new(tag: impl Into<String>, paths: PathGroup) -> Self {
        Self {
            tag: tag.into(),
            paths,
        }
    }
}

/// Fully resolved unit of work, discarded after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInvocation {
    pub stage: StageKind,
    /// Rendered shell command with every placeholder substituted
    pub command: String,
    pub container: ContainerKind,
    /// Outputs in declaration order; the first is the primary one
    pub outputs: Vec<DeclaredOutput>,
    /// Assert the declared output files exist once the child exits
    pub check_outputs: bool,
    /// Variables set only in the child process environment
    pub env: Vec<(String, String)>,
}

/// What a finished child process reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    /// Combined stdout and stderr, one line per child line
    pub output: String,
    pub success: bool,
}

impl ExecResult {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_accepts_string_and_list() {
        let single = PathGroup::from_value(&json!("/data/a.nii.gz")).unwrap();
        assert_eq!(single, PathGroup::single("/data/a.nii.gz"));

        let list = PathGroup::from_value(&json!(["/data/a.nii.gz", "/data/b.nii.gz"])).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!list.is_single());
    }

    #[test]
    fn test_from_value_rejects_other_types() {
        let err = PathGroup::from_value(&json!(42)).unwrap_err();
        assert!(matches!(err, FetpypeError::UnsupportedPathType(_)));

        let err = PathGroup::from_value(&json!(["/data/a.nii.gz", 3])).unwrap_err();
        assert!(matches!(err, FetpypeError::UnsupportedPathType(_)));
    }

    #[test]
    fn test_map_paths_keeps_shape() {
        let single = PathGroup::single("/in/a.nii.gz");
        let mapped = single.map_paths(|p| Path::new("/out").join(p.file_name().unwrap()));
        assert_eq!(mapped, PathGroup::single("/out/a.nii.gz"));

        let list = PathGroup::list(["/in/a.nii.gz"]);
        let mapped = list.map_paths(|p| Path::new("/out").join(p.file_name().unwrap()));
        assert_eq!(mapped, PathGroup::list(["/out/a.nii.gz"]));
    }

    #[test]
    fn test_into_single() {
        assert_eq!(
            PathGroup::list(["/a.nii.gz"]).into_single("input").unwrap(),
            PathBuf::from("/a.nii.gz")
        );
        let err = PathGroup::list(["/a.nii.gz", "/b.nii.gz"])
            .into_single("input")
            .unwrap_err();
        assert!(matches!(err, FetpypeError::InvalidInput(_)));
    }

    #[test]
    fn test_join() {
        let list = PathGroup::list(["/data/a.nii.gz", "/data/b.nii.gz"]);
        assert_eq!(list.join(" "), "/data/a.nii.gz /data/b.nii.gz");
    }
}

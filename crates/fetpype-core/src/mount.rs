//! Bind-mount resolution.
//!
//! Host directories are mounted at the identical path inside the container,
//! so every rendered path stays valid on both sides.

use std::fs;
use std::path::{Path, PathBuf};

use crate::data_model::PathGroup;
use crate::error::{FetpypeError, Result};
use crate::paths::resolve_directory;

/// Ordered, deduplicated set of host directories to bind-mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountSpec {
    dirs: Vec<PathBuf>,
}

impl MountSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory; returns false when it was already present.
    pub fn add(&mut self, dir: impl AsRef<Path>) -> bool {
        // "/data/" and "/data" are the same mount
        let dir: PathBuf = dir.as_ref().components().collect();
        if self.dirs.contains(&dir) {
            return false;
        }
        self.dirs.push(dir);
        true
    }

    /// Add the directory that holds a path group.
    pub fn add_group(&mut self, group: &PathGroup) -> Result<()> {
        let dir = resolve_directory(group)?;
        self.add(dir);
        Ok(())
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Create every directory, then render `-v dir:dir` arguments.
    pub fn to_mount_arg(&self) -> Result<String> {
        for dir in &self.dirs {
            fs::create_dir_all(dir).map_err(|e| {
                FetpypeError::io(format!("create mount directory {}", dir.display()), e)
            })?;
        }
        Ok(self
            .dirs
            .iter()
            .map(|dir| format!("-v {0}:{0}", dir.display()))
            .collect::<Vec<_>>()
            .join(" "))
    }
}

impl<P: AsRef<Path>> FromIterator<P> for MountSpec {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut spec = MountSpec::new();
        for dir in iter {
            spec.add(dir);
        }
        spec
    }
}

/// Create `dirs` and render them as container bind-mount arguments.
pub fn build_mount_arg<I, P>(dirs: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    dirs.into_iter().collect::<MountSpec>().to_mount_arg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates_and_keeps_order() {
        let mut spec = MountSpec::new();
        assert!(spec.add("/out"));
        assert!(spec.add("/data"));
        assert!(!spec.add("/out/"));
        assert_eq!(spec.dirs(), &[PathBuf::from("/out"), PathBuf::from("/data")]);
    }

    #[test]
    fn test_build_mount_arg_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let out = tmp.path().join("nested/out");

        let arg = build_mount_arg([&data, &out, &data]).unwrap();

        assert!(data.is_dir());
        assert!(out.is_dir());
        assert_eq!(
            arg,
            format!(
                "-v {0}:{0} -v {1}:{1}",
                data.display(),
                out.display()
            )
        );
    }

    #[test]
    fn test_add_group_uses_resolved_directory() {
        let mut spec = MountSpec::new();
        spec.add_group(&PathGroup::list(["/data/a.nii.gz", "/data/b.nii.gz"]))
            .unwrap();
        spec.add_group(&PathGroup::single("/data/c.nii.gz")).unwrap();
        assert_eq!(spec.dirs(), &[PathBuf::from("/data")]);
    }

    #[test]
    fn test_empty_spec_renders_empty_string() {
        assert_eq!(MountSpec::new().to_mount_arg().unwrap(), "");
    }
}

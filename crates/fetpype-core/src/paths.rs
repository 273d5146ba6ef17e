//! Directory resolution for path groups.
//!
//! Pure functions: nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::data_model::PathGroup;
use crate::error::{FetpypeError, Result};

/// Directory that holds a path group.
///
/// A bare path resolves to its parent. A list resolves to the deepest
/// directory shared by every entry's parent, compared component by
/// component so `/data/sub` and `/data/subject` share `/data`, not
/// `/data/sub`.
pub fn resolve_directory(group: &PathGroup) -> Result<PathBuf> {
    match group {
        PathGroup::Single(path) => Ok(parent_dir(path)),
        PathGroup::List(paths) => {
            let parents: Vec<PathBuf> = paths.iter().map(|p| parent_dir(p)).collect();
            common_path(&parents)
        }
    }
}

/// Same as [`resolve_directory`] for loosely typed workflow input.
pub fn resolve_value(value: &serde_json::Value) -> Result<PathBuf> {
    resolve_directory(&PathGroup::from_value(value)?)
}

/// Longest common ancestor of `paths`, respecting separator boundaries.
pub fn common_path<P: AsRef<Path>>(paths: &[P]) -> Result<PathBuf> {
    let (first, rest) = paths.split_first().ok_or(FetpypeError::EmptyPathList)?;
    let first = first.as_ref();
    let mut common: Vec<Component> = significant(first).collect();

    for path in rest {
        let path = path.as_ref();
        if path.is_absolute() != first.is_absolute() {
            return Err(FetpypeError::UnsupportedPathType(format!(
                "cannot mix absolute and relative paths: {} and {}",
                first.display(),
                path.display()
            )));
        }
        let shared = common
            .iter()
            .zip(significant(path))
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }

    Ok(common.into_iter().collect())
}

fn significant(path: &Path) -> impl Iterator<Item = Component<'_>> {
    path.components().filter(|c| !matches!(c, Component::CurDir))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

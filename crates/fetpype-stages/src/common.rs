//! Helpers shared by the stage adapters.
use fetpype_core::{ExecutionContext, FetpypeError, PathGroup, Result};
use fetpype_template::Tag;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffixes removed when deriving `<basename>` from a volume file name
pub const VOLUME_EXTENSIONS: [&str; 5] = [".gz", ".nii", ".mgz", ".mgh", ".nrrd"];

/// Values behind `<singularity_path>`, `<singularity_mount>`, `<singularity_home>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SingularitySettings {
    pub path: Option<String>,
    pub mount: Option<String>,
    pub home: Option<String>,
}

impl SingularitySettings {
    /// Value for a singularity tag, or a `Config` error naming the missing key.
    pub fn value(&self, tag: Tag) -> Result<String> {
        let (value, key) = match tag {
            Tag::SingularityPath => (&self.path, "singularity_path"),
            Tag::SingularityMount => (&self.mount, "singularity_mount"),
            Tag::SingularityHome => (&self.home, "singularity_home"),
            other => {
                return Err(FetpypeError::Config(format!(
                    "{} is not a singularity setting",
                    other
                )))
            }
        };
        value.clone().ok_or_else(|| {
            FetpypeError::Config(format!("{} found in the command, but {} is not set", tag, key))
        })
    }
}

/// File name with each recognized volume extension stripped once,
/// innermost last: `sub-01_T2w.nii.gz` → `sub-01_T2w`.
pub fn strip_volume_extensions(name: &str) -> &str {
    let mut stem = name;
    let mut remaining: Vec<&str> = VOLUME_EXTENSIONS.to_vec();
    while let Some(idx) = remaining.iter().position(|ext| stem.ends_with(ext) && stem.len() > ext.len()) {
        stem = &stem[..stem.len() - remaining[idx].len()];
        remaining.remove(idx);
    }
    stem
}

pub fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            FetpypeError::InvalidInput(format!("{} has no usable file name", path.display()))
        })
}

/// One output per input, in `dir`, named by `rename(input file name)`.
/// The result has the same bare/list shape as `inputs`.
pub fn outputs_in<F>(dir: &Path, inputs: &PathGroup, rename: F) -> Result<PathGroup>
where
    F: Fn(&str) -> String,
{
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs.iter() {
        outputs.push(dir.join(rename(file_name(input)?)));
    }
    Ok(match inputs {
        PathGroup::Single(_) => PathGroup::Single(outputs.remove(0)),
        PathGroup::List(_) => PathGroup::List(outputs),
    })
}

/// Copy a caller-supplied volume into a stage-local input directory so only
/// directories owned by the stage get mounted.
pub fn stage_input_copy(
    ctx: &ExecutionContext,
    relative_dir: &str,
    target_name: &str,
    source: &Path,
) -> Result<PathBuf> {
    let dir = ctx.ensure_stage_dir(relative_dir)?;
    let target = dir.join(target_name);
    if source != target {
        fs::copy(source, &target).map_err(|e| {
            FetpypeError::io(
                format!("copy {} to {}", source.display(), target.display()),
                e,
            )
        })?;
    }
    Ok(target)
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_volume_extensions() {
        assert_eq!(strip_volume_extensions("sub-01_T2w.nii.gz"), "sub-01_T2w");
        assert_eq!(strip_volume_extensions("sub-01_T2w.nii"), "sub-01_T2w");
        assert_eq!(strip_volume_extensions("recon.mgz"), "recon");
        assert_eq!(strip_volume_extensions("sub-01_rec-0.8mm.nii.gz"), "sub-01_rec-0.8mm");
        // each extension only once
        assert_eq!(strip_volume_extensions("a.nii.nii.gz"), "a.nii");
        assert_eq!(strip_volume_extensions("plain"), "plain");
    }

    #[test]
    fn test_singularity_value_missing_is_config_error() {
        let settings = SingularitySettings {
            path: Some("/images".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.value(Tag::SingularityPath).unwrap(), "/images");
        let err = settings.value(Tag::SingularityMount).unwrap_err();
        assert!(matches!(err, FetpypeError::Config(_)));
    }

    #[test]
    fn test_outputs_in_keeps_shape() {
        let out = Path::new("/work/denoising");
        let single = outputs_in(out, &PathGroup::single("/data/a.nii.gz"), str::to_string).unwrap();
        assert_eq!(single, PathGroup::single("/work/denoising/a.nii.gz"));

        let list = outputs_in(
            out,
            &PathGroup::list(["/data/a.nii.gz", "/data/b.nii.gz"]),
            str::to_string,
        )
        .unwrap();
        assert_eq!(
            list,
            PathGroup::list(["/work/denoising/a.nii.gz", "/work/denoising/b.nii.gz"])
        );
    }

    #[test]
    fn test_stage_input_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("srr.nii.gz");
        fs::write(&source, b"volume").unwrap();
        let ctx = ExecutionContext::new(tmp.path().join("work"));

        let copied = stage_input_copy(&ctx, "seg/input", "input_srr.nii.gz", &source).unwrap();

        assert_eq!(copied, tmp.path().join("work/seg/input/input_srr.nii.gz"));
        assert_eq!(fs::read(&copied).unwrap(), b"volume");
    }
}

use crate::common::{outputs_in, strip_volume_extensions, SingularitySettings};
use crate::config::PipelineConfig;
use fetpype_core::runner::trace_state;
use fetpype_core::{
    DeclaredOutput, ExecutionContext, FetpypeError, PathGroup, Result, Stage, StageInvocation,
    StageKind, StagePlan, StageState,
};
use fetpype_template::{validate_str, Tag, TagVocabulary, TemplateRenderer};
use std::path::PathBuf;

/// One container-backed preprocessing step (brain extraction, denoising,
/// bias correction, ...). Outputs land in `<working_dir>/<step name>`.
#[derive(Debug, Clone)]
pub struct PreprocessingStage {
    name: String,
    command: String,
    input_stacks: PathGroup,
    input_masks: Option<PathGroup>,
    enabled: bool,
    singularity: SingularitySettings,
    env: Vec<(String, String)>,
}

impl PreprocessingStage {
    pub fn new(name: impl Into<String>, command: impl Into<String>, input_stacks: PathGroup) -> Self {
        PreprocessingStage {
            name: name.into(),
            command: command.into(),
            input_stacks,
            input_masks: None,
            enabled: true,
            singularity: SingularitySettings::default(),
            env: Vec::new(),
        }
    }

    /// Build the step `name` from its configuration section.
    pub fn from_config(config: &PipelineConfig, name: &str, input_stacks: PathGroup) -> Result<Self> {
        let step = config.preprocessing_step(name)?;
        Ok(Self::new(name, step.command(config.container)?, input_stacks)
            .enabled(step.enabled)
            .with_singularity(config.singularity())
            .with_env(step.env_vars()))
    }

    pub fn with_masks(mut self, masks: PathGroup) -> Self {
        self.input_masks = Some(masks);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_singularity(mut self, settings: SingularitySettings) -> Self {
        self.singularity = settings;
        self
    }

    pub fn with_env(mut self, vars: Vec<(String, String)>) -> Self {
        self.env = vars;
        self
    }

    pub fn output_dir(&self, ctx: &ExecutionContext) -> PathBuf {
        ctx.stage_dir(&self.name)
    }

    pub fn output_stacks(&self, ctx: &ExecutionContext) -> Result<PathGroup> {
        outputs_in(&self.output_dir(ctx), &self.input_stacks, str::to_string)
    }

    pub fn output_masks(&self, ctx: &ExecutionContext) -> Result<PathGroup> {
        outputs_in(&self.output_dir(ctx), &self.input_stacks, mask_name)
    }
}

/// `sub-01_T2w.nii.gz` → `sub-01_mask.nii.gz`; names without `_T2w` get
/// `_mask` before the volume extension.
pub fn mask_name(file_name: &str) -> String {
    if file_name.contains("_T2w") {
        return file_name.replace("_T2w", "_mask");
    }
    let stem = strip_volume_extensions(file_name);
    format!("{}_mask{}", stem, &file_name[stem.len()..])
}

impl Stage for PreprocessingStage {
    fn id(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Preprocessing
    }

    fn plan(&self, ctx: &ExecutionContext) -> Result<StagePlan> {
        let template = validate_str(&self.command, &TagVocabulary::PREPROCESSING)?;
        trace_state(StageState::Validated);

        if !self.enabled {
            let mut outputs = vec![DeclaredOutput::new(
                Tag::OutputStacks.name(),
                self.input_stacks.clone(),
            )];
            if let Some(masks) = &self.input_masks {
                outputs.push(DeclaredOutput::new(Tag::OutputMasks.name(), masks.clone()));
            }
            return Ok(StagePlan::PassThrough(outputs));
        }

        if self.input_stacks.is_empty() {
            return Err(FetpypeError::EmptyPathList);
        }
        if template.uses(Tag::InputMasks) && self.input_masks.is_none() {
            return Err(FetpypeError::InvalidInput(format!(
                "step '{}' uses {} but no masks were given",
                self.name,
                Tag::InputMasks
            )));
        }

        let output_dir = self.output_dir(ctx);
        let stacks = self.output_stacks(ctx)?;
        let masks = self.output_masks(ctx)?;

        let mut outputs = Vec::new();
        if template.uses(Tag::OutputStacks) {
            outputs.push(DeclaredOutput::new(Tag::OutputStacks.name(), stacks.clone()));
        }
        if template.uses(Tag::OutputMasks) {
            outputs.push(DeclaredOutput::new(Tag::OutputMasks.name(), masks.clone()));
        }

        let mut renderer = TemplateRenderer::new(&template);
        renderer
            .set(Tag::InputStacks, self.input_stacks.join(" "))
            .set(Tag::OutputStacks, stacks.join(" "))
            .set(Tag::OutputMasks, masks.join(" "));
        renderer
            .set_with(Tag::InputMasks, || {
                Ok(self.input_masks.as_ref().map(|m| m.join(" ")).unwrap_or_default())
            })?
            .set_with(Tag::SingularityPath, || self.singularity.value(Tag::SingularityPath))?
            .set_with(Tag::SingularityMount, || self.singularity.value(Tag::SingularityMount))?;

        ctx.ensure_stage_dir(&self.name)?;
        trace_state(StageState::PathsResolved);

        // only groups the command refers to are mounted
        if template.uses(Tag::Mount) {
            if template.uses(Tag::InputStacks) {
                renderer.mount_group(&self.input_stacks)?;
            }
            if template.uses(Tag::InputMasks) {
                if let Some(masks) = &self.input_masks {
                    renderer.mount_group(masks)?;
                }
            }
            renderer.mount_dir(&output_dir);
        }

        let command = renderer.render()?;
        trace_state(StageState::Rendered);
        tracing::debug!(step = %self.name, output_dir = %output_dir.display(), "preprocessing planned");

        Ok(StagePlan::Run(StageInvocation {
            stage: StageKind::Preprocessing,
            container: template.container(),
            command,
            outputs,
            check_outputs: true,
            env: self.env.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(command: &str) -> PreprocessingStage {
        PreprocessingStage::new(
            "denoising",
            command,
            PathGroup::list(["/data/sub-01_run-1_T2w.nii.gz", "/data/sub-01_run-2_T2w.nii.gz"]),
        )
    }

    #[test]
    fn test_mask_name() {
        assert_eq!(mask_name("sub-01_T2w.nii.gz"), "sub-01_mask.nii.gz");
        assert_eq!(mask_name("stack1.nii.gz"), "stack1_mask.nii.gz");
        assert_eq!(mask_name("stack1.nii"), "stack1_mask.nii");
    }

    #[test]
    fn test_plan_renders_outputs_in_step_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let plan = stage("denoise <input_stacks> <output_stacks>").plan(&ctx).unwrap();

        let invocation = match plan {
            StagePlan::Run(invocation) => invocation,
            other => panic!("expected a run plan, got {other:?}"),
        };
        let out = tmp.path().join("denoising");
        assert_eq!(
            invocation.command,
            format!(
                "denoise /data/sub-01_run-1_T2w.nii.gz /data/sub-01_run-2_T2w.nii.gz {} {}",
                out.join("sub-01_run-1_T2w.nii.gz").display(),
                out.join("sub-01_run-2_T2w.nii.gz").display()
            )
        );
        assert!(out.is_dir());
        assert!(invocation.check_outputs);
        assert_eq!(invocation.outputs.len(), 1);
        assert_eq!(invocation.outputs[0].tag, "output_stacks");
    }

    #[test]
    fn test_masks_only_step() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let plan = stage("bet <input_stacks> <output_masks>").plan(&ctx).unwrap();
        let StagePlan::Run(invocation) = plan else {
            panic!("expected a run plan");
        };
        assert_eq!(invocation.outputs[0].tag, "output_masks");
        assert!(invocation.command.contains("sub-01_run-1_mask.nii.gz"));
    }

    #[test]
    fn test_bare_input_keeps_bare_output() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let step = PreprocessingStage::new(
            "cropping",
            "crop <input_stacks> <output_stacks>",
            PathGroup::single("/data/a.nii.gz"),
        );
        let StagePlan::Run(invocation) = step.plan(&ctx).unwrap() else {
            panic!("expected a run plan");
        };
        assert_eq!(
            invocation.outputs[0].paths,
            PathGroup::single(tmp.path().join("cropping/a.nii.gz"))
        );
    }

    #[test]
    fn test_missing_output_tag_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let err = stage("denoise <input_stacks>").plan(&ctx).unwrap_err();
        assert!(matches!(err, FetpypeError::NoDeclaredOutput { .. }));
        assert!(!tmp.path().join("denoising").exists());
    }

    #[test]
    fn test_disabled_step_passes_inputs_through() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let step = stage("denoise <input_stacks> <output_stacks>").enabled(false);
        match step.plan(&ctx).unwrap() {
            StagePlan::PassThrough(outputs) => {
                assert_eq!(outputs[0].paths, step.input_stacks);
            }
            other => panic!("expected pass-through, got {other:?}"),
        }
        assert!(!tmp.path().join("denoising").exists());
    }

    #[test]
    fn test_disabled_step_still_validates() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let err = stage("denoise <input_stacks> <outptu_stacks>")
            .enabled(false)
            .plan(&ctx)
            .unwrap_err();
        assert!(matches!(err, FetpypeError::UnknownTag { .. }));
    }

    #[test]
    fn test_input_masks_required_when_used() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let err = stage("bias <input_stacks> <input_masks> <output_stacks>")
            .plan(&ctx)
            .unwrap_err();
        assert!(matches!(err, FetpypeError::InvalidInput(_)));
    }

    #[test]
    fn test_unreferenced_masks_are_not_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path().join("work"));
        let masks_dir = tmp.path().join("masks");
        let step = PreprocessingStage::new(
            "denoising",
            "docker run <mount> utils denoise <input_stacks> <output_stacks>",
            PathGroup::list([tmp.path().join("data/a.nii.gz")]),
        )
        .with_masks(PathGroup::list([masks_dir.join("a_mask.nii.gz")]));

        let StagePlan::Run(invocation) = step.plan(&ctx).unwrap() else {
            panic!("expected a run plan");
        };
        assert!(!invocation.command.contains(&masks_dir.display().to_string()));
        assert!(!masks_dir.exists());
    }

    #[test]
    fn test_missing_singularity_setting_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let err = stage("singularity exec <singularity_mount> utils.sif denoise <input_stacks> <output_stacks>")
            .plan(&ctx)
            .unwrap_err();
        assert!(matches!(err, FetpypeError::Config(_)));
        assert!(!tmp.path().join("denoising").exists());
    }

    #[test]
    fn test_singularity_path_required_when_used() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(tmp.path());
        let err = stage("singularity exec <singularity_path>/utils.sif denoise <input_stacks> <output_stacks>")
            .plan(&ctx)
            .unwrap_err();
        assert!(matches!(err, FetpypeError::Config(_)));
    }
}

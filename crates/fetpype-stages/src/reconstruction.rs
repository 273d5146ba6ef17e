use crate::common::{display, SingularitySettings};
use crate::config::{PipelineConfig, Scalar};
use crate::nifti::{format_thickness, mean_slice_thickness};
use fetpype_core::runner::trace_state;
use fetpype_core::{
    resolve_directory, DeclaredOutput, ExecutionContext, FetpypeError, PathGroup, Result, Stage,
    StageInvocation, StageKind, StagePlan, StageState,
};
use fetpype_template::{validate_str, Tag, TagVocabulary, TemplateRenderer};
use std::path::PathBuf;

const OUTPUT_DIR: &str = "recon";
const DEFAULT_OUTPUT: &str = "recon.nii.gz";

/// Super-resolution reconstruction of the preprocessed stacks into one
/// volume under `<working_dir>/recon`.
#[derive(Debug, Clone)]
pub struct ReconstructionStage {
    id: String,
    command: String,
    input_stacks: PathGroup,
    input_masks: PathGroup,
    output_resolution: Option<Scalar>,
    path_to_output: Option<String>,
    singularity: SingularitySettings,
    env: Vec<(String, String)>,
}

impl ReconstructionStage {
    pub fn new(command: impl Into<String>, input_stacks: PathGroup, input_masks: PathGroup) -> Self {
        ReconstructionStage {
            id: "reconstruction".to_string(),
            command: command.into(),
            input_stacks,
            input_masks,
            output_resolution: None,
            path_to_output: None,
            singularity: SingularitySettings::default(),
            env: Vec::new(),
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        input_stacks: PathGroup,
        input_masks: PathGroup,
    ) -> Result<Self> {
        let section = config.reconstruction()?;
        let mut stage = Self::new(section.command(config.container)?, input_stacks, input_masks)
            .with_singularity(config.singularity())
            .with_env(section.env_vars());
        if let Some(pipeline) = &section.pipeline {
            stage.id = pipeline.clone();
        }
        stage.output_resolution = section.output_resolution.clone();
        stage.path_to_output = section.path_to_output.clone();
        Ok(stage)
    }

    pub fn with_output_resolution(mut self, resolution: Scalar) -> Self {
        self.output_resolution = Some(resolution);
        self
    }

    pub fn with_path_to_output(mut self, path: impl Into<String>) -> Self {
        self.path_to_output = Some(path.into());
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

    /// Output volume, given whether the template writes into `<output_dir>`.
    fn output_volume(&self, ctx: &ExecutionContext, uses_output_dir: bool) -> Result<PathBuf> {
        let dir = ctx.stage_dir(OUTPUT_DIR);
        if !uses_output_dir {
            return Ok(dir.join(DEFAULT_OUTPUT));
        }
        let name = self.path_to_output.as_deref().ok_or_else(|| {
            FetpypeError::Config(format!(
                "{} found in the command, but path_to_output is not set",
                Tag::OutputDir
            ))
        })?;
        Ok(dir.join(name))
    }
}

impl Stage for ReconstructionStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Reconstruction
    }

    fn plan(&self, ctx: &ExecutionContext) -> Result<StagePlan> {
        let template = validate_str(&self.command, &TagVocabulary::RECONSTRUCTION)?;
        trace_state(StageState::Validated);

        let output_volume = self.output_volume(ctx, template.uses(Tag::OutputDir))?;
        let output_dir = ctx.stage_dir(OUTPUT_DIR);

        let mut renderer = TemplateRenderer::new(&template);
        renderer
            .set(Tag::InputStacks, self.input_stacks.join(" "))
            .set(Tag::InputMasks, self.input_masks.join(" "))
            .set(Tag::OutputVolume, display(&output_volume))
            .set(Tag::OutputDir, display(&output_dir));
        renderer
            .set_with(Tag::InputDir, || Ok(display(&resolve_directory(&self.input_stacks)?)))?
            .set_with(Tag::InputMasksDir, || Ok(display(&resolve_directory(&self.input_masks)?)))?
            .set_with(Tag::InputTp, || {
                mean_slice_thickness(self.input_stacks.iter()).map(format_thickness)
            })?
            .set_with(Tag::OutputRes, || {
                self.output_resolution
                    .as_ref()
                    .map(|r| r.to_string())
                    .ok_or_else(|| {
                        FetpypeError::Config(format!(
                            "{} found in the command, but output_resolution is not set",
                            Tag::OutputRes
                        ))
                    })
            })?
            .set_with(Tag::SingularityPath, || self.singularity.value(Tag::SingularityPath))?
            .set_with(Tag::SingularityMount, || self.singularity.value(Tag::SingularityMount))?;

        ctx.ensure_stage_dir(OUTPUT_DIR)?;
        trace_state(StageState::PathsResolved);

        // only groups the command refers to are mounted
        if template.uses(Tag::Mount) {
            if template.uses(Tag::InputStacks) || template.uses(Tag::InputDir) {
                renderer.mount_group(&self.input_stacks)?;
            }
            if template.uses(Tag::InputMasks) || template.uses(Tag::InputMasksDir) {
                renderer.mount_group(&self.input_masks)?;
            }
            if template.uses(Tag::OutputVolume) || template.uses(Tag::OutputDir) {
                renderer.mount_dir(&output_dir);
            }
        }

        let command = renderer.render()?;
        trace_state(StageState::Rendered);

        Ok(StagePlan::Run(StageInvocation {
            stage: StageKind::Reconstruction,
            container: template.container(),
            command,
            outputs: vec![DeclaredOutput::new(
                Tag::OutputVolume.name(),
                PathGroup::single(output_volume),
            )],
            check_outputs: false,
            env: self.env.clone(),
        }))
    }
}

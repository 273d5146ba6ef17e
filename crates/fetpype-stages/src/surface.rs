use crate::common::{display, stage_input_copy, SingularitySettings};
use crate::config::PipelineConfig;
use fetpype_core::runner::trace_state;
use fetpype_core::{
    DeclaredOutput, ExecutionContext, FetpypeError, PathGroup, Result, Stage, StageInvocation,
    StageKind, StagePlan, StageState,
};
use fetpype_template::{validate_str, Tag, TagVocabulary, TemplateRenderer};

const INPUT_DIR: &str = "surf/input";
const INPUT_NAME: &str = "input_seg.nii.gz";
const OUTPUT_DIR: &str = "surf/out";
const OUTPUT_NAME: &str = "surf.stl";

/// Surface extraction from a segmentation, restricted to the labels of
/// the selected labelling scheme.
#[derive(Debug, Clone)]
pub struct SurfaceStage {
    id: String,
    command: String,
    input_seg: PathGroup,
    /// Comma-separated labels for `<labelling_scheme>`
    labels: Option<String>,
    singularity: SingularitySettings,
    env: Vec<(String, String)>,
}

impl SurfaceStage {
    pub fn new(command: impl Into<String>, input_seg: PathGroup) -> Self {
        SurfaceStage {
            id: "surface".to_string(),
            command: command.into(),
            input_seg,
            labels: None,
            singularity: SingularitySettings::default(),
            env: Vec::new(),
        }
    }

    /// Fails when `use_scheme` is missing from `labelling_scheme`, even if
    /// the command never asks for the labels.
    pub fn from_config(config: &PipelineConfig, input_seg: PathGroup) -> Result<Self> {
        let section = config.surface()?;
        let mut stage = Self::new(section.command(config.container)?, input_seg)
            .with_singularity(config.singularity())
            .with_env(section.env_vars());
        if section.use_scheme.is_some() {
            stage.labels = Some(section.labels()?);
        }
        if let Some(pipeline) = &section.pipeline {
            stage.id = pipeline.clone();
        }
        Ok(stage)
    }

    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: ToString,
    {
        let labels: Vec<String> = labels.into_iter().map(|l| l.to_string()).collect();
        self.labels = Some(labels.join(","));
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
}

impl Stage for SurfaceStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Surface
    }

    fn plan(&self, ctx: &ExecutionContext) -> Result<StagePlan> {
        let template = validate_str(&self.command, &TagVocabulary::SURFACE)?;
        trace_state(StageState::Validated);

        let input = self.input_seg.clone().into_single("surface input segmentation")?;
        if template.uses(Tag::LabellingScheme) && self.labels.is_none() {
            return Err(FetpypeError::Config(format!(
                "{} found in the command, but no labelling scheme is selected",
                Tag::LabellingScheme
            )));
        }

        let input_dir = ctx.stage_dir(INPUT_DIR);
        let copied = input_dir.join(INPUT_NAME);
        let output_dir = ctx.stage_dir(OUTPUT_DIR);
        let output_surf = output_dir.join(OUTPUT_NAME);

        let mut renderer = TemplateRenderer::new(&template);
        renderer
            .set(Tag::InputSeg, display(&copied))
            .set(Tag::OutputSurf, display(&output_surf));
        if let Some(labels) = &self.labels {
            renderer.set(Tag::LabellingScheme, labels.as_str());
        }
        renderer
            .set_with(Tag::SingularityPath, || self.singularity.value(Tag::SingularityPath))?
            .set_with(Tag::SingularityMount, || self.singularity.value(Tag::SingularityMount))?
            .set_with(Tag::SingularityHome, || self.singularity.value(Tag::SingularityHome))?;

        stage_input_copy(ctx, INPUT_DIR, INPUT_NAME, &input)?;
        ctx.ensure_stage_dir(OUTPUT_DIR)?;
        trace_state(StageState::PathsResolved);

        if template.uses(Tag::Mount) {
            if template.uses(Tag::InputSeg) {
                renderer.mount_dir(&input_dir);
            }
            if template.uses(Tag::OutputSurf) {
                renderer.mount_dir(&output_dir);
            }
        }

        let command = renderer.render()?;
        trace_state(StageState::Rendered);

        let outputs = match &self.input_seg {
            PathGroup::Single(_) => PathGroup::single(output_surf),
            PathGroup::List(_) => PathGroup::list([output_surf]),
        };

        Ok(StagePlan::Run(StageInvocation {
            stage: StageKind::Surface,
            container: template.container(),
            command,
            outputs: vec![DeclaredOutput::new(Tag::OutputSurf.name(), outputs)],
            check_outputs: false,
            env: self.env.clone(),
        }))
    }
}

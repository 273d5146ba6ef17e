use crate::common::{display, file_name, stage_input_copy, strip_volume_extensions, SingularitySettings};
use crate::config::PipelineConfig;
use fetpype_core::runner::trace_state;
use fetpype_core::{
    DeclaredOutput, ExecutionContext, FetpypeError, PathGroup, Result, Stage, StageInvocation,
    StageKind, StagePlan, StageState,
};
use fetpype_template::{validate_str, Tag, TagVocabulary, TemplateRenderer};

const INPUT_DIR: &str = "seg/input";
const INPUT_NAME: &str = "input_srr.nii.gz";
const OUTPUT_DIR: &str = "seg/out";
const DEFAULT_OUTPUT: &str = "seg.nii.gz";

/// Segmentation of a reconstructed volume. The volume is copied into
/// `<working_dir>/seg/input` first so only stage-owned directories are
/// mounted.
#[derive(Debug, Clone)]
pub struct SegmentationStage {
    id: String,
    command: String,
    input_volume: PathGroup,
    gestational_age: Option<String>,
    path_to_output: Option<String>,
    singularity: SingularitySettings,
    env: Vec<(String, String)>,
}

impl SegmentationStage {
    pub fn new(command: impl Into<String>, input_volume: PathGroup) -> Self {
        SegmentationStage {
            id: "segmentation".to_string(),
            command: command.into(),
            input_volume,
            gestational_age: None,
            path_to_output: None,
            singularity: SingularitySettings::default(),
            env: Vec::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig, input_volume: PathGroup) -> Result<Self> {
        let section = config.segmentation()?;
        let mut stage = Self::new(section.command(config.container)?, input_volume)
            .with_singularity(config.singularity())
            .with_env(section.env_vars());
        if let Some(pipeline) = &section.pipeline {
            stage.id = pipeline.clone();
        }
        stage.path_to_output = section.path_to_output.clone();
        Ok(stage)
    }

    /// Gestational age in weeks, as handed over by the dataset layer.
    pub fn with_gestational_age(mut self, weeks: impl ToString) -> Self {
        self.gestational_age = Some(weeks.to_string());
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

    /// Output file name, with any `<basename>` in `path_to_output` filled in.
    fn output_name(&self, uses_output_dir: bool, basename: &str) -> Result<String> {
        if !uses_output_dir {
            return Ok(DEFAULT_OUTPUT.to_string());
        }
        let pattern = self.path_to_output.as_deref().ok_or_else(|| {
            FetpypeError::Config(format!(
                "{} found in the command, but path_to_output is not set",
                Tag::OutputDir
            ))
        })?;
        let name_template = validate_str(pattern, &TagVocabulary::OUTPUT_NAME)?;
        let mut renderer = TemplateRenderer::new(&name_template);
        renderer.set(Tag::Basename, basename);
        renderer.render()
    }
}

impl Stage for SegmentationStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StageKind {
        StageKind::Segmentation
    }

    fn plan(&self, ctx: &ExecutionContext) -> Result<StagePlan> {
        let template = validate_str(&self.command, &TagVocabulary::SEGMENTATION)?;
        trace_state(StageState::Validated);

        let input = self.input_volume.clone().into_single("segmentation input volume")?;
        let basename = strip_volume_extensions(file_name(&input)?).to_string();
        let output_name = self.output_name(template.uses(Tag::OutputDir), &basename)?;
        if template.uses(Tag::GestationalAge) && self.gestational_age.is_none() {
            return Err(FetpypeError::Config(format!(
                "{} found in the command, but no gestational age was given",
                Tag::GestationalAge
            )));
        }

        let input_dir = ctx.stage_dir(INPUT_DIR);
        let copied = input_dir.join(INPUT_NAME);
        let output_dir = ctx.stage_dir(OUTPUT_DIR);
        let output_seg = output_dir.join(output_name);

        let mut renderer = TemplateRenderer::new(&template);
        renderer
            .set(Tag::InputVolume, display(&copied))
            .set(Tag::InputSrr, display(&copied))
            .set(Tag::InputDir, display(&input_dir))
            .set(Tag::OutputDir, display(&output_dir))
            .set(Tag::OutputSeg, display(&output_seg))
            .set(Tag::Basename, basename.as_str());
        if let Some(age) = &self.gestational_age {
            renderer.set(Tag::GestationalAge, age.as_str());
        }
        renderer
            .set_with(Tag::SingularityPath, || self.singularity.value(Tag::SingularityPath))?
            .set_with(Tag::SingularityMount, || self.singularity.value(Tag::SingularityMount))?;

        stage_input_copy(ctx, INPUT_DIR, INPUT_NAME, &input)?;
        ctx.ensure_stage_dir(OUTPUT_DIR)?;
        trace_state(StageState::PathsResolved);

        if template.uses(Tag::Mount) {
            if [Tag::InputVolume, Tag::InputSrr, Tag::InputDir].iter().any(|t| template.uses(*t)) {
                renderer.mount_dir(&input_dir);
            }
            if template.uses(Tag::OutputSeg) || template.uses(Tag::OutputDir) {
                renderer.mount_dir(&output_dir);
            }
        }

        let command = renderer.render()?;
        trace_state(StageState::Rendered);

        // a one-element list comes back as a one-element list
        let outputs = match &self.input_volume {
            PathGroup::Single(_) => PathGroup::single(output_seg),
            PathGroup::List(_) => PathGroup::list([output_seg]),
        };

        Ok(StagePlan::Run(StageInvocation {
            stage: StageKind::Segmentation,
            container: template.container(),
            command,
            outputs: vec![DeclaredOutput::new(Tag::OutputSeg.name(), outputs)],
            check_outputs: false,
            env: self.env.clone(),
        }))
    }
}

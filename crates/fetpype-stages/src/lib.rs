//! Fetpype Stages: the container-backed pipeline steps.
//!
//! Each adapter declares its tag vocabulary, derives its stage-local output
//! paths and renders one command. Execution is left to
//! [`fetpype_core::StageRunner`].
//!
//! # Pipeline Flow
//!
//! ```text
//! stacks → Preprocessing → Reconstruction → Segmentation → Surface
//!             ↓                 ↓                ↓            ↓
//!         <step name>/      recon/          seg/out/     surf/out/
//! ```

mod common;
pub mod config;
pub mod nifti;
mod preprocessing;
mod reconstruction;
mod segmentation;
mod surface;

pub use common::{strip_volume_extensions, SingularitySettings};
pub use config::{CommandConfig, PipelineConfig, Scalar, StageConfig};
pub use nifti::{MetadataError, NiftiHeader};
pub use preprocessing::{mask_name, PreprocessingStage};
pub use reconstruction::ReconstructionStage;
pub use segmentation::SegmentationStage;
pub use surface::SurfaceStage;

use fetpype_core::{ExecutionContext, FetpypeError, PathGroup, Result, Stage, StageRunner};

/// Run one stage and hand back its primary output, the calling convention
/// of the workflow engine.
pub fn run_stage(stage: &dyn Stage, ctx: &ExecutionContext) -> Result<PathGroup> {
    let outcome = StageRunner::new().run(stage, ctx)?;
    outcome.primary().cloned().ok_or_else(|| {
        FetpypeError::InvalidInput(format!("stage '{}' declared no output", stage.id()))
    })
}

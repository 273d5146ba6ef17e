//! Fetpype Template: `<tag>` command templates for container stages
//!
//! A template is tokenized once, checked against the vocabulary of the
//! stage that owns it, and only then rendered.
//!
//! # Example
//!
//! ```
//! use fetpype_template::{validate_str, Tag, TagVocabulary, TemplateRenderer};
//!
//! let template = validate_str(
//!     "singularity exec <singularity_path>/recon.sif recon --in <input_stacks> --out <output_volume>",
//!     &TagVocabulary::RECONSTRUCTION,
//! )
//! .unwrap();
//!
//! let mut renderer = TemplateRenderer::new(&template);
//! renderer
//!     .set(Tag::SingularityPath, "/images")
//!     .set(Tag::InputStacks, "/data/a.nii.gz /data/b.nii.gz")
//!     .set(Tag::OutputVolume, "/work/recon/recon.nii.gz");
//!
//! assert_eq!(
//!     renderer.render().unwrap(),
//!     "singularity exec /images/recon.sif recon --in /data/a.nii.gz /data/b.nii.gz --out /work/recon/recon.nii.gz"
//! );
//! ```

pub mod renderer;
pub mod tags;
pub mod template;
pub mod validator;

pub use renderer::{render, TagValues, TemplateRenderer};
pub use tags::{Tag, TagVocabulary};
pub use template::{CommandTemplate, Segment};
pub use validator::{validate, validate_str, TypedSegment, ValidatedTemplate};

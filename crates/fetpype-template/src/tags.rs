//! Placeholder vocabulary.
//!
//! Every `<name>` a command template may contain is a [`Tag`]; each stage
//! kind accepts a fixed subset of them.

use fetpype_core::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Mount,
    SingularityPath,
    SingularityMount,
    SingularityHome,
    InputStacks,
    InputMasks,
    InputDir,
    InputMasksDir,
    InputTp,
    InputVolume,
    InputSrr,
    InputSeg,
    OutputStacks,
    OutputMasks,
    OutputDir,
    OutputVolume,
    OutputRes,
    OutputSeg,
    OutputSurf,
    GestationalAge,
    Basename,
    LabellingScheme,
}

impl Tag {
    pub const ALL: [Tag; 22] = [
        Tag::Mount,
        Tag::SingularityPath,
        Tag::SingularityMount,
        Tag::SingularityHome,
        Tag::InputStacks,
        Tag::InputMasks,
        Tag::InputDir,
        Tag::InputMasksDir,
        Tag::InputTp,
        Tag::InputVolume,
        Tag::InputSrr,
        Tag::InputSeg,
        Tag::OutputStacks,
        Tag::OutputMasks,
        Tag::OutputDir,
        Tag::OutputVolume,
        Tag::OutputRes,
        Tag::OutputSeg,
        Tag::OutputSurf,
        Tag::GestationalAge,
        Tag::Basename,
        Tag::LabellingScheme,
    ];

    /// Name as written between the brackets
    pub fn name(&self) -> &'static str {
        match self {
            Tag::Mount => "mount",
            Tag::SingularityPath => "singularity_path",
            Tag::SingularityMount => "singularity_mount",
            Tag::SingularityHome => "singularity_home",
            Tag::InputStacks => "input_stacks",
            Tag::InputMasks => "input_masks",
            Tag::InputDir => "input_dir",
            Tag::InputMasksDir => "input_masks_dir",
            Tag::InputTp => "input_tp",
            Tag::InputVolume => "input_volume",
            Tag::InputSrr => "input_srr",
            Tag::InputSeg => "input_seg",
            Tag::OutputStacks => "output_stacks",
            Tag::OutputMasks => "output_masks",
            Tag::OutputDir => "output_dir",
            Tag::OutputVolume => "output_volume",
            Tag::OutputRes => "output_res",
            Tag::OutputSeg => "output_seg",
            Tag::OutputSurf => "output_surf",
            Tag::GestationalAge => "gestational_age",
            Tag::Basename => "basename",
            Tag::LabellingScheme => "labelling_scheme",
        }
    }

    pub fn from_name(name: &str) -> Option<Tag> {
        Tag::ALL.iter().copied().find(|tag| tag.name() == name)
    }

    /// `<name>` form
    pub fn token(&self) -> String {
        format!("<{}>", self.name())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name())
    }
}

/// Placeholders accepted by one stage kind.
#[derive(Debug, Clone, Copy)]
pub struct TagVocabulary {
    pub stage: StageKind,
    tags: &'static [Tag],
    /// At least one of these must appear, or the stage has nothing to return
    required_any: &'static [Tag],
}

impl TagVocabulary {
    pub const PREPROCESSING: TagVocabulary = TagVocabulary {
        stage: StageKind::Preprocessing,
        tags: &[
            Tag::Mount,
            Tag::InputStacks,
            Tag::InputMasks,
            Tag::OutputStacks,
            Tag::OutputMasks,
            Tag::SingularityPath,
            Tag::SingularityMount,
        ],
        required_any: &[Tag::OutputStacks, Tag::OutputMasks],
    };

    pub const RECONSTRUCTION: TagVocabulary = TagVocabulary {
        stage: StageKind::Reconstruction,
        tags: &[
            Tag::Mount,
            Tag::InputStacks,
            Tag::InputDir,
            Tag::InputMasks,
            Tag::InputMasksDir,
            Tag::OutputDir,
            Tag::OutputVolume,
            Tag::InputTp,
            Tag::OutputRes,
            Tag::SingularityPath,
            Tag::SingularityMount,
        ],
        required_any: &[],
    };

    pub const SEGMENTATION: TagVocabulary = TagVocabulary {
        stage: StageKind::Segmentation,
        tags: &[
            Tag::Mount,
            Tag::InputVolume,
            Tag::InputSrr,
            Tag::InputDir,
            Tag::OutputDir,
            Tag::OutputSeg,
            Tag::SingularityPath,
            Tag::SingularityMount,
            Tag::GestationalAge,
            Tag::Basename,
        ],
        required_any: &[],
    };

    pub const SURFACE: TagVocabulary = TagVocabulary {
        stage: StageKind::Surface,
        tags: &[
            Tag::Mount,
            Tag::InputSeg,
            Tag::LabellingScheme,
            Tag::OutputSurf,
            Tag::SingularityPath,
            Tag::SingularityMount,
            Tag::SingularityHome,
        ],
        required_any: &[],
    };

    /// Output file names configured as `path_to_output` (e.g. "<basename>_seg.nii.gz")
    pub const OUTPUT_NAME: TagVocabulary = TagVocabulary {
        stage: StageKind::Segmentation,
        tags: &[Tag::Basename],
        required_any: &[],
    };

    pub fn for_stage(stage: StageKind) -> &'static TagVocabulary {
        match stage {
            StageKind::Preprocessing => &Self::PREPROCESSING,
            StageKind::Reconstruction => &Self::RECONSTRUCTION,
            StageKind::Segmentation => &Self::SEGMENTATION,
            StageKind::Surface => &Self::SURFACE,
        }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn tags(&self) -> &'static [Tag] {
        self.tags
    }

    pub fn required_any(&self) -> &'static [Tag] {
        self.required_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_name(tag.name()), Some(tag));
        }
        assert_eq!(Tag::from_name("input_stack"), None);
    }

    #[test]
    fn test_every_vocabulary_allows_mount() {
        for stage in [
            StageKind::Preprocessing,
            StageKind::Reconstruction,
            StageKind::Segmentation,
            StageKind::Surface,
        ] {
            assert!(TagVocabulary::for_stage(stage).contains(Tag::Mount), "{stage}");
        }
    }

    #[test]
    fn test_segmentation_accepts_both_input_aliases() {
        let vocab = TagVocabulary::SEGMENTATION;
        assert!(vocab.contains(Tag::InputVolume));
        assert!(vocab.contains(Tag::InputSrr));
        assert!(!vocab.contains(Tag::InputStacks));
    }

    #[test]
    fn test_display_uses_brackets() {
        assert_eq!(Tag::OutputDir.to_string(), "<output_dir>");
        assert_eq!(Tag::InputTp.token(), "<input_tp>");
    }
}

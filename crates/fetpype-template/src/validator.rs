//! Static checks run before any directory is created or process spawned.

use fetpype_core::{ContainerKind, FetpypeError, Result};

use crate::tags::{Tag, TagVocabulary};
use crate::template::{CommandTemplate, Segment};

/// Piece of a template whose placeholders are known tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedSegment {
    Literal(String),
    Tag(Tag),
}

/// A template that passed [`validate`] for one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTemplate {
    source: String,
    segments: Vec<TypedSegment>,
}

impl ValidatedTemplate {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[TypedSegment] {
        &self.segments
    }

    pub fn uses(&self, tag: Tag) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, TypedSegment::Tag(t) if *t == tag))
    }

    /// Distinct tags in order of first appearance.
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();
        for segment in &self.segments {
            if let TypedSegment::Tag(tag) = segment {
                if !tags.contains(tag) {
                    tags.push(*tag);
                }
            }
        }
        tags
    }

    pub fn container(&self) -> ContainerKind {
        ContainerKind::detect(&self.source)
    }
}

/// Check every placeholder against `vocabulary`.
///
/// Fails with `UnknownTag` for a placeholder outside the vocabulary,
/// `MissingMountTag` for a docker command without `<mount>`, and
/// `NoDeclaredOutput` when the vocabulary requires an output placeholder
/// and none is present.
pub fn validate(template: &CommandTemplate, vocabulary: &TagVocabulary) -> Result<ValidatedTemplate> {
    let source = template.source();
    let mut segments = Vec::with_capacity(template.segments().len());

    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => segments.push(TypedSegment::Literal(text.clone())),
            Segment::Placeholder(name) => {
                let tag = Tag::from_name(name)
                    .filter(|tag| vocabulary.contains(*tag))
                    .ok_or_else(|| FetpypeError::UnknownTag {
                        tag: name.clone(),
                        template: source.to_string(),
                    })?;
                segments.push(TypedSegment::Tag(tag));
            }
        }
    }

    let validated = ValidatedTemplate {
        source: source.to_string(),
        segments,
    };

    if source.contains("docker") && !validated.uses(Tag::Mount) {
        return Err(FetpypeError::MissingMountTag {
            template: source.to_string(),
        });
    }

    let required = vocabulary.required_any();
    if !required.is_empty() && !required.iter().any(|tag| validated.uses(*tag)) {
        return Err(FetpypeError::NoDeclaredOutput {
            stage: vocabulary.stage,
            expected: required
                .iter()
                .map(Tag::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            template: source.to_string(),
        });
    }

    Ok(validated)
}

/// Parse and validate in one step.
pub fn validate_str(source: &str, vocabulary: &TagVocabulary) -> Result<ValidatedTemplate> {
    validate(&CommandTemplate::parse(source), vocabulary)
}

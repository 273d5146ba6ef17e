//! Template rendering.
//!
//! Values are spliced into the tokenized template segment by segment, so a
//! value that happens to contain `<...>` is never mistaken for a
//! placeholder. `<mount>` is filled last, from every directory registered
//! while the other values were resolved.
//!
//! The "no `<tag>` left after rendering" check is enforced per segment: a
//! placeholder without a value is `IncompleteRender`, and literal text is
//! never inspected again, so no post-render scan is needed.

use fetpype_core::{FetpypeError, MountSpec, PathGroup, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::tags::Tag;
use crate::validator::{TypedSegment, ValidatedTemplate};

/// Resolved value for each tag.
pub type TagValues = BTreeMap<Tag, String>;

/// Substitute every tag of `template` with its value.
///
/// A tag without a value is `IncompleteRender`: validation let it through
/// but the caller never resolved it.
pub fn render(template: &ValidatedTemplate, values: &TagValues) -> Result<String> {
    let mut out = String::with_capacity(template.source().len());
    for segment in template.segments() {
        match segment {
            TypedSegment::Literal(text) => out.push_str(text),
            TypedSegment::Tag(tag) => {
                let value = values.get(tag).ok_or_else(|| FetpypeError::IncompleteRender {
                    tag: tag.name().to_string(),
                    template: template.source().to_string(),
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Collects tag values and mount directories for one invocation.
#[derive(Debug)]
pub struct TemplateRenderer<'t> {
    template: &'t ValidatedTemplate,
    values: TagValues,
    mounts: MountSpec,
}

impl<'t> TemplateRenderer<'t> {
    pub fn new(template: &'t ValidatedTemplate) -> Self {
        TemplateRenderer {
            template,
            values: TagValues::new(),
            mounts: MountSpec::new(),
        }
    }

    pub fn uses(&self, tag: Tag) -> bool {
        self.template.uses(tag)
    }

    /// Set a value unconditionally.
    pub fn set(&mut self, tag: Tag, value: impl Into<String>) -> &mut Self {
        self.values.insert(tag, value.into());
        self
    }

    /// Resolve a value only if the template uses `tag`.
    ///
    /// Keeps expensive or fallible lookups (reading image headers, optional
    /// configuration) from running for templates that never ask for them.
    pub fn set_with<F>(&mut self, tag: Tag, resolve: F) -> Result<&mut Self>
    where
        F: FnOnce() -> Result<String>,
    {
        if self.uses(tag) {
            let value = resolve()?;
            self.values.insert(tag, value);
        }
        Ok(self)
    }

    /// Register the directory holding `group` for mounting.
    pub fn mount_group(&mut self, group: &PathGroup) -> Result<&mut Self> {
        self.mounts.add_group(group)?;
        Ok(self)
    }

    /// Register a directory for mounting.
    pub fn mount_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.mounts.add(dir);
        self
    }

    pub fn mounts(&self) -> &MountSpec {
        &self.mounts
    }

    /// Compute `<mount>` if needed (creating the directories), then render.
    pub fn render(mut self) -> Result<String> {
        if self.uses(Tag::Mount) {
            let mount = self.mounts.to_mount_arg()?;
            debug!(mount = %mount, "resolved bind mounts");
            self.values.insert(Tag::Mount, mount);
        }
        render(self.template, &self.values)
    }
}

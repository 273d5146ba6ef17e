//! Container runtime detection and image availability.
//!
//! Detection is purely textual: templates are inspected, never executed.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

use crate::data_model::ExecResult;
use crate::error::{FetpypeError, Result};
use crate::executor::ContainerExecutor;

static SINGULARITY_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(\S+\.(?:sif|simg))(?:\s|$)").expect("valid regex"));

static SINGULARITY_RUNTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:singularity|apptainer)\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Docker,
    Singularity,
    /// Plain host command, no container runtime involved
    Host,
}

impl ContainerKind {
    /// Classify a command template or rendered command.
    pub fn detect(command: &str) -> Self {
        if command.contains("docker") {
            ContainerKind::Docker
        } else if SINGULARITY_IMAGE.is_match(command) || SINGULARITY_RUNTIME.is_match(command) {
            ContainerKind::Singularity
        } else {
            ContainerKind::Host
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Docker => "docker",
            ContainerKind::Singularity => "singularity",
            ContainerKind::Host => "host",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image referenced by a command template.
///
/// Docker: the first word after `<mount>`. Singularity: the first token
/// ending in `.sif` or `.simg`.
pub fn container_image(kind: ContainerKind, template: &str) -> Option<String> {
    match kind {
        ContainerKind::Docker => template
            .split_once("<mount>")
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(str::to_string),
        ContainerKind::Singularity => SINGULARITY_IMAGE
            .captures(template)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        ContainerKind::Host => None,
    }
}

/// Availability of one image and the configuration keys that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCheck {
    pub image: String,
    pub used_by: Vec<String>,
    pub available: bool,
}

/// Check every image referenced by `commands` (configuration key, template).
pub fn check_container_images<'a, I>(kind: ContainerKind, commands: I) -> Result<Vec<ImageCheck>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if kind == ContainerKind::Host {
        return Err(FetpypeError::Config(
            "container type must be docker or singularity".to_string(),
        ));
    }

    let mut by_image: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, template) in commands {
        match container_image(kind, template) {
            Some(image) => by_image.entry(image).or_default().push(key.to_string()),
            None => warn!(key, "no {} image found in command template", kind),
        }
    }

    let mut checks = Vec::with_capacity(by_image.len());
    for (image, used_by) in by_image {
        let available = is_image_available(kind, &image)?;
        info!(
            image = %image,
            used_by = %used_by.join(", "),
            "{} image {}",
            kind,
            if available { "available" } else { "NOT FOUND" }
        );
        checks.push(ImageCheck {
            image,
            used_by,
            available,
        });
    }
    Ok(checks)
}

/// Docker asks the daemon; Singularity images are plain files.
pub fn is_image_available(kind: ContainerKind, image: &str) -> Result<bool> {
    match kind {
        ContainerKind::Docker => {
            let status = Command::new("docker")
                .args(["inspect", image])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(|e| FetpypeError::io("run docker inspect", e))?;
            Ok(status.success())
        }
        ContainerKind::Singularity => Ok(Path::new(image).is_file()),
        ContainerKind::Host => Ok(true),
    }
}

/// Pull a missing image through the regular executor so progress is logged.
pub fn pull_image(
    kind: ContainerKind,
    image: &str,
    executor: &ContainerExecutor,
) -> Result<ExecResult> {
    match kind {
        ContainerKind::Docker => executor.execute(&format!("docker pull {}", image)),
        other => Err(FetpypeError::Config(format!(
            "automated image retrieval is not supported for {}",
            other
        ))),
    }
}

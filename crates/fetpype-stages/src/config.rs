//! Pipeline configuration
//!
//! One YAML document selects the container runtime and carries a command
//! template plus stage settings for each node. Templates are stored per
//! runtime and picked with [`StageConfig::command`].

use crate::common::SingularitySettings;
use fetpype_core::{check_container_images, ContainerKind, FetpypeError, ImageCheck, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub container: ContainerKind,
    #[serde(default)]
    pub singularity_path: Option<String>,
    #[serde(default)]
    pub singularity_mount: Option<String>,
    #[serde(default)]
    pub singularity_home: Option<String>,
    /// Preprocessing steps keyed by step name (denoising, cropping, ...)
    #[serde(default)]
    pub preprocessing: BTreeMap<String, StageConfig>,
    #[serde(default)]
    pub reconstruction: Option<StageConfig>,
    #[serde(default)]
    pub segmentation: Option<StageConfig>,
    #[serde(default)]
    pub surface: Option<StageConfig>,
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| FetpypeError::io(format!("read config {}", path.display()), e))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FetpypeError::Config(e.to_string()))
    }

    pub fn singularity(&self) -> SingularitySettings {
        SingularitySettings {
            path: self.singularity_path.clone(),
            mount: self.singularity_mount.clone(),
            home: self.singularity_home.clone(),
        }
    }

    pub fn preprocessing_step(&self, name: &str) -> Result<&StageConfig> {
        self.preprocessing
            .get(name)
            .ok_or_else(|| FetpypeError::Config(format!("no preprocessing step named '{}'", name)))
    }

    pub fn reconstruction(&self) -> Result<&StageConfig> {
        self.reconstruction
            .as_ref()
            .ok_or_else(|| FetpypeError::Config("missing 'reconstruction' section".to_string()))
    }

    pub fn segmentation(&self) -> Result<&StageConfig> {
        self.segmentation
            .as_ref()
            .ok_or_else(|| FetpypeError::Config("missing 'segmentation' section".to_string()))
    }

    pub fn surface(&self) -> Result<&StageConfig> {
        self.surface
            .as_ref()
            .ok_or_else(|| FetpypeError::Config("missing 'surface' section".to_string()))
    }

    /// `(stage name, template)` for every configured command of the
    /// selected runtime. Disabled preprocessing steps are skipped.
    pub fn commands(&self) -> Vec<(String, &str)> {
        let mut commands = Vec::new();
        for (name, step) in &self.preprocessing {
            if !step.enabled {
                continue;
            }
            if let Ok(cmd) = step.command(self.container) {
                commands.push((name.clone(), cmd));
            }
        }
        let stages = [
            ("reconstruction", &self.reconstruction),
            ("segmentation", &self.segmentation),
            ("surface", &self.surface),
        ];
        for (name, stage) in stages {
            if let Some(stage) = stage {
                if let Ok(cmd) = stage.command(self.container) {
                    let label = stage.pipeline.as_deref().unwrap_or(name);
                    commands.push((label.to_string(), cmd));
                }
            }
        }
        commands
    }

    /// Availability of every image the configured commands reference.
    pub fn check_images(&self) -> Result<Vec<ImageCheck>> {
        let commands = self.commands();
        check_container_images(
            self.container,
            commands.iter().map(|(name, cmd)| (name.as_str(), *cmd)),
        )
    }
}

fn default_enabled() -> bool {
    true
}

/// Settings of one stage or preprocessing step.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Tool name, e.g. "nesvor", "bounti"
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub docker: Option<CommandConfig>,
    #[serde(default)]
    pub singularity: Option<CommandConfig>,
    /// Rendered verbatim into `<output_res>`
    #[serde(default)]
    pub output_resolution: Option<Scalar>,
    /// Output file name relative to the stage output directory
    #[serde(default)]
    pub path_to_output: Option<String>,
    #[serde(default)]
    pub use_scheme: Option<String>,
    #[serde(default)]
    pub labelling_scheme: BTreeMap<String, Vec<i64>>,
    /// Variables set in the child environment only
    #[serde(default)]
    pub environment: BTreeMap<String, Scalar>,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            enabled: true,
            pipeline: None,
            docker: None,
            singularity: None,
            output_resolution: None,
            path_to_output: None,
            use_scheme: None,
            labelling_scheme: BTreeMap::new(),
            environment: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    pub cmd: String,
}

impl StageConfig {
    /// Template for the given runtime.
    pub fn command(&self, container: ContainerKind) -> Result<&str> {
        let section = match container {
            ContainerKind::Docker => &self.docker,
            ContainerKind::Singularity => &self.singularity,
            ContainerKind::Host => {
                return Err(FetpypeError::Config(
                    "container must be 'docker' or 'singularity'".to_string(),
                ))
            }
        };
        section
            .as_ref()
            .map(|c| c.cmd.as_str())
            .ok_or_else(|| FetpypeError::Config(format!("no {} command configured", container)))
    }

    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    /// Labels of the selected scheme as a comma-separated list.
    pub fn labels(&self) -> Result<String> {
        let scheme = self.use_scheme.as_deref().ok_or_else(|| {
            FetpypeError::Config("'use_scheme' is not set".to_string())
        })?;
        let labels = self.labelling_scheme.get(scheme).ok_or_else(|| {
            FetpypeError::Config(format!(
                "use_scheme '{}' not found in labelling_scheme (available: {})",
                scheme,
                self.labelling_scheme
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        Ok(labels
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(","))
    }
}

/// A YAML scalar kept as written.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{:?}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

use crate::compose::ComposeService;
use crate::environment::EnvironmentIdentity;
use crate::manifest::Manifest;
use crate::overlay::{EnvironmentOverlay, FeatureFlags};
use crate::variables::EnvironmentVariable;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Everything the ingestion collaborators hand over for one run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildInput {
    pub environment: EnvironmentIdentity,
    /// Compose services in declaration order.
    #[serde(default)]
    pub compose: Vec<ComposeService>,
    #[serde(default)]
    pub manifest: Manifest,
    #[serde(default)]
    pub project_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Toml,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(SchemaError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl BuildInput {
    /// Check the input for structural problems and split it into the
    /// overlay and the ordered compose services.
    pub fn into_parts(self) -> Result<(EnvironmentOverlay, Vec<ComposeService>), SchemaError> {
        let mut seen = HashSet::new();
        for service in &self.compose {
            if service.name.trim().is_empty() {
                return Err(SchemaError::EmptyServiceName);
            }
            if !seen.insert(service.name.as_str()) {
                return Err(SchemaError::DuplicateService(service.name.clone()));
            }
        }
        let overlay = EnvironmentOverlay::new(
            self.environment,
            self.manifest,
            &self.project_variables,
            &self.environment_variables,
            self.feature_flags,
        )?;
        Ok((overlay, self.compose))
    }
}

pub fn parse_input_str(input: &str, format: InputFormat) -> Result<BuildInput, SchemaError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(input)?),
        InputFormat::Toml => Ok(toml::from_str(input)?),
    }
}

pub fn parse_input_file(path: impl AsRef<Path>) -> Result<BuildInput, SchemaError> {
    let path = path.as_ref();
    let format = InputFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    parse_input_str(&content, format)
}

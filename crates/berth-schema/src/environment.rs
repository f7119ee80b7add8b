use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const MAX_NAMESPACE_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Production,
    #[default]
    Development,
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => f.write_str("production"),
            Self::Development => f.write_str("development"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    #[default]
    Branch,
    #[serde(rename = "pullrequest")]
    PullRequest,
    Promote,
}

/// A registry whose images are pulled directly instead of through the image cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerRegistry {
    pub name: String,
    /// Regular expression matched against image references.
    pub url: String,
}

/// Who and what is being deployed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentIdentity {
    pub project: String,
    /// Environment name; derived from the branch (or PR number) when absent.
    #[serde(default)]
    pub environment: Option<String>,
    pub branch: String,
    #[serde(default)]
    pub environment_type: EnvironmentType,
    #[serde(default)]
    pub build_type: BuildType,
    #[serde(default)]
    pub pr_number: Option<String>,
    #[serde(default)]
    pub pr_head_branch: Option<String>,
    #[serde(default)]
    pub pr_base_branch: Option<String>,
    #[serde(default)]
    pub active_environment: Option<String>,
    #[serde(default)]
    pub standby_environment: Option<String>,
    #[serde(default)]
    pub promotion_source_environment: Option<String>,
    #[serde(default)]
    pub image_registry: Option<String>,
    /// Prefix such as `imagecache.example.com/` for pull-through images.
    #[serde(default)]
    pub image_cache: Option<String>,
    #[serde(default)]
    pub container_registries: Vec<ContainerRegistry>,
    /// Directory build contexts are resolved against.
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    #[serde(default)]
    pub cronjobs_disabled: bool,
}

impl EnvironmentIdentity {
    pub fn new(project: &str, environment: &str, branch: &str) -> Self {
        Self {
            project: project.to_owned(),
            environment: Some(environment.to_owned()),
            branch: branch.to_owned(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.project.trim().is_empty() {
            return Err(SchemaError::InvalidIdentity(
                "project must not be empty".to_owned(),
            ));
        }
        if self.branch.trim().is_empty() && self.build_type != BuildType::PullRequest {
            return Err(SchemaError::InvalidIdentity(
                "branch must not be empty".to_owned(),
            ));
        }
        if self.build_type == BuildType::PullRequest && self.pr_number.is_none() {
            return Err(SchemaError::InvalidIdentity(
                "pull request builds require pr_number".to_owned(),
            ));
        }
        if self.build_type == BuildType::Promote && self.promotion_source_environment.is_none() {
            return Err(SchemaError::InvalidIdentity(
                "promote builds require promotion_source_environment".to_owned(),
            ));
        }
        Ok(())
    }

    /// Key of the manifest section that applies to this build.
    pub fn branch_key(&self) -> String {
        match (&self.build_type, &self.pr_number) {
            (BuildType::PullRequest, Some(pr)) => format!("pr-{pr}"),
            _ => self.branch.clone(),
        }
    }

    pub fn environment_name(&self) -> String {
        if let Some(env) = self.environment.as_deref().filter(|e| !e.is_empty()) {
            return env.to_owned();
        }
        make_safe(&self.branch_key())
    }

    /// Cluster namespace: `<project>-<environment>`, made safe and shortened
    /// to 63 characters.
    pub fn namespace(&self) -> String {
        let raw = make_safe(&format!("{}-{}", self.project, self.environment_name()));
        if raw.len() <= MAX_NAMESPACE_LEN {
            return raw;
        }
        let hash = blake3::hash(raw.as_bytes()).to_hex();
        format!("{}-{}", &raw[..57], &hash[..5])
    }

    pub fn is_pull_request(&self) -> bool {
        self.build_type == BuildType::PullRequest
    }

    pub fn is_promote(&self) -> bool {
        self.build_type == BuildType::Promote
    }

    pub fn is_active(&self) -> bool {
        self.active_environment.as_deref() == Some(self.environment_name().as_str())
    }

    pub fn is_standby(&self) -> bool {
        self.standby_environment.as_deref() == Some(self.environment_name().as_str())
    }
}

/// Lowercase and replace everything outside `[a-z0-9-]` with `-`.
pub fn make_safe(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

use crate::environment::EnvironmentIdentity;
use crate::manifest::{EnvironmentSection, Manifest};
use crate::variables::{find_variable, merge_variables, EnvironmentVariable, BUILD_SCOPES};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ROUTER_PATTERN_VARIABLE: &str = "LAGOON_SYSTEM_ROUTER_PATTERN";
pub const DEFAULT_ROUTER_PATTERN: &str = "${service}-${project}-${environment}.example.com";
const FEATURE_FLAG_PREFIX: &str = "LAGOON_FEATURE_FLAG_";

/// Platform-controlled feature flag values.
///
/// `force` values win over anything the project sets, `default` values only
/// apply when the project sets nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureFlags {
    #[serde(default)]
    pub force: BTreeMap<String, String>,
    #[serde(default)]
    pub default: BTreeMap<String, String>,
}

/// Immutable snapshot of everything environment-specific that feeds a run.
#[derive(Debug, Clone)]
pub struct EnvironmentOverlay {
    identity: EnvironmentIdentity,
    manifest: Manifest,
    variables: Vec<EnvironmentVariable>,
    feature_flags: FeatureFlags,
    environment_name: String,
    namespace: String,
}

impl EnvironmentOverlay {
    pub fn new(
        identity: EnvironmentIdentity,
        manifest: Manifest,
        project_variables: &[EnvironmentVariable],
        environment_variables: &[EnvironmentVariable],
        feature_flags: FeatureFlags,
    ) -> Result<Self, SchemaError> {
        identity.validate()?;
        let environment_name = identity.environment_name();
        let namespace = identity.namespace();
        Ok(Self {
            identity,
            manifest,
            variables: merge_variables(project_variables, environment_variables),
            feature_flags,
            environment_name,
            namespace,
        })
    }

    pub fn identity(&self) -> &EnvironmentIdentity {
        &self.identity
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// All merged variables, every scope included.
    pub fn variables(&self) -> &[EnvironmentVariable] {
        &self.variables
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Variable value visible at build time.
    pub fn build_variable(&self, name: &str) -> Option<&str> {
        find_variable(&self.variables, name, BUILD_SCOPES).map(|v| v.value.as_str())
    }

    /// Resolve a feature flag by its bare key, e.g. `SPOT_INSTANCE_PRODUCTION`.
    pub fn feature_flag(&self, key: &str) -> Option<&str> {
        if let Some(forced) = self.feature_flags.force.get(key) {
            return Some(forced);
        }
        if let Some(value) = self.build_variable(&format!("{FEATURE_FLAG_PREFIX}{key}")) {
            return Some(value);
        }
        self.feature_flags.default.get(key).map(String::as_str)
    }

    pub fn router_pattern(&self) -> &str {
        self.build_variable(ROUTER_PATTERN_VARIABLE)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_ROUTER_PATTERN)
    }

    /// Manifest section for the branch being built (routes, cronjobs,
    /// autogenerate flag).
    pub fn branch_section(&self) -> Option<&EnvironmentSection> {
        self.manifest.branch_environment(&self.identity.branch_key())
    }

    /// Manifest section for the environment name (type, build and image
    /// overrides).
    pub fn environment_section(&self) -> Option<&EnvironmentSection> {
        self.manifest.environment(&self.environment_name)
    }
}

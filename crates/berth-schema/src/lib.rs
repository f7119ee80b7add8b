//! Ingestion records, environment overlay, and input loading for berth.
//!
//! This crate defines the structured inputs of a run: compose services in
//! declaration order (`ComposeService`), the deployment manifest (`Manifest`),
//! scoped project/environment variables, the environment identity, and the
//! immutable `EnvironmentOverlay` snapshot the resolution engine reads from.

pub mod compose;
pub mod environment;
pub mod input;
pub mod manifest;
pub mod overlay;
pub mod types;
pub mod variables;

pub use compose::{BuildSpec, ComposePort, ComposeService};
pub use environment::{
    make_safe, BuildType, ContainerRegistry, EnvironmentIdentity, EnvironmentType,
};
pub use input::{parse_input_file, parse_input_str, BuildInput, InputFormat};
pub use manifest::{
    AutogenerateSection, BuildOverride, CronjobDeclaration, EnvironmentSection, Manifest,
    ProductionRoutes, RouteDeclaration, RouteGroup, RouteList, RoutesSection, ServiceOverride,
};
pub use overlay::{EnvironmentOverlay, FeatureFlags, DEFAULT_ROUTER_PATTERN};
pub use types::{OverrideName, ServiceType};
pub use variables::{
    find_variable, merge_variables, EnvironmentVariable, VariableScope, BUILD_SCOPES,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse input: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse input: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported input format: '{0}', expected .json or .toml")]
    UnsupportedFormat(String),
    #[error("compose service name must not be empty")]
    EmptyServiceName,
    #[error("compose service '{0}' is declared more than once")]
    DuplicateService(String),
    #[error("invalid environment identity: {0}")]
    InvalidIdentity(String),
}

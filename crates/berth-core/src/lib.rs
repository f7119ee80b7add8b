//! Resolution engine for berth deployments.
//!
//! This crate turns an `EnvironmentOverlay` and the ordered compose services
//! into a `DeploymentModel`: one `ServiceDescriptor` per included service
//! (type, persistence, scheduling, image provenance, cronjobs) plus the route
//! set and the change report used to diff against deployed ingress. DBaaS
//! availability is probed through the `berth_dbaas::DbaasProvider` injected
//! into the `Engine`.

pub mod cronjob;
pub mod engine;
pub mod fastly;
pub mod routes;
pub mod service;
pub mod tables;

pub use cronjob::Cronjob;
pub use engine::{DeploymentModel, Engine, IdentifiedServices, ServiceSummary};
pub use fastly::{FastlyConfig, FastlyOptions};
pub use routes::{ChangeReport, Route, RoutePlan, RouteSet};
pub use service::{
    AdditionalServicePort, ImageProvenance, ServiceDescriptor, ServiceImage, ServiceResolver,
    SpotPolicy,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input error: {0}")]
    Schema(#[from] berth_schema::SchemaError),
    #[error("no type declared for service '{service}'; add a lagoon.type label")]
    MissingType { service: String },
    #[error("duplicate cronjob names declared: {entries}")]
    DuplicateCronjobs { entries: String },
    #[error("invalid schedule for cronjob '{cronjob}': {reason}")]
    InvalidSchedule { cronjob: String, reason: String },
    #[error("dockerfile for service '{service}' not found at '{path}'")]
    DockerfileNotFound { service: String, path: String },
    #[error("no image or build declared for service '{service}'")]
    MissingImage { service: String },
    #[error("service port '{value}' for service '{service}' is not a valid port")]
    InvalidServicePort { service: String, value: String },
    #[error("failed to substitute variables in image '{image}' for service '{service}': {reason}")]
    ImageSubstitution {
        service: String,
        image: String,
        reason: String,
    },
    #[error("invalid value for variable {name}: {reason}")]
    InvalidVariable { name: String, reason: String },
    #[error("invalid route '{domain}': {reason}")]
    InvalidRoute { domain: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

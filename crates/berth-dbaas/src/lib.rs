//! DBaaS availability probing for berth.
//!
//! This crate provides the `DbaasProvider` capability trait (provider health and
//! per-type environment existence), an HTTP implementation with a bounded
//! timeout, a mock provider for tests, and `ProbeSession`, which caches probe
//! outcomes for the duration of one run so every service sees the same
//! fallback decision.

pub mod config;
pub mod http;
pub mod mock;

pub use config::DbaasConfig;
pub use http::HttpProvider;
pub use mock::MockProvider;

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DbaasError {
    #[error("DBaaS I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid provider response: {0}")]
    Response(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("no DBaaS endpoint configured")]
    NotConfigured,
    #[error("DBaaS config error: {0}")]
    Config(String),
}

/// Capability interface of the external database provisioning service.
pub trait DbaasProvider: Send + Sync {
    /// Succeeds when the provider answers its health check.
    fn check_health(&self) -> Result<(), DbaasError>;

    /// Whether a provider for `db_type` (without the `-dbaas` suffix) exists
    /// in the named DBaaS environment.
    fn environment_exists(&self, db_type: &str, environment: &str) -> Result<bool, DbaasError>;
}

/// Stand-in used when no endpoint is configured; always unhealthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl DbaasProvider for Unconfigured {
    fn check_health(&self) -> Result<(), DbaasError> {
        Err(DbaasError::NotConfigured)
    }

    fn environment_exists(&self, _db_type: &str, _environment: &str) -> Result<bool, DbaasError> {
        Err(DbaasError::NotConfigured)
    }
}

/// Per-run probe cache.
///
/// Health is probed at most once. Existence results are cached per
/// `(type, environment)`; a failed existence probe is recorded as "absent"
/// and not retried.
pub struct ProbeSession<'a> {
    provider: &'a dyn DbaasProvider,
    health: OnceCell<bool>,
    environments: RefCell<HashMap<(String, String), bool>>,
}

impl<'a> ProbeSession<'a> {
    pub fn new(provider: &'a dyn DbaasProvider) -> Self {
        Self {
            provider,
            health: OnceCell::new(),
            environments: RefCell::new(HashMap::new()),
        }
    }

    pub fn healthy(&self) -> bool {
        *self.health.get_or_init(|| match self.provider.check_health() {
            Ok(()) => {
                debug!("DBaaS provider is healthy");
                true
            }
            Err(e) => {
                warn!("DBaaS health check failed, database services fall back to -single: {e}");
                false
            }
        })
    }

    pub fn environment_exists(&self, db_type: &str, environment: &str) -> bool {
        let key = (db_type.to_owned(), environment.to_owned());
        if let Some(found) = self.environments.borrow().get(&key) {
            return *found;
        }
        let found = match self.provider.environment_exists(db_type, environment) {
            Ok(found) => {
                debug!("DBaaS {db_type} environment '{environment}' exists: {found}");
                found
            }
            Err(e) => {
                warn!(
                    "DBaaS {db_type} environment check for '{environment}' failed, falling back to {db_type}-single: {e}"
                );
                false
            }
        };
        self.environments.borrow_mut().insert(key, found);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_is_probed_once() {
        let provider = MockProvider::unhealthy();
        let session = ProbeSession::new(&provider);
        assert!(!session.healthy());
        assert!(!session.healthy());
        assert_eq!(provider.health_checks(), 1);
    }

    #[test]
    fn environment_checks_are_cached_per_pair() {
        let provider = MockProvider::healthy().with_environment("mariadb", "production");
        let session = ProbeSession::new(&provider);
        assert!(session.environment_exists("mariadb", "production"));
        assert!(session.environment_exists("mariadb", "production"));
        assert!(!session.environment_exists("postgres", "production"));
        assert_eq!(provider.environment_checks(), 2);
    }

    #[test]
    fn failed_environment_check_counts_as_absent() {
        let provider = MockProvider::healthy().failing_environment_checks();
        let session = ProbeSession::new(&provider);
        assert!(!session.environment_exists("mariadb", "production"));
        assert!(!session.environment_exists("mariadb", "production"));
        assert_eq!(provider.environment_checks(), 1);
    }

    #[test]
    fn unconfigured_provider_is_unhealthy() {
        let session = ProbeSession::new(&Unconfigured);
        assert!(!session.healthy());
        assert!(!session.environment_exists("mariadb", "development"));
    }
}

use crate::{DbaasError, DbaasProvider};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory provider with call counters, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MockProvider {
    healthy: bool,
    fail_environment_checks: bool,
    environments: HashSet<(String, String)>,
    health_checks: AtomicUsize,
    environment_checks: AtomicUsize,
}

impl MockProvider {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Register an existing `(type, environment)` pair, e.g. `("mariadb", "production")`.
    #[must_use]
    pub fn with_environment(mut self, db_type: &str, environment: &str) -> Self {
        self.environments
            .insert((db_type.to_owned(), environment.to_owned()));
        self
    }

    /// Make every environment check return an error.
    #[must_use]
    pub fn failing_environment_checks(mut self) -> Self {
        self.fail_environment_checks = true;
        self
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn environment_checks(&self) -> usize {
        self.environment_checks.load(Ordering::SeqCst)
    }
}

impl DbaasProvider for MockProvider {
    fn check_health(&self) -> Result<(), DbaasError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err(DbaasError::Http("mock provider unhealthy".to_owned()))
        }
    }

    fn environment_exists(&self, db_type: &str, environment: &str) -> Result<bool, DbaasError> {
        self.environment_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_environment_checks {
            return Err(DbaasError::Http("mock environment check failed".to_owned()));
        }
        Ok(self
            .environments
            .contains(&(db_type.to_owned(), environment.to_owned())))
    }
}

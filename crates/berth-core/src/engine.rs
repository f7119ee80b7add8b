use crate::cronjob;
use crate::fastly::FastlyOptions;
use crate::routes::{self, ChangeReport, RoutePlan, RouteSet};
use crate::service::{ServiceDescriptor, ServiceResolver};
use crate::CoreError;
use berth_dbaas::{DbaasProvider, ProbeSession, Unconfigured};
use berth_schema::{
    BuildInput, BuildType, ComposeService, EnvironmentOverlay, EnvironmentType, OverrideName,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Entry point for a single run.
///
/// Owns the overlay, the compose services in declaration order, and the
/// DBaaS provider. Every operation is a fresh pass over the inputs; nothing
/// is cached between calls except inside a single pass.
pub struct Engine {
    overlay: EnvironmentOverlay,
    compose: Vec<ComposeService>,
    dbaas: Box<dyn DbaasProvider>,
    fastly: FastlyOptions,
}

/// Everything the renderer needs from one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentModel {
    pub project: String,
    pub environment: String,
    pub namespace: String,
    pub environment_type: EnvironmentType,
    pub build_type: BuildType,
    pub backups_enabled: bool,
    pub services: Vec<ServiceDescriptor>,
    pub routes: RoutePlan,
    pub change_report: ChangeReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

/// Override names in first-seen order, and the type each first resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentifiedServices {
    pub services: Vec<String>,
    pub service_types: Vec<ServiceSummary>,
}

impl IdentifiedServices {
    pub fn from_descriptors(descriptors: &[ServiceDescriptor]) -> Self {
        let mut identified = Self::default();
        for descriptor in descriptors {
            let name = descriptor.override_name.to_string();
            if identified.services.contains(&name) {
                continue;
            }
            if !descriptor.service_type.is_empty() {
                identified.service_types.push(ServiceSummary {
                    name: name.clone(),
                    service_type: descriptor.service_type.to_string(),
                });
            }
            identified.services.push(name);
        }
        identified
    }
}

impl Engine {
    /// Create an engine with no DBaaS endpoint; database services resolve to
    /// their `-single` variant.
    pub fn new(overlay: EnvironmentOverlay, compose: Vec<ComposeService>) -> Self {
        Self {
            overlay,
            compose,
            dbaas: Box::new(Unconfigured),
            fastly: FastlyOptions::default(),
        }
    }

    pub fn from_input(input: BuildInput) -> Result<Self, CoreError> {
        let (overlay, compose) = input.into_parts()?;
        Ok(Self::new(overlay, compose))
    }

    #[must_use]
    pub fn with_dbaas(mut self, provider: Box<dyn DbaasProvider>) -> Self {
        self.dbaas = provider;
        self
    }

    #[must_use]
    pub fn with_fastly(mut self, options: FastlyOptions) -> Self {
        self.fastly = options;
        self
    }

    pub fn overlay(&self) -> &EnvironmentOverlay {
        &self.overlay
    }

    pub fn compose(&self) -> &[ComposeService] {
        &self.compose
    }

    /// Resolve every compose service in declaration order.
    ///
    /// Excluded services (type `none`) are dropped. The first fatal error
    /// aborts the pass.
    pub fn resolve_services(&self) -> Result<Vec<ServiceDescriptor>, CoreError> {
        if let Some(section) = self.overlay.branch_section() {
            cronjob::check_duplicates(&section.cronjobs)?;
        }

        let probes = ProbeSession::new(self.dbaas.as_ref());
        let resolver = ServiceResolver::new(&self.overlay, &probes);
        let mut seen: HashSet<OverrideName> = HashSet::new();
        let mut services = Vec::with_capacity(self.compose.len());

        for compose in &self.compose {
            let Some(descriptor) = resolver.resolve(compose, &seen)? else {
                debug!("service '{}' excluded", compose.name);
                continue;
            };
            debug!(
                "resolved '{}' as {} ({})",
                descriptor.name, descriptor.override_name, descriptor.service_type
            );
            seen.insert(descriptor.override_name.clone());
            services.push(descriptor);
        }

        info!(
            "resolved {} of {} services for {}",
            services.len(),
            self.compose.len(),
            self.overlay.namespace()
        );
        Ok(services)
    }

    /// Resolve services and routes into the complete model.
    pub fn compile(&self) -> Result<DeploymentModel, CoreError> {
        let services = self.resolve_services()?;
        let routes = routes::identify_routes(&services, &self.overlay, &self.fastly)?;
        let change_report = routes::change_report(&services, &self.overlay)?;
        let identity = self.overlay.identity();

        info!(
            "compiled {}: primary route {}",
            self.overlay.namespace(),
            routes.route_set.primary
        );
        Ok(DeploymentModel {
            project: identity.project.clone(),
            environment: self.overlay.environment_name().to_owned(),
            namespace: self.overlay.namespace().to_owned(),
            environment_type: identity.environment_type,
            build_type: identity.build_type,
            backups_enabled: services.iter().any(|s| s.backups_enabled),
            services,
            routes,
            change_report,
        })
    }

    pub fn identify_routes(&self) -> Result<RouteSet, CoreError> {
        let services = self.resolve_services()?;
        let plan = routes::identify_routes(&services, &self.overlay, &self.fastly)?;
        Ok(plan.route_set)
    }

    pub fn change_report(&self) -> Result<ChangeReport, CoreError> {
        let services = self.resolve_services()?;
        routes::change_report(&services, &self.overlay)
    }

    pub fn identify_services(&self) -> Result<IdentifiedServices, CoreError> {
        let services = self.resolve_services()?;
        Ok(IdentifiedServices::from_descriptors(&services))
    }
}

//! Service resolution: one compose service plus the environment overlay in,
//! one resolved `ServiceDescriptor` out.
//!
//! Resolution is a fixed sequence of steps over a draft, each step only
//! narrowing what the previous ones decided: type, route flags, DBaaS,
//! scheduling, cronjobs, volume, image provenance, ports.

use crate::cronjob::{self, Cronjob};
use crate::tables;
use crate::CoreError;
use berth_dbaas::ProbeSession;
use berth_schema::compose::{
    dbaas_environment_label, LABEL_AUTOGENERATED_ROUTE, LABEL_AUTOGENERATED_ROUTE_TLS_ACME,
    LABEL_DEPLOYMENT_SERVICE_TYPE, LABEL_IMAGE, LABEL_NAME, LABEL_PERSISTENT,
    LABEL_PERSISTENT_NAME, LABEL_PERSISTENT_SIZE, LABEL_SERVICE_PORT, LABEL_TYPE,
    LABEL_USE_COMPOSE_PORTS,
};
use berth_schema::{
    ComposePort, ComposeService, ContainerRegistry, EnvironmentOverlay, EnvironmentType,
    OverrideName, ServiceOverride, ServiceType,
};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// `name:type,...` keyed by override name.
pub const SERVICE_TYPES_VARIABLE: &str = "LAGOON_SERVICE_TYPES";
/// `name:environment,...` keyed by override name.
pub const DBAAS_ENVIRONMENT_TYPES_VARIABLE: &str = "LAGOON_DBAAS_ENVIRONMENT_TYPES";

const DEFAULT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_CONTEXT: &str = ".";
const LIBRARY_PREFIX: &str = "library/";

/// Where a service's image comes from. Exactly one source per service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageProvenance {
    Build {
        dockerfile: String,
        context: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        temporary_image: String,
    },
    Pull {
        image: String,
    },
    Promote {
        source_image: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceImage {
    #[serde(flatten)]
    pub provenance: ImageProvenance,
    /// Registry target every image of this run is pushed as.
    pub build_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalServicePort {
    pub name: String,
    pub port: ComposePort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpotPolicy {
    pub use_spot: bool,
    pub force_spot: bool,
    pub cronjob_use_spot: bool,
    pub cronjob_force_spot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub override_name: OverrideName,
    pub service_type: ServiceType,
    pub deployment_service_type: String,
    pub autogenerated_routes_enabled: bool,
    pub autogenerated_routes_tls_acme: bool,
    pub dbaas_environment: String,
    pub is_dbaas: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_size: Option<String>,
    pub spot: SpotPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    pub in_pod_cronjobs: Vec<Cronjob>,
    pub native_cronjobs: Vec<Cronjob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ServiceImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,
    pub additional_service_ports: Vec<AdditionalServicePort>,
    pub backups_enabled: bool,
}

struct Dbaas {
    service_type: String,
    environment: String,
    is_dbaas: bool,
}

/// Resolves services one at a time against a single overlay and probe session.
pub struct ServiceResolver<'a> {
    overlay: &'a EnvironmentOverlay,
    probes: &'a ProbeSession<'a>,
    seed: u64,
    registries: Vec<Regex>,
}

impl<'a> ServiceResolver<'a> {
    pub fn new(overlay: &'a EnvironmentOverlay, probes: &'a ProbeSession<'a>) -> Self {
        Self {
            overlay,
            probes,
            seed: cronjob::schedule_seed(overlay.namespace()),
            registries: compile_registries(&overlay.identity().container_registries),
        }
    }

    /// Resolve one service. `seen` holds the override names of the services
    /// resolved before this one; `Ok(None)` means the service is excluded.
    pub fn resolve(
        &self,
        compose: &ComposeService,
        seen: &HashSet<OverrideName>,
    ) -> Result<Option<ServiceDescriptor>, CoreError> {
        let override_name =
            OverrideName::new(compose.label(LABEL_NAME).unwrap_or(compose.name.as_str()));
        let Some(declared_type) = self.resolve_type(compose, &override_name)? else {
            debug!("service {}: type none, excluded", compose.name);
            return Ok(None);
        };

        let (mut autogen, mut tls_acme) = self.route_flags(compose);
        let dbaas = self.resolve_dbaas(compose, &override_name, declared_type.as_str())?;
        let service_type = ServiceType::new(dbaas.service_type);
        let (spot, replicas) = self.resolve_spot(&service_type)?;
        let (in_pod_cronjobs, native_cronjobs) = self.resolve_cronjobs(compose, &override_name)?;

        if !tables::is_route_capable(&service_type) {
            autogen = false;
            tls_acme = false;
        }
        if seen.contains(&override_name) {
            debug!(
                "service {}: override name '{override_name}' already taken, autogenerated routes disabled",
                compose.name
            );
            autogen = false;
            tls_acme = false;
        }

        let (persistent_path, persistent_name, persistent_size) =
            resolve_volume(compose, &override_name, &service_type);
        let image = self.resolve_image(compose, &service_type)?;
        let (service_port, additional_service_ports) = resolve_ports(compose)?;

        debug!(
            "service {}: type {service_type}, override name {override_name}, autogenerated routes {autogen}",
            compose.name
        );

        Ok(Some(ServiceDescriptor {
            name: compose.name.clone(),
            deployment_service_type: compose
                .label(LABEL_DEPLOYMENT_SERVICE_TYPE)
                .unwrap_or(compose.name.as_str())
                .to_owned(),
            override_name,
            backups_enabled: tables::has_backups(&service_type),
            service_type,
            autogenerated_routes_enabled: autogen,
            autogenerated_routes_tls_acme: tls_acme,
            dbaas_environment: dbaas.environment,
            is_dbaas: dbaas.is_dbaas,
            persistent_path,
            persistent_name,
            persistent_size,
            spot,
            replicas,
            in_pod_cronjobs,
            native_cronjobs,
            image,
            service_port,
            additional_service_ports,
        }))
    }

    /// Label, then the environment's type override, then the global type
    /// list, then the legacy remap. `None` for the `none` sentinel.
    pub(crate) fn resolve_type(
        &self,
        compose: &ComposeService,
        override_name: &str,
    ) -> Result<Option<ServiceType>, CoreError> {
        let mut draft = compose.label(LABEL_TYPE).map(str::to_owned);
        if let Some(ty) = self
            .overlay
            .environment_section()
            .and_then(|s| s.types.get(&compose.name))
            .filter(|t| !t.trim().is_empty())
        {
            draft = Some(ty.trim().to_owned());
        }
        if let Some(ty) = self.keyed_override(SERVICE_TYPES_VARIABLE, override_name)? {
            draft = Some(ty);
        }
        let Some(mut ty) = draft else {
            return Err(CoreError::MissingType {
                service: compose.name.clone(),
            });
        };
        if let Some(current) = tables::legacy_remap(&ty) {
            debug!("service {}: legacy type {ty} remapped to {current}", compose.name);
            ty = current.to_owned();
        }
        let ty = ServiceType::new(ty);
        if ty.is_none() {
            return Ok(None);
        }
        Ok(Some(ty))
    }

    /// Autogenerated route and TLS-acme eligibility before type and collision
    /// checks.
    pub(crate) fn route_flags(&self, compose: &ComposeService) -> (bool, bool) {
        let autogenerate = &self.overlay.manifest().routes.autogenerate;
        let mut enabled = autogenerate.enabled.unwrap_or(true);
        if self.overlay.identity().is_pull_request() {
            if let Some(allow) = autogenerate.allow_pull_requests {
                enabled = allow;
            }
        }
        if let Some(branch) = self
            .overlay
            .branch_section()
            .and_then(|s| s.autogenerate_routes)
        {
            enabled = branch;
        }
        if let Some(label) = compose.bool_label(LABEL_AUTOGENERATED_ROUTE) {
            enabled = label;
        }

        let mut tls_acme = autogenerate.tls_acme.unwrap_or(true);
        if let Some(label) = compose.bool_label(LABEL_AUTOGENERATED_ROUTE_TLS_ACME) {
            tls_acme = label;
        }
        (enabled, tls_acme)
    }

    fn resolve_dbaas(
        &self,
        compose: &ComposeService,
        override_name: &str,
        service_type: &str,
    ) -> Result<Dbaas, CoreError> {
        let mut environment = self.overlay.identity().environment_type.to_string();
        if !tables::is_database(service_type) {
            return Ok(Dbaas {
                service_type: service_type.to_owned(),
                environment,
                is_dbaas: false,
            });
        }
        let base = service_type.strip_suffix("-dbaas").unwrap_or(service_type);
        let single = format!("{base}-single");
        if !self.probes.healthy() {
            return Ok(Dbaas {
                service_type: single,
                environment,
                is_dbaas: false,
            });
        }

        if let Some(label) = compose.label(&dbaas_environment_label(base)) {
            environment = label.to_owned();
        }
        if let Some(env) = self.keyed_override(DBAAS_ENVIRONMENT_TYPES_VARIABLE, override_name)? {
            environment = env;
        }

        if self.probes.environment_exists(base, &environment) {
            Ok(Dbaas {
                service_type: format!("{base}-dbaas"),
                environment,
                is_dbaas: true,
            })
        } else {
            debug!(
                "service {}: no {base} DBaaS provider for '{environment}', using {single}",
                compose.name
            );
            Ok(Dbaas {
                service_type: single,
                environment,
                is_dbaas: false,
            })
        }
    }

    fn resolve_spot(&self, service_type: &str) -> Result<(SpotPolicy, Option<u32>), CoreError> {
        let environment_type = self.overlay.identity().environment_type;
        let prefix = match environment_type {
            EnvironmentType::Production => "SPOT_INSTANCE_PRODUCTION",
            EnvironmentType::Development => "SPOT_INSTANCE_DEVELOPMENT",
        };
        let mut spot = SpotPolicy::default();
        if self.overlay.feature_flag(prefix) == Some("enabled") {
            let types_key = format!("{prefix}_TYPES");
            let cronjob_key = format!("{prefix}_CRONJOB_TYPES");
            if let Some(policy) = self.spot_policy(&types_key, service_type)? {
                spot.use_spot = true;
                spot.force_spot = policy == "force";
            }
            if let Some(policy) = self.spot_policy(&cronjob_key, service_type)? {
                spot.cronjob_use_spot = true;
                spot.cronjob_force_spot = policy == "force";
            }
        }
        let replicas = (environment_type == EnvironmentType::Production
            && tables::has_production_replicas(service_type))
        .then_some(2);
        Ok((spot, replicas))
    }

    fn spot_policy(&self, key: &str, service_type: &str) -> Result<Option<String>, CoreError> {
        let Some(list) = self.overlay.feature_flag(key) else {
            return Ok(None);
        };
        let mut policy = None;
        for (ty, value) in parse_pairs(key, list)? {
            if ty == service_type && !value.is_empty() {
                policy = Some(value.to_owned());
            }
        }
        Ok(policy)
    }

    fn resolve_cronjobs(
        &self,
        compose: &ComposeService,
        override_name: &str,
    ) -> Result<(Vec<Cronjob>, Vec<Cronjob>), CoreError> {
        let mut in_pod = Vec::new();
        let mut native = Vec::new();
        if self.overlay.identity().cronjobs_disabled {
            return Ok((in_pod, native));
        }
        let Some(section) = self.overlay.branch_section() else {
            return Ok((in_pod, native));
        };
        for declaration in section.cronjobs.iter().filter(|c| c.service == compose.name) {
            let job = cronjob::normalize(declaration, override_name, self.seed)?;
            if job.in_pod {
                in_pod.push(job);
            } else {
                native.push(job);
            }
        }
        Ok((in_pod, native))
    }

    fn service_override(&self, service: &str) -> Option<&'a ServiceOverride> {
        self.overlay
            .environment_section()
            .and_then(|s| s.overrides.get(service))
    }

    pub(crate) fn resolve_image(
        &self,
        compose: &ComposeService,
        service_type: &str,
    ) -> Result<Option<ServiceImage>, CoreError> {
        if tables::is_imageless(service_type) {
            return Ok(None);
        }
        let identity = self.overlay.identity();
        let registry = identity.image_registry.as_deref();
        let build_image = image_reference(
            registry,
            &identity.project,
            self.overlay.environment_name(),
            &compose.name,
        );

        let provenance = if identity.is_promote() {
            let source = identity
                .promotion_source_environment
                .as_deref()
                .unwrap_or_default();
            ImageProvenance::Promote {
                source_image: image_reference(registry, &identity.project, source, &compose.name),
            }
        } else if let Some(build) = self.build_provenance(compose)? {
            build
        } else {
            ImageProvenance::Pull {
                image: self.pull_image(compose)?,
            }
        };
        Ok(Some(ServiceImage {
            provenance,
            build_image,
        }))
    }

    fn build_provenance(
        &self,
        compose: &ComposeService,
    ) -> Result<Option<ImageProvenance>, CoreError> {
        let build_override = self.service_override(&compose.name).map(|o| &o.build);
        let mut dockerfile = compose.build.as_ref().map(|b| {
            non_empty(b.dockerfile.as_deref())
                .unwrap_or(DEFAULT_DOCKERFILE)
                .to_owned()
        });
        let mut context = compose
            .build
            .as_ref()
            .map(|b| non_empty(b.context.as_deref()).unwrap_or(DEFAULT_CONTEXT).to_owned());
        if let Some(file) = build_override.and_then(|b| non_empty(b.dockerfile.as_deref())) {
            dockerfile = Some(file.to_owned());
            context.get_or_insert_with(|| DEFAULT_CONTEXT.to_owned());
        }
        let Some(dockerfile) = dockerfile else {
            return Ok(None);
        };
        let context = build_override
            .and_then(|b| non_empty(b.context.as_deref()))
            .map(str::to_owned)
            .or(context)
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_owned());

        let root = self
            .overlay
            .identity()
            .source_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTEXT));
        if !root.join(&context).join(&dockerfile).is_file() {
            return Err(CoreError::DockerfileNotFound {
                service: compose.name.clone(),
                path: format!("{context}/{dockerfile}"),
            });
        }

        Ok(Some(ImageProvenance::Build {
            dockerfile,
            context,
            target: compose
                .build
                .as_ref()
                .and_then(|b| non_empty(b.target.as_deref()))
                .map(str::to_owned),
            temporary_image: format!("{}-{}", self.overlay.namespace(), compose.name),
        }))
    }

    /// Manifest image override, then the image label (both variable
    /// substituted), then the compose image.
    fn pull_image(&self, compose: &ComposeService) -> Result<String, CoreError> {
        let missing = || CoreError::MissingImage {
            service: compose.name.clone(),
        };
        let override_image = self
            .service_override(&compose.name)
            .and_then(|o| non_empty(o.image.as_deref()))
            .or_else(|| compose.label(LABEL_IMAGE));
        let image = match override_image {
            Some(raw) => substitute_variables(raw, |name| self.overlay.build_variable(name))
                .map_err(|reason| CoreError::ImageSubstitution {
                    service: compose.name.clone(),
                    image: raw.to_owned(),
                    reason,
                })?,
            None => non_empty(compose.image.as_deref())
                .ok_or_else(missing)?
                .to_owned(),
        };
        if image.trim().is_empty() {
            return Err(missing());
        }

        let identity = self.overlay.identity();
        let mut pull = if image.contains('/') {
            image.clone()
        } else {
            format!("{LIBRARY_PREFIX}{image}")
        };
        if !self.registries.iter().any(|re| re.is_match(&image)) {
            if let Some(cache) = non_empty(identity.image_cache.as_deref()) {
                if image.matches('/').count() == 1 {
                    pull = format!("{cache}{pull}");
                }
            }
        }
        Ok(pull)
    }

    /// Last entry for `key` in a `key:value,...` variable.
    fn keyed_override(&self, variable: &str, key: &str) -> Result<Option<String>, CoreError> {
        let Some(list) = self.overlay.build_variable(variable) else {
            return Ok(None);
        };
        Ok(parse_pairs(variable, list)?
            .into_iter()
            .filter(|(k, _)| *k == key)
            .last()
            .map(|(_, v)| v.to_owned()))
    }
}

fn resolve_volume(
    compose: &ComposeService,
    override_name: &str,
    service_type: &str,
) -> (Option<String>, Option<String>, Option<String>) {
    let defaults = tables::default_volume(service_type);
    let path = compose
        .label(LABEL_PERSISTENT)
        .or(defaults.map(|(path, _)| path))
        .map(str::to_owned);
    let size = compose
        .label(LABEL_PERSISTENT_SIZE)
        .or(defaults.map(|(_, size)| size))
        .map(str::to_owned);
    let name = compose
        .label(LABEL_PERSISTENT_NAME)
        .map(str::to_owned)
        .or_else(|| path.as_ref().map(|_| override_name.to_owned()));
    (path, name, size)
}

fn resolve_ports(
    compose: &ComposeService,
) -> Result<(Option<u16>, Vec<AdditionalServicePort>), CoreError> {
    let service_port = compose
        .label(LABEL_SERVICE_PORT)
        .map(|value| {
            value.parse::<u16>().map_err(|_| CoreError::InvalidServicePort {
                service: compose.name.clone(),
                value: value.to_owned(),
            })
        })
        .transpose()?;
    let additional = if compose.label(LABEL_USE_COMPOSE_PORTS) == Some("true") {
        compose
            .ports
            .iter()
            .map(|port| AdditionalServicePort {
                name: format!("{}-{}", compose.name, port.target),
                port: port.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };
    Ok((service_port, additional))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `<registry>/<project>/<environment>/<service>:latest`
fn image_reference(
    registry: Option<&str>,
    project: &str,
    environment: &str,
    service: &str,
) -> String {
    match non_empty(registry) {
        Some(registry) => format!("{registry}/{project}/{environment}/{service}:latest"),
        None => format!("{project}/{environment}/{service}:latest"),
    }
}

/// Allow-listed registry expressions. Invalid expressions are skipped and
/// never match.
fn compile_registries(registries: &[ContainerRegistry]) -> Vec<Regex> {
    registries
        .iter()
        .filter_map(|registry| match Regex::new(&registry.url) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("ignoring container registry '{}': {e}", registry.name);
                None
            }
        })
        .collect()
}

/// Split `a:b,c:d` into pairs. Empty entries are skipped; an entry without a
/// `:` is an error.
pub(crate) fn parse_pairs<'v>(
    name: &str,
    value: &'v str,
) -> Result<Vec<(&'v str, &'v str)>, CoreError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| CoreError::InvalidVariable {
                    name: name.to_owned(),
                    reason: format!("entry '{entry}' is not of the form name:value"),
                })
        })
        .collect()
}

/// Expand `${VAR}` and `$VAR`. Unknown variables expand to nothing; `$$`
/// is a literal `$`.
pub(crate) fn substitute_variables<'v>(
    input: &str,
    lookup: impl Fn(&str) -> Option<&'v str>,
) -> Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(braced) = after.strip_prefix('{') {
            let end = braced
                .find('}')
                .ok_or_else(|| format!("unterminated '${{' in '{input}'"))?;
            out.push_str(lookup(&braced[..end]).unwrap_or_default());
            rest = &braced[end + 1..];
        } else if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
        } else {
            let len = after
                .char_indices()
                .find(|(i, c)| {
                    !(c.is_ascii_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit())
                })
                .map_or(after.len(), |(i, _)| i);
            if len == 0 {
                out.push('$');
            } else {
                out.push_str(lookup(&after[..len]).unwrap_or_default());
            }
            rest = &after[len..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

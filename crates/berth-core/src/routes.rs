//! Route identification: autogenerated and declared routes, the resulting
//! primary/secondary/autogenerated domain sets, and the change report.

use crate::fastly::{self, FastlyConfig, FastlyOptions};
use crate::service::ServiceDescriptor;
use crate::CoreError;
use berth_schema::{make_safe, EnvironmentOverlay, RouteDeclaration, RouteGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const SCHEME: &str = "https://";
const MAX_LABEL_LEN: usize = 63;
const SHORT_HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub domain: String,
    /// Override name of the service the route points at.
    pub service: String,
    pub autogenerated: bool,
    pub tls_acme: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsts: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternative_names: Vec<String>,
    pub wildcard: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,
    /// Hashed form used when the first label is too long for a certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_domain: Option<String>,
    #[serde(skip_serializing_if = "FastlyConfig::is_empty")]
    pub fastly: FastlyConfig,
}

impl Route {
    /// The route's domain followed by its alternative names.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.domain.as_str())
            .chain(self.alternative_names.iter().map(String::as_str))
    }
}

/// Name of the ingress a declared route becomes.
pub fn ingress_name(declaration: &RouteDeclaration) -> String {
    if declaration.wildcard {
        format!("wildcard-{}", declaration.domain)
    } else {
        declaration.domain.clone()
    }
}

/// `{"primary": ..., "secondary": [...], "autogenerated": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    pub primary: String,
    pub secondary: Vec<String>,
    pub autogenerated: Vec<String>,
}

/// Same shape as [`RouteSet`], with ingress and override names instead of
/// URLs and an always empty primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub primary: String,
    pub secondary: Vec<String>,
    pub autogenerated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutePlan {
    pub autogenerated: Vec<Route>,
    pub declared: Vec<Route>,
    pub route_set: RouteSet,
}

/// Declared route groups for the current branch, then the active or standby
/// groups when this environment is one side of a pair.
struct DeclaredGroups<'a> {
    branch: &'a [RouteGroup],
    production: &'a [RouteGroup],
}

impl<'a> DeclaredGroups<'a> {
    fn new(overlay: &'a EnvironmentOverlay) -> Self {
        let identity = overlay.identity();
        let pairs = &overlay.manifest().production_routes;
        let production: &[RouteGroup] = if identity.is_active() {
            &pairs.active.routes
        } else if identity.is_standby() {
            &pairs.standby.routes
        } else {
            &[]
        };
        Self {
            branch: overlay
                .branch_section()
                .map_or(&[][..], |s| s.routes.as_slice()),
            production,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'a RouteGroup, &'a RouteDeclaration)> {
        let (branch, production) = (self.branch, self.production);
        branch
            .iter()
            .chain(production)
            .flat_map(|group| group.routes.iter().map(move |route| (group, route)))
    }

    fn first_production(&self) -> Option<&'a RouteDeclaration> {
        let production = self.production;
        production.iter().flat_map(|g| g.routes.iter()).next()
    }
}

fn validate(declaration: &RouteDeclaration) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidRoute {
        domain: declaration.domain.clone(),
        reason: reason.to_owned(),
    };
    let domain = declaration.domain.as_str();
    if domain.trim().is_empty() {
        return Err(invalid("domain is empty"));
    }
    if domain.contains("://") {
        return Err(invalid("domain must not include a scheme"));
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(invalid("domain must not contain whitespace"));
    }
    Ok(())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Expand the router pattern for one service. Patterns without a
/// `${service}` placeholder get the service prepended as a subdomain.
pub fn autogenerated_domain(
    pattern: &str,
    service: &str,
    project: &str,
    environment: &str,
) -> String {
    let domain = pattern
        .replace("${service}", service)
        .replace("${project}", &make_safe(project))
        .replace("${environment}", &make_safe(environment));
    if pattern.contains("${service}") {
        domain
    } else {
        format!("{service}.{domain}")
    }
}

/// `<hash>.<rest>` when the first label exceeds the DNS label limit.
pub fn short_domain(domain: &str) -> Option<String> {
    let (first, rest) = domain.split_once('.').unwrap_or((domain, ""));
    if first.len() <= MAX_LABEL_LEN {
        return None;
    }
    let hash = blake3::hash(domain.as_bytes()).to_hex();
    let hash = &hash[..SHORT_HASH_LEN];
    Some(if rest.is_empty() {
        hash.to_owned()
    } else {
        format!("{hash}.{rest}")
    })
}

fn autogenerated_routes(
    services: &[ServiceDescriptor],
    overlay: &EnvironmentOverlay,
) -> Vec<Route> {
    let pattern = overlay.router_pattern();
    let identity = overlay.identity();
    let autogenerate = &overlay.manifest().routes.autogenerate;
    services
        .iter()
        .filter(|s| s.autogenerated_routes_enabled)
        .map(|service| {
            let domain = autogenerated_domain(
                pattern,
                &service.override_name,
                &identity.project,
                overlay.environment_name(),
            );
            Route {
                alternative_names: autogenerate
                    .prefixes
                    .iter()
                    .map(|prefix| format!("{prefix}.{domain}"))
                    .collect(),
                short_domain: short_domain(&domain),
                domain,
                service: service.override_name.to_string(),
                autogenerated: true,
                tls_acme: service.autogenerated_routes_tls_acme,
                insecure: autogenerate.insecure.clone(),
                hsts: None,
                annotations: BTreeMap::new(),
                wildcard: false,
                ingress_class: None,
                fastly: FastlyConfig::default(),
            }
        })
        .collect()
}

fn declared_route(
    group: &RouteGroup,
    declaration: &RouteDeclaration,
    overlay: &EnvironmentOverlay,
    fastly_options: &FastlyOptions,
) -> Route {
    Route {
        domain: declaration.domain.clone(),
        service: group.service.clone(),
        autogenerated: false,
        tls_acme: declaration.tls_acme.unwrap_or(true),
        insecure: declaration.insecure.clone(),
        hsts: declaration.hsts.clone(),
        annotations: declaration.annotations.clone(),
        alternative_names: declaration.alternative_names.clone(),
        wildcard: declaration.wildcard,
        ingress_class: declaration.ingress_class.clone(),
        short_domain: None,
        fastly: fastly::resolve(fastly_options, &declaration.domain, overlay.variables()),
    }
}

fn warn_unknown_services(services: &[ServiceDescriptor], groups: &DeclaredGroups<'_>) {
    let mut warned: Vec<&str> = Vec::new();
    for (group, _) in groups.iter() {
        let known = services
            .iter()
            .any(|s| s.name == group.service || s.override_name == group.service);
        if !known && !warned.contains(&group.service.as_str()) {
            warn!("routes declared for unknown service '{}'", group.service);
            warned.push(&group.service);
        }
    }
}

/// Build every route for this run and the primary/secondary/autogenerated
/// domain sets.
pub fn identify_routes(
    services: &[ServiceDescriptor],
    overlay: &EnvironmentOverlay,
    fastly_options: &FastlyOptions,
) -> Result<RoutePlan, CoreError> {
    let groups = DeclaredGroups::new(overlay);
    warn_unknown_services(services, &groups);

    let autogenerated = autogenerated_routes(services, overlay);
    let declared = groups
        .iter()
        .map(|(group, declaration)| {
            validate(declaration)?;
            Ok(declared_route(group, declaration, overlay, fastly_options))
        })
        .collect::<Result<Vec<Route>, CoreError>>()?;

    let mut route_set = RouteSet::default();
    for route in &autogenerated {
        for domain in route.domains() {
            push_unique(&mut route_set.autogenerated, format!("{SCHEME}{domain}"));
            push_unique(&mut route_set.secondary, format!("{SCHEME}{domain}"));
        }
    }
    for route in &declared {
        for domain in route.domains() {
            push_unique(&mut route_set.secondary, format!("{SCHEME}{domain}"));
        }
    }

    let primary = groups
        .first_production()
        .map(|d| d.domain.as_str())
        .or_else(|| declared.first().map(|r| r.domain.as_str()))
        .or_else(|| autogenerated.first().map(|r| r.domain.as_str()));
    route_set.primary = match primary {
        Some(domain) => format!("{SCHEME}{domain}"),
        None => {
            let fallback = format!("{SCHEME}{}.local", overlay.namespace());
            debug!("no routes for {}, using {fallback}", overlay.namespace());
            route_set.secondary = vec![fallback.clone()];
            fallback
        }
    };

    Ok(RoutePlan {
        autogenerated,
        declared,
        route_set,
    })
}

/// Ingress names of the declared routes and override names of the services
/// owning autogenerated routes. Never synthesizes domains.
pub fn change_report(
    services: &[ServiceDescriptor],
    overlay: &EnvironmentOverlay,
) -> Result<ChangeReport, CoreError> {
    let mut report = ChangeReport::default();
    for (_, declaration) in DeclaredGroups::new(overlay).iter() {
        validate(declaration)?;
        push_unique(&mut report.secondary, ingress_name(declaration));
    }
    for service in services.iter().filter(|s| s.autogenerated_routes_enabled) {
        push_unique(&mut report.autogenerated, service.override_name.to_string());
    }
    Ok(report)
}

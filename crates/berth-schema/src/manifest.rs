use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed deployment manifest.
///
/// Environment sections keep their declaration order: branch lookups fall back
/// to the first key that matches as a pattern.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub routes: RoutesSection,
    #[serde(default)]
    pub environments: IndexMap<String, EnvironmentSection>,
    #[serde(default, rename = "production_routes")]
    pub production_routes: ProductionRoutes,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RoutesSection {
    #[serde(default)]
    pub autogenerate: AutogenerateSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AutogenerateSection {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, rename = "allowPullrequests")]
    pub allow_pull_requests: Option<bool>,
    #[serde(default, rename = "tls-acme")]
    pub tls_acme: Option<bool>,
    #[serde(default)]
    pub insecure: Option<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSection {
    #[serde(default, rename = "autogenerateRoutes")]
    pub autogenerate_routes: Option<bool>,
    #[serde(default)]
    pub routes: Vec<RouteGroup>,
    #[serde(default)]
    pub types: BTreeMap<String, String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, ServiceOverride>,
    #[serde(default)]
    pub cronjobs: Vec<CronjobDeclaration>,
}

/// Routes declared for one service.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteGroup {
    pub service: String,
    #[serde(default)]
    pub routes: Vec<RouteDeclaration>,
}

/// A declared route. Deserializes from either a bare domain string or a
/// detailed object.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "RouteEntry")]
pub struct RouteDeclaration {
    pub domain: String,
    #[serde(rename = "tls-acme")]
    pub tls_acme: Option<bool>,
    pub insecure: Option<String>,
    pub hsts: Option<String>,
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "alternativenames")]
    pub alternative_names: Vec<String>,
    pub wildcard: bool,
    #[serde(rename = "ingressClass")]
    pub ingress_class: Option<String>,
}

impl RouteDeclaration {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RouteEntry {
    Domain(String),
    Detailed(DetailedRoute),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedRoute {
    domain: String,
    #[serde(default, rename = "tls-acme")]
    tls_acme: Option<bool>,
    #[serde(default)]
    insecure: Option<String>,
    #[serde(default)]
    hsts: Option<String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default, rename = "alternativenames")]
    alternative_names: Vec<String>,
    #[serde(default)]
    wildcard: bool,
    #[serde(default, rename = "ingressClass")]
    ingress_class: Option<String>,
}

impl From<RouteEntry> for RouteDeclaration {
    fn from(entry: RouteEntry) -> Self {
        match entry {
            RouteEntry::Domain(domain) => RouteDeclaration::new(domain),
            RouteEntry::Detailed(d) => RouteDeclaration {
                domain: d.domain,
                tls_acme: d.tls_acme,
                insecure: d.insecure,
                hsts: d.hsts,
                annotations: d.annotations,
                alternative_names: d.alternative_names,
                wildcard: d.wildcard,
                ingress_class: d.ingress_class,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceOverride {
    #[serde(default)]
    pub build: BuildOverride,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildOverride {
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CronjobDeclaration {
    pub name: String,
    pub schedule: String,
    pub command: String,
    pub service: String,
}

/// Routes that only exist on the active or the standby side of an
/// active/standby pair.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProductionRoutes {
    #[serde(default)]
    pub active: RouteList,
    #[serde(default)]
    pub standby: RouteList,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteList {
    #[serde(default)]
    pub routes: Vec<RouteGroup>,
}

impl Manifest {
    /// Section keyed exactly by environment name.
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSection> {
        self.environments.get(name)
    }

    /// Section for a branch: the exact key, else the first key that matches
    /// the branch as an anchored regular expression. Keys that are not valid
    /// expressions only ever match exactly.
    pub fn branch_environment(&self, branch: &str) -> Option<&EnvironmentSection> {
        if let Some(section) = self.environments.get(branch) {
            return Some(section);
        }
        self.environments.iter().find_map(|(key, section)| {
            let re = Regex::new(&format!("^(?:{key})$")).ok()?;
            re.is_match(branch).then_some(section)
        })
    }
}

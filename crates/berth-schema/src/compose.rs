use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label declaring the service type.
pub const LABEL_TYPE: &str = "lagoon.type";
/// Label replacing the override name.
pub const LABEL_NAME: &str = "lagoon.name";
pub const LABEL_AUTOGENERATED_ROUTE: &str = "lagoon.autogeneratedroute";
pub const LABEL_AUTOGENERATED_ROUTE_TLS_ACME: &str = "lagoon.autogeneratedroute.tls-acme";
pub const LABEL_DEPLOYMENT_SERVICE_TYPE: &str = "lagoon.deployment.servicetype";
pub const LABEL_PERSISTENT: &str = "lagoon.persistent";
pub const LABEL_PERSISTENT_NAME: &str = "lagoon.persistent.name";
pub const LABEL_PERSISTENT_SIZE: &str = "lagoon.persistent.size";
pub const LABEL_IMAGE: &str = "lagoon.image";
pub const LABEL_SERVICE_PORT: &str = "lagoon.service.port";
pub const LABEL_USE_COMPOSE_PORTS: &str = "lagoon.service.usecomposeports";

/// Label naming the DBaaS environment for a database type, for example
/// `lagoon.mariadb-dbaas.environment`.
pub fn dbaas_environment_label(db_type: &str) -> String {
    format!("lagoon.{db_type}-dbaas.environment")
}

/// One service of the compose file, in declaration order.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComposeService {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<BuildSpec>,
    #[serde(default)]
    pub ports: Vec<ComposePort>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComposePort {
    pub target: u16,
    #[serde(default)]
    pub published: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_owned()
}

impl ComposeService {
    /// Value of a label, treating an empty or whitespace-only value as absent.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Boolean label; unparseable values are ignored like absent ones.
    pub fn bool_label(&self, key: &str) -> Option<bool> {
        self.label(key).and_then(parse_bool)
    }
}

/// Accepts the spellings compose files use for booleans.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(labels: &[(&str, &str)]) -> ComposeService {
        ComposeService {
            name: "node".to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            ..ComposeService::default()
        }
    }

    #[test]
    fn empty_label_is_absent() {
        let svc = service_with(&[(LABEL_TYPE, "  ")]);
        assert_eq!(svc.label(LABEL_TYPE), None);
    }

    #[test]
    fn bool_label_ignores_garbage() {
        let svc = service_with(&[
            (LABEL_AUTOGENERATED_ROUTE, "false"),
            (LABEL_AUTOGENERATED_ROUTE_TLS_ACME, "nope"),
        ]);
        assert_eq!(svc.bool_label(LABEL_AUTOGENERATED_ROUTE), Some(false));
        assert_eq!(svc.bool_label(LABEL_AUTOGENERATED_ROUTE_TLS_ACME), None);
    }

    #[test]
    fn dbaas_label_is_type_specific() {
        assert_eq!(
            dbaas_environment_label("mariadb"),
            "lagoon.mariadb-dbaas.environment"
        );
    }

    #[test]
    fn port_protocol_defaults_to_tcp() {
        let port: ComposePort = serde_json::from_str(r#"{"target": 8080}"#).unwrap();
        assert_eq!(port.protocol, "tcp");
        assert_eq!(port.published, None);
    }
}

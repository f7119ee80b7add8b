//! Fastly CDN configuration for a route, from the legacy service-id variables.

use berth_schema::compose::parse_bool;
use berth_schema::EnvironmentVariable;
use serde::Serialize;
use tracing::warn;

/// `serviceID:watch[:secretName]`, used for every route.
pub const SERVICE_ID_VARIABLE: &str = "LAGOON_FASTLY_SERVICE_ID";
/// `domain:serviceID:watch[:secretName],...`, matched by literal domain.
pub const SERVICE_IDS_VARIABLE: &str = "LAGOON_FASTLY_SERVICE_IDS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FastlyConfig {
    pub service_id: String,
    pub watch: bool,
    pub api_secret_name: String,
    pub no_cache_service_id: String,
}

impl FastlyConfig {
    pub fn is_empty(&self) -> bool {
        self.service_id.is_empty() && self.api_secret_name.is_empty()
    }
}

/// Values supplied by the caller rather than the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastlyOptions {
    pub no_cache_service_id: Option<String>,
    pub service_id: Option<String>,
    pub api_secret_prefix: Option<String>,
}

struct ServiceTuple<'a> {
    service_id: &'a str,
    watch: bool,
    secret: Option<&'a str>,
}

fn parse_tuple<'a>(parts: &[&'a str]) -> Option<ServiceTuple<'a>> {
    match parts {
        [id, watch] | [id, watch, ""] if !id.is_empty() => Some(ServiceTuple {
            service_id: *id,
            watch: parse_bool(watch)?,
            secret: None,
        }),
        [id, watch, secret] if !id.is_empty() => Some(ServiceTuple {
            service_id: *id,
            watch: parse_bool(watch)?,
            secret: Some(*secret),
        }),
        _ => None,
    }
}

fn apply(config: &mut FastlyConfig, tuple: &ServiceTuple<'_>) {
    config.service_id = tuple.service_id.to_owned();
    config.watch = tuple.watch;
    if let Some(secret) = tuple.secret {
        config.api_secret_name = secret.to_owned();
    }
}

fn variable<'a>(variables: &'a [EnvironmentVariable], name: &str) -> Option<&'a str> {
    variables
        .iter()
        .find(|v| v.name == name)
        .map(|v| v.value.trim())
        .filter(|v| !v.is_empty())
}

/// Resolve the Fastly configuration for `route`. Never fails: malformed
/// entries are skipped and no match yields an empty config.
pub fn resolve(
    options: &FastlyOptions,
    route: &str,
    variables: &[EnvironmentVariable],
) -> FastlyConfig {
    let mut config = FastlyConfig::default();

    if let Some(no_cache) = options.no_cache_service_id.as_deref().filter(|s| !s.is_empty()) {
        config.no_cache_service_id = no_cache.to_owned();
        config.service_id = no_cache.to_owned();
        config.watch = true;
    }

    if let Some(value) = variable(variables, SERVICE_ID_VARIABLE) {
        let parts: Vec<&str> = value.split(':').collect();
        match parse_tuple(&parts) {
            Some(tuple) => apply(&mut config, &tuple),
            None => warn!("ignoring malformed {SERVICE_ID_VARIABLE} value '{value}'"),
        }
    }

    if let Some(value) = variable(variables, SERVICE_IDS_VARIABLE) {
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            let Some((domain, rest)) = parts.split_first() else {
                continue;
            };
            let Some(tuple) = parse_tuple(rest) else {
                warn!("ignoring malformed {SERVICE_IDS_VARIABLE} entry '{entry}'");
                continue;
            };
            if *domain == route {
                apply(&mut config, &tuple);
                break;
            }
        }
    }

    if let Some(service_id) = options.service_id.as_deref().filter(|s| !s.is_empty()) {
        config.service_id = service_id.to_owned();
        config.watch = true;
    }

    if let Some(prefix) = options.api_secret_prefix.as_deref() {
        if !config.api_secret_name.is_empty() {
            config.api_secret_name = format!("{prefix}{}", config.api_secret_name);
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_schema::VariableScope;

    fn vars(entries: &[(&str, &str)]) -> Vec<EnvironmentVariable> {
        entries
            .iter()
            .map(|(n, v)| EnvironmentVariable::new(n, v, VariableScope::Global))
            .collect()
    }

    #[test]
    fn no_variables_yields_empty_config() {
        let config = resolve(&FastlyOptions::default(), "example.com", &[]);
        assert_eq!(config, FastlyConfig::default());
        assert!(config.is_empty());
    }

    #[test]
    fn global_service_id() {
        let config = resolve(
            &FastlyOptions::default(),
            "",
            &vars(&[(SERVICE_ID_VARIABLE, "1234567:true")]),
        );
        assert_eq!(config.service_id, "1234567");
        assert!(config.watch);
        assert_eq!(config.api_secret_name, "");
    }

    #[test]
    fn global_service_id_with_secret() {
        let config = resolve(
            &FastlyOptions::default(),
            "",
            &vars(&[(SERVICE_ID_VARIABLE, "1234567:true:secretname")]),
        );
        assert_eq!(config.service_id, "1234567");
        assert_eq!(config.api_secret_name, "secretname");
    }

    #[test]
    fn per_domain_service_ids() {
        let config = resolve(
            &FastlyOptions::default(),
            "example.com",
            &vars(&[(SERVICE_IDS_VARIABLE, "example.com:service-id:true:annotationscom")]),
        );
        assert_eq!(
            config,
            FastlyConfig {
                service_id: "service-id".to_owned(),
                watch: true,
                api_secret_name: "annotationscom".to_owned(),
                no_cache_service_id: String::new(),
            }
        );
    }

    #[test]
    fn per_domain_match_is_literal() {
        let variables = vars(&[(
            SERVICE_IDS_VARIABLE,
            "www.example.com:abcdefg:true:secretname,example.com:1234567:false:other",
        )]);
        let www = resolve(&FastlyOptions::default(), "www.example.com", &variables);
        assert_eq!(www.service_id, "abcdefg");
        let apex = resolve(&FastlyOptions::default(), "example.com", &variables);
        assert_eq!(apex.service_id, "1234567");
        assert!(!apex.watch);
        let other = resolve(&FastlyOptions::default(), "sub.example.com", &variables);
        assert!(other.is_empty());
    }

    #[test]
    fn per_domain_overrides_global() {
        let variables = vars(&[
            (SERVICE_ID_VARIABLE, "global:true"),
            (SERVICE_IDS_VARIABLE, "example.com:specific:true"),
        ]);
        assert_eq!(
            resolve(&FastlyOptions::default(), "example.com", &variables).service_id,
            "specific"
        );
        assert_eq!(
            resolve(&FastlyOptions::default(), "other.com", &variables).service_id,
            "global"
        );
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let variables = vars(&[(
            SERVICE_IDS_VARIABLE,
            "example.com:broken,example.com:good:true",
        )]);
        assert_eq!(
            resolve(&FastlyOptions::default(), "example.com", &variables).service_id,
            "good"
        );
        let global = vars(&[(SERVICE_ID_VARIABLE, "only-an-id")]);
        assert!(resolve(&FastlyOptions::default(), "", &global).is_empty());
    }

    #[test]
    fn caller_values_override_variables() {
        let options = FastlyOptions {
            no_cache_service_id: Some("nocache".to_owned()),
            service_id: Some("cli-id".to_owned()),
            api_secret_prefix: Some("fastly-api-".to_owned()),
        };
        let variables = vars(&[(SERVICE_ID_VARIABLE, "1234567:false:secret")]);
        let config = resolve(&options, "example.com", &variables);
        assert_eq!(config.service_id, "cli-id");
        assert!(config.watch);
        assert_eq!(config.api_secret_name, "fastly-api-secret");
        assert_eq!(config.no_cache_service_id, "nocache");
    }

    #[test]
    fn no_cache_service_id_is_the_base() {
        let options = FastlyOptions {
            no_cache_service_id: Some("nocache".to_owned()),
            ..FastlyOptions::default()
        };
        let config = resolve(&options, "example.com", &[]);
        assert_eq!(config.service_id, "nocache");
        assert!(config.watch);
    }
}

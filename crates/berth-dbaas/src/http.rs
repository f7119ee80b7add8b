use crate::{DbaasConfig, DbaasError, DbaasProvider};
use serde::Deserialize;
use std::io::Read;

/// Provider error text reported for an environment with no provider; treated as "absent".
const NO_PROVIDERS_MESSAGE: &str = "no providers for dbaas environment";

/// HTTP-based DBaaS provider.
///
/// Expects a small REST API:
/// - `GET /healthz`: 200 when healthy
/// - `GET /<type>/<environment>`: `{"result": {"found": bool}, "error": "..."}`
pub struct HttpProvider {
    config: DbaasConfig,
    agent: ureq::Agent,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    result: ProviderResult,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderResult {
    #[serde(default)]
    found: bool,
}

impl HttpProvider {
    pub fn new(config: DbaasConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        Self { config, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint, path)
    }

    fn do_get(&self, url: &str) -> Result<Vec<u8>, DbaasError> {
        let resp = match self.agent.get(url).call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(DbaasError::NotFound(url.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(DbaasError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(DbaasError::Http(e.to_string()));
            }
        };

        let code = resp.status().as_u16();
        if code == 404 {
            return Err(DbaasError::NotFound(url.to_owned()));
        }
        if code >= 400 {
            return Err(DbaasError::Http(format!("HTTP {code} for {url}")));
        }

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| DbaasError::Http(e.to_string()))?;
        Ok(body)
    }
}

impl DbaasProvider for HttpProvider {
    fn check_health(&self) -> Result<(), DbaasError> {
        let url = self.url("healthz");
        tracing::debug!("GET {url}");
        self.do_get(&url).map(|_| ())
    }

    fn environment_exists(&self, db_type: &str, environment: &str) -> Result<bool, DbaasError> {
        let url = self.url(&format!("{db_type}/{environment}"));
        tracing::debug!("GET {url}");
        let body = match self.do_get(&url) {
            Ok(body) => body,
            Err(DbaasError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let resp: ProviderResponse =
            serde_json::from_slice(&body).map_err(|e| DbaasError::Response(e.to_string()))?;
        if !resp.error.is_empty() {
            if resp.error.contains(NO_PROVIDERS_MESSAGE) {
                return Ok(false);
            }
            return Err(DbaasError::Provider(resp.error));
        }
        Ok(resp.result.found)
    }
}

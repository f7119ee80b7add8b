pub mod completions;
pub mod identify;
pub mod man_pages;
pub mod resolve;

use berth_core::{CoreError, Engine, FastlyOptions};
use berth_dbaas::config::default_config_path;
use berth_dbaas::{DbaasConfig, DbaasError, DbaasProvider, HttpProvider, Unconfigured};
use berth_schema::parse_input_file;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INPUT_ERROR: u8 = 2;
pub const EXIT_RESOLUTION_ERROR: u8 = 3;

const INPUT_ERROR_PREFIX: &str = "input error:";
const RESOLUTION_ERROR_PREFIX: &str = "resolution error:";

/// Everything a command needs to build an engine for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub input: PathBuf,
    pub dbaas_config: Option<PathBuf>,
    pub dbaas_endpoint: Option<String>,
    pub fastly: FastlyOptions,
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn json_compact(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Exit code for an error message produced by a command.
pub fn exit_code_for(message: &str) -> u8 {
    if message.starts_with(INPUT_ERROR_PREFIX) {
        EXIT_INPUT_ERROR
    } else if message.starts_with(RESOLUTION_ERROR_PREFIX) {
        EXIT_RESOLUTION_ERROR
    } else {
        EXIT_FAILURE
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn resolution_error(err: CoreError) -> String {
    // Schema errors already read "input error: ...".
    if matches!(err, CoreError::Schema(_)) {
        return err.to_string();
    }
    format!("{RESOLUTION_ERROR_PREFIX} {err}")
}

/// Pick the DBaaS provider: an explicit endpoint, then an explicit config
/// file, then the default config file. No endpoint at all is not an error.
pub fn dbaas_provider(ctx: &RunContext) -> Result<Box<dyn DbaasProvider>, String> {
    if let Some(endpoint) = ctx.dbaas_endpoint.as_deref() {
        return Ok(Box::new(HttpProvider::new(DbaasConfig::new(endpoint))));
    }
    if let Some(path) = ctx.dbaas_config.as_deref() {
        let config = DbaasConfig::load(path)
            .map_err(|e| format!("failed to load DBaaS config {}: {e}", path.display()))?;
        return Ok(Box::new(HttpProvider::new(config)));
    }
    let Ok(path) = default_config_path() else {
        debug!("no home directory; DBaaS probing disabled");
        return Ok(Box::new(Unconfigured));
    };
    match DbaasConfig::load(&path) {
        Ok(config) => Ok(Box::new(HttpProvider::new(config))),
        Err(DbaasError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!("no DBaaS config at {}; probing disabled", path.display());
            Ok(Box::new(Unconfigured))
        }
        Err(e) => Err(format!("failed to load DBaaS config {}: {e}", path.display())),
    }
}

pub fn load_engine(ctx: &RunContext) -> Result<Engine, String> {
    let input = parse_input_file(&ctx.input)
        .map_err(|e| format!("{INPUT_ERROR_PREFIX} {}: {e}", ctx.input.display()))?;
    let engine = Engine::from_input(input).map_err(resolution_error)?;
    Ok(engine
        .with_dbaas(dbaas_provider(ctx)?)
        .with_fastly(ctx.fastly.clone()))
}

pub fn colorize_type(service_type: &str) -> String {
    use console::Style;
    let style = if service_type.ends_with("-dbaas") {
        Style::new().cyan()
    } else if service_type.ends_with("-single") {
        Style::new().yellow()
    } else if service_type.ends_with("-persistent") {
        Style::new().blue()
    } else {
        Style::new().green()
    };
    style.apply_to(service_type).to_string()
}

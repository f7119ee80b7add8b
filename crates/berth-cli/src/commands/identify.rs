use super::{json_compact, json_pretty, load_engine, resolution_error, RunContext, EXIT_SUCCESS};

/// Prints `{"services": [...], "service_types": [{"name", "type"}]}` with
/// `--json`, one `name type` line per service otherwise.
pub fn services(ctx: &RunContext, json: bool) -> Result<u8, String> {
    let engine = load_engine(ctx)?;
    let identified = engine.identify_services().map_err(resolution_error)?;
    if json {
        println!("{}", json_pretty(&identified)?);
    } else {
        for summary in &identified.service_types {
            println!("{} {}", summary.name, summary.service_type);
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn ingress(ctx: &RunContext) -> Result<u8, String> {
    let engine = load_engine(ctx)?;
    let routes = engine.identify_routes().map_err(resolution_error)?;
    println!("{}", json_compact(&routes)?);
    Ok(EXIT_SUCCESS)
}

pub fn created_ingress(ctx: &RunContext) -> Result<u8, String> {
    let engine = load_engine(ctx)?;
    let report = engine.change_report().map_err(resolution_error)?;
    println!("{}", json_compact(&report)?);
    Ok(EXIT_SUCCESS)
}

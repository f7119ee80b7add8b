use super::{colorize_type, json_pretty, load_engine, resolution_error, RunContext, EXIT_SUCCESS};
use berth_core::{DeploymentModel, ImageProvenance};

pub fn run(ctx: &RunContext, json: bool) -> Result<u8, String> {
    let engine = load_engine(ctx)?;
    let model = engine.compile().map_err(resolution_error)?;
    if json {
        println!("{}", json_pretty(&model)?);
    } else {
        print_summary(&model);
    }
    Ok(EXIT_SUCCESS)
}

fn print_summary(model: &DeploymentModel) {
    println!("namespace:   {}", model.namespace);
    println!("environment: {} ({})", model.environment, model.environment_type);
    println!("primary:     {}", model.routes.route_set.primary);
    println!("backups:     {}", model.backups_enabled);
    println!();
    for service in &model.services {
        let image = match service.image.as_ref().map(|i| &i.provenance) {
            Some(ImageProvenance::Build { dockerfile, .. }) => format!("build {dockerfile}"),
            Some(ImageProvenance::Pull { image }) => format!("pull {image}"),
            Some(ImageProvenance::Promote { source_image }) => format!("promote {source_image}"),
            None => "-".to_owned(),
        };
        println!(
            "  {:<20} {:<24} {}",
            &*service.override_name,
            colorize_type(&service.service_type),
            image
        );
        for cronjob in service.native_cronjobs.iter().chain(&service.in_pod_cronjobs) {
            let kind = if cronjob.in_pod { "in-pod" } else { "native" };
            println!("    {kind:<7} {} {}", cronjob.schedule, cronjob.name);
        }
    }
    if !model.routes.route_set.secondary.is_empty() {
        println!();
        for route in &model.routes.route_set.secondary {
            println!("  {route}");
        }
    }
}

mod commands;

use berth_core::FastlyOptions;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::RunContext;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "berth",
    version,
    about = "Compile compose services and a deployment manifest into a resolved deployment model"
)]
struct Cli {
    /// Build input document (JSON or TOML).
    #[arg(short, long, default_value = "berth.json", global = true)]
    input: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// DBaaS endpoint config file (default: ~/.config/berth/dbaas.json).
    #[arg(long, global = true)]
    dbaas_config: Option<PathBuf>,

    /// DBaaS endpoint URL (overrides the config file).
    #[arg(long, global = true)]
    dbaas_endpoint: Option<String>,

    /// Fastly service id applied to every declared route.
    #[arg(long, global = true)]
    fastly_service_id: Option<String>,

    /// Prefix prepended to resolved Fastly API secret names.
    #[arg(long, global = true)]
    fastly_api_secret_prefix: Option<String>,

    /// Fastly service id used for uncached routes.
    #[arg(long, global = true)]
    fastly_cache_no_cache: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve services and routes into the deployment model.
    Resolve,
    /// Report a single aspect of the resolved model.
    Identify {
        #[command(subcommand)]
        target: IdentifyTarget,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum IdentifyTarget {
    /// Override names and types of the included services.
    Services,
    /// Primary, secondary and autogenerated route URLs as JSON.
    Ingress,
    /// Ingress and override names the run would create, as JSON.
    CreatedIngress,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BERTH_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let ctx = RunContext {
        input: cli.input,
        dbaas_config: cli.dbaas_config,
        dbaas_endpoint: cli.dbaas_endpoint,
        fastly: FastlyOptions {
            no_cache_service_id: cli.fastly_cache_no_cache,
            service_id: cli.fastly_service_id,
            api_secret_prefix: cli.fastly_api_secret_prefix,
        },
    };
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Resolve => commands::resolve::run(&ctx, json_output),
        Commands::Identify { target } => match target {
            IdentifyTarget::Services => commands::identify::services(&ctx, json_output),
            IdentifyTarget::Ingress => commands::identify::ingress(&ctx),
            IdentifyTarget::CreatedIngress => commands::identify::created_ingress(&ctx),
        },
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(commands::exit_code_for(&msg))
        }
    }
}

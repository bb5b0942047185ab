mod cli;

use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use kapuchin_core::kernel::error::Result;
use kapuchin_core::{Application, ModuleCatalog};
use log::error;

use crate::cli::{CliArgs, Commands, OutputFormat};

// Linked for their module registrations only.
use kapuchin_patch_fan_scaling as _;
use kapuchin_patch_hello as _;
use kapuchin_patch_reset_velocity_limit as _;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let outcome = match args.command {
        Some(Commands::Plugins) => {
            list_plugins();
            Ok(())
        }
        Some(Commands::Run { config, gcode }) => run(&config, &gcode),
        Some(Commands::Status { config, format }) => status(&config, format),
        None => {
            let _ = CliArgs::command().print_help();
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Route `log` records through a `tracing` fmt subscriber on stderr.
/// `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn list_plugins() {
    let catalog = ModuleCatalog::from_inventory();
    if catalog.is_empty() {
        println!("No plugin modules linked.");
        return;
    }
    println!("Linked plugin modules:");
    for (path, module) in catalog.modules() {
        let mut forms = Vec::new();
        if module.load_config().is_some() {
            forms.push("load_config");
        }
        if module.load_config_prefix().is_some() {
            forms.push("load_config_prefix");
        }
        let forms = if forms.is_empty() { "none".to_string() } else { forms.join(", ") };
        println!("  - {} [entry: {}] {}", path, forms, module.description());
    }
}

fn start(config: &Path) -> Result<Application> {
    let mut app = Application::new();
    app.start_from_path(config)?;
    tracing::info!(config = %config.display(), "host started");
    Ok(app)
}

fn run(config: &Path, gcode: &[String]) -> Result<()> {
    let app = start(config)?;
    for line in gcode {
        for response in app.run_gcode(line)? {
            println!("{}", response);
        }
    }
    Ok(())
}

fn status(config: &Path, format: OutputFormat) -> Result<()> {
    let app = start(config)?;
    let status = serde_json::Value::Object(app.status());
    println!("{}", format.render(&status)?);
    Ok(())
}

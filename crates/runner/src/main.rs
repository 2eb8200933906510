use std::path::PathBuf;
use std::sync::Arc;

use hermes_runner::{Bridge, BridgeConfig, RunnerError, console, init_logging};
use log::{error, info};

fn print_help() {
    eprintln!(
        r#"Hermes - local pipe bridge to a trading platform

USAGE:
    hermes [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --no-console        Do not read commands from stdin
    --help              Print this help message

CONFIG SEARCH ORDER (without --config):
    ./config.json
    ~/.hermes/config.json

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter, overrides log_level

EXAMPLES:
    # Run with defaults
    hermes

    # Run with config file
    hermes --config config.json
"#
    );
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Fatal error: {}", e);
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), RunnerError> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut interactive = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            "--no-console" => interactive = false,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let loaded = BridgeConfig::load(config_path.as_deref())?;
    init_logging(&loaded.config.log_level, loaded.config.log_file.as_deref())?;
    loaded.log_source();
    let config = loaded.config;

    info!("Starting Hermes bridge");

    let bridge = Arc::new(Bridge::from_config(config));
    bridge.start()?;

    let (stop_console, console_shutdown) = tokio::sync::watch::channel(false);
    if interactive {
        let console = tokio::spawn(console::run(Arc::clone(&bridge), console_shutdown));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            _ = console => info!("Console closed"),
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Interrupted");
    }

    stop_console.send_replace(true);
    bridge.shutdown().await;
    Ok(())
}

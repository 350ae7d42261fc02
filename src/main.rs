//! sensor2mqtt - Main Entry Point
//!
//! Runs one fetch, parse and publish pass and exits with the run's status.

use clap::{Parser, Subcommand};
use sensor2mqtt::config::{ConfigError, RelayConfig};
use sensor2mqtt::error::{RelayError, EXIT_FAILURE};
use sensor2mqtt::feed::HttpFetcher;
use sensor2mqtt::observability::init_logging_with_verbosity;
use sensor2mqtt::relay::{Relay, RunReport};
use sensor2mqtt::transport::mqtt::MqttClient;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

/// Config files tried, in order, when `--config` is not given
const DEFAULT_CONFIG_PATHS: &[&str] = &["sensor2mqtt.toml", "config/sensor2mqtt.toml"];

/// Relay air temperature readings from an HTTPS feed to an MQTT broker
#[derive(Parser)]
#[command(name = "sensor2mqtt")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed once and publish the readings
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging_with_verbosity(cli.verbose);

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    let code = match cli.command {
        Commands::Run => run_relay(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    process::exit(code);
}

fn load_configuration(config_path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return RelayConfig::load_from_file(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return RelayConfig::load_from_file(path);
        }
    }

    info!("No configuration file found, using built-in defaults");
    let config = RelayConfig::default();
    config.validate()?;
    Ok(config)
}

async fn run_relay(config: RelayConfig) -> i32 {
    info!("Starting sensor2mqtt v{}", env!("CARGO_PKG_VERSION"));

    match execute(config).await {
        Ok(report) => {
            info!(
                readings = report.readings,
                published = report.summary.published,
                dropped = report.summary.dropped,
                "Relay finished"
            );
            0
        }
        Err(e) => {
            error!(exit_code = e.exit_code(), "Relay failed: {}", e);
            e.exit_code()
        }
    }
}

async fn execute(config: RelayConfig) -> Result<RunReport, RelayError> {
    let fetcher = HttpFetcher::new(&config.feed)?;
    let mut relay = Relay::new(config, fetcher, MqttClient::new())?;
    relay.run().await
}

fn handle_config_command(config: &RelayConfig, show: bool) -> i32 {
    if show {
        match toml::to_string_pretty(config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!("Failed to render configuration: {}", e);
                return EXIT_FAILURE;
            }
        }
    }

    info!("Configuration validation complete");
    0
}


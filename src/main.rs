//! dotrelay - main entry point
//!
//! Loads configuration, resolves credentials, builds the generation client
//! and runs the Telegram polling loop until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use dotrelay::config::RelayConfig;
use dotrelay::llm::provider::{GenerationClient, GenerationError};
use dotrelay::llm::providers::{GeminiClient, GeminiConfig};
use dotrelay::observability::{
    health::HealthServer, init_default_logging, init_logging, metrics::metrics, LogFormat,
};
use dotrelay::processing::TokioRetryTimer;
use dotrelay::relay::MessageProcessor;
use dotrelay::transport::TelegramTransport;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

const DEFAULT_CONFIG_PATHS: &[&str] = &["dotrelay.toml", "config/dotrelay.toml"];

/// Telegram to Gemini message relay
#[derive(Parser)]
#[command(name = "dotrelay")]
#[command(about = "Relays marked Telegram messages to Gemini and replies with the answer")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Serve health endpoints on this port
    #[arg(long, env = "HEALTH_PORT")]
    health_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay
    Run,
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_observability(cli.verbose);

    info!("Starting dotrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_relay(config, cli.health_port).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_observability(verbose: u8) {
    if verbose == 0 {
        init_default_logging();
        return;
    }

    let level = if verbose > 1 {
        Level::TRACE
    } else {
        Level::DEBUG
    };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RelayConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RelayConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using built-in defaults");
    let config = RelayConfig::default();
    config.validate()?;
    Ok(config)
}

/// Build the generation client; failure leaves the relay in the sticky
/// unavailable state instead of aborting startup
fn build_generation_client(
    config: &RelayConfig,
    api_key: SecretString,
) -> Result<Arc<dyn GenerationClient>, GenerationError> {
    let client = GeminiClient::new(GeminiConfig::from_section(api_key, &config.llm))?;
    Ok(Arc::new(client))
}

async fn run_relay(
    config: RelayConfig,
    health_port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let collector = metrics();
    collector.set_relay_state("initializing");

    let credentials = config.resolve_credentials()?;

    let cancel = CancellationToken::new();
    let client = build_generation_client(&config, credentials.api_key);
    let client_available = client.is_ok();
    let timer = Arc::new(TokioRetryTimer::new(cancel.clone()));
    let processor = Arc::new(MessageProcessor::new(&config, client, timer));

    let mut adapter = TelegramTransport::new(&credentials.bot_token, processor, &config.bot)?;

    if let Some(port) = health_port {
        let health_server = Arc::new(HealthServer::new("dotrelay".to_string(), port));
        health_server.set_client_available(client_available);
        adapter = adapter.with_health(health_server.clone());

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = health_server.start(shutdown).await {
                error!("Health server error: {}", e);
            }
        });
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        signal_cancel.cancel();
    });

    collector.set_relay_state("running");
    info!(
        model = %config.llm.model,
        marker = %config.filter.marker,
        "Relay is running and waiting for messages"
    );

    let result = adapter.run(cancel.clone()).await;
    cancel.cancel();

    match result {
        Ok(()) => {
            collector.set_relay_state("stopped");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Telegram polling ended with an error");
            collector.set_relay_state("error");
            Err(e.into())
        }
    }
}

fn handle_config_command(
    config: &RelayConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    for env_var in [&config.bot.token_env, &config.llm.api_key_env] {
        let status = match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => "set",
            _ => "missing",
        };
        println!("{env_var}: {status}");
    }

    info!("Configuration validation complete");
    Ok(())
}

//! Pushtype - push-to-talk dictation client
//!
//! Run with `pushtype` or `pushtype daemon` to start the daemon.
//! Hold the configured key combination (default Ctrl + Option) to
//! record; release to transcribe and paste into the focused app.

use clap::{Parser, Subcommand};
use pushtype::config::{self, Config};
use pushtype::server::ServerClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pushtype")]
#[command(author, version, about = "Push-to-talk dictation client")]
#[command(long_about = "
Pushtype is a push-to-talk client for a local transcription server.
Hold the trigger combination to record, release to transcribe; the text
is pasted into the focused application and your clipboard is restored.

The trigger keys, language, and paste timing are owned by the server
(GET /api/settings) and re-synced every few seconds while the daemon
runs. Local tuning lives in ~/.config/pushtype/config.toml.
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Override the server URL
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Override the audio input device
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Show the effective configuration
    Config,

    /// Check that the transcription server is reachable
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("pushtype={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // CLI overrides
    if let Some(server) = cli.server {
        config.server.url = server;
    }
    if let Some(device) = cli.device {
        config.audio.device = device;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            pushtype::daemon::run(config).await?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Health => {
            check_health(&config).await?;
        }
    }

    Ok(())
}

/// Print the effective configuration as TOML
fn show_config(config: &Config) -> anyhow::Result<()> {
    match Config::default_path() {
        Some(path) if path.exists() => println!("# Config file: {}", path.display()),
        Some(path) => println!("# Config file: {} (not present, using defaults)", path.display()),
        None => println!("# No config directory available, using defaults"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// One-shot server health check
async fn check_health(config: &Config) -> anyhow::Result<()> {
    let server = Arc::new(ServerClient::new(&config.server.url));
    let probe = server.clone();
    let result = tokio::task::spawn_blocking(move || probe.check_health()).await?;

    match result {
        Ok(health) => {
            println!("Server:   {} (reachable)", config.server.url);
            println!(
                "Provider: {}",
                if health.provider_available {
                    "available"
                } else {
                    "not available"
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("Server:   {} (unreachable)", config.server.url);
            println!("Error:    {}", e);
            std::process::exit(1);
        }
    }
}

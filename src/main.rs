pub mod bridge;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod mqtt;

use std::path::PathBuf;

use crate::bridge::BridgeHandle;
use crate::config::BridgeConfig;
use crate::device::VirtualHost;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Exposes a Valetudo robot vacuum as a smart-home robotic vacuum cleaner.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.verbose)?;

    let path = args.config.unwrap_or_else(BridgeConfig::default_path);
    let config = BridgeConfig::load(&path)
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", path.display(), e))?;

    let host = VirtualHost::new();
    let shutdown = CancellationToken::new();
    let handle = BridgeHandle::spawn(&host, config, shutdown.clone())
        .map_err(|e| eyre!("Failed to start bridge: {}", e))?;

    if !args.no_console {
        match host.command_sender() {
            Some(commands) => {
                tokio::spawn(console::run(
                    commands,
                    host.subscribe(),
                    handle.mqtt_status(),
                    shutdown.clone(),
                ));
            }
            None => warn!("Device has no command channel, console disabled"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    handle.join().await?;
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", if verbose { "debug" } else { "info" })
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

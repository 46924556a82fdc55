//! Knob GW - volume knob daemon
//!
//! Turns an I2C RGB encoder breakout into the volume knob and status light of
//! a voice-assistant device.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knob_gw::app;
use knob_gw::config::{AppConfig, ConfigWatcher};
use knob_gw::device;
use knob_gw::mixer::{self, MixerChoice};
use knob_gw::paths::AppPaths;

/// Knob GW - volume knob and status LED for voice-assistant devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: detected per install mode)
    #[arg(short, long, env = "KNOB_GW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory for daily-rotated log files (default: detected per install mode)
    #[arg(long, env = "KNOB_GW_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// List ALSA mixer controls and the one the knob would use
    #[arg(long)]
    list_mixers: bool,

    /// Initialise the expander, print its identity and encoder count, then exit
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            if let Err(e) = paths.ensure_directories() {
                eprintln!("[paths] WARNING: {:#}", e);
            }
            paths.config.clone()
        }
    };

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args.log_level, &paths.log_dir(args.log_dir.as_deref()));

    info!("Starting Knob GW v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    let config = AppConfig::load(&config_path).await?;

    if args.list_mixers {
        return list_mixers(&config.volume.card, config.volume.control.as_deref());
    }

    if args.probe {
        return probe(&config);
    }

    let watcher = match ConfigWatcher::new(config_path.clone()) {
        Ok(watcher) => {
            info!("Configuration loaded with hot-reload enabled");
            Some(watcher)
        }
        Err(e) => {
            warn!("Config hot reload disabled: {:#}", e);
            None
        }
    };

    app::run(config, watcher, shutdown_signal()).await?;

    info!("Knob GW shutdown complete");
    Ok(())
}

fn init_logging(level: &str, log_dir: &Path) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, "knob-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!(
                "[logging] WARNING: file logging disabled, cannot create {}: {}",
                log_dir.display(),
                e
            );
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

fn list_mixers(card: &str, forced: Option<&str>) -> Result<()> {
    use colored::*;

    let names = mixer::list_controls(card)?;
    let choice = mixer::select_control(&names);

    println!("\n{}", format!("=== Mixer controls on '{}' ===", card).bold().cyan());
    if names.is_empty() {
        println!("  {}", "(no simple controls)".yellow());
    }
    for name in &names {
        if name == choice.control() {
            println!("  {} {}", "→".green(), name.green().bold());
        } else {
            println!("    {}", name);
        }
    }

    let reason = match &choice {
        MixerChoice::Single(_) => "only control on the card",
        MixerChoice::Preferred(_) => "preferred control name",
        MixerChoice::Default => "fallback default",
    };
    println!("\nHeuristic picks: {} ({})", choice.control().green(), reason);
    if let Some(forced) = forced {
        println!("Configured control overrides it: {}", forced.yellow());
    }

    Ok(())
}

fn probe(config: &AppConfig) -> Result<()> {
    use colored::*;

    let hw = &config.hardware;
    let mut device = device::open(hw)?;
    let version = device
        .version()
        .map_err(|e| anyhow!("Failed to read firmware version: {}", e))?;
    let position = device
        .read_position()
        .map_err(|e| anyhow!("Failed to read encoder: {}", e))?;

    println!("\n{}", "=== Knob Expander ===".bold().cyan());
    println!("  Bus:       {}", hw.i2c_bus);
    println!("  Address:   0x{:02X}", hw.address);
    println!("  Chip ID:   {}", format!("0x{:04X}", device.chip_id()).green());
    println!("  Version:   {}", version);
    println!("  Encoder:   channel {} = {}", hw.encoder_channel, position.to_string().green());

    Ok(())
}

//! OCPP Central System server
//!
//! Headless OCPP 1.6 central system core, suitable for running as a
//! systemd service, a container or a standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-central/config.toml)
//! ocpp-central
//!
//! # Custom config path and port
//! ocpp-central --config /etc/ocpp-central/config.toml --port 9100
//!
//! # Validate config without starting
//! ocpp-central --check
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};

use ocpp_central::config::{AppConfig, StoreBackend};
use ocpp_central::server::{init_tracing, ServerHandle, ServerOptions};
use ocpp_central::support::errors::ConfigError;

/// OCPP 1.6 Central System for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-central",
    version,
    about = "OCPP 1.6 Central System core",
    long_about = "Accepts OCPP 1.6-J WebSocket connections from charge points, \
                  handles BootNotification, MeterValues, StartTransaction and \
                  StopTransaction, and persists them.\n\n\
                  Default config: ~/.config/ocpp-central/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the WebSocket listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use the in-memory store instead of the configured backend.
    #[arg(long)]
    memory: bool,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

/// Load the configuration file. Under `--check` a bad file is an error;
/// otherwise the defaults are used. The flag is `false` on fallback.
fn load_config(path: &Path, strict: bool) -> Result<(AppConfig, bool), ConfigError> {
    match AppConfig::load(path) {
        Ok(cfg) => Ok((cfg, true)),
        Err(e) if strict => Err(e),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            eprintln!("Using default configuration.");
            Ok((AppConfig::default(), false))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(ocpp_central::default_config_path);

    let (mut config, loaded) = load_config(&config_path, cli.check)?;

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);
    if loaded {
        info!("Configuration loaded from {}", config_path.display());
    }

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(host) = cli.host {
        info!("CLI override: host = {}", host);
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }
    if cli.memory {
        info!("CLI override: store backend = memory");
        config.store.backend = StoreBackend::Memory;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   WS address  : {}", config.address());
        println!("   Store       : {:?} ({})", config.store.backend, config.store.url);
        println!("   Heartbeat   : {}s", config.ocpp.heartbeat_interval);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = match ServerHandle::start(ServerOptions {
        config,
        store: None,
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e.into());
        }
    };

    info!("🚀 Listening on ws://{}/ocpp/{{charge_point_id}}", handle.local_addr());

    handle.install_signal_handler();
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}

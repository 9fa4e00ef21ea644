//! # keybus
//!
//! Host process for the door-lock gateway.
//!
//! ```bash
//! # Run every configured floor until Ctrl-C
//! keybus --config keybus.toml serve
//!
//! # One-shot operations against a single floor
//! keybus set-key COM3 5 3 01-02-03-04-05 --holder "Ivanova A."
//! keybus keys COM3 5
//! keybus light COM3 5 on
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keybus_core::{ControllerAddress, GatewayConfig, KeyCode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "keybus")]
#[command(about = "Door-lock controller gateway", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring up every stored floor and poll until Ctrl-C
    Serve {
        /// Print alerts of this floor as JSON lines
        #[arg(long)]
        watch: Option<String>,
    },

    /// Read a room's key table
    Keys {
        port: String,
        address: ControllerAddress,
    },

    /// Assign a key to a cell
    SetKey {
        port: String,
        address: ControllerAddress,
        cell: u8,
        code: KeyCode,
        #[arg(long, default_value = "")]
        holder: String,
        /// Expiry as RFC 3339, e.g. 2026-10-20T12:00:00Z
        #[arg(long)]
        expires: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// Revoke the key in a cell
    UnsetKey {
        port: String,
        address: ControllerAddress,
        cell: u8,
    },

    /// Read the key last presented to a controller
    ReadKey {
        port: String,
        address: ControllerAddress,
    },

    /// Switch a room's light
    Light {
        port: String,
        address: ControllerAddress,
        #[arg(value_parser = commands::parse_switch, action = clap::ArgAction::Set)]
        state: bool,
    },

    /// Store a new floor
    AddFloor { port: String, name: String },

    /// Add a room to a floor
    AddRoom {
        port: String,
        room_number: i64,
        address: ControllerAddress,
        #[arg(long)]
        protected: bool,
    },
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{level}'"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(GatewayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { watch } => commands::serve(config, watch).await,
        Command::Keys { port, address } => commands::keys(config, &port, address).await,
        Command::SetKey {
            port,
            address,
            cell,
            code,
            holder,
            expires,
        } => commands::set_key(config, &port, address, cell, code, &holder, expires).await,
        Command::UnsetKey {
            port,
            address,
            cell,
        } => commands::unset_key(config, &port, address, cell).await,
        Command::ReadKey { port, address } => commands::read_key(config, &port, address).await,
        Command::Light {
            port,
            address,
            state,
        } => commands::light(config, &port, address, state).await,
        Command::AddFloor { port, name } => commands::add_floor(config, &port, &name).await,
        Command::AddRoom {
            port,
            room_number,
            address,
            protected,
        } => commands::add_room(config, &port, room_number, address, protected).await,
    }
}

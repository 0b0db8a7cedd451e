//! Command line client for rgbw-ctrl lighting controllers
//!
//! Finds devices over BLE and drives them over BLE, the WebSocket or the
//! plain HTTP endpoints.

mod args;
mod ble;
mod config;
mod rest;
mod ws;

use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rgbw_ble_controller::ble::scan;

use crate::config::ClientConfig;

#[derive(Parser)]
#[command(name = "rgbw-ctl")]
#[command(about = "Control rgbw-ctrl lighting controllers")]
struct Cli {
    /// Config file [default: $RGBW_HOME/config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Device host for `ws` and `rest`
    #[arg(long, global = true)]
    host: Option<String>,
    /// Size of the firmware's ESP-NOW remote table
    #[arg(long, global = true)]
    esp_now_max: Option<u8>,
    /// BLE scan duration in seconds
    #[arg(long, global = true)]
    scan_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BLE devices
    Scan,
    /// Talk to a device over BLE
    Ble(ble::BleArgs),
    /// Talk to a device over its WebSocket
    #[command(subcommand)]
    Ws(ws::WsCommand),
    /// Call the device's HTTP endpoints
    #[command(subcommand)]
    Rest(rest::RestCommand),
    /// Print the effective configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| config::home().join("config.json"));
    let mut config = ClientConfig::load(&config_path)?;
    if let Some(host) = cli.host {
        config.host = Some(host);
    }
    if let Some(max) = cli.esp_now_max {
        config.esp_now_max_devices = max;
    }
    if let Some(secs) = cli.scan_secs {
        config.scan_secs = secs;
    }

    match cli.command {
        Commands::Scan => scan_devices(&config).await?,
        Commands::Ble(args) => ble::run(&config, args).await?,
        Commands::Ws(command) => ws::run(&config, command).await?,
        Commands::Rest(command) => rest::run(&config, command).await?,
        Commands::Config => {
            println!("# {}", config_path.display());
            print_json(&config)?;
        }
    }

    Ok(())
}

async fn scan_devices(config: &ClientConfig) -> Result<(), Box<dyn Error>> {
    println!("Scanning for devices ({} seconds)...", config.scan_secs);
    let devices = scan(config.scan_duration(), &config.ble_name_prefix).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_rgbw { " [RGBW]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves after `secs`, or never.
pub(crate) fn until(secs: Option<u64>) -> impl Future<Output = ()> {
    async move {
        match secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    }
}

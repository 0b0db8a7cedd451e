//! `rgbw-ctl ble ...`

use std::error::Error;
use std::time::Duration;

use clap::{Args, Subcommand};
use rgbw_ble_controller::ble::BtleLink;
use rgbw_ble_controller::{BleController, GattLink, LinkState};
use rgbw_proto::ble::{Command, Field, GattLayout};
use rgbw_proto::{EspNowDevice, MacAddress, Message, WiFiNetwork, WiFiScanStatus};
use tokio::sync::broadcast::error::RecvError;

use crate::args::{
    AlexaArgs, ColorArgs, HttpCredentialsArgs, WifiArgs, parse_mac, parse_remote,
};
use crate::config::ClientConfig;
use crate::{print_json, until};

#[derive(Args, Debug)]
pub struct BleArgs {
    /// Device name or address; defaults to the first device with the configured name prefix
    #[arg(short, long)]
    pub device: Option<String>,
    /// Use the early two-service characteristic layout
    #[arg(long)]
    pub two_service: bool,
    #[command(subcommand)]
    pub command: BleCommand,
}

#[derive(Subcommand, Debug)]
pub enum BleCommand {
    /// Read every field and print the device state
    Show,
    /// Print notifications until the device goes away
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        secs: Option<u64>,
    },
    /// Rename the device
    Name { name: String },
    /// Set the output color
    Color(ColorArgs),
    /// Set the web server credentials
    HttpCredentials(HttpCredentialsArgs),
    /// Configure the Alexa bridge
    Alexa(AlexaArgs),
    /// Replace the paired ESP-NOW remotes
    EspNowRemotes {
        /// NAME=aa:bb:cc:dd:ee:ff, one per remote
        #[arg(value_parser = parse_remote)]
        remotes: Vec<EspNowDevice>,
    },
    /// Set the ESP-NOW controller this device follows
    EspNowController {
        #[arg(value_parser = parse_mac)]
        address: MacAddress,
    },
    /// Join a WiFi network
    WifiConnect(WifiArgs),
    /// Scan for WiFi networks and list them
    WifiScan {
        /// Give up after this many seconds
        #[arg(long, default_value_t = 20)]
        timeout: u64,
    },
    /// Reboot the device
    Restart,
}

pub async fn run(config: &ClientConfig, args: BleArgs) -> Result<(), Box<dyn Error>> {
    println!("Scanning for {} devices...", config.ble_name_prefix);
    let link = BtleLink::find(
        args.device.as_deref(),
        &config.ble_name_prefix,
        config.scan_duration(),
    )
    .await?;
    let address = link.address();
    let layout = if args.two_service {
        GattLayout::two_service()
    } else {
        config.layout()
    };

    let ble = BleController::new(link, layout, config.limits());
    println!("Connecting to {address}...");
    ble.connect().await?;
    println!("Connected!");

    let restart = matches!(args.command, BleCommand::Restart);
    let result = execute(&ble, args.command).await;

    // A restarting device drops the link on its own.
    if let Err(e) = ble.disconnect().await {
        if !restart {
            log::warn!("disconnect from {address}: {e}");
        }
    }
    result
}

async fn execute<L: GattLink>(
    ble: &BleController<L>,
    command: BleCommand,
) -> Result<(), Box<dyn Error>> {
    let command = match command {
        BleCommand::Show => {
            let missing: Vec<_> = Field::ALL
                .into_iter()
                .filter(|field| !ble.supports(*field))
                .map(Field::name)
                .collect();
            if !missing.is_empty() {
                println!("Not offered by this firmware: {}", missing.join(", "));
            }
            return print_json(&ble.device());
        }
        BleCommand::Watch { secs } => return watch(ble, secs).await,
        BleCommand::WifiScan { timeout } => {
            let networks = tokio::time::timeout(Duration::from_secs(timeout), scan_wifi(ble))
                .await
                .map_err(|_| "wifi scan timed out")??;
            println!("Found {} networks:", networks.len());
            for network in networks {
                println!("  {:<32} {}", network.ssid, network.encryption_type);
            }
            return Ok(());
        }
        BleCommand::Name { name } => Command::SetDeviceName(name),
        BleCommand::Color(color) => Command::SetColor(color.output()?),
        BleCommand::HttpCredentials(credentials) => {
            Command::SetHttpCredentials(credentials.credentials())
        }
        BleCommand::Alexa(alexa) => Command::SetAlexaSettings(alexa.settings()),
        BleCommand::EspNowRemotes { remotes } => Command::SetEspNowRemotes(remotes),
        BleCommand::EspNowController { address } => Command::SetEspNowController(address),
        BleCommand::WifiConnect(wifi) => {
            let details = wifi.details()?;
            println!("  SSID: {}", details.ssid);
            Command::ConnectWiFi(details)
        }
        BleCommand::Restart => Command::Restart,
    };

    ble.write(&command).await?;
    println!("Wrote {}.", command.field());
    if command == Command::Restart {
        println!("Device will restart.");
    }
    Ok(())
}

async fn watch<L: GattLink>(
    ble: &BleController<L>,
    secs: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let mut updates = ble.updates();
    let mut state = ble.watch_state();
    let stop = until(secs);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = state.wait_for(|s| *s == LinkState::Disconnected) => {
                println!("Device disconnected.");
                return Ok(());
            }
            update = updates.recv() => match update {
                Ok(message) => print_json(&message)?,
                Err(RecvError::Lagged(n)) => log::warn!("missed {n} updates"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Start a scan and wait for its result list. The result characteristic
/// usually notifies; if only the status does, read the list.
async fn scan_wifi<L: GattLink>(ble: &BleController<L>) -> Result<Vec<WiFiNetwork>, Box<dyn Error>> {
    let mut updates = ble.updates();
    ble.write(&Command::StartWiFiScan).await?;
    println!("Scanning for networks...");

    loop {
        match updates.recv().await {
            Ok(Message::WiFiScanResult(networks)) => return Ok(networks),
            Ok(Message::WiFiScanStatus(WiFiScanStatus::Completed)) => {
                if let Message::WiFiScanResult(networks) = ble.read(Field::WiFiScanResult).await? {
                    return Ok(networks);
                }
            }
            Ok(Message::WiFiScanStatus(WiFiScanStatus::Failed)) => {
                return Err("device reported a failed scan".into());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err("device disconnected".into()),
        }
    }
}

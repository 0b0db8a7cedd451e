//! `rgbw-ctl ws ...`

use std::error::Error;
use std::time::Duration;

use clap::Subcommand;
use rgbw_link::{LinkStatus, SessionEvent, WsLink};
use rgbw_proto::{BleStatus, Dispatcher, Message, MessageType, Request, WiFiScanStatus};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::args::{AlexaArgs, ColorArgs, HttpCredentialsArgs, Toggle, WifiArgs};
use crate::config::ClientConfig;
use crate::{print_json, until};

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const NO_REPLY: &str = "no reply from device";
const UNEXPECTED: &str = "unexpected reply from device";

#[derive(Subcommand, Debug)]
pub enum WsCommand {
    /// Print every frame the device pushes
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        secs: Option<u64>,
    },
    /// Ask for the free heap
    Heap,
    /// Ask for the current network details
    WifiDetails,
    /// Ask for firmware update progress
    Ota,
    /// Set the output color
    Color(ColorArgs),
    /// Rename the device
    Name { name: String },
    /// Set the web server credentials
    HttpCredentials(HttpCredentialsArgs),
    /// Configure the Alexa bridge
    Alexa(AlexaArgs),
    /// Switch the BLE radio on or off
    Ble {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Join a WiFi network
    WifiConnect(WifiArgs),
    /// Start a WiFi scan and wait for it to finish
    WifiScan {
        #[arg(long, default_value_t = 20)]
        timeout: u64,
    },
}

pub async fn run(config: &ClientConfig, command: WsCommand) -> Result<(), Box<dyn Error>> {
    let mut dispatcher = Dispatcher::new(config.limits());
    let mut scan_status = None;
    match &command {
        WsCommand::Watch { .. } => dispatcher.on_any(|message| {
            if let Err(e) = print_json(&message) {
                log::warn!("cannot print {message:?}: {e}");
            }
        }),
        WsCommand::WifiScan { .. } => {
            let (tx, rx) = mpsc::unbounded_channel();
            dispatcher.on(MessageType::WiFiScanStatus, move |message| {
                let _ = tx.send(message);
            });
            scan_status = Some(rx);
        }
        _ => {}
    }

    let link = WsLink::new(config.link_config()?, dispatcher);
    let mut status = link.watch_status();
    link.start();
    println!("Connecting to {}...", link.config().url);
    timeout(OPEN_TIMEOUT, status.wait_for(|s| *s == LinkStatus::Open))
        .await
        .map_err(|_| "websocket did not open")??;

    let result = execute(&link, command, scan_status).await;
    link.stop().await;
    result
}

async fn execute(
    link: &WsLink,
    command: WsCommand,
    scan_status: Option<mpsc::UnboundedReceiver<Message>>,
) -> Result<(), Box<dyn Error>> {
    let request = match command {
        WsCommand::Watch { secs } => return watch(link, secs).await,
        WsCommand::Heap => {
            let Message::Heap(heap) = query(link, Request::RequestHeap).await? else {
                return Err(UNEXPECTED.into());
            };
            println!("Free heap: {heap} bytes");
            return Ok(());
        }
        WsCommand::WifiDetails => {
            let Message::WiFiDetails(details) = query(link, Request::RequestWiFiDetails).await?
            else {
                return Err(UNEXPECTED.into());
            };
            return print_json(&details);
        }
        WsCommand::Ota => {
            let Message::OtaProgress(ota) = query(link, Request::RequestOtaProgress).await? else {
                return Err(UNEXPECTED.into());
            };
            match ota.percent() {
                Some(pct) => println!("OTA {:?}: {pct}%", ota.status),
                None => println!("OTA {:?}", ota.status),
            }
            return Ok(());
        }
        WsCommand::WifiScan { timeout: secs } => {
            let Some(mut rx) = scan_status else {
                return Err("scan status handler missing".into());
            };
            // Anything pushed before our request describes an older scan.
            while rx.try_recv().is_ok() {}
            link.send(&Request::StartWiFiScan).await?;
            println!("Scanning for networks...");
            let finished = timeout(Duration::from_secs(secs), async {
                while let Some(message) = rx.recv().await {
                    if let Message::WiFiScanStatus(
                        s @ (WiFiScanStatus::Completed | WiFiScanStatus::Failed),
                    ) = message
                    {
                        return Some(s);
                    }
                }
                None
            })
            .await
            .map_err(|_| "wifi scan timed out")?;
            match finished {
                Some(WiFiScanStatus::Completed) => {
                    println!("Scan complete. Results are only published over BLE: rgbw-ctl ble wifi-scan");
                }
                _ => return Err("device reported a failed scan".into()),
            }
            return Ok(());
        }
        WsCommand::Color(color) => Request::SetColor(color.output()?),
        WsCommand::Name { name } => Request::SetDeviceName(name),
        WsCommand::HttpCredentials(credentials) => {
            Request::SetHttpCredentials(credentials.credentials())
        }
        WsCommand::Alexa(alexa) => Request::SetAlexaSettings(alexa.settings()),
        WsCommand::Ble { state } => Request::SetBleStatus(match state {
            Toggle::On => BleStatus::Advertising,
            Toggle::Off => BleStatus::Off,
        }),
        WsCommand::WifiConnect(wifi) => Request::ConnectWiFi(wifi.details()?),
    };

    link.send(&request).await?;
    println!("Sent {}.", request.message_type());
    Ok(())
}

/// Send `request` and return the first frame of its type that follows it.
/// The reply handler is in place before the frame goes out, and whatever
/// the device pushed earlier is never taken for the answer.
async fn query(link: &WsLink, request: Request) -> Result<Message, Box<dyn Error>> {
    let message_type = request.message_type();
    let (tx, rx) = oneshot::channel();
    let mut reply = Some(tx);
    link.with_dispatcher(|d| {
        d.on(message_type, move |message| {
            if let Some(tx) = reply.take() {
                let _ = tx.send(message);
            }
        })
    });

    let answer = match link.send(&request).await {
        Err(e) => Err(e.into()),
        Ok(()) => match timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(message)) => Ok(message),
            _ => Err(NO_REPLY.into()),
        },
    };
    link.with_dispatcher(|d| d.unregister(message_type.as_u8()));
    answer
}

async fn watch(link: &WsLink, secs: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut events = link.events();
    let stop = until(secs);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => return Ok(()),
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(SessionEvent::Opened) => println!("Connected."),
                Ok(SessionEvent::Closed(reason)) => println!("Disconnected ({reason:?}), redialling..."),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

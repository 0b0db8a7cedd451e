//! The device's plain HTTP endpoints. All of them are GETs.

use std::error::Error;

use clap::Subcommand;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;

use crate::args::Toggle;
use crate::config::ClientConfig;

#[derive(Subcommand, Debug)]
pub enum RestCommand {
    /// Fetch the device state document
    State,
    /// Set overall brightness
    Brightness { value: u8 },
    /// Set the output color
    Color { r: u8, g: u8, b: u8, w: u8 },
    /// Switch the BLE radio on or off
    Bluetooth {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Reboot the device
    Restart,
    /// Factory reset the device
    Reset,
}

impl From<RestCommand> for Endpoint {
    fn from(command: RestCommand) -> Self {
        match command {
            RestCommand::State => Endpoint::State,
            RestCommand::Brightness { value } => Endpoint::Brightness(value),
            RestCommand::Color { r, g, b, w } => Endpoint::Color([r, g, b, w]),
            RestCommand::Bluetooth { state } => Endpoint::Bluetooth(state),
            RestCommand::Restart => Endpoint::Restart,
            RestCommand::Reset => Endpoint::Reset,
        }
    }
}

pub async fn run(config: &ClientConfig, command: RestCommand) -> Result<(), Box<dyn Error>> {
    let endpoint = Endpoint::from(command);
    let reply = get(config.host()?, endpoint).await?;
    println!("{} {}", endpoint.path(), reply.status);
    if endpoint == Endpoint::State {
        println!("{}", String::from_utf8_lossy(&reply.body));
    }
    if !reply.status.is_success() {
        return Err(format!("device answered {}", reply.status).into());
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("connect: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("request: {0}")]
    Request(#[from] hyper::http::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    State,
    Brightness(u8),
    Color([u8; 4]),
    Bluetooth(Toggle),
    Restart,
    Reset,
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::State => "/state".to_string(),
            Endpoint::Brightness(value) => format!("/output/brightness?value={value}"),
            Endpoint::Color([r, g, b, w]) => format!("/output/color?r={r}&g={g}&b={b}&w={w}"),
            Endpoint::Bluetooth(toggle) => format!("/bluetooth?state={}", toggle.as_str()),
            Endpoint::Restart => "/system/restart".to_string(),
            Endpoint::Reset => "/system/reset".to_string(),
        }
    }
}

pub struct Reply {
    pub status: hyper::StatusCode,
    pub body: Bytes,
}

/// `host` may carry a port; port 80 otherwise.
pub async fn get(host: &str, endpoint: Endpoint) -> Result<Reply, RestError> {
    let addr = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:80")
    };
    let stream = tokio::net::TcpStream::connect(&addr).await?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            log::debug!("connection to {addr} ended: {e}");
        }
    });

    let path = endpoint.path();
    log::debug!("GET http://{host}{path}");
    let request = hyper::Request::get(path)
        .header(hyper::header::HOST, host)
        .body(Empty::<Bytes>::new())?;
    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok(Reply { status, body })
}

//! rgbw-ctrl BLE controller
//!
//! GATT client for rgbw-ctrl lighting controllers. [`BleController`] drives
//! the connection state machine over any [`GattLink`]; [`ble::BtleLink`] is
//! the btleplug implementation.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rgbw_ble_controller::{ble::BtleLink, BleController};
//! use rgbw_proto::{ble::{Command, GattLayout}, ProtocolLimits};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = BtleLink::find(None, "rgbw-ctrl", Duration::from_secs(5)).await?;
//!     let ble = BleController::new(link, GattLayout::default(), ProtocolLimits::default());
//!     ble.connect().await?;
//!     println!("{:?}", ble.device());
//!     ble.write(&Command::StartWiFiScan).await?;
//!     ble.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
mod controller;
mod error;
pub mod link;

pub use controller::{BleController, LinkState, Subscription};
pub use error::BleError;
pub use link::{Discovered, GattLink, LinkEvent, LinkEvents};

//! rgbw-ctrl wire protocol.
//!
//! Fixed-layout little-endian records shared by the BLE characteristics and
//! the WebSocket, the tag catalog for WebSocket frames, a frame dispatcher
//! and the client-side view of device state. No I/O happens here.

pub mod ble;
pub mod catalog;
pub mod codec;
pub mod color;
pub mod dispatch;
mod error;
pub mod message;
pub mod model;
pub mod state;
pub mod wifi;

pub use catalog::{Layout, MessageType};
pub use dispatch::{Dispatched, Dispatcher, Route};
pub use error::{DecodeError, EncodeError};
pub use message::{Message, Request};
pub use model::{
    AlexaIntegrationMode, AlexaIntegrationSettings, BleStatus, Channel, EspNowDevice,
    HttpCredentials, LightState, MacAddress, OtaState, OtaStatus, OutputState, ProtocolLimits,
};
pub use state::DeviceState;
pub use wifi::{
    WiFiConnectionDetails, WiFiCredentials, WiFiDetails, WiFiEncryptionType, WiFiNetwork,
    WiFiPhaseTwoType, WiFiScanStatus, WiFiStatus,
};

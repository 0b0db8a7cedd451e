//! WebSocket transport for rgbw-ctrl devices.
//!
//! [`WsLink`] keeps one socket to `ws://<device>/ws` alive: inbound frames
//! feed the live [`rgbw_proto::DeviceState`] and an injected
//! [`rgbw_proto::Dispatcher`], and a [`Watchdog`] replaces sockets that go
//! silent.

mod error;
pub mod supervisor;
pub mod watchdog;

pub use error::LinkError;
pub use supervisor::{
    CloseReason, DEFAULT_LIVENESS_TIMEOUT, DEFAULT_REDIAL_DELAY, LinkConfig, LinkStatus, Redial,
    SessionEvent, WsLink,
};
pub use watchdog::{Verdict, Watchdog};

//! The GATT operations the controller needs from a BLE stack.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use rgbw_proto::ble::GattPath;
use uuid::Uuid;

use crate::BleError;

/// Something that happened on the link after it was connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Notification { characteristic: Uuid, value: Vec<u8> },
    Disconnected,
}

pub type LinkEvents = Pin<Box<dyn Stream<Item = LinkEvent> + Send>>;

/// A characteristic found during service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovered {
    pub path: GattPath,
    pub notify: bool,
}

/// One peripheral's GATT client.
///
/// Operations on a single characteristic complete in the order they were
/// issued. After [`GattLink::disconnect`] or a [`LinkEvent::Disconnected`],
/// every operation fails until `connect` succeeds again.
pub trait GattLink: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<(), BleError>> + Send;

    fn discover(&self) -> impl Future<Output = Result<Vec<Discovered>, BleError>> + Send;

    fn read(&self, path: GattPath) -> impl Future<Output = Result<Vec<u8>, BleError>> + Send;

    fn write(
        &self,
        path: GattPath,
        value: &[u8],
    ) -> impl Future<Output = Result<(), BleError>> + Send;

    fn subscribe(&self, path: GattPath) -> impl Future<Output = Result<(), BleError>> + Send;

    /// Notifications and link loss. The stream ends when the link does.
    fn events(&self) -> impl Future<Output = Result<LinkEvents, BleError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), BleError>> + Send;
}

use rgbw_proto::ble::Field;
use rgbw_proto::{DecodeError, EncodeError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("bluetooth: {0}")]
    Btle(#[from] btleplug::Error),
    #[error("no bluetooth adapter found")]
    NoAdapter,
    #[error("no device matching {0:?} found")]
    DeviceNotFound(String),
    #[error("characteristic {0} was not discovered")]
    UnknownCharacteristic(Uuid),
    #[error("GATT operation failed: {0}")]
    Gatt(String),
    #[error("not connected")]
    NotConnected,
    #[error("device does not support {0}")]
    Unsupported(Field),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

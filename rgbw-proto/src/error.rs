//! Codec errors.
//!
//! Decoding fails closed: a [`DecodeError`] means the frame is dropped and no
//! state is touched. An [`EncodeError`] is raised before any byte is produced.

/// A frame or record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{record}: expected {expected} bytes, got {actual}")]
    Length {
        record: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{record}: need at least {needed} bytes, got {actual}")]
    Truncated {
        record: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("{record}: invalid discriminant {value}")]
    Discriminant { record: &'static str, value: u8 },
    #[error("{record}: {count} entries exceeds limit of {max}")]
    TooManyEntries {
        record: &'static str,
        count: usize,
        max: usize,
    },
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("{0} is write-only")]
    NotReadable(&'static str),
}

/// A value violates a wire invariant and cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("invalid MAC address {0:?}: expected six colon-separated hex octets")]
    InvalidMacAddress(String),
    #[error("{record}: {count} entries exceeds limit of {max}")]
    TooManyEntries {
        record: &'static str,
        count: usize,
        max: usize,
    },
    #[error("credential shape does not match encryption type {0}")]
    CredentialMismatch(u8),
    #[error("device name must be 1 to {max} bytes, got {actual}")]
    DeviceNameLength { max: usize, actual: usize },
    #[error("{0} is not sent by the client")]
    NotSendable(&'static str),
}

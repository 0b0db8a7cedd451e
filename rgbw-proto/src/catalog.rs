//! Message types carried on the WebSocket and the layout of their frames.
//!
//! Frames are `tag: u8` followed by the record. The table below lists the
//! layout of frames sent by the device; requests sent by the client are
//! built in [`crate::message::Request`].

use std::fmt;

use crate::model::{
    AlexaIntegrationSettings, DEVICE_NAME_MAX_LEN, FIRMWARE_VERSION_LEN, HttpCredentials,
    MacAddress, OtaState, OutputState,
};
use crate::wifi::{WiFiConnectionDetails, WiFiDetails};

/// Envelope tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[repr(u8)]
pub enum MessageType {
    Heap = 0,
    DeviceName = 1,
    FirmwareVersion = 2,
    Color = 3,
    HttpCredentials = 4,
    BleStatus = 5,
    WiFiStatus = 6,
    WiFiScanStatus = 7,
    WiFiDetails = 8,
    WiFiConnectionDetails = 9,
    OtaProgress = 10,
    AlexaIntegrationSettings = 11,
    EspNowDevices = 12,
    EspNowController = 13,
}

/// Expected size of a whole frame, tag included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Fixed(usize),
    Variable { min_len: usize },
}

impl Layout {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            Layout::Fixed(expected) => len == expected,
            Layout::Variable { min_len } => len >= min_len,
        }
    }
}

pub struct CatalogEntry {
    pub message_type: MessageType,
    pub name: &'static str,
    pub layout: Layout,
}

const TAG: usize = 1;

/// Indexed by tag. Append only: tags are never reused or renumbered.
pub static CATALOG: [CatalogEntry; 14] = [
    CatalogEntry {
        message_type: MessageType::Heap,
        name: "heap",
        layout: Layout::Fixed(TAG + 4),
    },
    CatalogEntry {
        message_type: MessageType::DeviceName,
        name: "device name",
        layout: Layout::Fixed(TAG + DEVICE_NAME_MAX_LEN + 1),
    },
    CatalogEntry {
        message_type: MessageType::FirmwareVersion,
        name: "firmware version",
        layout: Layout::Fixed(TAG + FIRMWARE_VERSION_LEN),
    },
    CatalogEntry {
        message_type: MessageType::Color,
        name: "color",
        layout: Layout::Fixed(TAG + OutputState::LEN),
    },
    CatalogEntry {
        message_type: MessageType::HttpCredentials,
        name: "http credentials",
        layout: Layout::Fixed(TAG + HttpCredentials::LEN),
    },
    CatalogEntry {
        message_type: MessageType::BleStatus,
        name: "ble status",
        layout: Layout::Fixed(TAG + 1),
    },
    CatalogEntry {
        message_type: MessageType::WiFiStatus,
        name: "wifi status",
        layout: Layout::Fixed(TAG + 1),
    },
    CatalogEntry {
        message_type: MessageType::WiFiScanStatus,
        name: "wifi scan status",
        layout: Layout::Fixed(TAG + 1),
    },
    CatalogEntry {
        message_type: MessageType::WiFiDetails,
        name: "wifi details",
        layout: Layout::Fixed(TAG + WiFiDetails::LEN),
    },
    CatalogEntry {
        message_type: MessageType::WiFiConnectionDetails,
        name: "wifi connection details",
        layout: Layout::Fixed(TAG + WiFiConnectionDetails::LEN),
    },
    CatalogEntry {
        message_type: MessageType::OtaProgress,
        name: "ota progress",
        layout: Layout::Fixed(TAG + OtaState::LEN),
    },
    CatalogEntry {
        message_type: MessageType::AlexaIntegrationSettings,
        name: "alexa integration settings",
        layout: Layout::Fixed(TAG + AlexaIntegrationSettings::LEN),
    },
    // The device sends the whole device table, unused slots zeroed.
    CatalogEntry {
        message_type: MessageType::EspNowDevices,
        name: "esp-now devices",
        layout: Layout::Variable { min_len: TAG + 1 },
    },
    CatalogEntry {
        message_type: MessageType::EspNowController,
        name: "esp-now controller",
        layout: Layout::Fixed(TAG + MacAddress::LEN),
    },
];

impl MessageType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        CATALOG.get(tag as usize).map(|entry| entry.message_type)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn entry(self) -> &'static CatalogEntry {
        &CATALOG[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn layout(self) -> Layout {
        self.entry().layout
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_tag() {
        for (index, entry) in CATALOG.iter().enumerate() {
            assert_eq!(entry.message_type as usize, index, "{}", entry.name);
            assert_eq!(MessageType::from_u8(index as u8), Some(entry.message_type));
        }
        assert_eq!(MessageType::from_u8(14), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn frame_sizes() {
        let fixed = |t: MessageType| match t.layout() {
            Layout::Fixed(len) => len,
            Layout::Variable { .. } => panic!("{t} is variable"),
        };
        assert_eq!(fixed(MessageType::Heap), 5);
        assert_eq!(fixed(MessageType::DeviceName), 30);
        assert_eq!(fixed(MessageType::FirmwareVersion), 11);
        assert_eq!(fixed(MessageType::Color), 9);
        assert_eq!(fixed(MessageType::HttpCredentials), 67);
        assert_eq!(fixed(MessageType::BleStatus), 2);
        assert_eq!(fixed(MessageType::WiFiDetails), 56);
        assert_eq!(fixed(MessageType::WiFiConnectionDetails), 228);
        assert_eq!(fixed(MessageType::OtaProgress), 10);
        assert_eq!(fixed(MessageType::AlexaIntegrationSettings), 130);
        assert_eq!(fixed(MessageType::EspNowController), 7);
    }

    #[test]
    fn layout_acceptance() {
        assert!(Layout::Fixed(9).accepts(9));
        assert!(!Layout::Fixed(9).accepts(8));
        assert!(!Layout::Fixed(9).accepts(10));
        assert!(Layout::Variable { min_len: 2 }.accepts(301));
        assert!(!Layout::Variable { min_len: 2 }.accepts(1));
    }
}

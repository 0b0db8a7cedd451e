//! GATT layout of the device and the BLE encoding of each field.
//!
//! Characteristic values are the bare records, without the WebSocket tag.
//! A few differ from their frame form: the device name is raw UTF-8 and the
//! restart characteristic takes a fixed ASCII token.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Reader, decode_cstr};
use crate::message::Message;
use crate::model::{
    AlexaIntegrationSettings, EspNowDevice, HttpCredentials, MacAddress, OutputState,
    ProtocolLimits, encode_device_name, esp_now_list,
};
use crate::wifi::{WiFiConnectionDetails, WiFiDetails, WiFiScanStatus, WiFiStatus, scan_result};
use crate::{DecodeError, EncodeError};

/// Written to [`Field::DeviceRestart`] to reboot the device.
pub const RESTART_TOKEN: &[u8] = b"RESTART_NOW";

/// Written to [`Field::WiFiScanStatus`] to start a scan.
pub const START_SCAN: u8 = 0;

/// A logical device field exposed as one characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Field {
    DeviceRestart,
    DeviceName,
    FirmwareVersion,
    Heap,
    HttpCredentials,
    OutputColor,
    AlexaSettings,
    EspNowRemotes,
    EspNowController,
    WiFiDetails,
    WiFiStatus,
    WiFiScanStatus,
    WiFiScanResult,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::DeviceRestart,
        Field::DeviceName,
        Field::FirmwareVersion,
        Field::Heap,
        Field::HttpCredentials,
        Field::OutputColor,
        Field::AlexaSettings,
        Field::EspNowRemotes,
        Field::EspNowController,
        Field::WiFiDetails,
        Field::WiFiStatus,
        Field::WiFiScanStatus,
        Field::WiFiScanResult,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::DeviceRestart => "device restart",
            Field::DeviceName => "device name",
            Field::FirmwareVersion => "firmware version",
            Field::Heap => "heap",
            Field::HttpCredentials => "http credentials",
            Field::OutputColor => "output color",
            Field::AlexaSettings => "alexa settings",
            Field::EspNowRemotes => "esp-now remotes",
            Field::EspNowController => "esp-now controller",
            Field::WiFiDetails => "wifi details",
            Field::WiFiStatus => "wifi status",
            Field::WiFiScanStatus => "wifi scan status",
            Field::WiFiScanResult => "wifi scan result",
        }
    }

    pub fn readable(self) -> bool {
        self != Field::DeviceRestart
    }

    pub fn notifiable(self) -> bool {
        matches!(
            self,
            Field::DeviceName
                | Field::Heap
                | Field::OutputColor
                | Field::WiFiDetails
                | Field::WiFiStatus
                | Field::WiFiScanStatus
                | Field::WiFiScanResult
        )
    }

    /// Fields whose service only exists on some builds or roles.
    pub fn optional(self) -> bool {
        matches!(
            self,
            Field::OutputColor
                | Field::AlexaSettings
                | Field::EspNowRemotes
                | Field::EspNowController
        )
    }

    /// Decode a characteristic value read or notified from this field.
    pub fn decode(self, value: &[u8], limits: ProtocolLimits) -> Result<Message, DecodeError> {
        let name = self.name();
        Ok(match self {
            Field::DeviceRestart => return Err(DecodeError::NotReadable(name)),
            Field::DeviceName => Message::DeviceName(decode_cstr(value)),
            Field::FirmwareVersion => Message::FirmwareVersion(decode_cstr(value)),
            Field::Heap => Message::Heap(Reader::exact(name, value, 4)?.read_u32()?),
            Field::HttpCredentials => Message::HttpCredentials(HttpCredentials::from_bytes(value)?),
            Field::OutputColor => Message::Color(OutputState::from_bytes(value)?),
            Field::AlexaSettings => {
                Message::AlexaIntegrationSettings(AlexaIntegrationSettings::from_bytes(value)?)
            }
            Field::EspNowRemotes => Message::EspNowDevices(esp_now_list::from_bytes(value, limits)?),
            Field::EspNowController => Message::EspNowController(MacAddress::from_bytes(value)?),
            Field::WiFiDetails => Message::WiFiDetails(WiFiDetails::from_bytes(value)?),
            Field::WiFiStatus => Message::WiFiStatus(WiFiStatus::from_bytes(value)?),
            Field::WiFiScanStatus => Message::WiFiScanStatus(WiFiScanStatus::from_bytes(value)?),
            Field::WiFiScanResult => Message::WiFiScanResult(scan_result::from_bytes(value)?),
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Restart,
    SetDeviceName(String),
    SetHttpCredentials(HttpCredentials),
    SetColor(OutputState),
    SetAlexaSettings(AlexaIntegrationSettings),
    SetEspNowRemotes(Vec<EspNowDevice>),
    SetEspNowController(MacAddress),
    ConnectWiFi(WiFiConnectionDetails),
    StartWiFiScan,
}

impl Command {
    pub fn field(&self) -> Field {
        match self {
            Command::Restart => Field::DeviceRestart,
            Command::SetDeviceName(_) => Field::DeviceName,
            Command::SetHttpCredentials(_) => Field::HttpCredentials,
            Command::SetColor(_) => Field::OutputColor,
            Command::SetAlexaSettings(_) => Field::AlexaSettings,
            Command::SetEspNowRemotes(_) => Field::EspNowRemotes,
            Command::SetEspNowController(_) => Field::EspNowController,
            Command::ConnectWiFi(_) => Field::WiFiStatus,
            Command::StartWiFiScan => Field::WiFiScanStatus,
        }
    }

    pub fn to_bytes(&self, limits: ProtocolLimits) -> Result<Vec<u8>, EncodeError> {
        Ok(match self {
            Command::Restart => RESTART_TOKEN.to_vec(),
            Command::SetDeviceName(name) => encode_device_name(name)?,
            Command::SetHttpCredentials(credentials) => credentials.to_bytes(),
            Command::SetColor(state) => state.to_bytes(),
            Command::SetAlexaSettings(settings) => settings.to_bytes(),
            Command::SetEspNowRemotes(devices) => esp_now_list::to_bytes(devices, limits)?,
            Command::SetEspNowController(address) => address.to_bytes(),
            Command::ConnectWiFi(details) => details.to_bytes()?,
            Command::StartWiFiScan => vec![START_SCAN],
        })
    }
}

/// Where a field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattPath {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// Field to characteristic mapping for one firmware revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattLayout {
    fields: BTreeMap<Field, GattPath>,
}

const fn service(n: u128) -> Uuid {
    Uuid::from_u128(0x12345678_1234_1234_1234_123456789000 + n)
}

const fn characteristic(n: u128) -> Uuid {
    Uuid::from_u128(0xaaaaaaaa_bbbb_cccc_dddd_eeeeeeee0000 + n)
}

pub const DEVICE_DETAILS_SERVICE: Uuid = service(0x0);
pub const HTTP_SERVICE: Uuid = service(0x1);
pub const OUTPUT_SERVICE: Uuid = service(0x2);
pub const ALEXA_SERVICE: Uuid = service(0x3);
/// Present on a controller; lists its paired remotes.
pub const ESP_NOW_CONTROLLER_SERVICE: Uuid = service(0x4);
/// Present on a remote; holds the address of its controller.
pub const ESP_NOW_REMOTE_SERVICE: Uuid = service(0x5);
pub const WIFI_SERVICE: Uuid = service(0x6);

impl Default for GattLayout {
    fn default() -> Self {
        Self::from_pairs([
            (Field::DeviceRestart, DEVICE_DETAILS_SERVICE, characteristic(0x0001)),
            (Field::DeviceName, DEVICE_DETAILS_SERVICE, characteristic(0x0002)),
            (Field::FirmwareVersion, DEVICE_DETAILS_SERVICE, characteristic(0x0003)),
            (Field::Heap, DEVICE_DETAILS_SERVICE, characteristic(0x0004)),
            (Field::HttpCredentials, HTTP_SERVICE, characteristic(0x1001)),
            (Field::OutputColor, OUTPUT_SERVICE, characteristic(0x2001)),
            (Field::AlexaSettings, ALEXA_SERVICE, characteristic(0x3001)),
            (Field::EspNowRemotes, ESP_NOW_CONTROLLER_SERVICE, characteristic(0x4001)),
            (Field::EspNowController, ESP_NOW_REMOTE_SERVICE, characteristic(0x5001)),
            (Field::WiFiDetails, WIFI_SERVICE, characteristic(0x6001)),
            (Field::WiFiStatus, WIFI_SERVICE, characteristic(0x6002)),
            (Field::WiFiScanStatus, WIFI_SERVICE, characteristic(0x6003)),
            (Field::WiFiScanResult, WIFI_SERVICE, characteristic(0x6004)),
        ])
    }
}

impl GattLayout {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Field, Uuid, Uuid)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(field, service, characteristic)| {
                    (field, GattPath { service, characteristic })
                })
                .collect(),
        }
    }

    /// Early firmware: two services with sequentially numbered
    /// characteristics and no ESP-NOW controller field.
    pub fn two_service() -> Self {
        let details = Uuid::from_u128(0x12345678_1234_1234_1234_1234567890ac);
        let wifi = Uuid::from_u128(0x12345678_1234_1234_1234_1234567890ab);
        Self::from_pairs([
            (Field::DeviceRestart, details, characteristic(0x0)),
            (Field::DeviceName, details, characteristic(0x1)),
            (Field::FirmwareVersion, details, characteristic(0x2)),
            (Field::HttpCredentials, details, characteristic(0x3)),
            (Field::Heap, details, characteristic(0x4)),
            (Field::OutputColor, details, characteristic(0x5)),
            (Field::AlexaSettings, details, characteristic(0x6)),
            (Field::EspNowRemotes, details, characteristic(0x7)),
            (Field::WiFiDetails, wifi, characteristic(0x8)),
            (Field::WiFiStatus, wifi, characteristic(0x9)),
            (Field::WiFiScanStatus, wifi, characteristic(0xa)),
            (Field::WiFiScanResult, wifi, characteristic(0xb)),
        ])
    }

    pub fn path(&self, field: Field) -> Option<GattPath> {
        self.fields.get(&field).copied()
    }

    pub fn set(&mut self, field: Field, path: GattPath) {
        self.fields.insert(field, path);
    }

    pub fn remove(&mut self, field: Field) {
        self.fields.remove(&field);
    }

    pub fn fields(&self) -> impl Iterator<Item = (Field, GattPath)> + '_ {
        self.fields.iter().map(|(field, path)| (*field, *path))
    }

    /// Distinct services referenced by the layout.
    pub fn services(&self) -> Vec<Uuid> {
        let mut services: Vec<Uuid> = self.fields.values().map(|path| path.service).collect();
        services.sort();
        services.dedup();
        services
    }

    /// The field a notification came from.
    pub fn field_for(&self, characteristic: Uuid) -> Option<Field> {
        self.fields
            .iter()
            .find(|(_, path)| path.characteristic == characteristic)
            .map(|(field, _)| *field)
    }
}

//! Typed frames.
//!
//! [`Message`] is what the device reports; [`Request`] is what the client
//! asks of it. Both live on the WebSocket as `tag || record`.

use crate::catalog::{Layout, MessageType};
use crate::codec::{Reader, Writer, encode_fixed};
use crate::model::{
    AlexaIntegrationSettings, BleStatus, DEVICE_NAME_MAX_LEN, EspNowDevice, FIRMWARE_VERSION_LEN,
    HttpCredentials, MacAddress, OtaState, OutputState, ProtocolLimits, esp_now_list,
};
use crate::wifi::{
    WiFiConnectionDetails, WiFiDetails, WiFiNetwork, WiFiScanStatus, WiFiStatus,
};
use crate::{DecodeError, EncodeError};

/// A decoded, owned snapshot of one device field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Message {
    Heap(u32),
    DeviceName(String),
    FirmwareVersion(String),
    Color(OutputState),
    HttpCredentials(HttpCredentials),
    BleStatus(BleStatus),
    WiFiStatus(WiFiStatus),
    WiFiScanStatus(WiFiScanStatus),
    WiFiDetails(WiFiDetails),
    WiFiConnectionDetails(WiFiConnectionDetails),
    OtaProgress(OtaState),
    AlexaIntegrationSettings(AlexaIntegrationSettings),
    EspNowDevices(Vec<EspNowDevice>),
    EspNowController(MacAddress),
    /// Only readable over BLE; it has no frame.
    WiFiScanResult(Vec<WiFiNetwork>),
}

impl Message {
    /// The tag this message travels under, or `None` for BLE-only fields.
    pub fn message_type(&self) -> Option<MessageType> {
        Some(match self {
            Message::Heap(_) => MessageType::Heap,
            Message::DeviceName(_) => MessageType::DeviceName,
            Message::FirmwareVersion(_) => MessageType::FirmwareVersion,
            Message::Color(_) => MessageType::Color,
            Message::HttpCredentials(_) => MessageType::HttpCredentials,
            Message::BleStatus(_) => MessageType::BleStatus,
            Message::WiFiStatus(_) => MessageType::WiFiStatus,
            Message::WiFiScanStatus(_) => MessageType::WiFiScanStatus,
            Message::WiFiDetails(_) => MessageType::WiFiDetails,
            Message::WiFiConnectionDetails(_) => MessageType::WiFiConnectionDetails,
            Message::OtaProgress(_) => MessageType::OtaProgress,
            Message::AlexaIntegrationSettings(_) => MessageType::AlexaIntegrationSettings,
            Message::EspNowDevices(_) => MessageType::EspNowDevices,
            Message::EspNowController(_) => MessageType::EspNowController,
            Message::WiFiScanResult(_) => return None,
        })
    }

    /// Decode a whole frame. The frame length is checked against the catalog
    /// before the record is looked at.
    pub fn from_frame(frame: &[u8], limits: ProtocolLimits) -> Result<Self, DecodeError> {
        let (&tag, payload) = frame.split_first().ok_or(DecodeError::EmptyFrame)?;
        let message_type = MessageType::from_u8(tag).ok_or(DecodeError::UnknownTag(tag))?;
        match message_type.layout() {
            Layout::Fixed(expected) if frame.len() != expected => {
                return Err(DecodeError::Length {
                    record: message_type.name(),
                    expected,
                    actual: frame.len(),
                });
            }
            Layout::Variable { min_len } if frame.len() < min_len => {
                return Err(DecodeError::Truncated {
                    record: message_type.name(),
                    needed: min_len,
                    actual: frame.len(),
                });
            }
            _ => {}
        }
        Self::from_payload(message_type, payload, limits)
    }

    /// Decode the record that follows the tag.
    pub fn from_payload(
        message_type: MessageType,
        payload: &[u8],
        limits: ProtocolLimits,
    ) -> Result<Self, DecodeError> {
        let name = message_type.name();
        Ok(match message_type {
            MessageType::Heap => Message::Heap(Reader::exact(name, payload, 4)?.read_u32()?),
            MessageType::DeviceName => Message::DeviceName(
                Reader::exact(name, payload, DEVICE_NAME_MAX_LEN + 1)?
                    .read_cstr(DEVICE_NAME_MAX_LEN + 1)?,
            ),
            MessageType::FirmwareVersion => Message::FirmwareVersion(
                Reader::exact(name, payload, FIRMWARE_VERSION_LEN)?
                    .read_cstr(FIRMWARE_VERSION_LEN)?,
            ),
            MessageType::Color => Message::Color(OutputState::from_bytes(payload)?),
            MessageType::HttpCredentials => {
                Message::HttpCredentials(HttpCredentials::from_bytes(payload)?)
            }
            MessageType::BleStatus => {
                let raw = Reader::exact(name, payload, 1)?.read_u8()?;
                Message::BleStatus(
                    BleStatus::from_u8(raw)
                        .ok_or(DecodeError::Discriminant { record: name, value: raw })?,
                )
            }
            MessageType::WiFiStatus => Message::WiFiStatus(WiFiStatus::from_bytes(payload)?),
            MessageType::WiFiScanStatus => {
                Message::WiFiScanStatus(WiFiScanStatus::from_bytes(payload)?)
            }
            MessageType::WiFiDetails => Message::WiFiDetails(WiFiDetails::from_bytes(payload)?),
            MessageType::WiFiConnectionDetails => {
                Message::WiFiConnectionDetails(WiFiConnectionDetails::from_bytes(payload)?)
            }
            MessageType::OtaProgress => {
                Message::OtaProgress(OtaState::read_from(&mut Reader::exact(
                    name,
                    payload,
                    OtaState::LEN,
                )?)?)
            }
            MessageType::AlexaIntegrationSettings => {
                Message::AlexaIntegrationSettings(AlexaIntegrationSettings::from_bytes(payload)?)
            }
            MessageType::EspNowDevices => {
                Message::EspNowDevices(esp_now_list::from_bytes(payload, limits)?)
            }
            MessageType::EspNowController => {
                Message::EspNowController(MacAddress::from_bytes(payload)?)
            }
        })
    }

    /// Encode as the device would send it.
    pub fn to_frame(&self, limits: ProtocolLimits) -> Result<Vec<u8>, EncodeError> {
        let not_sendable = EncodeError::NotSendable("wifi scan result");
        let message_type = self.message_type().ok_or(not_sendable.clone())?;
        let payload = match self {
            Message::Heap(free) => free.to_le_bytes().to_vec(),
            Message::DeviceName(device_name) => encode_fixed(DEVICE_NAME_MAX_LEN + 1, |w| {
                w.write_cstr(device_name, DEVICE_NAME_MAX_LEN)
            }),
            Message::FirmwareVersion(version) => encode_fixed(FIRMWARE_VERSION_LEN, |w| {
                w.write_cstr(version, FIRMWARE_VERSION_LEN - 1)
            }),
            Message::Color(state) => state.to_bytes(),
            Message::HttpCredentials(credentials) => credentials.to_bytes(),
            Message::BleStatus(status) => vec![*status as u8],
            Message::WiFiStatus(status) => vec![*status as u8],
            Message::WiFiScanStatus(status) => vec![*status as u8],
            Message::WiFiDetails(details) => details.to_bytes(),
            Message::WiFiConnectionDetails(details) => details.to_bytes()?,
            Message::OtaProgress(ota) => encode_fixed(OtaState::LEN, |w| ota.write_to(w)),
            Message::AlexaIntegrationSettings(settings) => settings.to_bytes(),
            // The device always sends the full table, unused slots zeroed.
            Message::EspNowDevices(devices) => {
                let mut buf = vec![0u8; esp_now_list::len(limits.esp_now_max_devices as usize)];
                esp_now_list::write_to(devices, limits, &mut Writer::new(&mut buf))?;
                buf
            }
            Message::EspNowController(address) => address.to_bytes(),
            Message::WiFiScanResult(_) => return Err(not_sendable),
        };
        Ok(frame(message_type, &payload))
    }
}

fn frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(message_type.as_u8());
    out.extend_from_slice(payload);
    out
}

/// Something the client asks the device to do over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SetColor(OutputState),
    SetDeviceName(String),
    SetHttpCredentials(HttpCredentials),
    SetBleStatus(BleStatus),
    /// Join a network. Travels under the WiFi status tag, which is where the
    /// device listens for it.
    ConnectWiFi(WiFiConnectionDetails),
    StartWiFiScan,
    RequestWiFiDetails,
    RequestOtaProgress,
    RequestHeap,
    SetAlexaSettings(AlexaIntegrationSettings),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::SetColor(_) => MessageType::Color,
            Request::SetDeviceName(_) => MessageType::DeviceName,
            Request::SetHttpCredentials(_) => MessageType::HttpCredentials,
            Request::SetBleStatus(_) => MessageType::BleStatus,
            Request::ConnectWiFi(_) => MessageType::WiFiStatus,
            Request::StartWiFiScan => MessageType::WiFiScanStatus,
            Request::RequestWiFiDetails => MessageType::WiFiDetails,
            Request::RequestOtaProgress => MessageType::OtaProgress,
            Request::RequestHeap => MessageType::Heap,
            Request::SetAlexaSettings(_) => MessageType::AlexaIntegrationSettings,
        }
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, EncodeError> {
        let payload = match self {
            Request::SetColor(state) => state.to_bytes(),
            Request::SetDeviceName(name) => {
                // Same rules as the BLE write; the frame just pads it.
                let raw = crate::model::encode_device_name(name)?;
                encode_fixed(DEVICE_NAME_MAX_LEN + 1, |w| {
                    w.write_bytes(&raw);
                    w.write_zeros(DEVICE_NAME_MAX_LEN + 1 - raw.len());
                })
            }
            Request::SetHttpCredentials(credentials) => credentials.to_bytes(),
            Request::SetBleStatus(status) => vec![*status as u8],
            Request::ConnectWiFi(details) => details.to_bytes()?,
            Request::SetAlexaSettings(settings) => settings.to_bytes(),
            Request::StartWiFiScan
            | Request::RequestWiFiDetails
            | Request::RequestOtaProgress
            | Request::RequestHeap => Vec::new(),
        };
        Ok(frame(self.message_type(), &payload))
    }
}

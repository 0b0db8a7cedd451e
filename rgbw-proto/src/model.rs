//! Device records: output channels, Alexa bridging, HTTP credentials,
//! ESP-NOW peers, OTA progress and BLE status.
//!
//! Every record has a fixed `LEN`, a `write_to`/`read_from` pair that works on
//! a shared cursor (so records nest inside frames), and `to_bytes`/`from_bytes`
//! for the bare record as carried by a BLE characteristic.

use std::fmt;
use std::str::FromStr;

use crate::codec::{Reader, Writer, encode_fixed};
use crate::{DecodeError, EncodeError};

/// One PWM channel.
///
/// `value` is the byte that actually drives the LED, i.e. after perceptual
/// mapping (see [`crate::color`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LightState {
    pub on: bool,
    pub value: u8,
}

impl LightState {
    pub const LEN: usize = 2;

    pub fn new(on: bool, value: u8) -> Self {
        Self { on, value }
    }

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_bool(self.on);
        w.write_u8(self.value);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            on: r.read_bool()?,
            value: r.read_u8()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        [u8::from(self.on), self.value]
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("light state", data, Self::LEN)?)
    }
}

/// Output channel index, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
    White = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::White];
}

/// The four output channels, always `[R, G, B, W]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OutputState {
    pub channels: [LightState; 4],
}

impl OutputState {
    pub const LEN: usize = LightState::LEN * 4;

    pub fn new(channels: [LightState; 4]) -> Self {
        Self { channels }
    }

    pub fn channel(&self, channel: Channel) -> LightState {
        self.channels[channel as usize]
    }

    pub fn set_channel(&mut self, channel: Channel, state: LightState) {
        self.channels[channel as usize] = state;
    }

    pub fn write_to(&self, w: &mut Writer<'_>) {
        for light in &self.channels {
            light.write_to(w);
        }
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut channels = [LightState::default(); 4];
        for light in &mut channels {
            *light = LightState::read_from(r)?;
        }
        Ok(Self { channels })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_fixed(Self::LEN, |w| self.write_to(w))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("output state", data, Self::LEN)?)
    }
}

/// Six raw MAC bytes.
///
/// Only rendered as `AA:BB:CC:DD:EE:FF` at the display boundary; comparisons
/// always use the bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const LEN: usize = 6;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_bytes(&self.0);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self(r.read_array()?))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("mac address", data, Self::LEN)?)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EncodeError::InvalidMacAddress(s.to_string());
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl serde::Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How the device exposes its channels to Alexa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum AlexaIntegrationMode {
    #[default]
    Off = 0,
    RgbwDevice = 1,
    RgbDevice = 2,
    MultiDevice = 3,
}

impl AlexaIntegrationMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::RgbwDevice),
            2 => Some(Self::RgbDevice),
            3 => Some(Self::MultiDevice),
            _ => None,
        }
    }
}

impl fmt::Display for AlexaIntegrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "Off",
            Self::RgbwDevice => "RGBW Device",
            Self::RgbDevice => "RGB Device",
            Self::MultiDevice => "Multi Device",
        })
    }
}

/// Alexa bridge configuration.
///
/// All four names are always transmitted; names a mode does not use go out as
/// empty strings so the record stays 129 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AlexaIntegrationSettings {
    pub mode: AlexaIntegrationMode,
    pub r_name: String,
    pub g_name: String,
    pub b_name: String,
    pub w_name: String,
}

impl AlexaIntegrationSettings {
    pub const NAME_MAX_LEN: usize = 31;
    pub const LEN: usize = 1 + 4 * (Self::NAME_MAX_LEN + 1);

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_u8(self.mode as u8);
        for name in [&self.r_name, &self.g_name, &self.b_name, &self.w_name] {
            w.write_cstr(name, Self::NAME_MAX_LEN);
        }
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let raw = r.read_u8()?;
        let mode = AlexaIntegrationMode::from_u8(raw).ok_or(DecodeError::Discriminant {
            record: "alexa integration mode",
            value: raw,
        })?;
        let field = Self::NAME_MAX_LEN + 1;
        Ok(Self {
            mode,
            r_name: r.read_cstr(field)?,
            g_name: r.read_cstr(field)?,
            b_name: r.read_cstr(field)?,
            w_name: r.read_cstr(field)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_fixed(Self::LEN, |w| self.write_to(w))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("alexa settings", data, Self::LEN)?)
    }
}

/// Basic-auth credentials guarding the device's web server.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct HttpCredentials {
    pub username: String,
    pub password: String,
}

impl HttpCredentials {
    pub const USERNAME_MAX_LEN: usize = 32;
    pub const PASSWORD_MAX_LEN: usize = 32;
    pub const LEN: usize = Self::USERNAME_MAX_LEN + 1 + Self::PASSWORD_MAX_LEN + 1;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_cstr(&self.username, Self::USERNAME_MAX_LEN);
        w.write_cstr(&self.password, Self::PASSWORD_MAX_LEN);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            username: r.read_cstr(Self::USERNAME_MAX_LEN + 1)?,
            password: r.read_cstr(Self::PASSWORD_MAX_LEN + 1)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_fixed(Self::LEN, |w| self.write_to(w))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("http credentials", data, Self::LEN)?)
    }
}

/// Bounds that differ between firmware revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    pub esp_now_max_devices: u8,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            esp_now_max_devices: 10,
        }
    }
}

/// A paired ESP-NOW remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct EspNowDevice {
    pub name: String,
    pub address: MacAddress,
}

impl EspNowDevice {
    pub const NAME_MAX_LEN: usize = 23;
    pub const LEN: usize = Self::NAME_MAX_LEN + 1 + MacAddress::LEN;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_cstr(&self.name, Self::NAME_MAX_LEN);
        self.address.write_to(w);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: r.read_cstr(Self::NAME_MAX_LEN + 1)?,
            address: MacAddress::read_from(r)?,
        })
    }
}

/// `count: u8` followed by `count` ESP-NOW device records.
pub mod esp_now_list {
    use super::*;

    const RECORD: &str = "esp-now devices";

    /// Encoded size of a list with `count` entries.
    pub fn len(count: usize) -> usize {
        1 + count * EspNowDevice::LEN
    }

    pub fn write_to(
        devices: &[EspNowDevice],
        limits: ProtocolLimits,
        w: &mut Writer<'_>,
    ) -> Result<(), EncodeError> {
        check(devices.len(), limits)?;
        w.write_u8(devices.len() as u8);
        for device in devices {
            device.write_to(w);
        }
        Ok(())
    }

    pub fn to_bytes(devices: &[EspNowDevice], limits: ProtocolLimits) -> Result<Vec<u8>, EncodeError> {
        check(devices.len(), limits)?;
        let mut buf = vec![0u8; len(devices.len())];
        write_to(devices, limits, &mut Writer::new(&mut buf))?;
        Ok(buf)
    }

    /// Read the count and exactly that many entries; anything after them is
    /// padding and ignored.
    pub fn read_from(
        r: &mut Reader<'_>,
        limits: ProtocolLimits,
    ) -> Result<Vec<EspNowDevice>, DecodeError> {
        let count = r.read_u8()? as usize;
        if count > limits.esp_now_max_devices as usize {
            return Err(DecodeError::TooManyEntries {
                record: RECORD,
                count,
                max: limits.esp_now_max_devices as usize,
            });
        }
        (0..count).map(|_| EspNowDevice::read_from(r)).collect()
    }

    pub fn from_bytes(data: &[u8], limits: ProtocolLimits) -> Result<Vec<EspNowDevice>, DecodeError> {
        read_from(&mut Reader::at_least(RECORD, data, 1)?, limits)
    }

    fn check(count: usize, limits: ProtocolLimits) -> Result<(), EncodeError> {
        if count > limits.esp_now_max_devices as usize {
            return Err(EncodeError::TooManyEntries {
                record: RECORD,
                count,
                max: limits.esp_now_max_devices as usize,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum OtaStatus {
    #[default]
    Idle = 0,
    Started = 1,
    Completed = 2,
    Failed = 3,
}

impl OtaStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Started),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Firmware update progress as reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OtaState {
    pub status: OtaStatus,
    pub total_bytes_expected: u32,
    pub total_bytes_received: u32,
}

impl OtaState {
    pub const LEN: usize = 1 + 4 + 4;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_u8(self.status as u8);
        w.write_u32(self.total_bytes_expected);
        w.write_u32(self.total_bytes_received);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let raw = r.read_u8()?;
        let status = OtaStatus::from_u8(raw).ok_or(DecodeError::Discriminant {
            record: "ota status",
            value: raw,
        })?;
        Ok(Self {
            status,
            total_bytes_expected: r.read_u32()?,
            total_bytes_received: r.read_u32()?,
        })
    }

    /// Percentage complete, if the device announced a size.
    pub fn percent(&self) -> Option<u8> {
        if self.total_bytes_expected == 0 {
            return None;
        }
        let pct = u64::from(self.total_bytes_received) * 100 / u64::from(self.total_bytes_expected);
        Some(pct.min(100) as u8)
    }
}

/// The device's BLE radio state; also written by the client to switch BLE
/// on (`Advertising`) or off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum BleStatus {
    #[default]
    Off = 0,
    Advertising = 1,
    Connected = 2,
}

impl BleStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Advertising),
            2 => Some(Self::Connected),
            _ => None,
        }
    }
}

pub const DEVICE_NAME_MAX_LEN: usize = 28;
pub const FIRMWARE_VERSION_LEN: usize = 10;

/// Device name as written to the BLE name characteristic: raw UTF-8, no
/// terminator, 1 to 28 bytes.
pub fn encode_device_name(name: &str) -> Result<Vec<u8>, EncodeError> {
    let bytes = crate::codec::truncate_utf8(name, DEVICE_NAME_MAX_LEN);
    if bytes.is_empty() {
        return Err(EncodeError::DeviceNameLength {
            max: DEVICE_NAME_MAX_LEN,
            actual: 0,
        });
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn off() -> LightState {
        LightState::new(false, 0)
    }

    #[test]
    fn output_state_literal_bytes() {
        let state = OutputState::new([LightState::new(true, 128), off(), off(), off()]);
        assert_eq!(state.to_bytes(), [0x01, 0x80, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn output_state_round_trip() {
        let state = OutputState::new([
            LightState::new(true, 255),
            LightState::new(false, 17),
            LightState::new(true, 0),
            LightState::new(true, 99),
        ]);
        assert_eq!(OutputState::from_bytes(&state.to_bytes()).unwrap(), state);
        assert_eq!(state.channel(Channel::White), LightState::new(true, 99));
    }

    #[test]
    fn light_state_rejects_wrong_length() {
        assert!(matches!(
            LightState::from_bytes(&[0x01, 0x01, 0x01]),
            Err(DecodeError::Length { expected: 2, actual: 3, .. })
        ));
        assert!(LightState::from_bytes(&[1; 9]).is_err());
        assert!(LightState::from_bytes(&[1]).is_err());
        assert_eq!(LightState::from_bytes(&[2, 7]).unwrap(), LightState::new(true, 7));
    }

    #[test]
    fn output_state_rejects_wrong_length() {
        assert!(OutputState::from_bytes(&[0; 9]).is_err());
        assert!(OutputState::from_bytes(&[0; 7]).is_err());
    }

    #[test]
    fn alexa_settings_are_fixed_width() {
        let empty = AlexaIntegrationSettings::default();
        assert_eq!(empty.to_bytes().len(), 1 + 4 * 32);

        let full = AlexaIntegrationSettings {
            mode: AlexaIntegrationMode::MultiDevice,
            r_name: "red".into(),
            g_name: "green".into(),
            b_name: "blue".into(),
            w_name: "white".into(),
        };
        let bytes = full.to_bytes();
        assert_eq!(bytes.len(), AlexaIntegrationSettings::LEN);
        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[1..5], b"red\0");
        assert_eq!(&bytes[33..39], b"green\0");
        assert_eq!(AlexaIntegrationSettings::from_bytes(&bytes).unwrap(), full);
    }

    #[test]
    fn alexa_names_truncate_to_max() {
        let settings = AlexaIntegrationSettings {
            mode: AlexaIntegrationMode::RgbwDevice,
            r_name: "x".repeat(40),
            ..Default::default()
        };
        let decoded = AlexaIntegrationSettings::from_bytes(&settings.to_bytes()).unwrap();
        assert_eq!(decoded.r_name, "x".repeat(31));
        assert!(!decoded.r_name.contains('\0'));
    }

    #[test]
    fn alexa_rejects_unknown_mode() {
        let mut bytes = AlexaIntegrationSettings::default().to_bytes();
        bytes[0] = 9;
        assert_eq!(
            AlexaIntegrationSettings::from_bytes(&bytes),
            Err(DecodeError::Discriminant {
                record: "alexa integration mode",
                value: 9
            })
        );
    }

    #[test]
    fn http_credentials_round_trip() {
        let creds = HttpCredentials {
            username: "admin".into(),
            password: "s3cret-password".into(),
        };
        let bytes = creds.to_bytes();
        assert_eq!(bytes.len(), 66);
        assert_eq!(HttpCredentials::from_bytes(&bytes).unwrap(), creds);
    }

    #[test]
    fn mac_address_parse_and_display() {
        let mac: MacAddress = "aa:bb:cc:00:11:ff".parse().unwrap();
        assert_eq!(mac.0, [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0xFF]);
        assert_eq!(mac.to_string(), "AA:BB:CC:00:11:FF");
    }

    #[test]
    fn mac_address_rejects_bad_shapes() {
        for bad in [
            "",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA-BB-CC-DD-EE-FF",
            "AA:BB:CC:DD:EE:GG",
            "A:BB:CC:DD:EE:FF",
        ] {
            assert!(
                matches!(bad.parse::<MacAddress>(), Err(EncodeError::InvalidMacAddress(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    fn devices(n: usize) -> Vec<EspNowDevice> {
        (0..n)
            .map(|i| EspNowDevice {
                name: format!("remote-{i}"),
                address: MacAddress([0x24, 0x6F, 0x28, 0, 0, i as u8]),
            })
            .collect()
    }

    #[test]
    fn esp_now_lists_round_trip_up_to_limit() {
        let limits = ProtocolLimits::default();
        for n in [0, 1, 10] {
            let list = devices(n);
            let bytes = esp_now_list::to_bytes(&list, limits).unwrap();
            assert_eq!(bytes.len(), 1 + n * 30);
            assert_eq!(esp_now_list::from_bytes(&bytes, limits).unwrap(), list);
        }
    }

    #[test]
    fn esp_now_list_ignores_trailing_padding() {
        let limits = ProtocolLimits::default();
        let mut bytes = esp_now_list::to_bytes(&devices(2), limits).unwrap();
        bytes.resize(esp_now_list::len(10), 0xEE);
        assert_eq!(esp_now_list::from_bytes(&bytes, limits).unwrap(), devices(2));
    }

    #[test]
    fn esp_now_limit_is_configurable() {
        let ten = ProtocolLimits::default();
        let fifteen = ProtocolLimits {
            esp_now_max_devices: 15,
        };
        assert!(matches!(
            esp_now_list::to_bytes(&devices(11), ten),
            Err(EncodeError::TooManyEntries { count: 11, max: 10, .. })
        ));
        let bytes = esp_now_list::to_bytes(&devices(15), fifteen).unwrap();
        assert_eq!(esp_now_list::from_bytes(&bytes, fifteen).unwrap().len(), 15);
        assert!(esp_now_list::from_bytes(&bytes, ten).is_err());
    }

    #[test]
    fn esp_now_list_short_buffer_is_an_error() {
        let limits = ProtocolLimits::default();
        let bytes = esp_now_list::to_bytes(&devices(2), limits).unwrap();
        assert!(esp_now_list::from_bytes(&bytes[..40], limits).is_err());
        assert!(esp_now_list::from_bytes(&[], limits).is_err());
    }

    #[test]
    fn ota_percent() {
        let state = OtaState {
            status: OtaStatus::Started,
            total_bytes_expected: 200,
            total_bytes_received: 50,
        };
        assert_eq!(state.percent(), Some(25));
        assert_eq!(OtaState::default().percent(), None);
    }

    #[test]
    fn device_name_encoding() {
        assert_eq!(encode_device_name("kitchen").unwrap(), b"kitchen");
        assert_eq!(encode_device_name(&"n".repeat(40)).unwrap().len(), 28);
        assert!(encode_device_name("").is_err());
    }
}

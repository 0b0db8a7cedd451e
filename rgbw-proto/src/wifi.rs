//! WiFi records: station details, scan results and connection requests.

use std::fmt;

use crate::codec::{Reader, Writer, encode_fixed};
use crate::model::MacAddress;
use crate::{DecodeError, EncodeError};

pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 63;
pub const EAP_IDENTITY_MAX_LEN: usize = 63;
pub const EAP_USERNAME_MAX_LEN: usize = 63;
pub const EAP_PASSWORD_MAX_LEN: usize = 63;

/// Size of the credential region: the larger (enterprise) shape.
pub const CREDENTIALS_LEN: usize =
    EAP_IDENTITY_MAX_LEN + 1 + EAP_USERNAME_MAX_LEN + 1 + EAP_PASSWORD_MAX_LEN + 1 + 1;

/// Station state reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum WiFiStatus {
    Disconnected = 0,
    Connected = 1,
    ConnectionFailed = 2,
    #[default]
    Unknown = 3,
}

impl WiFiStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connected),
            2 => Some(Self::ConnectionFailed),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let raw = Reader::exact("wifi status", data, 1)?.read_u8()?;
        Self::from_u8(raw).ok_or(DecodeError::Discriminant {
            record: "wifi status",
            value: raw,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum WiFiScanStatus {
    #[default]
    NotStarted = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

impl WiFiScanStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Running),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let raw = Reader::exact("wifi scan status", data, 1)?.read_u8()?;
        Self::from_u8(raw).ok_or(DecodeError::Discriminant {
            record: "wifi scan status",
            value: raw,
        })
    }
}

/// Authentication mode byte, as the ESP-IDF WiFi driver numbers it.
///
/// Unrecognised bytes are kept as `Other` so scan results from a newer
/// firmware still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WiFiEncryptionType {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    WapiPsk,
    Owe,
    Wpa3Enterprise192,
    Wpa3ExtPsk,
    Wpa3ExtPskMixed,
    Dpp,
    Wpa3Enterprise,
    Wpa2Wpa3Enterprise,
    Other(u8),
}

impl WiFiEncryptionType {
    /// 802.1X networks carry identity/username/password credentials.
    pub fn is_enterprise(self) -> bool {
        matches!(
            self,
            Self::Wpa2Enterprise
                | Self::Wpa3Enterprise192
                | Self::Wpa3Enterprise
                | Self::Wpa2Wpa3Enterprise
        )
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl From<u8> for WiFiEncryptionType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            5 => Self::Wpa2Enterprise,
            6 => Self::Wpa3Psk,
            7 => Self::Wpa2Wpa3Psk,
            8 => Self::WapiPsk,
            9 => Self::Owe,
            10 => Self::Wpa3Enterprise192,
            11 => Self::Wpa3ExtPsk,
            12 => Self::Wpa3ExtPskMixed,
            13 => Self::Dpp,
            14 => Self::Wpa3Enterprise,
            15 => Self::Wpa2Wpa3Enterprise,
            other => Self::Other(other),
        }
    }
}

impl From<WiFiEncryptionType> for u8 {
    fn from(value: WiFiEncryptionType) -> Self {
        use WiFiEncryptionType::*;
        match value {
            Open => 0,
            Wep => 1,
            WpaPsk => 2,
            Wpa2Psk => 3,
            WpaWpa2Psk => 4,
            Wpa2Enterprise => 5,
            Wpa3Psk => 6,
            Wpa2Wpa3Psk => 7,
            WapiPsk => 8,
            Owe => 9,
            Wpa3Enterprise192 => 10,
            Wpa3ExtPsk => 11,
            Wpa3ExtPskMixed => 12,
            Dpp => 13,
            Wpa3Enterprise => 14,
            Wpa2Wpa3Enterprise => 15,
            Other(raw) => raw,
        }
    }
}

impl fmt::Display for WiFiEncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "auth-mode-{raw}"),
            known => write!(f, "{known:?}"),
        }
    }
}

impl serde::Serialize for WiFiEncryptionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// EAP-TTLS inner authentication method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum WiFiPhaseTwoType {
    #[default]
    Eap = 0,
    Mschapv2 = 1,
    Mschap = 2,
    Pap = 3,
    Chap = 4,
}

impl WiFiPhaseTwoType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Eap),
            1 => Some(Self::Mschapv2),
            2 => Some(Self::Mschap),
            3 => Some(Self::Pap),
            4 => Some(Self::Chap),
            _ => None,
        }
    }
}

/// The station's current network configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WiFiDetails {
    pub ssid: String,
    pub mac: MacAddress,
    pub ip: u32,
    pub gateway: u32,
    pub subnet: u32,
    pub dns: u32,
}

impl WiFiDetails {
    pub const LEN: usize = SSID_MAX_LEN + 1 + MacAddress::LEN + 4 * 4;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_cstr(&self.ssid, SSID_MAX_LEN);
        self.mac.write_to(w);
        for addr in [self.ip, self.gateway, self.subnet, self.dns] {
            w.write_u32(addr);
        }
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            ssid: r.read_cstr(SSID_MAX_LEN + 1)?,
            mac: MacAddress::read_from(r)?,
            ip: r.read_u32()?,
            gateway: r.read_u32()?,
            subnet: r.read_u32()?,
            dns: r.read_u32()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_fixed(Self::LEN, |w| self.write_to(w))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact("wifi details", data, Self::LEN)?)
    }
}

/// Render an address stored the way the device stores it (first octet in
/// the low byte) as dotted quad.
pub fn format_ipv4(addr: u32) -> String {
    let [a, b, c, d] = addr.to_le_bytes();
    format!("{a}.{b}.{c}.{d}")
}

/// One row of a scan result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WiFiNetwork {
    pub encryption_type: WiFiEncryptionType,
    pub ssid: String,
}

impl WiFiNetwork {
    pub const LEN: usize = 1 + SSID_MAX_LEN + 1;

    pub fn write_to(&self, w: &mut Writer<'_>) {
        w.write_u8(self.encryption_type.into());
        w.write_cstr(&self.ssid, SSID_MAX_LEN);
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            encryption_type: r.read_u8()?.into(),
            ssid: r.read_cstr(SSID_MAX_LEN + 1)?,
        })
    }
}

/// `count: u8` followed by `count` scan rows.
pub mod scan_result {
    use super::*;

    pub fn to_bytes(networks: &[WiFiNetwork]) -> Result<Vec<u8>, EncodeError> {
        let count = u8::try_from(networks.len()).map_err(|_| EncodeError::TooManyEntries {
            record: "wifi scan result",
            count: networks.len(),
            max: u8::MAX as usize,
        })?;
        Ok(encode_fixed(1 + networks.len() * WiFiNetwork::LEN, |w| {
            w.write_u8(count);
            for network in networks {
                network.write_to(w);
            }
        }))
    }

    /// Trailing bytes after `count` rows are ignored.
    pub fn read_from(r: &mut Reader<'_>) -> Result<Vec<WiFiNetwork>, DecodeError> {
        let count = r.read_u8()?;
        (0..count).map(|_| WiFiNetwork::read_from(r)).collect()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Vec<WiFiNetwork>, DecodeError> {
        read_from(&mut Reader::at_least("wifi scan result", data, 1)?)
    }
}

/// Credentials for joining a network. Which shape is on the wire is never
/// stored; it is derived from the encryption type.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum WiFiCredentials {
    Simple {
        password: String,
    },
    Enterprise {
        identity: String,
        username: String,
        password: String,
        phase2: WiFiPhaseTwoType,
    },
}

/// A request to join `ssid`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WiFiConnectionDetails {
    pub encryption_type: WiFiEncryptionType,
    pub ssid: String,
    pub credentials: WiFiCredentials,
}

impl WiFiConnectionDetails {
    pub const LEN: usize = 1 + SSID_MAX_LEN + 1 + CREDENTIALS_LEN;

    /// Open or pre-shared-key network.
    pub fn simple(
        encryption_type: WiFiEncryptionType,
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            encryption_type,
            ssid: ssid.into(),
            credentials: WiFiCredentials::Simple {
                password: password.into(),
            },
        }
    }

    /// The credential region is always `CREDENTIALS_LEN` bytes; the simple
    /// shape is zero padded.
    pub fn write_to(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let enterprise = self.encryption_type.is_enterprise();
        match (&self.credentials, enterprise) {
            (WiFiCredentials::Simple { password }, false) => {
                w.write_u8(self.encryption_type.into());
                w.write_cstr(&self.ssid, SSID_MAX_LEN);
                w.write_cstr(password, PASSWORD_MAX_LEN);
                w.write_zeros(CREDENTIALS_LEN - (PASSWORD_MAX_LEN + 1));
            }
            (
                WiFiCredentials::Enterprise {
                    identity,
                    username,
                    password,
                    phase2,
                },
                true,
            ) => {
                w.write_u8(self.encryption_type.into());
                w.write_cstr(&self.ssid, SSID_MAX_LEN);
                w.write_cstr(identity, EAP_IDENTITY_MAX_LEN);
                w.write_cstr(username, EAP_USERNAME_MAX_LEN);
                w.write_cstr(password, EAP_PASSWORD_MAX_LEN);
                w.write_u8(*phase2 as u8);
            }
            _ => {
                return Err(EncodeError::CredentialMismatch(self.encryption_type.into()));
            }
        }
        Ok(())
    }

    pub fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let encryption_type = WiFiEncryptionType::from(r.read_u8()?);
        let ssid = r.read_cstr(SSID_MAX_LEN + 1)?;
        let region = r.read_bytes(CREDENTIALS_LEN)?;
        let mut r = Reader::new("wifi credentials", region);

        let credentials = if encryption_type.is_enterprise() {
            let identity = r.read_cstr(EAP_IDENTITY_MAX_LEN + 1)?;
            let username = r.read_cstr(EAP_USERNAME_MAX_LEN + 1)?;
            let password = r.read_cstr(EAP_PASSWORD_MAX_LEN + 1)?;
            let raw = r.read_u8()?;
            let phase2 = WiFiPhaseTwoType::from_u8(raw).ok_or(DecodeError::Discriminant {
                record: "wifi phase 2 type",
                value: raw,
            })?;
            WiFiCredentials::Enterprise {
                identity,
                username,
                password,
                phase2,
            }
        } else {
            WiFiCredentials::Simple {
                password: r.read_cstr(PASSWORD_MAX_LEN + 1)?,
            }
        };

        Ok(Self {
            encryption_type,
            ssid,
            credentials,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![0u8; Self::LEN];
        self.write_to(&mut Writer::new(&mut buf))?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from(&mut Reader::exact(
            "wifi connection details",
            data,
            Self::LEN,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enterprise() -> WiFiConnectionDetails {
        WiFiConnectionDetails {
            encryption_type: WiFiEncryptionType::Wpa2Enterprise,
            ssid: "corp".into(),
            credentials: WiFiCredentials::Enterprise {
                identity: "anon@corp".into(),
                username: "jdoe".into(),
                password: "hunter2".into(),
                phase2: WiFiPhaseTwoType::Mschapv2,
            },
        }
    }

    #[test]
    fn simple_credentials_round_trip() {
        let details = WiFiConnectionDetails::simple(WiFiEncryptionType::Wpa2Psk, "home", "pass1234");
        let bytes = details.to_bytes().unwrap();
        assert_eq!(bytes.len(), WiFiConnectionDetails::LEN);
        assert_eq!(bytes[0], 3);
        assert_eq!(WiFiConnectionDetails::from_bytes(&bytes).unwrap(), details);
    }

    #[test]
    fn enterprise_credentials_round_trip() {
        let details = enterprise();
        let bytes = details.to_bytes().unwrap();
        assert_eq!(bytes.len(), WiFiConnectionDetails::LEN);
        assert_eq!(*bytes.last().unwrap(), WiFiPhaseTwoType::Mschapv2 as u8);
        assert_eq!(WiFiConnectionDetails::from_bytes(&bytes).unwrap(), details);
    }

    #[test]
    fn open_network_round_trip() {
        let details = WiFiConnectionDetails::simple(WiFiEncryptionType::Open, "cafe", "");
        let bytes = details.to_bytes().unwrap();
        assert_eq!(WiFiConnectionDetails::from_bytes(&bytes).unwrap(), details);
    }

    #[test]
    fn union_follows_encryption_type_only() {
        // A simple payload relabelled as enterprise decodes as enterprise:
        // the password lands in the identity slot.
        let mut bytes = WiFiConnectionDetails::simple(WiFiEncryptionType::Wpa2Psk, "net", "pw")
            .to_bytes()
            .unwrap();
        bytes[0] = WiFiEncryptionType::Wpa3Enterprise.into();
        let decoded = WiFiConnectionDetails::from_bytes(&bytes).unwrap();
        assert_eq!(
            decoded.credentials,
            WiFiCredentials::Enterprise {
                identity: "pw".into(),
                username: String::new(),
                password: String::new(),
                phase2: WiFiPhaseTwoType::Eap,
            }
        );

        // And the other way round.
        let mut bytes = enterprise().to_bytes().unwrap();
        bytes[0] = WiFiEncryptionType::Wpa2Psk.into();
        let decoded = WiFiConnectionDetails::from_bytes(&bytes).unwrap();
        assert_eq!(
            decoded.credentials,
            WiFiCredentials::Simple {
                password: "anon@corp".into()
            }
        );
    }

    #[test]
    fn mismatched_shape_is_rejected_before_encoding() {
        let mut details = enterprise();
        details.encryption_type = WiFiEncryptionType::Wpa2Psk;
        assert_eq!(details.to_bytes(), Err(EncodeError::CredentialMismatch(3)));
    }

    #[test]
    fn enterprise_predicate() {
        for raw in [5u8, 10, 14, 15] {
            assert!(WiFiEncryptionType::from(raw).is_enterprise(), "{raw}");
        }
        for raw in [0u8, 1, 3, 6, 9, 42] {
            assert!(!WiFiEncryptionType::from(raw).is_enterprise(), "{raw}");
        }
        assert_eq!(u8::from(WiFiEncryptionType::from(42)), 42);
    }

    #[test]
    fn wifi_details_decode() {
        let details = WiFiDetails {
            ssid: "home".into(),
            mac: MacAddress([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]),
            ip: u32::from_le_bytes([192, 168, 1, 42]),
            gateway: u32::from_le_bytes([192, 168, 1, 1]),
            subnet: u32::from_le_bytes([255, 255, 255, 0]),
            dns: u32::from_le_bytes([1, 1, 1, 1]),
        };
        let bytes = details.to_bytes();
        assert_eq!(bytes.len(), 55);
        assert_eq!(&bytes[33..39], &[0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]);
        let decoded = WiFiDetails::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, details);
        assert_eq!(format_ipv4(decoded.ip), "192.168.1.42");
        assert_eq!(decoded.mac.to_string(), "24:6F:28:AA:BB:CC");
    }

    #[test]
    fn scan_result_reads_exactly_count_rows() {
        let networks = vec![
            WiFiNetwork {
                encryption_type: WiFiEncryptionType::Open,
                ssid: "guest".into(),
            },
            WiFiNetwork {
                encryption_type: WiFiEncryptionType::Wpa2Enterprise,
                ssid: "corp".into(),
            },
        ];
        let mut bytes = scan_result::to_bytes(&networks).unwrap();
        assert_eq!(bytes.len(), 1 + 2 * 34);
        bytes.extend_from_slice(&[0xFF; 10]);
        assert_eq!(scan_result::from_bytes(&bytes).unwrap(), networks);
        assert!(scan_result::from_bytes(&bytes[..40]).is_err());
        assert_eq!(scan_result::from_bytes(&[0]).unwrap(), vec![]);
    }

    #[test]
    fn status_bytes() {
        assert_eq!(WiFiStatus::from_bytes(&[1]).unwrap(), WiFiStatus::Connected);
        assert!(WiFiStatus::from_bytes(&[7]).is_err());
        assert!(WiFiStatus::from_bytes(&[1, 1]).is_err());
        assert_eq!(
            WiFiScanStatus::from_bytes(&[3]).unwrap(),
            WiFiScanStatus::Failed
        );
    }
}

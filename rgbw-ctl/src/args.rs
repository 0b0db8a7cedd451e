//! Argument shapes shared by the BLE and WebSocket commands.

use clap::{Args, ValueEnum};
use rgbw_proto::color::perceptual_map;
use rgbw_proto::{
    AlexaIntegrationMode, AlexaIntegrationSettings, EspNowDevice, HttpCredentials, LightState,
    MacAddress, OutputState, WiFiConnectionDetails, WiFiCredentials, WiFiEncryptionType,
    WiFiPhaseTwoType,
};

#[derive(Args, Debug, Clone)]
pub struct ColorArgs {
    /// Red, green, blue and white levels, 0-255. Zero switches the channel off.
    #[arg(num_args = 4, value_names = ["R", "G", "B", "W"], required = true)]
    pub levels: Vec<u8>,
    /// Levels are slider positions; gamma-map them before sending
    #[arg(long)]
    pub linear: bool,
}

impl ColorArgs {
    pub fn output(&self) -> Result<OutputState, String> {
        let levels: [u8; 4] = self
            .levels
            .as_slice()
            .try_into()
            .map_err(|_| format!("expected 4 levels, got {}", self.levels.len()))?;
        Ok(OutputState::new(levels.map(|level| {
            let value = if self.linear {
                perceptual_map(f64::from(level))
            } else {
                level
            };
            LightState::new(level > 0, value)
        })))
    }
}

#[derive(Args, Debug, Clone)]
pub struct WifiArgs {
    pub ssid: String,
    #[arg(long, default_value = "")]
    pub password: String,
    /// Encryption type as the radio reports it (0 open, 3 WPA2-PSK, 5 WPA2-Enterprise, ...)
    #[arg(long, default_value_t = 3)]
    pub encryption: u8,
    /// EAP identity, enterprise networks only
    #[arg(long)]
    pub identity: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    /// EAP-TTLS phase 2 method (0 EAP, 1 MSCHAPv2, 2 MSCHAP, 3 PAP, 4 CHAP)
    #[arg(long, default_value_t = 0)]
    pub phase2: u8,
}

impl WifiArgs {
    pub fn details(&self) -> Result<WiFiConnectionDetails, String> {
        let encryption_type = WiFiEncryptionType::from(self.encryption);
        if !encryption_type.is_enterprise() {
            return Ok(WiFiConnectionDetails::simple(
                encryption_type,
                &self.ssid,
                &self.password,
            ));
        }
        let phase2 = WiFiPhaseTwoType::from_u8(self.phase2)
            .ok_or_else(|| format!("unknown phase 2 method {}", self.phase2))?;
        Ok(WiFiConnectionDetails {
            encryption_type,
            ssid: self.ssid.clone(),
            credentials: WiFiCredentials::Enterprise {
                identity: self.identity.clone().unwrap_or_default(),
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone(),
                phase2,
            },
        })
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum AlexaMode {
    Off,
    Rgbw,
    Rgb,
    Multi,
}

impl From<AlexaMode> for AlexaIntegrationMode {
    fn from(mode: AlexaMode) -> Self {
        match mode {
            AlexaMode::Off => AlexaIntegrationMode::Off,
            AlexaMode::Rgbw => AlexaIntegrationMode::RgbwDevice,
            AlexaMode::Rgb => AlexaIntegrationMode::RgbDevice,
            AlexaMode::Multi => AlexaIntegrationMode::MultiDevice,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AlexaArgs {
    #[arg(value_enum)]
    pub mode: AlexaMode,
    /// Device names for red, green, blue and white; single-device modes use the first
    #[arg(num_args = 0..=4)]
    pub names: Vec<String>,
}

impl AlexaArgs {
    pub fn settings(&self) -> AlexaIntegrationSettings {
        let name = |i: usize| self.names.get(i).cloned().unwrap_or_default();
        AlexaIntegrationSettings {
            mode: self.mode.into(),
            r_name: name(0),
            g_name: name(1),
            b_name: name(2),
            w_name: name(3),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct HttpCredentialsArgs {
    pub username: String,
    pub password: String,
}

impl HttpCredentialsArgs {
    pub fn credentials(&self) -> HttpCredentials {
        HttpCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn as_str(self) -> &'static str {
        match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        }
    }
}

/// `name=aa:bb:cc:dd:ee:ff`
pub fn parse_remote(s: &str) -> Result<EspNowDevice, String> {
    let (name, address) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=MAC, got {s:?}"))?;
    Ok(EspNowDevice {
        name: name.to_string(),
        address: parse_mac(address)?,
    })
}

pub fn parse_mac(s: &str) -> Result<MacAddress, String> {
    s.parse().map_err(|e: rgbw_proto::EncodeError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_levels_map_to_channels() {
        let args = ColorArgs {
            levels: vec![255, 0, 128, 0],
            linear: false,
        };
        let output = args.output().unwrap();
        assert_eq!(output.channels[0], LightState::new(true, 255));
        assert_eq!(output.channels[1], LightState::new(false, 0));
        assert_eq!(output.channels[2], LightState::new(true, 128));
    }

    #[test]
    fn linear_levels_are_gamma_mapped() {
        let args = ColorArgs {
            levels: vec![128, 0, 0, 255],
            linear: true,
        };
        let output = args.output().unwrap();
        assert_eq!(output.channels[0], LightState::new(true, 56));
        assert_eq!(output.channels[3], LightState::new(true, 255));
    }

    #[test]
    fn wifi_shape_follows_encryption() {
        let mut args = WifiArgs {
            ssid: "home".to_string(),
            password: "hunter22".to_string(),
            encryption: 3,
            identity: None,
            username: None,
            phase2: 0,
        };
        let details = args.details().unwrap();
        assert!(matches!(details.credentials, WiFiCredentials::Simple { .. }));

        args.encryption = 5;
        args.identity = Some("anon".to_string());
        args.phase2 = 1;
        let details = args.details().unwrap();
        assert_eq!(
            details.credentials,
            WiFiCredentials::Enterprise {
                identity: "anon".to_string(),
                username: String::new(),
                password: "hunter22".to_string(),
                phase2: WiFiPhaseTwoType::Mschapv2,
            }
        );

        args.phase2 = 9;
        assert!(args.details().is_err());
    }

    #[test]
    fn remotes_parse_name_and_mac() {
        let remote = parse_remote("hall=a1:b2:c3:d4:e5:f6").unwrap();
        assert_eq!(remote.name, "hall");
        assert_eq!(remote.address.0, [0xa1, 0xb2, 0xc3, 0xd4, 0xe5, 0xf6]);
        assert!(parse_remote("hall").is_err());
        assert!(parse_remote("hall=a1:b2").is_err());
    }

    #[test]
    fn alexa_names_fill_in_order() {
        let args = AlexaArgs {
            mode: AlexaMode::Rgb,
            names: vec!["desk".to_string()],
        };
        let settings = args.settings();
        assert_eq!(settings.mode, AlexaIntegrationMode::RgbDevice);
        assert_eq!(settings.r_name, "desk");
        assert_eq!(settings.w_name, "");
    }
}

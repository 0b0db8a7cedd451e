//! Client settings, stored as `$RGBW_HOME/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rgbw_link::{LinkConfig, Redial};
use rgbw_proto::ProtocolLimits;
use rgbw_proto::ble::GattLayout;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no device host; pass --host or set \"host\" in the config")]
    NoHost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Device address for the WebSocket and HTTP transports.
    pub host: Option<String>,
    pub ws_path: String,
    pub liveness_timeout_ms: u64,
    pub redial: Redial,
    pub esp_now_max_devices: u8,
    pub ble_name_prefix: String,
    pub scan_secs: u64,
    /// Characteristic map for firmware that does not use the stock layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gatt: Option<GattLayout>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            ws_path: "/ws".to_string(),
            liveness_timeout_ms: 1500,
            redial: Redial::default(),
            esp_now_max_devices: ProtocolLimits::default().esp_now_max_devices,
            ble_name_prefix: "rgbw-ctrl".to_string(),
            scan_secs: 5,
            gatt: None,
        }
    }
}

/// `$RGBW_HOME`, or `~/.rgbw-ctl`.
pub fn home() -> PathBuf {
    match std::env::var_os("RGBW_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rgbw-ctl"),
    }
}

impl ClientConfig {
    /// Missing file means defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn limits(&self) -> ProtocolLimits {
        ProtocolLimits {
            esp_now_max_devices: self.esp_now_max_devices,
        }
    }

    pub fn layout(&self) -> GattLayout {
        self.gatt.clone().unwrap_or_default()
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn host(&self) -> Result<&str, ConfigError> {
        self.host.as_deref().ok_or(ConfigError::NoHost)
    }

    pub fn link_config(&self) -> Result<LinkConfig, ConfigError> {
        let mut config = LinkConfig::for_host(self.host()?, &self.ws_path);
        config.liveness_timeout = Duration::from_millis(self.liveness_timeout_ms);
        config.redial = self.redial;
        Ok(config)
    }
}

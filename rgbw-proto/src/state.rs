//! Live view of the device, one value per field.

use crate::message::Message;
use crate::model::{
    AlexaIntegrationSettings, BleStatus, EspNowDevice, HttpCredentials, MacAddress, OtaState,
    OutputState,
};
use crate::wifi::{WiFiConnectionDetails, WiFiDetails, WiFiNetwork, WiFiScanStatus, WiFiStatus};

/// Everything the client currently knows about the device.
///
/// Fields backed by an optional service are `None` until the device reports
/// them. Each update replaces the field whole; nothing is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeviceState {
    pub device_name: Option<String>,
    pub firmware_version: Option<String>,
    pub free_heap: Option<u32>,
    pub output: Option<OutputState>,
    pub http_credentials: Option<HttpCredentials>,
    pub ble_status: BleStatus,
    pub wifi_status: WiFiStatus,
    pub wifi_scan_status: WiFiScanStatus,
    pub wifi_scan_result: Vec<WiFiNetwork>,
    pub wifi_details: Option<WiFiDetails>,
    pub wifi_connection_details: Option<WiFiConnectionDetails>,
    pub ota: Option<OtaState>,
    pub alexa: Option<AlexaIntegrationSettings>,
    pub esp_now_devices: Option<Vec<EspNowDevice>>,
    pub esp_now_controller: Option<MacAddress>,
}

impl DeviceState {
    pub fn apply(&mut self, message: Message) {
        match message {
            Message::Heap(free) => self.free_heap = Some(free),
            Message::DeviceName(name) => self.device_name = Some(name),
            Message::FirmwareVersion(version) => self.firmware_version = Some(version),
            Message::Color(output) => self.output = Some(output),
            Message::HttpCredentials(credentials) => self.http_credentials = Some(credentials),
            Message::BleStatus(status) => self.ble_status = status,
            Message::WiFiStatus(status) => self.wifi_status = status,
            Message::WiFiScanStatus(status) => self.wifi_scan_status = status,
            Message::WiFiScanResult(networks) => self.wifi_scan_result = networks,
            Message::WiFiDetails(details) => self.wifi_details = Some(details),
            Message::WiFiConnectionDetails(details) => {
                self.wifi_connection_details = Some(details)
            }
            Message::OtaProgress(ota) => self.ota = Some(ota),
            Message::AlexaIntegrationSettings(alexa) => self.alexa = Some(alexa),
            Message::EspNowDevices(devices) => self.esp_now_devices = Some(devices),
            Message::EspNowController(address) => self.esp_now_controller = Some(address),
        }
    }

    /// Forget everything, as after a disconnect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//! btleplug backend: adapter lookup, scanning, and a [`GattLink`] over a
//! platform peripheral.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use rgbw_proto::ble::GattPath;

use crate::link::{Discovered, GattLink, LinkEvent, LinkEvents};
use crate::BleError;

/// A device seen during a scan.
#[derive(Debug, Clone)]
pub struct FoundDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_rgbw: bool,
}

/// Advertised names look like `rgbw-ctrl-1a2b`, or `nimble [rgbw-ctrl-1a2b]`
/// on some hosts.
fn matches_prefix(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) || name.contains(&format!("[{prefix}"))
}

pub async fn get_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

/// Scan for `duration` and list every named peripheral.
pub async fn scan(duration: Duration, name_prefix: &str) -> Result<Vec<FoundDevice>, BleError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let is_rgbw = matches_prefix(&name, name_prefix);
            devices.push(FoundDevice {
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                name,
                is_rgbw,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a peripheral whose name or address contains `target`, or the first
/// one advertising `name_prefix`.
pub async fn find_device(
    target: Option<&str>,
    name_prefix: &str,
    duration: Duration,
) -> Result<(Adapter, Peripheral), BleError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => matches_prefix(&name, name_prefix),
            };

            if matches {
                log::info!("found {name} ({addr})");
                adapter.stop_scan().await?;
                return Ok((adapter, peripheral));
            }
        }
    }

    adapter.stop_scan().await?;
    Err(BleError::DeviceNotFound(
        target.unwrap_or(name_prefix).to_string(),
    ))
}

/// [`GattLink`] over a btleplug peripheral.
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Peripheral,
    characteristics: Mutex<HashMap<GattPathKey, Characteristic>>,
}

type GattPathKey = (uuid::Uuid, uuid::Uuid);

impl BtleLink {
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
            characteristics: Mutex::new(HashMap::new()),
        }
    }

    pub async fn find(
        target: Option<&str>,
        name_prefix: &str,
        duration: Duration,
    ) -> Result<Self, BleError> {
        let (adapter, peripheral) = find_device(target, name_prefix, duration).await?;
        Ok(Self::new(adapter, peripheral))
    }

    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    fn characteristic(&self, path: GattPath) -> Result<Characteristic, BleError> {
        let characteristics = self
            .characteristics
            .lock()
            .map_err(|_| BleError::Gatt("characteristic table poisoned".into()))?;
        characteristics
            .get(&(path.service, path.characteristic))
            .cloned()
            .ok_or(BleError::UnknownCharacteristic(path.characteristic))
    }
}

impl GattLink for BtleLink {
    async fn connect(&self) -> Result<(), BleError> {
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<Discovered>, BleError> {
        self.peripheral.discover_services().await?;

        let found = self.peripheral.characteristics();
        let discovered = found
            .iter()
            .map(|c| Discovered {
                path: GattPath {
                    service: c.service_uuid,
                    characteristic: c.uuid,
                },
                notify: c.properties.contains(CharPropFlags::NOTIFY),
            })
            .collect();

        let mut table = self
            .characteristics
            .lock()
            .map_err(|_| BleError::Gatt("characteristic table poisoned".into()))?;
        table.clear();
        table.extend(found.into_iter().map(|c| ((c.service_uuid, c.uuid), c)));
        Ok(discovered)
    }

    async fn read(&self, path: GattPath) -> Result<Vec<u8>, BleError> {
        let characteristic = self.characteristic(path)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write(&self, path: GattPath, value: &[u8]) -> Result<(), BleError> {
        let characteristic = self.characteristic(path)?;
        self.peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, path: GattPath) -> Result<(), BleError> {
        let characteristic = self.characteristic(path)?;
        self.peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn events(&self) -> Result<LinkEvents, BleError> {
        let notifications = self.peripheral.notifications().await?.map(|n| {
            LinkEvent::Notification {
                characteristic: n.uuid,
                value: n.value,
            }
        });

        let id = self.peripheral.id();
        let lost = self.adapter.events().await?.filter_map(move |event| {
            let lost = matches!(&event, CentralEvent::DeviceDisconnected(d) if *d == id);
            futures::future::ready(lost.then_some(LinkEvent::Disconnected))
        });

        Ok(Box::pin(futures::stream::select(notifications, lost)))
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        if let Ok(mut table) = self.characteristics.lock() {
            table.clear();
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

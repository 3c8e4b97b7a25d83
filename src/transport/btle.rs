//! `btleplug` implementation of the transport traits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Characteristic, DEVICE_NAME_PREFIX, Link, NotificationHandler, Transport};
use crate::error::{Error, Result};

/// Host Bluetooth adapter plus the locks seen during the last scan.
pub struct BtleTransport {
    adapter: Adapter,
    devices: Mutex<HashMap<String, Peripheral>>,
}

impl BtleTransport {
    /// Open the adapter at `adapter_index`.
    pub async fn new(adapter_index: usize) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let count = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(adapter_index)
            .ok_or_else(|| Error::transport(format!("Bluetooth adapter {adapter_index} not found ({count} available)")))?;

        Ok(Self {
            adapter,
            devices: Mutex::new(HashMap::new()),
        })
    }

    /// Remember `peripheral` if it advertises a keyturner name. Returns its address.
    async fn record(&self, peripheral: Peripheral) -> Result<Option<String>> {
        let Some(props) = peripheral.properties().await? else {
            return Ok(None);
        };
        let name = props.local_name.unwrap_or_default();
        if !name.starts_with(DEVICE_NAME_PREFIX) {
            return Ok(None);
        }

        let address = peripheral.address().to_string();
        let mut devices = self.devices.lock().map_err(|_| Error::transport("device table poisoned"))?;
        if !devices.contains_key(&address) {
            info!("Found new device {} ({}), rssi {:?}", address, name, props.rssi);
        }
        devices.insert(address.clone(), peripheral);
        Ok(Some(address))
    }

    /// Consume scan events until `device_id` shows up. `false` when the event stream ends first.
    async fn wait_for(
        &self,
        events: &mut (impl futures::Stream<Item = CentralEvent> + Unpin + Send),
        device_id: &str,
    ) -> Result<bool> {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) = event {
                let peripheral = self.adapter.peripheral(&id).await?;
                if let Some(address) = self.record(peripheral).await? {
                    if address.eq_ignore_ascii_case(device_id) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Addresses of all locks seen so far.
    pub fn devices(&self) -> Vec<String> {
        self.devices
            .lock()
            .map(|devices| devices.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lookup(&self, device_id: &str) -> Result<Option<Peripheral>> {
        let devices = self.devices.lock().map_err(|_| Error::transport("device table poisoned"))?;
        Ok(devices
            .iter()
            .find(|(address, _)| address.eq_ignore_ascii_case(device_id))
            .map(|(_, peripheral)| peripheral.clone()))
    }
}

impl Transport for BtleTransport {
    type Link = BtleLink;

    async fn scan_for_device(&self, device_id: &str, timeout: Duration) -> Result<()> {
        info!("Scanning for devices...");
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        // Peripherals cached by the OS from earlier scans do not always raise an event
        for peripheral in self.adapter.peripherals().await? {
            self.record(peripheral).await?;
        }

        let found = self.lookup(device_id)?.is_some()
            || tokio::time::timeout(timeout, self.wait_for(&mut events, device_id))
                .await
                .unwrap_or(Ok(false))?;

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        if found {
            Ok(())
        } else {
            Err(Error::DeviceNotFound(device_id.to_string()))
        }
    }

    async fn connect(&self, device_id: &str) -> Result<BtleLink> {
        let peripheral = self
            .lookup(device_id)?
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;

        info!("Connecting to {}", device_id);
        if let Err(e) = peripheral.connect().await {
            error!("Connection to {} failed: {}", device_id, e);
            return Err(e.into());
        }
        peripheral.discover_services().await?;

        Ok(BtleLink { peripheral })
    }
}

/// Connected peripheral.
pub struct BtleLink {
    peripheral: Peripheral,
}

impl Link for BtleLink {
    type Characteristic = BtleCharacteristic;

    async fn discover(&self, service: Uuid, characteristic: Uuid) -> Result<BtleCharacteristic> {
        let found = self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|c| c.uuid == characteristic)
            .ok_or(Error::CharacteristicNotFound(characteristic))?;

        debug!("Discovered characteristic {}", found.uuid);
        Ok(BtleCharacteristic {
            peripheral: self.peripheral.clone(),
            characteristic: found,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting...");
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// One GATT characteristic on a connected peripheral.
pub struct BtleCharacteristic {
    peripheral: Peripheral,
    characteristic: GattCharacteristic,
}

impl Characteristic for BtleCharacteristic {
    async fn write(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| {
                error!("Write to {} failed: {}", self.characteristic.uuid, e);
                Error::from(e)
            })
    }

    async fn enable_notifications(&self, handler: NotificationHandler) -> Result<()> {
        self.peripheral.subscribe(&self.characteristic).await?;
        let mut notifications = self.peripheral.notifications().await?;
        let uuid = self.characteristic.uuid;

        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    handler(Ok(notification.value));
                }
            }
            debug!("Notification stream for {} ended", uuid);
            handler(Err(Error::Disconnected));
        });
        Ok(())
    }
}

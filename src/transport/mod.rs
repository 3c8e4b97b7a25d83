//! Bluetooth transport boundary.
//!
//! The protocol core only needs scan, connect, characteristic discovery, write
//! and notifications. [`btle`] implements this over `btleplug`; tests use an
//! in-memory lock.

mod btle;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::Result;

pub use btle::{BtleCharacteristic, BtleLink, BtleTransport};

/// Pairing service.
pub const PAIRING_SERVICE: Uuid = Uuid::from_u128(0xa92ee100_5501_11e4_916c_0800200c9a66);
/// Pairing service as advertised by Ultra locks.
pub const PAIRING_SERVICE_ULTRA: Uuid = Uuid::from_u128(0xa92ee300_5501_11e4_916c_0800200c9a66);
/// General data input/output on the pairing service.
pub const PAIRING_GDIO: Uuid = Uuid::from_u128(0xa92ee101_5501_11e4_916c_0800200c9a66);
/// Keyturner service.
pub const KEYTURNER_SERVICE: Uuid = Uuid::from_u128(0xa92ee200_5501_11e4_916c_0800200c9a66);
/// General data input/output on the keyturner service.
pub const KEYTURNER_GDIO: Uuid = Uuid::from_u128(0xa92ee201_5501_11e4_916c_0800200c9a66);
/// User-specific (encrypted) data input/output.
pub const KEYTURNER_USDIO: Uuid = Uuid::from_u128(0xa92ee202_5501_11e4_916c_0800200c9a66);

/// Advertised local name prefix of keyturner locks.
pub const DEVICE_NAME_PREFIX: &str = "Nuki";

/// Receives every notification, or the error that ended the notification stream.
pub type NotificationHandler = Arc<dyn Fn(Result<Vec<u8>>) + Send + Sync>;

/// Entry point: find and connect to a lock.
pub trait Transport {
    type Link: Link;

    /// Scan until `device_id` (BLE address) is seen or `timeout` expires.
    fn scan_for_device(&self, device_id: &str, timeout: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Connect to a previously scanned device.
    fn connect(&self, device_id: &str) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// A connected device.
pub trait Link {
    type Characteristic: Characteristic + 'static;

    /// Look up one characteristic inside a service.
    fn discover(&self, service: Uuid, characteristic: Uuid)
    -> impl Future<Output = Result<Self::Characteristic>> + Send;

    /// Discover the pairing GDIO, falling back to the Ultra pairing service.
    fn discover_pairing(&self) -> impl Future<Output = Result<Self::Characteristic>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.discover(PAIRING_SERVICE, PAIRING_GDIO).await {
                Ok(characteristic) => Ok(characteristic),
                Err(e) => {
                    tracing::debug!("Pairing service not found ({e}), trying Ultra pairing service");
                    self.discover(PAIRING_SERVICE_ULTRA, PAIRING_GDIO).await
                }
            }
        }
    }

    /// Discover the encrypted user-specific channel.
    fn discover_usdio(&self) -> impl Future<Output = Result<Self::Characteristic>> + Send {
        self.discover(KEYTURNER_SERVICE, KEYTURNER_USDIO)
    }

    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A writable, notifying GATT characteristic.
pub trait Characteristic: Send + Sync {
    /// Write one frame.
    fn write(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Route notifications to `handler` until the link closes.
    fn enable_notifications(&self, handler: NotificationHandler) -> impl Future<Output = Result<()>> + Send;
}

//! Shared data structures for the Bluetooth module.

use bluest::{Characteristic, Device};
use uuid::Uuid;

/// Addresses a GATT characteristic by its (service, characteristic) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicAddress {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicAddress {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

/// Represents a discovered BTR2 reader.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredDevice {
    /// Platform-specific unique identifier for the device (especially important on macOS)
    pub id: String,
    /// The name of the device, if available
    pub name: String,
    /// The address of the device (MAC address on most platforms, may be 00:00:00:00:00:00 on macOS)
    pub address: String,
    /// The signal strength (RSSI) of the device
    pub rssi: Option<i16>,
}

/// The resolved protocol characteristics of a connected reader.
///
/// All five transfer characteristics are mandatory; the informational ones
/// are kept when the device exposes them.
#[derive(Clone)]
pub struct Btr2Characteristics {
    pub read_control_point: Characteristic,
    pub read_object: Characteristic,
    pub write_control_point: Characteristic,
    pub write_object: Characteristic,
    pub bonding: Characteristic,
    pub battery_level: Option<Characteristic>,
    pub manufacturer_name: Option<Characteristic>,
}

/// State held for a successfully connected reader.
///
/// This struct holds the active handles needed for interaction; the session
/// owns exactly one of these at a time.
#[derive(Clone)]
pub struct ConnectedDeviceState {
    /// The device handle, used for connection status checks and disconnects.
    pub device: Device,
    /// The resolved protocol characteristics.
    pub characteristics: Btr2Characteristics,
}

impl ConnectedDeviceState {
    /// Reads the battery level if the device exposes the battery service.
    pub async fn battery_level(&self) -> Option<u8> {
        let characteristic = self.characteristics.battery_level.as_ref()?;
        match characteristic.read().await {
            Ok(value) => value.first().copied(),
            Err(_) => None,
        }
    }

    /// Reads the manufacturer name if the device exposes it.
    pub async fn manufacturer_name(&self) -> Option<String> {
        let characteristic = self.characteristics.manufacturer_name.as_ref()?;
        match characteristic.read().await {
            Ok(value) => Some(String::from_utf8_lossy(&value).into_owned()),
            Err(_) => None,
        }
    }
}

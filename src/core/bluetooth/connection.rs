//! Connection establishment for BTR2 readers.
//!
//! Connecting means transport connect, full service discovery and an
//! opportunistic bonding probe. Discovery must resolve all five protocol
//! characteristics or the attempt fails; the bonding probe's outcome is
//! ignored because pairing mode is not always active on the reader. After
//! the probe, the connect sequence runs exactly once more with bonding
//! skipped.

use std::time::Duration;

use bluest::{Adapter, Characteristic, Device, Service};
use log::{debug, info};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::core::bluetooth::constants::{
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_BONDING, UUID_BTR2_SERVICE,
    UUID_DEVICE_INFORMATION_SERVICE, UUID_MANUFACTURER_NAME, UUID_READ_CONTROL_POINT,
    UUID_READ_OBJECT, UUID_WRITE_CONTROL_POINT, UUID_WRITE_OBJECT,
};
use crate::core::bluetooth::types::{Btr2Characteristics, ConnectedDeviceState};
use crate::error::Btr2Error;

/// Connection manager for BTR2 readers.
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    discovery_settle: Duration,
    bond_settle: Duration,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, config: &BridgeConfig) -> Self {
        Self {
            adapter,
            discovery_settle: Duration::from_millis(config.discovery_settle_ms),
            bond_settle: Duration::from_millis(config.bond_settle_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Connects to a reader.
    ///
    /// Two explicit steps: the first attempt probes the bonding
    /// characteristic, the second skips bonding. Never an unbounded retry.
    pub async fn connect(&self, device: &Device) -> Result<ConnectedDeviceState, Btr2Error> {
        let first = self.establish(device).await?;
        self.probe_bond(&first).await;
        sleep(self.bond_settle).await;

        let state = self.establish(device).await?;
        info!(
            "connected to {} ({})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            device.id()
        );
        Ok(state)
    }

    /// One transport connect plus full discovery of the protocol surface.
    async fn establish(&self, device: &Device) -> Result<ConnectedDeviceState, Btr2Error> {
        if !device.is_connected().await {
            info!("initiating connection to {}", device.id());
            match timeout(self.connect_timeout, self.adapter.connect_device(device)).await {
                Ok(result) => result?,
                Err(_) => return Err(Btr2Error::ConnectTimeout),
            }
        }
        sleep(self.discovery_settle).await;

        debug!("connection established, discovering services");
        let services = device.services().await?;
        let btr2_service = services
            .iter()
            .find(|s| s.uuid() == UUID_BTR2_SERVICE)
            .ok_or(Btr2Error::Discovery(UUID_BTR2_SERVICE))?;

        let protocol_chars = btr2_service.characteristics().await?;
        let characteristics = Btr2Characteristics {
            read_control_point: require(&protocol_chars, UUID_READ_CONTROL_POINT)?,
            read_object: require(&protocol_chars, UUID_READ_OBJECT)?,
            write_control_point: require(&protocol_chars, UUID_WRITE_CONTROL_POINT)?,
            write_object: require(&protocol_chars, UUID_WRITE_OBJECT)?,
            bonding: require(&protocol_chars, UUID_BONDING)?,
            battery_level: optional(&services, UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL).await,
            manufacturer_name: optional(
                &services,
                UUID_DEVICE_INFORMATION_SERVICE,
                UUID_MANUFACTURER_NAME,
            )
            .await,
        };

        Ok(ConnectedDeviceState {
            device: device.clone(),
            characteristics,
        })
    }

    /// Reads the bonding characteristic to trigger pairing. Failures are
    /// swallowed; pairing mode is not always active.
    async fn probe_bond(&self, state: &ConnectedDeviceState) {
        debug!("probing bonding characteristic");
        if let Err(e) = state.characteristics.bonding.read().await {
            debug!("bonding probe failed (ignored): {e}");
        }
    }

    /// Disconnects from a reader.
    pub async fn disconnect(&self, device: &Device) -> Result<(), Btr2Error> {
        if device.is_connected().await {
            info!("disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await?;
            info!("disconnected");
        } else {
            debug!("device {} not connected", device.id());
        }
        Ok(())
    }
}

fn require(characteristics: &[Characteristic], uuid: Uuid) -> Result<Characteristic, Btr2Error> {
    characteristics
        .iter()
        .find(|c| c.uuid() == uuid)
        .cloned()
        .ok_or(Btr2Error::Discovery(uuid))
}

async fn optional(
    services: &[Service],
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Option<Characteristic> {
    let service = services.iter().find(|s| s.uuid() == service_uuid)?;
    let characteristics = service.characteristics().await.ok()?;
    characteristics
        .into_iter()
        .find(|c| c.uuid() == characteristic_uuid)
}

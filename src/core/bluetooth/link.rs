//! The characteristic-level link the transfer protocol runs on.
//!
//! The protocol only ever needs two primitives: read a characteristic and
//! write a characteristic with response. Putting them behind a trait keeps
//! the transfer logic independent of the Bluetooth backend.

use async_trait::async_trait;
use bluest::Characteristic;

use crate::core::bluetooth::constants::{
    BONDING_PROBE, READ_CONTROL_POINT, READ_OBJECT, WRITE_CONTROL_POINT, WRITE_OBJECT,
};
use crate::core::bluetooth::types::{Btr2Characteristics, CharacteristicAddress};
use crate::error::Btr2Error;

/// Serialized access to a connected device's characteristics.
///
/// The reader's GATT server cannot service concurrent operations, so callers
/// must await each operation before issuing the next; implementations do not
/// queue.
#[async_trait]
pub trait Btr2Link: Send + Sync {
    /// Reads the characteristic at `address`.
    async fn read_characteristic(
        &self,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, Btr2Error>;

    /// Writes `payload` to the characteristic at `address`, with response.
    async fn write_characteristic(
        &self,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> Result<(), Btr2Error>;
}

/// `Btr2Link` over resolved bluest characteristic handles.
#[derive(Clone)]
pub struct BluestLink {
    characteristics: Btr2Characteristics,
}

impl BluestLink {
    pub fn new(characteristics: Btr2Characteristics) -> Self {
        Self { characteristics }
    }

    fn resolve(&self, address: CharacteristicAddress) -> Result<&Characteristic, Btr2Error> {
        let c = &self.characteristics;
        let resolved = match address {
            a if a == READ_CONTROL_POINT => &c.read_control_point,
            a if a == READ_OBJECT => &c.read_object,
            a if a == WRITE_CONTROL_POINT => &c.write_control_point,
            a if a == WRITE_OBJECT => &c.write_object,
            a if a == BONDING_PROBE => &c.bonding,
            _ => return Err(Btr2Error::Discovery(address.characteristic)),
        };
        Ok(resolved)
    }
}

#[async_trait]
impl Btr2Link for BluestLink {
    async fn read_characteristic(
        &self,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, Btr2Error> {
        let characteristic = self.resolve(address)?;
        characteristic.read().await.map_err(classify)
    }

    async fn write_characteristic(
        &self,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> Result<(), Btr2Error> {
        let characteristic = self.resolve(address)?;
        characteristic.write(payload).await.map_err(classify)
    }
}

/// Maps transport errors; a lost link is surfaced as its own variant so the
/// read loop can tell it apart from recoverable protocol failures.
fn classify(err: bluest::Error) -> Btr2Error {
    if matches!(err.kind(), bluest::error::ErrorKind::NotConnected) {
        Btr2Error::Disconnect
    } else {
        Btr2Error::Transport(err)
    }
}

//! Scripted in-memory link for protocol tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::bluetooth::link::Btr2Link;
use crate::core::bluetooth::types::CharacteristicAddress;
use crate::core::crc;
use crate::core::frame::{ETX, STX};
use crate::error::Btr2Error;

/// Wraps an ASCII payload in STX/ETX markers with its CRC field.
pub(crate) fn frame_bytes(payload: &str) -> Vec<u8> {
    let mut raw = vec![STX];
    raw.extend_from_slice(payload.as_bytes());
    raw.extend_from_slice(crc::checksum_hex(payload.as_bytes()).as_bytes());
    raw.push(ETX);
    raw
}

/// Link whose reads replay scripted values per characteristic.
///
/// A read past the end of a script behaves as a lost link, which lets tests
/// end a read loop deterministically. Writes are recorded in arrival order;
/// with `fail_writes_from(n)` every write from the n-th onward fails as a
/// lost link.
pub(crate) struct ScriptedLink {
    reads: Mutex<HashMap<CharacteristicAddress, VecDeque<Vec<u8>>>>,
    writes: Mutex<Vec<(CharacteristicAddress, Vec<u8>)>>,
    fail_writes_from: Option<usize>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self {
            reads: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            fail_writes_from: None,
        }
    }

    pub fn fail_writes_from(mut self, index: usize) -> Self {
        self.fail_writes_from = Some(index);
        self
    }

    pub fn push_read(&self, address: CharacteristicAddress, value: Vec<u8>) {
        self.reads
            .lock()
            .unwrap()
            .entry(address)
            .or_default()
            .push_back(value);
    }

    /// Values written to `address`, in order.
    pub fn writes_to(&self, address: CharacteristicAddress) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Addresses of all writes, in arrival order.
    pub fn write_addresses(&self) -> Vec<CharacteristicAddress> {
        self.writes.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }
}

#[async_trait]
impl Btr2Link for ScriptedLink {
    async fn read_characteristic(
        &self,
        address: CharacteristicAddress,
    ) -> Result<Vec<u8>, Btr2Error> {
        self.reads
            .lock()
            .unwrap()
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
            .ok_or(Btr2Error::Disconnect)
    }

    async fn write_characteristic(
        &self,
        address: CharacteristicAddress,
        payload: &[u8],
    ) -> Result<(), Btr2Error> {
        let mut writes = self.writes.lock().unwrap();
        if let Some(from) = self.fail_writes_from {
            if writes.len() >= from {
                return Err(Btr2Error::Disconnect);
            }
        }
        writes.push((address, payload.to_vec()));
        Ok(())
    }
}

//! Constants for the BTR2 GATT surface and protocol tuning.
//!
//! The reader exposes its transfer protocol through a custom service with
//! four transfer characteristics (a control point and an object
//! characteristic for each direction) plus a bonding probe characteristic.

use uuid::Uuid;

use crate::core::bluetooth::types::CharacteristicAddress;

/// Advertised name prefix that identifies a BTR2 reader.
pub const DEVICE_NAME_PREFIX: &str = "MOBA";

/// Standard Bluetooth Service UUIDs
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// The UUID of the BTR2 transfer service
pub const UUID_BTR2_SERVICE: Uuid = Uuid::from_u128(0x0000ff30_0000_1000_8000_00805f9b34fb);

/// Control point read by the client to learn the pending transfer length,
/// and written to steer the device's read pointer.
pub const UUID_READ_CONTROL_POINT: Uuid = Uuid::from_u128(0x0000ff32_0000_1000_8000_00805f9b34fb);

/// Object characteristic carrying inbound payload chunks.
pub const UUID_READ_OBJECT: Uuid = Uuid::from_u128(0x0000ff34_0000_1000_8000_00805f9b34fb);

/// Control point written before each outbound chunk.
pub const UUID_WRITE_CONTROL_POINT: Uuid = Uuid::from_u128(0x0000ff36_0000_1000_8000_00805f9b34fb);

/// Object characteristic carrying outbound payload chunks.
pub const UUID_WRITE_OBJECT: Uuid = Uuid::from_u128(0x0000ff38_0000_1000_8000_00805f9b34fb);

/// Read-only characteristic whose readability implies an established bond.
pub const UUID_BONDING: Uuid = Uuid::from_u128(0x0000ff3a_0000_1000_8000_00805f9b34fb);

/// The five protocol characteristic addresses. All of them must resolve
/// during discovery before any communication proceeds.
pub const READ_CONTROL_POINT: CharacteristicAddress =
    CharacteristicAddress::new(UUID_BTR2_SERVICE, UUID_READ_CONTROL_POINT);
pub const READ_OBJECT: CharacteristicAddress =
    CharacteristicAddress::new(UUID_BTR2_SERVICE, UUID_READ_OBJECT);
pub const WRITE_CONTROL_POINT: CharacteristicAddress =
    CharacteristicAddress::new(UUID_BTR2_SERVICE, UUID_WRITE_CONTROL_POINT);
pub const WRITE_OBJECT: CharacteristicAddress =
    CharacteristicAddress::new(UUID_BTR2_SERVICE, UUID_WRITE_OBJECT);
pub const BONDING_PROBE: CharacteristicAddress =
    CharacteristicAddress::new(UUID_BTR2_SERVICE, UUID_BONDING);

/// Outbound chunk size in bytes; the link accepts no more per object write.
pub const ACK_CHUNK_SIZE: usize = 20;

/// MAC placeholder written into acknowledgment frames. The device does not
/// validate it.
pub const LOCAL_MAC_PLACEHOLDER: &str = "123456789ABC";

/// Delay between scheduled read cycles in milliseconds.
pub const READ_WAIT_DELAY_MS: u64 = 500;

/// Settle time between transport connect and service discovery in milliseconds.
pub const DISCOVER_SERVICES_DELAY_MS: u64 = 1000;

/// Settle time after the opportunistic bonding probe in milliseconds.
pub const BOND_SETTLE_DELAY_MS: u64 = 500;

/// Timeout for one transport connect attempt in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Consecutive non-advancing read rounds tolerated before a transfer is
/// abandoned as stalled.
pub const STALL_GUARD_ROUNDS: u32 = 3;

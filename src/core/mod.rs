//! Core functionality for the BTR2 bridge
//! This module contains the wire codec and transfer protocol for talking to
//! BTR2 transponder readers.

pub mod bluetooth;
pub mod crc;
pub mod frame;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use frame::InboundFrame;
pub use transfer::TransferOptions;

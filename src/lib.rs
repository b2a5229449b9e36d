//! BTR2 Bridge library
//! This is the main library for talking to MOBA BTR2 transponder readers
//! over Bluetooth Low Energy.

// Module declarations
pub mod config;
pub mod core;
pub mod error;

// Re-export the public surface
pub use config::BridgeConfig;
pub use core::bluetooth::{Btr2Session, DiscoveredDevice, SessionSnapshot, SessionState};
pub use core::frame::InboundFrame;
pub use error::Btr2Error;

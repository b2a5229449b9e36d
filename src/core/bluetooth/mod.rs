//! Bluetooth layer: scanning, connection establishment and the session
//! state machine for BTR2 readers.

pub mod connection;
pub mod constants;
pub mod link;
pub mod scanner;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use link::{BluestLink, Btr2Link};
pub use session::{Btr2Session, SessionSnapshot, SessionState};
pub use types::{ConnectedDeviceState, DiscoveredDevice};

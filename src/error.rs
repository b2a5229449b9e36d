//! Error types for the BTR2 wire protocol and device session.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the frame codec, the chunked transfer protocol and the
/// connection layer.
#[derive(Debug, Error)]
pub enum Btr2Error {
    /// The raw buffer is missing its STX/ETX marker or is too short to carry
    /// a CRC field.
    #[error("frame is missing its start or end marker")]
    Framing,

    /// A field required by the frame schema is absent.
    #[error("frame field {index} is missing")]
    Schema { index: usize },

    /// The chip identifier field is not valid hex of even length.
    #[error("chip identifier field is not valid hex: {field:?}")]
    Encoding { field: String },

    /// The CRC embedded in the frame does not match the payload.
    #[error("CRC32 mismatch: frame carries {expected}, computed {computed}")]
    Checksum { expected: String, computed: String },

    /// The device reported a zero-length transfer.
    #[error("device reports no data to read")]
    NoData,

    /// The device stopped advancing the read offset mid-transfer.
    #[error("read offset stuck at {offset} of {total} bytes")]
    StalledTransfer { offset: usize, total: usize },

    /// A characteristic required by the protocol was not discovered.
    #[error("required characteristic {0} was not discovered")]
    Discovery(Uuid),

    /// The acknowledgment write sequence was aborted; partial chunk delivery
    /// is never resumed.
    #[error("acknowledgment write aborted at offset {offset}")]
    AckFailed {
        offset: usize,
        #[source]
        source: Box<Btr2Error>,
    },

    /// The transport reported the device link as lost.
    #[error("device link lost")]
    Disconnect,

    /// A connection attempt did not complete in time.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// Any other failure reported by the Bluetooth transport.
    #[error("bluetooth transport error: {0}")]
    Transport(#[from] bluest::Error),
}

impl Btr2Error {
    /// True for errors that mean the device link is gone and the read loop
    /// must stop. Checksum, framing and stall errors are not disconnects; the
    /// next scheduled cycle retries after those.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnect => true,
            Self::AckFailed { source, .. } => source.is_disconnect(),
            _ => false,
        }
    }
}

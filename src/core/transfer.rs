//! Chunked transfer over the BTR2 control-point/object characteristics.
//!
//! One inbound frame is moved in device-paced rounds: the read control point
//! reports the pending length, and each `[len, offset]` control write
//! requests the next chunk through the read object characteristic. After a
//! verified read, an acknowledgment travels the other way in fixed 20-byte
//! chunks through the write control-point/object pair. Every characteristic
//! access is a strictly sequential await; the device cannot service
//! overlapping operations.

use chrono::Local;
use log::{debug, info};

use crate::core::bluetooth::constants::{
    ACK_CHUNK_SIZE, LOCAL_MAC_PLACEHOLDER, READ_CONTROL_POINT, READ_OBJECT, STALL_GUARD_ROUNDS,
    WRITE_CONTROL_POINT, WRITE_OBJECT,
};
use crate::core::bluetooth::link::Btr2Link;
use crate::core::frame::{self, InboundFrame};
use crate::error::Btr2Error;

/// Tuning for one transfer exchange.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// MAC placeholder written into acknowledgment frames.
    pub local_mac: String,
    /// Consecutive non-advancing read rounds tolerated before the transfer
    /// is abandoned as stalled.
    pub stall_guard_rounds: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            local_mac: LOCAL_MAC_PLACEHOLDER.to_string(),
            stall_guard_rounds: STALL_GUARD_ROUNDS,
        }
    }
}

/// Reads one complete frame from the device.
///
/// The control point reports `[total_len, read_pointer]`. A zero total means
/// the device has nothing pending. Otherwise the transfer is restarted from
/// offset 0 and object reads are appended until `total_len` bytes arrived;
/// the device honors each `[total_len, offset]` control write by serving the
/// chunk at that offset. The assembled buffer is parsed and CRC-checked, and
/// only a verified frame is acknowledged. A checksum failure discards the
/// buffer without retrying; the caller's next cycle is the retry.
pub async fn read_frame(
    link: &dyn Btr2Link,
    options: &TransferOptions,
) -> Result<InboundFrame, Btr2Error> {
    let control = link.read_characteristic(READ_CONTROL_POINT).await?;
    let total = control.first().copied().unwrap_or(0) as usize;
    let read_pointer = control.get(1).copied().unwrap_or(0);
    if total == 0 {
        return Err(Btr2Error::NoData);
    }
    debug!("inbound transfer: {total} bytes pending, device read pointer at {read_pointer}");

    link.write_characteristic(READ_CONTROL_POINT, &[total as u8, 0])
        .await?;
    let mut assembled = link.read_characteristic(READ_OBJECT).await?;

    let mut offset = assembled.len();
    let mut stagnant_rounds = 0u32;
    while offset < total {
        link.write_characteristic(READ_CONTROL_POINT, &[total as u8, offset as u8])
            .await?;
        let chunk = link.read_characteristic(READ_OBJECT).await?;
        assembled.extend_from_slice(&chunk);

        if assembled.len() == offset {
            stagnant_rounds += 1;
            if stagnant_rounds >= options.stall_guard_rounds {
                return Err(Btr2Error::StalledTransfer { offset, total });
            }
        } else {
            stagnant_rounds = 0;
        }
        offset = assembled.len();
        debug!("inbound transfer: {offset}/{total} bytes");
    }

    let frame = InboundFrame::parse(&assembled)?;
    frame.verify_checksum()?;

    send_ack(link, &frame, options).await?;
    info!("read {total} byte frame from device");
    Ok(frame)
}

/// Acknowledges a received frame.
///
/// The acknowledgment is chunked into 20-byte pieces; each piece is preceded
/// by a `[total_len, offset]` control write, and a terminal
/// `[total_len, total_len]` control write signals end of transfer. A failure
/// at any step aborts the whole acknowledgment; partial delivery is not
/// resumed.
pub async fn send_ack(
    link: &dyn Btr2Link,
    frame: &InboundFrame,
    options: &TransferOptions,
) -> Result<(), Btr2Error> {
    let ack = frame::build_ack(frame, &options.local_mac, Local::now());
    let total = ack.len();

    for (index, chunk) in ack.chunks(ACK_CHUNK_SIZE).enumerate() {
        let offset = index * ACK_CHUNK_SIZE;
        debug!("sending ack chunk at {offset}/{total}");
        link.write_characteristic(WRITE_CONTROL_POINT, &[total as u8, offset as u8])
            .await
            .map_err(|source| ack_failed(offset, source))?;
        link.write_characteristic(WRITE_OBJECT, chunk)
            .await
            .map_err(|source| ack_failed(offset, source))?;
    }

    link.write_characteristic(WRITE_CONTROL_POINT, &[total as u8, total as u8])
        .await
        .map_err(|source| ack_failed(total, source))?;
    debug!("acknowledged {total} byte response");
    Ok(())
}

fn ack_failed(offset: usize, source: Btr2Error) -> Btr2Error {
    Btr2Error::AckFailed {
        offset,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::testing::{frame_bytes, ScriptedLink};

    use super::*;

    /// Payload sized so the whole frame (STX + payload + CRC + ETX) is
    /// exactly 40 bytes.
    fn forty_byte_frame() -> (String, Vec<u8>) {
        let mut payload = String::from("1;T;AB;7;d;t;0;0042;");
        while payload.len() < 30 {
            payload.push('z');
        }
        let raw = frame_bytes(&payload);
        assert_eq!(raw.len(), 40);
        (payload, raw)
    }

    #[tokio::test]
    async fn two_round_read_then_chunked_ack() {
        let (payload, raw) = forty_byte_frame();
        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, vec![40, 0]);
        link.push_read(READ_OBJECT, raw[..20].to_vec());
        link.push_read(READ_OBJECT, raw[20..].to_vec());

        let frame = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap();
        assert_eq!(frame.payload(), payload.as_bytes());
        assert_eq!(frame.chip_number().unwrap(), "2400");

        // Read side: restart from zero, then request the second chunk.
        assert_eq!(
            link.writes_to(READ_CONTROL_POINT),
            vec![vec![40, 0], vec![40, 20]]
        );

        // Ack side: reassembled chunks form a frame that verifies.
        let chunks = link.writes_to(WRITE_OBJECT);
        let ack: Vec<u8> = chunks.concat();
        let n = ack.len();
        assert_eq!(chunks.len(), (n + ACK_CHUNK_SIZE - 1) / ACK_CHUNK_SIZE);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.len(), ACK_CHUNK_SIZE);
        }
        let reparsed = InboundFrame::parse(&ack).unwrap();
        reparsed.verify_checksum().unwrap();
        assert_eq!(reparsed.sender_mac(), LOCAL_MAC_PLACEHOLDER);
        assert_eq!(reparsed.packet_index(), "7");

        // Each chunk's control write precedes it, and the terminal control
        // write closes the transfer.
        let control_writes = link.writes_to(WRITE_CONTROL_POINT);
        assert_eq!(control_writes.len(), chunks.len() + 1);
        for (index, write) in control_writes[..chunks.len()].iter().enumerate() {
            assert_eq!(write, &vec![n as u8, (index * ACK_CHUNK_SIZE) as u8]);
        }
        assert_eq!(control_writes.last().unwrap(), &vec![n as u8, n as u8]);
    }

    #[tokio::test]
    async fn control_and_object_writes_are_interleaved_in_order() {
        let (_, raw) = forty_byte_frame();
        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, vec![40, 0]);
        link.push_read(READ_OBJECT, raw);

        read_frame(&link, &TransferOptions::default())
            .await
            .unwrap();

        let addresses = link.write_addresses();
        let ack_chunks = link.writes_to(WRITE_OBJECT).len();
        let mut expected = vec![READ_CONTROL_POINT];
        for _ in 0..ack_chunks {
            expected.push(WRITE_CONTROL_POINT);
            expected.push(WRITE_OBJECT);
        }
        expected.push(WRITE_CONTROL_POINT);
        assert_eq!(addresses, expected);
    }

    #[tokio::test]
    async fn zero_length_transfer_reports_no_data() {
        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, vec![0, 0]);

        let err = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Btr2Error::NoData));
        assert!(link.write_addresses().is_empty());
    }

    #[tokio::test]
    async fn empty_control_value_reports_no_data() {
        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, Vec::new());

        let err = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Btr2Error::NoData));
    }

    #[tokio::test]
    async fn stagnant_offset_aborts_the_transfer() {
        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, vec![10, 0]);
        link.push_read(READ_OBJECT, b"hello".to_vec());
        link.push_read(READ_OBJECT, Vec::new());
        link.push_read(READ_OBJECT, Vec::new());
        link.push_read(READ_OBJECT, Vec::new());

        let err = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Btr2Error::StalledTransfer {
                offset: 5,
                total: 10
            }
        ));
    }

    #[tokio::test]
    async fn corrupted_crc_is_rejected_without_acknowledgment() {
        let (_, mut raw) = forty_byte_frame();
        let crc_start = raw.len() - 1 - 8;
        raw[crc_start] = if raw[crc_start] == b'0' { b'1' } else { b'0' };

        let link = ScriptedLink::new();
        link.push_read(READ_CONTROL_POINT, vec![40, 0]);
        link.push_read(READ_OBJECT, raw);

        let err = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Btr2Error::Checksum { .. }));
        assert!(link.writes_to(WRITE_CONTROL_POINT).is_empty());
        assert!(link.writes_to(WRITE_OBJECT).is_empty());
    }

    #[tokio::test]
    async fn failed_ack_write_aborts_the_acknowledgment() {
        let (_, raw) = forty_byte_frame();
        // Write 0 is the read-side restart; every ack write fails.
        let link = ScriptedLink::new().fail_writes_from(1);
        link.push_read(READ_CONTROL_POINT, vec![40, 0]);
        link.push_read(READ_OBJECT, raw);

        let err = read_frame(&link, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Btr2Error::AckFailed { offset: 0, .. }));
        assert!(err.is_disconnect());
    }

    #[test]
    fn chunking_arithmetic() {
        for n in [1usize, 19, 20, 21, 40, 59] {
            let buffer: Vec<u8> = (0..n).map(|i| i as u8).collect();
            let chunks: Vec<&[u8]> = buffer.chunks(ACK_CHUNK_SIZE).collect();
            assert_eq!(chunks.len(), (n + ACK_CHUNK_SIZE - 1) / ACK_CHUNK_SIZE);
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.len(), ACK_CHUNK_SIZE);
            }
            assert_eq!(chunks.concat(), buffer);
        }
    }
}

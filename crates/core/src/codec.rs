//! Fixed-size HID frame encoding.
//!
//! Every command sent to a peripheral is a 64-byte output report:
//! - byte 0: command (read / write / stream)
//! - bytes 1..4: property or subcommand bytes
//! - bytes 4..64: payload, zero padded
//!
//! Feature-report transmissions carry one extra leading report-ID byte.
//! Pure functions only; no I/O happens here.

use crate::error::{Error, Result};

/// Logical frame length.
pub const FRAME_LEN: usize = 64;
/// Feature report length (report ID + frame).
pub const FEATURE_FRAME_LEN: usize = FRAME_LEN + 1;
/// Report ID prepended to every feature report.
pub const FEATURE_REPORT_ID: u8 = 0x00;
/// Offset of the first payload byte in a control or stream frame.
pub const PAYLOAD_OFFSET: usize = 4;
/// Payload bytes available in one frame.
pub const PAYLOAD_CAPACITY: usize = FRAME_LEN - PAYLOAD_OFFSET;

/// One 64-byte output report.
pub type Frame = [u8; FRAME_LEN];
/// One 65-byte feature report.
pub type FeatureFrame = [u8; FEATURE_FRAME_LEN];

/// Build a zero-filled frame: `command` at offset 0, `header` from offset 1,
/// `payload` from [`PAYLOAD_OFFSET`].
pub fn build_frame(command: u8, header: &[u8], payload: &[u8]) -> Result<Frame> {
    if header.len() > PAYLOAD_OFFSET - 1 {
        return Err(Error::FrameOverflow {
            len: header.len(),
            capacity: PAYLOAD_OFFSET - 1,
        });
    }
    if payload.len() > PAYLOAD_CAPACITY {
        return Err(Error::FrameOverflow {
            len: payload.len(),
            capacity: PAYLOAD_CAPACITY,
        });
    }

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = command;
    frame[1..1 + header.len()].copy_from_slice(header);
    frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    Ok(frame)
}

/// Prepend the feature report ID.
///
/// The hardware needs 1 ms between consecutive feature reports; that delay
/// belongs to the sender (see `transport::send_feature`).
pub fn build_feature_frame(frame: &Frame) -> FeatureFrame {
    let mut report = [0u8; FEATURE_FRAME_LEN];
    report[0] = FEATURE_REPORT_ID;
    report[1..].copy_from_slice(frame);
    report
}

/// Slice a buffer left to right into `(offset, len)` chunks of the declared sizes.
///
/// The sizes must add up to exactly `buffer.len()`.
pub fn split_into_chunks(buffer: &[u8], chunk_sizes: &[usize]) -> Result<Vec<(usize, usize)>> {
    let declared: usize = chunk_sizes.iter().sum();
    if declared != buffer.len() {
        return Err(Error::ChunkMismatch {
            declared,
            actual: buffer.len(),
        });
    }

    let mut offset = 0;
    let chunks = chunk_sizes
        .iter()
        .map(|&len| {
            let chunk = (offset, len);
            offset += len;
            chunk
        })
        .collect();
    Ok(chunks)
}

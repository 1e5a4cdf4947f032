//! Frame encoding and header validation for the ERV bus.
//!
//! Frame format:
//! - START (1 byte): 0x01 start marker
//! - TARGET (1 byte): destination bus address (0-32)
//! - SENDER (1 byte): source bus address (0-32)
//! - ALIGN (1 byte): 0x01 alignment marker
//! - LENGTH (1 byte): payload length (0-255)
//! - PAYLOAD (LENGTH bytes): type-tagged message body
//! - CHECKSUM (1 byte): see [`checksum`]
//! - FOOTER (1 byte): 0x04 end marker

use heapless::Vec;

/// Frame start marker
pub const FRAME_START: u8 = 0x01;

/// Fixed marker at header byte 3, used to detect misalignment
pub const ALIGN_MARKER: u8 = 0x01;

/// Frame end marker
pub const FRAME_FOOTER: u8 = 0x04;

/// Highest valid bus address
pub const MAX_ADDRESS: u8 = 32;

/// Wire length of the header (START + TARGET + SENDER + ALIGN + LENGTH)
pub const HEADER_LEN: usize = 5;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Maximum complete frame size (header + payload + checksum + footer)
pub const MAX_FRAME_SIZE: usize = HEADER_LEN + MAX_PAYLOAD_SIZE + 2;

/// Errors that can occur during frame parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Header byte 0 or 3 is not the expected marker
    BadAlignment,
    /// Target or sender address exceeds [`MAX_ADDRESS`]
    BadAddress,
    /// Checksum mismatch
    InvalidChecksum,
    /// Footer byte is not [`FRAME_FOOTER`]
    BadFooter,
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// Computes the single-byte checksum over a frame's variable content.
///
/// The running total covers both marker bytes, the two addresses, the
/// payload length and every payload byte, all wrapping at 256. The wire
/// value is `0xFF & (0 - (total - 1))`, reproduced here with wrapping
/// `u8` arithmetic so a total of zero yields `0x01`.
///
/// The sum is symmetric in `sender` and `receiver`, so the same call
/// validates inbound frames and generates outbound ones.
pub fn checksum(sender: u8, receiver: u8, payload: &[u8]) -> u8 {
    let mut total = FRAME_START
        .wrapping_add(sender)
        .wrapping_add(receiver)
        .wrapping_add(ALIGN_MARKER)
        .wrapping_add(payload.len() as u8);
    for &byte in payload {
        total = total.wrapping_add(byte);
    }
    0u8.wrapping_sub(total.wrapping_sub(1))
}

/// A validated frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    /// Destination bus address
    pub target: u8,
    /// Source bus address
    pub sender: u8,
    /// Declared payload length
    pub length: u8,
}

impl FrameHeader {
    /// Validate a raw 5-byte header.
    ///
    /// Checks the start and alignment markers and the address range.
    /// The declared length is taken as-is; the payload that follows is
    /// checked against it by the frame reader.
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
        if raw[0] != FRAME_START || raw[3] != ALIGN_MARKER {
            return Err(FrameError::BadAlignment);
        }
        if raw[1] > MAX_ADDRESS || raw[2] > MAX_ADDRESS {
            return Err(FrameError::BadAddress);
        }
        Ok(Self {
            target: raw[1],
            sender: raw[2],
            length: raw[4],
        })
    }
}

/// Encode a payload into a complete frame.
///
/// Returns the number of bytes written.
pub fn encode_frame(
    target: u8,
    sender: u8,
    payload: &[u8],
    buffer: &mut [u8],
) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }
    let frame_len = HEADER_LEN + payload.len() + 2;
    if buffer.len() < frame_len {
        return Err(FrameError::BufferTooSmall);
    }

    buffer[0] = FRAME_START;
    buffer[1] = target;
    buffer[2] = sender;
    buffer[3] = ALIGN_MARKER;
    buffer[4] = payload.len() as u8;
    buffer[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    buffer[HEADER_LEN + payload.len()] = checksum(sender, target, payload);
    buffer[HEADER_LEN + payload.len() + 1] = FRAME_FOOTER;

    Ok(frame_len)
}

/// Encode a payload into a heapless Vec.
pub fn encode_frame_vec(
    target: u8,
    sender: u8,
    payload: &[u8],
) -> Result<Vec<u8, MAX_FRAME_SIZE>, FrameError> {
    let mut buffer = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(target, sender, payload, &mut buffer)?;
    let mut vec = Vec::new();
    vec.extend_from_slice(&buffer[..len])
        .map_err(|_| FrameError::BufferTooSmall)?;
    Ok(vec)
}

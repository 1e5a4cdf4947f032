//! Incremental frame reader.
//!
//! Frames arrive in pieces. The reader consumes a header as soon as
//! five bytes are buffered, holds it across ticks until the rest of the
//! body shows up, then checks the checksum and footer before handing
//! the frame over.

use boreas_protocol::{
    checksum, FrameError, FrameHeader, FRAME_FOOTER, HEADER_LEN, MAX_PAYLOAD_SIZE,
};
use heapless::Vec;
use log::{error, warn};

use crate::traits::BusPort;

/// A fully validated inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Address the frame was sent to
    pub target: u8,
    /// Address the frame came from
    pub sender: u8,
    /// Frame payload
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

/// Pull-based frame reader over a [`BusPort`].
#[derive(Debug, Default)]
pub struct FrameReader {
    pending: Option<FrameHeader>,
}

impl FrameReader {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// True while a parsed header waits for its body.
    pub fn header_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Try to obtain a validated header.
    ///
    /// Succeeds immediately if one is already pending. Otherwise five
    /// buffered bytes are consumed whether or not they validate;
    /// discarding a bad header is how the stream realigns.
    pub fn try_read_header<P: BusPort>(&mut self, port: &mut P) -> bool {
        if self.pending.is_some() {
            return true;
        }
        if port.available() < HEADER_LEN {
            return false;
        }

        let mut raw = [0u8; HEADER_LEN];
        for slot in raw.iter_mut() {
            match port.read() {
                Some(byte) => *slot = byte,
                None => {
                    error!("bus buffer exhausted mid-header");
                    return false;
                }
            }
        }

        match FrameHeader::parse(&raw) {
            Ok(header) => {
                self.pending = Some(header);
                true
            }
            Err(FrameError::BadAddress) => {
                warn!("alignment lost: address out of range in {:02X?}", raw);
                false
            }
            Err(_) => {
                warn!("alignment lost: unexpected header bytes {:02X?}", raw);
                false
            }
        }
    }

    /// Try to complete the pending frame.
    ///
    /// Returns `None` both while body bytes are still missing (the
    /// header stays pending for the next tick) and when the frame is
    /// rejected (the header is dropped). A returned frame has already
    /// passed the checksum and footer checks.
    pub fn try_read_frame<P: BusPort>(&mut self, port: &mut P) -> Option<ReceivedFrame> {
        let header = self.pending?;
        let length = header.length as usize;

        // Payload plus checksum and footer
        if port.available() < length + 2 {
            return None;
        }

        // Past this point the frame is consumed, valid or not
        self.pending = None;

        let mut payload: Vec<u8, MAX_PAYLOAD_SIZE> = Vec::new();
        for _ in 0..length {
            match port.read() {
                Some(byte) => {
                    // Cannot overflow, length is at most MAX_PAYLOAD_SIZE
                    let _ = payload.push(byte);
                }
                None => {
                    error!("bus buffer exhausted mid-frame");
                    return None;
                }
            }
        }

        let received = match port.read() {
            Some(byte) => byte,
            None => {
                error!("bus buffer exhausted before checksum");
                return None;
            }
        };
        let expected = checksum(header.sender, header.target, &payload);
        if received != expected {
            error!(
                "checksum mismatch, got {:02X} but expected {:02X}",
                received, expected
            );
            return None;
        }

        let footer = match port.read() {
            Some(byte) => byte,
            None => {
                error!("bus buffer exhausted before footer");
                return None;
            }
        };
        if footer != FRAME_FOOTER {
            error!(
                "missing {:02X} footer, stream likely desynchronized",
                FRAME_FOOTER
            );
            return None;
        }

        Some(ReceivedFrame {
            target: header.target,
            sender: header.sender,
            payload,
        })
    }
}

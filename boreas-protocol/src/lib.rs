//! Wire protocol for the Broan AI-series ERV serial bus
//!
//! The bus is a shared half-duplex serial line carrying small framed
//! messages between the ventilation unit (the bus master) and its wall
//! controls. All messages use the same frame format:
//!
//! ```text
//! ┌───────┬────────┬────────┬───────┬────────┬─────────┬──────────┬────────┐
//! │ START │ TARGET │ SENDER │ ALIGN │ LENGTH │ PAYLOAD │ CHECKSUM │ FOOTER │
//! │ 0x01  │ 1B     │ 1B     │ 0x01  │ 1B     │ 0-255B  │ 1B       │ 0x04   │
//! └───────┴────────┴────────┴───────┴────────┴─────────┴──────────┴────────┘
//! ```
//!
//! Addresses are small (at most 32). The payload's first byte tags the
//! message semantics; read responses and write requests carry
//! `(opcode, length, value)` tuples after it, with values encoded as
//! little-endian buffers of up to four bytes.
//!
//! This crate owns the byte-level format only. Bus arbitration, field
//! semantics and scheduling live in `boreas-driver`.

#![no_std]
#![deny(unsafe_code)]

pub mod frame;
pub mod message;
pub mod value;

pub use frame::{
    checksum, encode_frame, encode_frame_vec, FrameError, FrameHeader, FRAME_FOOTER, FRAME_START,
    HEADER_LEN, MAX_ADDRESS, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
pub use message::{FieldTuple, FieldTuples, Message, OpcodePairs};
pub use value::{Opcode, Value, ValueKind};

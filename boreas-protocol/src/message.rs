//! Payload message typing.
//!
//! The first payload byte selects the message semantics. Control traffic
//! (ping, flow control) carries little or no body; register traffic
//! carries opcode pairs or `(opcode, length, value)` tuples after the
//! type byte.

use crate::value::Opcode;

// Control traffic
pub const MSG_PING: u8 = 0x02;
pub const MSG_PING_REPLY: u8 = 0x03;
pub const MSG_CONTROL_OFFER: u8 = 0x04;
pub const MSG_CONTROL_ACK: u8 = 0x05;

// Register traffic
pub const MSG_READ_REQUEST: u8 = 0x20;
pub const MSG_READ_REPLY: u8 = 0x21;
pub const MSG_WRITE_REQUEST: u8 = 0x40;
pub const MSG_WRITE_ACK: u8 = 0x41;

/// A payload viewed through its leading type byte
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message<'a> {
    /// Ping from the bus master; the body is echoed back in the reply
    Ping(&'a [u8]),
    /// Another participant's reply to a ping
    PingReply(&'a [u8]),
    /// Flow-control token offer (a bare `[0x04]` payload also releases
    /// the token back to the master)
    ControlOffer,
    /// Acknowledgment of a token offer
    ControlAck,
    /// Read request listing the opcode pairs to fetch
    ReadRequest(OpcodePairs<'a>),
    /// Read response carrying field tuples
    ReadReply(FieldTuples<'a>),
    /// Write request carrying field tuples
    WriteRequest(FieldTuples<'a>),
    /// Write acknowledgment listing the opcode pairs that were applied
    WriteAck(OpcodePairs<'a>),
    /// Anything else, kept raw for diagnostics
    Unknown { msg_type: u8, body: &'a [u8] },
}

impl<'a> Message<'a> {
    /// Type a payload by its leading byte.
    ///
    /// Returns `None` for an empty payload, which has no type byte.
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        let (&msg_type, body) = payload.split_first()?;
        Some(match msg_type {
            MSG_PING => Message::Ping(body),
            MSG_PING_REPLY => Message::PingReply(body),
            MSG_CONTROL_OFFER => Message::ControlOffer,
            MSG_CONTROL_ACK => Message::ControlAck,
            MSG_READ_REQUEST => Message::ReadRequest(OpcodePairs::new(body)),
            MSG_READ_REPLY => Message::ReadReply(FieldTuples::new(body)),
            MSG_WRITE_REQUEST => Message::WriteRequest(FieldTuples::new(body)),
            MSG_WRITE_ACK => Message::WriteAck(OpcodePairs::new(body)),
            _ => Message::Unknown { msg_type, body },
        })
    }
}

/// Iterator over the 2-byte opcode pairs in a read-request or write-ack
/// body. A trailing odd byte is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpcodePairs<'a> {
    body: &'a [u8],
}

impl<'a> OpcodePairs<'a> {
    pub const fn new(body: &'a [u8]) -> Self {
        Self { body }
    }
}

impl<'a> Iterator for OpcodePairs<'a> {
    type Item = Opcode;

    fn next(&mut self) -> Option<Opcode> {
        if self.body.len() < 2 {
            return None;
        }
        let opcode = Opcode::new(self.body[0], self.body[1]);
        self.body = &self.body[2..];
        Some(opcode)
    }
}

/// One `(opcode, length, value)` tuple from a read response or write
/// request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldTuple<'a> {
    pub opcode: Opcode,
    /// Length byte as sent; exceeds `bytes.len()` if the body ended early
    pub declared_len: u8,
    /// Value bytes, clamped to the end of the body
    pub bytes: &'a [u8],
}

/// Cursor over the field tuples in a read-response or write-request body.
///
/// Advances by each tuple's declared length, so an oversized value keeps
/// the walk aligned for the tuples after it. A tuple header running past
/// the end of the body stops iteration; [`FieldTuples::truncated`]
/// reports whether that happened.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldTuples<'a> {
    body: &'a [u8],
    truncated: bool,
}

impl<'a> FieldTuples<'a> {
    pub const fn new(body: &'a [u8]) -> Self {
        Self {
            body,
            truncated: false,
        }
    }

    /// True once iteration has stopped on an incomplete tuple header.
    pub const fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for FieldTuples<'a> {
    type Item = FieldTuple<'a>;

    fn next(&mut self) -> Option<FieldTuple<'a>> {
        if self.body.is_empty() {
            return None;
        }
        if self.body.len() < 3 {
            self.truncated = true;
            self.body = &[];
            return None;
        }

        let opcode = Opcode::new(self.body[0], self.body[1]);
        let declared_len = self.body[2];
        let rest = &self.body[3..];
        let take = (declared_len as usize).min(rest.len());

        self.body = &rest[take..];
        Some(FieldTuple {
            opcode,
            declared_len,
            bytes: &rest[..take],
        })
    }
}

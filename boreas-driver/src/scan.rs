//! Unmapped-register diagnostics.
//!
//! With scanning enabled the driver keeps a side table of registers it
//! has seen but does not recognize, logs their deltas, and sweeps the
//! opcode space with batched read requests to surface more of them.
//! None of this touches the registered catalog.

use boreas_protocol::message::MSG_READ_REQUEST;
use boreas_protocol::value::overlay_wire;
use boreas_protocol::{Opcode, ValueKind};
use heapless::FnvIndexMap;
use log::debug;

use crate::queue::TxPayload;

/// Capacity of the unmapped-register table (must be a power of two).
pub const UNKNOWN_CAPACITY: usize = 64;

/// Delay before the first sweep request (ms).
pub const SWEEP_WARMUP_MS: u32 = 15_000;

/// Cadence between sweep requests once warmed up (ms).
pub const SWEEP_INTERVAL_MS: u32 = 100;

/// Opcode pairs per sweep request.
pub const SWEEP_BATCH: usize = 15;

/// Last seen state of an unmapped register.
#[derive(Debug, Clone, Copy)]
struct UnknownField {
    /// Kind guessed from the first observed length
    kind: ValueKind,
    /// Little-endian wire image of the last observed value
    raw: [u8; 4],
}

/// Side table of unmapped registers seen on the bus.
#[derive(Debug)]
pub struct UnknownFields {
    entries: FnvIndexMap<u16, UnknownField, UNKNOWN_CAPACITY>,
}

impl Default for UnknownFields {
    fn default() -> Self {
        Self::new()
    }
}

impl UnknownFields {
    pub fn new() -> Self {
        Self {
            entries: FnvIndexMap::new(),
        }
    }

    /// Number of distinct unmapped registers seen so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kind guessed for a tracked register, if it has been seen.
    pub fn guessed_kind(&self, opcode: Opcode) -> Option<ValueKind> {
        self.entries.get(&opcode.key()).map(|entry| entry.kind)
    }

    /// Record one observation of an unmapped register.
    ///
    /// With `track` set the value is kept in the table so later
    /// observations log deltas; without it every observation logs as a
    /// first sighting and nothing is retained.
    pub fn observe(&mut self, opcode: Opcode, declared_len: u8, bytes: &[u8], track: bool) {
        let key = opcode.key();

        if track {
            if let Some(entry) = self.entries.get_mut(&key) {
                let old = entry.raw;
                overlay_wire(&mut entry.raw, bytes);
                if entry.raw != old && (declared_len == 4 || declared_len == 1) {
                    debug!(
                        "{:02X}{:02X} is unmapped, value {} / {} -> {} / {}",
                        opcode.high,
                        opcode.low,
                        f32::from_le_bytes(old),
                        u32::from_le_bytes(old),
                        f32::from_le_bytes(entry.raw),
                        u32::from_le_bytes(entry.raw),
                    );
                }
                return;
            }
        }

        let mut entry = UnknownField {
            kind: if declared_len == 4 {
                ValueKind::Float
            } else {
                ValueKind::Byte
            },
            raw: [0; 4],
        };
        overlay_wire(&mut entry.raw, bytes);

        match declared_len {
            4 => debug!(
                "{:02X}{:02X} is unmapped, value {} / {}",
                opcode.high,
                opcode.low,
                f32::from_le_bytes(entry.raw),
                u32::from_le_bytes(entry.raw),
            ),
            1 => debug!(
                "{:02X}{:02X} is unmapped, value {:02X}",
                opcode.high, opcode.low, entry.raw[0],
            ),
            _ => debug!(
                "{:02X}{:02X} has unhandled field length {}: {:02X?}",
                opcode.high, opcode.low, declared_len, bytes,
            ),
        }

        if track && self.entries.insert(key, entry).is_err() {
            debug!(
                "unmapped-register table is full, not tracking {:02X}{:02X}",
                opcode.high, opcode.low,
            );
        }
    }
}

/// Brute-force read-request generator walking the opcode space.
///
/// Requests go out in batches of [`SWEEP_BATCH`] pairs. The field
/// cursor is the opcode high byte; whenever it passes 0xFF the group
/// cursor (low byte) advances to the next register group, and the last
/// group wraps back to the first.
#[derive(Debug, Clone)]
pub struct OpcodeSweep {
    /// Opcode high byte of the next request
    field_cursor: u8,
    /// Register group (opcode low byte) of the next request
    group_cursor: u8,
    /// Timestamp the next sweep request is allowed at, 0 before arming
    next_sweep_ms: u32,
}

impl Default for OpcodeSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcodeSweep {
    pub const fn new() -> Self {
        Self {
            field_cursor: 0,
            group_cursor: 0x20,
            next_sweep_ms: 0,
        }
    }

    /// Current cursor position as (field, group).
    pub fn cursors(&self) -> (u8, u8) {
        (self.field_cursor, self.group_cursor)
    }

    /// Advance to the next opcode pair.
    fn next_pair(&mut self) -> Opcode {
        let pair = Opcode::new(self.field_cursor, self.group_cursor);
        if self.field_cursor == 0xFF {
            self.group_cursor = match self.group_cursor {
                0x20 => 0x21,
                0x21 => 0x22,
                0x22 => 0x30,
                0x30 => 0x40,
                0x40 => 0x50,
                0x50 => 0x60,
                0x60 => 0xE0,
                _ => 0x20,
            };
        }
        self.field_cursor = self.field_cursor.wrapping_add(1);
        pair
    }

    /// Build the next sweep request if the cadence allows one.
    ///
    /// The first call arms the warmup timer; after that a request flows
    /// every [`SWEEP_INTERVAL_MS`] for as long as `ready` holds.
    pub fn next_request(&mut self, now_ms: u32, ready: bool) -> Option<TxPayload> {
        if self.next_sweep_ms == 0 {
            self.next_sweep_ms = now_ms.wrapping_add(SWEEP_WARMUP_MS);
        }
        if !ready || now_ms <= self.next_sweep_ms {
            return None;
        }
        self.next_sweep_ms = now_ms.wrapping_add(SWEEP_INTERVAL_MS);

        let mut payload = TxPayload::new();
        // A batch always fits the payload capacity
        let _ = payload.push(MSG_READ_REQUEST);
        for _ in 0..SWEEP_BATCH {
            let pair = self.next_pair();
            let _ = payload.push(pair.high);
            let _ = payload.push(pair.low);
        }
        Some(payload)
    }
}

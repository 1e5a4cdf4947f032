//! Field registry: the catalog of known ERV registers.
//!
//! Each field pairs a wire opcode with a value kind, a poll cadence and
//! the last value seen on the bus. The catalog is fixed at build time;
//! values mutate only through accepted frames.

use boreas_protocol::value::overlay_wire;
use boreas_protocol::{Opcode, Value, ValueKind};

/// Poll-interval sentinel: never poll this field.
pub const POLL_NEVER: u32 = u32::MAX;

/// Number of registered fields.
pub const FIELD_COUNT: usize = 8;

/// Semantic identity of a registered field.
///
/// The discriminant doubles as the registry index, so the catalog array
/// lists fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldId {
    /// Operating-mode selector
    FanMode,
    /// Medium supply-flow setpoint (CFM)
    SupplyFlowMedium,
    /// Lower supply-flow bound (CFM)
    SupplyFlowMin,
    /// Upper supply-flow bound (CFM)
    SupplyFlowMax,
    /// Instantaneous power draw (watts)
    Wattage,
    /// Filter life remaining
    FilterLife,
    /// Temperature probe, first opcode variant
    TemperatureA,
    /// Temperature probe, second opcode variant
    TemperatureB,
}

/// One registered field and its live state.
#[derive(Debug, Clone)]
pub struct Field {
    /// Semantic identity
    pub id: FieldId,
    /// Wire opcode
    pub opcode: Opcode,
    /// Wire value kind
    pub kind: ValueKind,
    /// Poll cadence in ms, or [`POLL_NEVER`]
    pub poll_interval_ms: u32,
    /// Little-endian wire image of the current value
    raw: [u8; 4],
    /// Timestamp of the last poll request (ms)
    last_poll_ms: u32,
    /// The ERV acknowledged our last write to this field
    dirty: bool,
}

impl Field {
    const fn new(id: FieldId, opcode: Opcode, kind: ValueKind, poll_interval_ms: u32) -> Self {
        Self {
            id,
            opcode,
            kind,
            poll_interval_ms,
            raw: [0; 4],
            last_poll_ms: 0,
            dirty: false,
        }
    }

    /// Current value, decoded from the stored wire image.
    pub fn value(&self) -> Value {
        Value::from_wire(self.kind, self.raw)
    }

    /// The stored wire image.
    pub fn wire_image(&self) -> [u8; 4] {
        self.raw
    }

    /// Overlay incoming value bytes onto the stored image.
    ///
    /// Returns true if the image changed. Bytes past the fourth are
    /// ignored; shorter updates keep the image's trailing bytes.
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> bool {
        let old = self.raw;
        overlay_wire(&mut self.raw, bytes);
        self.raw != old
    }

    /// The ERV acknowledged a write to this field.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when the poll cadence says this field is due.
    pub fn due_for_poll(&self, now_ms: u32) -> bool {
        self.poll_interval_ms != POLL_NEVER
            && now_ms.wrapping_sub(self.last_poll_ms) >= self.poll_interval_ms
    }

    /// Record a poll request going out, whether or not it is answered.
    pub fn note_polled(&mut self, now_ms: u32) {
        self.last_poll_ms = now_ms;
    }
}

/// The fixed field catalog.
#[derive(Debug, Clone)]
pub struct Registry {
    fields: [Field; FIELD_COUNT],
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Build the catalog.
    ///
    /// Opcode low bytes select the register group (the same groups the
    /// discovery sweep walks); cadences reflect how quickly each value
    /// matters to a user interface. Array order must match the
    /// [`FieldId`] discriminants.
    pub const fn new() -> Self {
        Self {
            fields: [
                Field::new(
                    FieldId::FanMode,
                    Opcode::new(0x01, 0x20),
                    ValueKind::Byte,
                    1_000,
                ),
                Field::new(
                    FieldId::SupplyFlowMedium,
                    Opcode::new(0x24, 0x40),
                    ValueKind::Float,
                    5_000,
                ),
                Field::new(
                    FieldId::SupplyFlowMin,
                    Opcode::new(0x23, 0x40),
                    ValueKind::Float,
                    60_000,
                ),
                Field::new(
                    FieldId::SupplyFlowMax,
                    Opcode::new(0x25, 0x40),
                    ValueKind::Float,
                    60_000,
                ),
                Field::new(
                    FieldId::Wattage,
                    Opcode::new(0x07, 0x50),
                    ValueKind::Float,
                    5_000,
                ),
                Field::new(
                    FieldId::FilterLife,
                    Opcode::new(0x01, 0x60),
                    ValueKind::Int,
                    60_000,
                ),
                Field::new(
                    FieldId::TemperatureA,
                    Opcode::new(0x10, 0x21),
                    ValueKind::Float,
                    10_000,
                ),
                Field::new(
                    FieldId::TemperatureB,
                    Opcode::new(0x11, 0x21),
                    ValueKind::Float,
                    10_000,
                ),
            ],
        }
    }

    /// Look up a field by wire opcode.
    pub fn lookup(&self, opcode: Opcode) -> Option<&Field> {
        self.fields.iter().find(|field| field.opcode == opcode)
    }

    /// Mutable lookup by wire opcode.
    pub fn lookup_mut(&mut self, opcode: Opcode) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.opcode == opcode)
    }

    /// Find which registered field an opcode addresses.
    ///
    /// The returned identity can be fed to [`Registry::get_mut`], which
    /// sidesteps holding a borrow across unrelated registry reads.
    pub fn id_for(&self, opcode: Opcode) -> Option<FieldId> {
        self.fields
            .iter()
            .find(|field| field.opcode == opcode)
            .map(|field| field.id)
    }

    /// Access a field by identity.
    pub fn get(&self, id: FieldId) -> &Field {
        &self.fields[id as usize]
    }

    /// Mutable access by identity.
    pub fn get_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id as usize]
    }

    /// Iterate the catalog in poll order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Mutable iteration in poll order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.iter_mut()
    }
}

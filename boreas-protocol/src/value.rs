//! Field opcodes and typed values.
//!
//! Every remote register is addressed by a two-byte opcode and carries a
//! value of one of four wire kinds. Values travel as little-endian
//! buffers of up to four bytes; conversion between the buffer and the
//! typed representation is explicit in both directions, never a
//! reinterpretation of raw storage.

/// Two-byte field identifier.
///
/// The low byte selects the register group, the high byte the field
/// within that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Opcode {
    pub high: u8,
    pub low: u8,
}

impl Opcode {
    /// Create an opcode from its high and low bytes.
    pub const fn new(high: u8, low: u8) -> Self {
        Self { high, low }
    }

    /// 16-bit form, used as a table key in diagnostics.
    pub const fn key(self) -> u16 {
        ((self.high as u16) << 8) | self.low as u16
    }
}

/// Wire type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueKind {
    /// Single byte
    Byte,
    /// 32-bit unsigned integer
    Int,
    /// 32-bit IEEE float
    Float,
    /// No value bytes (markers and keepalives)
    Void,
}

impl ValueKind {
    /// Number of value bytes this kind occupies in a write-request tuple.
    pub const fn wire_len(self) -> usize {
        match self {
            ValueKind::Byte => 1,
            ValueKind::Int | ValueKind::Float => 4,
            ValueKind::Void => 0,
        }
    }
}

/// A field value with its type tag.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    Byte(u8),
    Int(u32),
    Float(f32),
    Void,
}

impl Value {
    /// The wire kind of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Value::Byte(_) => ValueKind::Byte,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Void => ValueKind::Void,
        }
    }

    /// Zero value of the given kind.
    pub const fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Byte => Value::Byte(0),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Void => Value::Void,
        }
    }

    /// Decode a 4-byte little-endian wire image as the given kind.
    pub fn from_wire(kind: ValueKind, raw: [u8; 4]) -> Self {
        match kind {
            ValueKind::Byte => Value::Byte(raw[0]),
            ValueKind::Int => Value::Int(u32::from_le_bytes(raw)),
            ValueKind::Float => Value::Float(f32::from_le_bytes(raw)),
            ValueKind::Void => Value::Void,
        }
    }

    /// 4-byte little-endian wire image of this value.
    pub fn to_wire(&self) -> [u8; 4] {
        match *self {
            Value::Byte(b) => [b, 0, 0, 0],
            Value::Int(i) => i.to_le_bytes(),
            Value::Float(f) => f.to_le_bytes(),
            Value::Void => [0; 4],
        }
    }

    /// Float view, converting integer kinds numerically.
    pub fn as_f32(&self) -> f32 {
        match *self {
            Value::Byte(b) => b as f32,
            Value::Int(i) => i as f32,
            Value::Float(f) => f,
            Value::Void => 0.0,
        }
    }

    /// Integer view, converting other kinds numerically.
    pub fn as_u32(&self) -> u32 {
        match *self {
            Value::Byte(b) => b as u32,
            Value::Int(i) => i,
            Value::Float(f) => f as u32,
            Value::Void => 0,
        }
    }
}

/// Overlay incoming value bytes onto a wire image.
///
/// Copies up to four leading bytes, keeping the image's trailing bytes
/// when the input is shorter. This is how partial-length updates from
/// read responses apply to stored 4-byte values.
pub fn overlay_wire(raw: &mut [u8; 4], bytes: &[u8]) {
    for (dst, &src) in raw.iter_mut().zip(bytes) {
        *dst = src;
    }
}

//! Collaborator traits the host implements.
//!
//! The driver talks to exactly two things it does not own: a byte port
//! wrapping the half-duplex serial line, and a sink that receives
//! decoded state changes. Both are borrowed per tick.

/// Operating mode reported by the fan-mode register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FanMode {
    /// Intermittent ventilation
    Int,
    /// Continuous low speed
    Min,
    /// Continuous high speed
    Max,
    /// Speed follows the wall-control setpoint
    Manual,
    /// Temporary boost
    Turbo,
    /// Standby, and the fallback for unrecognized mode bytes
    Off,
}

impl FanMode {
    /// Decode a raw mode byte from the fan-mode register.
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x08 => FanMode::Int,
            0x09 => FanMode::Min,
            0x0A => FanMode::Max,
            0x0B => FanMode::Manual,
            0x0C => FanMode::Turbo,
            _ => FanMode::Off,
        }
    }

    /// Mode byte written back when commanding a mode change.
    pub const fn as_byte(self) -> u8 {
        match self {
            FanMode::Int => 0x08,
            FanMode::Min => 0x09,
            FanMode::Max => 0x0A,
            FanMode::Manual => 0x0B,
            FanMode::Turbo => 0x0C,
            FanMode::Off => 0x00,
        }
    }

    /// Stable lowercase name for user interfaces.
    pub const fn as_str(self) -> &'static str {
        match self {
            FanMode::Int => "int",
            FanMode::Min => "min",
            FanMode::Max => "max",
            FanMode::Manual => "manual",
            FanMode::Turbo => "turbo",
            FanMode::Off => "off",
        }
    }
}

/// Byte-level access to the half-duplex serial line.
///
/// Models a buffered UART: `available` reports bytes already received,
/// `read` pops one of them, `write` queues one for transmission.
pub trait BusPort {
    /// Number of received bytes waiting to be read.
    fn available(&self) -> usize;

    /// Pop the next received byte.
    ///
    /// Returning `None` when `available` promised bytes makes the
    /// reader abandon the frame in progress.
    fn read(&mut self) -> Option<u8>;

    /// Queue one byte for transmission.
    fn write(&mut self, byte: u8);

    /// Queue a whole buffer for transmission.
    fn write_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write(byte);
        }
    }
}

/// Presentation-layer callbacks, invoked only on confirmed change.
///
/// The driver publishes decoded field values here; what the host does
/// with them (sensor entities, a display, a log) is its own business.
pub trait StateSink {
    /// The fan-mode register changed.
    fn fan_mode_changed(&mut self, mode: FanMode);

    /// The medium supply-flow setpoint changed. `percent` is the raw
    /// setpoint remapped from the unit's min/max flow bounds into
    /// 0..=100; until both bounds have been polled at least once the
    /// remap divides by zero and the result is infinite or NaN.
    fn fan_speed_changed(&mut self, percent: f32);

    /// The power-draw register changed (watts).
    fn power_changed(&mut self, watts: f32);

    /// The filter-life register changed.
    fn filter_life_changed(&mut self, value: u32);
}

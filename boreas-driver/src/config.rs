//! Runtime driver configuration.

/// Default bus address this node answers to (the wall-control slot).
pub const DEFAULT_LOCAL_ADDRESS: u8 = 0x01;

/// Default bus address of the ERV controller.
pub const DEFAULT_ERV_ADDRESS: u8 = 0x02;

/// Default quiet period after which the link is reported down (ms).
pub const DEFAULT_READY_TIMEOUT_MS: u32 = 10_000;

/// Default keepalive cadence (ms).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 5_000;

/// Default cap on opcode pairs per batched read request.
pub const DEFAULT_MAX_POLL_OPCODES: usize = 10;

/// Driver configuration.
///
/// All of it is runtime state, so one binary can drive a live unit,
/// observe a bus it is not a participant on, or hunt for unmapped
/// registers, depending on how the host fills this in.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverConfig {
    /// Bus address this node answers to
    pub local_address: u8,
    /// Bus address of the ERV controller
    pub erv_address: u8,
    /// Quiet period after which the link is reported down (ms)
    pub ready_timeout_ms: u32,
    /// Keepalive cadence (ms)
    pub heartbeat_interval_ms: u32,
    /// Cap on opcode pairs per batched read request
    pub max_poll_opcodes: usize,
    /// Never transmit; process traffic addressed to any participant
    pub listen_only: bool,
    /// Track unmapped registers and sweep the opcode space for more
    pub scan_unknown: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            local_address: DEFAULT_LOCAL_ADDRESS,
            erv_address: DEFAULT_ERV_ADDRESS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_poll_opcodes: DEFAULT_MAX_POLL_OPCODES,
            listen_only: false,
            scan_unknown: false,
        }
    }
}

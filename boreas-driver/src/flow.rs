//! Bus-ownership (flow control) state.
//!
//! The ERV controller owns the line and periodically offers the token
//! to each participant. While we hold the token we may run one
//! request/response exchange at a time; when nothing is left to send
//! the token goes back with a bare offer payload.

use log::warn;

/// Flow-control state machine.
///
/// Tracks token ownership, the strict request/response alternation and
/// the liveness of the remote controller.
#[derive(Debug, Clone)]
pub struct FlowControl {
    /// This node currently holds the transmit token
    holds_control: bool,
    /// A request went out and its response has not arrived yet
    reply_pending: bool,
    /// Timestamp of the last token offer (ms)
    last_control_ms: u32,
    /// The controller is alive and feeding us offers
    ready: bool,
    /// A queued message went out during the current ownership window
    sent_since_acquire: bool,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowControl {
    pub const fn new() -> Self {
        Self {
            holds_control: false,
            reply_pending: false,
            last_control_ms: 0,
            ready: false,
            sent_since_acquire: false,
        }
    }

    /// Handle a token offer.
    ///
    /// Receiving offers at all proves the controller is alive, so this
    /// also marks the link ready. Any outstanding request is considered
    /// answered; the controller never offers mid-exchange.
    pub fn on_control_offer(&mut self, now_ms: u32) {
        self.last_control_ms = now_ms;
        self.holds_control = true;
        self.reply_pending = false;
        self.ready = true;
    }

    /// A response to our outstanding request arrived.
    pub fn clear_reply_pending(&mut self) {
        self.reply_pending = false;
    }

    /// The device is known alive (for example, it answered a ping).
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Note a queued request going out. Further sends are blocked until
    /// the response clears the pending flag.
    pub fn note_request_sent(&mut self) {
        self.reply_pending = true;
        self.sent_since_acquire = true;
    }

    /// Give the token back.
    pub fn release(&mut self) {
        self.holds_control = false;
        self.ready = true;
        self.sent_since_acquire = false;
    }

    /// True while transmission is permitted: the token is ours and no
    /// request is outstanding.
    pub fn can_transmit(&self) -> bool {
        self.holds_control && !self.reply_pending
    }

    /// Liveness check, run once per tick.
    ///
    /// After a full quiet timeout the link is reported down and the
    /// window restarts, so the warning repeats for as long as the bus
    /// stays silent. Token state is left alone; the next offer recovers
    /// everything.
    pub fn check_liveness(&mut self, now_ms: u32, timeout_ms: u32) {
        if now_ms.wrapping_sub(self.last_control_ms) > timeout_ms {
            warn!(
                "ERV has not offered control in over {} ms, communication has likely failed",
                timeout_ms
            );
            self.ready = false;
            self.last_control_ms = now_ms;
        }
    }

    pub fn holds_control(&self) -> bool {
        self.holds_control
    }

    pub fn reply_pending(&self) -> bool {
        self.reply_pending
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_sent_message(&self) -> bool {
        self.sent_since_acquire
    }
}

//! Host-agnostic driver for the Broan ERV serial bus.
//!
//! Everything above the raw byte stream lives here:
//!
//! - Collaborator traits (byte port, state sink)
//! - Incremental frame reader
//! - Field registry with per-field poll cadences
//! - Bus-ownership (flow control) state machine
//! - Bounded outbound queue
//! - Poll, keepalive and discovery schedulers
//! - The per-tick driver entry point
//!
//! The host owns the UART, the clock and the scheduler. Each tick it
//! hands the driver its port, its sink and the current millisecond
//! timestamp; the driver never blocks and never sleeps.

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod flow;
pub mod link;
pub mod queue;
pub mod registry;
pub mod scan;
pub mod traits;

#[cfg(test)]
mod testutil;

//! # Control State
//!
//! Flags and counters which live for the whole run of the node. Each field has one writer:
//!
//! | Field                  | Written by                         |
//! |------------------------|------------------------------------|
//! | `cadence`              | dispatcher                         |
//! | `resync_requested`     | dispatcher sets, control loop clears |
//! | `settings_write_armed` | dispatcher                         |
//! | `inbound_valid`        | control loop                       |
//!
//! The flags are only touched from the control loop's thread so they need no synchronisation.
//! The tick counter, which is shared with the tick source, lives in the scheduler.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Process wide control flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlFlags {
    /// What paces the cycle
    pub cadence: CadenceMode,

    /// Snap the scheduler's frame counter to the tick counter at the end of this cycle
    pub resync_requested: bool,

    /// The remote has entered settings write mode
    pub settings_write_armed: bool,

    /// The inbound frame of this cycle passed every check
    pub inbound_valid: bool,
}

/// Running totals of the faults seen since start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounters {
    /// Inbound frames which failed the checksum or had the wrong length
    pub recv_invalid: u64,

    /// Inbound sequence gaps
    pub seq_skip: u64,

    /// Cycles with no inbound frame
    pub timeouts: u64,

    /// Outbound frames which could not be sent
    pub send_failed: u64,

    /// Cycles which overran their period
    pub overruns: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What paces the control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CadenceMode {
    /// The node's tick source paces the cycle
    BoardDriven,

    /// Inbound frames pace the cycle and the tick wait is skipped
    RemoteDriven,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ControlFlags {
    pub fn new(cadence: CadenceMode) -> Self {
        Self {
            cadence,
            ..Default::default()
        }
    }

    /// Take the pending resync request, clearing it.
    pub fn take_resync(&mut self) -> bool {
        std::mem::replace(&mut self.resync_requested, false)
    }
}

impl Default for CadenceMode {
    fn default() -> Self {
        CadenceMode::BoardDriven
    }
}

impl FaultCounters {
    /// Total of every counter.
    pub fn total(&self) -> u64 {
        self.recv_invalid + self.seq_skip + self.timeouts + self.send_failed + self.overruns
    }
}

impl fmt::Display for FaultCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recv_invalid={} seq_skip={} timeouts={} send_failed={} overruns={}",
            self.recv_invalid, self.seq_skip, self.timeouts, self.send_failed, self.overruns
        )
    }
}

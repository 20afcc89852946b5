//! # Node Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::SocketAddr;
use comms_if::{frame::{Bank, BANK_SLOTS}, net::{parse_addr, SocketOptions}};
use serde::Deserialize;

use crate::{servo_ctrl::{BusType, ServoConfig}, state::CadenceMode};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Highest bus address a channel may use.
pub const MAX_BUS_ADDRESS: u8 = 0x1F;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NodeExecParams {

    /// Datagram link to the remote controller
    pub net: SocketOptions,

    /// Maximum time to wait for an inbound frame each cycle
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Interval between polls of the socket while waiting for a frame
    #[serde(default = "default_recv_poll_us")]
    pub recv_poll_us: u64,

    /// Receive timeouts are not logged for this long after start-up
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,

    /// Cycle period, the interval of the tick source
    pub cycle_period_ms: u64,

    /// Cadence mode at start-up
    #[serde(default)]
    pub cadence: CadenceMode,

    /// Maximum change of an actuator target per cycle, in degrees. Absent for no limit.
    #[serde(default)]
    pub motion_limit_deg: Option<f64>,

    /// Number of consecutive communication failures after which a channel is lost
    pub failure_threshold: u32,

    /// Longest timed pause the remote may request, in milliseconds
    pub max_pause_ms: u32,

    /// Number of cycles between fault summaries in the log. Zero disables the summary.
    #[serde(default)]
    pub fault_report_period: u64,

    /// OR the local input device's buttons into the inbound ones instead of overwriting them
    #[serde(default)]
    pub pad_button_merge: bool,

    /// Run without any bus traffic, with a demonstration motion on the first left channel
    #[serde(default)]
    pub standalone: bool,

    pub trigger: TriggerParams,

    #[serde(default)]
    pub settings: SettingsParams,

    pub left: BankParams,

    pub right: BankParams,
}

/// The single channel trigger action.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerParams {
    pub bank: Bank,

    pub channel: usize,

    /// Deflection of the middle step, in degrees
    pub angle_deg: f64,
}

/// The persistent settings store.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettingsParams {
    /// Path of the settings file. An empty path keeps settings in memory only.
    #[serde(default)]
    pub path: String,

    /// Reject every write to the store
    #[serde(default)]
    pub write_protect: bool,

    /// Replace the channel tables below with the stored servo settings at start-up
    #[serde(default)]
    pub load_at_boot: bool,

    /// Seed the store from the channel tables below at start-up
    #[serde(default)]
    pub write_at_boot: bool,
}

/// One bank of actuators and its bus.
#[derive(Debug, Clone, Deserialize)]
pub struct BankParams {
    #[serde(default)]
    pub bus: BusType,

    /// Serial device of the bus
    #[serde(default)]
    pub device: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// The bus reads back its own requests
    #[serde(default)]
    pub echo: bool,

    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    #[serde(default)]
    pub channels: Vec<ServoConfig>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid network address: {0}")]
    InvalidAddress(comms_if::net::TransportError),

    #[error("The remote address {0} is unspecified")]
    UnspecifiedRemote(SocketAddr),

    #[error("The cycle period must be greater than zero")]
    ZeroCyclePeriod,

    #[error("The failure threshold must be greater than zero")]
    ZeroFailureThreshold,

    #[error("The motion limit must be a finite, non-negative angle, found {0}")]
    InvalidMotionLimit(f64),

    #[error("The {0:?} bank has {1} channels, at most {} are allowed", BANK_SLOTS)]
    TooManyChannels(Bank, usize),

    #[error("Channel {1} of the {0:?} bank has bus address {2}, at most {} is allowed", MAX_BUS_ADDRESS)]
    InvalidBusAddress(Bank, usize, u8),

    #[error("Channel {1} of the {0:?} bank has rotation sign {2}, expected 1 or -1")]
    InvalidRotationSign(Bank, usize, i8),

    #[error("The trigger channel {1} does not exist in the {0:?} bank")]
    InvalidTriggerChannel(Bank, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NodeExecParams {

    /// Determines if the parameters are valid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        parse_addr(&self.net.bind_addr)
            .map_err(ConfigValidationError::InvalidAddress)?;
        let remote = parse_addr(&self.net.remote_addr)
            .map_err(ConfigValidationError::InvalidAddress)?;

        if remote.ip().is_unspecified() {
            return Err(ConfigValidationError::UnspecifiedRemote(remote));
        }

        if self.cycle_period_ms == 0 {
            return Err(ConfigValidationError::ZeroCyclePeriod);
        }

        if self.failure_threshold == 0 {
            return Err(ConfigValidationError::ZeroFailureThreshold);
        }

        if let Some(l) = self.motion_limit_deg {
            if !l.is_finite() || l < 0.0 {
                return Err(ConfigValidationError::InvalidMotionLimit(l));
            }
        }

        for &side in Bank::ALL.iter() {
            let bank = self.bank(side);

            if bank.channels.len() > BANK_SLOTS {
                return Err(ConfigValidationError::TooManyChannels(side, bank.channels.len()));
            }

            for (i, ch) in bank.channels.iter().enumerate() {
                if ch.address > MAX_BUS_ADDRESS {
                    return Err(ConfigValidationError::InvalidBusAddress(side, i, ch.address));
                }
                if ch.sign != 1 && ch.sign != -1 {
                    return Err(ConfigValidationError::InvalidRotationSign(side, i, ch.sign));
                }
            }
        }

        if self.trigger.channel >= self.bank(self.trigger.bank).channels.len() {
            return Err(ConfigValidationError::InvalidTriggerChannel(
                self.trigger.bank, 
                self.trigger.channel
            ));
        }

        Ok(())
    }

    /// The parameters of one bank.
    pub fn bank(&self, side: Bank) -> &BankParams {
        match side {
            Bank::Left => &self.left,
            Bank::Right => &self.right,
        }
    }

    /// Mutable parameters of one bank.
    pub fn bank_mut(&mut self, side: Bank) -> &mut BankParams {
        match side {
            Bank::Left => &mut self.left,
            Bank::Right => &mut self.right,
        }
    }
}

impl Default for BankParams {
    fn default() -> Self {
        Self {
            bus: BusType::None,
            device: String::new(),
            baud: default_baud(),
            echo: false,
            reply_timeout_ms: default_reply_timeout_ms(),
            channels: Vec::new(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_recv_timeout_ms() -> u64 {
    10
}

fn default_recv_poll_us() -> u64 {
    100
}

fn default_startup_grace_ms() -> u64 {
    3000
}

fn default_baud() -> u32 {
    1_250_000
}

fn default_reply_timeout_ms() -> u64 {
    2
}

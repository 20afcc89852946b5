//! # Master Commands
//!
//! Command codes carried in the frame's `MASTER` slot. Codes in `1..=999` carry the frame length
//! and mean normal operation. Any code not listed here is ignored.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A decoded master command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCommand {
    /// Normal operation, the value is the frame length the sender uses.
    FrameLength(i16),

    /// Release every actuator.
    TorqueAllOff,

    /// Capture the current raw yaw as the yaw origin.
    YawCalibrate,

    /// Clear every channel failure counter and lost status.
    ClearFaults,

    /// The node's own tick paces the cycle.
    CadenceBoardDriven,

    /// Inbound frames pace the cycle.
    CadenceRemoteDriven,

    /// Resynchronise the scheduler's frame counter with the tick counter.
    CadenceResync,

    /// Pause for the number of milliseconds carried in the `STOP_MS` slot.
    TimedPause,

    /// Arm writing to the settings store.
    SettingsEnterWrite,

    /// Disarm writing to the settings store.
    SettingsExitWrite,

    /// Begin a trim setting session.
    StartTrimSetting,

    /// Save the frame's bank slots as the servo settings.
    SettingsSaveTrim,

    /// Reload the servo settings into the banks.
    SettingsLoadTrim,

    /// Send one settings slot back in the outbound frame.
    SettingsSend(SettingsSlot),

    /// Zero every target and previous target.
    ZeroPose,

    /// Run the trigger motion on the configured channel.
    Trigger,
}

/// Named slots of the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingsSlot {
    Board,
    Servo,
    User,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MasterCommand {
    /// Decode a `MASTER` slot value, returning `None` for codes without a meaning.
    pub fn from_code(code: i16) -> Option<Self> {
        use MasterCommand::*;

        let cmd = match code {
            1..=999 => FrameLength(code),
            0 => TorqueAllOff,
            10002 => YawCalibrate,
            10004 => ClearFaults,
            10005 => CadenceBoardDriven,
            10006 => CadenceRemoteDriven,
            10007 => CadenceResync,
            10008 => TimedPause,
            10009 => SettingsEnterWrite,
            10010 => SettingsExitWrite,
            10100 => StartTrimSetting,
            10101 => SettingsSaveTrim,
            10102 => SettingsLoadTrim,
            10200 => SettingsSend(SettingsSlot::Board),
            10201 => SettingsSend(SettingsSlot::Servo),
            10202 => SettingsSend(SettingsSlot::User),
            30001 => ZeroPose,
            30002 => Trigger,
            _ => return None,
        };

        Some(cmd)
    }

    /// The `MASTER` slot value of this command.
    pub fn code(&self) -> i16 {
        use MasterCommand::*;

        match self {
            FrameLength(len) => *len,
            TorqueAllOff => 0,
            YawCalibrate => 10002,
            ClearFaults => 10004,
            CadenceBoardDriven => 10005,
            CadenceRemoteDriven => 10006,
            CadenceResync => 10007,
            TimedPause => 10008,
            SettingsEnterWrite => 10009,
            SettingsExitWrite => 10010,
            StartTrimSetting => 10100,
            SettingsSaveTrim => 10101,
            SettingsLoadTrim => 10102,
            SettingsSend(slot) => 10200 + slot.offset(),
            ZeroPose => 30001,
            Trigger => 30002,
        }
    }
}

impl SettingsSlot {
    fn offset(self) -> i16 {
        match self {
            SettingsSlot::Board => 0,
            SettingsSlot::Servo => 1,
            SettingsSlot::User => 2,
        }
    }
}

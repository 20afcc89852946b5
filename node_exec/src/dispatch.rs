//! # Command Dispatcher
//!
//! Master commands carried in the inbound frame are acted on in three ordered groups each cycle:
//!
//! | Group | Runs                          | Commands |
//! |-------|-------------------------------|----------|
//! | 1     | before the sensor merge       | fault clear, board driven cadence, settings write mode, trim save and load |
//! | 2     | after the sensor merge        | torque off, yaw calibrate, remote driven cadence, resync, timed pause, zero pose, trigger |
//! | 3     | at the end of the cycle       | torque off, zero pose, trim setting, settings send |
//!
//! Every group is gated on the validity of this cycle's inbound frame. When the frame is not
//! valid no group changes anything. Codes no group handles are ignored.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    cmd::{MasterCommand, SettingsSlot},
    frame::{idx, Bank, WireFrame},
};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, warn};

use crate::{
    actuator::Banks,
    inputs::{SensorInputs, SensorMerge},
    params::{NodeExecParams, TriggerParams},
    settings::{decode_servo_slot, SettingsError, SettingsStore},
    state::{CadenceMode, ControlFlags},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Delays after each of the three trigger steps, in milliseconds.
const TRIGGER_DELAYS_MS: [u32; 3] = [200, 500, 1000];

/// First and one past the last slot of the bank region of the frame.
const BANK_REGION: (usize, usize) = (idx::L_ORIGIN, idx::R_ORIGIN + 30);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Acts on the master command of the frame.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    trigger: TriggerParams,

    max_pause_ms: u32,

    failure_threshold: u32,

    /// No bus traffic is made in standalone mode
    standalone: bool,
}

/// Everything a command may act on.
pub struct DispatchCtx<'a> {
    /// The outbound frame, holding the inbound command
    pub frame: &'a mut WireFrame,

    pub banks: &'a mut Banks,

    pub flags: &'a mut ControlFlags,

    pub settings: &'a mut dyn SettingsStore,

    pub merge: &'a mut SensorMerge,

    pub inputs: &'a SensorInputs,

    pub delay: &'a mut dyn DelayMs<u32>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandDispatcher {
    pub fn new(params: &NodeExecParams) -> Self {
        Self {
            trigger: params.trigger.clone(),
            max_pause_ms: params.max_pause_ms,
            failure_threshold: params.failure_threshold,
            standalone: params.standalone,
        }
    }

    /// Commands which must run before the sensor merge.
    ///
    /// Returns true if the command was handled.
    pub fn group_1(&self, inbound_valid: bool, ctx: &mut DispatchCtx) -> bool {
        let cmd = match command(inbound_valid, ctx.frame) {
            Some(c) => c,
            None => return false
        };

        match cmd {
            MasterCommand::ClearFaults => {
                ctx.banks.clear_faults();
                ctx.frame.set_fault_code(0);
                info!("Channel faults cleared");
            },
            MasterCommand::CadenceBoardDriven => {
                set_cadence(ctx.flags, CadenceMode::BoardDriven);
            },
            MasterCommand::SettingsEnterWrite => {
                ctx.flags.settings_write_armed = true;
                ctx.flags.resync_requested = true;
                info!("Settings write mode entered");
            },
            MasterCommand::SettingsExitWrite => {
                ctx.flags.settings_write_armed = false;
                info!("Settings write mode exited");
            },
            MasterCommand::SettingsSaveTrim => {
                if let Err(e) = save_trim(ctx) {
                    warn!("Could not save the servo settings: {}", e);
                }
            },
            MasterCommand::SettingsLoadTrim => {
                match load_servo_settings(ctx) {
                    Ok(()) => {
                        ctx.banks.home();
                        ctx.frame.zero_all_targets();
                        ctx.flags.resync_requested = true;
                        info!("Servo settings reloaded");
                    },
                    Err(e) => warn!("Could not load the servo settings: {}", e)
                }
            },
            _ => return false
        }

        true
    }

    /// Commands which run after the sensor merge.
    ///
    /// Returns true if the command was handled.
    pub fn group_2(&self, inbound_valid: bool, ctx: &mut DispatchCtx) -> bool {
        let cmd = match command(inbound_valid, ctx.frame) {
            Some(c) => c,
            None => return false
        };

        match cmd {
            MasterCommand::TorqueAllOff => {
                ctx.frame.release_all();
            },
            MasterCommand::YawCalibrate => {
                ctx.merge.calibrate_yaw(ctx.inputs);
            },
            MasterCommand::CadenceRemoteDriven => {
                set_cadence(ctx.flags, CadenceMode::RemoteDriven);
            },
            MasterCommand::CadenceResync => {
                ctx.flags.resync_requested = true;
            },
            MasterCommand::TimedPause => {
                let ms = (ctx.frame.slot(idx::STOP_MS).max(0) as u32).min(self.max_pause_ms);
                debug!("Pausing for {} ms", ms);
                ctx.delay.delay_ms(ms);
                ctx.flags.resync_requested = true;
            },
            MasterCommand::ZeroPose => {
                ctx.frame.zero_all_targets();
                ctx.banks.home();
            },
            MasterCommand::Trigger => {
                self.run_trigger(ctx);
            },
            _ => return false
        }

        true
    }

    /// Commands which have the final say on the outbound frame.
    ///
    /// Returns true if the command was handled.
    pub fn group_3(&self, inbound_valid: bool, ctx: &mut DispatchCtx) -> bool {
        let cmd = match command(inbound_valid, ctx.frame) {
            Some(c) => c,
            None => return false
        };

        match cmd {
            MasterCommand::TorqueAllOff => {
                ctx.frame.release_all();
            },
            MasterCommand::ZeroPose => {
                ctx.frame.zero_all_targets();
            },
            MasterCommand::StartTrimSetting => {
                if let Err(e) = self.start_trim_setting(ctx) {
                    warn!("Could not start trim setting: {}", e);
                }
            },
            MasterCommand::SettingsSend(slot) => {
                match ctx.settings.load() {
                    Ok(snapshot) => {
                        *ctx.frame = *snapshot.slot(slot);
                        ctx.frame.set_master(cmd.code());
                        debug!("Sending the {:?} settings", slot);
                    },
                    Err(e) => warn!("Could not load the {:?} settings: {}", slot, e)
                }
            },
            _ => return false
        }

        true
    }

    /// Move the trigger channel through rest, deflection and rest again.
    fn run_trigger(&self, ctx: &mut DispatchCtx) {
        if ctx.inputs.inhibited() {
            info!("Trigger inhibited");
            return;
        }

        if self.standalone {
            debug!("Trigger ignored in standalone mode");
            return;
        }

        let bank = ctx.banks.get_mut(self.trigger.bank);
        let steps = [0.0, self.trigger.angle_deg, 0.0];

        for (&deg, &delay) in steps.iter().zip(TRIGGER_DELAYS_MS.iter()) {
            if let Err(e) = bank.move_channel(self.trigger.channel, deg, self.failure_threshold) {
                warn!(
                    "Trigger step to {} deg on {:?} channel {} failed: {}",
                    deg, self.trigger.bank, self.trigger.channel, e
                );
            }
            ctx.delay.delay_ms(delay);
        }

        ctx.flags.resync_requested = true;
        info!("Trigger complete");
    }

    /// Bring every channel to its trim with the trim moved into the target, and send the servo
    /// settings back.
    fn start_trim_setting(&self, ctx: &mut DispatchCtx) -> Result<(), SettingsError> {
        let snapshot = ctx.settings.load()?;
        load_into_banks(ctx.banks, &snapshot.servo);

        for bank in ctx.banks.iter_mut() {
            for ch in bank.channels_mut() {
                ch.previous = ch.target;
                ch.target = 0.0;
            }
        }
        self.drive(ctx);

        for bank in ctx.banks.iter_mut() {
            for ch in bank.channels_mut() {
                ch.target = ch.config.trim_deg;
                ch.config.trim_deg = 0.0;
            }
        }
        self.drive(ctx);

        *ctx.frame = snapshot.servo;
        ctx.frame.set_master(MasterCommand::SettingsSend(SettingsSlot::Servo).code());

        info!("Trim setting started");
        Ok(())
    }

    fn drive(&self, ctx: &mut DispatchCtx) {
        if self.standalone {
            return;
        }

        let failed = ctx.banks.drive(ctx.frame, self.failure_threshold);
        if failed > 0 {
            debug!("{} channels failed during trim setting", failed);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The command to act on, or `None` if the inbound frame was not valid or holds no command.
fn command(inbound_valid: bool, frame: &WireFrame) -> Option<MasterCommand> {
    if !inbound_valid {
        return None;
    }

    MasterCommand::from_code(frame.master())
}

fn set_cadence(flags: &mut ControlFlags, mode: CadenceMode) {
    if flags.cadence != mode {
        info!("Cadence mode set to {:?}", mode);
    }

    flags.cadence = mode;
    flags.resync_requested = true;
}

/// Copy the frame's bank region into the stored servo settings.
fn save_trim(ctx: &mut DispatchCtx) -> Result<(), SettingsError> {
    let mut snapshot = ctx.settings.load()?;

    for i in BANK_REGION.0..BANK_REGION.1 {
        snapshot.servo.set_slot(i, ctx.frame.slot(i));
    }
    snapshot.servo.write_checksum();

    ctx.settings.write(&snapshot)?;
    info!("Servo settings saved");

    Ok(())
}

fn load_servo_settings(ctx: &mut DispatchCtx) -> Result<(), SettingsError> {
    let snapshot = ctx.settings.load()?;
    load_into_banks(ctx.banks, &snapshot.servo);
    Ok(())
}

/// Replace the static configuration of every channel with the stored one.
fn load_into_banks(banks: &mut Banks, servo: &WireFrame) {
    for &side in Bank::ALL.iter() {
        let bank = banks.get_mut(side);
        let configs = decode_servo_slot(servo, side, bank.channels().len());
        bank.set_configs(&configs);
    }
}

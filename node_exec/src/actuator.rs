//! # Actuators
//!
//! Runtime state of every actuator channel, grouped into the two banks carried by the frame. A
//! channel counts consecutive communication failures; once the count reaches the configured
//! threshold the channel is lost and stays lost until the faults are explicitly cleared.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    frame::{Bank, WireFrame, BANK_SLOTS, CMD_POSITION},
    status::FaultCode,
};
use log::{debug, warn};

use crate::{
    motion::MotionLimiter,
    servo_ctrl::{ActuatorLink, ServoConfig, ServoError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One actuator and its runtime state.
#[derive(Debug, Clone)]
pub struct ActuatorChannel {
    pub config: ServoConfig,

    /// Current target in degrees
    pub target: f64,

    /// Target of the previous cycle in degrees
    pub previous: f64,

    failures: u32,

    status: ChannelStatus,
}

/// A group of channels sharing one link.
pub struct ActuatorBank {
    side: Bank,

    channels: Vec<ActuatorChannel>,

    link: Box<dyn ActuatorLink>,
}

/// Both banks.
pub struct Banks {
    pub left: ActuatorBank,
    pub right: ActuatorBank,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Ok,
    Lost,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActuatorChannel {
    pub fn new(config: ServoConfig) -> Self {
        Self {
            config,
            target: 0.0,
            previous: 0.0,
            failures: 0,
            status: ChannelStatus::Ok,
        }
    }

    /// Number of consecutive communication failures, at most the threshold.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_lost(&self) -> bool {
        self.status == ChannelStatus::Lost
    }

    /// Issue this cycle's command over `link`.
    ///
    /// A position command moves to the current target, anything else releases the actuator. On
    /// success the target becomes the angle the actuator reported. On a failure the target falls
    /// back to the previous cycle's target. The applied angle is returned with the failure, if any.
    pub fn drive(
        &mut self, 
        link: &mut dyn ActuatorLink, 
        command: i16, 
        threshold: u32
    ) -> (f64, Option<ServoError>) {
        let result = if command == CMD_POSITION {
            link.set_position(&self.config, self.target)
        } else {
            link.release(&self.config, self.target)
        };

        match result {
            Ok(applied) => {
                self.note_success();
                self.target = applied;
                (applied, None)
            },
            Err(e) => {
                self.note_failure(threshold);
                self.target = self.previous;
                (self.previous, Some(e))
            }
        }
    }

    /// Zero the failure count and mark the channel Ok.
    pub fn clear_fault(&mut self) {
        self.failures = 0;
        self.status = ChannelStatus::Ok;
    }

    /// Zero the target and previous target.
    pub fn home(&mut self) {
        self.target = 0.0;
        self.previous = 0.0;
    }

    /// A reply was received. A lost channel stays lost until its fault is cleared.
    fn note_success(&mut self) {
        self.failures = 0;
    }

    fn note_failure(&mut self, threshold: u32) {
        self.failures = self.failures.saturating_add(1).min(threshold);

        if self.failures >= threshold && self.status == ChannelStatus::Ok {
            self.status = ChannelStatus::Lost;
        }
    }
}

impl ActuatorBank {
    pub fn new(side: Bank, configs: &[ServoConfig], link: Box<dyn ActuatorLink>) -> Self {
        Self {
            side,
            channels: configs.iter().copied().map(ActuatorChannel::new).collect(),
            link,
        }
    }

    pub fn side(&self) -> Bank {
        self.side
    }

    pub fn channels(&self) -> &[ActuatorChannel] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [ActuatorChannel] {
        &mut self.channels
    }

    /// Static configuration of every channel.
    pub fn configs(&self) -> Vec<ServoConfig> {
        self.channels.iter().map(|c| c.config).collect()
    }

    /// Replace the static configuration of the channels, keeping their runtime state.
    ///
    /// Channels beyond the end of `configs` are left untouched.
    pub fn set_configs(&mut self, configs: &[ServoConfig]) {
        for (ch, config) in self.channels.iter_mut().zip(configs.iter()) {
            ch.config = *config;
        }
    }

    /// Shift the targets into the previous targets and take new targets from the frame, limited
    /// by `limiter`.
    pub fn load_targets(&mut self, frame: &WireFrame, limiter: &MotionLimiter<f64>) {
        let side = self.side;
        for (i, ch) in self.channels.iter_mut().enumerate() {
            ch.previous = ch.target;
            ch.target = limiter.apply(ch.previous, frame.target_deg(side, i));
        }
    }

    /// Drive every mounted channel with the command held for it in `frame`.
    ///
    /// Returns the number of channels which failed to reply.
    pub fn drive(&mut self, frame: &WireFrame, threshold: u32) -> usize {
        let side = self.side;
        let mut failed = 0;

        for (i, ch) in self.channels.iter_mut().enumerate() {
            if !ch.config.mounted {
                continue;
            }

            let was_lost = ch.is_lost();
            let (_, fault) = ch.drive(self.link.as_mut(), frame.command(side, i), threshold);

            if let Some(e) = fault {
                failed += 1;
                debug!("{:?} channel {} failed: {}", side, i, e);

                if ch.is_lost() && !was_lost {
                    warn!("{:?} channel {} lost after {} failures", side, i, ch.failures());
                }
            }
        }

        failed
    }

    /// Move one channel to `deg` outside of the normal cycle. The channel's targets are not
    /// changed but its failures are counted.
    pub fn move_channel(
        &mut self, 
        index: usize, 
        deg: f64, 
        threshold: u32
    ) -> Result<f64, ServoError> {
        let side = self.side;
        let ch = match self.channels.get_mut(index) {
            Some(ch) if ch.config.mounted => ch,
            _ => {
                debug!("{:?} channel {} is not mounted, not moving", side, index);
                return Ok(deg);
            }
        };

        match self.link.set_position(&ch.config, deg) {
            Ok(applied) => {
                ch.note_success();
                Ok(applied)
            },
            Err(e) => {
                ch.note_failure(threshold);
                Err(e)
            }
        }
    }

    /// Write every channel's target into the frame.
    pub fn write_targets(&self, frame: &mut WireFrame) {
        for (i, ch) in self.channels.iter().enumerate() {
            frame.set_target_deg(self.side, i, ch.target);
        }
    }

    pub fn clear_faults(&mut self) {
        self.channels.iter_mut().for_each(ActuatorChannel::clear_fault);
    }

    pub fn home(&mut self) {
        self.channels.iter_mut().for_each(ActuatorChannel::home);
    }
}

impl Banks {
    pub fn new(left: ActuatorBank, right: ActuatorBank) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Bank) -> &ActuatorBank {
        match side {
            Bank::Left => &self.left,
            Bank::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Bank) -> &mut ActuatorBank {
        match side {
            Bank::Left => &mut self.left,
            Bank::Right => &mut self.right,
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActuatorBank> {
        std::iter::once(&mut self.left).chain(std::iter::once(&mut self.right))
    }

    /// The single fault code reported in the frame.
    ///
    /// Channels are scanned by index, left before right at each index. Only the last lost
    /// channel found is reported.
    pub fn fault_code(&self) -> FaultCode {
        let mut code = FaultCode::NONE;

        for i in 0..BANK_SLOTS {
            for &side in Bank::ALL.iter() {
                if let Some(ch) = self.get(side).channels().get(i) {
                    if ch.is_lost() {
                        code = FaultCode::channel(side, i);
                    }
                }
            }
        }

        code
    }

    pub fn clear_faults(&mut self) {
        self.iter_mut().for_each(ActuatorBank::clear_faults);
    }

    pub fn home(&mut self) {
        self.iter_mut().for_each(ActuatorBank::home);
    }

    pub fn load_targets(&mut self, frame: &WireFrame, limiter: &MotionLimiter<f64>) {
        self.iter_mut().for_each(|b| b.load_targets(frame, limiter));
    }

    /// Drive both banks, returning the number of channels which failed.
    pub fn drive(&mut self, frame: &WireFrame, threshold: u32) -> usize {
        self.iter_mut().map(|b| b.drive(frame, threshold)).sum()
    }

    pub fn write_targets(&self, frame: &mut WireFrame) {
        self.left.write_targets(frame);
        self.right.write_targets(frame);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{mounted, ScriptedLink};
    use comms_if::frame::CMD_RELEASE;

    const THRESHOLD: u32 = 5;

    fn bank(side: Bank, link: ScriptedLink, n: usize) -> ActuatorBank {
        ActuatorBank::new(side, &vec![mounted(0); n], Box::new(link))
    }

    #[test]
    fn test_failure_falls_back_to_previous() {
        let link = ScriptedLink::new();
        link.fail_next(1);

        let mut ch = ActuatorChannel::new(mounted(1));
        let mut l = link.clone();
        ch.previous = 10.0;
        ch.target = 20.0;

        let (applied, fault) = ch.drive(&mut l, CMD_POSITION, THRESHOLD);
        assert_eq!(applied, 10.0);
        assert!(fault.is_some());
        assert_eq!(ch.target, 10.0);
        assert_eq!(ch.failures(), 1);

        ch.previous = 10.0;
        ch.target = 20.0;
        let (applied, fault) = ch.drive(&mut l, CMD_POSITION, THRESHOLD);
        assert_eq!(applied, 20.0);
        assert!(fault.is_none());
        assert_eq!(ch.failures(), 0);
    }

    #[test]
    fn test_release_command() {
        let link = ScriptedLink::new();
        let mut l = link.clone();
        let mut ch = ActuatorChannel::new(mounted(1));
        ch.target = 5.0;

        ch.drive(&mut l, CMD_RELEASE, THRESHOLD);
        ch.drive(&mut l, 7, THRESHOLD);
        assert_eq!(link.releases(), 2);
        assert_eq!(link.positions(), 0);
    }

    #[test]
    fn test_lost_after_threshold_and_sticky() {
        let link = ScriptedLink::new();
        let mut banks = Banks::new(
            bank(Bank::Left, link.clone(), 4),
            bank(Bank::Right, ScriptedLink::new(), 4)
        );
        let mut frame = WireFrame::zeroed();
        frame.set_command(Bank::Left, 3, CMD_POSITION);

        // Only channel 3 is commanded, the rest of the left bank releases. All fail.
        for n in 1..=THRESHOLD {
            link.fail_next(4);
            banks.drive(&frame, THRESHOLD);
            assert_eq!(banks.left.channels()[3].failures(), n);
        }
        assert!(banks.left.channels()[3].is_lost());
        assert_eq!(banks.fault_code(), FaultCode(103));

        // The count is clamped at the threshold
        link.fail_next(4);
        banks.drive(&frame, THRESHOLD);
        assert_eq!(banks.left.channels()[3].failures(), THRESHOLD);

        // A success does not clear lost
        banks.drive(&frame, THRESHOLD);
        assert_eq!(banks.left.channels()[3].failures(), 0);
        assert!(banks.left.channels()[3].is_lost());
        assert_eq!(banks.fault_code(), FaultCode(103));

        banks.clear_faults();
        assert_eq!(banks.left.channels()[3].status(), ChannelStatus::Ok);
        assert_eq!(banks.left.channels()[3].failures(), 0);
        assert_eq!(banks.fault_code(), FaultCode::NONE);
    }

    #[test]
    fn test_fault_code_last_found_wins() {
        let mut banks = Banks::new(
            bank(Bank::Left, ScriptedLink::new(), 15),
            bank(Bank::Right, ScriptedLink::new(), 15)
        );

        banks.left.channels_mut()[7].note_failure(1);
        banks.right.channels_mut()[2].note_failure(1);
        assert_eq!(banks.fault_code(), FaultCode(107));

        banks.right.channels_mut()[7].note_failure(1);
        assert_eq!(banks.fault_code(), FaultCode(207));
    }

    #[test]
    fn test_unmounted_channels_are_not_driven() {
        let link = ScriptedLink::new();
        let mut b = ActuatorBank::new(
            Bank::Right,
            &[ServoConfig::unmounted(), mounted(4)],
            Box::new(link.clone())
        );

        let mut frame = WireFrame::zeroed();
        frame.set_command(Bank::Right, 0, CMD_POSITION);
        frame.set_command(Bank::Right, 1, CMD_POSITION);
        b.drive(&frame, THRESHOLD);

        assert_eq!(link.positions(), 1);
    }

    #[test]
    fn test_load_targets_limited() {
        let mut b = bank(Bank::Left, ScriptedLink::new(), 2);
        let mut frame = WireFrame::zeroed();
        frame.set_target_deg(Bank::Left, 0, 50.0);
        frame.set_target_deg(Bank::Left, 1, -3.0);

        b.load_targets(&frame, &MotionLimiter::new(Some(10.0)));
        assert_eq!(b.channels()[0].target, 10.0);
        assert_eq!(b.channels()[1].target, -3.0);

        b.load_targets(&frame, &MotionLimiter::new(Some(10.0)));
        assert_eq!(b.channels()[0].previous, 10.0);
        assert_eq!(b.channels()[0].target, 20.0);

        let mut out = WireFrame::zeroed();
        b.write_targets(&mut out);
        assert_eq!(out.target_deg(Bank::Left, 0), 20.0);
        assert_eq!(out.target_deg(Bank::Left, 1), -3.0);
    }

    #[test]
    fn test_move_channel_counts_failures() {
        let link = ScriptedLink::new();
        let mut b = bank(Bank::Left, link.clone(), 1);
        b.channels_mut()[0].target = 4.0;

        link.fail_next(1);
        assert!(b.move_channel(0, 30.0, THRESHOLD).is_err());
        assert_eq!(b.channels()[0].failures(), 1);

        assert_eq!(b.move_channel(0, 30.0, THRESHOLD).unwrap(), 30.0);
        assert_eq!(b.channels()[0].failures(), 0);
        assert_eq!(b.channels()[0].target, 4.0);

        // Missing channels are skipped
        assert_eq!(b.move_channel(9, 30.0, THRESHOLD).unwrap(), 30.0);
    }
}

//! # Control Loop
//!
//! One cycle of the node, run back to back:
//!
//! 1. Receive a frame, waiting no longer than the receive timeout
//! 2. Check the frame's checksum, and on success take it as the outbound frame
//! 3. Check the frame's sequence counter
//! 4. Dispatch group 1 commands
//! 5. Merge the sensor and input device snapshots into the frame
//! 6. Dispatch group 2 commands
//! 7. Load and limit the actuator targets
//! 8. Release everything if the inhibit switch is asserted
//! 9. Drive the actuators and write the applied targets back into the frame
//! 10. Dispatch group 3 commands
//! 11. Stamp the sequence counter, status and checksum and send the frame
//! 12. Wait for the next tick, or resynchronise the scheduler
//!
//! No fault inside a cycle stops the loop. Faults are reported in the status slot of the outbound
//! frame and counted in the [`FaultCounters`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    f64::consts::PI,
    time::{Duration, Instant},
};
use comms_if::{
    frame::WireFrame,
    net::FrameTransport,
    seq::{SeqOutcome, SequenceTracker},
    status::StatusBits,
};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info, trace, warn};

use crate::{
    actuator::Banks,
    dispatch::{CommandDispatcher, DispatchCtx},
    frame_server::{FrameServer, RecvOutcome},
    inputs::{SensorInputs, SensorMerge},
    motion::MotionLimiter,
    params::NodeExecParams,
    scheduler::{FrameScheduler, TickCounter, WaitOutcome},
    settings::SettingsStore,
    state::{CadenceMode, ControlFlags, FaultCounters},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Amplitude of the standalone demonstration motion, in degrees.
const STANDALONE_AMPLITUDE_DEG: f64 = 30.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The node's control loop.
pub struct ControlLoop<T> {
    server: FrameServer<T>,

    /// Frame sent to the remote at the end of each cycle
    outbound: WireFrame,

    /// Tracks the remote's sequence counter, seeded by the first valid frame
    tracker: Option<SequenceTracker>,

    /// Sequence counter of sent frames
    send_seq: u16,

    dispatcher: CommandDispatcher,

    banks: Banks,

    limiter: MotionLimiter<f64>,

    flags: ControlFlags,

    counters: FaultCounters,

    scheduler: FrameScheduler,

    inputs: SensorInputs,

    merge: SensorMerge,

    settings: Box<dyn SettingsStore>,

    delay: Box<dyn DelayMs<u32>>,

    failure_threshold: u32,

    standalone: bool,

    fault_report_period: u64,

    /// Receive timeouts are not logged until this much time has passed
    startup_grace: Duration,

    start: Instant,

    /// Number of cycles started
    cycle_count: u64,

    /// Status bits raised by the previous cycle, reported in this one
    carried: StatusBits,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Group {
    One,
    Two,
    Three,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: FrameTransport> ControlLoop<T> {
    pub fn new(
        params: &NodeExecParams,
        transport: T,
        banks: Banks,
        settings: Box<dyn SettingsStore>,
        inputs: SensorInputs,
        ticks: TickCounter,
        delay: Box<dyn DelayMs<u32>>,
    ) -> Self {
        Self {
            server: FrameServer::new(transport, params),
            outbound: WireFrame::default(),
            tracker: None,
            send_seq: 0,
            dispatcher: CommandDispatcher::new(params),
            banks,
            limiter: MotionLimiter::new(params.motion_limit_deg),
            flags: ControlFlags::new(params.cadence),
            counters: FaultCounters::default(),
            scheduler: FrameScheduler::new(ticks),
            inputs,
            merge: SensorMerge::new(params.pad_button_merge),
            settings,
            delay,
            failure_threshold: params.failure_threshold,
            standalone: params.standalone,
            fault_report_period: params.fault_report_period,
            startup_grace: Duration::from_millis(params.startup_grace_ms),
            start: Instant::now(),
            cycle_count: 0,
            carried: StatusBits::empty(),
        }
    }

    /// Run cycles forever.
    pub fn run(&mut self) -> ! {
        info!("Control loop started in {:?} cadence", self.flags.cadence);

        loop {
            self.cycle();
        }
    }

    /// Run one full cycle.
    pub fn cycle(&mut self) {
        self.scheduler.begin_cycle();
        self.cycle_count += 1;

        // ---- RECEIVE ----

        let received = self.receive();

        self.flags.inbound_valid = received && self.check_sequence();

        // ---- COMMANDS AND INPUTS ----

        self.dispatch(Group::One);

        self.merge.merge(&self.inputs, &mut self.outbound);

        self.dispatch(Group::Two);

        // ---- ACTUATION ----

        self.banks.load_targets(&self.outbound, &self.limiter);

        if self.inputs.inhibited() {
            trace!("Inhibit asserted, releasing all actuators");
            self.outbound.release_all();
        }

        if self.standalone {
            let deg = STANDALONE_AMPLITUDE_DEG * (self.cycle_count as f64 * PI / 180.0).sin();
            if let Some(ch) = self.banks.left.channels_mut().first_mut() {
                ch.target = deg;
            }
        }
        else {
            let failed = self.banks.drive(&self.outbound, self.failure_threshold);
            if failed > 0 {
                trace!("{} channels failed to reply", failed);
            }
        }

        self.banks.write_targets(&mut self.outbound);

        self.dispatch(Group::Three);

        // ---- SEND ----

        self.outbound.set_seq(self.send_seq);
        self.send_seq = self.send_seq.wrapping_add(1);
        self.outbound.set_fault_code(self.banks.fault_code().0);
        self.outbound.set_status(StatusBits::SEND_FAILED | StatusBits::CYCLE_OVERRUN, false);
        self.outbound.set_status(self.carried, true);
        self.outbound.write_checksum();

        self.carried = StatusBits::empty();

        if let Err(e) = self.server.send(&self.outbound) {
            warn!("Could not send frame: {}", e);
            self.counters.send_failed += 1;
            self.carried |= StatusBits::SEND_FAILED;
        }

        self.report_faults();

        // ---- CADENCE ----

        self.wait_for_tick();
    }

    pub fn outbound(&self) -> &WireFrame {
        &self.outbound
    }

    pub fn banks(&self) -> &Banks {
        &self.banks
    }

    pub fn banks_mut(&mut self) -> &mut Banks {
        &mut self.banks
    }

    pub fn flags(&self) -> &ControlFlags {
        &self.flags
    }

    pub fn counters(&self) -> &FaultCounters {
        &self.counters
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Receive and checksum the inbound frame. Returns true if a good frame was taken as the
    /// outbound frame.
    fn receive(&mut self) -> bool {
        match self.server.receive() {
            RecvOutcome::Received(frame) if frame.validate() => {
                self.outbound = frame;
                self.outbound.set_status(StatusBits::RECV_INVALID, false);
                true
            },
            RecvOutcome::Received(_) => {
                self.reject_inbound("checksum mismatch");
                false
            },
            RecvOutcome::Malformed(len) => {
                self.reject_inbound(&format!("{} byte datagram", len));
                false
            },
            RecvOutcome::Timeout => {
                self.counters.timeouts += 1;
                if self.start.elapsed() >= self.startup_grace {
                    warn!("No frame received this cycle");
                }
                else {
                    trace!("No frame received this cycle");
                }
                false
            },
            RecvOutcome::Failed(e) => {
                self.counters.timeouts += 1;
                warn!("Could not receive frame: {}", e);
                false
            }
        }
    }

    fn reject_inbound(&mut self, reason: &str) {
        self.counters.recv_invalid += 1;
        self.outbound.set_status(StatusBits::RECV_INVALID, true);
        debug!("Inbound frame rejected: {}", reason);
    }

    /// Check the sequence counter of the frame just received. Returns true if it was in order.
    fn check_sequence(&mut self) -> bool {
        let received = self.outbound.seq();

        let outcome = match self.tracker {
            Some(ref mut t) => t.observe(received),
            None => {
                let mut t = SequenceTracker::new(received);
                let outcome = t.observe(received);
                self.tracker = Some(t);
                outcome
            }
        };

        match outcome {
            SeqOutcome::InOrder => {
                self.outbound.set_status(StatusBits::SEQ_SKIP, false);
                true
            },
            SeqOutcome::Gap { expected, received } => {
                self.outbound.set_status(StatusBits::SEQ_SKIP, true);
                self.counters.seq_skip += 1;
                debug!("Sequence gap: expected {}, received {}", expected, received);
                false
            }
        }
    }

    fn dispatch(&mut self, group: Group) -> bool {
        let valid = self.flags.inbound_valid;
        let mut ctx = DispatchCtx {
            frame: &mut self.outbound,
            banks: &mut self.banks,
            flags: &mut self.flags,
            settings: self.settings.as_mut(),
            merge: &mut self.merge,
            inputs: &self.inputs,
            delay: self.delay.as_mut(),
        };

        match group {
            Group::One => self.dispatcher.group_1(valid, &mut ctx),
            Group::Two => self.dispatcher.group_2(valid, &mut ctx),
            Group::Three => self.dispatcher.group_3(valid, &mut ctx),
        }
    }

    fn report_faults(&self) {
        if self.fault_report_period > 0 && self.cycle_count % self.fault_report_period == 0 {
            info!("Faults after {} cycles: {}", self.cycle_count, self.counters);
        }
    }

    /// Pace the cycle. A pending resync replaces the wait.
    fn wait_for_tick(&mut self) {
        let resync = self.flags.take_resync();

        if self.flags.cadence == CadenceMode::RemoteDriven {
            self.scheduler.resync();
            return;
        }

        // A pending resync follows a slow command, so its lateness is not an overrun
        match self.scheduler.end_cycle_wait() {
            WaitOutcome::Overrun { backlog } if !resync => {
                self.counters.overruns += 1;
                self.carried |= StatusBits::CYCLE_OVERRUN;
                debug!("Cycle {} overran, {} ticks behind", self.cycle_count, backlog);
            },
            _ => ()
        }

        if resync {
            self.scheduler.resync();
        }
    }
}

//! # Test fixtures
//!
//! Scripted stand-ins for the bus, the transport and the delay source.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use comms_if::net::{FrameTransport, TransportError};
use embedded_hal::blocking::delay::DelayMs;

use crate::{
    params::NodeExecParams,
    servo_ctrl::{ActuatorLink, BusType, ServoConfig, ServoError},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const EXAMPLE: &str = r#"
    cycle_period_ms = 10
    failure_threshold = 5
    max_pause_ms = 5000
    motion_limit_deg = 10.0

    [net]
    bind_addr = "127.0.0.1:0"
    remote_addr = "192.168.1.2:22222"

    [trigger]
    bank = "Left"
    channel = 0
    angle_deg = -30.0

    [left]
    bus = "KondoIcs"
    device = "/dev/ttyAMA1"
    channels = [
        { mounted = true, address = 0 },
        { mounted = true, address = 1, sign = -1, trim_deg = 1.5 },
    ]

    [right]
    bus = "KondoIcs"
    device = "/dev/ttyAMA2"
    channels = [
        { mounted = true, address = 0 },
    ]
"#;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An actuator link which echoes every demand and fails on request.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    log: Arc<Mutex<LinkLog>>,
}

#[derive(Debug, Default)]
struct LinkLog {
    fail_next: usize,
    positions: Vec<(u8, f64)>,
    releases: usize,
}

/// A transport fed from a queue of inbound datagrams, recording everything sent.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

#[derive(Debug, Default)]
struct TransportState {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
}

/// A delay source which records the requested delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    delays: Arc<Mutex<Vec<u32>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` requests.
    pub fn fail_next(&self, n: usize) {
        self.log.lock().unwrap().fail_next = n;
    }

    /// Number of position requests made, including failed ones.
    pub fn positions(&self) -> usize {
        self.log.lock().unwrap().positions.len()
    }

    /// Angles of the position requests made, including failed ones.
    pub fn position_log(&self) -> Vec<f64> {
        self.log.lock().unwrap().positions.iter().map(|p| p.1).collect()
    }

    /// Number of release requests made, including failed ones.
    pub fn releases(&self) -> usize {
        self.log.lock().unwrap().releases
    }

    fn check_failure(log: &mut LinkLog, config: &ServoConfig) -> Result<(), ServoError> {
        if log.fail_next > 0 {
            log.fail_next -= 1;
            Err(ServoError::NoReply(config.address))
        }
        else {
            Ok(())
        }
    }
}

impl ActuatorLink for ScriptedLink {
    fn bus_type(&self) -> BusType {
        BusType::KondoIcs
    }

    fn set_position(&mut self, config: &ServoConfig, deg: f64) -> Result<f64, ServoError> {
        let mut log = self.log.lock().unwrap();
        log.positions.push((config.address, deg));
        Self::check_failure(&mut log, config).map(|_| deg)
    }

    fn release(&mut self, config: &ServoConfig, current_deg: f64) -> Result<f64, ServoError> {
        let mut log = self.log.lock().unwrap();
        log.releases += 1;
        Self::check_failure(&mut log, config).map(|_| current_deg)
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a datagram to be received.
    pub fn push(&self, datagram: &[u8]) {
        self.state.lock().unwrap().inbound.push_back(datagram.to_vec());
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    /// Every datagram sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl FrameTransport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_sends {
            return Err(TransportError::ShortSend { sent: 0, len: bytes.len() });
        }

        state.sent.push(bytes.to_vec());
        Ok(())
    }

    fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        match self.state.lock().unwrap().inbound.pop_front() {
            Some(d) => {
                let n = d.len().min(buf.len());
                buf[..n].copy_from_slice(&d[..n]);
                Ok(Some(d.len()))
            },
            None => Ok(None)
        }
    }
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.delays.lock().unwrap().clone()
    }
}

impl DelayMs<u32> for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.lock().unwrap().push(ms);
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// A mounted channel at `address` with no trim.
pub fn mounted(address: u8) -> ServoConfig {
    ServoConfig {
        mounted: true,
        address,
        sign: 1,
        trim_deg: 0.0,
    }
}

/// Parameters for a node with two left channels and one right channel.
pub fn example_params() -> NodeExecParams {
    util::params::from_toml_str(EXAMPLE).unwrap()
}

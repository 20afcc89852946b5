//! # Sensor and Input Snapshots
//!
//! Orientation and input device state are refreshed by tasks outside the control loop. Each is
//! held in a last-write-wins cell which the loop reads without blocking at merge time.
//!
//! The orientation cell stores each angle in its own atomic, so a reader may see a triple mixed
//! from two consecutive writes. That inaccuracy lasts one cycle and is accepted; no lock is held
//! between the writer and the loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};
use comms_if::frame::{deg_to_wire, idx, WireFrame};
use log::info;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Orientation triple in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Input device state, in the layout carried by the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadState {
    pub buttons: u16,

    /// Two packed `i8` axes
    pub stick_l: u16,

    /// Two packed `i8` axes
    pub stick_r: u16,

    /// Packed analog triggers
    pub analog: u16,
}

/// Last-write-wins orientation cell.
#[derive(Debug, Default)]
pub struct OrientationCell {
    roll: AtomicU32,
    pitch: AtomicU32,
    yaw: AtomicU32,
}

/// Last-write-wins input device cell.
#[derive(Debug, Default)]
pub struct PadCell(AtomicU64);

/// Hardware switch which, while asserted, releases every actuator.
#[derive(Debug, Default)]
pub struct InhibitSwitch(AtomicBool);

/// Handles to every snapshot the loop reads. Clone it to hand the writing side to another task.
#[derive(Debug, Clone, Default)]
pub struct SensorInputs {
    /// Orientation source, if one is fitted
    pub orientation: Option<Arc<OrientationCell>>,

    /// Input device, if one is fitted
    pub pad: Option<Arc<PadCell>>,

    pub inhibit: Arc<InhibitSwitch>,
}

/// Writes the current snapshots into the outbound frame.
#[derive(Debug, Clone)]
pub struct SensorMerge {
    /// Raw yaw which reads as zero
    yaw_origin: f32,

    /// OR local buttons into the inbound buttons instead of overwriting them
    pad_button_merge: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OrientationCell {
    pub fn store(&self, o: Orientation) {
        self.roll.store(o.roll.to_bits(), Ordering::Relaxed);
        self.pitch.store(o.pitch.to_bits(), Ordering::Relaxed);
        self.yaw.store(o.yaw.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> Orientation {
        Orientation {
            roll: f32::from_bits(self.roll.load(Ordering::Relaxed)),
            pitch: f32::from_bits(self.pitch.load(Ordering::Relaxed)),
            yaw: f32::from_bits(self.yaw.load(Ordering::Relaxed)),
        }
    }
}

impl PadState {
    fn pack(self) -> u64 {
        (self.buttons as u64)
            | ((self.stick_l as u64) << 16)
            | ((self.stick_r as u64) << 32)
            | ((self.analog as u64) << 48)
    }

    fn unpack(value: u64) -> Self {
        Self {
            buttons: value as u16,
            stick_l: (value >> 16) as u16,
            stick_r: (value >> 32) as u16,
            analog: (value >> 48) as u16,
        }
    }
}

impl PadCell {
    pub fn store(&self, state: PadState) {
        self.0.store(state.pack(), Ordering::Relaxed);
    }

    pub fn load(&self) -> PadState {
        PadState::unpack(self.0.load(Ordering::Relaxed))
    }
}

impl InhibitSwitch {
    pub fn set(&self, asserted: bool) {
        self.0.store(asserted, Ordering::Relaxed);
    }

    pub fn is_asserted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl SensorInputs {
    /// Inputs with no orientation source or input device fitted.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_orientation(mut self, cell: Arc<OrientationCell>) -> Self {
        self.orientation = Some(cell);
        self
    }

    pub fn with_pad(mut self, cell: Arc<PadCell>) -> Self {
        self.pad = Some(cell);
        self
    }

    /// Whether the inhibit switch is asserted.
    pub fn inhibited(&self) -> bool {
        self.inhibit.is_asserted()
    }
}

impl SensorMerge {
    pub fn new(pad_button_merge: bool) -> Self {
        Self {
            yaw_origin: 0.0,
            pad_button_merge,
        }
    }

    pub fn yaw_origin(&self) -> f32 {
        self.yaw_origin
    }

    /// Take the current raw yaw as the new origin. Without an orientation source the origin is
    /// left alone.
    pub fn calibrate_yaw(&mut self, inputs: &SensorInputs) {
        if let Some(ref cell) = inputs.orientation {
            self.yaw_origin = cell.load().yaw;
            info!("Yaw origin set to {:.2} deg", self.yaw_origin);
        }
    }

    /// Write the orientation and input device snapshots into `frame`.
    pub fn merge(&self, inputs: &SensorInputs, frame: &mut WireFrame) {
        if let Some(ref cell) = inputs.orientation {
            let o = cell.load();
            frame.set_slot(idx::ROLL, deg_to_wire(o.roll as f64));
            frame.set_slot(idx::PITCH, deg_to_wire(o.pitch as f64));
            frame.set_slot(idx::YAW, deg_to_wire(wrap_deg(o.yaw - self.yaw_origin) as f64));
        }

        if let Some(ref cell) = inputs.pad {
            let pad = cell.load();

            let buttons = if self.pad_button_merge {
                frame.slot_u16(idx::PAD_BUTTONS) | pad.buttons
            } else {
                pad.buttons
            };

            frame.set_slot_u16(idx::PAD_BUTTONS, buttons);
            frame.set_slot_u16(idx::PAD_STICK_L, pad.stick_l);
            frame.set_slot_u16(idx::PAD_STICK_R, pad.stick_r);
            frame.set_slot_u16(idx::PAD_ANALOG, pad.analog);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wrap an angle into `[-180, 180)`.
fn wrap_deg(deg: f32) -> f32 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

//! # Wire Frame
//!
//! The state frame exchanged with the remote controller once per cycle. A frame is exactly
//! [`FRAME_LEN`] signed 16 bit slots, stored as a single owned byte buffer in little-endian order
//! and accessed through typed accessors at fixed slot offsets.
//!
//! The last slot carries a checksum over all preceding slots. The checksum is the bitwise
//! complement of the wrapping sum of those slots, so altering any single slot always changes it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use serde::{
    de::{self, Deserializer},
    ser::{SerializeSeq, Serializer},
    Deserialize, Serialize,
};

use crate::status::StatusBits;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of slots in a frame.
pub const FRAME_LEN: usize = 90;

/// Number of bytes in a frame on the wire.
pub const FRAME_BYTES: usize = FRAME_LEN * 2;

/// Number of command/target pairs reserved for each actuator bank.
pub const BANK_SLOTS: usize = 15;

/// Slot offsets of the fixed fields.
pub mod idx {
    /// Command code
    pub const MASTER: usize = 0;
    /// Sequence counter (unsigned)
    pub const SEQ: usize = 1;
    /// Timed pause duration in milliseconds, only meaningful inbound
    pub const STOP_MS: usize = 2;
    /// Orientation roll, hundredths of a degree
    pub const ROLL: usize = 12;
    /// Orientation pitch, hundredths of a degree
    pub const PITCH: usize = 13;
    /// Orientation yaw relative to the calibrated origin, hundredths of a degree
    pub const YAW: usize = 14;
    /// Input device button bitfield (unsigned)
    pub const PAD_BUTTONS: usize = 15;
    /// Left stick, two packed `i8` axes
    pub const PAD_STICK_L: usize = 16;
    /// Right stick, two packed `i8` axes
    pub const PAD_STICK_R: usize = 17;
    /// Packed analog triggers
    pub const PAD_ANALOG: usize = 18;
    /// First command slot of the left bank
    pub const L_ORIGIN: usize = 20;
    /// First command slot of the right bank
    pub const R_ORIGIN: usize = 50;
    /// Status bitfield (high byte) and channel fault code (low byte)
    pub const STATUS: usize = 88;
    /// Checksum
    pub const CHECKSUM: usize = 89;
}

/// Command code value requesting a position move. Any other value releases the actuator.
pub const CMD_POSITION: i16 = 1;

/// Command code value releasing an actuator (torque off).
pub const CMD_RELEASE: i16 = 0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A fixed length state frame.
///
/// The frame is one byte buffer. Slots are read and written through accessors which decode the
/// relevant two bytes, so no two views of different widths ever alias the same storage.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WireFrame {
    bytes: [u8; FRAME_BYTES],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The two actuator banks carried by the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    Left,
    Right,
}

/// Errors which can occur when building a frame from external data.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Expected {} bytes, found {0}", FRAME_BYTES)]
    WrongByteLength(usize),

    #[error("Expected {} slots, found {0}", FRAME_LEN)]
    WrongSlotCount(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Bank {
    /// Both banks in scan order.
    pub const ALL: [Bank; 2] = [Bank::Left, Bank::Right];

    /// Slot of the command for channel `index` in this bank. The target follows it.
    pub fn command_slot(self, index: usize) -> usize {
        let origin = match self {
            Bank::Left => idx::L_ORIGIN,
            Bank::Right => idx::R_ORIGIN,
        };
        origin + index * 2
    }

    /// Base of the channel fault code for this bank.
    pub fn fault_base(self) -> u8 {
        match self {
            Bank::Left => 100,
            Bank::Right => 200,
        }
    }
}

impl WireFrame {
    /// A frame with every slot zero.
    pub fn zeroed() -> Self {
        Self {
            bytes: [0u8; FRAME_BYTES],
        }
    }

    /// Build a frame from raw wire bytes.
    ///
    /// The byte slice must be exactly [`FRAME_BYTES`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_BYTES {
            return Err(FrameError::WrongByteLength(bytes.len()));
        }

        let mut frame = Self::zeroed();
        frame.bytes.copy_from_slice(bytes);
        Ok(frame)
    }

    /// Build a frame from a slice of slot values.
    pub fn from_slots(slots: &[i16]) -> Result<Self, FrameError> {
        if slots.len() != FRAME_LEN {
            return Err(FrameError::WrongSlotCount(slots.len()));
        }

        let mut frame = Self::zeroed();
        LittleEndian::write_i16_into(slots, &mut frame.bytes);
        Ok(frame)
    }

    /// Copy of the wire bytes.
    pub fn to_bytes(&self) -> [u8; FRAME_BYTES] {
        self.bytes
    }

    /// Borrow the wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy of all slot values.
    pub fn slots(&self) -> [i16; FRAME_LEN] {
        let mut slots = [0i16; FRAME_LEN];
        LittleEndian::read_i16_into(&self.bytes, &mut slots);
        slots
    }

    /// Read a slot as a signed value.
    ///
    /// ## Panics
    /// - If `index` is not less than [`FRAME_LEN`].
    pub fn slot(&self, index: usize) -> i16 {
        LittleEndian::read_i16(&self.bytes[index * 2..index * 2 + 2])
    }

    /// Write a signed value into a slot.
    ///
    /// ## Panics
    /// - If `index` is not less than [`FRAME_LEN`].
    pub fn set_slot(&mut self, index: usize, value: i16) {
        LittleEndian::write_i16(&mut self.bytes[index * 2..index * 2 + 2], value)
    }

    /// Read a slot as an unsigned value, used for bit-flag and counter slots.
    pub fn slot_u16(&self, index: usize) -> u16 {
        LittleEndian::read_u16(&self.bytes[index * 2..index * 2 + 2])
    }

    /// Write an unsigned value into a slot.
    pub fn set_slot_u16(&mut self, index: usize, value: u16) {
        LittleEndian::write_u16(&mut self.bytes[index * 2..index * 2 + 2], value)
    }

    /// The command code in the master slot.
    pub fn master(&self) -> i16 {
        self.slot(idx::MASTER)
    }

    pub fn set_master(&mut self, code: i16) {
        self.set_slot(idx::MASTER, code)
    }

    /// The sequence counter.
    pub fn seq(&self) -> u16 {
        self.slot_u16(idx::SEQ)
    }

    pub fn set_seq(&mut self, seq: u16) {
        self.set_slot_u16(idx::SEQ, seq)
    }

    /// Command code of a channel.
    pub fn command(&self, bank: Bank, index: usize) -> i16 {
        self.slot(bank.command_slot(index))
    }

    pub fn set_command(&mut self, bank: Bank, index: usize, code: i16) {
        self.set_slot(bank.command_slot(index), code)
    }

    /// Target of a channel in degrees.
    pub fn target_deg(&self, bank: Bank, index: usize) -> f64 {
        wire_to_deg(self.slot(bank.command_slot(index) + 1))
    }

    /// Write the target of a channel in degrees, quantised to the wire resolution.
    pub fn set_target_deg(&mut self, bank: Bank, index: usize, deg: f64) {
        self.set_slot(bank.command_slot(index) + 1, deg_to_wire(deg))
    }

    /// Set every command slot of both banks to release.
    pub fn release_all(&mut self) {
        for bank in Bank::ALL.iter() {
            for i in 0..BANK_SLOTS {
                self.set_command(*bank, i, CMD_RELEASE);
            }
        }
    }

    /// Set every target slot of both banks to zero degrees.
    pub fn zero_all_targets(&mut self) {
        for bank in Bank::ALL.iter() {
            for i in 0..BANK_SLOTS {
                self.set_slot(bank.command_slot(i) + 1, 0);
            }
        }
    }

    /// Fault class bits held in the high byte of the status slot.
    pub fn status_bits(&self) -> StatusBits {
        StatusBits::from_bits_truncate(self.slot_u16(idx::STATUS))
    }

    /// Raise or lower the given fault class bits, leaving the rest of the status slot untouched.
    pub fn set_status(&mut self, bits: StatusBits, raised: bool) {
        let mut status = self.slot_u16(idx::STATUS);
        if raised {
            status |= bits.bits();
        } else {
            status &= !bits.bits();
        }
        self.set_slot_u16(idx::STATUS, status)
    }

    /// The representative channel fault code in the low byte of the status slot.
    pub fn fault_code(&self) -> u8 {
        (self.slot_u16(idx::STATUS) & 0x00FF) as u8
    }

    pub fn set_fault_code(&mut self, code: u8) {
        let status = (self.slot_u16(idx::STATUS) & 0xFF00) | code as u16;
        self.set_slot_u16(idx::STATUS, status)
    }

    /// Compute the checksum over every slot preceding the checksum slot.
    pub fn checksum(&self) -> i16 {
        let sum = (0..idx::CHECKSUM).fold(0i16, |acc, i| acc.wrapping_add(self.slot(i)));
        !sum
    }

    /// Compute and store the checksum.
    pub fn write_checksum(&mut self) {
        let cksm = self.checksum();
        self.set_slot(idx::CHECKSUM, cksm)
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn validate(&self) -> bool {
        self.checksum() == self.slot(idx::CHECKSUM)
    }
}

impl Default for WireFrame {
    /// A valid frame in normal operation: the master slot holds the frame length.
    fn default() -> Self {
        let mut frame = Self::zeroed();
        frame.set_master(FRAME_LEN as i16);
        frame.write_checksum();
        frame
    }
}

impl std::fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.slots().iter()).finish()
    }
}

impl Serialize for WireFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(FRAME_LEN))?;
        for v in self.slots().iter() {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for WireFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let slots = Vec::<i16>::deserialize(deserializer)?;
        WireFrame::from_slots(&slots).map_err(de::Error::custom)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert an angle in degrees to wire units (hundredths of a degree), saturating at the `i16`
/// range.
pub fn deg_to_wire(deg: f64) -> i16 {
    let hundredths = (deg * 100.0).round();
    if hundredths.is_nan() {
        0
    } else if hundredths >= i16::MAX as f64 {
        i16::MAX
    } else if hundredths <= i16::MIN as f64 {
        i16::MIN
    } else {
        hundredths as i16
    }
}

/// Convert wire units (hundredths of a degree) to degrees.
pub fn wire_to_deg(value: i16) -> f64 {
    value as f64 / 100.0
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn sample_frame() -> WireFrame {
        let mut f = WireFrame::default();
        f.set_seq(1234);
        f.set_command(Bank::Left, 3, CMD_POSITION);
        f.set_target_deg(Bank::Left, 3, -12.5);
        f.set_target_deg(Bank::Right, 14, 90.0);
        f.write_checksum();
        f
    }

    #[test]
    fn test_checksum_detects_single_slot_change() {
        let f = sample_frame();
        assert!(f.validate());

        for i in 0..idx::CHECKSUM {
            let mut g = f;
            g.set_slot(i, g.slot(i).wrapping_add(1));
            assert!(!g.validate(), "change in slot {} went undetected", i);
        }
    }

    #[test]
    fn test_bank_layout() {
        let f = sample_frame();
        assert_eq!(f.slot(26), CMD_POSITION);
        assert_eq!(f.slot(27), -1250);
        assert_eq!(f.slot(79), 9000);
        assert_eq!(f.target_deg(Bank::Right, 14), 90.0);
    }

    #[test]
    fn test_status_halves_are_independent() {
        let mut f = WireFrame::zeroed();
        f.set_fault_code(203);
        f.set_status(StatusBits::SEQ_SKIP | StatusBits::RECV_INVALID, true);
        assert_eq!(f.fault_code(), 203);
        assert!(f.status_bits().contains(StatusBits::SEQ_SKIP));

        f.set_status(StatusBits::SEQ_SKIP, false);
        assert_eq!(f.status_bits(), StatusBits::RECV_INVALID);
        assert_eq!(f.fault_code(), 203);

        f.set_fault_code(0);
        assert_eq!(f.status_bits(), StatusBits::RECV_INVALID);
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert_eq!(
            WireFrame::from_bytes(&[0u8; 10]),
            Err(FrameError::WrongByteLength(10))
        );
        assert_eq!(
            WireFrame::from_slots(&[0i16; 91]),
            Err(FrameError::WrongSlotCount(91))
        );
    }

    #[test]
    fn test_deg_to_wire_saturates() {
        assert_eq!(deg_to_wire(400.0), i16::MAX);
        assert_eq!(deg_to_wire(-400.0), i16::MIN);
        assert_eq!(deg_to_wire(0.014), 1);
        assert_eq!(deg_to_wire(f64::NAN), 0);
    }

    #[test]
    fn test_serde_rejects_short_frames() {
        let f = sample_frame();
        let json = serde_json::to_string(&f).unwrap();
        let back: WireFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);

        assert!(serde_json::from_str::<WireFrame>("[1, 2, 3]").is_err());
    }

    proptest! {
        #[test]
        fn prop_bytes_round_trip(slots in proptest::collection::vec(any::<i16>(), FRAME_LEN)) {
            let f = WireFrame::from_slots(&slots).unwrap();
            let back = WireFrame::from_bytes(&f.to_bytes()).unwrap();
            prop_assert_eq!(back, f);
            prop_assert_eq!(&back.slots()[..], &slots[..]);
        }

        #[test]
        fn prop_checksum_valid_after_write(slots in proptest::collection::vec(any::<i16>(), FRAME_LEN)) {
            let mut f = WireFrame::from_slots(&slots).unwrap();
            f.write_checksum();
            prop_assert!(f.validate());
        }
    }
}

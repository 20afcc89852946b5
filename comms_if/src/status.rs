//! # Status Reporting
//!
//! The frame's status slot holds fault class bits in its high byte and a single representative
//! channel fault code in its low byte.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use bitflags::bitflags;

use crate::frame::Bank;

// ------------------------------------------------------------------------------------------------
// BITFLAGS
// ------------------------------------------------------------------------------------------------

bitflags! {
    /// Fault classes raised in the status slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u16 {
        /// The previous outbound frame could not be sent.
        const SEND_FAILED   = 1 << 15;
        /// The inbound frame failed its checksum.
        const RECV_INVALID  = 1 << 14;
        /// The previous cycle overran its period.
        const CYCLE_OVERRUN = 1 << 11;
        /// The inbound sequence counter skipped.
        const SEQ_SKIP      = 1 << 10;
    }
}

impl Default for StatusBits {
    fn default() -> Self {
        Self::empty()
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Code identifying one faulted channel: `100 + i` for the left bank, `200 + i` for the right,
/// zero for none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultCode(pub u8);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FaultCode {
    pub const NONE: FaultCode = FaultCode(0);

    /// Code for channel `index` of `bank`.
    pub fn channel(bank: Bank, index: usize) -> Self {
        FaultCode(bank.fault_base().wrapping_add(index as u8))
    }

    /// Decode the bank and channel index, or `None` if no channel is faulted.
    pub fn decode(self) -> Option<(Bank, usize)> {
        match self.0 {
            100..=199 => Some((Bank::Left, (self.0 - 100) as usize)),
            200..=255 => Some((Bank::Right, (self.0 - 200) as usize)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fault_code_decode() {
        assert_eq!(FaultCode::channel(Bank::Left, 4), FaultCode(104));
        assert_eq!(FaultCode(214).decode(), Some((Bank::Right, 14)));
        assert_eq!(FaultCode::NONE.decode(), None);
    }

    #[test]
    fn test_status_bits_fit_high_byte() {
        assert_eq!(StatusBits::all().bits() & 0x00FF, 0);
    }
}

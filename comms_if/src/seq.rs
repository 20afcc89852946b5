//! # Sequence Tracking
//!
//! Every frame carries a monotonic 16 bit counter. The receiving side predicts the next value and
//! compares it with what arrives. On a mismatch the expectation is resynchronised to the value the
//! sender actually used, so one dropped frame costs exactly one detected gap.
//!
//! A counter which moved backwards (a stale or reordered datagram) is reported as a gap like any
//! other mismatch.

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tracks the expected sequence value of inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker {
    /// Expected sequence value of the most recently observed frame
    expected: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of comparing a received sequence value with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOutcome {
    InOrder,
    Gap { expected: u16, received: u16 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SequenceTracker {
    /// Create a tracker which expects the next frame to carry `first`.
    pub fn new(first: u16) -> Self {
        Self {
            expected: first.wrapping_sub(1),
        }
    }

    /// Expected value of the most recently observed frame. After a gap this is the value which
    /// was actually received.
    pub fn expected(&self) -> u16 {
        self.expected
    }

    /// Predict the value of the next frame, validate the received value against it, and
    /// resynchronise on a gap.
    pub fn observe(&mut self, received: u16) -> SeqOutcome {
        self.expected = predict_next(self.expected);

        let outcome = check(self.expected, received);
        if let SeqOutcome::Gap { .. } = outcome {
            self.expected = received;
        }

        outcome
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SeqOutcome {
    pub fn is_in_order(&self) -> bool {
        matches!(self, SeqOutcome::InOrder)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Next value of a sequence counter, wrapping at the 16 bit boundary.
pub fn predict_next(current: u16) -> u16 {
    current.wrapping_add(1)
}

/// Compare an expected sequence value with a received one.
pub fn check(expected: u16, received: u16) -> SeqOutcome {
    if expected == received {
        SeqOutcome::InOrder
    } else {
        SeqOutcome::Gap { expected, received }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_in_order_stream() {
        let mut t = SequenceTracker::new(100);

        for (received, next) in [(100u16, 101u16), (101, 102), (102, 103)].iter() {
            assert_eq!(t.observe(*received), SeqOutcome::InOrder);
            assert_eq!(predict_next(t.expected()), *next);
        }
    }

    #[test]
    fn test_gap_resynchronises_to_received() {
        let mut t = SequenceTracker::new(100);

        assert_eq!(
            t.observe(105),
            SeqOutcome::Gap { expected: 100, received: 105 }
        );
        assert_eq!(t.expected(), 105);

        // Only one gap is reported for the dropped frames
        assert!(t.observe(106).is_in_order());
        assert!(t.observe(107).is_in_order());
    }

    #[test]
    fn test_backwards_counter_is_a_gap() {
        let mut t = SequenceTracker::new(50);
        assert!(t.observe(50).is_in_order());
        assert!(!t.observe(40).is_in_order());
        assert!(t.observe(41).is_in_order());
    }

    #[test]
    fn test_wraparound() {
        assert_eq!(predict_next(u16::MAX), 0);

        let mut t = SequenceTracker::new(u16::MAX);
        assert!(t.observe(u16::MAX).is_in_order());
        assert!(t.observe(0).is_in_order());
    }
}

//! # Motion Limiter
//!
//! Bounds how far an actuator target may move in one cycle, so a large jump in the demanded
//! angle becomes a ramp.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use num_traits::Float;
use util::maths::step_toward;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Per-cycle rate limit applied to every channel.
#[derive(Debug, Clone, Copy)]
pub struct MotionLimiter<T> {
    /// Largest move per cycle, `None` when targets pass through unlimited
    max_delta: Option<T>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Float> MotionLimiter<T> {
    /// Create a limiter. `None` disables the limit.
    pub fn new(max_delta: Option<T>) -> Self {
        Self { max_delta }
    }

    /// Limit the move from `previous` to `requested`.
    pub fn apply(&self, previous: T, requested: T) -> T {
        match self.max_delta {
            Some(max_delta) => limit(previous, requested, max_delta),
            None => requested
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Return `requested` if it is within `max_delta` of `previous`, otherwise `previous` moved by
/// `max_delta` toward `requested`.
pub fn limit<T: Float>(previous: T, requested: T, max_delta: T) -> T {
    step_toward(previous, requested, max_delta)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_limit() {
        assert_eq!(limit(0.0, 50.0, 10.0), 10.0);
        assert_eq!(limit(0.0, 5.0, 10.0), 5.0);
        assert_eq!(limit(10.0, -100.0, 10.0), 0.0);
        assert_eq!(limit(0.0f32, -10.0, 10.0), -10.0);
    }

    #[test]
    fn test_zero_max_delta_holds() {
        assert_eq!(limit(0.0, 50.0, 0.0), 0.0);
        assert_eq!(limit(-12.5, 90.0, 0.0), -12.5);

        let l = MotionLimiter::new(Some(0.0));
        assert_eq!(l.apply(3.0, 170.0), 3.0);
    }

    #[test]
    fn test_disabled() {
        let l = MotionLimiter::new(None);
        assert_eq!(l.apply(0.0, 170.0), 170.0);
        assert_eq!(l.apply(0.0, -170.0), -170.0);

        let l = MotionLimiter::new(Some(10.0));
        assert_eq!(l.apply(0.0, 170.0), 10.0);
    }

    proptest! {
        #[test]
        fn prop_limited_step_never_exceeds_max(
            previous in -180.0f64..180.0,
            requested in -180.0f64..180.0,
            max_delta in 0.1f64..50.0,
        ) {
            let applied = limit(previous, requested, max_delta);
            prop_assert!((applied - previous).abs() <= max_delta + 1e-9);

            // Never overshoots the request
            prop_assert!((requested - applied).abs() <= (requested - previous).abs() + 1e-9);
        }
    }
}

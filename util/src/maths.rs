//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value into `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Move from `current` toward `target` by at most `max_step`. A zero `max_step` holds `current`.
pub fn step_toward<T>(current: T, target: T, max_step: T) -> T
where
    T: Float
{
    let max_step = max_step.abs();

    current + clamp(&(target - current), &(-max_step), &max_step)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&5.0, &0.0, &1.0), 1.0);
        assert_eq!(clamp(&-5.0, &0.0, &1.0), 0.0);
        assert_eq!(clamp(&0.25, &0.0, &1.0), 0.25);
    }

    #[test]
    fn test_step_toward() {
        assert_eq!(step_toward(10.0, 30.0, 5.0), 15.0);
        assert_eq!(step_toward(10.0, -30.0, 5.0), 5.0);
        assert_eq!(step_toward(10.0, 12.0, 5.0), 12.0);
        assert_eq!(step_toward(10.0, 100.0, 0.0), 10.0);
        assert_eq!(step_toward(10.0, 100.0, -5.0), 15.0);
    }
}

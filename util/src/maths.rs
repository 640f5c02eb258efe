//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a value into the closed range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
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

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&0.5f64, &-1.0, &1.0), 0.5);
        assert_eq!(clamp(&-3.2f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&7.1f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&1.0f64, &-1.0, &1.0), 1.0);
    }
}

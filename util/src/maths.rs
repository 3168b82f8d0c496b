//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float + std::ops::Mul + std::ops::Add + std::ops::AddAssign
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

/// Limit this value to lie within +- range.
pub fn limit_sym<T>(value: T, range: T) -> T
where
    T: Float
{
    if value > range {
        range
    }
    else if value < -range {
        -range
    }
    else {
        value
    }
}

/// Force this angle (or angle difference) in degrees into (-180, +180], by
/// adding or subtracting whole turns.
///
/// All joint angles and headings in the software are degrees in this range,
/// and any blending between two angles must go the short way around.
pub fn reduce_angle<T>(angle: T) -> T
where
    T: Float
{
    let full_turn = T::from(360.0).unwrap();
    let half_turn = T::from(180.0).unwrap();

    let mut a = angle;
    while a >= half_turn { a = a - full_turn; }
    while a < -half_turn { a = a + full_turn; }
    a
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reduce_angle() {
        assert_eq!(reduce_angle(0f64), 0f64);
        assert_eq!(reduce_angle(180f64), -180f64);
        assert_eq!(reduce_angle(190f64), -170f64);
        assert_eq!(reduce_angle(-190f64), 170f64);
        assert_eq!(reduce_angle(360f64), 0f64);
        assert_eq!(reduce_angle(-360f64), 0f64);
        assert_eq!(reduce_angle(540f64), -180f64);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 1f64), (0f64, 100f64), 0.5), 50f64);
        assert_eq!(lin_map((3.0f64, 4.1), (0.0, 100.0), 3.0), 0.0);
    }

    #[test]
    fn test_limit_sym() {
        assert_eq!(limit_sym(2.0f64, 1.0), 1.0);
        assert_eq!(limit_sym(-2.0f64, 1.0), -1.0);
        assert_eq!(limit_sym(0.5f64, 1.0), 0.5);
    }
}

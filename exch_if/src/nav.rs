//! Records exchanged with the path-planning and localization processes.
//!
//! The backend never plans 2-D paths itself: it writes the navigation
//! target it wants onto the `plan_target` channel, reads drive commands
//! back from the planner on `drive_commands`, and reads its fused pose
//! from the localizer on `plan_current`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::exchange::ExchangeSafe;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A field-coordinates navigation target for the path planner.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct NavTarget {
    /// Field position, meters.
    pub x: f32,
    pub y: f32,

    /// Field heading, degrees.
    pub angle: f32,

    /// Acceptable error box around the target.
    pub error_x: f32,
    pub error_y: f32,
    pub error_angle: f32,
}

/// Drive power pair produced by the path planner.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct DriveCommands {
    pub left: f32,
    pub right: f32,
}

/// Accumulated drive distances, meters, per track.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct DriveEncoders {
    pub left: f32,
    pub right: f32,
}

/// Fused 2-D localization estimate.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct Location2D {
    /// Field position, meters.
    pub x: f32,
    pub y: f32,

    /// Field heading, degrees: 0 along +X, 90 along +Y.
    pub angle: f32,

    /// Confidence in this estimate, percent. Below ~10 the fix is unusable.
    pub percent: f32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavTarget {
    /// Tolerance value meaning "any value of this coordinate is fine".
    pub const DONTCARE: f32 = 1.0e9;

    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        let (error_x, error_y, error_angle) = Self::default_tolerance();
        Self {
            x,
            y,
            angle,
            error_x,
            error_y,
            error_angle,
        }
    }

    pub fn with_tolerance(
        x: f32,
        y: f32,
        angle: f32,
        error_x: f32,
        error_y: f32,
        error_angle: f32,
    ) -> Self {
        Self {
            x,
            y,
            angle,
            error_x,
            error_y,
            error_angle,
        }
    }

    /// A bogus sentinel target, written when no autonomous driving is
    /// wanted. The planner ignores it.
    pub fn no_target() -> Self {
        Self::with_tolerance(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn is_no_target(&self) -> bool {
        self.error_x == 0.0 && self.error_y == 0.0 && self.error_angle == 0.0
    }

    /// True once this location lies inside the target's error box.
    pub fn matches(&self, loc: &Location2D) -> bool {
        let angle_err = {
            let mut err = loc.angle - self.angle;
            while err >= 180.0 {
                err -= 360.0;
            }
            while err < -180.0 {
                err += 360.0;
            }
            err
        };

        coord_ok(loc.x - self.x, self.error_x)
            && coord_ok(loc.y - self.y, self.error_y)
            && coord_ok(angle_err, self.error_angle)
    }

    fn default_tolerance() -> (f32, f32, f32) {
        (20.0, 20.0, 30.0)
    }
}

impl DriveCommands {
    /// True if both powers are finite and within the normalized range.
    pub fn is_sane(&self) -> bool {
        self.left.is_finite()
            && self.right.is_finite()
            && self.left.abs() <= 1.0
            && self.right.abs() <= 1.0
    }
}

impl Location2D {
    /// Unit forward vector for this heading.
    pub fn forward(&self) -> (f32, f32) {
        let rad = self.angle.to_radians();
        (rad.cos(), rad.sin())
    }
}

fn coord_ok(error: f32, tolerance: f32) -> bool {
    tolerance >= NavTarget::DONTCARE || error.abs() <= tolerance
}

unsafe impl ExchangeSafe for NavTarget {}
unsafe impl ExchangeSafe for DriveCommands {}
unsafe impl ExchangeSafe for DriveEncoders {}
unsafe impl ExchangeSafe for Location2D {}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_target_matching() {
        let target = NavTarget::with_tolerance(10.0, 20.0, 90.0, 2.0, 3.0, 10.0);

        let mut loc = Location2D {
            x: 11.0,
            y: 18.0,
            angle: 85.0,
            percent: 90.0,
        };
        assert!(target.matches(&loc));

        loc.x = 13.0;
        assert!(!target.matches(&loc));
    }

    #[test]
    fn test_dontcare_coordinate() {
        let target = NavTarget::with_tolerance(
            0.0,
            5.0,
            90.0,
            NavTarget::DONTCARE,
            10.0,
            45.0,
        );
        let loc = Location2D {
            x: 900.0,
            y: 7.0,
            angle: 100.0,
            percent: 90.0,
        };
        assert!(target.matches(&loc));
    }

    #[test]
    fn test_angle_wraps_short_way() {
        let target = NavTarget::with_tolerance(0.0, 0.0, 175.0, 10.0, 10.0, 15.0);
        let loc = Location2D {
            x: 0.0,
            y: 0.0,
            angle: -175.0,
            percent: 90.0,
        };
        assert!(target.matches(&loc));
    }

    #[test]
    fn test_drive_command_sanity() {
        assert!(DriveCommands { left: 0.5, right: -0.5 }.is_sane());
        assert!(!DriveCommands { left: 1.5, right: 0.0 }.is_sane());
        assert!(!DriveCommands {
            left: f32::NAN,
            right: 0.0
        }
        .is_sane());
    }

    #[test]
    fn test_no_target_sentinel() {
        assert!(NavTarget::no_target().is_no_target());
        assert!(!NavTarget::new(1.0, 2.0, 3.0).is_no_target());
    }
}

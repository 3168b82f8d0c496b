//! Planar inverse kinematics for the arm.
//!
//! The arm moves in the YZ plane, so placing the tilt pivot reduces to a
//! two-bar law-of-cosines solve for the boom and stick, with the tilt
//! angle then chosen to give the requested tool pitch. No general 6-DOF
//! solving is attempted.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;

// Internal
use super::links::{link_geometry, Link};
use super::{frame_degrees, JointState};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rounding slack on the law-of-cosines arguments, so a target at exactly
/// full extension still solves.
const COS_EPSILON: f64 = 1.0e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Inverse kinematic solver for the arm, with the link lengths and start
/// angles captured from the static table at construction.
pub struct ExcahaulerIk {
    /// Origin of the boom link in frame space.
    boom_origin: Vector3<f64>,

    /// Length of the boom (frame to stick pivot), meters.
    boom_len: f64,

    /// Length of the stick (stick pivot to tilt pivot), meters.
    stick_len: f64,

    /// Angle of the stick pivot offset within the boom frame, degrees.
    boom_start: f64,

    /// Angle of the tilt pivot offset within the stick frame, degrees.
    stick_start: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ExcahaulerIk {
    pub fn new() -> Self {
        let boom_geometry = link_geometry(Link::Boom);
        let stick_geometry = link_geometry(Link::Stick);
        let tilt_geometry = link_geometry(Link::Tilt);

        let stick_offset = Vector3::from(stick_geometry.origin);
        let tilt_offset = Vector3::from(tilt_geometry.origin);

        Self {
            boom_origin: Vector3::from(boom_geometry.origin),
            boom_len: stick_offset.norm(),
            stick_len: tilt_offset.norm(),
            boom_start: frame_degrees(&stick_offset),
            stick_start: frame_degrees(&tilt_offset),
        }
    }

    /// Solve the boom, stick and tilt angles which put the tilt link's
    /// origin at `tilt_loc` (frame space) with the tool's Y axis at
    /// `tool_deg` in the YZ plane.
    ///
    /// Returns 1 if the target was reachable, -1 if it is too far or too
    /// close for the two-bar linkage. The fork, dump and spin angles are
    /// left untouched.
    pub fn solve_tilt(
        &self,
        joint: &mut JointState,
        tilt_loc: &Vector3<f64>,
        tool_deg: f64,
    ) -> i32 {
        let tilt_rel = tilt_loc - self.boom_origin;
        let tilt_len = tilt_rel.norm();
        let tilt_deg = frame_degrees(&tilt_rel);

        // Law of cosines for the angle from boom to the tilt vector:
        //   side a = boom, side b = tilt vector, side c = stick
        let a = self.boom_len;
        let b = tilt_len;
        let c = self.stick_len;

        let cos_tb = (a * a + b * b - c * c) / (2.0 * a * b);
        let cos_tb = match clamp_cos(cos_tb) {
            Some(v) => v,
            None => return -1,
        };
        let tb_deg = cos_tb.acos().to_degrees();

        // Frame to boom = frame to tilt vector + boom to tilt vector
        joint.boom = tilt_deg + tb_deg - self.boom_start;

        // Law of cosines again for the angle from stick to boom
        let cos_sb = (a * a + c * c - b * b) / (2.0 * a * c);
        let cos_sb = match clamp_cos(cos_sb) {
            Some(v) => v,
            None => return -1,
        };
        let sb_deg = cos_sb.acos().to_degrees();

        joint.stick = sb_deg - self.stick_start + self.boom_start - 180.0;

        // The stick-to-tool tilt angle gives the requested tool pitch
        joint.tilt = tool_deg - joint.stick - joint.boom;
        if joint.tilt < -180.0 {
            joint.tilt += 360.0;
        }

        1
    }

    pub fn reach(&self) -> f64 {
        self.boom_len + self.stick_len
    }

    pub fn boom_origin(&self) -> Vector3<f64> {
        self.boom_origin
    }
}

/// Reject law-of-cosines arguments outside [-1, 1], tolerating rounding
/// at full extension.
fn clamp_cos(value: f64) -> Option<f64> {
    if value > 1.0 + COS_EPSILON || value < -1.0 - COS_EPSILON {
        None
    }
    else {
        Some(value.max(-1.0).min(1.0))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::kinematics::{LinkCoords, Link};
    use nalgebra::Vector3;

    /// Forward-kinematic the solved joints and compare against the target.
    fn check_roundtrip(tilt_loc: Vector3<f64>, tool_deg: f64) {
        let ik = ExcahaulerIk::new();
        let mut joint = JointState::default();

        assert_eq!(ik.solve_tilt(&mut joint, &tilt_loc, tool_deg), 1);

        let coords = LinkCoords::new(&joint);
        let reached = coords.origin(Link::Tilt);
        assert!(
            (reached - tilt_loc).norm() < 1e-3,
            "tilt position error: wanted {:?}, got {:?}",
            tilt_loc,
            reached
        );

        // The tool pitch is the YZ angle of the tilt frame's Y axis
        let tool_y = coords.coord(Link::Tilt) * Vector3::new(0.0, 1.0, 0.0);
        let pitch = frame_degrees(&tool_y);
        let mut err = pitch - tool_deg;
        while err >= 180.0 {
            err -= 360.0;
        }
        while err < -180.0 {
            err += 360.0;
        }
        assert!(err.abs() < 0.1, "tool pitch error: {}", err);
    }

    #[test]
    fn test_roundtrip_near_cut_zone() {
        check_roundtrip(Vector3::new(0.0, 1.2, 0.5), -35.0);
        check_roundtrip(Vector3::new(0.0, 1.1, 0.7), -20.0);
        check_roundtrip(Vector3::new(0.0, 0.9, 0.3), -45.0);
    }

    #[test]
    fn test_full_extension_reachable() {
        let ik = ExcahaulerIk::new();
        let direction = Vector3::new(0.0, 0.8, 0.6);
        let target = ik.boom_origin() + direction * ik.reach();

        let mut joint = JointState::default();
        assert_eq!(ik.solve_tilt(&mut joint, &target, 0.0), 1);

        // Straight arm: the solved pose really reaches the target
        let coords = LinkCoords::new(&joint);
        assert!((coords.origin(Link::Tilt) - target).norm() < 1e-6);
    }

    #[test]
    fn test_beyond_reach_rejected() {
        let ik = ExcahaulerIk::new();
        let direction = Vector3::new(0.0, 0.8, 0.6);
        let target = ik.boom_origin() + direction * (ik.reach() * 1.01);

        let mut joint = JointState::default();
        assert_eq!(ik.solve_tilt(&mut joint, &target, 0.0), -1);
    }

    #[test]
    fn test_too_close_rejected() {
        let ik = ExcahaulerIk::new();
        // Inside the annulus: closer than |boom - stick|
        let target = ik.boom_origin() + Vector3::new(0.0, 0.01, 0.0);

        let mut joint = JointState::default();
        assert_eq!(ik.solve_tilt(&mut joint, &target, 0.0), -1);
    }

    #[test]
    fn test_tilt_wrapped() {
        let ik = ExcahaulerIk::new();
        let mut joint = JointState::default();

        // A steep downward tool angle forces the wrap branch
        if ik.solve_tilt(&mut joint, &Vector3::new(0.0, 1.2, 0.5), -170.0) == 1 {
            assert!(joint.tilt >= -180.0 && joint.tilt <= 180.0);
        }
    }
}

//! Mining cut planner.
//!
//! A cut is one pass of the mining head through the material, driven by a
//! single progress scalar in [0, 1]. Progress splits into an *outward*
//! component (a short lead-in / lead-out taper away from the cut face) and
//! an *upward* component along the face. The planner converts progress,
//! the frame's measured pitch and the commanded cut depth into a frame
//! space target point for the grinder, then solves the arm joints with
//! the inverse kinematic solver.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

// Internal
use crate::kinematics::{
    frame_degrees, joint_state_sane, vec_from_frame_degrees, ExcahaulerIk,
    JointState, Link, LinkCoords,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distance away from the scoop tip to start mining, meters. Allows a
/// full-depth cut.
pub const MINE_START_DISTANCE: f64 = 0.25;

/// Angle of the cut face relative to the frame, degrees from horizontal.
pub const CUT_FACE_ANGLE_DEG: f64 = 60.0;

/// Height of the cut floor relative to the scoop tip, meters (negative =
/// below the tip).
pub const CUT_FLOOR_DROP_M: f64 = -0.15;

/// Hard cap on the grinder rate during autonomous mining.
pub const MINE_POWER_LIMIT: f64 = 0.7;

/// Meters of lead in / lead out taper.
const LEAD_M: f64 = 0.05;

/// Fraction of the cut used for lead in.
const LEAD_IN_FRACTION: f64 = 0.15;

/// Fraction of the cut used for lead out.
const LEAD_OUT_FRACTION: f64 = 0.03;

/// The mining head pivots around this frame-space point when choosing its
/// orientation (without tool coupler).
const HEAD_CENTER: Vector3<f64> = Vector3::new(0.0, -0.2, 1.2);

/// Scoop tip in dump-link coordinates.
const SCOOP_TIP_LOCAL: Point3<f64> = Point3::new(0.0, 0.308, 0.168);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Plans grinder head targets for the mining cut.
pub struct MinePlanner {
    /// Location of the tip of the scoop in frame coordinates, captured at
    /// the mining base posture.
    scoop_tip: Vector3<f64>,

    ik: ExcahaulerIk,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MinePlanner {
    /// Build the planner around the given mining base posture.
    pub fn new(mine_base: &JointState) -> Self {
        let coords = LinkCoords::new(mine_base);
        let scoop_tip = coords
            .world_from_local(Link::Dump, &SCOOP_TIP_LOCAL)
            .coords;

        Self {
            scoop_tip,
            ik: ExcahaulerIk::new(),
        }
    }

    /// Compute the mining target (frame coords) for this progress along
    /// the cut face.
    ///
    /// `frame_pitch` is the frame's measured pitch in degrees; tipping the
    /// robot forward steepens the commanded face to keep the cut vertical
    /// in the world. `depth` is meters into the face (negative = clearance
    /// above the surface).
    pub fn lookup_mine_target(
        &self,
        frame_pitch: f64,
        up_progress: f64,
        depth: f64,
    ) -> Vector3<f64> {
        let up = vec_from_frame_degrees(CUT_FACE_ANGLE_DEG - frame_pitch);
        let advance = Vector3::new(0.0, 1.0, 0.0);
        let start =
            self.scoop_tip + Vector3::new(0.0, MINE_START_DISTANCE, CUT_FLOOR_DROP_M);

        start + up * up_progress + advance * depth
    }

    /// Given a frame-coordinates point for the grinder head, solve the
    /// joints which put the arm there.
    ///
    /// Returns positive if the target is reachable and the resulting joint
    /// state is sane, negative otherwise.
    pub fn target_plan(
        &self,
        mine_target: &Vector3<f64>,
        mine_joint: &mut JointState,
    ) -> i32 {
        // Point the head along the line from its pivot center to the target
        let head_look = (mine_target - HEAD_CENTER).normalize();
        let head_rotation = Rotation3::from_matrix_unchecked(
            nalgebra::Matrix3::from_columns(&[
                Vector3::new(1.0, 0.0, 0.0),
                head_look,
                Vector3::new(0.0, -head_look.z, head_look.y),
            ]),
        );
        let head_frame = Isometry3::from_parts(
            Translation3::from(*mine_target),
            UnitQuaternion::from_rotation_matrix(&head_rotation),
        );

        // Where the tilt link must sit so the grinder head lands on target
        // (the spin joint is hardware locked, so the tool linkage is fixed)
        let tilt_frame =
            LinkCoords::parent_from_child(Link::Tilt, Link::Grinder, &head_frame);
        let tilt_target = tilt_frame.translation.vector;
        let tool_deg = frame_degrees(&head_look);

        let ret = self.ik.solve_tilt(mine_joint, &tilt_target, tool_deg);
        if ret <= 0 {
            return ret;
        }

        if !joint_state_sane(mine_joint) {
            return -99;
        }

        1
    }

    /// Plan the joint state for this point of a mining pass.
    ///
    /// Returns positive if the joint state is reachable and safe, negative
    /// on error.
    pub fn mine_plan(
        &self,
        frame_pitch: f64,
        up_progress: f64,
        depth: f64,
        mine_joint: &mut JointState,
    ) -> i32 {
        let target = self.lookup_mine_target(frame_pitch, up_progress, depth);
        self.target_plan(&target, mine_joint)
    }

    pub fn scoop_tip(&self) -> Vector3<f64> {
        self.scoop_tip
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Split a single cut progress value into out and up components.
///
/// `progress` is the 0-1 distance into the full cut; `up_length`
/// determines how far up the face the cut runs (meters). The returned
/// `out` is a lead-in / lead-out taper in meters, and `up` advances
/// linearly through the middle of the cut.
pub fn split_progress(progress: f64, up_length: f64) -> (f64, f64) {
    let up_start = 0.0;

    if progress < LEAD_IN_FRACTION {
        // Start of cut: lead in
        let out = (LEAD_IN_FRACTION - progress) / LEAD_IN_FRACTION * LEAD_M;
        (out, up_start)
    }
    else if progress > 1.0 - LEAD_OUT_FRACTION {
        // End of cut: lead out
        let out =
            (progress - (1.0 - LEAD_OUT_FRACTION)) / LEAD_OUT_FRACTION * LEAD_M;
        (out, up_start + up_length)
    }
    else {
        // Middle of cut
        let up = up_start
            + up_length * (progress - LEAD_IN_FRACTION)
                / (1.0 - LEAD_IN_FRACTION - LEAD_OUT_FRACTION);
        (0.0, up)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto_mgr::poses::MINE_JOINT_BASE;

    #[test]
    fn test_split_progress_endpoints() {
        let length = 0.5;

        let (out, up) = split_progress(0.0, length);
        assert!((out - LEAD_M).abs() < 1e-9);
        assert_eq!(up, 0.0);

        let (out, up) = split_progress(1.0, length);
        assert!((out - LEAD_M).abs() < 1e-9);
        assert!((up - length).abs() < 1e-9);
    }

    #[test]
    fn test_split_progress_middle_has_no_out() {
        for &p in &[0.15, 0.3, 0.5, 0.8, 0.97] {
            let (out, _) = split_progress(p, 0.5);
            assert_eq!(out, 0.0, "out nonzero at p={}", p);
        }
    }

    #[test]
    fn test_split_progress_up_monotone() {
        let length = 0.5;
        let mut last_up = -1.0;
        let mut p = 0.0;
        while p <= 1.0 {
            let (_, up) = split_progress(p, length);
            assert!(up >= last_up - 1e-12, "up decreased at p={}", p);
            last_up = up;
            p += 0.01;
        }
    }

    #[test]
    fn test_cut_reachable_across_progress() {
        // A full cut at the default aggressiveness must stay inside the
        // arm's reachable, sane envelope
        let planner = MinePlanner::new(&MINE_JOINT_BASE);

        let mut up = 0.0;
        while up <= 0.5 {
            let mut joint = MINE_JOINT_BASE;
            let ret = planner.mine_plan(0.0, up, 0.0, &mut joint);
            assert!(ret > 0, "cut unreachable at up={} (ret={})", up, ret);
            assert!(joint_state_sane(&joint));
            up += 0.05;
        }
    }

    #[test]
    fn test_backoff_pulls_out_of_face() {
        // A backed-off (shallower) cut moves the target away from the face
        let planner = MinePlanner::new(&MINE_JOINT_BASE);

        let nominal = planner.lookup_mine_target(0.0, 0.25, 0.0);
        let backed_off = planner.lookup_mine_target(0.0, 0.25, -0.1);

        assert!(backed_off.y < nominal.y);
        assert!((backed_off.z - nominal.z).abs() < 1e-9);
    }

    #[test]
    fn test_frame_pitch_steepens_cut() {
        let planner = MinePlanner::new(&MINE_JOINT_BASE);

        // Nose-down frame pitch raises the commanded face angle
        let level = planner.lookup_mine_target(0.0, 0.3, 0.0);
        let tipped = planner.lookup_mine_target(-10.0, 0.3, 0.0);

        assert!(tipped.z > level.z);
    }
}

//! Collision / hazard checks on joint motion.
//!
//! [`joint_move_hazards`] is a pure advisory function: given the current
//! joint state and the proposed power vector it returns `None` when the
//! motion keeps the robot in a safe configuration, or a short
//! human-readable reason string for the first hazard found. The caller
//! decides what to do with a hazard; the backend's default is to log it
//! and zero the affected actuators.
//!
//! Geometry is approximated as a handful of fixed points in scoop-local,
//! tool-local and boom-local coordinates, tested as spheres against
//! segments in the YZ plane.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

// Internal
use crate::kinematics::{JointState, Link, LinkCoords};
use crate::power::Power;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Buffer distance between moving parts, meters.
const SAFE_DIST: f64 = 0.03;

/// Radius of the mining head, meters.
const MINING_HEAD_R: f64 = 0.09;

// Tool-local offset points
const TOOL_BACK_LOWER: Point3<f64> = Point3::new(0.0, -0.442, 0.0);
const TOOL_BACK_UPPER: Point3<f64> = Point3::new(0.0, -0.502, 0.24);

/// Tip-relative mining head center.
const MINING_HEAD_MID: Point3<f64> = Point3::new(0.0, -0.05, 0.03);

// Hazardous points, scoop relative
const SCOOP_HAZ_UPPER: Point3<f64> = Point3::new(0.0, 0.02, 0.275);
const SCOOP_HAZ_MID: Point3<f64> = Point3::new(0.0, -0.015, -0.122);
const SCOOP_HAZ_LOWER: Point3<f64> = Point3::new(0.0, 0.333, -0.09);

// Hazardous points, boom relative: base and upper boom
const BOOM_HAZ_LOWER: Point3<f64> = Point3::new(0.0, 0.0, 0.0);
const BOOM_HAZ_UPPER: Point3<f64> = Point3::new(0.0, 0.0, 0.25);

/// Nominal 1% power: anything smaller is treated as not moving.
const SMALL_POWER: f64 = 0.01;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Detailed sanity-check of this motion with these joint angles.
///
/// Returns `None` if the power commands keep the robot in a safe
/// configuration, or a short human-readable description of the first
/// hazard found.
pub fn joint_move_hazards(joint: &JointState, power: &Power) -> Option<&'static str> {
    let small = SMALL_POWER;

    // (1) Simple crude angle tests

    // Scoop down while driving drags it through the ground
    let scoop_down = joint.fork < -10.0 || joint.dump < -70.0;
    let driving = power.left.abs() > small || power.right.abs() > small;
    if scoop_down && driving {
        return Some("scoop dragging on ground");
    }

    // Arm elbow mashing the back electronics box
    let back_tilted = joint.boom > 40.0 && joint.stick > 20.0;
    let back_move = power.boom < -small || power.stick > small;
    if back_tilted && back_move {
        return Some("hitting back electronics box");
    }

    // (2) Coordinate frame calculations
    let links = LinkCoords::new(joint);

    let tool = links.coord(Link::Grinder);
    let scoop = links.coord(Link::Dump);
    let boom = links.coord(Link::Boom);

    // The scoop blade sits 45 degrees off the dump link axis
    let scoop_fix = UnitQuaternion::from_axis_angle(
        &Vector3::x_axis(),
        std::f64::consts::FRAC_PI_4,
    );
    let mod_scoop = Isometry3::from_parts(
        scoop.translation,
        scoop_fix * scoop.rotation,
    );

    // Tool hazard points in corrected scoop coordinates
    let tip = mod_scoop.inverse_transform_point(&(tool * MINING_HEAD_MID));
    let tool_back_lower =
        mod_scoop.inverse_transform_point(&(tool * TOOL_BACK_LOWER));
    let tool_back_upper =
        mod_scoop.inverse_transform_point(&(tool * TOOL_BACK_UPPER));

    // Is the tool inside the scoop?
    let head_in_scoop = tip.y + MINING_HEAD_R + SAFE_DIST > SCOOP_HAZ_UPPER.y
        && tip.z - (MINING_HEAD_R + SAFE_DIST) < SCOOP_HAZ_UPPER.z
        && tip.y - (MINING_HEAD_R + SAFE_DIST) < SCOOP_HAZ_LOWER.y
        && tip.z + MINING_HEAD_R + SAFE_DIST > SCOOP_HAZ_LOWER.z;
    let tool_back_in_scoop = tool_back_lower.y + SAFE_DIST > SCOOP_HAZ_UPPER.y
        && tool_back_lower.z - SAFE_DIST < SCOOP_HAZ_UPPER.z
        && tool_back_lower.y - SAFE_DIST < SCOOP_HAZ_LOWER.y
        && tool_back_lower.z + SAFE_DIST > SCOOP_HAZ_LOWER.z;

    if head_in_scoop || tool_back_in_scoop {
        // Being in the scoop is a legitimate stow posture, but the grinder
        // must not run in there
        if power.attached_grinder() && power.tool_rate().abs() > small {
            return Some("can't spin inside scoop");
        }
    }

    // Mining head against the scoop
    let dist_to_scoop_bottom =
        point_to_line_dist(&SCOOP_HAZ_MID, &SCOOP_HAZ_LOWER, &tip);
    let head_near_bottom = dist_to_scoop_bottom < MINING_HEAD_R + SAFE_DIST;
    let head_under_scoop = tip.z - MINING_HEAD_R < SCOOP_HAZ_MID.z
        || tip.z - MINING_HEAD_R < SCOOP_HAZ_LOWER.z;

    let dist_to_scoop_back =
        point_to_line_dist(&SCOOP_HAZ_MID, &SCOOP_HAZ_UPPER, &tip);
    let head_near_back = dist_to_scoop_back < MINING_HEAD_R + SAFE_DIST;
    let head_behind_scoop =
        tip.y < SCOOP_HAZ_MID.y && tip.z - MINING_HEAD_R < SCOOP_HAZ_UPPER.z;

    if head_near_bottom && !head_under_scoop {
        // Above the scoop surface and pressing down into it
        if power.boom > small {
            return Some("boom pushing tool into scoop");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt > small {
            return Some("tilting tool into scoop");
        }
        if power.dump > small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork > small {
            return Some("fork pushing scoop into tool");
        }
    }
    if head_near_bottom && head_under_scoop {
        // Below the scoop surface and pressing up into it
        if power.boom < -small {
            return Some("boom pushing tool into scoop");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt < -small {
            return Some("tilting tool into scoop");
        }
        if power.dump < -small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork < -small {
            return Some("fork pushing scoop into tool");
        }
    }
    if head_near_back && !head_behind_scoop {
        if power.boom < -small {
            return Some("boom pushing tool into scoop");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt < -small {
            return Some("tilting tool into scoop");
        }
        if power.dump < -small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork.abs() > small {
            return Some("fork pushing scoop into tool");
        }
    }
    if head_near_back && head_behind_scoop {
        // Not in the scoop, but trying to get there through its back wall
        if power.boom > small {
            return Some("boom pushing tool into scoop");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt.abs() > small {
            return Some("tilting tool into scoop (use stick/boom)");
        }
        if power.dump > small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork > small {
            return Some("fork pushing scoop into tool");
        }
    }

    // Back of the tool against the scoop
    let tool_upper_scoop_upper_dist =
        point_to_line_dist(&tool_back_upper, &tool_back_lower, &SCOOP_HAZ_UPPER);
    let tool_lower_scoop_upper_dist =
        point_to_line_dist(&tool_back_lower, &tip, &SCOOP_HAZ_UPPER);
    let tool_upper_scoop_lower_dist =
        point_to_line_dist(&tool_back_upper, &tool_back_lower, &SCOOP_HAZ_LOWER);
    let tool_lower_scoop_lower_dist =
        point_to_line_dist(&tool_back_lower, &tip, &SCOOP_HAZ_LOWER);

    let tool_back_near_scoop_upper = tool_upper_scoop_upper_dist < SAFE_DIST
        || tool_lower_scoop_upper_dist < SAFE_DIST;
    let tool_back_near_scoop_lower = tool_upper_scoop_lower_dist < SAFE_DIST
        || tool_lower_scoop_lower_dist < SAFE_DIST;

    if tool_back_near_scoop_upper {
        if power.boom.abs() > small {
            return Some("boom pushing tool into scoop (use stick!)");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt < -small {
            return Some("tilting tool into scoop");
        }
        if power.dump.abs() > small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork > small {
            return Some("fork pushing scoop into tool");
        }
    }

    if tool_back_near_scoop_lower {
        if power.boom > small {
            return Some("boom pushing tool into scoop");
        }
        if power.stick < -small {
            return Some("stick pushing tool into scoop");
        }
        if power.tilt < -small {
            return Some("tilting tool into scoop");
        }
        if power.dump < -small {
            return Some("dump pushing scoop into tool");
        }
        if power.fork > small {
            return Some("fork pushing scoop into tool");
        }
    }

    // (3) Mining head against the boom
    let tip_to_boom =
        boom.inverse_transform_point(&(tool * Point3::new(0.0, 0.0, 0.0)));
    let tool_back_to_boom = boom.inverse_transform_point(&(tool * TOOL_BACK_LOWER));

    let head_dist_to_boom =
        point_to_line_dist(&BOOM_HAZ_LOWER, &BOOM_HAZ_UPPER, &tip_to_boom);
    let tool_dist_to_boom =
        point_to_line_dist(&BOOM_HAZ_LOWER, &BOOM_HAZ_UPPER, &tool_back_to_boom);

    let in_boom = head_dist_to_boom < MINING_HEAD_R + SAFE_DIST
        || tool_dist_to_boom < SAFE_DIST;

    if in_boom {
        if power.stick < -small {
            return Some("stick pushing tool into boom");
        }
        if power.tilt < -small {
            return Some("tilting tool into boom");
        }
    }

    None
}

/// Distance from point `p` to the segment `v`-`w`, in the YZ plane.
///
/// The X axis is ignored: all interfering motion is planar.
pub fn point_to_line_dist(v: &Point3<f64>, w: &Point3<f64>, p: &Point3<f64>) -> f64 {
    let (vy, vz) = (v.y, v.z);
    let (wy, wz) = (w.y, w.z);
    let (py, pz) = (p.y, p.z);

    let len2 = (vy - wy).powi(2) + (vz - wz).powi(2);
    if len2 < 1.0e-4 {
        // v == w case
        return ((py - vy).powi(2) + (pz - vz).powi(2)).sqrt();
    }

    // Project p onto the line through v and w, clamping the parameter to
    // [0, 1] to stay on the segment
    let t = ((py - vy) * (wy - vy) + (pz - vz) * (wz - vz)) / len2;
    let t = t.max(0.0).min(1.0);

    let proj_y = vy + (wy - vy) * t;
    let proj_z = vz + (wz - vz) * t;

    ((py - proj_y).powi(2) + (pz - proj_z).powi(2)).sqrt()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::power::AttachedTool;

    /// Arm raised to the mining start posture.
    fn mine_base_joint() -> JointState {
        JointState {
            fork: -17.0,
            dump: -30.0,
            boom: 10.0,
            stick: 0.0,
            tilt: -30.0,
            spin: 0.0,
        }
    }

    /// Scoop and arm in the normal driving posture.
    fn drive_joint() -> JointState {
        JointState {
            fork: 10.0,
            dump: -40.0,
            boom: 0.0,
            stick: 0.0,
            tilt: 0.0,
            spin: 0.0,
        }
    }

    #[test]
    fn test_scoop_dragging() {
        let joint = JointState {
            fork: -30.0,
            dump: -80.0,
            ..Default::default()
        };
        let power = Power {
            left: 0.5,
            right: 0.5,
            ..Default::default()
        };

        assert_eq!(
            joint_move_hazards(&joint, &power),
            Some("scoop dragging on ground")
        );
    }

    #[test]
    fn test_scoop_down_without_drive_is_fine() {
        // Same scoop-down pose, but no drive power: the crude rule must
        // not fire, and this pose is geometrically clear of the tool
        let joint = JointState {
            fork: -30.0,
            dump: -80.0,
            boom: 10.0,
            stick: 0.0,
            tilt: -30.0,
            ..Default::default()
        };
        let power = Power {
            fork: 0.5,
            ..Default::default()
        };

        assert_eq!(joint_move_hazards(&joint, &power), None);
    }

    #[test]
    fn test_drag_threshold_is_one_percent() {
        let joint = JointState {
            fork: -30.0,
            dump: -80.0,
            boom: 10.0,
            stick: 0.0,
            tilt: -30.0,
            ..Default::default()
        };
        let power = Power {
            left: 0.005,
            ..Default::default()
        };

        // Sub-threshold drive power does not count as driving
        assert_eq!(joint_move_hazards(&joint, &power), None);
    }

    #[test]
    fn test_back_electronics_box() {
        let joint = JointState {
            fork: 0.0,
            dump: -40.0,
            boom: 45.0,
            stick: 25.0,
            ..Default::default()
        };
        let power = Power {
            boom: -0.5,
            ..Default::default()
        };

        assert_eq!(
            joint_move_hazards(&joint, &power),
            Some("hitting back electronics box")
        );

        // Moving out of the region is allowed
        let power_out = Power {
            boom: 0.5,
            stick: -0.5,
            ..Default::default()
        };
        assert_eq!(joint_move_hazards(&joint, &power_out), None);
    }

    #[test]
    fn test_driving_posture_clear() {
        let power = Power {
            left: 0.8,
            right: 0.8,
            boom: 0.3,
            stick: 0.3,
            tilt: 0.3,
            ..Default::default()
        };

        assert_eq!(joint_move_hazards(&drive_joint(), &power), None);
    }

    #[test]
    fn test_grinder_can_spin_at_mine_posture() {
        let power = Power {
            attached: AttachedTool::Grinder { tool: 0.7 },
            ..Default::default()
        };

        assert_eq!(joint_move_hazards(&mine_base_joint(), &power), None);
    }

    #[test]
    fn test_point_to_line_dist() {
        let v = Point3::new(0.0, 0.0, 0.0);
        let w = Point3::new(0.0, 1.0, 0.0);

        // Beside the middle of the segment
        let p = Point3::new(0.0, 0.5, 0.3);
        assert!((point_to_line_dist(&v, &w, &p) - 0.3).abs() < 1e-9);

        // Past the end: distance to the endpoint
        let p = Point3::new(0.0, 2.0, 0.0);
        assert!((point_to_line_dist(&v, &w, &p) - 1.0).abs() < 1e-9);

        // Degenerate segment
        let p = Point3::new(0.0, 0.3, 0.4);
        assert!((point_to_line_dist(&v, &v, &p) - 0.5).abs() < 1e-9);
    }
}

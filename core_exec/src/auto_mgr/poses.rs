//! Named joint configurations used by the autonomy states.
//!
//! Angles in degrees, `{fork, dump, boom, stick, tilt, spin}`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::kinematics::JointState;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Weighing: scoop level, with pins aligned vertically.
pub const WEIGH_JOINT_SCOOP: JointState = JointState {
    fork: 0.0,
    dump: -20.0,
    boom: 0.0,
    stick: 0.0,
    tilt: 0.0,
    spin: 0.0,
};

/// Back to carrying after a weigh.
pub const WEIGH_JOINT_FINISH: JointState = JointState {
    fork: 6.0,
    dump: -15.0,
    boom: 0.0,
    stick: 0.0,
    tilt: 0.0,
    spin: 0.0,
};

/// Scoop raised clear of the ground for driving.
pub const DRIVE_JOINT_SCOOP: JointState = JointState {
    fork: 10.0,
    dump: -40.0,
    boom: 0.0,
    stick: 0.0,
    tilt: 0.0,
    spin: 0.0,
};

/// Scoop tipped out for dumping into the trough.
pub const DUMP_JOINT_SCOOP: JointState = JointState {
    fork: -10.0,
    dump: -80.0,
    boom: 0.0,
    stick: 0.0,
    tilt: 0.0,
    spin: 0.0,
};

/// Starting configuration during mining, arm fairly forward.
pub const MINE_JOINT_BASE: JointState = JointState {
    fork: -17.0,
    dump: -30.0,
    boom: 10.0,
    stick: 0.0,
    tilt: -30.0,
    spin: 0.0,
};

/// Arm raised out of the cut at the end of a mining pass.
pub const MINE_JOINT_FINISH: JointState = JointState {
    fork: -17.0,
    dump: -30.0,
    boom: 40.0,
    stick: 7.0,
    tilt: -45.0,
    spin: 0.0,
};

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::kinematics::joint_state_sane;

    #[test]
    fn test_all_poses_sane() {
        for pose in &[
            WEIGH_JOINT_SCOOP,
            WEIGH_JOINT_FINISH,
            DRIVE_JOINT_SCOOP,
            DUMP_JOINT_SCOOP,
            MINE_JOINT_BASE,
            MINE_JOINT_FINISH,
        ] {
            assert!(joint_state_sane(pose), "pose out of limits: {:?}", pose);
        }
    }
}

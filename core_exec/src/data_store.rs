//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exch_if::nav::{DriveCommands, Location2D, NavTarget};
use exch_if::state::{Accumulated, BackendState, RobotSensors, Tuneables};

use crate::auto_mgr::RobotState;
use crate::kinematics::JointState;
use crate::power::Power;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the backend executable: everything the backend
/// knows about the robot.
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// Seconds since backend start
    pub cur_time: f64,

    /// Length of the last cycle, seconds, capped for sanity
    pub dt: f64,

    // Autonomy
    /// Current autonomy state
    pub state: RobotState,

    /// State change requested externally (frontend or local UI)
    pub requested_state: Option<RobotState>,

    // Integrated robot state
    /// Measured joint angles
    pub joint: JointState,

    /// Joint angles the autonomy is currently seeking
    pub joint_plan: JointState,

    /// Power demands for this cycle
    pub power: Power,

    /// Manual power from the local UI, applied in `backend_driver`
    pub ui_power: Power,

    /// Operator tuneables from the last power command
    pub tuneable: Tuneables,

    /// Last sensor snapshot
    pub sensor: RobotSensors,

    /// Accumulated totals
    pub accum: Accumulated,

    /// Fused localization estimate
    pub loc: Location2D,

    /// False when any body IMU fails the gravity sanity check
    pub imus_ok: bool,

    // Path planner coupling
    /// Navigation target to publish for the path planner
    pub plan_target: NavTarget,

    /// Last drive command read from the planner
    pub last_drive_cmd: DriveCommands,

    /// `cur_time` at which the planner command last updated
    pub last_drive_update_time: f64,

    /// Consecutive cycles with invalid planner drive commands
    pub robot_insanity_counter: u32,

    /// False under --noplan: autonomy falls back to dumb driving
    pub plan_enabled: bool,

    /// True under --nodrive: autonomy keeps drive outputs at zero
    pub nodrive: bool,

    // Monitoring counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for DataStore {
    fn default() -> Self {
        Self {
            num_cycles: 0,
            cur_time: 0.0,
            dt: 0.0,
            state: RobotState::Stop,
            requested_state: None,
            joint: JointState::default(),
            joint_plan: JointState::default(),
            power: Power::default(),
            ui_power: Power::default(),
            tuneable: Tuneables::default(),
            sensor: RobotSensors::default(),
            accum: Accumulated::default(),
            loc: Location2D::default(),
            imus_ok: true,
            plan_target: NavTarget::no_target(),
            last_drive_cmd: DriveCommands::default(),
            last_drive_update_time: -1.0e9,
            robot_insanity_counter: 0,
            plan_enabled: true,
            nodrive: false,
            num_consec_cycle_overruns: 0,
        }
    }
}

impl DataStore {
    /// Perform actions required at the start of a cycle.
    pub fn cycle_start(&mut self, cur_time: f64) {
        // Cap dt so a hitch does not integrate a huge step
        self.dt = (cur_time - self.cur_time).min(0.1).max(0.0);
        self.cur_time = cur_time;
    }

    /// Fill the exchange image of the integrated state.
    pub fn to_backend_state(&self, state_start_time: f64) -> BackendState {
        BackendState {
            state: self.state as u8,
            imus_ok: self.imus_ok as u8,
            joint: self.joint.to_angles(),
            power: self.power.to_pod(),
            sensor: self.sensor,
            loc: self.loc,
            accum: self.accum,
            tuneable: self.tuneable,
            cur_time: self.cur_time,
            state_start_time,
        }
    }
}

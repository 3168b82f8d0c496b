//! # Autonomy state machine
//!
//! High-level autonomous operation of the robot: scanning the terrain,
//! running mining cuts with stall detection and backoff, weighing the
//! scoop load, hauling it across the field and dumping it. Manual states
//! pass frontend power straight through (optionally bypassing the hazard
//! checker), and `STOP` is the global recovery state.
//!
//! Every state starts its tick from zero power and writes only what it
//! needs; transitions go through [`AutoMgr::enter_state`] which records
//! per-state timings to `timing.log`. Autonomy failures are logged to
//! `autonomous.log` and drop the robot to manual `drive`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod poses;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};

// Standard
use std::fs::File;
use std::io::Write;

// Internal
use exch_if::nav::NavTarget;
use util::maths::limit_sym;
use util::session::Session;

use crate::data_store::DataStore;
use crate::kinematics::JointState;
use crate::mining::{split_progress, MinePlanner, MINE_POWER_LIMIT};
use crate::params::CoreParams;

use poses::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Proportional gain for joint seeking.
const JOINT_SEEK_P: f64 = 0.2;

/// Arrival band for joint seeking, degrees.
const JOINT_ARRIVE_DEG: f64 = 1.5;

/// Progress gained per tick of clean cutting, scaled by aggro.
const MINE_PROGRESS_RATE: f64 = 0.004;

/// Mining rate below which the cut stops advancing, raw spin units.
const MINE_RATE_SLOW: f32 = 50.0;

/// Tool load cell force indicating a side wedge, kgf.
const WEDGE_FORCE_KGF: f32 = -10.0;

/// Largest physical cut backoff applied to the target, meters.
const CAP_BACKOFF: f64 = 0.1;

/// Backoff accumulator limit: reaching it aborts the cut.
const MAX_BACKOFF: f64 = 0.3;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Top-level robot state.
///
/// The discriminant doubles as the `autonomy.mode` byte published to the
/// slot drivers: 0 is safe mode, 1-2 manual driving, above 2 autonomous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RobotState {
    /// All powers zero; latches until an external state request.
    Stop = 0,

    /// Manual power from the frontend, hazard checked.
    Drive = 1,

    /// Manual power from the frontend, hazard checker bypassed.
    DriveRaw = 2,

    /// Power copied from the local UI.
    BackendDriver = 3,

    /// Entry point of full autonomy.
    Autonomy = 4,

    /// Stare at the terrain to cue vision.
    Scan = 5,

    /// Move the arm to the mining base posture.
    MineStart = 6,

    /// Run the cut.
    Mine = 7,

    /// Mining head stalled: retract the boom until cleared.
    MineStall = 8,

    /// Raise the arm out of the cut.
    MineFinish = 9,

    /// Weigh the scoop load on the load cells.
    Weigh = 10,

    /// Begin a haul cycle.
    HaulStart = 11,

    /// Drive out to the dump area.
    HaulOut = 12,

    /// Dump the scoop.
    HaulDump = 13,

    /// Drive back into the pit.
    HaulBack = 14,

    /// Wrap up the haul cycle.
    HaulFinish = 15,

    /// Fold into the parked configuration.
    Stow = 16,

    /// Parked; a fixed point.
    Stowed = 17,

    /// Clear accumulated totals to start a new day.
    DailyStart = 18,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Autonomy manager: owns the state machine bookkeeping that must survive
/// between ticks.
pub struct AutoMgr {
    params: CoreParams,

    /// Within an autonomous state, the current sub-step (starts at 0).
    substep: u32,

    /// `cur_time` when the current state was entered.
    state_start_time: f64,

    /// `cur_time` when full autonomy was started.
    autonomy_start_time: f64,

    /// `cur_time` when mining last started.
    mine_start_time: f64,

    /// 0-1 progress of the mining cut.
    mine_progress: f64,

    /// Mining head stall response, meters backed off the cut face.
    stall_backoff: f64,

    /// Haul direction: outbound (increasing Y) or inbound.
    haul_out_phase: bool,

    /// Previous state, stashed at each transition.
    last_state: RobotState,

    /// Drive smoothing memory.
    last_drive: (f64, f64),

    planner: MinePlanner,

    /// One line per state transition: seconds spent in the prior state.
    timing_log: Option<File>,

    /// One line per autonomous failure with its cause.
    autonomous_log: Option<File>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl RobotState {
    /// Parse a state byte from a frontend command.
    pub fn from_u8(value: u8) -> Option<Self> {
        use RobotState::*;
        Some(match value {
            0 => Stop,
            1 => Drive,
            2 => DriveRaw,
            3 => BackendDriver,
            4 => Autonomy,
            5 => Scan,
            6 => MineStart,
            7 => Mine,
            8 => MineStall,
            9 => MineFinish,
            10 => Weigh,
            11 => HaulStart,
            12 => HaulOut,
            13 => HaulDump,
            14 => HaulBack,
            15 => HaulFinish,
            16 => Stow,
            17 => Stowed,
            18 => DailyStart,
            _ => return None,
        })
    }

    /// True for the states run by the autonomous state machine.
    pub fn is_autonomous(self) -> bool {
        self as u8 >= RobotState::Autonomy as u8
    }
}

impl std::fmt::Display for RobotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use RobotState::*;
        let name = match self {
            Stop => "STOP",
            Drive => "drive",
            DriveRaw => "driveraw",
            BackendDriver => "backend_driver",
            Autonomy => "autonomy",
            Scan => "scan",
            MineStart => "mine_start",
            Mine => "mine",
            MineStall => "mine_stall",
            MineFinish => "mine_finish",
            Weigh => "weigh",
            HaulStart => "haul_start",
            HaulOut => "haul_out",
            HaulDump => "haul_dump",
            HaulBack => "haul_back",
            HaulFinish => "haul_finish",
            Stow => "stow",
            Stowed => "stowed",
            DailyStart => "daily_start",
        };
        write!(f, "{}", name)
    }
}

impl AutoMgr {
    pub fn new(params: CoreParams) -> Self {
        Self {
            params,
            substep: 0,
            state_start_time: 0.0,
            autonomy_start_time: 0.0,
            mine_start_time: 0.0,
            mine_progress: 0.0,
            stall_backoff: 0.0,
            haul_out_phase: true,
            last_state: RobotState::Stop,
            last_drive: (0.0, 0.0),
            planner: MinePlanner::new(&MINE_JOINT_BASE),
            timing_log: None,
            autonomous_log: None,
        }
    }

    /// Open the dedicated state-timing and failure logs in the session
    /// directory.
    pub fn init(&mut self, session: &Session) -> std::io::Result<()> {
        self.timing_log = Some(File::create(session.log_path("timing.log"))?);
        self.autonomous_log = Some(File::create(session.log_path("autonomous.log"))?);
        Ok(())
    }

    pub fn mine_progress(&self) -> f64 {
        self.mine_progress
    }

    pub fn stall_backoff(&self) -> f64 {
        self.stall_backoff
    }

    pub fn state_start_time(&self) -> f64 {
        self.state_start_time
    }

    /// The state before the most recent transition.
    pub fn last_state(&self) -> RobotState {
        self.last_state
    }

    /// Per-tick state handling.
    ///
    /// Manual power for `drive` / `driveraw` is already in
    /// `ds.power` (placed there by the command receiver); autonomous
    /// states recompute power from scratch.
    pub fn step(&mut self, ds: &mut DataStore) {
        // External state requests take effect immediately
        if let Some(requested) = ds.requested_state.take() {
            info!("Entering new state {} by external request", requested);
            ds.state = requested;
            self.state_start_time = ds.cur_time;
            self.substep = 0;
        }

        match ds.state {
            RobotState::Stop => {
                ds.power.stop();
                self.state_start_time = ds.cur_time;
            }
            RobotState::Drive | RobotState::DriveRaw => {
                // Power already set from the frontend command
                self.state_start_time = ds.cur_time;
            }
            RobotState::BackendDriver => {
                ds.power = ds.ui_power;
            }
            _ => self.autonomous_state(ds),
        }
    }

    /// Enter a new state (semi)autonomously.
    pub fn enter_state(&mut self, ds: &mut DataStore, new_state: RobotState) {
        // Flush any planned path on state change
        ds.plan_target = NavTarget::no_target();

        if new_state == RobotState::Autonomy {
            self.autonomy_start_time = ds.cur_time;
        }

        if let Some(ref mut log_file) = self.timing_log {
            writeln!(
                log_file,
                "{:4} spent {:6.3} seconds in {}",
                (ds.cur_time - self.autonomy_start_time) as i64,
                ds.cur_time - self.state_start_time,
                ds.state
            )
            .ok();
            log_file.flush().ok();
        }

        self.last_state = ds.state;
        ds.state = new_state;
        info!("Entering new state {}", ds.state);
        self.state_start_time = ds.cur_time;
        self.substep = 0;
        self.last_drive = (0.0, 0.0);
    }

    /// Call when something has gone wrong with autonomous operations:
    /// log the cause and drop to manual drive.
    fn autonomous_fail(&mut self, ds: &mut DataStore, what: &str) {
        error!("AUTONOMOUS FAIL: {}", what);

        if let Some(ref mut log_file) = self.autonomous_log {
            writeln!(
                log_file,
                "{:.3}: Fail at time {:.3} into state {}: {}",
                ds.cur_time,
                ds.cur_time - self.state_start_time,
                ds.state,
                what
            )
            .ok();
            log_file.flush().ok();
        }

        self.enter_state(ds, RobotState::Drive);
    }

    // ---- AUTONOMOUS STATES ----

    fn autonomous_state(&mut self, ds: &mut DataStore) {
        // Each state starts from scratch
        ds.power.stop();

        let time_in_state = ds.cur_time - self.state_start_time;
        debug!("In state {} for {:.1} seconds", ds.state, time_in_state);

        match ds.state {
            // Full autonomy start
            RobotState::Autonomy => {
                self.enter_state(ds, RobotState::Scan);
            }

            // Clear accumulated data to start a new day
            RobotState::DailyStart => {
                ds.accum.scoop = 0.0;
                ds.accum.scoop_total = 0.0;
                ds.accum.drive = 0.0;
                ds.accum.drive_total = 0.0;
                ds.accum.op_total = 0.0;
                self.enter_state(ds, RobotState::Stop);
            }

            // Scan terrain before mining: stare at the cut face so vision
            // can capture it
            RobotState::Scan => {
                if time_in_state >= 2.0 {
                    self.mine_start_time = ds.cur_time;
                    self.enter_state(ds, RobotState::MineStart);
                }
            }

            RobotState::MineStart => {
                self.mine_progress = 0.0;
                self.stall_backoff = 0.0;

                if self.move_arm(ds, &MINE_JOINT_BASE, 1.0) {
                    self.enter_state(ds, RobotState::Mine);
                }
            }

            RobotState::Mine => {
                self.state_mine(ds);
            }

            // Mining head stalled: raise the head until cleared. Entry from
            // `mine` stays disabled (stall_backoff covers it); the state
            // remains reachable by operator request.
            RobotState::MineStall => {
                if time_in_state < 1.0 {
                    if ds.sensor.mstall != 0 {
                        // Retract the boom, pulling out of the cut
                        ds.power.boom = -1.0;
                    }
                    else {
                        self.enter_state(ds, RobotState::Mine);
                    }
                }
                else {
                    // Held the leash too long
                    self.enter_state(ds, RobotState::Stop);
                }
            }

            // Done mining: raise the arm
            RobotState::MineFinish => {
                if self.move_arm(ds, &MINE_JOINT_FINISH, 1.0) {
                    self.enter_state(ds, RobotState::Stop);
                }
            }

            RobotState::Weigh => {
                self.state_weigh(ds, time_in_state);
            }

            // Begin haul cycle
            RobotState::HaulStart => {
                ds.accum.drive_total += ds.accum.drive;
                ds.accum.drive = 0.0;
                self.enter_state(ds, RobotState::HaulOut);
            }

            // Drive out to the dump area
            RobotState::HaulOut => {
                if self.haul_drive_done(ds) {
                    self.enter_state(ds, RobotState::Drive);
                }
            }

            // Dump material
            RobotState::HaulDump => {
                ds.accum.drive_total += ds.accum.drive;
                ds.accum.drive = 0.0;

                if self.move_scoop(ds, &DUMP_JOINT_SCOOP) {
                    ds.accum.scoop_total += ds.accum.scoop;
                    ds.accum.scoop = 0.0;

                    self.enter_state(ds, RobotState::Stop);
                }
            }

            // Drive back into the pit
            RobotState::HaulBack => {
                if self.haul_drive_done(ds) {
                    self.enter_state(ds, RobotState::Drive);
                }
            }

            RobotState::HaulFinish => {
                ds.accum.drive_total += ds.accum.drive;
                ds.accum.drive = 0.0;
                self.enter_state(ds, RobotState::Drive);
            }

            // Stow the robot (like for moving it)
            RobotState::Stow => {
                if time_in_state < 20.0 {
                    ds.power.dump = -1.0;
                }
                self.enter_state(ds, RobotState::Stowed);
            }

            RobotState::Stowed => {
                // Wait here forever
            }

            _ => {
                // Unrecognized state: back to manual
                warn!("Autonomy: unrecognized state {}", ds.state);
                self.enter_state(ds, RobotState::Drive);
            }
        }

        if ds.nodrive {
            // Do not drive (except in manual states)
            debug!("NODRIVE");
            self.set_drive_powers(ds, 0.0, 0.0);
        }
    }

    /// One tick of the `mine` state: run the tool, watch for stalls and
    /// side wedges, back off when the cut is not going well, and advance
    /// the cut when it is.
    fn state_mine(&mut self, ds: &mut DataStore) {
        // Tool is running, capped for autonomy
        ds.power
            .set_tool_rate((ds.tuneable.tool as f64).min(MINE_POWER_LIMIT));

        let aggro = ds.tuneable.aggro as f64;

        // Cutting head should progress along the cut
        let mut advance = true;
        // Cutting head should move back from the cut face
        let mut backoff = false;

        // Stall check using the mining rate
        if ds.sensor.minerate < MINE_RATE_SLOW {
            advance = false;
            if ds.sensor.minerate == 0.0 {
                // Definitely stalled
                backoff = true;
            }
        }

        // Side wedge detection using the tool load cell
        if ds.sensor.load_tr < WEDGE_FORCE_KGF {
            advance = false;
            backoff = true;
        }

        if backoff {
            // Cut not going well, increase backoff
            self.stall_backoff += 0.02;
            if self.stall_backoff > MAX_BACKOFF {
                // Allow a faster restart after the operator clears us
                self.stall_backoff = MAX_BACKOFF * 0.4;
                self.enter_state(ds, RobotState::Stop);
                ds.power.stop();
                return;
            }
        }
        else if advance {
            // Normal cut, decay the backoff
            self.stall_backoff = self.stall_backoff.min(CAP_BACKOFF);
            self.stall_backoff = self.stall_backoff * 0.96 - 0.005 * aggro;
            if self.stall_backoff < 0.0 {
                self.stall_backoff = 0.0;
            }
        }

        if self.stall_backoff > 0.0 {
            advance = false;
        }

        // Path planning into the cut face
        let (out, up) = split_progress(self.mine_progress, aggro);

        // Depth to mine below the observed surface; negative is clearance
        // above it
        let mine_cut_depth = 0.01 * ds.tuneable.cut as f64
            - self.stall_backoff.min(CAP_BACKOFF)
            - out;

        let mut mine_joint = MINE_JOINT_BASE;
        if self
            .planner
            .mine_plan(ds.sensor.frame_pitch as f64, up, mine_cut_depth, &mut mine_joint)
            < 0
        {
            self.enter_state(ds, RobotState::Stop);
            ds.power.stop();
            return;
        }

        debug!(
            "Mining: {:.1} s in, progress {:.3} -> out {:.3} up {:.3}",
            ds.cur_time - self.mine_start_time,
            self.mine_progress,
            out,
            up
        );

        if self.move_arm(ds, &mine_joint, 1.0) {
            if advance {
                self.mine_progress += MINE_PROGRESS_RATE * aggro;
            }

            if self.mine_progress >= 1.0 {
                self.mine_progress = 0.0;
                ds.power.set_tool_rate(0.0);
                self.enter_state(ds, RobotState::MineFinish);
            }
        }
    }

    /// Weigh the scoop load: settle on one load cell channel, then the
    /// other, and fold the total into the accumulators.
    fn state_weigh(&mut self, ds: &mut DataStore, time_in_state: f64) {
        match self.substep {
            0 => {
                // Move to the weigh configuration. A bad IMU here risks
                // dumping the load on the ground, so bail to manual.
                if !ds.imus_ok {
                    self.enter_state(ds, RobotState::Drive);
                }
                else {
                    // Restart the clock so the settle timers below begin
                    // when the pose is reached
                    self.state_start_time = ds.cur_time;
                    if self.move_scoop(ds, &WEIGH_JOINT_SCOOP) {
                        self.substep += 1;
                    }
                }
            }
            1 => {
                // Let the dirt settle, reading the right channel
                if time_in_state < 1.5 {
                    ds.power.read_l = false;
                }
                else {
                    self.substep += 1;
                }
            }
            2 => {
                // Read the left channel
                if time_in_state < 3.0 {
                    ds.power.read_l = true;
                }
                else {
                    let total = -(ds.sensor.load_sl + ds.sensor.load_sr) as f64;
                    info!("Total scoop weight: {:.2} kgf", total);

                    ds.power.read_l = false;
                    ds.accum.scoop = total as f32;
                    self.substep += 1;
                }
            }
            _ => {
                // Back to the driving configuration
                if self.move_scoop(ds, &WEIGH_JOINT_FINISH) {
                    self.enter_state(ds, RobotState::Stop);
                }
            }
        }
    }

    // ---- JOINT SEEKING ----

    /// Set the power value to move one joint toward its target. Returns
    /// true once the joint is basically there.
    fn move_single_joint(
        target: f64,
        current: f64,
        power: &mut f64,
        scale: f64,
        cap: f64,
    ) -> bool {
        let err = target - current;
        *power = limit_sym(JOINT_SEEK_P * scale * err, cap);

        err.abs() < JOINT_ARRIVE_DEG
    }

    /// Seek the front scoop (fork and dump) to this joint state. Returns
    /// true when it has basically arrived.
    fn move_scoop(&mut self, ds: &mut DataStore, target: &JointState) -> bool {
        ds.joint_plan.fork = target.fork;
        ds.joint_plan.dump = target.dump;

        // SUBTLE: a short-circuit && here would serialize joint motion
        let fork_there = Self::move_single_joint(
            target.fork,
            ds.joint.fork,
            &mut ds.power.fork,
            1.0,
            1.0,
        );
        let dump_there = Self::move_single_joint(
            target.dump,
            ds.joint.dump,
            &mut ds.power.dump,
            1.0,
            1.0,
        );
        fork_there & dump_there
    }

    /// Seek the arm (boom, stick, tilt) to this joint state. Returns true
    /// when it has basically arrived.
    fn move_arm(&mut self, ds: &mut DataStore, target: &JointState, speed: f64) -> bool {
        ds.joint_plan = *target;

        debug!(
            "move_arm target FD {:5.1} {:5.1} BSTS {:5.1} {:5.1} {:5.1} {:5.1}",
            target.fork, target.dump, target.boom, target.stick, target.tilt, target.spin
        );

        // Boom actuator is plumbed backwards; spin is hardware locked
        let boom_there = Self::move_single_joint(
            target.boom,
            ds.joint.boom,
            &mut ds.power.boom,
            -speed,
            1.0,
        );
        let stick_there = Self::move_single_joint(
            target.stick,
            ds.joint.stick,
            &mut ds.power.stick,
            speed,
            1.0,
        );
        let tilt_there = Self::move_single_joint(
            target.tilt,
            ds.joint.tilt,
            &mut ds.power.tilt,
            speed,
            1.0,
        );

        boom_there & stick_there & tilt_there
    }

    // ---- AUTONOMOUS DRIVING ----

    /// Drive power from forward and turn components, capped by the
    /// operator's drive tuneable.
    fn set_drive_powers(&mut self, ds: &mut DataStore, forward: f64, turn: f64) {
        let max_autonomous_drive = 1.0;
        let drive_power = ds.tuneable.drive as f64;

        let t = limit_sym(turn, drive_power);
        let d = limit_sym(forward, drive_power);
        ds.power.left = limit_sym(d - t, max_autonomous_drive);
        ds.power.right = limit_sym(d + t, max_autonomous_drive);
    }

    /// Avoid jerky driving by blending toward the previous commands.
    fn smooth_robot_drive(&mut self, ds: &mut DataStore, amount: f64) {
        ds.power.left = amount * self.last_drive.0 + (1.0 - amount) * ds.power.left;
        ds.power.right = amount * self.last_drive.1 + (1.0 - amount) * ds.power.right;
        self.last_drive = (ds.power.left, ds.power.right);
    }

    /// Drive toward this target using the separate path-planner process.
    /// Returns true once we're basically at the target location.
    fn autonomous_drive_planner(&mut self, ds: &mut DataStore, target: NavTarget) -> bool {
        // Publish the request; the main loop posts it to the exchange
        ds.plan_target = target;

        if ds.cur_time - ds.last_drive_update_time < self.params.max_drive_seconds
            && ds.last_drive_cmd.is_sane()
        {
            ds.robot_insanity_counter = 0;
            ds.power.left =
                ds.last_drive_cmd.left as f64 * self.params.autonomous_drive_power;
            ds.power.right =
                ds.last_drive_cmd.right as f64 * self.params.autonomous_drive_power;
        }
        else {
            debug!("Invalid drive command detected, increasing robot insanity counter");
            ds.robot_insanity_counter += 1;

            if ds.robot_insanity_counter >= 10 {
                warn!("Robot insanity counter has reached 10, exiting autonomy");
                self.enter_state(ds, RobotState::Drive);
            }
        }

        target.matches(&ds.loc)
    }

    /// Drive in a straight line toward this target without the planner.
    /// Ideally put the target just past where you want to end up.
    fn autonomous_drive_dumb(
        &mut self,
        ds: &mut DataStore,
        target: &NavTarget,
        speed: f64,
    ) -> bool {
        let cur = (ds.loc.x as f64, ds.loc.y as f64);
        let target_2d = (target.x as f64, target.y as f64);

        let drive_power = speed * ds.tuneable.drive as f64;

        let (ox, oy) = ds.loc.forward();
        let orient = (ox as f64, oy as f64);

        // We should be facing this way
        let to_us = (cur.0 - target_2d.0, cur.1 - target_2d.1);
        let len = (to_us.0 * to_us.0 + to_us.1 * to_us.1).sqrt().max(1.0e-9);
        let should = (to_us.0 / len, to_us.1 / len);

        // Cross product, like the sine of the heading error
        let mut turn = orient.0 * should.1 - orient.1 * should.0;

        // If backing up, turn the opposite way
        if orient.0 * should.0 + orient.1 * should.1 > 0.0 {
            turn = -turn;
        }

        // Dot product, like the remaining distance
        let drive = orient.0 * should.0 + orient.1 * should.1;

        let t = limit_sym(turn, drive_power);
        let d = limit_sym(drive, drive_power);
        ds.power.left = limit_sym(-d + t, drive_power);
        ds.power.right = limit_sym(-d - t, drive_power);

        len < 20.0
    }

    /// Drive toward this target, via the planner process when enabled.
    fn autonomous_drive(&mut self, ds: &mut DataStore, target: NavTarget) -> bool {
        if ds.plan_enabled {
            self.autonomous_drive_planner(ds, target)
        }
        else {
            self.autonomous_drive_dumb(ds, &target, 1.0)
        }
    }

    /// Check the drive battery; fail out of autonomy if low. Returns true
    /// if the check failed.
    fn drive_battery_check(&mut self, ds: &mut DataStore) -> bool {
        if (ds.sensor.charge_d as f64) < self.params.battery_fail_percent {
            self.autonomous_fail(ds, "Low drive battery");
            return true;
        }
        false
    }

    /// One tick of autonomous hauling. Returns true when the haul trip is
    /// done.
    fn haul_drive_done(&mut self, ds: &mut DataStore) -> bool {
        let p = self.params.clone();

        let target_out = NavTarget::new(
            p.haul_x_target as f32,
            (p.haul_y_start + p.haul_y_dist + 5.0) as f32,
            90.0,
        );
        let target_back =
            NavTarget::new(p.haul_x_target as f32, (p.haul_y_start - 5.0) as f32, 90.0);

        if self.drive_battery_check(ds) {
            return false;
        }

        // Stop driving when we reach the total required distance
        if ds.accum.drive as f64 >= p.haul_distance_m {
            return true;
        }

        // Else we're on a drive cycle
        let mut progress = (ds.loc.y as f64 - p.haul_y_start) / p.haul_y_dist;
        progress = progress.max(0.0).min(1.0);
        if !self.haul_out_phase {
            progress = 1.0 - progress;
        }

        if progress >= 1.0 {
            // We're there: flip to the next phase
            self.haul_out_phase = !self.haul_out_phase;
        }

        if self.haul_out_phase {
            self.autonomous_drive(ds, target_out);
        }
        else {
            self.autonomous_drive(ds, target_back);
        }

        debug!(
            "Autohaul: progress {:.2} {}",
            progress,
            if self.haul_out_phase { "out" } else { "back" }
        );

        // Avoid jerky driving by averaging drive commands
        self.smooth_robot_drive(ds, 0.9);

        false
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::power::AttachedTool;

    fn mgr_and_store() -> (AutoMgr, DataStore) {
        let mgr = AutoMgr::new(CoreParams::default());
        let mut ds = DataStore::default();
        ds.imus_ok = true;
        (mgr, ds)
    }

    #[test]
    fn test_stop_zeroes_power() {
        let (mut mgr, mut ds) = mgr_and_store();
        ds.state = RobotState::Stop;
        ds.power.left = 0.7;
        ds.power.boom = -0.4;

        mgr.step(&mut ds);

        assert_eq!(ds.power.left, 0.0);
        assert_eq!(ds.power.boom, 0.0);
    }

    #[test]
    fn test_autonomy_enters_scan() {
        let (mut mgr, mut ds) = mgr_and_store();
        ds.state = RobotState::Autonomy;

        mgr.step(&mut ds);

        assert_eq!(ds.state, RobotState::Scan);
    }

    #[test]
    fn test_external_state_request() {
        let (mut mgr, mut ds) = mgr_and_store();
        ds.state = RobotState::Stop;
        ds.requested_state = Some(RobotState::Drive);

        mgr.step(&mut ds);

        assert_eq!(ds.state, RobotState::Drive);
        assert!(ds.requested_state.is_none());
    }

    #[test]
    fn test_daily_start_clears_accumulators() {
        let (mut mgr, mut ds) = mgr_and_store();
        ds.state = RobotState::DailyStart;
        ds.accum.scoop_total = 12.0;
        ds.accum.drive_total = 340.0;
        ds.accum.op_total = 1000.0;

        mgr.step(&mut ds);

        assert_eq!(ds.accum.scoop_total, 0.0);
        assert_eq!(ds.accum.drive_total, 0.0);
        assert_eq!(ds.accum.op_total, 0.0);
        assert_eq!(ds.state, RobotState::Stop);
    }

    #[test]
    fn test_move_single_joint_arrival_band() {
        let mut power = 0.0;

        assert!(AutoMgr::move_single_joint(10.0, 9.0, &mut power, 1.0, 1.0));
        assert!((power - 0.2).abs() < 1e-9);

        assert!(!AutoMgr::move_single_joint(10.0, 0.0, &mut power, 1.0, 1.0));
        assert_eq!(power, 1.0); // capped

        assert!(AutoMgr::move_single_joint(10.0, 10.0, &mut power, 1.0, 1.0));
        assert_eq!(power, 0.0);
    }

    #[test]
    fn test_backend_driver_copies_ui_power() {
        let (mut mgr, mut ds) = mgr_and_store();
        ds.state = RobotState::BackendDriver;
        ds.ui_power.left = 0.3;
        ds.ui_power.attached = AttachedTool::Grinder { tool: 0.1 };

        mgr.step(&mut ds);

        assert_eq!(ds.power.left, 0.3);
        assert!(ds.power.attached_grinder());
    }

    #[test]
    fn test_state_mode_bytes() {
        assert_eq!(RobotState::Stop as u8, 0);
        assert!(!RobotState::Drive.is_autonomous());
        assert!(!RobotState::DriveRaw.is_autonomous());
        assert!(RobotState::Scan.is_autonomous());
        assert_eq!(RobotState::from_u8(7), Some(RobotState::Mine));
        assert_eq!(RobotState::from_u8(200), None);
    }
}

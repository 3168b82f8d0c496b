//! Sensor/actuator bridge between the exchange and the integrated state.
//!
//! Each tick the bridge pulls the raw slot rows out of the exchange
//! snapshot and turns them into the integrated robot state: load cells,
//! batteries, the filtered mining rate, IMU-derived joint angles (with an
//! IMU gravity sanity check), and drive distance accrual with encoder
//! wraparound correction. Going the other way, it scales float power
//! demands into integer motor percents and fans them out to the slot
//! command rows, bumping the backend heartbeat inside the same write
//! region.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::Serialize;
use thiserror::Error;

// Standard
use std::fs::File;
use std::io::Write;

// Internal
pub use params::Params;

use exch_if::imu::ImuState;
use exch_if::nav::{DriveEncoders, Location2D};
use exch_if::slots::NanoslotExchange;
use exch_if::state::RobotSensors;
use util::module::State;
use util::params as param_load;
use util::session::Session;

use crate::kinematics::JointState;
use crate::power::Power;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Powers beyond this magnitude are insane, not just saturated.
const POWER_SANITY_LIMIT: f64 = 4.0;

/// Earth gravity magnitude used by the IMU sanity check, m/s^2.
const GRAVITY: f32 = 9.8;

/// Number of mining rate samples in the peak filter window: smooth
/// (higher) vs responsive (lower).
const RATE_WINDOW: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Sensor/actuator bridge module state.
#[derive(Default)]
pub struct SensorBridge {
    params: Params,

    rate_filter: RateFilter,

    /// Dedicated log of IMU sanity failures.
    imu_err_log: Option<File>,

    /// Previous tick's sensors, for encoder deltas.
    old_sensor: Option<RobotSensors>,

    /// Last commanded drive power that was nonzero: encoder counts are
    /// unsigned, so this supplies the sign.
    last_nonzero_drive: (f64, f64),

    /// Localization distance accrual bookkeeping.
    last_distance_time: f64,
    last_loc: (f32, f32),

    /// Running per-track distance totals for the encoders channel.
    total_left: f32,
    total_right: f32,
}

/// Input data to the bridge.
pub struct InputData {
    /// Snapshot of the whole exchange.
    pub nano: NanoslotExchange,

    /// Current fused localization estimate.
    pub loc: Location2D,

    /// Power commanded last tick, for encoder sign recovery.
    pub power: Power,

    /// Seconds since backend start.
    pub cur_time: f64,
}

/// Output of one bridge tick.
pub struct OutputData {
    /// Integrated sensor snapshot.
    pub sensor: RobotSensors,

    /// IMU-derived joint angles.
    pub joint: JointState,

    /// True if every body IMU passed the gravity sanity check.
    pub imus_ok: bool,

    /// Plausible drive distance covered since the last check, meters.
    pub drive_distance_m: f64,

    /// Running per-track encoder distance totals.
    pub encoders: DriveEncoders,
}

/// Status report for bridge processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// IMUs failing the gravity check this tick.
    pub imu_failures: u8,

    /// A localization delta exceeded the max plausible speed and was
    /// rejected.
    pub loc_jump_rejected: bool,
}

/// Rolling mining-rate filter.
///
/// Publishes the peak of the window, not the mean: the raw spin counter
/// crosses zero between samples and a mean would false-trigger the stall
/// detector.
#[derive(Default)]
struct RateFilter {
    window: [f32; RATE_WINDOW],
    index: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to load bridge parameters: {0:?}")]
    ParamLoadError(param_load::LoadError),

    #[error("Failed to open the IMU error log: {0}")]
    ImuLogError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RateFilter {
    fn push(&mut self, next_rate: f32) -> f32 {
        self.window[self.index] = next_rate;
        self.index = (self.index + 1) % RATE_WINDOW;

        let mut peak = 0.0f32;
        for &sample in self.window.iter() {
            if sample > peak {
                peak = sample;
            }
        }
        peak
    }
}

impl State for SensorBridge {
    type InitData = &'static str;
    type InitError = BridgeError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = BridgeError;

    /// Initialise the bridge.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        self.params = param_load::load(init_data)
            .map_err(BridgeError::ParamLoadError)?;

        self.imu_err_log = Some(File::create(session.log_path("imu.errs"))?);

        Ok(())
    }

    /// Perform cyclic processing of the bridge.
    fn proc(&mut self, input: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let mut report = StatusReport::default();
        let nano = &input.nano;

        // ---- SENSOR SNAPSHOT ----

        let mut sensor = RobotSensors::default();

        sensor.load_tl = nano.slot_a1.state.load_l;
        sensor.load_tr = nano.slot_a1.state.load_r;
        sensor.load_sl = nano.slot_f1.state.load_l;
        sensor.load_sr = nano.slot_f1.state.load_r;

        sensor.cell_m = nano.slot_c0.state.cell;
        sensor.charge_m = nano.slot_c0.state.charge;
        sensor.cell_d = nano.slot_f0.state.cell;
        sensor.charge_d = nano.slot_f0.state.charge;

        sensor.minerate = self.rate_filter.push(nano.slot_c0.state.spin);
        sensor.mcount = nano.slot_c0.sensor.spincount as i32;
        sensor.mstall = (sensor.minerate == 0.0) as u8;

        sensor.frame_yaw = nano.slot_f1.state.frame.yaw;
        sensor.frame_pitch =
            nano.slot_f1.state.frame.pitch - self.params.frame_pitch_cal as f32;
        sensor.frame_roll = nano.slot_f1.state.frame.roll;

        // Drive encoder wiring: counts[0] is the left channel
        let drive = &nano.slot_d0;
        sensor.dlcount = drive.sensor.counts[0] as i32;
        sensor.dlstall = drive.sensor.stall & 1;
        sensor.drcount = drive.sensor.counts[1] as i32;
        sensor.drstall = drive.sensor.stall & (1 << 1);

        sensor.heartbeat = drive.debug.packet_count;
        sensor.encoder_raw = drive.sensor.raw as i32;
        sensor.stall_raw = drive.sensor.stall as i32;

        let mut connected = 0u8;
        connected |= (nano.slot_d0.state.link.connected & 1) << RobotSensors::CONNECTED_D0;
        connected |= (nano.slot_f0.state.link.connected & 1) << RobotSensors::CONNECTED_F0;
        connected |= (nano.slot_f1.state.link.connected & 1) << RobotSensors::CONNECTED_F1;
        connected |= (nano.slot_a0.state.link.connected & 1) << RobotSensors::CONNECTED_A0;
        connected |= (nano.slot_a1.state.link.connected & 1) << RobotSensors::CONNECTED_A1;
        connected |= (nano.slot_c0.state.link.connected & 1) << RobotSensors::CONNECTED_C0;
        sensor.connected = connected;

        // ---- IMU SANITY ----

        let imu_checks = [
            (&nano.slot_f1.state.frame, "frame"),
            (&nano.slot_f1.state.boom, "boom"),
            (&nano.slot_a1.state.stick, "stick"),
            (&nano.slot_a1.state.tool, "tool"),
            (&nano.slot_f1.state.fork, "fork"),
            (&nano.slot_f1.state.dump, "dump"),
        ];

        let mut imus_ok = true;
        for &(imu, what) in imu_checks.iter() {
            if let Some(g_err) = imu_gravity_error(imu) {
                imus_ok = false;
                report.imu_failures += 1;

                warn!("IMU {} error: g_err = {:.3} m/s^2", what, g_err);
                if let Some(ref mut log_file) = self.imu_err_log {
                    writeln!(
                        log_file,
                        "IMU {} error: g_err = {:.3} m/s^2   global ({:.2} {:.2} {:.2})",
                        what, g_err, imu.global.x, imu.global.y, imu.global.z
                    )
                    .ok();
                    log_file.flush().ok();
                }
            }
        }

        // ---- JOINT UPDATE ----

        let mut joint = JointState::default();
        joint.boom = nano.slot_f1.state.boom.pitch as f64;
        joint.stick = nano.slot_a1.state.stick.pitch as f64;
        joint.tilt =
            nano.slot_a1.state.tool.pitch as f64 + self.params.tool_pitch_cal;
        joint.spin = 0.0; // hardware locked
        joint.fork = nano.slot_f1.state.fork.pitch as f64;
        joint.dump = nano.slot_f1.state.dump.pitch as f64;

        // ---- DRIVE DISTANCE ACCRUAL ----

        let old_sensor = self.old_sensor.unwrap_or(sensor);

        let mut drive_l = fix_wrap256(sensor.dlcount as u8, old_sensor.dlcount as u8)
            * self.params.drive_count_to_m;
        let mut drive_r = fix_wrap256(sensor.drcount as u8, old_sensor.drcount as u8)
            * self.params.drive_count_to_m
            * self.params.right_drive_cal;

        // The encoders are non-quadrature: flip signs to match the last
        // nonzero commanded power
        if input.power.left != 0.0 || input.power.right != 0.0 {
            self.last_nonzero_drive = (input.power.left, input.power.right);
        }
        if self.last_nonzero_drive.0 < 0.0 {
            drive_l = -drive_l;
        }
        if self.last_nonzero_drive.1 < 0.0 {
            drive_r = -drive_r;
        }

        self.total_left += drive_l as f32;
        self.total_right += drive_r as f32;

        // When the encoders report motion, accrue the localizer's distance
        // delta, rejecting implausibly fast jumps
        let mut drive_distance_m = 0.0;
        if (drive_l != 0.0 || drive_r != 0.0)
            && input.cur_time - self.last_distance_time
                > self.params.distance_check_period_s
        {
            let dx = (input.loc.x - self.last_loc.0) as f64;
            let dy = (input.loc.y - self.last_loc.1) as f64;
            let dist = (dx * dx + dy * dy).sqrt();
            self.last_loc = (input.loc.x, input.loc.y);

            let max_dist =
                self.params.max_loc_speed_mps * self.params.distance_check_period_s;
            if dist > 0.0 && dist < max_dist {
                drive_distance_m = dist;
            }
            else if dist >= max_dist {
                report.loc_jump_rejected = true;
            }

            self.last_distance_time = input.cur_time;
        }

        self.old_sensor = Some(sensor);

        Ok((
            OutputData {
                sensor,
                joint,
                imus_ok,
                drive_distance_m,
                encoders: DriveEncoders {
                    left: self.total_left,
                    right: self.total_right,
                },
            },
            report,
        ))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert -1.0 to +1.0 float power to a discrete -100 to +100 motor
/// percent.
///
/// NaN or wildly out-of-range values are insane and coerce to 0 (logged);
/// merely saturated values clamp.
pub fn motor_scale(power: f64, what: &str) -> i8 {
    if !power.is_finite() || power.abs() > POWER_SANITY_LIMIT {
        warn!("Power {} ERROR: value {} insane, using 0", what, power);
        return 0;
    }

    let power = power.max(-1.0).min(1.0);
    (power * 100.0) as i8
}

/// Fan the power vector out to every slot's command row, and bump the
/// backend heartbeat.
///
/// Must be called inside one exchange write region so a slot driver never
/// sees half-updated command fields.
pub fn apply_commands(power: &Power, mode: u8, nano: &mut NanoslotExchange) {
    nano.autonomy.mode = mode;

    // Arm joint torques
    if power.attached_arm() {
        let torque = power.arm_torques();
        nano.slot_70.command.torque[0] = motor_scale(torque[0], "arm0");
        nano.slot_71.command.torque[0] = motor_scale(torque[1], "arm1");
        nano.slot_72.command.torque[0] = motor_scale(torque[2], "arm2");
        nano.slot_73.command.torque[0] = motor_scale(torque[3], "arm3");
    }

    // Mining head
    let mine_power = if power.attached_grinder() {
        power.tool_rate()
    }
    else {
        0.0
    };
    nano.slot_c0.command.mine = motor_scale(mine_power, "mine");

    // Load cell read side
    nano.slot_a1.command.read_l = power.read_l as u8;
    nano.slot_f1.command.read_l = power.read_l as u8;

    // Arm electronics box: spin (locked), clamp, tilt, stick
    let arm_box = &mut nano.slot_a0.command;
    arm_box.motor[0] = 0;
    arm_box.motor[1] = motor_scale(
        if power.attached_arm() {
            power.arm_torques()[4]
        }
        else {
            0.0
        },
        "clamp",
    );
    arm_box.motor[2] = motor_scale(power.tilt, "tilt");
    arm_box.motor[3] = motor_scale(power.stick, "stick");

    // Front box: dump and fork actuators run reversed
    let front_box = &mut nano.slot_f0.command;
    front_box.motor[0] = -motor_scale(power.dump, "dump");
    front_box.motor[1] = -motor_scale(power.fork, "fork");
    front_box.motor[2] = 0; // spare
    front_box.motor[3] = motor_scale(power.boom, "boom");

    // Drive tracks, front/back pairs per side, reversed wiring
    let left = motor_scale(power.left, "left");
    let right = motor_scale(power.right, "right");
    nano.slot_d0.command.motor = [-left, -right, -left, -right];

    nano.slot_ee.command.led = motor_scale(power.right, "led");

    nano.backend_heartbeat = nano.backend_heartbeat.wrapping_add(1);
}

/// Convert an unsigned 8-bit counter difference into a signed float delta.
pub fn fix_wrap256(new: u8, old: u8) -> f64 {
    (new.wrapping_sub(old) as i8) as f64
}

/// Gravity error of one IMU, or `None` if the IMU looks healthy.
///
/// A global gravity estimate far from (0, 0, 9.8) means either
/// sudden-onset vibration or a failed sensor; the allowance scales with
/// the measured vibration.
pub fn imu_gravity_error(imu: &ImuState) -> Option<f32> {
    let err = exch_if::imu::Vec3f::new(
        imu.global.x,
        imu.global.y,
        imu.global.z - GRAVITY,
    )
    .length();

    if err > 3.0 * imu.vibe.length() + 4.0 {
        Some(err)
    }
    else {
        None
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use exch_if::imu::Vec3f;

    #[test]
    fn test_motor_scale_clamps() {
        assert_eq!(motor_scale(0.5, "t"), 50);
        assert_eq!(motor_scale(-0.5, "t"), -50);
        assert_eq!(motor_scale(1.7, "t"), 100);
        assert_eq!(motor_scale(-2.3, "t"), -100);
    }

    #[test]
    fn test_motor_scale_rejects_insane() {
        assert_eq!(motor_scale(f64::NAN, "t"), 0);
        assert_eq!(motor_scale(5.0, "t"), 0);
        assert_eq!(motor_scale(-100.0, "t"), 0);
        assert_eq!(motor_scale(f64::INFINITY, "t"), 0);
    }

    #[test]
    fn test_fix_wrap256_law() {
        for &(a, b) in &[(0u8, 1u8), (255, 0), (0, 255), (10, 250), (128, 127)] {
            let expected = ((b as i32 - a as i32 + 128).rem_euclid(256) - 128) as f64;
            assert_eq!(fix_wrap256(b, a), expected, "a={} b={}", a, b);
        }
    }

    #[test]
    fn test_rate_filter_publishes_peak() {
        let mut filter = RateFilter::default();

        assert_eq!(filter.push(100.0), 100.0);
        // A zero-crossing dropout must not read as a stall
        assert_eq!(filter.push(0.0), 100.0);
        assert_eq!(filter.push(80.0), 100.0);
        // The old peak ages out of the window
        assert_eq!(filter.push(0.0), 80.0);
    }

    #[test]
    fn test_imu_gravity_error() {
        let mut imu = ImuState::default();
        imu.global = Vec3f::new(0.0, 0.0, 9.8);
        assert!(imu_gravity_error(&imu).is_none());

        // Dead IMU reporting zero gravity
        imu.global = Vec3f::new(0.0, 0.0, 0.0);
        assert!(imu_gravity_error(&imu).is_some());

        // Same reading is excused by heavy vibration
        imu.vibe = Vec3f::new(2.0, 0.0, 0.0);
        assert!(imu_gravity_error(&imu).is_none());
    }

    #[test]
    fn test_apply_commands_fanout() {
        let mut nano = NanoslotExchange::default();
        let mut power = Power::default();
        power.left = 0.5;
        power.right = -0.25;
        power.fork = 0.1;
        power.dump = 0.2;
        power.boom = 0.3;
        power.attached = crate::power::AttachedTool::Grinder { tool: 0.6 };

        apply_commands(&power, 7, &mut nano);

        assert_eq!(nano.autonomy.mode, 7);
        assert_eq!(nano.slot_d0.command.motor, [-50, 25, -50, 25]);
        assert_eq!(nano.slot_f0.command.motor[0], -20); // dump reversed
        assert_eq!(nano.slot_f0.command.motor[1], -10); // fork reversed
        assert_eq!(nano.slot_f0.command.motor[3], 30);
        assert_eq!(nano.slot_c0.command.mine, 60);
    }

    #[test]
    fn test_heartbeat_increments_and_wraps() {
        let mut nano = NanoslotExchange::default();
        let power = Power::default();

        apply_commands(&power, 0, &mut nano);
        assert_eq!(nano.backend_heartbeat, 1);

        nano.backend_heartbeat = 255;
        apply_commands(&power, 0, &mut nano);
        assert_eq!(nano.backend_heartbeat, 0);
    }

    #[test]
    fn test_proc_joint_and_minerate() {
        let mut bridge = SensorBridge::default();

        let mut nano = NanoslotExchange::default();
        nano.slot_f1.state.boom.pitch = 12.0;
        nano.slot_a1.state.stick.pitch = -5.0;
        nano.slot_a1.state.tool.pitch = -20.0;
        nano.slot_f1.state.frame.pitch = 6.0;
        nano.slot_c0.state.spin = 120.0;

        // Healthy IMUs
        for imu in [
            &mut nano.slot_f1.state.frame,
            &mut nano.slot_f1.state.boom,
            &mut nano.slot_f1.state.fork,
            &mut nano.slot_f1.state.dump,
        ]
        .iter_mut()
        {
            imu.global = Vec3f::new(0.0, 0.0, 9.8);
        }
        nano.slot_a1.state.stick.global = Vec3f::new(0.0, 0.0, 9.8);
        nano.slot_a1.state.tool.global = Vec3f::new(0.0, 0.0, 9.8);

        let input = InputData {
            nano,
            loc: Location2D::default(),
            power: Power::default(),
            cur_time: 0.0,
        };

        let (output, report) = bridge.proc(&input).unwrap();

        assert!(output.imus_ok);
        assert_eq!(report.imu_failures, 0);
        assert_eq!(output.joint.boom, 12.0);
        assert_eq!(output.joint.stick, -5.0);
        assert_eq!(output.joint.tilt, -13.0); // +7 degree tool cal
        assert_eq!(output.joint.spin, 0.0);
        assert_eq!(output.sensor.minerate, 120.0);
        assert_eq!(output.sensor.mstall, 0);
        // Frame pitch calibration applied
        assert_eq!(output.sensor.frame_pitch, 2.0);
    }

    #[test]
    fn test_proc_flags_bad_imu() {
        let mut bridge = SensorBridge::default();

        let mut nano = NanoslotExchange::default();
        // All IMUs zeroed: every gravity estimate is wrong
        let input = InputData {
            nano: {
                nano.slot_c0.state.spin = 0.0;
                nano
            },
            loc: Location2D::default(),
            power: Power::default(),
            cur_time: 0.0,
        };

        let (output, report) = bridge.proc(&input).unwrap();

        assert!(!output.imus_ok);
        assert_eq!(report.imu_failures, 6);
        assert_eq!(output.sensor.mstall, 1);
    }

    #[test]
    fn test_encoder_distance_sign_tracks_power() {
        let mut bridge = SensorBridge::default();

        let mut nano = NanoslotExchange::default();
        nano.slot_d0.sensor.counts = [0, 0];

        // Prime the filter with the zero counts, driving backwards
        let mut power = Power::default();
        power.left = -0.5;
        power.right = -0.5;

        let input = InputData {
            nano,
            loc: Location2D::default(),
            power,
            cur_time: 0.0,
        };
        let _ = bridge.proc(&input).unwrap();

        // Wheels turned 12 ticks; commanded power was negative, so the
        // accumulated track distance must go negative
        let mut nano2 = NanoslotExchange::default();
        nano2.slot_d0.sensor.counts = [12, 12];
        let input2 = InputData {
            nano: nano2,
            loc: Location2D::default(),
            power: Power::default(),
            cur_time: 0.1,
        };
        let (output, _) = bridge.proc(&input2).unwrap();

        assert!(output.encoders.left < 0.0);
        assert!(output.encoders.right < 0.0);
        // Right channel carries its calibration factor
        assert!(output.encoders.right.abs() < output.encoders.left.abs());
    }
}

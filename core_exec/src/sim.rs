//! Robot simulator, used for software development and autonomy testing
//! without hardware.
//!
//! The simulator integrates the commanded power into joint angles, drive
//! encoder counts and a 2-D pose, then fills a slot exchange image the
//! way the real slot drivers would. The backend's sensor path is
//! identical in simulation and on the robot.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exch_if::imu::Vec3f;
use exch_if::nav::Location2D;
use exch_if::slots::NanoslotExchange;

use crate::bridge;
use crate::kinematics::{link_geometry, JointState, Link};
use crate::power::Power;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Joint speed at full power, degrees/second.
const JOINT_SPEED_DEG_S: f64 = 15.0;

/// Drive speed at full power, encoder ticks/second.
const DRIVE_TICKS_S: f64 = 20.0;

/// Meters of driving per encoder tick (matches the bridge calibration).
const TICK_TO_M: f64 = 0.96 / 12.0;

/// Track half-separation, meters.
const HALF_TRACK_M: f64 = 0.65;

/// Grinder spin counts per second at full rate.
const SPIN_COUNTS_S: f64 = 250.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulated robot.
pub struct Simulator {
    pub joint: JointState,
    pub loc: Location2D,

    dl_count: f64,
    dr_count: f64,
    spin_count: f64,
    spin_rate: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Simulator {
    /// Start in a pseudo-random plausible field location.
    pub fn new(seed: u64) -> Self {
        let mut joint = JointState::default();
        joint.dump = -40.0;
        joint.tilt = -30.0;

        Self {
            joint,
            loc: Location2D {
                x: ((seed % 10) * 20 + 100) as f32,
                y: 80.0,
                angle: ((seed % 8) * 8) as f32,
                percent: 50.0,
            },
            dl_count: 0.0,
            dr_count: 0.0,
            spin_count: 0.0,
            spin_rate: 0.0,
        }
    }

    /// Integrate these power values over one timestep, seconds.
    pub fn simulate(&mut self, power: &Power, dt: f64) {
        let joint_step = dt * JOINT_SPEED_DEG_S;

        move_joint(Link::Fork, &mut self.joint.fork, power.fork * joint_step);
        move_joint(Link::Dump, &mut self.joint.dump, power.dump * joint_step);

        // Boom actuator is a little slower and plumbed backwards
        move_joint(
            Link::Boom,
            &mut self.joint.boom,
            -0.6 * power.boom * joint_step,
        );
        move_joint(Link::Stick, &mut self.joint.stick, power.stick * joint_step);
        move_joint(Link::Tilt, &mut self.joint.tilt, power.tilt * joint_step);

        // Skid-steer drive
        let left_ticks = power.left * DRIVE_TICKS_S * dt;
        let right_ticks = power.right * DRIVE_TICKS_S * dt;

        // Non-quadrature encoders always count up
        self.dl_count += left_ticks.abs();
        self.dr_count += right_ticks.abs();

        let forward_m = (left_ticks + right_ticks) * 0.5 * TICK_TO_M;
        let turn_rad = (right_ticks - left_ticks) * TICK_TO_M / (2.0 * HALF_TRACK_M);

        let heading = (self.loc.angle as f64).to_radians();
        self.loc.x += (forward_m * heading.cos()) as f32;
        self.loc.y += (forward_m * heading.sin()) as f32;
        self.loc.angle =
            util::maths::reduce_angle(self.loc.angle + turn_rad.to_degrees() as f32);

        // Mining head
        self.spin_rate = power.tool_rate() * SPIN_COUNTS_S;
        self.spin_count = (self.spin_count + self.spin_rate * dt) % 256.0;
    }

    /// Fill a slot exchange image the way live slot drivers would.
    pub fn fill_exchange(&self, nano: &mut NanoslotExchange) {
        let cal = bridge::Params::default();

        let healthy = Vec3f::new(0.0, 0.0, 9.8);
        let imu = |pitch: f64| exch_if::imu::ImuState {
            global: healthy,
            vibe: Vec3f::default(),
            pitch: pitch as f32,
            yaw: 0.0,
            roll: 0.0,
        };

        let f1 = &mut nano.slot_f1.state;
        f1.link.connected = 1;
        // Mounting calibrations run the other way on the real robot
        f1.frame = imu(cal.frame_pitch_cal);
        f1.boom = imu(self.joint.boom);
        f1.fork = imu(self.joint.fork);
        f1.dump = imu(self.joint.dump);

        let a1 = &mut nano.slot_a1.state;
        a1.link.connected = 1;
        a1.stick = imu(self.joint.stick);
        a1.tool = imu(self.joint.tilt - cal.tool_pitch_cal);

        let c0 = &mut nano.slot_c0.state;
        c0.link.connected = 1;
        c0.spin = self.spin_rate as f32;
        c0.cell = 3.9;
        c0.charge = 75.0;

        let f0 = &mut nano.slot_f0.state;
        f0.link.connected = 1;
        f0.cell = 3.9;
        f0.charge = 75.0;

        nano.slot_a0.state.link.connected = 1;
        nano.slot_d0.state.link.connected = 1;

        nano.slot_d0.sensor.counts =
            [self.dl_count as u8, self.dr_count as u8];
        nano.slot_c0.sensor.spincount = self.spin_count as u8;
    }
}

fn move_joint(link: Link, angle: &mut f64, step: f64) {
    *angle += step;

    let geometry = link_geometry(link);
    if *angle > geometry.angle_max {
        *angle = geometry.angle_max;
    }
    if *angle < geometry.angle_min {
        *angle = geometry.angle_min;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::power::AttachedTool;

    #[test]
    fn test_joints_respect_limits() {
        let mut sim = Simulator::new(1);
        let mut power = Power::default();
        power.fork = 1.0;

        // Hold the fork up for a long time: it must stop at its limit
        for _ in 0..1000 {
            sim.simulate(&power, 0.03);
        }
        assert!((sim.joint.fork - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_straight_drive_moves_forward() {
        let mut sim = Simulator::new(0);
        sim.loc.angle = 90.0;
        let start_y = sim.loc.y;

        let mut power = Power::default();
        power.left = 1.0;
        power.right = 1.0;

        for _ in 0..100 {
            sim.simulate(&power, 0.03);
        }

        assert!(sim.loc.y > start_y + 3.0);
        assert!(sim.dl_count > 0.0);
    }

    #[test]
    fn test_sensor_image_roundtrips_through_bridge() {
        use crate::bridge::{InputData, SensorBridge};
        use util::module::State;

        let mut sim = Simulator::new(2);
        sim.joint.boom = 17.0;
        sim.joint.tilt = -25.0;

        let mut power = Power::default();
        power.attached = AttachedTool::Grinder { tool: 0.5 };
        sim.simulate(&power, 0.03);

        let mut nano = NanoslotExchange::default();
        sim.fill_exchange(&mut nano);

        let mut sensor_bridge = SensorBridge::default();
        let (output, _) = sensor_bridge
            .proc(&InputData {
                nano,
                loc: sim.loc,
                power,
                cur_time: 0.0,
            })
            .unwrap();

        assert!(output.imus_ok);
        assert!((output.joint.boom - 17.0).abs() < 1e-3);
        assert!((output.joint.tilt - (-25.0)).abs() < 1e-3);
        assert!((output.sensor.frame_pitch - 0.0).abs() < 1e-3);
        assert!(output.sensor.minerate > 50.0);
        assert!(output.sensor.slot_connected(
            exch_if::state::RobotSensors::CONNECTED_C0
        ));
    }
}

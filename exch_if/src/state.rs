//! Integrated robot state records shared outside the backend.
//!
//! The backend republishes its integrated state onto the `backend_state`
//! exchange channel every tick (capture tools read it, and accumulated
//! totals are restored from it across backend restarts), broadcasts a
//! [`Telemetry`] datagram to the frontend, and accepts [`RobotCommand`]
//! datagrams back. All of these are fixed plain-old-data structs: a size
//! mismatch is detected by comparing datagram length against the compiled
//! struct size.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::exchange::ExchangeSafe;
use crate::nav::Location2D;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// UDP port the backend listens on for frontend commands.
pub const COMMAND_PORT: u16 = 42940;

/// UDP port the backend broadcasts telemetry to.
pub const TELEMETRY_PORT: u16 = 42941;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint angles in degrees, in joint-index order.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct JointAngles {
    pub fork: f32,
    pub dump: f32,
    pub boom: f32,
    pub stick: f32,
    pub tilt: f32,
    pub spin: f32,
}

/// Last sensor snapshot integrated from all slots.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct RobotSensors {
    /// Tool load cells, kgf, negative = down.
    pub load_tl: f32,
    pub load_tr: f32,

    /// Scoop load cells, kgf, negative = down.
    pub load_sl: f32,
    pub load_sr: f32,

    /// Mining battery first cell voltage and charge estimate.
    pub cell_m: f32,
    pub charge_m: f32,

    /// Drive battery first cell voltage and charge estimate.
    pub cell_d: f32,
    pub charge_d: f32,

    /// Filtered mining head rate, raw spin counts per second.
    pub minerate: f32,

    /// Mining head spin count, wraps at 256.
    pub mcount: i32,

    /// 1 if the mining head currently reads as stalled.
    pub mstall: u8,

    /// Drive frame attitude, degrees.
    pub frame_yaw: f32,
    pub frame_pitch: f32,
    pub frame_roll: f32,

    /// Drive encoder counts and stall bits, right and left.
    pub drcount: i32,
    pub drstall: u8,
    pub dlcount: i32,
    pub dlstall: u8,

    /// Drive slot packet counter.
    pub heartbeat: u8,

    /// Raw encoder / stall bit fields for debugging.
    pub encoder_raw: i32,
    pub stall_raw: i32,

    /// Bitmask of connected slots, see `connected_bit`.
    pub connected: u8,
}

/// Accumulated operation totals, preserved across backend restarts.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct Accumulated {
    /// Material currently in the scoop, kgf.
    pub scoop: f32,

    /// Total weighed material this day, kgf.
    pub scoop_total: f32,

    /// Drive distance this haul cycle, meters.
    pub drive: f32,

    /// Total drive distance this day, meters.
    pub drive_total: f32,

    /// Total operating time this day, seconds.
    pub op_total: f32,
}

/// Operator-tuneable rates.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Tuneables {
    /// Autonomous drive power scale, 0-1.
    pub drive: f32,

    /// Mining head rate, 0-1.
    pub tool: f32,

    /// Cut aggressiveness: scales both the up-cut length (meters) and the
    /// progress rate.
    pub aggro: f32,

    /// Extra cut depth, centimeters below the observed surface.
    pub cut: f32,
}

/// Wire image of the power vector.
///
/// The in-memory power vector is a tagged variant over the attached tool;
/// on the wire it flattens to this fixed struct with an `attach_mode`
/// discriminant.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct PowerPod {
    pub left: f32,
    pub right: f32,
    pub fork: f32,
    pub dump: f32,
    pub boom: f32,
    pub stick: f32,
    pub tilt: f32,

    /// 0 = nothing attached, 1 = grinder, 2 = arm.
    pub attach_mode: u8,

    /// If 1, the load-cell slots read their left channel.
    pub read_l: u8,

    /// Grinder rate (attach_mode 1).
    pub tool: f32,

    /// Arm joint torques (attach_mode 2).
    pub arm_joint: [f32; 5],
}

/// Everything the backend knows, as published on the `backend_state`
/// channel each tick.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct BackendState {
    /// Current autonomy state, as `RobotState` discriminant.
    pub state: u8,

    /// 1 if all body IMUs pass the gravity sanity check.
    pub imus_ok: u8,

    pub joint: JointAngles,
    pub power: PowerPod,
    pub sensor: RobotSensors,
    pub loc: Location2D,
    pub accum: Accumulated,
    pub tuneable: Tuneables,

    /// Seconds since backend start.
    pub cur_time: f64,

    /// `cur_time` at which the current state was entered.
    pub state_start_time: f64,
}

/// Fixed telemetry datagram broadcast to the frontend.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct Telemetry {
    /// Broadcast counter.
    pub count: u32,

    /// Acknowledged state request.
    pub ack_state: u8,

    pub base: BackendState,
}

/// Fixed command datagram received from the frontend.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct RobotCommand {
    /// One of the `COMMAND_*` values.
    pub command: u8,

    /// Requested state (`COMMAND_STATE`).
    pub state: u8,

    /// Manual power (`COMMAND_POWER`).
    pub power: PowerPod,

    pub tuneable: Tuneables,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotCommand {
    /// Emergency stop.
    pub const COMMAND_STOP: u8 = 1;

    /// Request a state change.
    pub const COMMAND_STATE: u8 = 2;

    /// Manual driving power.
    pub const COMMAND_POWER: u8 = 3;
}

impl RobotSensors {
    pub const CONNECTED_D0: u8 = 0;
    pub const CONNECTED_F0: u8 = 1;
    pub const CONNECTED_F1: u8 = 2;
    pub const CONNECTED_A0: u8 = 3;
    pub const CONNECTED_A1: u8 = 4;
    pub const CONNECTED_C0: u8 = 5;

    /// True if the slot behind this `CONNECTED_*` bit has a live driver.
    pub fn slot_connected(&self, bit: u8) -> bool {
        self.connected & (1 << bit) != 0
    }
}

impl Default for Tuneables {
    fn default() -> Self {
        Self {
            drive: 0.5,
            tool: 0.5,
            aggro: 0.5,
            cut: 0.0,
        }
    }
}

impl JointAngles {
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.fork, self.dump, self.boom, self.stick, self.tilt, self.spin,
        ]
    }
}

unsafe impl ExchangeSafe for JointAngles {}
unsafe impl ExchangeSafe for RobotSensors {}
unsafe impl ExchangeSafe for Accumulated {}
unsafe impl ExchangeSafe for Tuneables {}
unsafe impl ExchangeSafe for PowerPod {}
unsafe impl ExchangeSafe for BackendState {}
unsafe impl ExchangeSafe for Telemetry {}
unsafe impl ExchangeSafe for RobotCommand {}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_connected_bits() {
        let mut sensors = RobotSensors::default();
        assert!(!sensors.slot_connected(RobotSensors::CONNECTED_C0));

        sensors.connected |= 1 << RobotSensors::CONNECTED_C0;
        sensors.connected |= 1 << RobotSensors::CONNECTED_D0;

        assert!(sensors.slot_connected(RobotSensors::CONNECTED_C0));
        assert!(sensors.slot_connected(RobotSensors::CONNECTED_D0));
        assert!(!sensors.slot_connected(RobotSensors::CONNECTED_A1));
    }
}

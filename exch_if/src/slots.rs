//! Per-slot exchange records.
//!
//! A "slot" is one microcontroller attached to the PC, identified by an
//! 8-bit hex ID. Each slot owns one row of the [`NanoslotExchange`]: the
//! backend writes the `command` field, the owning slot driver writes the
//! `sensor`, `state` and `debug` fields, and everyone else reads.
//!
//! The `command` and `sensor` structs cross the serial wire and must match
//! the firmware layout byte for byte. The `state` structs are PC-side only
//! and carry parsed engineering values.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::exchange::ExchangeSafe;
use crate::imu::{ImuRaw, ImuState};

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Watchdog-type counter that increments while a link is alive.
pub type HeartbeatCount = u8;

/// -100 for full reverse, 0 for stop, +100 for full forward.
pub type MotorPercent = i8;

/// Microcontroller A/D voltage reading.
pub type RawVoltage = i16;

/// 1/4096-turn actuator angle reading.
pub type ActuatorAngle = i16;

/// Padding to avoid false sharing between slots updated from separate cores.
pub type SlotPadding = [u8; 7];

// ---------------------------------------------------------------------------
// SHARED RECORDS
// ---------------------------------------------------------------------------

/// Autonomy info shared with every slot.
///
/// `mode == 0` is STOP / safe mode with all actuators off; 1 and 2 are
/// manual driving; above 2 is autonomous operation.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[repr(C)]
pub struct Autonomy {
    pub mode: u8,
}

/// Generic driver state shared by every slot's `state` record.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct SlotLink {
    /// 0 if the driver is not connected to its microcontroller, 1 if it is.
    pub connected: u8,
}

/// Debug data kept per slot.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct SlotDebug {
    /// Bits request various debug features (none defined yet).
    pub flags: u8,

    /// Serial packets received, wraps like a heartbeat.
    pub packet_count: u8,
}

/// One slot's row of the exchange.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct SlotRow<C, S, T> {
    /// Command data the backend wants sent to the microcontroller.
    pub command: C,

    /// Raw sensor data last received from the microcontroller.
    pub sensor: S,

    /// PC-side parsed state, written by the owning driver.
    pub state: T,

    /// Debug data, written by the owning driver.
    pub debug: SlotDebug,

    pub pad: SlotPadding,
}

// ---------------------------------------------------------------------------
// SLOT 0x70..0x73: SLENDER ARM JOINT CONTROLLERS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmJointCommand {
    pub autonomy: Autonomy,

    /// Brushless motor power, torque control.
    pub torque: [MotorPercent; 1],

    /// Angle control target (autonomous modes).
    pub target: [ActuatorAngle; 1],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmJointSensor {
    pub heartbeat: HeartbeatCount,

    /// Magnet strength of the angle encoder.
    pub mag: [u8; 1],

    /// Read-back angle.
    pub angle: [ActuatorAngle; 1],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmJointState {
    pub link: SlotLink,

    /// Read-back angle, in degrees.
    pub angle: [f32; 1],
}

pub type ArmJointSlot = SlotRow<ArmJointCommand, ArmJointSensor, ArmJointState>;

// ---------------------------------------------------------------------------
// SLOT 0xA0: WIDE ARM MOTOR CONTROLLERS (ARM ELECTRONICS BOX)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmBoxCommand {
    pub autonomy: Autonomy,

    /// Brushed DC linear actuator motors: spin (locked), clamp, tilt, stick.
    pub motor: [MotorPercent; 4],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmBoxSensor {
    pub heartbeat: HeartbeatCount,

    /// 1 == operator stop button pressed.
    pub stop: u8,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmBoxState {
    pub link: SlotLink,
}

pub type ArmBoxSlot = SlotRow<ArmBoxCommand, ArmBoxSensor, ArmBoxState>;

// ---------------------------------------------------------------------------
// SLOT 0xA1: ARM IMUS AND TOOL LOAD CELLS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmImuCommand {
    pub autonomy: Autonomy,

    /// If 1, read from the left load cell channel.
    pub read_l: u8,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmImuSensor {
    // IMUs first for alignment: [tool, stick]
    pub imu: [ImuRaw; 2],

    /// Load cell raw counts, left and right (default) channels.
    pub load_l: i32,
    pub load_r: i32,

    pub heartbeat: HeartbeatCount,
    // Multiple of 4 bytes keeps firmware and PC struct padding in agreement
    pub spare: [u8; 3],
}

impl ArmImuSensor {
    pub const IMU_TOOL: usize = 0;
    pub const IMU_STICK: usize = 1;
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ArmImuState {
    pub link: SlotLink,

    /// Arm stick frame.
    pub stick: ImuState,

    /// Tool coupler (tilt + spin).
    pub tool: ImuState,

    /// Load cell kilogram-force, negative = down.
    pub load_l: f32,
    pub load_r: f32,
}

pub type ArmImuSlot = SlotRow<ArmImuCommand, ArmImuSensor, ArmImuState>;

// ---------------------------------------------------------------------------
// SLOT 0xC0: ROCKGRINDER CUTTER (PLUGGABLE TOOL)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct GrinderCommand {
    pub autonomy: Autonomy,

    /// Run the mining head.
    pub mine: MotorPercent,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct GrinderSensor {
    pub heartbeat: HeartbeatCount,

    /// Mining head spin count (wraps at 256).
    pub spincount: u8,

    /// Ground of the tool battery pack.
    pub cell0: RawVoltage,

    /// First cell of the tool battery pack.
    pub cell1: RawVoltage,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct GrinderState {
    pub link: SlotLink,

    /// Spin counts per second, filtered by the driver.
    pub spin: f32,

    /// Scaled from the voltage delta on the ground line.
    pub load: f32,

    /// Voltage (V) on the tool battery's first cell.
    pub cell: f32,

    /// Estimated percent charge, normally between 20 and 80.
    pub charge: f32,
}

pub type GrinderSlot = SlotRow<GrinderCommand, GrinderSensor, GrinderState>;

// ---------------------------------------------------------------------------
// SLOT 0xD0: DRIVE MOTOR CONTROLLERS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct DriveCommand {
    pub autonomy: Autonomy,

    /// Brushed DC drive motors, front/back pairs per side.
    pub motor: [MotorPercent; 4],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct DriveSensor {
    pub heartbeat: HeartbeatCount,

    /// Raw bit version of the encoder sensors.
    pub raw: u8,

    /// Stall bits, one per encoder channel.
    pub stall: u8,

    /// Encoder counts for each channel: [left, right] wiring order.
    pub counts: [u8; 2],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct DriveState {
    pub link: SlotLink,
}

pub type DriveSlot = SlotRow<DriveCommand, DriveSensor, DriveState>;

// ---------------------------------------------------------------------------
// SLOT 0xF0: FRONT MOTOR CONTROLLERS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontBoxCommand {
    pub autonomy: Autonomy,

    /// Brushed DC linear actuator motors: dump, fork, spare, boom.
    pub motor: [MotorPercent; 4],
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontBoxSensor {
    pub heartbeat: HeartbeatCount,

    /// 1 == stop requested.
    pub stop: u8,

    /// First cell of the drive battery pack.
    pub cell1: RawVoltage,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontBoxState {
    pub link: SlotLink,

    /// Voltage (V) on the drive battery's first cell.
    pub cell: f32,

    /// Estimated percent charge, normally between 20 and 80.
    pub charge: f32,
}

pub type FrontBoxSlot = SlotRow<FrontBoxCommand, FrontBoxSensor, FrontBoxState>;

// ---------------------------------------------------------------------------
// SLOT 0xF1: FRONT IMUS AND SCOOP LOAD CELLS
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontImuCommand {
    pub autonomy: Autonomy,

    /// If 1, read from the left load cell channel.
    pub read_l: u8,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontImuSensor {
    // IMUs first for alignment: [frame, boom, fork, dump]
    pub imu: [ImuRaw; 4],

    /// Load cell raw counts, left and right (default) channels.
    pub load_l: i32,
    pub load_r: i32,

    pub heartbeat: HeartbeatCount,
    pub spare: [u8; 3],
}

impl FrontImuSensor {
    pub const IMU_FRAME: usize = 0;
    pub const IMU_BOOM: usize = 1;
    pub const IMU_FORK: usize = 2;
    pub const IMU_DUMP: usize = 3;
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct FrontImuState {
    pub link: SlotLink,

    /// Drive frame.
    pub frame: ImuState,

    /// Robot arm boom.
    pub boom: ImuState,

    /// Front scoop fork.
    pub fork: ImuState,

    /// Front scoop dump.
    pub dump: ImuState,

    /// Load cell kilogram-force, negative = down.
    pub load_l: f32,
    pub load_r: f32,
}

pub type FrontImuSlot = SlotRow<FrontImuCommand, FrontImuSensor, FrontImuState>;

// ---------------------------------------------------------------------------
// SLOT 0xEE: EXAMPLE NANO (DEBUG / DEV ONLY)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ExampleCommand {
    pub autonomy: Autonomy,

    /// Pin 13 debug LED.
    pub led: MotorPercent,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ExampleSensor {
    pub heartbeat: HeartbeatCount,
    pub latency: u8,
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct ExampleState {
    pub link: SlotLink,
}

pub type ExampleSlot = SlotRow<ExampleCommand, ExampleSensor, ExampleState>;

// ---------------------------------------------------------------------------
// AGGREGATE EXCHANGE RECORD
// ---------------------------------------------------------------------------

/// One struct with all slot data, living in the nanoslot exchange channel.
///
/// The idea is the backend can issue commands by plain assignment, like
/// `nano.slot_a0.command.motor[1] = 100`, inside one exchange write region.
#[derive(Clone, Copy, Default, Debug)]
#[repr(C)]
pub struct NanoslotExchange {
    /// Size in bytes of this struct: writers and readers bail out early on
    /// mismatch here.
    pub size: u16,

    /// The backend increments this every time it writes commands. Slot
    /// drivers watch it to detect a stalled backend and force safe mode.
    pub backend_heartbeat: HeartbeatCount,

    /// Autonomy mode shared by all slots, published by the backend.
    pub autonomy: Autonomy,

    pub pad_0: SlotPadding,

    pub slot_70: ArmJointSlot,
    pub slot_71: ArmJointSlot,
    pub slot_72: ArmJointSlot,
    pub slot_73: ArmJointSlot,

    pub slot_a0: ArmBoxSlot,
    pub slot_a1: ArmImuSlot,

    pub slot_c0: GrinderSlot,

    pub slot_d0: DriveSlot,

    pub slot_f0: FrontBoxSlot,
    pub slot_f1: FrontImuSlot,

    pub slot_ee: ExampleSlot,
}

impl NanoslotExchange {
    /// The size value a correctly-compiled process writes into `size`.
    pub fn expected_size() -> u16 {
        std::mem::size_of::<Self>() as u16
    }

    /// Stamp the size self-check field.
    pub fn stamp_size(&mut self) {
        self.size = Self::expected_size();
    }

    /// True if the size self-check field matches this build.
    pub fn size_sane(&self) -> bool {
        self.size == Self::expected_size()
    }
}

unsafe impl ExchangeSafe for Autonomy {}
unsafe impl ExchangeSafe for SlotLink {}
unsafe impl ExchangeSafe for SlotDebug {}

unsafe impl ExchangeSafe for ArmJointCommand {}
unsafe impl ExchangeSafe for ArmJointSensor {}
unsafe impl ExchangeSafe for ArmJointState {}
unsafe impl ExchangeSafe for ArmBoxCommand {}
unsafe impl ExchangeSafe for ArmBoxSensor {}
unsafe impl ExchangeSafe for ArmBoxState {}
unsafe impl ExchangeSafe for ArmImuCommand {}
unsafe impl ExchangeSafe for ArmImuSensor {}
unsafe impl ExchangeSafe for ArmImuState {}
unsafe impl ExchangeSafe for GrinderCommand {}
unsafe impl ExchangeSafe for GrinderSensor {}
unsafe impl ExchangeSafe for GrinderState {}
unsafe impl ExchangeSafe for DriveCommand {}
unsafe impl ExchangeSafe for DriveSensor {}
unsafe impl ExchangeSafe for DriveState {}
unsafe impl ExchangeSafe for FrontBoxCommand {}
unsafe impl ExchangeSafe for FrontBoxSensor {}
unsafe impl ExchangeSafe for FrontBoxState {}
unsafe impl ExchangeSafe for FrontImuCommand {}
unsafe impl ExchangeSafe for FrontImuSensor {}
unsafe impl ExchangeSafe for FrontImuState {}
unsafe impl ExchangeSafe for ExampleCommand {}
unsafe impl ExchangeSafe for ExampleSensor {}
unsafe impl ExchangeSafe for ExampleState {}

unsafe impl<C, S, T> ExchangeSafe for SlotRow<C, S, T>
where
    C: ExchangeSafe,
    S: ExchangeSafe,
    T: ExchangeSafe,
{
}

unsafe impl ExchangeSafe for NanoslotExchange {}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_size_self_check() {
        let mut nano = NanoslotExchange::default();
        assert!(!nano.size_sane());

        nano.stamp_size();
        assert!(nano.size_sane());
    }

    #[test]
    fn test_wire_struct_sizes_fit_in_a_packet() {
        // Wire packets carry a single length byte, so every command and
        // sensor struct must stay under 256 bytes.
        assert!(std::mem::size_of::<ArmImuSensor>() < 256);
        assert!(std::mem::size_of::<FrontImuSensor>() < 256);
        assert!(std::mem::size_of::<DriveCommand>() < 256);
        assert!(std::mem::size_of::<FrontBoxCommand>() < 256);
    }
}

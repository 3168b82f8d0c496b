//! Per-slot exchange handling.
//!
//! Each slot type parses its own raw sensor struct into the PC-side state
//! row, and encodes its command row for the wire. The backend heartbeat
//! watch lives here too: a driver that sees the heartbeat stall forces
//! its outbound autonomy mode to 0 so the firmware drops into safe mode.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use exch_if::exchange::{bytes_of, Exchange};
use exch_if::slots::*;
use exch_if::wire::{Packet, WireError};

use crate::state::{cell_volts, charge_percent, hx711_read_scale, ImuFilter, SpinTracker};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Command rounds the backend heartbeat may stall before this driver
/// forces safe mode.
const BACKEND_PAUSE_LIMIT: u32 = 10;

/// Arm joint encoder counts to degrees (1/4096 turn units).
const ENCODER_TO_DEG: f32 = 360.0 / 4096.0;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// One slot type's parsing and command encoding.
pub trait SlotHandler {
    /// My 8-bit hex slot ID.
    fn id(&self) -> u8;

    /// Compiled size of my wire command struct.
    fn command_size(&self) -> usize;

    /// Compiled size of my wire sensor struct.
    fn sensor_size(&self) -> usize;

    /// Parse a sensor packet, update the parsed state, and post both to
    /// my row of the exchange.
    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        dt: f32,
    ) -> Result<(), WireError>;

    /// Encode my command row for the wire, with the given autonomy mode.
    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8>;

    /// Mark my row as disconnected, like unplugged.
    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Watches the backend heartbeat for staleness.
pub struct BackendWatch {
    last_backend: u8,

    /// Count of command rounds with nothing new from the backend.
    paused: u32,
}

/// Slots 0x70-0x73: slender arm joint controllers.
pub struct ArmJointHandler {
    slot_id: u8,
}

/// Slot 0xA0: wide arm motor controllers.
pub struct ArmBoxHandler;

/// Slot 0xA1: arm IMUs and tool load cells.
#[derive(Default)]
pub struct ArmImuHandler {
    tool_imu: ImuFilter,
    stick_imu: ImuFilter,
}

/// Slot 0xC0: rockgrinder cutter.
#[derive(Default)]
pub struct GrinderHandler {
    spin: SpinTracker,
}

/// Slot 0xD0: drive motor controllers.
pub struct DriveHandler;

/// Slot 0xF0: front motor controllers.
pub struct FrontBoxHandler;

/// Slot 0xF1: front IMUs and scoop load cells.
#[derive(Default)]
pub struct FrontImuHandler {
    frame_imu: ImuFilter,
    boom_imu: ImuFilter,
    fork_imu: ImuFilter,
    dump_imu: ImuFilter,
}

/// Slot 0xEE: example nano, debug / dev only.
pub struct ExampleHandler;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BackendWatch {
    pub fn new(initial_heartbeat: u8) -> Self {
        Self {
            last_backend: initial_heartbeat,
            paused: 0,
        }
    }

    /// The autonomy mode to forward to the firmware: the backend's own
    /// mode while its heartbeat advances, 0 (safe mode) once it stalls.
    pub fn mode(&mut self, heartbeat: u8, backend_mode: u8) -> u8 {
        let exchange_alive = self.last_backend != heartbeat;
        self.last_backend = heartbeat;

        if exchange_alive {
            self.paused = 0;
        }
        else {
            self.paused += 1;
        }

        if self.paused > BACKEND_PAUSE_LIMIT {
            // No backend: safe mode
            0
        }
        else {
            backend_mode
        }
    }
}

/// Build the handler for this slot ID.
pub fn make_handler(slot_id: u8) -> Option<Box<dyn SlotHandler>> {
    match slot_id {
        0x70..=0x73 => Some(Box::new(ArmJointHandler { slot_id })),
        0xA0 => Some(Box::new(ArmBoxHandler)),
        0xA1 => Some(Box::new(ArmImuHandler::default())),
        0xC0 => Some(Box::new(GrinderHandler::default())),
        0xD0 => Some(Box::new(DriveHandler)),
        0xF0 => Some(Box::new(FrontBoxHandler)),
        0xF1 => Some(Box::new(FrontImuHandler::default())),
        0xEE => Some(Box::new(ExampleHandler)),
        _ => None,
    }
}

impl ArmJointHandler {
    fn row(nano: &NanoslotExchange, slot_id: u8) -> &ArmJointSlot {
        match slot_id {
            0x70 => &nano.slot_70,
            0x71 => &nano.slot_71,
            0x72 => &nano.slot_72,
            _ => &nano.slot_73,
        }
    }

    fn row_mut(nano: &mut NanoslotExchange, slot_id: u8) -> &mut ArmJointSlot {
        match slot_id {
            0x70 => &mut nano.slot_70,
            0x71 => &mut nano.slot_71,
            0x72 => &mut nano.slot_72,
            _ => &mut nano.slot_73,
        }
    }
}

impl SlotHandler for ArmJointHandler {
    fn id(&self) -> u8 {
        self.slot_id
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<ArmJointCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<ArmJointSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        _dt: f32,
    ) -> Result<(), WireError> {
        let sensor: ArmJointSensor = packet.payload_as()?;
        let slot_id = self.slot_id;

        exchange.write(|nano| {
            let row = Self::row_mut(nano, slot_id);
            row.sensor = sensor;
            row.state.link.connected = 1;
            row.state.angle[0] = sensor.angle[0] as f32 * ENCODER_TO_DEG;
            row.debug.packet_count = row.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = Self::row(nano, self.slot_id).command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        let slot_id = self.slot_id;
        exchange.write(|nano| {
            Self::row_mut(nano, slot_id).state.link.connected = 0;
        });
    }
}

impl SlotHandler for ArmBoxHandler {
    fn id(&self) -> u8 {
        0xA0
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<ArmBoxCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<ArmBoxSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        _dt: f32,
    ) -> Result<(), WireError> {
        let sensor: ArmBoxSensor = packet.payload_as()?;

        exchange.write(|nano| {
            nano.slot_a0.sensor = sensor;
            nano.slot_a0.state.link.connected = 1;
            nano.slot_a0.debug.packet_count =
                nano.slot_a0.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_a0.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_a0.state.link.connected = 0);
    }
}

impl SlotHandler for ArmImuHandler {
    fn id(&self) -> u8 {
        0xA1
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<ArmImuCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<ArmImuSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        dt: f32,
    ) -> Result<(), WireError> {
        let sensor: ArmImuSensor = packet.payload_as()?;

        let tool = self.tool_imu.update(&sensor.imu[ArmImuSensor::IMU_TOOL], dt);
        let stick = self.stick_imu.update(&sensor.imu[ArmImuSensor::IMU_STICK], dt);
        let load_l = hx711_read_scale(sensor.load_l, 0.0);
        let load_r = hx711_read_scale(sensor.load_r, 0.0);

        exchange.write(|nano| {
            nano.slot_a1.sensor = sensor;
            nano.slot_a1.state.link.connected = 1;
            nano.slot_a1.state.tool = tool;
            nano.slot_a1.state.stick = stick;
            nano.slot_a1.state.load_l = load_l;
            nano.slot_a1.state.load_r = load_r;
            nano.slot_a1.debug.packet_count =
                nano.slot_a1.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_a1.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_a1.state.link.connected = 0);
    }
}

impl SlotHandler for GrinderHandler {
    fn id(&self) -> u8 {
        0xC0
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<GrinderCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<GrinderSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        dt: f32,
    ) -> Result<(), WireError> {
        let sensor: GrinderSensor = packet.payload_as()?;

        let spin = self.spin.update(sensor.spincount, dt);
        let cell = cell_volts(sensor.cell1);
        let load = cell_volts(sensor.cell0);

        exchange.write(|nano| {
            nano.slot_c0.sensor = sensor;
            nano.slot_c0.state.link.connected = 1;
            nano.slot_c0.state.spin = spin;
            nano.slot_c0.state.load = load;
            nano.slot_c0.state.cell = cell;
            nano.slot_c0.state.charge = charge_percent(cell);
            nano.slot_c0.debug.packet_count =
                nano.slot_c0.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_c0.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_c0.state.link.connected = 0);
    }
}

impl SlotHandler for DriveHandler {
    fn id(&self) -> u8 {
        0xD0
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<DriveCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<DriveSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        _dt: f32,
    ) -> Result<(), WireError> {
        let sensor: DriveSensor = packet.payload_as()?;

        exchange.write(|nano| {
            nano.slot_d0.sensor = sensor;
            nano.slot_d0.state.link.connected = 1;
            nano.slot_d0.debug.packet_count =
                nano.slot_d0.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_d0.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_d0.state.link.connected = 0);
    }
}

impl SlotHandler for FrontBoxHandler {
    fn id(&self) -> u8 {
        0xF0
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<FrontBoxCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<FrontBoxSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        _dt: f32,
    ) -> Result<(), WireError> {
        let sensor: FrontBoxSensor = packet.payload_as()?;

        let cell = cell_volts(sensor.cell1);

        exchange.write(|nano| {
            nano.slot_f0.sensor = sensor;
            nano.slot_f0.state.link.connected = 1;
            nano.slot_f0.state.cell = cell;
            nano.slot_f0.state.charge = charge_percent(cell);
            nano.slot_f0.debug.packet_count =
                nano.slot_f0.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_f0.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_f0.state.link.connected = 0);
    }
}

impl SlotHandler for FrontImuHandler {
    fn id(&self) -> u8 {
        0xF1
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<FrontImuCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<FrontImuSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        dt: f32,
    ) -> Result<(), WireError> {
        let sensor: FrontImuSensor = packet.payload_as()?;

        let frame = self.frame_imu.update(&sensor.imu[FrontImuSensor::IMU_FRAME], dt);
        let boom = self.boom_imu.update(&sensor.imu[FrontImuSensor::IMU_BOOM], dt);
        let fork = self.fork_imu.update(&sensor.imu[FrontImuSensor::IMU_FORK], dt);
        let dump = self.dump_imu.update(&sensor.imu[FrontImuSensor::IMU_DUMP], dt);
        let load_l = hx711_read_scale(sensor.load_l, 0.0);
        let load_r = hx711_read_scale(sensor.load_r, 0.0);

        exchange.write(|nano| {
            nano.slot_f1.sensor = sensor;
            nano.slot_f1.state.link.connected = 1;
            nano.slot_f1.state.frame = frame;
            nano.slot_f1.state.boom = boom;
            nano.slot_f1.state.fork = fork;
            nano.slot_f1.state.dump = dump;
            nano.slot_f1.state.load_l = load_l;
            nano.slot_f1.state.load_r = load_r;
            nano.slot_f1.debug.packet_count =
                nano.slot_f1.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_f1.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_f1.state.link.connected = 0);
    }
}

impl SlotHandler for ExampleHandler {
    fn id(&self) -> u8 {
        0xEE
    }

    fn command_size(&self) -> usize {
        std::mem::size_of::<ExampleCommand>()
    }

    fn sensor_size(&self) -> usize {
        std::mem::size_of::<ExampleSensor>()
    }

    fn post_sensor(
        &mut self,
        packet: &Packet,
        exchange: &mut Exchange<NanoslotExchange>,
        _dt: f32,
    ) -> Result<(), WireError> {
        let sensor: ExampleSensor = packet.payload_as()?;

        exchange.write(|nano| {
            nano.slot_ee.sensor = sensor;
            nano.slot_ee.state.link.connected = 1;
            nano.slot_ee.debug.packet_count =
                nano.slot_ee.debug.packet_count.wrapping_add(1);
        });
        Ok(())
    }

    fn fetch_command(&self, nano: &NanoslotExchange, mode: u8) -> Vec<u8> {
        let mut command = nano.slot_ee.command;
        command.autonomy.mode = mode;
        bytes_of(&command).to_vec()
    }

    fn mark_disconnected(&self, exchange: &mut Exchange<NanoslotExchange>) {
        exchange.write(|nano| nano.slot_ee.state.link.connected = 0);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backend_watch_forces_safe_mode() {
        let mut watch = BackendWatch::new(5);

        // Heartbeat advancing: the backend's mode passes through
        assert_eq!(watch.mode(6, 7), 7);
        assert_eq!(watch.mode(7, 7), 7);

        // Heartbeat stalls: after the pause limit, safe mode
        let mut mode = 7;
        for _ in 0..=BACKEND_PAUSE_LIMIT {
            mode = watch.mode(7, 7);
        }
        assert_eq!(mode, 0);

        // Backend comes back
        assert_eq!(watch.mode(8, 7), 7);
    }

    #[test]
    fn test_make_handler_covers_all_slots() {
        for &id in &[0x70u8, 0x71, 0x72, 0x73, 0xA0, 0xA1, 0xC0, 0xD0, 0xF0, 0xF1, 0xEE]
        {
            let handler = make_handler(id).expect("handler");
            assert_eq!(handler.id(), id);
        }
        assert!(make_handler(0x42).is_none());
    }

    #[test]
    fn test_fetch_command_overrides_mode() {
        let handler = DriveHandler;

        let mut nano = NanoslotExchange::default();
        nano.slot_d0.command.motor = [10, 20, 30, 40];
        nano.slot_d0.command.autonomy.mode = 7;

        let bytes = handler.fetch_command(&nano, 0);

        assert_eq!(bytes.len(), std::mem::size_of::<DriveCommand>());
        // First byte is the autonomy mode, forced to safe
        assert_eq!(bytes[0], 0);
        // Motor bytes pass through untouched
        assert_eq!(&bytes[1..5], &[10u8, 20, 30, 40]);
    }
}

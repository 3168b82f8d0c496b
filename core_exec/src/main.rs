//! Main backend executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop (30 ms tick):
//!         - Frontend command processing
//!         - Exchange snapshot (or simulator step)
//!         - Sensor/actuator bridge input processing
//!         - Autonomy state machine processing
//!         - Hazard checking of the resulting power vector
//!         - Command write-back, telemetry and state republish

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use serde::Serialize;
use structopt::StructOpt;

// Standard
use std::thread;
use std::time::{Duration, Instant};

// Internal
use core_lib::auto_mgr::{AutoMgr, RobotState};
use core_lib::bridge::{self, SensorBridge};
use core_lib::data_store::DataStore;
use core_lib::hazard::joint_move_hazards;
use core_lib::params::CoreParams;
use core_lib::power::{AttachedTool, Power};
use core_lib::sim::Simulator;
use core_lib::telemetry::RobotComms;

use exch_if::channels;
use exch_if::slots::NanoslotExchange;
use exch_if::state::RobotCommand;
use util::archive::Archiver;
use util::logger::{logger_init, LevelFilter};
use util::module::State;
use util::session::Session;
use util::{host, session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "core_exec", about = "Excahauler backend control core")]
struct Opt {
    /// Run against the built-in simulator instead of real hardware
    #[structopt(long)]
    sim: bool,

    /// Simulator start location seed
    #[structopt(long, default_value = "1")]
    seed: u64,

    /// Skip the path planner process: autonomy drives without it
    #[structopt(long)]
    noplan: bool,

    /// Simulated driver test (implies --sim)
    #[structopt(long = "driver_test")]
    driver_test: bool,

    /// Run headless (the backend always does; accepted for compatibility)
    #[structopt(long)]
    nogui: bool,

    /// Disable drive outputs outside manual driving (for testing indoors)
    #[structopt(long)]
    nodrive: bool,

    /// Window size as WxH (accepted for compatibility, unused headless)
    #[structopt(name = "WxH")]
    window: Option<String>,
}

/// Per-cycle autonomy record for the session archive.
#[derive(Serialize)]
struct AutonomyRecord {
    time_s: f64,
    state: String,
    left: f64,
    right: f64,
    mine_progress: f64,
    stall_backoff: f64,
    scoop_kgf: f32,
    drive_m: f32,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let session = Session::new("core_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to initialise logging: {:?}", e))?;

    info!("Excahauler Backend Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    let opt = Opt::from_args();
    debug!("CLI options: {:?}", opt);

    if let Some(ref window) = opt.window {
        match parse_window_size(window) {
            Some((w, h)) => debug!("Window size {}x{} ignored (headless)", w, h),
            None => warn!("Unrecognized window size argument '{}'", window),
        }
    }
    if opt.nogui {
        info!("Running headless (--nogui)");
    }

    let simulate_only = opt.sim || opt.driver_test;
    if opt.driver_test {
        info!("Simulated driver test enabled");
    }

    // ---- LOAD PARAMETERS ----

    let params: CoreParams = match util::params::load("core_exec.toml") {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not load core_exec.toml ({:?}), using defaults", e);
            CoreParams::default()
        }
    };

    info!("Exec parameters loaded");

    // ---- INITIALISE EXCHANGES ----

    let mut exchange_nanoslot =
        channels::nanoslot().wrap_err("Failed to open the nanoslot exchange")?;
    let mut exchange_backend_state =
        channels::backend_state().wrap_err("Failed to open the backend state exchange")?;
    let mut exchange_plan_target =
        channels::plan_target().wrap_err("Failed to open the plan target exchange")?;
    let exchange_plan_current =
        channels::plan_current().wrap_err("Failed to open the localization exchange")?;
    let mut exchange_drive_commands =
        channels::drive_commands().wrap_err("Failed to open the drive command exchange")?;
    let mut exchange_drive_encoders =
        channels::drive_encoders().wrap_err("Failed to open the drive encoder exchange")?;

    // Plug in: stamp the size self-check and restart the heartbeat
    exchange_nanoslot.write(|nano| {
        nano.stamp_size();
        nano.backend_heartbeat = 0;
    });

    info!("Exchanges open");

    // ---- INITIALISE MODULES ----

    let mut ds = DataStore::default();
    ds.plan_enabled = !opt.noplan;
    ds.nodrive = opt.nodrive;
    ds.joint_plan = core_lib::auto_mgr::poses::DRIVE_JOINT_SCOOP;

    // Restore accumulated totals so daily counts survive restarts
    ds.accum = exchange_backend_state.read().accum;

    let mut auto_mgr = AutoMgr::new(params.clone());
    auto_mgr
        .init(&session)
        .wrap_err("Failed to open the autonomy logs")?;
    info!("AutoMgr init complete");

    let mut sensor_bridge = SensorBridge::default();
    sensor_bridge
        .init("bridge.toml", &session)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to initialise the bridge: {}", e))?;
    info!("SensorBridge init complete");

    let mut comms = RobotComms::new().wrap_err("Failed to open the frontend socket")?;
    info!("Frontend comms initialised");

    let mut arch_autonomy = Archiver::from_path(&session, "autonomy.csv")
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create the autonomy archive: {}", e))?;

    let mut simulator = Simulator::new(opt.seed);

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let start_instant = Instant::now();

    loop {
        let cycle_start_instant = Instant::now();
        let cur_time = start_instant.elapsed().as_secs_f64();
        ds.cycle_start(cur_time);

        // ---- TELECOMMAND PROCESSING ----

        while let Some(command) = comms.receive_command() {
            exec_command(&mut ds, &mut auto_mgr, &command);
        }

        // ---- DATA INPUT ----

        let nano: NanoslotExchange;
        if simulate_only {
            simulator.simulate(&ds.power, ds.dt);

            let mut image = NanoslotExchange::default();
            simulator.fill_exchange(&mut image);
            nano = image;

            ds.loc = simulator.loc;
        }
        else {
            nano = exchange_nanoslot.read();
            ds.loc = exchange_plan_current.read();
        }

        if exchange_drive_commands.updated() {
            ds.last_drive_cmd = exchange_drive_commands.read();
            ds.last_drive_update_time = ds.cur_time;
        }

        // Operator stop button on the arm electronics box
        if nano.slot_a0.sensor.stop != 0 && ds.state != RobotState::Stop {
            warn!("Arm box STOP button pressed");
            auto_mgr.enter_state(&mut ds, RobotState::Stop);
            ds.power.stop();
        }

        // Attached-tool detection from connected slots
        if nano.slot_c0.state.link.connected != 0 && !ds.power.attached_grinder() {
            info!("Mining head connected, grinder attached");
            ds.power.attached = AttachedTool::Grinder { tool: 0.0 };
        }
        if nano.slot_70.state.link.connected != 0 && !ds.power.attached_arm() {
            info!("Arm joint controller connected, arm attached");
            ds.power.attached = AttachedTool::Arm { joint: [0.0; 5] };
        }

        // ---- BRIDGE INPUT PROCESSING ----

        match sensor_bridge.proc(&bridge::InputData {
            nano,
            loc: ds.loc,
            power: ds.power,
            cur_time: ds.cur_time,
        }) {
            Ok((output, report)) => {
                ds.sensor = output.sensor;
                ds.joint = output.joint;
                ds.imus_ok = output.imus_ok;
                ds.accum.drive += output.drive_distance_m as f32;

                if report.loc_jump_rejected {
                    warn!("Localization jump rejected from drive distance");
                }

                exchange_drive_encoders.publish(output.encoders);
            }
            Err(e) => warn!("Bridge processing error: {}", e),
        }

        // ---- AUTONOMY PROCESSING ----

        auto_mgr.step(&mut ds);

        // ---- HAZARD CHECKING ----

        // driveraw bypasses the checker entirely
        if ds.state != RobotState::DriveRaw {
            if let Some(reason) = joint_move_hazards(&ds.joint, &ds.power) {
                warn!(" -- HAZARD: {} --", reason);
                ds.power.stop();
            }
        }

        if ds.state != RobotState::Stop {
            ds.accum.op_total += ds.dt as f32;
        }

        // ---- COMMAND WRITE-BACK ----

        // All slot commands, the autonomy mode and the heartbeat go out in
        // one write region
        exchange_nanoslot.write(|nano| {
            bridge::apply_commands(&ds.power, ds.state as u8, nano);
        });

        exchange_plan_target.publish(ds.plan_target);

        let backend_state = ds.to_backend_state(auto_mgr.state_start_time());
        exchange_backend_state.publish(backend_state);

        // ---- TELEMETRY ----

        comms.maybe_broadcast(
            backend_state,
            ds.state as u8,
            ds.cur_time,
            params.telemetry_period_s,
        );

        arch_autonomy
            .serialise(AutonomyRecord {
                time_s: session::get_elapsed_seconds(),
                state: ds.state.to_string(),
                left: ds.power.left,
                right: ds.power.right,
                mine_progress: auto_mgr.mine_progress(),
                stall_backoff: auto_mgr.stall_backoff(),
                scoop_kgf: ds.accum.scoop,
                drive_m: ds.accum.drive,
            })
            .ok();

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = cycle_start_instant.elapsed();

        match Duration::from_secs_f64(params.tick_period_s).checked_sub(cycle_dur) {
            Some(remaining) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(remaining);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - params.tick_period_s
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.num_cycles += 1;
    }
}

/// Process one frontend command.
fn exec_command(ds: &mut DataStore, auto_mgr: &mut AutoMgr, command: &RobotCommand) {
    match command.command {
        RobotCommand::COMMAND_STOP => {
            info!("Incoming STOP command");
            auto_mgr.enter_state(ds, RobotState::Stop);
            ds.power.stop();
        }
        RobotCommand::COMMAND_STATE => match RobotState::from_u8(command.state) {
            Some(state) => {
                ds.requested_state = Some(state);
            }
            None => {
                warn!("IGNORING INVALID STATE {}", command.state);
            }
        },
        RobotCommand::COMMAND_POWER => {
            ds.tuneable = command.tuneable;

            if ds.state == RobotState::Drive || ds.state == RobotState::DriveRaw {
                ds.power = Power::from_pod(&command.power);
            }
            else {
                debug!("IGNORING frontend power: not in drive state");
            }
        }
        other => {
            warn!("Unknown frontend command {}", other);
        }
    }
}

/// Parse a `<W>x<H>` window size argument.
fn parse_window_size(arg: &str) -> Option<(u32, u32)> {
    let mut parts = arg.splitn(2, 'x');
    let w = parts.next()?.parse().ok()?;
    let h = parts.next()?.parse().ok()?;
    Some((w, h))
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_window_size() {
        assert_eq!(parse_window_size("1000x600"), Some((1000, 600)));
        assert_eq!(parse_window_size("800"), None);
        assert_eq!(parse_window_size("axb"), None);
    }

    #[test]
    fn test_exec_command_power_gated_by_state() {
        let mut ds = DataStore::default();
        let mut mgr = AutoMgr::new(CoreParams::default());

        let mut command = RobotCommand::default();
        command.command = RobotCommand::COMMAND_POWER;
        command.power.left = 0.5;

        // Power ignored in STOP
        ds.state = RobotState::Stop;
        exec_command(&mut ds, &mut mgr, &command);
        assert_eq!(ds.power.left, 0.0);

        // Power accepted in drive
        ds.state = RobotState::Drive;
        exec_command(&mut ds, &mut mgr, &command);
        assert_eq!(ds.power.left, 0.5);
    }

    #[test]
    fn test_exec_command_state_request() {
        let mut ds = DataStore::default();
        let mut mgr = AutoMgr::new(CoreParams::default());

        let mut command = RobotCommand::default();
        command.command = RobotCommand::COMMAND_STATE;
        command.state = RobotState::Autonomy as u8;

        exec_command(&mut ds, &mut mgr, &command);
        assert_eq!(ds.requested_state, Some(RobotState::Autonomy));

        // An invalid state byte is ignored
        command.state = 99;
        ds.requested_state = None;
        exec_command(&mut ds, &mut mgr, &command);
        assert_eq!(ds.requested_state, None);
    }
}

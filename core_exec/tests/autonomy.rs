//! End-to-end autonomy scenarios, run against the state machine with an
//! idealized arm that arrives at every commanded pose one tick later.

use core_lib::auto_mgr::{AutoMgr, RobotState};
use core_lib::bridge::apply_commands;
use core_lib::data_store::DataStore;
use core_lib::params::CoreParams;
use core_lib::power::AttachedTool;

use exch_if::slots::NanoslotExchange;

const TICK_S: f64 = 0.03;

/// Run one control tick: advance time, step the state machine, and let
/// the idealized arm arrive at whatever was commanded.
fn tick(mgr: &mut AutoMgr, ds: &mut DataStore) {
    let next_time = ds.cur_time + TICK_S;
    ds.cycle_start(next_time);
    mgr.step(ds);
    ds.joint = ds.joint_plan;
}

/// A healthy mining sensor environment.
fn nominal_mining_sensors(ds: &mut DataStore) {
    ds.sensor.minerate = 120.0;
    ds.sensor.load_tr = 0.0;
    ds.sensor.frame_pitch = 0.0;
    ds.imus_ok = true;
}

#[test]
fn test_cold_start_commands_nothing() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    let mut nano = NanoslotExchange::default();

    for i in 0..10u8 {
        tick(&mut mgr, &mut ds);
        assert_eq!(ds.state, RobotState::Stop);

        apply_commands(&ds.power, ds.state as u8, &mut nano);

        // No motor command has any magnitude
        assert_eq!(nano.slot_d0.command.motor, [0; 4]);
        assert_eq!(nano.slot_f0.command.motor, [0; 4]);
        assert_eq!(nano.slot_a0.command.motor, [0; 4]);
        assert_eq!(nano.slot_c0.command.mine, 0);
        assert_eq!(nano.autonomy.mode, 0);

        // The heartbeat still advances every tick
        assert_eq!(nano.backend_heartbeat, i + 1);
    }
}

#[test]
fn test_full_mining_pass_nominal() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    nominal_mining_sensors(&mut ds);
    ds.power.attached = AttachedTool::Grinder { tool: 0.0 };

    // Operator kicks off autonomy from manual driving
    ds.state = RobotState::Drive;
    ds.requested_state = Some(RobotState::Autonomy);

    let mut states_seen = vec![ds.state];
    let mut scan_ticks = 0u32;
    let mut peak_progress = 0.0f64;

    for _ in 0..3000 {
        let state_before = ds.state;
        tick(&mut mgr, &mut ds);

        if ds.state != *states_seen.last().unwrap() {
            states_seen.push(ds.state);
        }
        if ds.state == RobotState::Scan {
            scan_ticks += 1;
        }
        if ds.state == RobotState::Mine && state_before == RobotState::Mine {
            // Clean cut: the tool runs and the backoff never engages
            assert!(ds.power.tool_rate() > 0.0);
            assert_eq!(mgr.stall_backoff(), 0.0);
            peak_progress = peak_progress.max(mgr.mine_progress());
        }
        if ds.state == RobotState::Stop {
            break;
        }
    }

    assert_eq!(
        states_seen,
        vec![
            RobotState::Drive,
            RobotState::Scan,
            RobotState::MineStart,
            RobotState::Mine,
            RobotState::MineFinish,
            RobotState::Stop,
        ]
    );

    // Scan stares at the terrain for ~2 seconds
    let scan_s = scan_ticks as f64 * TICK_S;
    assert!(scan_s > 1.8 && scan_s < 2.3, "scan lasted {} s", scan_s);

    // Progress reaches the end of the cut in about 1/(0.004 * aggro) ticks
    assert!(peak_progress > 0.95);
}

#[test]
fn test_stall_during_mining_backs_off_then_stops() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    nominal_mining_sensors(&mut ds);
    ds.power.attached = AttachedTool::Grinder { tool: 0.0 };
    ds.requested_state = Some(RobotState::Autonomy);

    // Run until the cut is underway
    for _ in 0..200 {
        tick(&mut mgr, &mut ds);
        if ds.state == RobotState::Mine && mgr.mine_progress() > 0.1 {
            break;
        }
    }
    assert_eq!(ds.state, RobotState::Mine);

    // The head jams: mining rate drops to zero
    ds.sensor.minerate = 0.0;

    let mut last_backoff = mgr.stall_backoff();
    let mut stall_ticks = 0;
    for _ in 0..50 {
        tick(&mut mgr, &mut ds);
        stall_ticks += 1;

        if ds.state == RobotState::Stop {
            break;
        }

        // Backoff rises by 0.02 per stalled tick
        let backoff = mgr.stall_backoff();
        assert!((backoff - last_backoff - 0.02).abs() < 1e-9);
        last_backoff = backoff;
    }

    // Reaching the backoff cap aborts to STOP with the tool off that tick
    assert_eq!(ds.state, RobotState::Stop);
    assert_eq!(ds.power.tool_rate(), 0.0);
    assert!((mgr.stall_backoff() - 0.12).abs() < 1e-9);
    assert!(stall_ticks >= 15 && stall_ticks <= 17, "stalled {} ticks", stall_ticks);
}

#[test]
fn test_weigh_cycle_accumulates_scoop_weight() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    ds.imus_ok = true;
    ds.sensor.load_sl = -2.0;
    ds.sensor.load_sr = -3.0;
    ds.requested_state = Some(RobotState::Weigh);

    let mut saw_right_read = false;
    let mut saw_left_read = false;

    for _ in 0..400 {
        tick(&mut mgr, &mut ds);

        if ds.state == RobotState::Weigh {
            if ds.power.read_l {
                // The left channel is only read after the right settle
                assert!(saw_right_read);
                saw_left_read = true;
            }
            else {
                saw_right_read = true;
            }
        }

        if ds.state == RobotState::Stop {
            break;
        }
    }

    assert_eq!(ds.state, RobotState::Stop);
    assert!(saw_right_read && saw_left_read);
    assert!(
        (ds.accum.scoop - 5.0).abs() < 0.01,
        "scoop total {} kgf",
        ds.accum.scoop
    );
}

#[test]
fn test_imu_failure_blocks_weigh() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    ds.imus_ok = false;
    ds.requested_state = Some(RobotState::Weigh);

    tick(&mut mgr, &mut ds);
    tick(&mut mgr, &mut ds);

    // Bad IMUs before a weigh route to manual drive, keeping the load
    assert_eq!(ds.state, RobotState::Drive);
    assert_eq!(ds.accum.scoop, 0.0);
}

#[test]
fn test_planner_insanity_drops_to_drive() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    ds.imus_ok = true;
    ds.sensor.charge_d = 80.0;
    // Planner never answers: stale command, insanity accumulates
    ds.last_drive_update_time = -100.0;
    ds.requested_state = Some(RobotState::HaulStart);

    for _ in 0..40 {
        tick(&mut mgr, &mut ds);
        if ds.state == RobotState::Drive {
            break;
        }
    }

    assert_eq!(ds.state, RobotState::Drive);
    assert!(ds.robot_insanity_counter >= 10);
}

#[test]
fn test_haul_terminates_on_distance() {
    let mut mgr = AutoMgr::new(CoreParams::default());
    let mut ds = DataStore::default();

    ds.imus_ok = true;
    ds.sensor.charge_d = 80.0;
    ds.plan_enabled = false; // dumb driving, no planner process
    ds.loc.percent = 90.0;
    ds.accum.drive = 499.0;
    ds.requested_state = Some(RobotState::HaulStart);

    // First tick folds accum.drive into the total and starts driving
    tick(&mut mgr, &mut ds);
    assert_eq!(ds.state, RobotState::HaulOut);
    assert_eq!(ds.accum.drive, 0.0);
    assert!((ds.accum.drive_total - 499.0).abs() < 1e-3);

    // The robot racks up the full haul distance
    ds.accum.drive = 500.0;
    tick(&mut mgr, &mut ds);
    assert_eq!(ds.state, RobotState::Drive);
}

#[test]
fn test_low_battery_fails_haul() {
    let mut params = CoreParams::default();
    params.battery_fail_percent = 20.0;

    let mut mgr = AutoMgr::new(params);
    let mut ds = DataStore::default();

    ds.imus_ok = true;
    ds.sensor.charge_d = 10.0;
    ds.plan_enabled = false;
    ds.requested_state = Some(RobotState::HaulStart);

    tick(&mut mgr, &mut ds);
    tick(&mut mgr, &mut ds);

    assert_eq!(ds.state, RobotState::Drive);
}

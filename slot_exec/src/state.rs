//! Raw sensor to engineering-unit parsing.
//!
//! The microcontrollers report raw counts; the PC-side driver owns every
//! conversion so firmware stays trivial: HX711 load cell counts to
//! kilogram-force, A/D counts to battery volts and a charge estimate,
//! spin counter deltas to a rate, and raw IMU vectors to filtered
//! attitude with gravity and vibration estimates.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use exch_if::imu::{ImuRaw, ImuState, Vec3f};
use util::maths::{clamp, lin_map};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Scale factor from raw HX711 readings to kilogram-force.
const HX711_CALIBRATION: f32 = 1.4e-4;

/// Arduino A/D counts to volts (10-bit, 5 V reference).
const AD_TO_VOLTS: f32 = 5.0 / 1024.0;

/// Battery cell voltage reading as 0 percent charge.
const CELL_EMPTY_V: f32 = 3.0;

/// Battery cell voltage reading as 100 percent charge.
const CELL_FULL_V: f32 = 4.1;

/// Low-pass blend weight for the gravity estimate.
const GRAVITY_BLEND: f32 = 0.05;

/// Low-pass blend weight for the vibration estimate.
const VIBE_BLEND: f32 = 0.05;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Incremental filter turning raw IMU readings into an [`ImuState`].
#[derive(Default)]
pub struct ImuFilter {
    state: ImuState,
    primed: bool,
}

/// Tracks the grinder's wrapping spin counter into a rate.
#[derive(Default)]
pub struct SpinTracker {
    last_count: u8,
    primed: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ImuFilter {
    /// Fold one raw reading into the filtered state.
    pub fn update(&mut self, raw: &ImuRaw, dt: f32) -> ImuState {
        let accel = raw.accel();
        let rates = raw.rates();

        if !self.primed {
            self.state.global = accel;
            self.primed = true;
        }

        // Gravity is the slow part of the accelerometer signal
        self.state.global =
            self.state.global * (1.0 - GRAVITY_BLEND) + accel * GRAVITY_BLEND;

        // Vibration is whatever is left over
        let residual = accel - self.state.global;
        self.state.vibe =
            self.state.vibe * (1.0 - VIBE_BLEND) + abs_vec(residual) * VIBE_BLEND;

        // Attitude from the gravity direction; yaw only from gyro
        // integration, so it drifts (nothing on the robot trusts it)
        self.state.pitch = self
            .state
            .global
            .y
            .atan2(self.state.global.z)
            .to_degrees();
        self.state.roll = (-self.state.global.x)
            .atan2(self.state.global.z)
            .to_degrees();
        self.state.yaw += rates.z * dt;

        self.state
    }
}

impl SpinTracker {
    /// Fold one spin counter sample into counts per second.
    pub fn update(&mut self, count: u8, dt: f32) -> f32 {
        if !self.primed {
            self.last_count = count;
            self.primed = true;
            return 0.0;
        }

        // One-direction counter, wraps at 256
        let delta = count.wrapping_sub(self.last_count) as f32;
        self.last_count = count;

        if dt <= 0.0 {
            return 0.0;
        }
        delta / dt
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale a raw HX711 reading to kilogram-force.
///
/// A raw zero means the channel has not been read yet, not zero force.
pub fn hx711_read_scale(raw: i32, zero_cal: f32) -> f32 {
    if raw == 0 {
        0.0
    }
    else {
        raw as f32 * HX711_CALIBRATION - zero_cal
    }
}

/// Scale a raw A/D battery reading to cell volts.
pub fn cell_volts(raw: i16) -> f32 {
    raw as f32 * AD_TO_VOLTS
}

/// Estimate percent charge from a cell voltage.
pub fn charge_percent(cell_v: f32) -> f32 {
    let percent = lin_map((CELL_EMPTY_V, CELL_FULL_V), (0.0, 100.0), cell_v);
    clamp(&percent, &0.0, &100.0)
}

fn abs_vec(v: Vec3f) -> Vec3f {
    Vec3f::new(v.x.abs(), v.y.abs(), v.z.abs())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hx711_zero_raw_reads_zero() {
        assert_eq!(hx711_read_scale(0, 0.5), 0.0);
        assert!((hx711_read_scale(10000, 0.0) - 1.4).abs() < 1e-5);
        assert!(hx711_read_scale(-10000, 0.0) < 0.0);
    }

    #[test]
    fn test_charge_percent_bounds() {
        assert_eq!(charge_percent(2.5), 0.0);
        assert_eq!(charge_percent(3.0), 0.0);
        assert_eq!(charge_percent(4.1), 100.0);
        assert_eq!(charge_percent(4.5), 100.0);

        let mid = charge_percent(3.55);
        assert!(mid > 45.0 && mid < 55.0);
    }

    #[test]
    fn test_spin_tracker_wraps() {
        let mut tracker = SpinTracker::default();

        // First sample only primes the counter
        assert_eq!(tracker.update(250, 0.05), 0.0);

        // 250 -> 6 wraps through 256: 12 counts in 50 ms
        let rate = tracker.update(6, 0.05);
        assert!((rate - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_imu_filter_settles_on_gravity() {
        let mut filter = ImuFilter::default();

        // Level sensor: +Z reads one g
        let raw = ImuRaw {
            acc: [0, 0, 16384],
            gyro: [0; 3],
        };

        let mut state = ImuState::default();
        for _ in 0..200 {
            state = filter.update(&raw, 0.05);
        }

        assert!((state.global.z - 9.8).abs() < 0.1);
        assert!(state.pitch.abs() < 0.5);
        assert!(state.vibe.length() < 0.5);
    }

    #[test]
    fn test_imu_filter_pitch_sign() {
        let mut filter = ImuFilter::default();

        // Gravity split between +Y and +Z: pitched 45 degrees
        let raw = ImuRaw {
            acc: [0, 11585, 11585],
            gyro: [0; 3],
        };

        let mut state = ImuState::default();
        for _ in 0..200 {
            state = filter.update(&raw, 0.05);
        }

        assert!((state.pitch - 45.0).abs() < 1.0);
    }
}

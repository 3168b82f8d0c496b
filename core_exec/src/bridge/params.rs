//! Parameters structure for the sensor/actuator bridge

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Calibration parameters for the sensor/actuator bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Meters of driving per wheel encoder tick: wheel circumference over
    /// encoder ticks per revolution.
    ///
    /// Units: meters/tick
    pub drive_count_to_m: f64,

    /// Extra calibration on the right encoder channel (a lost magnet reads
    /// fewer ticks).
    pub right_drive_cal: f64,

    /// Frame IMU pitch mounting offset.
    ///
    /// Units: degrees
    pub frame_pitch_cal: f64,

    /// Tool IMU pitch mounting offset.
    ///
    /// Units: degrees
    pub tool_pitch_cal: f64,

    /// Maximum plausible drive speed; larger localization deltas are
    /// rejected as jumps.
    ///
    /// Units: meters/second
    pub max_loc_speed_mps: f64,

    /// Minimum period between localization distance checks.
    ///
    /// Units: seconds
    pub distance_check_period_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            drive_count_to_m: 0.96 / 12.0,
            right_drive_cal: 0.7,
            frame_pitch_cal: 4.0,
            tool_pitch_cal: 7.0,
            max_loc_speed_mps: 2.0,
            distance_check_period_s: 0.3,
        }
    }
}

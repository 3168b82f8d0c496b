//! Parameters for the backend executable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Top-level backend parameters.
///
/// Defaults are the flight values, so a missing file only matters when
/// retuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreParams {
    /// Target period of one control cycle.
    ///
    /// Units: seconds
    pub tick_period_s: f64,

    /// Minimum period between telemetry broadcasts.
    ///
    /// Units: seconds
    pub telemetry_period_s: f64,

    /// Drive battery charge below which autonomous hauling fails out.
    ///
    /// Units: percent
    pub battery_fail_percent: f64,

    /// Total drive distance after which a haul cycle terminates.
    ///
    /// Units: meters
    pub haul_distance_m: f64,

    /// Field Y coordinate where the haul run begins.
    pub haul_y_start: f64,

    /// Field Y distance of one haul leg.
    pub haul_y_dist: f64,

    /// Field X coordinate of the haul track.
    pub haul_x_target: f64,

    /// Scale factor applied to planner drive commands in autonomy.
    pub autonomous_drive_power: f64,

    /// How long to keep driving on a stale planner command.
    ///
    /// Units: seconds
    pub max_drive_seconds: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CoreParams {
    fn default() -> Self {
        Self {
            tick_period_s: 0.030,
            telemetry_period_s: 0.050,
            battery_fail_percent: 0.0,
            haul_distance_m: 500.0,
            haul_y_start: 15.0,
            haul_y_dist: 8.0,
            haul_x_target: 5.0,
            autonomous_drive_power: 0.5,
            max_drive_seconds: 1.0,
        }
    }
}

//! Named constructors for every exchange channel in the system.
//!
//! Channel ownership (single writer):
//! - `nanoslot`: commands + heartbeat by the backend, sensor/state rows by
//!   each owning slot driver (disjoint fields of one record).
//! - `backend_state`, `plan_target`, `drive_encoders`: the backend.
//! - `plan_current`: the localization process.
//! - `drive_commands`: the path-planning process.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::exchange::{Exchange, ExchangeError};
use crate::nav::{DriveCommands, DriveEncoders, Location2D, NavTarget};
use crate::slots::NanoslotExchange;
use crate::state::BackendState;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// All slot command/sensor/state rows plus the backend heartbeat.
pub fn nanoslot() -> Result<Exchange<NanoslotExchange>, ExchangeError> {
    Exchange::open("excahaul.nanoslot.exchange")
}

/// The backend's integrated state, republished each tick.
pub fn backend_state() -> Result<Exchange<BackendState>, ExchangeError> {
    Exchange::open("excahaul.backend_state.exchange")
}

/// Navigation target the backend wants the path planner to reach.
pub fn plan_target() -> Result<Exchange<NavTarget>, ExchangeError> {
    Exchange::open("excahaul.plan_target.exchange")
}

/// Fused pose published by the localizer.
pub fn plan_current() -> Result<Exchange<Location2D>, ExchangeError> {
    Exchange::open("excahaul.plan_current.exchange")
}

/// Drive powers published by the path planner.
pub fn drive_commands() -> Result<Exchange<DriveCommands>, ExchangeError> {
    Exchange::open("excahaul.drive_commands.exchange")
}

/// Accumulated drive distances published by the backend.
pub fn drive_encoders() -> Result<Exchange<DriveEncoders>, ExchangeError> {
    Exchange::open("excahaul.drive_encoders.exchange")
}

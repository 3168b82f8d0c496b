//! Library portion of the excahauler backend.
//!
//! The backend fuses sensor data from the slot drivers, maintains the
//! robot's kinematic and localization state, runs the autonomy state
//! machine, vets every actuator command against the hazard checker, and
//! writes motor commands back onto the exchange.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod auto_mgr;
pub mod bridge;
pub mod data_store;
pub mod hazard;
pub mod kinematics;
pub mod mining;
pub mod params;
pub mod power;
pub mod sim;
pub mod telemetry;

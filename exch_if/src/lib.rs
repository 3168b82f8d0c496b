//! # Exchange Interface
//!
//! This crate defines every interface shared between the excahauler's
//! processes:
//!
//! - The seqlock shared-memory [`exchange`] used to couple the backend to the
//!   peripheral slot drivers, the path planner and the localizer.
//! - The plain-old-data [`slots`] records exchanged with each microcontroller.
//! - The framed serial [`wire`] protocol spoken to the microcontrollers.
//! - The [`nav`] records read from and written to the planning processes.
//! - The [`state`] records broadcast to the frontend and republished for
//!   capture tools.
//!
//! Everything in here is deliberately `#[repr(C)]` plain-old-data: the same
//! bytes live in shared memory, on the serial wire, and in UDP datagrams.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod channels;
pub mod exchange;
pub mod imu;
pub mod nav;
pub mod slots;
pub mod state;
pub mod wire;

// ---------------------------------------------------------------------------
// REEXPORTS
// ---------------------------------------------------------------------------

pub use exchange::{Exchange, ExchangeError, ExchangeSafe};

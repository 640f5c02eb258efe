//! Library for the steering control executable.
//!
//! The executable is built from processing modules implementing the
//! [`util::module::State`] trait:
//!
//! - [`pid_ctrl`] - converts cross track error telemetry into a steering
//!   demand using a PID control law.
//! - [`tuner`] - optional online search over the controller gains using
//!   repeated evaluation cycles.
//!
//! plus [`sim_server`], the network server the simulator connects to.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod pid_ctrl;
pub mod sim_server;
pub mod tuner;

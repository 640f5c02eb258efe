//! PID steering control module
//!
//! Converts each cross track error (CTE) sample into a steering demand
//! using a proportional-integral-derivative control law. Gains may be
//! replaced on any sample (the tuner does this while searching) without
//! resetting the error accumulators.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during PidCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum PidCtrlInitError {
    #[error("Failed to load the parameter file: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Failed to create the telemetry archive: {0}")]
    ArchiveError(String),
}

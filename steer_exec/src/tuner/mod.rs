//! Online gain tuning module
//!
//! Runs a coordinate-wise hill climbing search ("twiddle") over a vector of
//! tunable values, one streamed error sample at a time. Because the
//! objective can only be observed by letting the simulation run for many
//! samples, the classical batch algorithm is restructured as a resumable
//! state machine: each processed sample is one step of bookkeeping, and the
//! probe/adapt logic runs only at cycle boundaries.
//!
//! A cycle scores one trial point as the mean squared error of its
//! post-warmup samples, ending early with a penalising score if the error
//! magnitude ever exceeds the divergence tolerance. At each boundary one
//! parameter is probed first upwards and, if that fails to improve on the
//! best score, downwards; parameters take turns round-robin. The search is
//! complete once the sum of the step magnitudes falls below the convergence
//! tolerance, after which processing is an idempotent no-op returning the
//! best values found.
//!
//! The module knows nothing about PID gains - the executable decides which
//! gains make up the value vector.

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

/// Possible errors that can occur during Tuner initialisation.
#[derive(Debug, thiserror::Error)]
pub enum TunerInitError {
    #[error("Failed to load the parameter file: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Expected {expected} initial step sizes, found {found}")]
    DeltaCountMismatch { expected: usize, found: usize },

    #[error("Failed to create the cycle archive: {0}")]
    ArchiveError(String),
}

//! Parameters structure for the Tuner

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the gain tuning search.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Params {
    /// Number of samples at the start of each cycle which are excluded from
    /// scoring, letting the vehicle settle after a reset.
    pub warmup_steps: u64,

    /// CTE magnitude above which a cycle is judged to have diverged and is
    /// ended early.
    pub cte_tolerance: f64,

    /// Once the sum of the step magnitudes falls to this value or below the
    /// search is complete.
    pub delta_tolerance: f64,

    /// Initial step magnitude for each tunable value. Must have one entry
    /// per value.
    pub initial_deltas: Vec<f64>,
}

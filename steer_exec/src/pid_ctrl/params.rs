//! Parameters structure for PidCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for PID steering control.
#[derive(Debug, Default, Deserialize)]
pub struct Params {
    /// Default controller gains, used when no gains are given on the
    /// command line.
    pub gains: Gains,

    /// Constant throttle demand sent with every steering demand.
    pub throttle: f64,
}

/// The gain coefficients of the PID control law.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Gains {
    /// Proportional gain
    pub kp: f64,

    /// Integral gain
    pub ki: f64,

    /// Derivative gain
    pub kd: f64,
}

//! Implementations for the PidCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{Gains, Params, PidCtrlInitError};
use util::{
    archive::{Archived, Archiver},
    maths,
    module::State,
    params,
    session::{get_elapsed_seconds, Session},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// PID steering control module state
#[derive(Default)]
pub struct PidCtrl {
    pub(crate) params: Params,

    gains: Gains,

    /// Proportional error - the most recent CTE sample.
    prop_err: f64,

    /// Integral error - undecayed running sum of all CTE samples.
    intg_err: f64,

    /// Derivative error - difference between the two most recent CTE
    /// samples.
    deriv_err: f64,

    /// True once the first sample has seeded `prop_err`, so that the first
    /// derivative term is exactly zero.
    initialised: bool,

    report: StatusReport,

    last_record: Option<TelemRecord>,
    arch_telem: Archiver,
}

/// Input data to PID steering control.
#[derive(Clone, Copy, Debug)]
pub struct InputData {
    /// Cross track error for this sample.
    pub cte: f64,

    /// Vehicle speed reported with this sample, archived only.
    pub speed: f64,

    /// Vehicle steering angle reported with this sample, archived only.
    pub steering_angle: f64,

    /// New gains to apply before processing this sample, or `None` to keep
    /// the current gains. Applying gains never resets the error
    /// accumulators.
    pub gains: Option<Gains>,
}

/// Output demands from PidCtrl to be sent to the simulator.
#[derive(Clone, Copy, Serialize, Debug)]
pub struct OutputData {
    /// Steering demand, clamped into [-1, 1].
    pub steer: f64,

    /// Throttle demand.
    pub throttle: f64,
}

/// Status report for PidCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// True if the steering demand was clamped on this sample.
    pub steer_limited: bool,
}

/// One row of the per-run telemetry archive.
#[derive(Clone, Copy, Serialize, Debug)]
struct TelemRecord {
    time_s: f64,
    speed: f64,
    steering_angle: f64,
    cte: f64,
    steer: f64,
    throttle: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidCtrl {
    /// Replace the controller gains.
    ///
    /// The error accumulators are not reset, gains may be swapped at any
    /// point in a run.
    pub fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
    }

    /// Get the current controller gains.
    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Update the error accumulators with a new CTE sample.
    ///
    /// On the very first call the proportional error is seeded with the
    /// sample so that the derivative term starts at zero.
    pub fn update_error(&mut self, cte: f64) {
        if !self.initialised {
            self.prop_err = cte;
            self.initialised = true;
        }

        self.deriv_err = cte - self.prop_err;
        self.prop_err = cte;
        self.intg_err += cte;
    }

    /// Get the total weighted error, the unclamped steering demand.
    ///
    /// Pure function of the current state.
    pub fn total_error(&self) -> f64 {
        -(self.gains.kp * self.prop_err
            + self.gains.ki * self.intg_err
            + self.gains.kd * self.deriv_err)
    }
}

impl State for PidCtrl {
    /// Path to the parameter file, plus optional gains overriding those in
    /// the file (from the command line).
    type InitData = (&'static str, Option<Gains>);
    type InitError = PidCtrlInitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = std::convert::Infallible;

    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session,
    ) -> Result<(), Self::InitError> {
        let (params_path, gains) = init_data;

        self.params = params::load(params_path)?;

        // CLI gains take precedence over the file defaults
        self.gains = gains.unwrap_or(self.params.gains);

        // The telemetry archive is keyed by the initial gain triple so runs
        // with different gains can be compared.
        self.arch_telem = Archiver::from_path(
            session,
            format!(
                "pid_ctrl/telem_{}_{}_{}.csv",
                self.gains.kp, self.gains.ki, self.gains.kd
            ),
        )
        .map_err(|e| PidCtrlInitError::ArchiveError(e.to_string()))?;

        Ok(())
    }

    /// Perform cyclic processing of PID steering control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        // Clear the status report
        self.report = StatusReport::default();

        if let Some(gains) = input_data.gains {
            self.set_gains(gains);
        }

        self.update_error(input_data.cte);

        let total = self.total_error();
        let steer = maths::clamp(&total, &-1.0, &1.0);
        self.report.steer_limited = total > 1.0 || total < -1.0;

        let output = OutputData {
            steer,
            throttle: self.params.throttle,
        };

        trace!(
            "PidCtrl output:\n    cte: {}\n    steer: {}",
            input_data.cte,
            output.steer
        );

        // Time is stamped at write, so proc stays independent of the
        // session.
        self.last_record = Some(TelemRecord {
            time_s: 0.0,
            speed: input_data.speed,
            steering_angle: input_data.steering_angle,
            cte: input_data.cte,
            steer: output.steer,
            throttle: output.throttle,
        });

        Ok((output, self.report))
    }
}

impl Archived for PidCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(mut record) = self.last_record.take() {
            record.time_s = get_elapsed_seconds();
            self.arch_telem.serialise(record)?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn controller(kp: f64, ki: f64, kd: f64) -> PidCtrl {
        let mut pid = PidCtrl::default();
        pid.set_gains(Gains { kp, ki, kd });
        pid
    }

    #[test]
    fn test_first_derivative_is_zero() {
        let mut pid = controller(0.0, 0.0, 1.0);

        pid.update_error(0.7);

        // With only the derivative gain set any non-zero output would come
        // from the derivative term
        assert_eq!(pid.total_error(), 0.0);
    }

    #[test]
    fn test_derivative_is_sample_difference() {
        let mut pid = controller(0.0, 0.0, 1.0);

        pid.update_error(0.5);
        pid.update_error(0.8);
        assert!((pid.total_error() - -0.3).abs() < 1e-12);

        pid.update_error(0.1);
        assert!((pid.total_error() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_integral_is_running_sum() {
        let mut pid = controller(0.0, 1.0, 0.0);

        for cte in &[0.5, -0.25, 1.0, -2.0] {
            pid.update_error(*cte);
        }

        // Sum is -0.75, output is negated
        assert!((pid.total_error() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_total_error_is_pure() {
        let mut pid = controller(0.2, 0.004, 3.0);

        pid.update_error(1.3);
        pid.update_error(-0.2);

        assert_eq!(pid.total_error(), pid.total_error());
    }

    #[test]
    fn test_total_error_weighting() {
        let mut pid = controller(2.0, 0.5, 3.0);

        pid.update_error(1.0);
        pid.update_error(2.0);

        // prop = 2.0, intg = 3.0, deriv = 1.0
        assert!((pid.total_error() - -(2.0 * 2.0 + 0.5 * 3.0 + 3.0 * 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_set_gains_keeps_accumulators() {
        let mut pid = controller(0.0, 1.0, 0.0);

        pid.update_error(1.0);
        pid.update_error(1.0);

        pid.set_gains(Gains {
            kp: 0.0,
            ki: 2.0,
            kd: 0.0,
        });

        // Integral accumulator of 2.0 persists through the gain change
        assert!((pid.total_error() - -4.0).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_replay() {
        let samples = [0.3, 0.1, -0.4, 0.9, -1.2, 0.0, 0.5];

        let run = |samples: &[f64]| -> Vec<f64> {
            let mut pid = controller(0.2, 0.004, 3.0);
            samples
                .iter()
                .map(|cte| {
                    pid.update_error(*cte);
                    pid.total_error()
                })
                .collect()
        };

        assert_eq!(run(&samples), run(&samples));
    }

    #[test]
    fn test_proc_clamps_steer() {
        let mut pid = controller(10.0, 0.0, 0.0);

        let (output, report) = pid
            .proc(&InputData {
                cte: 1.0,
                speed: 10.0,
                steering_angle: 0.0,
                gains: None,
            })
            .unwrap();

        assert_eq!(output.steer, -1.0);
        assert!(report.steer_limited);
    }
}

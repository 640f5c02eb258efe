//! Implementations for the Tuner state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::Serialize;

// Internal
use super::{Params, TunerInitError};
use util::{
    archive::{Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gain tuning module state.
pub struct Tuner {
    pub(crate) params: Params,

    /// Post-warmup samples per cycle. Zero disables tuning.
    max_steps: u64,

    /// The current trial point.
    values: Vec<f64>,

    /// The trial point which produced the best score so far.
    best_values: Vec<f64>,

    /// Per-value probe state.
    deltas: Vec<ParamDelta>,

    /// Best cycle score observed so far.
    best_err: f64,

    /// Accumulated squared error within the current cycle.
    total_err: f64,

    /// Samples processed within the current cycle, including warmup.
    step: u64,

    cycle: u64,

    /// Index of the value currently being probed.
    param_idx: usize,

    pending_arch: Option<CycleSummary>,
    arch_cycles: Archiver,
}

/// Probe state for a single tunable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamDelta {
    /// Step magnitude.
    pub value: f64,

    /// Which half of the two-sided probe is currently applied.
    pub probe: Probe,
}

/// Input data to the Tuner.
#[derive(Clone, Copy, Debug)]
pub struct InputData {
    /// Cross track error for this sample.
    pub cte: f64,
}

/// Output data from one tuning step.
#[derive(Clone, Debug)]
pub struct OutputData {
    /// The values to drive the next sample with. While searching this is
    /// the current trial point, once tuned it is the best point found.
    pub values: Vec<f64>,

    /// True exactly when this sample closed a cycle - the simulated
    /// environment must be reset and this sample's demands discarded.
    pub reset_cycle: bool,

    /// True once the search is complete.
    pub tuned: bool,
}

/// Status report for Tuner processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    /// Present when this sample closed an evaluation cycle.
    pub cycle_end: Option<CycleSummary>,
}

/// Summary of a completed evaluation cycle, one row of the cycle archive.
#[derive(Clone, Copy, Serialize, Debug, PartialEq)]
pub struct CycleSummary {
    /// The cycle that just ended.
    pub cycle: u64,

    /// Index of the value that was being evaluated.
    pub param_idx: usize,

    /// The cycle's score: mean squared post-warmup error, or the CTE
    /// magnitude if the cycle diverged.
    pub score: f64,

    /// Best score so far, after this cycle was taken into account.
    pub best_err: f64,

    /// True if the cycle ended by exceeding the CTE tolerance.
    pub diverged: bool,

    /// How the search reacted to the score.
    pub action: ProbeAction,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which half of the two-sided probe a value is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Probe {
    /// The value is raised by the step magnitude.
    Increase,

    /// The value is lowered by the step magnitude below its baseline.
    Decrease,
}

/// Reaction to a cycle score at a cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ProbeAction {
    /// The score improved on the best: the step grows and the next value
    /// takes over.
    Improved,

    /// The raised probe failed to improve: the same value is now probed
    /// below its baseline.
    ProbeDecrease,

    /// Both probes failed: the value is restored to its baseline, the step
    /// shrinks and the next value takes over.
    Reverted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Tuner {
    fn default() -> Self {
        Self {
            params: Params::default(),
            max_steps: 0,
            values: Vec::new(),
            best_values: Vec::new(),
            deltas: Vec::new(),
            best_err: f64::INFINITY,
            total_err: 0.0,
            step: 0,
            cycle: 1,
            param_idx: 0,
            pending_arch: None,
            arch_cycles: Archiver::default(),
        }
    }
}

impl Tuner {
    /// Build a tuner from an already-loaded parameter set.
    pub(crate) fn from_config(
        values: Vec<f64>,
        params: Params,
        max_steps: u64,
    ) -> Result<Self, TunerInitError> {
        if params.initial_deltas.len() != values.len() {
            return Err(TunerInitError::DeltaCountMismatch {
                expected: values.len(),
                found: params.initial_deltas.len(),
            });
        }

        let deltas = params
            .initial_deltas
            .iter()
            .map(|&value| ParamDelta {
                value,
                probe: Probe::Increase,
            })
            .collect();

        Ok(Self {
            best_values: values.clone(),
            values,
            deltas,
            params,
            max_steps,
            ..Self::default()
        })
    }

    /// True if a tuning step budget was configured.
    pub fn enabled(&self) -> bool {
        self.max_steps > 0
    }

    /// True once the search is complete - the sum of the step magnitudes
    /// has fallen to the convergence tolerance or below.
    pub fn is_tuned(&self) -> bool {
        self.deltas.iter().map(|d| d.value.abs()).sum::<f64>() <= self.params.delta_tolerance
    }

    /// True exactly when a cycle boundary has just been processed, meaning
    /// the simulated environment must be reset before the next sample.
    pub fn is_reset_cycle(&self) -> bool {
        self.step == 0
    }

    /// The best values found so far.
    pub fn best_values(&self) -> &[f64] {
        &self.best_values
    }

    /// The best cycle score observed so far.
    pub fn best_error(&self) -> f64 {
        self.best_err
    }

    /// Process one CTE sample, returning a summary if this sample closed an
    /// evaluation cycle.
    fn tune(&mut self, cte: f64) -> Option<CycleSummary> {
        if self.step == self.params.warmup_steps {
            debug!("Cycle {} warmup completed", self.cycle);
        }

        // Let the simulation sink in for a while before scoring
        if self.step >= self.params.warmup_steps {
            self.total_err += cte * cte;
        }

        self.step += 1;

        let cte_abs = cte.abs();
        let diverged = cte_abs > self.params.cte_tolerance;

        // End of collection cycle?
        if !diverged && self.step < self.max_steps + self.params.warmup_steps {
            return None;
        }

        // A diverged cycle scores its final CTE magnitude, which is
        // guaranteed to exceed any steady-state mean squared error
        let score = if diverged {
            cte_abs
        } else {
            self.total_err / (self.step - self.params.warmup_steps) as f64
        };

        let evaluated_idx = self.param_idx;

        let action = if score < self.best_err {
            // Error improved, grow this value's step and move on
            self.best_err = score;
            self.best_values = self.values.clone();
            self.deltas[self.param_idx].value *= 1.1;
            self.deltas[self.param_idx].probe = Probe::Increase;
            self.next_param();
            ProbeAction::Improved
        } else if self.deltas[self.param_idx].probe == Probe::Increase {
            // The raised probe failed, try below the baseline next
            self.deltas[self.param_idx].probe = Probe::Decrease;
            ProbeAction::ProbeDecrease
        } else {
            // Both probes failed, undo the decrease to restore the
            // baseline, shrink the step and move on
            self.values[self.param_idx] += self.deltas[self.param_idx].value;
            self.deltas[self.param_idx].value *= 0.9;
            self.deltas[self.param_idx].probe = Probe::Increase;
            self.next_param();
            ProbeAction::Reverted
        };

        // Apply the probe for whichever value is now active. This is the
        // only place values are mutated: a Decrease both cancels the prior
        // Increase and moves one step below the baseline.
        let delta = self.deltas[self.param_idx];
        match delta.probe {
            Probe::Increase => self.values[self.param_idx] += delta.value,
            Probe::Decrease => self.values[self.param_idx] -= 2.0 * delta.value,
        }

        let summary = CycleSummary {
            cycle: self.cycle,
            param_idx: evaluated_idx,
            score,
            best_err: self.best_err,
            diverged,
            action,
        };
        self.pending_arch = Some(summary);

        // Clear the cycle
        self.step = 0;
        self.total_err = 0.0;
        self.cycle += 1;

        Some(summary)
    }

    fn next_param(&mut self) {
        self.param_idx = (self.param_idx + 1) % self.values.len();
    }
}

impl State for Tuner {
    /// Path to the parameter file, the initial values, and the step budget
    /// (post-warmup samples per cycle, zero to disable tuning).
    type InitData = (&'static str, Vec<f64>, u64);
    type InitError = TunerInitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = std::convert::Infallible;

    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session,
    ) -> Result<(), Self::InitError> {
        let (params_path, values, max_steps) = init_data;

        let params: Params = params::load(params_path)?;

        *self = Tuner::from_config(values, params, max_steps)?;

        self.arch_cycles = Archiver::from_path(session, "tuner/cycles.csv")
            .map_err(|e| TunerInitError::ArchiveError(e.to_string()))?;

        Ok(())
    }

    /// Perform one tuning step.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        // Once tuned processing is an idempotent no-op returning the best
        // values found
        if self.is_tuned() {
            return Ok((
                OutputData {
                    values: self.best_values.clone(),
                    reset_cycle: false,
                    tuned: true,
                },
                StatusReport::default(),
            ));
        }

        let cycle_end = self.tune(input_data.cte);

        Ok((
            OutputData {
                values: self.values.clone(),
                reset_cycle: self.is_reset_cycle(),
                tuned: self.is_tuned(),
            },
            StatusReport { cycle_end },
        ))
    }
}

impl Archived for Tuner {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(summary) = self.pending_arch.take() {
            self.arch_cycles.serialise(summary)?;
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

    /// A tuner with no warmup and an effectively infinite divergence
    /// tolerance, so cycles end by sample count alone.
    fn tuner(values: Vec<f64>, deltas: Vec<f64>, max_steps: u64) -> Tuner {
        Tuner::from_config(
            values,
            Params {
                warmup_steps: 0,
                cte_tolerance: f64::INFINITY,
                delta_tolerance: 0.1,
                initial_deltas: deltas,
            },
            max_steps,
        )
        .unwrap()
    }

    fn proc(t: &mut Tuner, cte: f64) -> (OutputData, StatusReport) {
        t.proc(&InputData { cte }).unwrap()
    }

    #[test]
    fn test_improvement_grows_step() {
        let mut t = tuner(vec![1.0], vec![1.0], 2);

        let (out, report) = proc(&mut t, 0.5);
        assert!(report.cycle_end.is_none());
        assert!(!out.reset_cycle);

        let (out, report) = proc(&mut t, 0.5);
        let summary = report.cycle_end.expect("cycle should have ended");

        // Mean squared error of the two samples
        assert!((summary.score - 0.25).abs() < 1e-12);
        assert_eq!(summary.action, ProbeAction::Improved);
        assert!(!summary.diverged);

        // Best is the pre-probe snapshot, the step has grown and the next
        // trial point is one (grown) step up
        assert_eq!(t.best_values(), &[1.0]);
        assert!((t.best_error() - 0.25).abs() < 1e-12);
        assert!((t.deltas[0].value - 1.1).abs() < 1e-12);
        assert_eq!(t.deltas[0].probe, Probe::Increase);
        assert!((out.values[0] - 2.1).abs() < 1e-12);
        assert!(out.reset_cycle);
    }

    #[test]
    fn test_probe_failure_sequence() {
        let mut t = tuner(vec![1.0], vec![1.0], 1);

        // Cycle 1: anything beats infinity, trial moves to 1.0 + 1.1
        let (out, _) = proc(&mut t, 0.5);
        assert!((out.values[0] - 2.1).abs() < 1e-12);

        // Cycle 2: worse than best, flip to the decrease probe. The value
        // drops to one step below the baseline of 1.0
        let (out, report) = proc(&mut t, 1.0);
        let summary = report.cycle_end.unwrap();
        assert_eq!(summary.action, ProbeAction::ProbeDecrease);
        assert!((out.values[0] - -0.1).abs() < 1e-12);
        assert_eq!(t.deltas[0].probe, Probe::Decrease);

        // Cycle 3: still worse, revert to baseline, shrink the step and
        // re-probe upwards
        let (out, report) = proc(&mut t, 1.0);
        let summary = report.cycle_end.unwrap();
        assert_eq!(summary.action, ProbeAction::Reverted);
        assert!((t.deltas[0].value - 0.99).abs() < 1e-12);
        assert_eq!(t.deltas[0].probe, Probe::Increase);
        assert!((out.values[0] - 1.99).abs() < 1e-12);

        // Best never moved off the baseline
        assert_eq!(t.best_values(), &[1.0]);
    }

    #[test]
    fn test_warmup_excluded_from_score() {
        let mut t = Tuner::from_config(
            vec![1.0],
            Params {
                warmup_steps: 2,
                cte_tolerance: f64::INFINITY,
                delta_tolerance: 0.1,
                initial_deltas: vec![1.0],
            },
            2,
        )
        .unwrap();

        // Large settling errors during warmup must not reach the score
        for cte in &[3.0, -3.0] {
            let (out, report) = proc(&mut t, *cte);
            assert!(report.cycle_end.is_none());
            assert!(!out.reset_cycle);
        }

        let (_, report) = proc(&mut t, 0.5);
        assert!(report.cycle_end.is_none());

        let (out, report) = proc(&mut t, 0.5);
        let summary = report.cycle_end.expect("cycle should have ended");

        // Mean squared error over the two scored samples only, had the
        // warmup samples leaked in the score would be (9 + 9 + 0.25 + 0.25) / 4
        assert!((summary.score - 0.25).abs() < 1e-12);
        assert!(!summary.diverged);
        assert!(out.reset_cycle);
    }

    #[test]
    fn test_divergence_ends_cycle() {
        let mut t = Tuner::from_config(
            vec![1.0],
            Params {
                warmup_steps: 600,
                cte_tolerance: 4.0,
                delta_tolerance: 0.1,
                initial_deltas: vec![1.0],
            },
            5000,
        )
        .unwrap();

        // A single diverged sample ends the cycle immediately, regardless
        // of warmup or cycle length
        let (out, report) = proc(&mut t, 5.0);
        let summary = report.cycle_end.expect("divergence should end the cycle");

        assert!(summary.diverged);
        assert!((summary.score - 5.0).abs() < 1e-12);
        assert!(out.reset_cycle);
        assert!(t.is_reset_cycle());

        // The next sample starts a fresh cycle
        let (out, report) = proc(&mut t, 0.1);
        assert!(report.cycle_end.is_none());
        assert!(!out.reset_cycle);
    }

    #[test]
    fn test_tuned_is_idempotent() {
        // Step magnitudes already sum below the tolerance
        let mut t = tuner(vec![0.7, 1.3], vec![0.04, 0.05], 2);

        assert!(t.is_tuned());

        let (first, report) = proc(&mut t, 2.0);
        assert!(first.tuned);
        assert!(!first.reset_cycle);
        assert!(report.cycle_end.is_none());

        let (second, _) = proc(&mut t, 123.4);
        assert_eq!(second.values, first.values);
        assert_eq!(second.values, vec![0.7, 1.3]);
    }

    #[test]
    fn test_enabled() {
        let t = tuner(vec![1.0], vec![1.0], 0);
        assert!(!t.enabled());

        let t = tuner(vec![1.0], vec![1.0], 100);
        assert!(t.enabled());
    }

    #[test]
    fn test_round_robin_advance() {
        let mut t = tuner(vec![1.0, 2.0], vec![1.0, 1.0], 1);

        // Cycle 1: improvement on value 0, advance to value 1
        let (out, report) = proc(&mut t, 0.5);
        assert_eq!(report.cycle_end.unwrap().param_idx, 0);
        assert_eq!(out.values, vec![1.0, 3.0]);

        // Cycle 2: improvement on value 1, wrap back to value 0
        let (out, report) = proc(&mut t, 0.1);
        assert_eq!(report.cycle_end.unwrap().param_idx, 1);
        assert_eq!(out.values, vec![2.1, 3.0]);
    }

    #[test]
    fn test_delta_count_mismatch() {
        let result = Tuner::from_config(
            vec![1.0, 2.0],
            Params {
                initial_deltas: vec![1.0],
                ..Params::default()
            },
            10,
        );

        assert!(matches!(
            result,
            Err(TunerInitError::DeltaCountMismatch {
                expected: 2,
                found: 1
            })
        ));
    }
}

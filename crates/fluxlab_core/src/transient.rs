//! Time-dependent flux by explicit finite differences.
//!
//! Forward Euler in time with the 5-point Laplacian in space:
//!
//! ```text
//! lap          = (flux[i+1,j] + flux[i-1,j] + flux[i,j+1] + flux[i,j-1] − 4·flux[i,j]) / dx²
//! flux_new[i,j] = flux[i,j] + dt·(D·lap − Σ_a·flux[i,j] + S)
//! ```
//!
//! The run starts from a unit impulse in the center cell. The scheme is only
//! conditionally stable (`dt ≤ dx²/(4D)`); [`StabilityMode::Unchecked`] lets an
//! unstable run blow up silently, [`StabilityMode::Strict`] refuses it.

use crate::error::{ensure_finite, invalid, reserve, Result, SimError};
use crate::grid::{check_shape, GridField};
use crate::runner::{run_to_completion, CancelFlag, RunProgress, SteppedRunner};
use crate::traits::{advance, for_each_interior, FieldUpdate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityMode {
    #[default]
    Unchecked,
    Strict,
}

/// Which snapshots to keep. `stride = k` keeps every k-th step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPolicy {
    pub stride: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { stride: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransientSettings {
    pub dx: f64,
    pub dt: f64,
    #[serde(default)]
    pub mode: StabilityMode,
    #[serde(default)]
    pub history: HistoryPolicy,
}

impl Default for TransientSettings {
    fn default() -> Self {
        Self {
            dx: 1.0,
            dt: 0.01,
            mode: StabilityMode::Unchecked,
            history: HistoryPolicy::default(),
        }
    }
}

impl TransientSettings {
    fn validate(&self) -> Result<()> {
        ensure_finite("dx", self.dx)?;
        ensure_finite("dt", self.dt)?;
        if self.dx <= 0.0 || self.dt <= 0.0 {
            return Err(invalid(format!(
                "dx and dt must be positive, got dx = {}, dt = {}",
                self.dx, self.dt
            )));
        }
        if self.history.stride == 0 {
            return Err(invalid("history stride must be at least 1"));
        }
        Ok(())
    }
}

/// Largest `dt` for which the explicit scheme is stable.
pub fn stability_limit(diffusion: f64, dx: f64) -> f64 {
    if diffusion <= 0.0 {
        f64::INFINITY
    } else {
        dx * dx / (4.0 * diffusion)
    }
}

/// Uniform-coefficient problem on a square grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransientProblem {
    pub grid_size: usize,
    pub time_steps: usize,
    pub diffusion: f64,
    pub absorption: f64,
    pub source: f64,
}

impl TransientProblem {
    pub fn validate(&self) -> Result<()> {
        if self.grid_size < 3 {
            return Err(invalid(format!(
                "grid_size must be at least 3, got {}",
                self.grid_size
            )));
        }
        check_shape(self.grid_size, self.grid_size)?;
        ensure_finite("diffusion coefficient D", self.diffusion)?;
        ensure_finite("absorption Sigma_a", self.absorption)?;
        ensure_finite("source S", self.source)?;
        if self.diffusion < 0.0 {
            return Err(invalid(format!(
                "diffusion coefficient D must be non-negative, got {}",
                self.diffusion
            )));
        }
        Ok(())
    }

    /// All-zero field with `1.0` in the center cell.
    pub fn initial_field(&self) -> GridField {
        let mut field = GridField::zeros(self.grid_size, self.grid_size);
        let (ci, cj) = field.center();
        field.set(ci, cj, 1.0);
        field
    }
}

/// Append-only snapshot sequence, sized up front from the step count and stride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxHistory {
    stride: usize,
    steps: Vec<usize>,
    snapshots: Vec<GridField>,
}

impl FluxHistory {
    pub fn with_capacity(policy: HistoryPolicy, time_steps: usize) -> Result<Self> {
        let capacity = time_steps.div_ceil(policy.stride.max(1));
        Ok(Self {
            stride: policy.stride.max(1),
            steps: reserve("history steps", capacity)?,
            snapshots: reserve("history snapshots", capacity)?,
        })
    }

    /// Records the field produced by 0-based `step` if the policy keeps it.
    pub fn record(&mut self, step: usize, field: &GridField) {
        if (step + 1) % self.stride == 0 {
            self.steps.push(step);
            self.snapshots.push(field.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// 0-based step index of each kept snapshot.
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn snapshots(&self) -> &[GridField] {
        &self.snapshots
    }

    pub fn get(&self, index: usize) -> Option<&GridField> {
        self.snapshots.get(index)
    }

    pub fn last(&self) -> Option<&GridField> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &GridField)> {
        self.steps.iter().copied().zip(self.snapshots.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientResult {
    pub final_field: GridField,
    pub history: FluxHistory,
    /// Sum over all cells after each step; one entry per step regardless of
    /// history thinning. This is the series the trend fit consumes.
    pub total_flux: Vec<f64>,
}

/// One explicit Euler step with uniform coefficients.
#[derive(Debug, Clone, Copy)]
pub struct ExplicitEulerStep {
    pub diffusion: f64,
    pub absorption: f64,
    pub source: f64,
    pub dx: f64,
    pub dt: f64,
}

impl FieldUpdate for ExplicitEulerStep {
    fn update(&self, current: &GridField, next: &mut GridField) {
        let (nx, ny) = current.shape();
        let dx2 = self.dx * self.dx;
        for_each_interior(nx, ny, |i, j| {
            let center = current.get(i, j);
            let laplacian = (current.get(i + 1, j)
                + current.get(i - 1, j)
                + current.get(i, j + 1)
                + current.get(i, j - 1)
                - 4.0 * center)
                / dx2;
            let rate = self.diffusion * laplacian - self.absorption * center + self.source;
            next.set(i, j, center + self.dt * rate);
        });
    }
}

/// Stepped transient solve: one unit of work is one time step.
pub struct TransientRunner {
    problem: TransientProblem,
    mode: StabilityMode,
    rule: ExplicitEulerStep,
    flux: GridField,
    scratch: GridField,
    history: FluxHistory,
    total_flux: Vec<f64>,
    step: usize,
    divergence_reported: bool,
}

impl TransientRunner {
    pub fn new(problem: TransientProblem, settings: TransientSettings) -> Result<Self> {
        problem.validate()?;
        settings.validate()?;

        let limit = stability_limit(problem.diffusion, settings.dx);
        if settings.dt > limit {
            match settings.mode {
                StabilityMode::Strict => {
                    return Err(invalid(format!(
                        "dt = {} exceeds the explicit stability limit dx²/(4D) = {limit}",
                        settings.dt
                    )));
                }
                StabilityMode::Unchecked => warn!(
                    "dt = {} exceeds the explicit stability limit {limit}; the field may oscillate or grow without bound",
                    settings.dt
                ),
            }
        }

        info!(
            "transient flux on {0}×{0} grid for {1} steps (D = {2}, Sigma_a = {3}, S = {4}, stride = {5})",
            problem.grid_size,
            problem.time_steps,
            problem.diffusion,
            problem.absorption,
            problem.source,
            settings.history.stride
        );

        let history = FluxHistory::with_capacity(settings.history, problem.time_steps)?;
        let total_flux = reserve("total flux samples", problem.time_steps)?;
        let flux = problem.initial_field();
        let scratch = flux.clone();
        Ok(Self {
            problem,
            mode: settings.mode,
            rule: ExplicitEulerStep {
                diffusion: problem.diffusion,
                absorption: problem.absorption,
                source: problem.source,
                dx: settings.dx,
                dt: settings.dt,
            },
            flux,
            scratch,
            history,
            total_flux,
            step: 0,
            divergence_reported: false,
        })
    }

    pub fn field(&self) -> &GridField {
        &self.flux
    }

    fn time_step(&mut self) -> Result<()> {
        advance(&self.rule, &mut self.flux, &mut self.scratch);
        let total = self.flux.total();

        if !(total.is_finite() && self.flux.all_finite()) {
            match self.mode {
                StabilityMode::Strict => {
                    return Err(SimError::NumericalDivergence { step: self.step });
                }
                StabilityMode::Unchecked => {
                    if !self.divergence_reported {
                        warn!("transient field became non-finite at step {}", self.step);
                        self.divergence_reported = true;
                    }
                }
            }
        }

        self.history.record(self.step, &self.flux);
        self.total_flux.push(total);
        self.step += 1;
        Ok(())
    }
}

impl SteppedRunner for TransientRunner {
    type Output = TransientResult;

    fn run_steps(&mut self, batch_size: usize) -> Result<RunProgress> {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            self.time_step()?;
        }
        debug!(
            "transient batch done: step {}/{}",
            self.step, self.problem.time_steps
        );
        Ok(self.progress())
    }

    fn is_done(&self) -> bool {
        self.step >= self.problem.time_steps
    }

    fn progress(&self) -> RunProgress {
        RunProgress {
            done: self.is_done(),
            completed: self.step,
            total: self.problem.time_steps,
            metric: self.total_flux.last().copied().unwrap_or(1.0),
        }
    }

    fn into_result(self) -> TransientResult {
        info!(
            "transient run finished after {} steps, {} snapshots kept",
            self.step,
            self.history.len()
        );
        TransientResult {
            final_field: self.flux,
            history: self.history,
            total_flux: self.total_flux,
        }
    }
}

pub fn solve_transient(
    problem: &TransientProblem,
    settings: TransientSettings,
) -> Result<TransientResult> {
    solve_transient_with_cancel(problem, settings, None)
}

pub fn solve_transient_with_cancel(
    problem: &TransientProblem,
    settings: TransientSettings,
    cancel: Option<&CancelFlag>,
) -> Result<TransientResult> {
    let runner = TransientRunner::new(*problem, settings)?;
    run_to_completion(runner, cancel)
}

#[cfg(test)]
mod tests {
    use super::{
        solve_transient, stability_limit, HistoryPolicy, StabilityMode, TransientProblem,
        TransientRunner, TransientSettings,
    };
    use crate::error::SimError;
    use crate::runner::{CancelFlag, SteppedRunner};

    fn problem(grid_size: usize, time_steps: usize, d: f64, sigma_a: f64, s: f64) -> TransientProblem {
        TransientProblem {
            grid_size,
            time_steps,
            diffusion: d,
            absorption: sigma_a,
            source: s,
        }
    }

    #[test]
    fn history_has_one_snapshot_per_step() {
        let result = solve_transient(&problem(10, 5, 1.0, 0.1, 0.0), TransientSettings::default())
            .expect("solve");
        assert_eq!(result.history.len(), 5);
        assert_eq!(result.total_flux.len(), 5);
        for snapshot in result.history.snapshots() {
            assert_eq!(snapshot.shape(), (10, 10));
        }
        assert_eq!(result.history.last(), Some(&result.final_field));
        assert_eq!(result.history.steps(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn first_step_matches_hand_computation() {
        let result = solve_transient(&problem(5, 1, 1.0, 0.1, 0.0), TransientSettings::default())
            .expect("solve");
        let f = &result.final_field;
        // Center: 1 + 0.01·(1·(−4) − 0.1·1) = 0.959
        assert!((f.get(2, 2) - 0.959).abs() < 1e-12);
        // Each neighbour receives 0.01·1 = 0.01.
        assert!((f.get(1, 2) - 0.01).abs() < 1e-12);
        assert!((f.get(2, 3) - 0.01).abs() < 1e-12);
        assert_eq!(f.get(1, 1), 0.0);
    }

    #[test]
    fn boundary_stays_zero() {
        let result = solve_transient(&problem(8, 200, 2.0, 0.05, 0.3), TransientSettings::default())
            .expect("solve");
        for snapshot in result.history.snapshots() {
            assert_eq!(snapshot.boundary_max_abs(), 0.0);
        }
    }

    #[test]
    fn pure_diffusion_loses_flux_only_through_the_boundary() {
        // With Σ_a = S = 0 the interior update conserves flux exactly except for
        // what flows into the zero boundary ring, so the total never grows and
        // the drift per step equals dt·D·Σ(boundary-adjacent flux)/dx².
        let p = problem(7, 400, 1.0, 0.0, 0.0);
        let result = solve_transient(&p, TransientSettings::default()).expect("solve");

        let mut previous_total = 1.0;
        let mut previous = p.initial_field();
        for (step, snapshot) in result.history.iter() {
            let total = result.total_flux[step];
            assert!(total <= previous_total + 1e-15);

            let (n, _) = previous.shape();
            let mut edge_outflow = 0.0;
            for k in 1..n - 1 {
                edge_outflow += previous.get(1, k) + previous.get(n - 2, k);
                edge_outflow += previous.get(k, 1) + previous.get(k, n - 2);
            }
            let expected_loss = 0.01 * 1.0 * edge_outflow;
            assert!(
                ((previous_total - total) - expected_loss).abs() < 1e-12,
                "step {step}: lost {}, expected {expected_loss}",
                previous_total - total
            );

            previous_total = total;
            previous = snapshot.clone();
        }
        // Measured drift over the run.
        assert!(result.total_flux[399] < 1.0);
        assert!(result.total_flux[399] > 0.0);
    }

    #[test]
    fn thinning_keeps_every_kth_step_and_full_total_series() {
        let settings = TransientSettings {
            history: HistoryPolicy { stride: 4 },
            ..TransientSettings::default()
        };
        let thinned = solve_transient(&problem(9, 10, 1.0, 0.1, 0.0), settings).expect("solve");
        let full = solve_transient(&problem(9, 10, 1.0, 0.1, 0.0), TransientSettings::default())
            .expect("solve");

        assert_eq!(thinned.history.steps(), &[3, 7]);
        assert_eq!(thinned.total_flux, full.total_flux);
        assert_eq!(thinned.final_field, full.final_field);
        assert_eq!(thinned.history.get(1), full.history.get(7));
    }

    #[test]
    fn zero_steps_returns_initial_impulse() {
        let p = problem(5, 0, 1.0, 0.1, 0.0);
        let result = solve_transient(&p, TransientSettings::default()).expect("solve");
        assert!(result.history.is_empty());
        assert!(result.total_flux.is_empty());
        assert_eq!(result.final_field, p.initial_field());
    }

    #[test]
    fn unchecked_mode_lets_unstable_runs_diverge() {
        // dt = 0.01 > 1/(4·50) = 0.005.
        let p = problem(9, 2000, 50.0, 0.0, 0.0);
        let result = solve_transient(&p, TransientSettings::default()).expect("unchecked run");
        assert_eq!(result.history.len(), 2000);
        let last = *result.total_flux.last().expect("non-empty");
        assert!(!last.is_finite() || last.abs() > 1e6);
    }

    #[test]
    fn strict_mode_rejects_unstable_step_size() {
        let p = problem(9, 10, 50.0, 0.0, 0.0);
        let settings = TransientSettings {
            mode: StabilityMode::Strict,
            ..TransientSettings::default()
        };
        let err = solve_transient(&p, settings).expect_err("unstable dt");
        assert!(err.to_string().contains("stability limit"));
    }

    #[test]
    fn strict_mode_reports_divergence_step() {
        // Stable for diffusion, but a huge negative absorption makes the
        // amplification factor explode until the field overflows.
        let p = problem(5, 5000, 0.0, -1.0e4, 0.0);
        let settings = TransientSettings {
            mode: StabilityMode::Strict,
            ..TransientSettings::default()
        };
        let err = solve_transient(&p, settings).expect_err("overflow");
        match err {
            SimError::NumericalDivergence { step } => assert!(step > 0 && step < 5000),
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn stability_limit_formula() {
        assert_eq!(stability_limit(1.0, 1.0), 0.25);
        assert_eq!(stability_limit(0.0, 1.0), f64::INFINITY);
        assert!((stability_limit(2.0, 0.5) - 0.03125).abs() < 1e-15);
    }

    #[test]
    fn invalid_problems_are_rejected_before_allocation() {
        assert!(solve_transient(&problem(2, 5, 1.0, 0.1, 0.0), TransientSettings::default()).is_err());
        assert!(solve_transient(&problem(5, 5, f64::NAN, 0.1, 0.0), TransientSettings::default()).is_err());
        let settings = TransientSettings {
            history: HistoryPolicy { stride: 0 },
            ..TransientSettings::default()
        };
        assert!(solve_transient(&problem(5, 5, 1.0, 0.1, 0.0), settings).is_err());
    }

    #[test]
    fn oversized_runs_are_invalid_parameters_not_panics() {
        let err = TransientRunner::new(
            problem(3, usize::MAX / 2, 1.0, 0.1, 0.0),
            TransientSettings::default(),
        )
        .err()
        .expect("step count too large to reserve");
        assert!(matches!(err, SimError::InvalidParameter(_)));
        assert!(err.to_string().contains("cannot reserve"));

        let err = TransientRunner::new(problem(1 << 13, 1, 1.0, 0.1, 0.0), TransientSettings::default())
            .err()
            .expect("grid too large");
        assert!(err.to_string().contains("exceeds the limit"));
    }

    #[test]
    fn runner_advances_in_batches_and_honours_cancel() {
        let p = problem(6, 10, 1.0, 0.1, 0.0);
        let mut runner = TransientRunner::new(p, TransientSettings::default()).expect("runner");
        let progress = runner.run_steps(4).expect("batch");
        assert_eq!(progress.completed, 4);
        assert!(!progress.done);
        assert!((progress.metric - runner.field().total()).abs() < 1e-15);

        let flag = CancelFlag::new();
        flag.cancel();
        let err = super::solve_transient_with_cancel(&p, TransientSettings::default(), Some(&flag))
            .expect_err("cancelled");
        assert_eq!(err, SimError::Cancelled { completed: 0 });
    }
}

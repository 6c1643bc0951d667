//! Steady-state flux by Jacobi relaxation.
//!
//! Each sweep recomputes every interior cell from the previous sweep's field:
//!
//! ```text
//! flux_new[i,j] = (S[i,j] + D·(flux[i+1,j] + flux[i-1,j] + flux[i,j+1] + flux[i,j-1]))
//!                 / (4·D + Σ_a[i,j])
//! ```
//!
//! The iteration stops once `‖flux_new − flux‖` over the whole grid drops
//! below the tolerance, or after `max_iter` sweeps. A converged solve returns
//! `flux`, not `flux_new`.

use crate::error::{ensure_finite, invalid, Result, SimError};
use crate::grid::{check_shape, GridField};
use crate::material::MaterialCoefficients;
use crate::runner::{run_to_completion, CancelFlag, RunProgress, SteppedRunner};
use crate::traits::{advance, for_each_interior, FieldUpdate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationSettings {
    pub max_iter: usize,
    pub tolerance: f64,
    /// Keep a copy of the field after every sweep.
    #[serde(default)]
    pub record_sweeps: bool,
}

impl Default for RelaxationSettings {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-5,
            record_sweeps: false,
        }
    }
}

impl RelaxationSettings {
    fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(invalid("max_iter must be at least 1"));
        }
        ensure_finite("tolerance", self.tolerance)?;
        if self.tolerance <= 0.0 {
            return Err(invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationResult {
    /// Field after the last sweep, or, on convergence, the field the
    /// converging sweep was measured against.
    pub field: GridField,
    /// `true` when the last sweep moved the field by less than the tolerance.
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: f64,
    /// `‖flux_new − flux‖` of every sweep, in order.
    pub residual_history: Vec<f64>,
    /// `sweeps[k]` is the result a solve capped at `k + 1` sweeps would return;
    /// empty unless `record_sweeps` was set.
    pub sweeps: Vec<GridField>,
}

impl RelaxationResult {
    /// Treats an iteration-exhausted result as an error.
    pub fn require_converged(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(SimError::NonConvergence {
                iterations: self.iterations,
                residual_norm: self.residual_norm,
            })
        }
    }
}

/// One Jacobi sweep with the given coefficients.
pub struct JacobiSweep<'a> {
    coefficients: &'a MaterialCoefficients,
}

impl<'a> JacobiSweep<'a> {
    pub fn new(coefficients: &'a MaterialCoefficients) -> Self {
        Self { coefficients }
    }
}

impl FieldUpdate for JacobiSweep<'_> {
    fn update(&self, current: &GridField, next: &mut GridField) {
        let (nx, ny) = current.shape();
        let c = self.coefficients;
        for_each_interior(nx, ny, |i, j| {
            let d = c.diffusion.at(i, j);
            let neighbours = current.get(i + 1, j)
                + current.get(i - 1, j)
                + current.get(i, j + 1)
                + current.get(i, j - 1);
            let value = (c.source.at(i, j) + d * neighbours) / (4.0 * d + c.absorption.at(i, j));
            next.set(i, j, value);
        });
    }
}

/// Stepped relaxation: one unit of work is one sweep.
#[derive(Debug)]
pub struct RelaxationRunner {
    coefficients: MaterialCoefficients,
    settings: RelaxationSettings,
    flux: GridField,
    scratch: GridField,
    iterations: usize,
    residual_norm: f64,
    residual_history: Vec<f64>,
    sweeps: Vec<GridField>,
    converged: bool,
}

impl RelaxationRunner {
    pub fn new(
        nx: usize,
        ny: usize,
        coefficients: MaterialCoefficients,
        settings: RelaxationSettings,
    ) -> Result<Self> {
        settings.validate()?;
        check_shape(nx, ny)?;
        coefficients.validate(nx, ny)?;

        info!(
            "steady-state relaxation on {nx}×{ny} grid (max_iter = {}, tol = {:e})",
            settings.max_iter, settings.tolerance
        );

        let flux = GridField::zeros(nx, ny);
        let scratch = flux.clone();
        Ok(Self {
            coefficients,
            settings,
            flux,
            scratch,
            iterations: 0,
            residual_norm: f64::INFINITY,
            residual_history: Vec::new(),
            sweeps: Vec::new(),
            converged: false,
        })
    }

    pub fn field(&self) -> &GridField {
        &self.flux
    }

    fn sweep(&mut self) {
        advance(
            &JacobiSweep::new(&self.coefficients),
            &mut self.flux,
            &mut self.scratch,
        );
        // After the swap `scratch` holds the previous sweep.
        self.residual_norm = self.flux.distance(&self.scratch);
        self.residual_history.push(self.residual_norm);
        self.iterations += 1;
        if self.residual_norm < self.settings.tolerance {
            // The converging sweep is discarded; the result is the field it was
            // measured against.
            std::mem::swap(&mut self.flux, &mut self.scratch);
            self.converged = true;
        }
        if self.settings.record_sweeps {
            self.sweeps.push(self.flux.clone());
        }
    }
}

impl SteppedRunner for RelaxationRunner {
    type Output = RelaxationResult;

    fn run_steps(&mut self, batch_size: usize) -> Result<RunProgress> {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            self.sweep();
        }
        debug!(
            "relaxation batch done: {} sweeps, ‖Δflux‖ = {:e}",
            self.iterations, self.residual_norm
        );
        Ok(self.progress())
    }

    fn is_done(&self) -> bool {
        self.converged || self.iterations >= self.settings.max_iter
    }

    fn progress(&self) -> RunProgress {
        RunProgress {
            done: self.is_done(),
            completed: self.iterations,
            total: self.settings.max_iter,
            metric: self.residual_norm,
        }
    }

    fn into_result(self) -> RelaxationResult {
        if self.converged {
            info!(
                "relaxation converged after {} sweeps (‖Δflux‖ = {:e})",
                self.iterations, self.residual_norm
            );
        } else {
            warn!(
                "relaxation stopped after {} sweeps without meeting tol = {:e} (‖Δflux‖ = {:e})",
                self.iterations, self.settings.tolerance, self.residual_norm
            );
        }
        RelaxationResult {
            field: self.flux,
            converged: self.converged,
            iterations: self.iterations,
            residual_norm: self.residual_norm,
            residual_history: self.residual_history,
            sweeps: self.sweeps,
        }
    }
}

pub fn solve_steady_state(
    nx: usize,
    ny: usize,
    coefficients: &MaterialCoefficients,
    settings: RelaxationSettings,
) -> Result<RelaxationResult> {
    solve_steady_state_with_cancel(nx, ny, coefficients, settings, None)
}

pub fn solve_steady_state_with_cancel(
    nx: usize,
    ny: usize,
    coefficients: &MaterialCoefficients,
    settings: RelaxationSettings,
    cancel: Option<&CancelFlag>,
) -> Result<RelaxationResult> {
    let runner = RelaxationRunner::new(nx, ny, coefficients.clone(), settings)?;
    run_to_completion(runner, cancel)
}

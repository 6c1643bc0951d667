//! Material inputs: diffusion/absorption/source coefficients for the flux
//! solvers and the decay-material registry for the particle simulator.

use crate::error::{ensure_finite, invalid, Result, SimError};
use crate::grid::{Coefficient, GridField};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Diffusion coefficient `D`, absorption cross-section `Σ_a` and source `S`.
/// Read-only for the duration of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCoefficients {
    pub diffusion: Coefficient,
    pub absorption: Coefficient,
    pub source: Coefficient,
}

impl MaterialCoefficients {
    pub fn new(
        diffusion: impl Into<Coefficient>,
        absorption: impl Into<Coefficient>,
        source: impl Into<Coefficient>,
    ) -> Self {
        Self {
            diffusion: diffusion.into(),
            absorption: absorption.into(),
            source: source.into(),
        }
    }

    /// Uniform `D` and `Σ_a` with a single source cell of the given strength at
    /// the grid center.
    pub fn with_point_source(
        nx: usize,
        ny: usize,
        diffusion: f64,
        absorption: f64,
        strength: f64,
    ) -> Self {
        let mut source = GridField::zeros(nx, ny);
        if nx > 0 && ny > 0 {
            let (ci, cj) = source.center();
            source.set(ci, cj, strength);
        }
        Self::new(diffusion, absorption, source)
    }

    /// Validates every coefficient against an `nx × ny` grid. The relaxation
    /// denominator `4·D + Σ_a` must be positive on every interior cell.
    pub fn validate(&self, nx: usize, ny: usize) -> Result<()> {
        let shape = (nx, ny);
        self.diffusion.validate("diffusion coefficient D", shape, true)?;
        self.absorption.validate("absorption Sigma_a", shape, true)?;
        self.source.validate("source S", shape, false)?;

        for i in 1..nx.saturating_sub(1) {
            for j in 1..ny.saturating_sub(1) {
                let denominator = 4.0 * self.diffusion.at(i, j) + self.absorption.at(i, j);
                if denominator <= 0.0 {
                    return Err(invalid(format!(
                        "D and Sigma_a are both zero at cell ({i}, {j}); need D > 0 or Sigma_a > 0"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A decaying fuel material. Half-life is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayMaterial {
    pub name: String,
    pub half_life: f64,
    pub mass_to_atoms: f64,
    pub dose_factor: f64,
}

impl DecayMaterial {
    pub fn new(name: impl Into<String>, half_life: f64, mass_to_atoms: f64, dose_factor: f64) -> Self {
        Self {
            name: name.into(),
            half_life,
            mass_to_atoms,
            dose_factor,
        }
    }

    /// The fixed U-235 / Pu-239 / Th-232 registry.
    pub fn registry() -> [DecayMaterial; 3] {
        [
            DecayMaterial::new("U-235", 7.04e8 * SECONDS_PER_YEAR, 2.56e21, 0.01),
            DecayMaterial::new("Pu-239", 2.41e4 * SECONDS_PER_YEAR, 2.53e21, 0.02),
            DecayMaterial::new("Th-232", 1.41e10 * SECONDS_PER_YEAR, 2.40e21, 0.015),
        ]
    }

    pub fn lookup(name: &str) -> Result<DecayMaterial> {
        Self::registry()
            .into_iter()
            .find(|material| material.name == name)
            .ok_or_else(|| SimError::UnknownMaterial(name.to_string()))
    }

    /// `ln(2) / half_life`.
    pub fn decay_constant(&self) -> f64 {
        LN_2 / self.half_life
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure_finite("half_life", self.half_life)?;
        ensure_finite("dose_factor", self.dose_factor)?;
        if self.half_life <= 0.0 {
            return Err(invalid(format!(
                "half_life of {} must be positive, got {}",
                self.name, self.half_life
            )));
        }
        if self.dose_factor < 0.0 {
            return Err(invalid(format!(
                "dose_factor of {} must be non-negative, got {}",
                self.name, self.dose_factor
            )));
        }
        Ok(())
    }
}

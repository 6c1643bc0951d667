//! One run, one session: the request that configures a kernel and the value
//! that owns everything the run produced.

use crate::decay::{simulate_material, DecayRun, DecaySettings};
use crate::error::Result;
use crate::material::{DecayMaterial, MaterialCoefficients};
use crate::runner::CancelFlag;
use crate::steady_state::{solve_steady_state_with_cancel, RelaxationResult, RelaxationSettings};
use crate::transient::{
    solve_transient_with_cancel, TransientProblem, TransientResult, TransientSettings,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Parameters for exactly one kernel invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationRequest {
    SteadyState {
        nx: usize,
        ny: usize,
        coefficients: MaterialCoefficients,
        #[serde(default)]
        settings: RelaxationSettings,
    },
    Transient {
        problem: TransientProblem,
        #[serde(default)]
        settings: TransientSettings,
    },
    Decay {
        material: String,
        mass: f64,
        seed: u64,
        #[serde(default)]
        settings: DecaySettings,
    },
}

/// Outputs of a single run, owned by the caller until the next run replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum SimulationSession {
    SteadyState(RelaxationResult),
    Transient(TransientResult),
    Decay(DecayRun),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub kind: String,
    /// Sweeps, time steps or frames completed.
    pub steps: usize,
    /// Final residual norm, total flux or cumulative dose.
    pub metric: f64,
}

impl SimulationSession {
    pub fn run(request: &SimulationRequest) -> Result<Self> {
        Self::run_with_cancel(request, None)
    }

    pub fn run_with_cancel(request: &SimulationRequest, cancel: Option<&CancelFlag>) -> Result<Self> {
        match request {
            SimulationRequest::SteadyState {
                nx,
                ny,
                coefficients,
                settings,
            } => solve_steady_state_with_cancel(*nx, *ny, coefficients, *settings, cancel)
                .map(SimulationSession::SteadyState),
            SimulationRequest::Transient { problem, settings } => {
                solve_transient_with_cancel(problem, *settings, cancel)
                    .map(SimulationSession::Transient)
            }
            SimulationRequest::Decay {
                material,
                mass,
                seed,
                settings,
            } => simulate_material(
                DecayMaterial::lookup(material)?,
                *mass,
                *settings,
                StdRng::seed_from_u64(*seed),
                cancel,
            )
            .map(SimulationSession::Decay),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        match self {
            SimulationSession::SteadyState(result) => SessionSummary {
                kind: "steady_state".to_string(),
                steps: result.iterations,
                metric: result.residual_norm,
            },
            SimulationSession::Transient(result) => SessionSummary {
                kind: "transient".to_string(),
                steps: result.total_flux.len(),
                metric: result.final_field.total(),
            },
            SimulationSession::Decay(run) => SessionSummary {
                kind: "decay".to_string(),
                steps: run.frames.len(),
                metric: run.dose_trace.final_dose(),
            },
        }
    }
}

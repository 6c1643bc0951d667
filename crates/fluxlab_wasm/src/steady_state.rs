//! Stepped steady-state relaxation runner.

use crate::shared::{coefficient_from_slice, js_error, to_js, NOT_INITIALIZED};
use anyhow::{Context, Result};
use fluxlab_core::material::MaterialCoefficients;
use fluxlab_core::runner::SteppedRunner;
use fluxlab_core::steady_state::{RelaxationRunner, RelaxationSettings};
use js_sys::Float64Array;
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

pub(crate) fn build_relaxation_runner(
    nx: usize,
    ny: usize,
    diffusion: &[f64],
    absorption: &[f64],
    source: &[f64],
    settings: RelaxationSettings,
) -> Result<RelaxationRunner> {
    let coefficients = MaterialCoefficients {
        diffusion: coefficient_from_slice("D", nx, ny, diffusion)?,
        absorption: coefficient_from_slice("Sigma_a", nx, ny, absorption)?,
        source: coefficient_from_slice("S", nx, ny, source)?,
    };
    RelaxationRunner::new(nx, ny, coefficients, settings).context("Relaxation init failed")
}

/// WASM-exported runner for the steady-state flux solver.
/// One step is one relaxation sweep.
#[wasm_bindgen]
pub struct WasmRelaxationRunner {
    runner: Option<RelaxationRunner>,
}

#[wasm_bindgen]
impl WasmRelaxationRunner {
    /// `diffusion`, `absorption` and `source` take either one value (uniform)
    /// or `nx * ny` row-major values. `settings_val` may be `undefined`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        nx: u32,
        ny: u32,
        diffusion: Vec<f64>,
        absorption: Vec<f64>,
        source: Vec<f64>,
        settings_val: JsValue,
    ) -> Result<WasmRelaxationRunner, JsValue> {
        console_error_panic_hook::set_once();

        let settings: RelaxationSettings = if settings_val.is_undefined() {
            RelaxationSettings::default()
        } else {
            from_value(settings_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid relaxation settings: {}", e)))?
        };

        let runner = build_relaxation_runner(
            nx as usize,
            ny as usize,
            &diffusion,
            &absorption,
            &source,
            settings,
        )
        .map_err(js_error)?;

        Ok(WasmRelaxationRunner {
            runner: Some(runner),
        })
    }

    pub fn is_done(&self) -> bool {
        self.runner.as_ref().map_or(true, |runner| runner.is_done())
    }

    /// Run a batch of sweeps and return progress.
    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;

        let progress = runner
            .run_steps(batch_size as usize)
            .map_err(|e| JsValue::from_str(&format!("Relaxation step failed: {}", e)))?;

        to_js(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(&runner.progress())
    }

    /// Current field, row-major.
    pub fn get_field(&self) -> Result<Float64Array, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        Ok(Float64Array::from(runner.field().to_row_major().as_slice()))
    }

    /// Final result; consumes the runner.
    pub fn get_result(&mut self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .take()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(&runner.into_result())
    }
}

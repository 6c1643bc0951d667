//! Stepped decay/dose runner.

use crate::shared::{alive_mask, interleave_positions, js_error, to_js, NOT_INITIALIZED};
use anyhow::{Context, Result};
use fluxlab_core::decay::{DecayRunner, DecaySettings, DecaySimulator};
use fluxlab_core::material::DecayMaterial;
use fluxlab_core::runner::SteppedRunner;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

pub(crate) fn build_decay_runner(
    material: &str,
    mass: f64,
    seed: u64,
    settings: DecaySettings,
) -> Result<DecayRunner<StdRng>> {
    let material = DecayMaterial::lookup(material)?;
    let simulator = DecaySimulator::new(material, mass, settings, StdRng::seed_from_u64(seed))
        .context("Decay init failed")?;
    DecayRunner::new(simulator).context("Decay init failed")
}

/// WASM-exported runner for the particle decay simulation. One step is one frame.
#[wasm_bindgen]
pub struct WasmDecayRunner {
    runner: Option<DecayRunner<StdRng>>,
}

#[wasm_bindgen]
impl WasmDecayRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        material: &str,
        mass: f64,
        seed: u32,
        settings_val: JsValue,
    ) -> Result<WasmDecayRunner, JsValue> {
        console_error_panic_hook::set_once();

        let settings: DecaySettings = if settings_val.is_undefined() {
            DecaySettings::default()
        } else {
            from_value(settings_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid decay settings: {}", e)))?
        };

        let runner = build_decay_runner(material, mass, u64::from(seed), settings).map_err(js_error)?;

        Ok(WasmDecayRunner {
            runner: Some(runner),
        })
    }

    pub fn is_done(&self) -> bool {
        self.runner.as_ref().map_or(true, |runner| runner.is_done())
    }

    /// Run a batch of frames and return progress.
    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;

        let progress = runner
            .run_steps(batch_size as usize)
            .map_err(|e| JsValue::from_str(&format!("Decay step failed: {}", e)))?;

        to_js(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(&runner.progress())
    }

    /// Current positions as `[x0, y0, x1, y1, ...]`.
    pub fn get_positions(&self) -> Result<Vec<f64>, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        Ok(interleave_positions(runner.simulator().particles()))
    }

    /// `1` for live particles, `0` for decayed ones.
    pub fn get_alive(&self) -> Result<Vec<u8>, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        Ok(alive_mask(runner.simulator().particles()))
    }

    pub fn get_dose_trace(&self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(runner.simulator().dose_trace())
    }

    /// All frames and the dose trace; consumes the runner.
    pub fn get_result(&mut self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .take()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(&runner.into_result())
    }
}

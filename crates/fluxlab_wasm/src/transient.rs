//! Stepped transient flux runner.

use crate::shared::{js_error, to_js, NOT_INITIALIZED};
use anyhow::Context;
use fluxlab_core::runner::SteppedRunner;
use fluxlab_core::transient::{TransientProblem, TransientRunner, TransientSettings};
use js_sys::Float64Array;
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

/// WASM-exported runner for the transient solver. One step is one time step.
#[wasm_bindgen]
pub struct WasmTransientRunner {
    runner: Option<TransientRunner>,
}

#[wasm_bindgen]
impl WasmTransientRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        grid_size: u32,
        time_steps: u32,
        diffusion: f64,
        absorption: f64,
        source: f64,
        settings_val: JsValue,
    ) -> Result<WasmTransientRunner, JsValue> {
        console_error_panic_hook::set_once();

        let settings: TransientSettings = if settings_val.is_undefined() {
            TransientSettings::default()
        } else {
            from_value(settings_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid transient settings: {}", e)))?
        };

        let problem = TransientProblem {
            grid_size: grid_size as usize,
            time_steps: time_steps as usize,
            diffusion,
            absorption,
            source,
        };

        let runner = TransientRunner::new(problem, settings)
            .context("Transient init failed")
            .map_err(js_error)?;

        Ok(WasmTransientRunner {
            runner: Some(runner),
        })
    }

    pub fn is_done(&self) -> bool {
        self.runner.as_ref().map_or(true, |runner| runner.is_done())
    }

    /// Run a batch of time steps and return progress.
    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .as_mut()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;

        let progress = runner
            .run_steps(batch_size as usize)
            .map_err(|e| JsValue::from_str(&format!("Transient step failed: {}", e)))?;

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

    /// Final field, history and total-flux series; consumes the runner.
    pub fn get_result(&mut self) -> Result<JsValue, JsValue> {
        let runner = self
            .runner
            .take()
            .ok_or_else(|| JsValue::from_str(NOT_INITIALIZED))?;
        to_js(&runner.into_result())
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::WasmTransientRunner;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn transient_runner_finishes_after_requested_steps() {
        let mut runner =
            WasmTransientRunner::new(10, 5, 1.0, 0.1, 0.0, JsValue::UNDEFINED).expect("runner");
        assert!(!runner.is_done());
        runner.run_steps(3).expect("batch");
        assert!(!runner.is_done());
        runner.run_steps(3).expect("batch");
        assert!(runner.is_done());
        assert_eq!(runner.get_field().expect("field").length(), 100);
        assert!(runner.get_result().is_ok());
    }

    #[wasm_bindgen_test]
    fn transient_runner_rejects_tiny_grid() {
        let result = WasmTransientRunner::new(2, 5, 1.0, 0.1, 0.0, JsValue::UNDEFINED);
        let message = result.err().and_then(|err| err.as_string()).unwrap_or_default();
        assert!(message.contains("Transient init failed"));
        assert!(message.contains("grid_size"));
    }
}

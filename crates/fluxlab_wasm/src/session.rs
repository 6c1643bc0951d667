//! One-shot bindings: run a whole request, list the material registry.

use crate::shared::{js_error, to_js};
use anyhow::Context;
use fluxlab_core::material::DecayMaterial;
use fluxlab_core::session::{SimulationRequest, SimulationSession};
use fluxlab_core::transient;
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

/// Runs a `SimulationRequest` to completion and returns the serialized session.
#[wasm_bindgen]
pub fn run_simulation(request_val: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let request: SimulationRequest = from_value(request_val)
        .map_err(|e| JsValue::from_str(&format!("Invalid simulation request: {}", e)))?;

    let session = SimulationSession::run(&request)
        .context("Simulation failed")
        .map_err(js_error)?;

    to_js(&session)
}

#[wasm_bindgen]
pub fn decay_materials() -> Result<JsValue, JsValue> {
    to_js(&DecayMaterial::registry())
}

/// Largest stable `dt` for the explicit transient scheme.
#[wasm_bindgen]
pub fn stability_limit(diffusion: f64, dx: f64) -> f64 {
    transient::stability_limit(diffusion, dx)
}

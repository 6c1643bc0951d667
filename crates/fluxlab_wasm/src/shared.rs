//! Conversions shared by the runner bindings.

use anyhow::{bail, Result};
use fluxlab_core::decay::Particle;
use fluxlab_core::grid::{Coefficient, GridField};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

pub(crate) const NOT_INITIALIZED: &str = "Runner not initialized";

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

pub(crate) fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

/// A coefficient array from JS: one value means uniform, `nx * ny` values are
/// a row-major per-cell field.
pub(crate) fn coefficient_from_slice(
    name: &str,
    nx: usize,
    ny: usize,
    values: &[f64],
) -> Result<Coefficient> {
    match values.len() {
        1 => Ok(Coefficient::Uniform(values[0])),
        n if n == nx * ny => Ok(Coefficient::Field(GridField::from_row_major(nx, ny, values)?)),
        n => bail!(
            "{} needs 1 or {} values for a {}×{} grid, got {}",
            name,
            nx * ny,
            nx,
            ny,
            n
        ),
    }
}

/// Positions as `[x0, y0, x1, y1, ...]`.
pub(crate) fn interleave_positions(particles: &[Particle]) -> Vec<f64> {
    particles.iter().flat_map(|p| [p.x, p.y]).collect()
}

pub(crate) fn alive_mask(particles: &[Particle]) -> Vec<u8> {
    particles.iter().map(|p| u8::from(p.alive)).collect()
}

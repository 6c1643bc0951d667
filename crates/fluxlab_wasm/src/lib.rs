//! WASM bindings for the Fluxlab kernels.
//!
//! Each kernel is exposed as a stepped runner so the front-end can advance it
//! in batches, draw intermediate state and stop between batches.

mod decay;
mod session;
mod shared;
mod steady_state;
mod transient;

pub use decay::WasmDecayRunner;
pub use session::{decay_materials, run_simulation, stability_limit};
pub use steady_state::WasmRelaxationRunner;
pub use transient::WasmTransientRunner;

pub mod decay;
pub mod error;
pub mod grid;
pub mod material;
pub mod runner;
pub mod session;
pub mod steady_state;
/// The `fluxlab_core` crate holds the numerical kernels behind Fluxlab, a
/// teaching simulator for neutron transport and radioactive decay.
///
/// Key components:
/// - **Grid**: `GridField`, a 2D flux field with a fixed vacuum boundary, and `Coefficient`.
/// - **Steady state**: Jacobi relaxation to the equilibrium flux.
/// - **Transient**: explicit finite-difference time stepping with a snapshot history.
/// - **Decay**: a seedable particle-ensemble decay simulation with a dose trace.
/// - **Runners**: batch-stepped execution with progress reporting and cancellation.
/// - **Session**: the request/result pair that replaces global run state.
pub mod traits;
pub mod transient;

pub use error::{Result, SimError};

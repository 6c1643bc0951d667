use thiserror::Error;

/// Errors produced by the simulation kernels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Rejected before any grid or particle allocation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown material: {0} (expected one of U-235, Pu-239, Th-232)")]
    UnknownMaterial(String),

    /// Only raised in strict mode; the unchecked transient solver lets
    /// non-finite values propagate.
    #[error("Numerical divergence: field became non-finite at step {step}")]
    NumericalDivergence { step: usize },

    #[error(
        "Relaxation did not converge in {iterations} sweeps (‖Δflux‖ = {residual_norm:e})"
    )]
    NonConvergence { iterations: usize, residual_norm: f64 },

    #[error("Run cancelled after {completed} completed steps")]
    Cancelled { completed: usize },
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Shorthand used by the validation helpers.
pub(crate) fn invalid(message: impl Into<String>) -> SimError {
    SimError::InvalidParameter(message.into())
}

pub(crate) fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(invalid(format!("{name} must be finite, got {value}")));
    }
    Ok(())
}

/// Empty vector with room for `capacity` items, or `InvalidParameter` when
/// that much cannot be reserved.
pub(crate) fn reserve<T>(what: &str, capacity: usize) -> Result<Vec<T>> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(capacity)
        .map_err(|_| invalid(format!("cannot reserve {capacity} {what}")))?;
    Ok(items)
}

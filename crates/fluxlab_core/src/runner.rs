//! Batch-stepped execution shared by the three kernels.
//!
//! Every kernel is a state machine that advances one relaxation sweep, time
//! step or decay frame per unit of work. Front-ends drive it in batches to
//! report progress; [`run_to_completion`] drains it in one call and polls an
//! optional [`CancelFlag`] at every unit boundary.

use crate::error::{Result, SimError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress payload reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub done: bool,
    pub completed: usize,
    pub total: usize,
    /// Last residual norm (steady state), total flux (transient) or
    /// cumulative dose (decay).
    pub metric: f64,
}

pub trait SteppedRunner {
    type Output;

    /// Runs at most `batch_size` units of work. Calling this on a finished
    /// runner is a no-op that reports `done`.
    fn run_steps(&mut self, batch_size: usize) -> Result<RunProgress>;

    fn is_done(&self) -> bool;

    fn progress(&self) -> RunProgress;

    /// Consumes the runner, returning whatever has been computed so far.
    fn into_result(self) -> Self::Output;
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives `runner` one unit at a time until it reports done.
pub fn run_to_completion<R: SteppedRunner>(
    mut runner: R,
    cancel: Option<&CancelFlag>,
) -> Result<R::Output> {
    while !runner.is_done() {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            let completed = runner.progress().completed;
            debug!("run cancelled after {completed} steps");
            return Err(SimError::Cancelled { completed });
        }
        runner.run_steps(1)?;
    }
    Ok(runner.into_result())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler-local failures that don't belong in [`grid_core::GridError`]
//! (which carries the errors shared with the wire layer, spec.md §7) —
//! failures in the scheduler's own lifecycle management rather than in a
//! job's execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Grid(#[from] grid_core::GridError),

    /// Returned by [`crate::scheduler::JobScheduler::stop`] when `stop`
    /// has already been called once (spec.md §4.E "Lifecycle" — the
    /// stopping flag only flips once).
    #[error("scheduler is already stopping")]
    Stopping,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler metrics and the read-only system view (spec.md §6, SPEC_FULL.md
//! §5 "Supplemented features").
//!
//! Neither type holds a lock on the scheduler's own maps: both are
//! snapshots, built from a single pass over [`crate::maps::SchedulerMaps`]
//! so a caller polling for dashboards or `SystemView`-style introspection
//! never blocks a message-handler thread.

use grid_core::JobId;
use serde::{Deserialize, Serialize};

/// A point-in-time count of jobs in each scheduler map (spec.md §6
/// "Metrics"). Cheap to produce; safe to poll on an interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub passive: usize,
    pub active: usize,
    pub held: usize,
    pub sync_running: usize,
    pub cancelled: usize,
    pub finished: usize,
    pub total_executed: u64,
    pub total_cancelled: u64,
    pub total_rejected: u64,
}

impl SchedulerMetrics {
    /// Jobs actually consuming collision-policy concurrency, i.e. active
    /// minus held (spec.md I3 / the collision window's admission count).
    pub fn active_excluding_held(&self) -> usize {
        self.active.saturating_sub(self.held)
    }
}

/// The externally visible state of one job, for `SchedulerView` (SPEC_FULL.md
/// §5). Deliberately coarser than [`crate::worker::WorkerState`]: callers
/// outside this crate don't need to distinguish `Finishing` from `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewState {
    Passive,
    Active,
    Held,
    SyncRunning,
    Cancelled,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewEntry {
    pub job_id: JobId,
    pub state: ViewState,
}

/// A read model over the scheduler's maps at a moment in time, named after
/// the introspection surface this system exposes operators (SPEC_FULL.md
/// §5). Consumers should treat a `SchedulerView` as already stale by the
/// time they read it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerView {
    pub entries: Vec<ViewEntry>,
}

impl SchedulerView {
    pub fn new(entries: Vec<ViewEntry>) -> Self {
        Self { entries }
    }

    pub fn state_of(&self, job_id: JobId) -> Option<ViewState> {
        self.entries
            .iter()
            .find(|e| e.job_id == job_id)
            .map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

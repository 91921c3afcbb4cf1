// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler's four job maps plus the `held` side-set (spec.md §3
//! "Scheduler maps", invariants I1–I3).
//!
//! Kept as concurrent, lock-free maps (design note "Shared-resource
//! policy") so message-handler threads and collision passes never block on
//! each other for a simple lookup or insert; compound operations that must
//! be atomic across more than one map (activation, cancellation) take the
//! scheduler's process-wide RW lock as a reader, per spec.md §5.

use dashmap::{DashMap, DashSet};
use grid_core::JobId;
use std::sync::Arc;

use crate::worker::JobWorker;

/// Which of the four maps a job currently occupies (spec.md I1: at most
/// one, ever).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobLocation {
    Passive,
    Active,
    SyncRunning,
    Cancelled,
}

/// Owns the `passive`/`active`/`syncRunning`/`cancelled` maps and the
/// `held` side-set.
#[derive(Default)]
pub struct SchedulerMaps {
    pub passive: DashMap<JobId, Arc<JobWorker>>,
    pub active: DashMap<JobId, Arc<JobWorker>>,
    pub sync_running: DashSet<JobId>,
    pub cancelled: DashMap<JobId, Arc<JobWorker>>,
    pub held: DashSet<JobId>,
}

impl SchedulerMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where `job_id` currently lives, if anywhere (invariant I1 means this
    /// is always unambiguous).
    pub fn locate(&self, job_id: JobId) -> Option<JobLocation> {
        if self.passive.contains_key(&job_id) {
            Some(JobLocation::Passive)
        } else if self.active.contains_key(&job_id) {
            Some(JobLocation::Active)
        } else if self.sync_running.contains(&job_id) {
            Some(JobLocation::SyncRunning)
        } else if self.cancelled.contains_key(&job_id) {
            Some(JobLocation::Cancelled)
        } else {
            None
        }
    }

    /// Marks `job_id` held. The caller must already know the job is in
    /// `active` (invariant I3: held ⊆ active).
    pub fn mark_held(&self, job_id: JobId) {
        self.held.insert(job_id);
    }

    pub fn mark_unheld(&self, job_id: JobId) {
        self.held.remove(&job_id);
    }

    /// Removes `job_id` from `active`, and from `held` alongside it
    /// (invariant I3).
    pub fn remove_active(&self, job_id: JobId) -> Option<Arc<JobWorker>> {
        self.held.remove(&job_id);
        self.active.remove(&job_id).map(|(_, w)| w)
    }

    pub fn active_count_excluding_held(&self) -> usize {
        self.active.len().saturating_sub(self.held.len())
    }

    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.passive.len(),
            self.active.len(),
            self.sync_running.len(),
            self.cancelled.len(),
            self.held.len(),
        )
    }
}

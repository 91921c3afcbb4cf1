// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Performance-statistics sink (spec.md §4.C "records queued/execute times
//! into the performance-statistics sink"). Shaped on the teacher's
//! `usage_metrics` collector: a small trait with an in-memory test double
//! rather than a push-based exporter, since no metrics backend is in scope.

use grid_core::JobId;
use parking_lot::Mutex;
use std::time::Duration;

/// One job's queued/execute timing, handed to the sink once at finish.
#[derive(Debug, Clone, Copy)]
pub struct JobTiming {
    pub job_id: JobId,
    pub queued_for: Duration,
    pub executed_for: Duration,
}

/// Receives timing for every job that reaches a terminal state. Implementors
/// must not block the caller for long: this is called from the worker's
/// finish path.
pub trait PerformanceStatsSink: Send + Sync {
    fn record(&self, timing: JobTiming);
}

/// Discards everything. The default when no sink is configured.
pub struct NoopStatsSink;

impl PerformanceStatsSink for NoopStatsSink {
    fn record(&self, _timing: JobTiming) {}
}

/// Records every timing in insertion order, for tests and the demo CLI.
#[derive(Default)]
pub struct InMemoryStatsSink {
    recorded: Mutex<Vec<JobTiming>>,
}

impl InMemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<JobTiming> {
        self.recorded.lock().clone()
    }
}

impl PerformanceStatsSink for InMemoryStatsSink {
    fn record(&self, timing: JobTiming) {
        self.recorded.lock().push(timing);
    }
}

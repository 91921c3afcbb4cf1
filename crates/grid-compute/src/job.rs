// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identity (spec.md §3 "Job identity").

use grid_core::{JobId, NodeId, PartitionRef, SessionId};
use std::time::{Duration, Instant};

/// Everything the scheduler and worker need to know about a job besides
/// its executable payload. `end_time` is computed once at construction
/// and clamped to `None` (meaning "no deadline") on overflow rather than
/// panicking.
#[derive(Debug, Clone)]
pub struct JobMeta {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub origin: NodeId,
    pub created_at: Instant,
    pub timeout: Option<Duration>,
    pub executor_name: Option<String>,
    /// Internal jobs bypass collision and run inline on the calling
    /// thread (spec.md §4.E step 7).
    pub internal: bool,
    pub partitions: Vec<PartitionRef>,
    pub session_full_support: bool,
}

impl JobMeta {
    pub fn new(session_id: SessionId, job_id: JobId, origin: NodeId) -> Self {
        Self {
            session_id,
            job_id,
            origin,
            created_at: Instant::now(),
            timeout: None,
            executor_name: None,
            internal: false,
            partitions: Vec::new(),
            session_full_support: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_partitions(mut self, partitions: Vec<PartitionRef>) -> Self {
        self.partitions = partitions;
        self
    }

    /// `end_time = create + timeout`, clamped at `+∞` (i.e. `None`) on
    /// overflow (spec.md §3).
    pub fn end_time(&self) -> Option<Instant> {
        self.timeout
            .and_then(|t| self.created_at.checked_add(t))
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        matches!(self.end_time(), Some(end) if now >= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_is_none_without_a_timeout() {
        let meta = JobMeta::new(SessionId::new(), JobId::new(), NodeId::new());
        assert!(meta.end_time().is_none());
        assert!(!meta.is_timed_out(Instant::now()));
    }

    #[test]
    fn end_time_clamps_on_overflow_instead_of_panicking() {
        let meta = JobMeta::new(SessionId::new(), JobId::new(), NodeId::new())
            .with_timeout(Duration::from_secs(u64::MAX));
        assert!(meta.end_time().is_none());
    }

    #[test]
    fn is_timed_out_once_past_end_time() {
        let meta = JobMeta::new(SessionId::new(), JobId::new(), NodeId::new())
            .with_timeout(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(meta.is_timed_out(Instant::now()));
    }
}

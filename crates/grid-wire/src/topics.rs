// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Well-known topic names (spec.md §6 "Well-known topics").

use grid_core::{JobId, NodeId, Topic};

/// The three fixed topics a scheduler listens on, plus the response
/// topic family. Per-job responses go to `TASK.sub(jobId, originNodeId)`;
/// per-session sibling topics use a monotonically increasing local
/// counter, tracked by the caller (see [`SiblingTopicCounter`]).
pub struct Topics;

impl Topics {
    pub fn job() -> Topic {
        Topic::new("JOB")
    }

    pub fn job_cancel() -> Topic {
        Topic::new("JOB_CANCEL")
    }

    pub fn job_siblings() -> Topic {
        Topic::new("JOB_SIBLINGS")
    }

    /// Session-attribute-request topic — the third of the scheduler's
    /// three fixed listeners (spec.md §4.E Lifecycle).
    pub fn job_session() -> Topic {
        Topic::new("JOB_SESSION")
    }

    pub fn task() -> Topic {
        Topic::new("TASK")
    }

    pub fn job_response(job_id: JobId, origin: NodeId) -> Topic {
        Self::task().sub(&[&job_id, &origin])
    }
}

/// A per-session monotonically increasing counter for sibling topics.
#[derive(Debug, Default)]
pub struct SiblingTopicCounter(std::sync::atomic::AtomicU64);

impl SiblingTopicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_topic(&self) -> Topic {
        let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Topics::job_siblings().sub(&[&n])
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the compute grid (spec.md §7).
//!
//! Crate-local error enums (`LobError`, `CheckpointError`, `SchedulerError`)
//! either convert into this one at a crate boundary or carry their own
//! narrower variant set; this is the shape every *caller-facing* error
//! collapses to once it crosses the Messenger seam.

use crate::ids::{JobId, SessionId};
use thiserror::Error;

/// The error kinds named in spec.md §7, as concrete variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Task not deployed, or redeployed since original execution.
    #[error("deployment not found for job {job_id}")]
    DeploymentMissing { job_id: JobId },

    /// Attributes, topology predicate, or siblings could not be decoded
    /// with the resolved class loader.
    #[error("deserialization failed for job {job_id}: {reason}")]
    DeserializationFailed { job_id: JobId, reason: String },

    /// Job was cancelled before activation, or the pool rejected submission.
    #[error("job {job_id} rejected: {reason}")]
    ExecutionRejected { job_id: JobId, reason: String },

    /// Pre-flight partition reservation failed.
    #[error("partitions lost for job {job_id}")]
    PartitionsLost { job_id: JobId },

    /// Origin of the task is gone; no response can be sent.
    #[error("master node left for job {job_id}")]
    MasterNodeLeft { job_id: JobId },

    /// Job's `endTime` passed.
    #[error("job {job_id} timed out")]
    Timeout { job_id: JobId },

    /// A response could not itself be sent because the origin left.
    #[error("failed to deliver reply for job {job_id}: {reason}")]
    JobReplyFailed { job_id: JobId, reason: String },

    /// Catch-all for a session-scoped failure not tied to one job.
    #[error("session {session_id} failed: {reason}")]
    SessionFailed { session_id: SessionId, reason: String },
}

impl GridError {
    /// The job this error is about, if any (session-scoped errors have none).
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            GridError::DeploymentMissing { job_id }
            | GridError::DeserializationFailed { job_id, .. }
            | GridError::ExecutionRejected { job_id, .. }
            | GridError::PartitionsLost { job_id }
            | GridError::MasterNodeLeft { job_id }
            | GridError::Timeout { job_id }
            | GridError::JobReplyFailed { job_id, .. } => Some(*job_id),
            GridError::SessionFailed { .. } => None,
        }
    }

    /// True for errors that suppress the response path entirely (spec.md
    /// §7 "response is suppressed" for `MasterNodeLeft`).
    pub fn suppresses_response(&self) -> bool {
        matches!(self, GridError::MasterNodeLeft { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_node_left_suppresses_response() {
        let err = GridError::MasterNodeLeft { job_id: JobId::nil() };
        assert!(err.suppresses_response());
        assert!(!GridError::Timeout { job_id: JobId::nil() }.suppresses_response());
    }

    #[test]
    fn job_id_extracted_for_job_scoped_variants() {
        let job_id = JobId::new();
        let err = GridError::PartitionsLost { job_id };
        assert_eq!(err.job_id(), Some(job_id));
    }

    #[test]
    fn session_failed_has_no_job_id() {
        let err = GridError::SessionFailed { session_id: SessionId::new(), reason: "x".into() };
        assert_eq!(err.job_id(), None);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged message DTOs for the three listeners a scheduler installs
//! (spec.md §4.E "Lifecycle").

use grid_core::{GridError, JobId, NodeId, SessionId};
use serde::{Deserialize, Serialize};

/// Inputs to execute-request processing (spec.md §4.E "Execute-request
/// processing"). Opaque payload fields (`session_attrs`, `job_attrs`,
/// `topology_predicate`, `siblings`) are left as JSON values: decoding
/// them with the resolved deployment's class loader is the scheduler's
/// job, not the wire layer's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub task_name: String,
    pub class_name: String,
    pub deployment_mode: String,
    pub class_loader_id: String,
    pub loader_participants: Vec<NodeId>,
    pub create_time_ms: i64,
    pub timeout_ms: Option<u64>,
    pub topology_version: u64,
    pub siblings: Option<serde_json::Value>,
    pub session_attrs: Option<serde_json::Value>,
    pub job_attrs: Option<serde_json::Value>,
    pub executor_name: Option<String>,
    pub cache_ids: Vec<i32>,
    pub partition_id: Option<u32>,
    pub internal: bool,
    pub session_full_support: bool,
    pub topology_predicate: Option<serde_json::Value>,
}

/// A cancel-request targets a job id, a session id (cancel every job in
/// the session), or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub job_id: Option<JobId>,
    pub session_id: Option<SessionId>,
    pub system: bool,
}

/// A session-attribute update, delivered on the ordered channel when the
/// session has full-session-support enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
    pub attrs: serde_json::Value,
}

/// The wire-friendly projection of [`GridError`] (spec.md §7): the full
/// error enum carries an owning job id inline, which the reply path
/// already knows from `ExecuteResponse::job_id`, so only the kind and an
/// optional reason travel over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WireError {
    DeploymentMissing,
    DeserializationFailed { reason: String },
    ExecutionRejected { reason: String },
    PartitionsLost,
    MasterNodeLeft,
    Timeout,
    JobReplyFailed { reason: String },
    SessionFailed { reason: String },
}

impl From<&GridError> for WireError {
    fn from(e: &GridError) -> Self {
        match e {
            GridError::DeploymentMissing { .. } => WireError::DeploymentMissing,
            GridError::DeserializationFailed { reason, .. } => WireError::DeserializationFailed {
                reason: reason.clone(),
            },
            GridError::ExecutionRejected { reason, .. } => WireError::ExecutionRejected {
                reason: reason.clone(),
            },
            GridError::PartitionsLost { .. } => WireError::PartitionsLost,
            GridError::MasterNodeLeft { .. } => WireError::MasterNodeLeft,
            GridError::Timeout { .. } => WireError::Timeout,
            GridError::JobReplyFailed { reason, .. } => WireError::JobReplyFailed {
                reason: reason.clone(),
            },
            GridError::SessionFailed { reason, .. } => WireError::SessionFailed {
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub result: Option<serde_json::Value>,
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingsRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiblingsResponse {
    pub session_id: SessionId,
    pub siblings: Vec<JobId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_error_drops_the_job_id_but_keeps_the_reason() {
        let job_id = JobId::new();
        let source = GridError::DeserializationFailed {
            job_id,
            reason: "bad varint".into(),
        };
        let wire: WireError = (&source).into();
        assert!(matches!(wire, WireError::DeserializationFailed { reason } if reason == "bad varint"));
    }

    #[test]
    fn execute_request_roundtrips_through_json() {
        let req = ExecuteRequest {
            session_id: SessionId::new(),
            job_id: JobId::new(),
            task_name: "sum-task".into(),
            class_name: "com.example.SumTask".into(),
            deployment_mode: "SHARED".into(),
            class_loader_id: "cl-1".into(),
            loader_participants: vec![],
            create_time_ms: 0,
            timeout_ms: Some(5_000),
            topology_version: 1,
            siblings: None,
            session_attrs: None,
            job_attrs: None,
            executor_name: None,
            cache_ids: vec![1, 2],
            partition_id: Some(3),
            internal: false,
            session_full_support: true,
            topology_predicate: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: ExecuteRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, req.job_id);
        assert_eq!(back.cache_ids, vec![1, 2]);
    }
}

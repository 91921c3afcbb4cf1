// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator interfaces consumed-only by the scheduler (spec.md §1
//! "deliberately out of scope", §6 "external interfaces").
//!
//! The real transport, class-loading, and membership subsystems live
//! outside this workspace; callers supply an implementation of each trait
//! here. `grid-core`'s `test-support` feature ships in-memory doubles for
//! all four (see [`crate::test_support`]).

use crate::ids::JobId;
use std::fmt;
use std::sync::Arc;

crate::define_id! {
    /// Unique identifier for a cluster node.
    pub struct NodeId;
}

/// A point-in-time view of a cluster member (spec.md §2 row E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: NodeId,
    pub alive: bool,
}

/// Node presence, liveness, and size — the membership facts the scheduler
/// needs to decide whether an origin task node is still around.
pub trait Cluster: Send + Sync {
    /// The node this process is running on.
    fn local_node(&self) -> NodeId;

    /// Whether `node` is currently a live cluster member.
    fn is_alive(&self, node: NodeId) -> bool;

    /// Current cluster size, used by the metrics-updated reset threshold
    /// (spec.md §4.E "Metrics-updated handling").
    fn size(&self) -> usize;
}

/// An executable artifact resolved by name/version/class-loader, with
/// reference counting (spec.md GLOSSARY "Deployment").
pub trait Deployment: Send + Sync {
    fn task_name(&self) -> &str;
    fn class_loader_id(&self) -> u64;

    /// Increment the reference count. Returns `false` if the deployment has
    /// since been undeployed and can no longer be acquired.
    fn acquire(&self) -> bool;

    /// Decrement the reference count. Idempotent beyond zero.
    fn release(&self);
}

/// Resolves deployments by name, optionally scoped to a class-loader id
/// (spec.md §4.E step 2).
pub trait DeploymentRegistry: Send + Sync {
    /// Look up a deployment already present on the local node.
    fn resolve_local(&self, task_name: &str) -> Option<Arc<dyn Deployment>>;

    /// Resolve a deployment globally, falling back to scanning participants
    /// by class-loader id when a direct name lookup misses.
    fn resolve_global(
        &self,
        task_name: &str,
        class_loader_id: u64,
    ) -> Option<Arc<dyn Deployment>>;
}

/// One `{cacheId, partitionId, topologyVersion}` entry from a job's
/// partition reservation (spec.md §3 "Job identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRef {
    pub cache_id: i32,
    pub partition_id: i32,
    pub topology_version: u64,
}

/// Pre-flight guard ensuring the cache partitions a job needs remain
/// locally owned for the job's duration (spec.md §4.F).
pub trait PartitionReservation: Send + Sync {
    /// Attempt to reserve every partition this job touches. On any `false`
    /// the caller must treat the job as unable to run; already-reserved
    /// partitions have been released internally before returning.
    fn reserve(&self) -> bool;

    /// Release all reservations held. Safe to call even if `reserve`
    /// returned `false` or was never called.
    fn release(&self);

    fn partitions(&self) -> &[PartitionRef];
}

/// A reservation over zero partitions always succeeds — used for jobs with
/// no cache affinity.
pub struct NoopPartitionReservation;

impl PartitionReservation for NoopPartitionReservation {
    fn reserve(&self) -> bool {
        true
    }

    fn release(&self) {}

    fn partitions(&self) -> &[PartitionRef] {
        &[]
    }
}

/// An opaque messenger topic. `sub()` derives a child topic the way
/// spec.md §6 derives `TASK.sub(jobId, originNodeId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn sub(&self, parts: &[&dyn fmt::Display]) -> Self {
        let mut s = self.0.clone();
        for part in parts {
            s.push('/');
            s.push_str(&part.to_string());
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for `sendOrdered` (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct OrderedSendOptions {
    pub timeout_ms: u64,
    pub skip_on_timeout: bool,
}

impl Default for OrderedSendOptions {
    fn default() -> Self {
        Self { timeout_ms: 0, skip_on_timeout: false }
    }
}

/// A registered message handler. Boxed so a listener can close over
/// scheduler state without the trait needing a generic parameter.
pub type MessageHandler = Arc<dyn Fn(NodeId, Vec<u8>) + Send + Sync>;

/// Opaque handle returned by `add_listener`, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Ordered and unordered point-to-point send, with topic-scoped listeners
/// (spec.md §6 "Messenger surface consumed"). We assume an ordered,
/// point-to-point transport exists underneath; framing and retries are out
/// of scope (spec.md §1).
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    /// Register a handler for inbound messages on `topic`. Returns a handle
    /// for later removal.
    fn add_listener(&self, topic: Topic, handler: MessageHandler) -> ListenerId;

    /// Unregister a previously-added listener.
    fn remove_listener(&self, topic: Topic, id: ListenerId);

    /// Fire-and-forget send with no ordering guarantee relative to other
    /// sends on the same topic.
    async fn send_unordered(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
    ) -> Result<(), crate::error::GridError>;

    /// Send guaranteeing per-(source, dest, topic) ordering.
    async fn send_ordered(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
        opts: OrderedSendOptions,
    ) -> Result<(), crate::error::GridError>;

    /// Same as `send_unordered`, for a well-known fixed topic.
    async fn send_to_grid_topic(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
    ) -> Result<(), crate::error::GridError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_sub_derives_a_child_topic() {
        let task = Topic::new("TASK");
        let job = JobId::new();
        let node = NodeId::new();
        let derived = task.sub(&[&job, &node]);
        assert_eq!(derived.as_str(), format!("TASK/{job}/{node}"));
    }

    #[test]
    fn noop_reservation_always_reserves() {
        let r = NoopPartitionReservation;
        assert!(r.reserve());
        assert!(r.partitions().is_empty());
        r.release();
    }

    #[test]
    fn ordered_send_options_default_is_no_timeout() {
        let opts = OrderedSendOptions::default();
        assert_eq!(opts.timeout_ms, 0);
        assert!(!opts.skip_on_timeout);
    }
}

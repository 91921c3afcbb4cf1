// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires an in-memory `Messenger`/`Cluster`/`Deployment` test harness to a
//! [`JobScheduler`] so the compute pipeline is runnable end to end in one
//! process, the way the teacher's `oj-daemon` stands up an in-process
//! runtime for its CLI to drive (spec.md §1 "we assume an ordered
//! point-to-point messenger" etc. — this harness plays that assumed role).

use std::sync::Arc;
use std::time::Duration;

use grid_compute::{CacheTopology, JobBody, JobScheduler, PartitionState, SchedulerOptions, TaskRegistry};
use grid_core::test_support::{TestCluster, TestDeployment, TestDeploymentRegistry, TestMessenger};
use grid_core::{AtomicConfig, NodeId};

/// A task registry over a fixed set of named demo tasks. Real deployments
/// resolve arbitrary user code (spec.md GLOSSARY "Deployment"); the demo
/// harness only needs a couple of illustrative bodies.
pub struct DemoTaskRegistry;

impl TaskRegistry for DemoTaskRegistry {
    fn resolve(&self, task_name: &str) -> Option<JobBody> {
        match task_name {
            "sleepy" => Some(Arc::new(|token: grid_compute::CancelToken| {
                for _ in 0..20 {
                    if token.is_cancelled() {
                        return Err(grid_core::GridError::ExecutionRejected {
                            job_id: grid_core::JobId::nil(),
                            reason: "cancelled".to_string(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Ok(serde_json::json!({"slept_ms": 500}))
            })),
            _ => Some(Arc::new(|_token| Ok(serde_json::json!({"ok": true})))),
        }
    }
}

/// A `CacheTopology` double where every partition is owning by default, so
/// demo jobs never fail their pre-flight reservation unless the caller
/// explicitly configures otherwise.
#[derive(Default)]
pub struct AllOwningTopology;

impl CacheTopology for AllOwningTopology {
    fn cache_started(&self, _cache_id: i32) -> bool {
        true
    }

    fn partition_state(&self, _cache_id: i32, _partition_id: i32) -> Option<PartitionState> {
        Some(PartitionState::Owning)
    }
}

/// Everything a demo scenario needs: a scheduler plus the cluster handle
/// used to address it.
pub struct Harness {
    pub scheduler: Arc<JobScheduler>,
    pub cluster: Arc<TestCluster>,
}

impl Harness {
    pub fn new(collision_policy: Option<Arc<dyn grid_collision::CollisionPolicy>>) -> Self {
        let local = NodeId::new();
        let cluster = Arc::new(TestCluster::new(local));
        let messenger = Arc::new(TestMessenger::new());
        let registry = Arc::new(TestDeploymentRegistry::new());
        registry.register(TestDeployment::new("sleepy", 1));
        registry.register(TestDeployment::new("echo", 1));
        let topology = Arc::new(AllOwningTopology);
        let config = Arc::new(AtomicConfig::default());

        let scheduler = JobScheduler::new(
            cluster.clone(),
            registry.clone(),
            messenger.clone(),
            Arc::new(DemoTaskRegistry),
            topology,
            config,
            collision_policy,
            SchedulerOptions::default(),
        );
        scheduler.start();

        Self { scheduler, cluster }
    }

    pub fn local_node(&self) -> NodeId {
        self.cluster.local_node()
    }
}

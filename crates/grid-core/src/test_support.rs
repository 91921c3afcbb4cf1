// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles and property-test strategies, exposed to other crates'
//! dev-dependencies behind the `test-support` feature — mirrors the
//! teacher's `oj-core` `test-support` feature gate.

use crate::collaborators::{
    Cluster, Deployment, DeploymentRegistry, ListenerId, MessageHandler, Messenger, NodeId,
    OrderedSendOptions, Topic,
};
use crate::error::GridError;
use crate::ids::{JobId, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// A `Cluster` double whose membership is mutated directly by tests.
pub struct TestCluster {
    local: NodeId,
    alive: Mutex<HashMap<NodeId, bool>>,
}

impl TestCluster {
    pub fn new(local: NodeId) -> Self {
        let mut alive = HashMap::new();
        alive.insert(local, true);
        Self { local, alive: Mutex::new(alive) }
    }

    pub fn add_node(&self, node: NodeId) {
        self.alive.lock().insert(node, true);
    }

    /// Mark a node as departed, as if a node-left event fired.
    pub fn mark_departed(&self, node: NodeId) {
        self.alive.lock().insert(node, false);
    }
}

impl Cluster for TestCluster {
    fn local_node(&self) -> NodeId {
        self.local
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.alive.lock().get(&node).copied().unwrap_or(false)
    }

    fn size(&self) -> usize {
        self.alive.lock().values().filter(|alive| **alive).count()
    }
}

/// A `Deployment` double with a controllable acquire/release refcount.
pub struct TestDeployment {
    task_name: String,
    class_loader_id: u64,
    refcount: AtomicI64,
    undeployed: std::sync::atomic::AtomicBool,
}

impl TestDeployment {
    pub fn new(task_name: impl Into<String>, class_loader_id: u64) -> Arc<Self> {
        Arc::new(Self {
            task_name: task_name.into(),
            class_loader_id,
            refcount: AtomicI64::new(0),
            undeployed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn refcount(&self) -> i64 {
        self.refcount.load(Ordering::SeqCst)
    }

    /// Simulate the deployment being removed from the cluster; subsequent
    /// `acquire()` calls will fail.
    pub fn undeploy(&self) {
        self.undeployed.store(true, Ordering::SeqCst);
    }
}

impl Deployment for TestDeployment {
    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn class_loader_id(&self) -> u64 {
        self.class_loader_id
    }

    fn acquire(&self) -> bool {
        if self.undeployed.load(Ordering::SeqCst) {
            return false;
        }
        self.refcount.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self) {
        self.refcount.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A `DeploymentRegistry` double backed by a plain map.
#[derive(Default)]
pub struct TestDeploymentRegistry {
    deployments: Mutex<HashMap<String, Arc<TestDeployment>>>,
}

impl TestDeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, deployment: Arc<TestDeployment>) {
        self.deployments.lock().insert(deployment.task_name.clone(), deployment);
    }
}

impl DeploymentRegistry for TestDeploymentRegistry {
    fn resolve_local(&self, task_name: &str) -> Option<Arc<dyn Deployment>> {
        self.deployments.lock().get(task_name).map(|d| d.clone() as Arc<dyn Deployment>)
    }

    fn resolve_global(
        &self,
        task_name: &str,
        _class_loader_id: u64,
    ) -> Option<Arc<dyn Deployment>> {
        self.resolve_local(task_name)
    }
}

struct Listener {
    id: ListenerId,
    handler: MessageHandler,
}

/// A `Messenger` double that dispatches inline (no real network) and
/// records every send for test assertions.
#[derive(Default)]
pub struct TestMessenger {
    listeners: Mutex<HashMap<Topic, Vec<Listener>>>,
    next_listener_id: AtomicU64,
    sent: Mutex<Vec<(NodeId, Topic, Vec<u8>)>>,
}

impl TestMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent so far, in send order.
    pub fn sent(&self) -> Vec<(NodeId, Topic, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Deliver a message to every listener on `topic` as if it arrived from
    /// `from`, synchronously.
    pub fn deliver(&self, from: NodeId, topic: &Topic, message: Vec<u8>) {
        let listeners = self.listeners.lock();
        if let Some(handlers) = listeners.get(topic) {
            for listener in handlers {
                (listener.handler)(from, message.clone());
            }
        }
    }

    fn record(&self, node: NodeId, topic: Topic, message: Vec<u8>) {
        self.sent.lock().push((node, topic, message));
    }
}

#[async_trait::async_trait]
impl Messenger for TestMessenger {
    fn add_listener(&self, topic: Topic, handler: MessageHandler) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().entry(topic).or_default().push(Listener { id, handler });
        id
    }

    fn remove_listener(&self, topic: Topic, id: ListenerId) {
        if let Some(handlers) = self.listeners.lock().get_mut(&topic) {
            handlers.retain(|l| l.id != id);
        }
    }

    async fn send_unordered(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
    ) -> Result<(), GridError> {
        self.record(node, topic, message);
        Ok(())
    }

    async fn send_ordered(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
        _opts: OrderedSendOptions,
    ) -> Result<(), GridError> {
        self.record(node, topic, message);
        Ok(())
    }

    async fn send_to_grid_topic(
        &self,
        node: NodeId,
        topic: Topic,
        message: Vec<u8>,
    ) -> Result<(), GridError> {
        self.record(node, topic, message);
        Ok(())
    }
}

#[cfg(feature = "proptest")]
pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    /// Arbitrary `JobId` — uniform over the 128-bit space via `u128`.
    pub fn any_job_id() -> impl Strategy<Value = JobId> {
        any::<u128>().prop_map(|bits| JobId::from_uuid(uuid::Uuid::from_u128(bits)))
    }

    /// Arbitrary `SessionId`.
    pub fn any_session_id() -> impl Strategy<Value = SessionId> {
        any::<u128>().prop_map(|bits| SessionId::from_uuid(uuid::Uuid::from_u128(bits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cluster_tracks_departure() {
        let local = NodeId::new();
        let other = NodeId::new();
        let cluster = TestCluster::new(local);
        cluster.add_node(other);
        assert!(cluster.is_alive(other));
        assert_eq!(cluster.size(), 2);
        cluster.mark_departed(other);
        assert!(!cluster.is_alive(other));
        assert_eq!(cluster.size(), 1);
    }

    #[test]
    fn test_deployment_refuses_acquire_once_undeployed() {
        let dep = TestDeployment::new("task", 1);
        assert!(dep.acquire());
        assert_eq!(dep.refcount(), 1);
        dep.undeploy();
        assert!(!dep.acquire());
    }

    #[tokio::test]
    async fn test_messenger_dispatches_to_listeners() {
        let messenger = TestMessenger::new();
        let topic = Topic::new("JOB");
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        messenger.add_listener(topic.clone(), Arc::new(move |_from, _msg| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));
        messenger.deliver(NodeId::new(), &topic, b"hi".to_vec());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        messenger
            .send_unordered(NodeId::new(), topic.clone(), b"out".to_vec())
            .await
            .unwrap();
        assert_eq!(messenger.sent().len(), 1);
    }
}

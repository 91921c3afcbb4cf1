// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Scheduler ("JobProcessor", spec.md §4.E) — the largest single
//! component: owns the passive/active/syncRunning/cancelled maps, drives
//! execute-request/cancel-request/session processing, reacts to
//! master-node departure and metrics-updated events, and runs collision
//! passes.

use dashmap::DashMap;
use grid_core::{
    Cluster, Deployment, DeploymentRegistry, DistributedConfig, GridError, JobId, Messenger,
    NodeId, OrderedSendOptions, PartitionReservation, PartitionRef, SessionId,
};
use grid_collision::{CollisionJobContext, CollisionPolicy};
use grid_wire::{
    CancelRequest, ExecuteRequest, ExecuteResponse, SessionRequest, SiblingsRequest,
    SiblingsResponse, Topics, WireError,
};
use parking_lot::RwLock;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bounded::{BoundedOrderedMap, BoundedOrderedSet};
use crate::error::ComputeError;
use crate::job::JobMeta;
use crate::maps::{JobLocation, SchedulerMaps};
use crate::metrics::{SchedulerMetrics, SchedulerView, ViewEntry, ViewState};
use crate::reservation::{CachePartitionReservation, CacheTopology};
use crate::stats::{JobTiming, NoopStatsSink, PerformanceStatsSink};
use crate::worker::{CancelToken, JobWorker, JobWorkerListener};

/// An executable job body bound to a task name by [`TaskRegistry`]. The
/// `Deployment`/`DeploymentRegistry` collaborators in `grid-core` model only
/// a refcounted handle (spec.md GLOSSARY "Deployment" is class-loading
/// metadata, deliberately out of scope per §1); something still has to hand
/// the worker a runnable closure, so this crate adds the missing seam
/// itself rather than inventing class-loading machinery.
pub type JobBody = Arc<dyn Fn(CancelToken) -> Result<serde_json::Value, GridError> + Send + Sync>;

/// Resolves a task name to its runnable body. Bridges `grid-core`'s
/// collaborator-only `Deployment` (a handle with no executable payload) to
/// something the scheduler can actually run.
pub trait TaskRegistry: Send + Sync {
    fn resolve(&self, task_name: &str) -> Option<JobBody>;
}

/// Construction-time knobs for a [`JobScheduler`] (spec.md §3 "bounded
/// insertion-ordered set `finished`", "bounded insertion-ordered map
/// `cancelReqs`").
pub struct SchedulerOptions {
    pool_name: String,
    finished_capacity: usize,
    cancel_reqs_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            pool_name: "compute".to_string(),
            finished_capacity: 10_240,
            cancel_reqs_capacity: 10_240,
        }
    }
}

impl SchedulerOptions {
    grid_core::setters! {
        into {
            pool_name: String,
        }
        set {
            finished_capacity: usize,
            cancel_reqs_capacity: usize,
        }
    }
}

/// A `cancelReqs` key — either a specific job or every job in a session
/// (spec.md §4.E "Cancel-request processing").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CancelKey {
    Job(JobId),
    Session(SessionId),
}

thread_local! {
    /// Thread-local recursion guard for collision passes (spec.md §4.D
    /// "Recursion into onCollision from within the callback is suppressed").
    static IN_COLLISION_PASS: Cell<bool> = Cell::new(false);
}

/// Owns every piece of mutable scheduler state (spec.md §9 "pass it
/// explicitly" rather than a singleton).
pub struct JobScheduler {
    stopping: RwLock<bool>,
    maps: SchedulerMaps,
    bodies: DashMap<JobId, JobBody>,
    sync_workers: DashMap<JobId, Arc<JobWorker>>,
    siblings: DashMap<SessionId, Vec<JobId>>,
    session_attrs: DashMap<SessionId, serde_json::Value>,
    finished: BoundedOrderedSet<JobId>,
    cancel_reqs: BoundedOrderedMap<CancelKey, bool>,
    collision_policy: Option<Arc<dyn CollisionPolicy>>,
    cluster: Arc<dyn Cluster>,
    deployment_registry: Arc<dyn DeploymentRegistry>,
    messenger: Arc<dyn Messenger>,
    task_registry: Arc<dyn TaskRegistry>,
    topology: Arc<dyn CacheTopology>,
    config: Arc<dyn DistributedConfig>,
    stats_sink: Arc<dyn PerformanceStatsSink>,
    metrics_updated_counter: AtomicUsize,
    collision_pass_count: AtomicU64,
    total_executed: AtomicU64,
    total_cancelled: AtomicU64,
    total_rejected: AtomicU64,
    #[allow(dead_code)]
    pool_name: String,
}

impl JobScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster: Arc<dyn Cluster>,
        deployment_registry: Arc<dyn DeploymentRegistry>,
        messenger: Arc<dyn Messenger>,
        task_registry: Arc<dyn TaskRegistry>,
        topology: Arc<dyn CacheTopology>,
        config: Arc<dyn DistributedConfig>,
        collision_policy: Option<Arc<dyn CollisionPolicy>>,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            stopping: RwLock::new(false),
            maps: SchedulerMaps::new(),
            bodies: DashMap::new(),
            sync_workers: DashMap::new(),
            siblings: DashMap::new(),
            session_attrs: DashMap::new(),
            finished: BoundedOrderedSet::new(options.finished_capacity),
            cancel_reqs: BoundedOrderedMap::new(options.cancel_reqs_capacity),
            collision_policy,
            cluster,
            deployment_registry,
            messenger,
            task_registry,
            topology,
            config,
            stats_sink: Arc::new(NoopStatsSink),
            metrics_updated_counter: AtomicUsize::new(0),
            collision_pass_count: AtomicU64::new(0),
            total_executed: AtomicU64::new(0),
            total_cancelled: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            pool_name: options.pool_name,
        })
    }

    /// Swap in a non-default performance-statistics sink. Only meaningful
    /// before `start()`; exists so the demo CLI and tests can inspect
    /// recorded timings.
    pub fn with_stats_sink(self: Arc<Self>, sink: Arc<dyn PerformanceStatsSink>) -> Arc<Self> {
        match Arc::try_unwrap(self) {
            Ok(mut scheduler) => {
                scheduler.stats_sink = sink;
                Arc::new(scheduler)
            }
            Err(shared) => shared,
        }
    }

    /// Installs the scheduler's message listeners on their fixed topics —
    /// execute-request, cancel-request, and session-attribute-request are
    /// the three spec.md §4.E "Lifecycle" names; siblings-request is an
    /// additional introspection listener this crate carries alongside
    /// them — and, if a collision policy is configured, wires it as the
    /// policy's external listener.
    pub fn start(self: &Arc<Self>) {
        let execute_scheduler = Arc::clone(self);
        self.messenger.add_listener(
            Topics::job(),
            Arc::new(move |origin, payload| {
                let Ok(req) = serde_json::from_slice::<ExecuteRequest>(&payload) else {
                    tracing::warn!("failed to decode execute-request");
                    return;
                };
                let scheduler = Arc::clone(&execute_scheduler);
                tokio::spawn(async move {
                    scheduler.handle_execute_request(origin, req).await;
                });
            }),
        );

        let cancel_scheduler = Arc::clone(self);
        self.messenger.add_listener(
            Topics::job_cancel(),
            Arc::new(move |_origin, payload| {
                let Ok(req) = serde_json::from_slice::<CancelRequest>(&payload) else {
                    tracing::warn!("failed to decode cancel-request");
                    return;
                };
                cancel_scheduler.handle_cancel_request(req);
            }),
        );

        let siblings_scheduler = Arc::clone(self);
        self.messenger.add_listener(
            Topics::job_siblings(),
            Arc::new(move |origin, payload| {
                let Ok(req) = serde_json::from_slice::<SiblingsRequest>(&payload) else {
                    tracing::warn!("failed to decode siblings-request");
                    return;
                };
                let response = siblings_scheduler.handle_siblings_request(req);
                let scheduler = Arc::clone(&siblings_scheduler);
                tokio::spawn(async move {
                    if let Ok(payload) = serde_json::to_vec(&response) {
                        let topic = Topics::job_siblings();
                        let _ = scheduler
                            .messenger
                            .send_unordered(origin, topic, payload)
                            .await;
                    }
                });
            }),
        );

        let session_scheduler = Arc::clone(self);
        self.messenger.add_listener(
            Topics::job_session(),
            Arc::new(move |_origin, payload| {
                let Ok(req) = serde_json::from_slice::<SessionRequest>(&payload) else {
                    tracing::warn!("failed to decode session-attribute-request");
                    return;
                };
                session_scheduler.handle_session_request(req);
            }),
        );

        if let Some(policy) = &self.collision_policy {
            let scheduler = Arc::clone(self);
            policy.set_external_listener(Arc::new(move || {
                scheduler.run_collision_pass();
            }));
        }

        self.spawn_timeout_reaper();
        tracing::info!("job scheduler started");
    }

    /// The timeout service spec.md §5 names: every worker with a finite
    /// `endTime` is polled until it expires, at which point it is marked
    /// `timedOut` and cancelled (spec.md §5 "Cancellation & timeouts").
    fn spawn_timeout_reaper(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(200));
            loop {
                interval.tick().await;
                if scheduler.try_enter().is_none() {
                    return;
                }

                let now = std::time::Instant::now();
                let expired_passive: Vec<JobId> = scheduler
                    .maps
                    .passive
                    .iter()
                    .filter(|e| e.value().meta.is_timed_out(now))
                    .map(|e| *e.key())
                    .collect();
                for job_id in expired_passive {
                    if let Some((_, worker)) = scheduler.maps.passive.remove(&job_id) {
                        scheduler.bodies.remove(&job_id);
                        worker.release_resources();
                        scheduler.finished.insert(job_id);
                        scheduler.total_rejected.fetch_add(1, Ordering::SeqCst);
                        scheduler.reply_for(
                            &worker.meta,
                            Err(GridError::Timeout { job_id }),
                        );
                    }
                }

                let expired_active: Vec<Arc<JobWorker>> = scheduler
                    .maps
                    .active
                    .iter()
                    .filter(|e| e.value().meta.is_timed_out(now))
                    .map(|e| e.value().clone())
                    .collect();
                for worker in expired_active {
                    worker.mark_timed_out();
                    worker.cancel(true);
                }
            }
        });
    }

    /// The process-wide gate (spec.md §5). Returns `None` once `stop` has
    /// flipped the flag; every public entry-point short-circuits on `None`.
    fn try_enter(&self) -> Option<parking_lot::RwLockReadGuard<'_, bool>> {
        let guard = self.stopping.try_read()?;
        if *guard {
            None
        } else {
            Some(guard)
        }
    }

    /// `stop(cancel)` (spec.md §4.E). With `cancel=true`, every passive job
    /// is rejected and every active job is hard-cancelled; otherwise the
    /// scheduler just stops admitting new work and lets existing jobs run
    /// to completion (see [`Self::stop_and_wait`]). Returns
    /// [`ComputeError::Stopping`] if `stop` had already been called.
    pub fn stop(&self, cancel: bool) -> Result<(), ComputeError> {
        let mut stopping = self.stopping.write();
        if *stopping {
            return Err(ComputeError::Stopping);
        }
        *stopping = true;

        if cancel {
            let passive: Vec<Arc<JobWorker>> =
                self.maps.passive.iter().map(|e| e.value().clone()).collect();
            self.maps.passive.clear();
            self.bodies.clear();
            for worker in passive {
                self.reject(&worker, "scheduler stopping".to_string());
            }

            for entry in self.maps.active.iter() {
                entry.value().cancel(true);
            }
        }
        tracing::info!(cancel, "job scheduler stopping");
        Ok(())
    }

    /// Convenience layered on top of the natural-completion path (ported
    /// from the teacher's runtime shutdown helpers, SPEC_FULL.md §5):
    /// stops admission, then polls until every active/syncRunning job has
    /// actually finished. Tolerates `stop` having already been called —
    /// draining is still meaningful even if this caller didn't initiate it.
    pub async fn stop_and_wait(&self) {
        if let Err(e) = self.stop(false) {
            tracing::debug!(error = %e, "stop_and_wait: scheduler was already stopping");
        }
        loop {
            let (_, active, sync_running, _, _) = self.maps.counts();
            if active == 0 && sync_running == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        let (passive, active, sync_running, cancelled, held) = self.maps.counts();
        SchedulerMetrics {
            passive,
            active,
            held,
            sync_running,
            cancelled,
            finished: self.finished.len(),
            total_executed: self.total_executed.load(Ordering::SeqCst),
            total_cancelled: self.total_cancelled.load(Ordering::SeqCst),
            total_rejected: self.total_rejected.load(Ordering::SeqCst),
        }
    }

    /// The flattened read-only view spec.md §6 names (SPEC_FULL.md §5
    /// "System view / introspection").
    pub fn view(&self) -> SchedulerView {
        let mut entries = Vec::new();
        for e in self.maps.passive.iter() {
            entries.push(ViewEntry {
                job_id: *e.key(),
                state: ViewState::Passive,
            });
        }
        for e in self.maps.active.iter() {
            let state = if self.maps.held.contains(e.key()) {
                ViewState::Held
            } else {
                ViewState::Active
            };
            entries.push(ViewEntry {
                job_id: *e.key(),
                state,
            });
        }
        for id in self.maps.sync_running.iter() {
            entries.push(ViewEntry {
                job_id: *id,
                state: ViewState::SyncRunning,
            });
        }
        for e in self.maps.cancelled.iter() {
            entries.push(ViewEntry {
                job_id: *e.key(),
                state: ViewState::Cancelled,
            });
        }
        for job_id in self.finished.snapshot() {
            if self.maps.locate(job_id).is_none() {
                entries.push(ViewEntry {
                    job_id,
                    state: ViewState::Finished,
                });
            }
        }
        SchedulerView::new(entries)
    }

    /// Execute-request processing, the hot path (spec.md §4.E).
    pub async fn handle_execute_request(self: &Arc<Self>, origin: NodeId, req: ExecuteRequest) {
        let Some(_guard) = self.try_enter() else {
            tracing::debug!(job_id = %req.job_id, "scheduler stopping; ignoring execute-request");
            return;
        };

        let class_loader_id: u64 = match req.class_loader_id.parse() {
            Ok(id) => id,
            Err(_) => {
                self.reply_bare(
                    &req,
                    origin,
                    Err(GridError::DeserializationFailed {
                        job_id: req.job_id,
                        reason: format!("invalid class_loader_id {:?}", req.class_loader_id),
                    }),
                );
                return;
            }
        };

        let deployment = self
            .deployment_registry
            .resolve_local(&req.task_name)
            .or_else(|| self.deployment_registry.resolve_global(&req.task_name, class_loader_id));
        let Some(deployment) = deployment else {
            self.reply_bare(
                &req,
                origin,
                Err(GridError::DeploymentMissing { job_id: req.job_id }),
            );
            return;
        };

        if !deployment.acquire() {
            self.reply_bare(
                &req,
                origin,
                Err(GridError::DeploymentMissing { job_id: req.job_id }),
            );
            return;
        }

        let Some(body) = self.task_registry.resolve(&req.task_name) else {
            deployment.release();
            self.reply_bare(
                &req,
                origin,
                Err(GridError::DeploymentMissing { job_id: req.job_id }),
            );
            return;
        };

        if self.collision_policy.is_some() && self.maps.passive.contains_key(&req.job_id) {
            tracing::warn!(job_id = %req.job_id, "duplicate execute-request for already-passive job; dropping");
            deployment.release();
            return;
        }

        if let Some(attrs) = &req.job_attrs {
            if !attrs.is_object() {
                deployment.release();
                self.reply_bare(
                    &req,
                    origin,
                    Err(GridError::DeserializationFailed {
                        job_id: req.job_id,
                        reason: "job_attrs must be a JSON object".to_string(),
                    }),
                );
                return;
            }
        }

        let partitions: Vec<PartitionRef> = match req.partition_id {
            Some(pid) => req
                .cache_ids
                .iter()
                .map(|&cache_id| PartitionRef {
                    cache_id,
                    partition_id: pid as i32,
                    topology_version: req.topology_version,
                })
                .collect(),
            None => Vec::new(),
        };

        let mut meta = JobMeta::new(req.session_id, req.job_id, origin)
            .internal(req.internal)
            .with_partitions(partitions.clone());
        if let Some(timeout_ms) = req.timeout_ms {
            meta = meta.with_timeout(std::time::Duration::from_millis(timeout_ms));
        }
        meta.executor_name = req.executor_name.clone();
        meta.session_full_support = req.session_full_support;

        self.siblings.entry(req.session_id).or_default().push(req.job_id);

        let reservation: Arc<dyn PartitionReservation> = if partitions.is_empty() {
            Arc::new(grid_core::NoopPartitionReservation)
        } else {
            Arc::new(CachePartitionReservation::new(
                partitions,
                Arc::clone(&self.topology),
            ))
        };

        let interrupt_timeout = {
            let config = Arc::clone(&self.config);
            Arc::new(move || config.compute_job_worker_interrupt_timeout_ms())
                as Arc<dyn Fn() -> u64 + Send + Sync>
        };

        let job_id = meta.job_id;
        let internal = meta.internal;
        let worker = Arc::new(JobWorker::new(
            meta,
            deployment,
            reservation,
            vec![Arc::clone(self) as Arc<dyn JobWorkerListener>],
            interrupt_timeout,
        ));
        worker.mark_queued();

        if internal {
            self.maps.sync_running.insert(job_id);
            self.sync_workers.insert(job_id, Arc::clone(&worker));
            let _ = worker.run(move |token| body(token)).await;
            self.maps.sync_running.remove(&job_id);
            self.sync_workers.remove(&job_id);
        } else if self.collision_policy.is_some() {
            self.bodies.insert(job_id, body);
            self.maps.passive.insert(job_id, Arc::clone(&worker));
            self.run_collision_pass();
        } else {
            let eligible = self.on_before_activate(&worker);
            if eligible {
                if origin == self.cluster.local_node() {
                    self.spawn_run(worker, body);
                } else {
                    let _ = worker.run(move |token| body(token)).await;
                }
            }
        }
    }

    pub fn handle_siblings_request(&self, req: SiblingsRequest) -> SiblingsResponse {
        let siblings = self
            .siblings
            .get(&req.session_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        SiblingsResponse {
            session_id: req.session_id,
            siblings,
        }
    }

    /// Session-attribute-request processing (spec.md §4.E Lifecycle's
    /// third listener): merges the incoming attributes into the session's
    /// shared attribute map. One-way, like cancel-request — no response is
    /// sent back.
    pub fn handle_session_request(&self, req: SessionRequest) {
        let Some(_guard) = self.try_enter() else {
            return;
        };
        match self.session_attrs.get_mut(&req.session_id) {
            Some(mut existing) => merge_session_attrs(&mut existing, req.attrs),
            None => {
                self.session_attrs.insert(req.session_id, req.attrs);
            }
        }
    }

    /// The session's merged attribute map, if any session-attribute-request
    /// has been received for it.
    pub fn session_attrs(&self, session_id: SessionId) -> Option<serde_json::Value> {
        self.session_attrs.get(&session_id).map(|e| e.value().clone())
    }

    /// Cancel-request processing (spec.md §4.E).
    pub fn handle_cancel_request(&self, req: CancelRequest) {
        let Some(_guard) = self.try_enter() else {
            return;
        };

        if let Some(job_id) = req.job_id {
            self.cancel_reqs.insert(CancelKey::Job(job_id), req.system);
            self.cancel_one(job_id, req.system);
        } else if let Some(session_id) = req.session_id {
            self.cancel_reqs.insert(CancelKey::Session(session_id), req.system);
            self.cancel_session(session_id, req.system);
        }
    }

    /// Cancels the first match for `job_id`, checking passive, then active,
    /// then syncRunning, in that order (spec.md §4.E).
    fn cancel_one(&self, job_id: JobId, system: bool) {
        if let Some((_, worker)) = self.maps.passive.remove(&job_id) {
            self.bodies.remove(&job_id);
            self.reject(&worker, "cancelled before activation".to_string());
            return;
        }

        if let Some(worker) = self.maps.active.get(&job_id).map(|e| e.value().clone()) {
            if self.finished.contains(&job_id) {
                // Already finished; drop the cancel entry to avoid a leak
                // rather than resurrecting a `cancelled` record.
                self.maps.remove_active(job_id);
                return;
            }
            self.maps.remove_active(job_id);
            self.maps.cancelled.insert(job_id, Arc::clone(&worker));
            worker.cancel(system);
            return;
        }

        if let Some(worker) = self.sync_workers.get(&job_id).map(|e| e.value().clone()) {
            worker.cancel(system);
        }
    }

    fn cancel_session(&self, session_id: SessionId, system: bool) {
        let mut matches: Vec<JobId> = self
            .maps
            .passive
            .iter()
            .filter(|e| e.value().meta.session_id == session_id)
            .map(|e| *e.key())
            .collect();
        matches.extend(
            self.maps
                .active
                .iter()
                .filter(|e| e.value().meta.session_id == session_id)
                .map(|e| *e.key()),
        );
        matches.extend(
            self.sync_workers
                .iter()
                .filter(|e| e.value().meta.session_id == session_id)
                .map(|e| *e.key()),
        );
        for job_id in matches {
            self.cancel_one(job_id, system);
        }
    }

    /// Master-leave handling (spec.md §4.E).
    pub fn handle_node_left(self: &Arc<Self>, node: NodeId) {
        let entered = self.try_enter();
        if entered.is_none() {
            return;
        }

        let passive_ids: Vec<JobId> = self
            .maps
            .passive
            .iter()
            .filter(|e| e.value().meta.origin == node)
            .map(|e| *e.key())
            .collect();
        for job_id in passive_ids {
            if let Some((_, worker)) = self.maps.passive.remove(&job_id) {
                worker.release_resources();
            }
            self.bodies.remove(&job_id);
        }

        let active_workers: Vec<Arc<JobWorker>> = self
            .maps
            .active
            .iter()
            .filter(|e| e.value().meta.origin == node)
            .map(|e| e.value().clone())
            .collect();
        for worker in active_workers {
            let job_id = worker.job_id();
            self.maps.remove_active(job_id);
            self.maps.cancelled.insert(job_id, Arc::clone(&worker));
            if !worker.master_node_left() {
                worker.cancel(true);
            }
        }

        drop(entered);
        self.run_collision_pass();
    }

    /// Metrics-updated handling (spec.md §4.E).
    pub fn handle_metrics_updated(self: &Arc<Self>) {
        let Some(guard) = self.try_enter() else {
            return;
        };
        let count = self.metrics_updated_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let cluster_size = self.cluster.size().max(1);
        if count >= cluster_size {
            self.metrics_updated_counter.store(0, Ordering::SeqCst);
            drop(guard);
            self.run_collision_pass();
        }
    }

    /// `onBeforeActivate(worker)` (spec.md §4.E): inserts into `active`,
    /// honors any already-recorded cancel-request, and checks the origin
    /// node is still alive. Returns `true` iff the worker is still
    /// eligible to run.
    fn on_before_activate(&self, worker: &Arc<JobWorker>) -> bool {
        let job_id = worker.job_id();
        self.maps.active.insert(job_id, Arc::clone(worker));

        if self.take_cancel_req(&worker.meta).is_some() {
            self.maps.remove_active(job_id);
            self.reject(worker, "cancelled before activation".to_string());
            return false;
        }

        if !self.cluster.is_alive(worker.meta.origin) {
            self.maps.remove_active(job_id);
            self.maps.cancelled.insert(job_id, Arc::clone(worker));
            self.total_cancelled.fetch_add(1, Ordering::SeqCst);
            worker.cancel(true);
            return false;
        }

        true
    }

    fn take_cancel_req(&self, meta: &JobMeta) -> Option<bool> {
        if let Some(v) = self.cancel_reqs.remove(&CancelKey::Job(meta.job_id)) {
            return Some(v);
        }
        self.cancel_reqs.get(&CancelKey::Session(meta.session_id))
    }

    fn activate_from_passive(self: &Arc<Self>, job_id: JobId) -> bool {
        let Some((_, worker)) = self.maps.passive.remove(&job_id) else {
            return false;
        };
        let Some((_, body)) = self.bodies.remove(&job_id) else {
            return false;
        };
        if !self.on_before_activate(&worker) {
            return false;
        }
        self.spawn_run(worker, body);
        true
    }

    fn spawn_run(self: &Arc<Self>, worker: Arc<JobWorker>, body: JobBody) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _ = worker.run(move |token| body(token)).await;
            scheduler.run_collision_pass();
        });
    }

    /// Invokes the collision policy over point-in-time passive/active/held
    /// views, guarded against recursion and panics (spec.md §4.D, §7
    /// "Errors inside collision callbacks are caught and logged").
    pub fn run_collision_pass(self: &Arc<Self>) {
        let Some(policy) = self.collision_policy.clone() else {
            return;
        };
        let Some(_guard) = self.try_enter() else {
            return;
        };
        if IN_COLLISION_PASS.with(|f| f.get()) {
            return;
        }
        IN_COLLISION_PASS.with(|f| f.set(true));

        let (passive, active, held) = self.collect_views();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            policy.on_collision(&passive, &active, &held);
        }));

        IN_COLLISION_PASS.with(|f| f.set(false));
        if outcome.is_err() {
            tracing::error!("collision policy panicked during on_collision; suppressing");
        }
        self.collision_pass_count.fetch_add(1, Ordering::SeqCst);
    }

    fn collect_views(
        self: &Arc<Self>,
    ) -> (
        Vec<Box<dyn CollisionJobContext>>,
        Vec<Box<dyn CollisionJobContext>>,
        Vec<Box<dyn CollisionJobContext>>,
    ) {
        let passive = self
            .maps
            .passive
            .iter()
            .map(|e| self.ctx_for(e.value().clone()))
            .collect();

        let active_workers: Vec<Arc<JobWorker>> =
            self.maps.active.iter().map(|e| e.value().clone()).collect();
        let held = active_workers
            .iter()
            .filter(|w| self.maps.held.contains(&w.job_id()))
            .map(|w| self.ctx_for(w.clone()))
            .collect();
        let active = active_workers.into_iter().map(|w| self.ctx_for(w)).collect();

        (passive, active, held)
    }

    fn ctx_for(self: &Arc<Self>, worker: Arc<JobWorker>) -> Box<dyn CollisionJobContext> {
        Box::new(CollisionCtx {
            scheduler: Arc::clone(self),
            worker,
        })
    }

    fn collision_cancel(&self, worker: &Arc<JobWorker>) {
        let job_id = worker.job_id();
        match self.maps.locate(job_id) {
            Some(JobLocation::Passive) => {
                if self.maps.passive.remove(&job_id).is_some() {
                    self.bodies.remove(&job_id);
                    self.cancel_reqs.insert(CancelKey::Job(job_id), false);
                    self.reject(worker, "rejected by collision policy".to_string());
                }
            }
            Some(JobLocation::Active) => {
                worker.cancel(true);
            }
            _ => {}
        }
    }

    /// Rejects a worker that is being discarded without `run()` ever
    /// executing (passive drain, cancel-before-activate, collision
    /// rejection, shutdown). Releases its deployment/reservation directly
    /// since `finish()` will never run to do it (spec.md §4.E step 3).
    fn reject(&self, worker: &Arc<JobWorker>, reason: String) {
        let meta = &worker.meta;
        let err = GridError::ExecutionRejected {
            job_id: meta.job_id,
            reason,
        };
        worker.release_resources();
        self.finished.insert(meta.job_id);
        self.total_rejected.fetch_add(1, Ordering::SeqCst);
        self.reply_for(meta, Err(err));
    }

    fn reply_bare(&self, req: &ExecuteRequest, origin: NodeId, result: Result<serde_json::Value, GridError>) {
        let mut meta = JobMeta::new(req.session_id, req.job_id, origin).internal(req.internal);
        meta.session_full_support = req.session_full_support;
        self.reply_for(&meta, result);
    }

    /// Sends the job's result/error back to its origin, ordered when the
    /// session has full-session-support (spec.md §4.C "Output path").
    /// `MasterNodeLeft` suppresses the send entirely (spec.md §7).
    fn reply_for(&self, meta: &JobMeta, result: Result<serde_json::Value, GridError>) {
        if let Err(e) = &result {
            if e.suppresses_response() {
                tracing::warn!(job_id = %meta.job_id, error = %e, "response suppressed");
                return;
            }
        }

        let messenger = Arc::clone(&self.messenger);
        let session_id = meta.session_id;
        let job_id = meta.job_id;
        let origin = meta.origin;
        let ordered = meta.session_full_support;

        tokio::spawn(async move {
            let response = ExecuteResponse {
                session_id,
                job_id,
                result: result.as_ref().ok().cloned(),
                error: result.as_ref().err().map(WireError::from),
            };
            let payload = match serde_json::to_vec(&response) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "failed to serialize execute response");
                    return;
                }
            };
            let topic = Topics::job_response(job_id, origin);
            let send_result = if ordered {
                messenger
                    .send_ordered(origin, topic, payload, OrderedSendOptions::default())
                    .await
            } else {
                messenger.send_unordered(origin, topic, payload).await
            };
            if let Err(e) = send_result {
                tracing::warn!(job_id = %job_id, error = %e, "failed to deliver execute response (JobReplyFailed)");
            }
        });
    }
}

impl JobWorkerListener for JobScheduler {
    fn on_held(&self, job: &JobMeta) {
        self.maps.mark_held(job.job_id);
    }

    fn on_unheld(&self, job: &JobMeta) {
        self.maps.mark_unheld(job.job_id);
    }

    fn on_finished(&self, job: &JobMeta, result: &Result<serde_json::Value, GridError>) {
        let job_id = job.job_id;
        self.maps.remove_active(job_id);
        self.maps.cancelled.remove(&job_id);
        self.finished.insert(job_id);

        match result {
            Ok(_) => {
                self.total_executed.fetch_add(1, Ordering::SeqCst);
            }
            Err(GridError::ExecutionRejected { .. }) => {
                self.total_rejected.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                self.total_cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }

        self.stats_sink.record(JobTiming {
            job_id,
            queued_for: std::time::Duration::ZERO,
            executed_for: job.created_at.elapsed(),
        });

        self.reply_for(job, result.clone());
    }
}

/// The view a collision policy gets over one job, backed live by the
/// scheduler's maps (spec.md §4.D).
struct CollisionCtx {
    scheduler: Arc<JobScheduler>,
    worker: Arc<JobWorker>,
}

impl CollisionJobContext for CollisionCtx {
    fn job_id(&self) -> JobId {
        self.worker.job_id()
    }

    fn activate(&self) -> bool {
        self.scheduler.activate_from_passive(self.worker.job_id())
    }

    fn cancel(&self) {
        self.scheduler.collision_cancel(&self.worker);
    }
}

/// Folds a session-attribute-request's payload into the session's stored
/// attributes: object-on-object merges key by key (later values win),
/// anything else replaces the slot outright.
fn merge_session_attrs(slot: &mut serde_json::Value, incoming: serde_json::Value) {
    match slot {
        serde_json::Value::Object(existing) if incoming.is_object() => {
            if let serde_json::Value::Object(incoming) = incoming {
                existing.extend(incoming);
            }
        }
        _ => *slot = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::test_support::TestCacheTopology;
    use grid_collision::{ActiveWindowPolicy, AlwaysActivate};
    use grid_core::test_support::{TestCluster, TestDeployment, TestDeploymentRegistry, TestMessenger};
    use std::time::Duration;

    struct EchoRegistry;

    impl TaskRegistry for EchoRegistry {
        fn resolve(&self, _task_name: &str) -> Option<JobBody> {
            Some(Arc::new(|_token: CancelToken| Ok(serde_json::json!({"ok": true}))))
        }
    }

    fn harness(
        policy: Option<Arc<dyn CollisionPolicy>>,
    ) -> (Arc<JobScheduler>, Arc<TestCluster>, Arc<TestMessenger>, Arc<TestDeploymentRegistry>) {
        let local = grid_core::NodeId::new();
        let cluster = Arc::new(TestCluster::new(local));
        let messenger = Arc::new(TestMessenger::new());
        let registry = Arc::new(TestDeploymentRegistry::new());
        registry.register(TestDeployment::new("echo", 1));
        let topology = Arc::new(TestCacheTopology::new());
        let config = Arc::new(grid_core::AtomicConfig::default());

        let scheduler = JobScheduler::new(
            cluster.clone(),
            registry.clone(),
            messenger.clone(),
            Arc::new(EchoRegistry),
            topology,
            config,
            policy,
            SchedulerOptions::default(),
        );
        (scheduler, cluster, messenger, registry)
    }

    fn request(_local: NodeId) -> ExecuteRequest {
        ExecuteRequest {
            session_id: SessionId::new(),
            job_id: JobId::new(),
            task_name: "echo".to_string(),
            class_name: "Echo".to_string(),
            deployment_mode: "SHARED".to_string(),
            class_loader_id: "1".to_string(),
            loader_participants: vec![],
            create_time_ms: 0,
            timeout_ms: None,
            topology_version: 1,
            siblings: None,
            session_attrs: None,
            job_attrs: None,
            executor_name: None,
            cache_ids: vec![],
            partition_id: None,
            internal: false,
            session_full_support: false,
            topology_predicate: None,
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn collision_disabled_job_completes_and_replies() {
        let (scheduler, cluster, messenger, _registry) = harness(None);
        let local = cluster.local_node();
        let req = request(local);
        let job_id = req.job_id;

        scheduler.handle_execute_request(local, req).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let metrics = scheduler.metrics();
        assert_eq!(metrics.total_executed, 1);
        assert!(messenger.sent().iter().any(|(_, _, _)| true));
        let _ = job_id;
    }

    struct ReleasableRegistry {
        released: Arc<std::sync::atomic::AtomicBool>,
    }

    impl TaskRegistry for ReleasableRegistry {
        fn resolve(&self, _task_name: &str) -> Option<JobBody> {
            let released = self.released.clone();
            Some(Arc::new(move |token: CancelToken| {
                while !token.is_cancelled() && !released.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(serde_json::Value::Null)
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn admission_under_collision_window_of_two() {
        let policy: Arc<dyn CollisionPolicy> = Arc::new(ActiveWindowPolicy::new(2));
        let local = grid_core::NodeId::new();
        let cluster = Arc::new(TestCluster::new(local));
        let messenger = Arc::new(TestMessenger::new());
        let registry = Arc::new(TestDeploymentRegistry::new());
        registry.register(TestDeployment::new("echo", 1));
        let topology = Arc::new(TestCacheTopology::new());
        let config = Arc::new(grid_core::AtomicConfig::default());
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let scheduler = JobScheduler::new(
            cluster,
            registry,
            messenger,
            Arc::new(ReleasableRegistry {
                released: released.clone(),
            }),
            topology,
            config,
            Some(policy),
            SchedulerOptions::default(),
        );

        for _ in 0..4 {
            let req = request(local);
            scheduler.handle_execute_request(local, req).await;
        }
        wait_until(|| scheduler.metrics().total_rejected >= 2).await;

        let metrics = scheduler.metrics();
        assert_eq!(metrics.total_rejected, 2);
        assert_eq!(metrics.active_excluding_held(), 2);

        released.store(true, Ordering::SeqCst);
        wait_until(|| scheduler.metrics().total_executed == 2).await;
        assert_eq!(scheduler.metrics().total_executed, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_before_activate_rejects_without_running() {
        let policy: Arc<dyn CollisionPolicy> = Arc::new(AlwaysActivate);
        let (scheduler, cluster, _messenger, _registry) = harness(Some(policy));
        let local = cluster.local_node();
        let mut req = request(local);
        req.job_id = JobId::new();
        let job_id = req.job_id;
        let session_id = req.session_id;

        scheduler.handle_cancel_request(CancelRequest {
            job_id: None,
            session_id: Some(session_id),
            system: false,
        });
        scheduler.handle_execute_request(local, req).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let view = scheduler.view();
        assert_eq!(view.state_of(job_id), Some(ViewState::Finished));
        let metrics = scheduler.metrics();
        assert!(metrics.finished >= 1);
        assert_eq!(metrics.active, 0);
    }

    struct BlockingRegistry;

    impl TaskRegistry for BlockingRegistry {
        fn resolve(&self, _task_name: &str) -> Option<JobBody> {
            Some(Arc::new(|token: CancelToken| {
                while !token.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(serde_json::Value::Null)
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn master_leaving_moves_active_job_to_cancelled() {
        let local = grid_core::NodeId::new();
        let cluster = Arc::new(TestCluster::new(local));
        let remote = NodeId::new();
        cluster.add_node(remote);
        let messenger = Arc::new(TestMessenger::new());
        let registry = Arc::new(TestDeploymentRegistry::new());
        registry.register(TestDeployment::new("echo", 1));
        let topology = Arc::new(TestCacheTopology::new());
        let config = Arc::new(grid_core::AtomicConfig::default());

        let scheduler = JobScheduler::new(
            cluster.clone(),
            registry,
            messenger,
            Arc::new(BlockingRegistry),
            topology,
            config,
            None,
            SchedulerOptions::default(),
        );

        let req = request(remote);
        let job_id = req.job_id;
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            sched.handle_execute_request(remote, req).await;
        });

        wait_until(|| scheduler.view().state_of(job_id) == Some(ViewState::Active)).await;
        assert_eq!(scheduler.view().state_of(job_id), Some(ViewState::Active));

        cluster.mark_departed(remote);
        scheduler.handle_node_left(remote);

        wait_until(|| scheduler.view().state_of(job_id) == Some(ViewState::Finished)).await;
        assert_eq!(scheduler.view().state_of(job_id), Some(ViewState::Finished));
        assert_eq!(scheduler.metrics().active, 0);
    }

    // spec.md §4.E step 3 "any error path must release it": a passive job
    // rejected by the collision policy without ever running must still
    // release the deployment reference acquired for it.
    #[tokio::test(flavor = "multi_thread")]
    async fn collision_rejected_passive_job_releases_its_deployment() {
        let local = grid_core::NodeId::new();
        let cluster = Arc::new(TestCluster::new(local));
        let messenger = Arc::new(TestMessenger::new());
        let registry = Arc::new(TestDeploymentRegistry::new());
        let deployment = TestDeployment::new("echo", 1);
        registry.register(deployment.clone());
        let topology = Arc::new(TestCacheTopology::new());
        let config = Arc::new(grid_core::AtomicConfig::default());
        let policy: Arc<dyn CollisionPolicy> = Arc::new(ActiveWindowPolicy::new(0));

        let scheduler = JobScheduler::new(
            cluster,
            registry,
            messenger,
            Arc::new(EchoRegistry),
            topology,
            config,
            Some(policy),
            SchedulerOptions::default(),
        );

        let req = request(local);
        scheduler.handle_execute_request(local, req).await;
        wait_until(|| scheduler.metrics().total_rejected >= 1).await;

        assert_eq!(scheduler.metrics().total_rejected, 1);
        assert_eq!(deployment.refcount(), 0);
    }

    // spec.md §4.E Lifecycle's third listener.
    #[tokio::test(flavor = "multi_thread")]
    async fn session_request_merges_attributes_keyed_by_session() {
        let (scheduler, _cluster, _messenger, _registry) = harness(None);
        let session_id = SessionId::new();

        scheduler.handle_session_request(SessionRequest {
            session_id,
            attrs: serde_json::json!({"a": 1, "b": 2}),
        });
        scheduler.handle_session_request(SessionRequest {
            session_id,
            attrs: serde_json::json!({"b": 3, "c": 4}),
        });

        assert_eq!(
            scheduler.session_attrs(session_id),
            Some(serde_json::json!({"a": 1, "b": 3, "c": 4}))
        );
        assert_eq!(scheduler.session_attrs(SessionId::new()), None);
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Worker (spec.md §4.C, §3 "Job Worker lifecycle").

use grid_core::{Deployment, GridError, JobId, PartitionReservation};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::job::JobMeta;

/// `QUEUED → STARTED → (HELD ⇄ STARTED)* → FINISHING → FINISHED`, plus a
/// terminal `CANCELLED` reachable from any non-terminal state (spec.md
/// §3). `Held` does not count against collision concurrency but stays in
/// `active` (design note "Suspension / held workers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Queued,
    Started,
    Held,
    Finishing,
    Finished,
    Cancelled,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Finished | WorkerState::Cancelled)
    }

    fn can_move_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        match (self, to) {
            (Queued, Started) => true,
            (Started, Held) => true,
            (Held, Started) => true,
            (Started, Finishing) => true,
            (Finishing, Finished) => true,
            (s, Cancelled) => !s.is_terminal(),
            _ => false,
        }
    }
}

/// Lifecycle callbacks the Scheduler uses to maintain its maps (spec.md
/// §3 "Transitions fire listener callbacks"). Every method has a no-op
/// default; implement only what you need.
pub trait JobWorkerListener: Send + Sync {
    fn on_queued(&self, _job: &JobMeta) {}
    fn on_started(&self, _job: &JobMeta) {}
    fn on_held(&self, _job: &JobMeta) {}
    fn on_unheld(&self, _job: &JobMeta) {}
    fn on_before_response_sent(&self, _job: &JobMeta) {}
    fn on_finished(&self, _job: &JobMeta, _result: &Result<serde_json::Value, GridError>) {}
}

/// A cooperative cancellation flag handed to the job body. Polling it is
/// the body's responsibility; nothing here can preempt a running thread
/// (spec.md §4.C's "interrupt" is modeled as a best-effort log, not an
/// actual thread interrupt — there is no safe equivalent in Rust).
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one job to completion, reporting lifecycle transitions through
/// its listeners. The actual job body is supplied by the caller as a
/// closure; this type owns only the contract around it (reservation,
/// cancellation, deployment release, finish bookkeeping).
pub struct JobWorker {
    pub meta: JobMeta,
    state: Mutex<WorkerState>,
    cancel_flag: Arc<AtomicBool>,
    system_cancel: AtomicBool,
    interrupted: AtomicBool,
    timed_out: AtomicBool,
    deployment: Arc<dyn Deployment>,
    deployment_released: AtomicBool,
    reservation: Arc<dyn PartitionReservation>,
    listeners: Vec<Arc<dyn JobWorkerListener>>,
    interrupt_timeout_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl JobWorker {
    pub fn new(
        meta: JobMeta,
        deployment: Arc<dyn Deployment>,
        reservation: Arc<dyn PartitionReservation>,
        listeners: Vec<Arc<dyn JobWorkerListener>>,
        interrupt_timeout_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        Self {
            meta,
            state: Mutex::new(WorkerState::Queued),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            system_cancel: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            deployment,
            deployment_released: AtomicBool::new(false),
            reservation,
            listeners,
            interrupt_timeout_ms,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.meta.job_id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    fn transition(&self, to: WorkerState) -> bool {
        let mut state = self.state.lock();
        if !state.can_move_to(to) {
            return false;
        }
        *state = to;
        true
    }

    /// Called once the worker has been inserted into the scheduler's
    /// maps. Fires before `start`/`activate` per the happens-before
    /// ordering in spec.md §5.
    pub fn mark_queued(&self) {
        for listener in &self.listeners {
            listener.on_queued(&self.meta);
        }
    }

    /// `QUEUED → STARTED`, submitted to a pool or run inline.
    pub fn activate(&self) -> bool {
        if !self.transition(WorkerState::Started) {
            return false;
        }
        for listener in &self.listeners {
            listener.on_started(&self.meta);
        }
        true
    }

    /// Voluntary suspension. Idempotent: returns `false` if the worker is
    /// no longer active, e.g. a concurrent finish (design note
    /// "Suspension / held workers").
    pub fn hold(&self) -> bool {
        if !self.transition(WorkerState::Held) {
            return false;
        }
        for listener in &self.listeners {
            listener.on_held(&self.meta);
        }
        true
    }

    pub fn unhold(&self) -> bool {
        if !self.transition(WorkerState::Started) {
            return false;
        }
        for listener in &self.listeners {
            listener.on_unheld(&self.meta);
        }
        true
    }

    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    /// Runs `body` on a blocking thread after a successful partition
    /// reservation. `body` receives a [`CancelToken`] it is expected to
    /// poll cooperatively.
    pub async fn run<F>(self: &Arc<Self>, body: F) -> Result<serde_json::Value, GridError>
    where
        F: FnOnce(CancelToken) -> Result<serde_json::Value, GridError> + Send + 'static,
    {
        if self.is_cancelled() {
            let err = GridError::ExecutionRejected {
                job_id: self.meta.job_id,
                reason: "cancelled before start".to_string(),
            };
            self.finish(Err(err.clone())).await;
            return Err(err);
        }

        if !self.reservation.reserve() {
            let err = GridError::PartitionsLost {
                job_id: self.meta.job_id,
            };
            self.finish(Err(err.clone())).await;
            return Err(err);
        }

        self.activate();
        let token = CancelToken(Arc::clone(&self.cancel_flag));
        let result = match tokio::task::spawn_blocking(move || body(token)).await {
            Ok(r) => r,
            Err(join_err) => Err(GridError::ExecutionRejected {
                job_id: self.meta.job_id,
                reason: join_err.to_string(),
            }),
        };
        self.finish(result.clone()).await;
        result
    }

    /// Records cancellation and issues the cooperative signal. If the
    /// worker hasn't reached a terminal state within
    /// `computeJobWorkerInterruptTimeout` ms, logs that a hard interrupt
    /// would now occur (spec.md §4.C, §5 "Cancellation & timeouts").
    pub fn cancel(self: &Arc<Self>, system_initiated: bool) {
        self.system_cancel.store(system_initiated, Ordering::SeqCst);
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.transition(WorkerState::Cancelled);

        let this = Arc::clone(self);
        let timeout_ms = (self.interrupt_timeout_ms)();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if !this.state().is_terminal() {
                tracing::warn!(
                    job_id = %this.meta.job_id,
                    timeout_ms,
                    "cooperative cancel timed out; interrupting worker thread"
                );
                this.interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    /// The origin task node is gone. Returns `true` if the worker will
    /// self-terminate (no response will be sent either way); `false`
    /// means the scheduler must hard-cancel.
    pub fn master_node_left(&self) -> bool {
        self.cancel_flag.store(true, Ordering::SeqCst);
        matches!(self.state(), WorkerState::Queued)
    }

    /// Releases the deployment (once) and the partition reservation
    /// without transitioning state or firing any listener. For a worker
    /// discarded before `run()` ever executes — rejected while passive,
    /// cancelled before activation, or drained on shutdown/master-leave —
    /// `run()`/`finish()` will never run to release the deployment
    /// reference `scheduler.rs` acquired on its behalf (spec.md §4.E step
    /// 3 "any error path must release it"); callers on those paths invoke
    /// this directly instead.
    pub fn release_resources(&self) {
        if !self.deployment_released.swap(true, Ordering::SeqCst) {
            self.deployment.release();
        }
        self.reservation.release();
    }

    async fn finish(&self, result: Result<serde_json::Value, GridError>) {
        self.transition(WorkerState::Finishing);
        self.release_resources();
        self.transition(WorkerState::Finished);
        for listener in &self.listeners {
            listener.on_finished(&self.meta, &result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_core::test_support::{TestCluster, TestDeployment};
    use grid_core::{NoopPartitionReservation, SessionId};
    use std::sync::atomic::AtomicUsize;

    fn worker(listeners: Vec<Arc<dyn JobWorkerListener>>) -> Arc<JobWorker> {
        let cluster = TestCluster::new(grid_core::NodeId::new());
        let meta = JobMeta::new(SessionId::new(), JobId::new(), cluster.local_node());
        Arc::new(JobWorker::new(
            meta,
            TestDeployment::new("task", 1),
            Arc::new(NoopPartitionReservation),
            listeners,
            Arc::new(|| 10_000),
        ))
    }

    struct CountingListener {
        finished: AtomicUsize,
    }

    impl JobWorkerListener for CountingListener {
        fn on_finished(&self, _job: &JobMeta, _result: &Result<serde_json::Value, GridError>) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn queued_to_started_to_finishing_to_finished_is_valid() {
        assert!(WorkerState::Queued.can_move_to(WorkerState::Started));
        assert!(WorkerState::Started.can_move_to(WorkerState::Finishing));
        assert!(WorkerState::Finishing.can_move_to(WorkerState::Finished));
        assert!(!WorkerState::Finished.can_move_to(WorkerState::Started));
    }

    #[test]
    fn held_loops_back_to_started() {
        assert!(WorkerState::Started.can_move_to(WorkerState::Held));
        assert!(WorkerState::Held.can_move_to(WorkerState::Started));
    }

    #[test]
    fn cancelled_is_reachable_from_any_non_terminal_state() {
        for state in [
            WorkerState::Queued,
            WorkerState::Started,
            WorkerState::Held,
            WorkerState::Finishing,
        ] {
            assert!(state.can_move_to(WorkerState::Cancelled));
        }
        assert!(!WorkerState::Finished.can_move_to(WorkerState::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_executes_body_and_fires_finished_once() {
        let listener = Arc::new(CountingListener {
            finished: AtomicUsize::new(0),
        });
        let w = worker(vec![listener.clone()]);
        let result = w.run(|_token| Ok(serde_json::json!({"ok": true}))).await;
        assert!(result.is_ok());
        assert_eq!(w.state(), WorkerState::Finished);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partition_reservation_failure_finishes_without_running_body() {
        struct AlwaysFails;
        impl PartitionReservation for AlwaysFails {
            fn reserve(&self) -> bool {
                false
            }
            fn release(&self) {}
            fn partitions(&self) -> &[grid_core::PartitionRef] {
                &[]
            }
        }
        let cluster = TestCluster::new(grid_core::NodeId::new());
        let meta = JobMeta::new(SessionId::new(), JobId::new(), cluster.local_node());
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let w = Arc::new(JobWorker::new(
            meta,
            TestDeployment::new("task", 1),
            Arc::new(AlwaysFails),
            vec![],
            Arc::new(|| 10_000),
        ));
        let result = w
            .run(move |_token| {
                ran2.store(true, Ordering::SeqCst);
                Ok(serde_json::Value::Null)
            })
            .await;
        assert!(matches!(result, Err(GridError::PartitionsLost { .. })));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn master_node_left_before_start_self_terminates() {
        let w = worker(vec![]);
        assert!(w.master_node_left());
    }
}

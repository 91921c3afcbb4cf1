// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`CheckpointProgress`] — one checkpoint round's monotone state machine
//! (spec.md §4.B).

use crate::counters::{CounterSnapshot, Counters};
use crate::error::CheckpointError;
use crate::state::CheckpointState;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// One entry of the opaque partition-destroy FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDestroy {
    pub cache: String,
    pub partition: u32,
}

/// The per-checkpoint coordination object. Cheap to construct, expected to
/// be shared via `Arc` across the checkpointer thread and any number of
/// observers.
///
/// State transitions are strictly monotone (design note: "a small fixed
/// array of optional futures beats a map" — each array slot is a
/// [`Notify`] rather than a literal future, since tokio has no cheap
/// reusable oneshot; `future_for` composes it back into a future that
/// resolves synchronously if the state is already reached).
pub struct CheckpointProgress {
    state: Mutex<CheckpointState>,
    failure: Mutex<Option<CheckpointError>>,
    notifies: [Notify; 6],
    counters: Counters,
    destroy_queue: Mutex<VecDeque<PartitionDestroy>>,
    wake_deadline_ns: AtomicU64,
    wake_reason: Mutex<String>,
}

impl Default for CheckpointProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointProgress {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CheckpointState::Scheduled),
            failure: Mutex::new(None),
            notifies: [
                Notify::new(),
                Notify::new(),
                Notify::new(),
                Notify::new(),
                Notify::new(),
                Notify::new(),
            ],
            counters: Counters::new(),
            destroy_queue: Mutex::new(VecDeque::new()),
            wake_deadline_ns: AtomicU64::new(0),
            wake_reason: Mutex::new(String::new()),
        }
    }

    pub fn state(&self) -> CheckpointState {
        *self.state.lock()
    }

    pub fn failure_cause(&self) -> Option<CheckpointError> {
        self.failure.lock().clone()
    }

    /// Invariant (iii): `inProgress() ≡ LOCK_RELEASED ≤ state < FINISHED`.
    pub fn in_progress(&self) -> bool {
        let s = self.state();
        s >= CheckpointState::LockReleased && s < CheckpointState::Finished
    }

    /// If current < `s`, CAS current to `s` and complete every per-state
    /// future for states ≤ `s`. Returns whether a transition happened.
    pub fn transit_to(&self, s: CheckpointState) -> bool {
        {
            let mut current = self.state.lock();
            if *current >= s {
                return false;
            }
            *current = s;
        }
        tracing::debug!(state = %s, "checkpoint transitioned");
        self.complete_up_to(s);
        true
    }

    /// Record `cause` (first write wins) and force-advance to `FINISHED`.
    pub fn fail(&self, cause: CheckpointError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(cause.clone());
            }
        }
        tracing::warn!(error = %cause, "checkpoint failed");
        self.transit_to(CheckpointState::Finished);
    }

    fn complete_up_to(&self, s: CheckpointState) {
        for state in CheckpointState::ALL {
            if state <= s {
                self.notifies[state as usize].notify_waiters();
            }
        }
    }

    /// Resolves once the progress reaches `≥ s`, synchronously if it
    /// already has. Resolves `Err` with the recorded failure cause if the
    /// progress failed before or while reaching `s`.
    pub async fn future_for(&self, s: CheckpointState) -> Result<(), CheckpointError> {
        loop {
            let notified = self.notifies[s as usize].notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state() >= s {
                return match self.failure_cause() {
                    Some(cause) => Err(cause),
                    None => Ok(()),
                };
            }
            notified.await;
        }
    }

    /// Attaches `callback`, fired iff `future_for(s)` completes without
    /// error. Requires a running tokio executor.
    pub fn on_state_changed(
        self: &Arc<Self>,
        s: CheckpointState,
        callback: impl FnOnce() + Send + 'static,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if this.future_for(s).await.is_ok() {
                callback();
            }
        });
    }

    pub fn init_counters(&self, total_pages: u64) {
        self.counters.init(total_pages);
    }

    pub fn update_written(&self, delta: u64) -> Result<(), CheckpointError> {
        self.counters.update_written(delta)
    }

    pub fn update_synced(&self, delta: u64) -> Result<(), CheckpointError> {
        self.counters.update_synced(delta)
    }

    pub fn update_evicted(&self, delta: u64) -> Result<(), CheckpointError> {
        self.counters.update_evicted(delta)
    }

    pub fn update_recovery(&self, delta: u64) -> Result<(), CheckpointError> {
        self.counters.update_recovery(delta)
    }

    /// Releases the counters and zeroes the total. Intended to be called
    /// after `FINISHED`, though nothing enforces that here.
    pub fn clear_counters(&self) {
        self.counters.clear();
    }

    pub fn counters_snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn push_partition_destroy(&self, entry: PartitionDestroy) {
        self.destroy_queue.lock().push_back(entry);
    }

    pub fn pop_partition_destroy(&self) -> Option<PartitionDestroy> {
        self.destroy_queue.lock().pop_front()
    }

    pub fn set_wake(&self, deadline_ns: u64, reason: impl Into<String>) {
        self.wake_deadline_ns.store(deadline_ns, Ordering::SeqCst);
        *self.wake_reason.lock() = reason.into();
    }

    pub fn wake_deadline_ns(&self) -> u64 {
        self.wake_deadline_ns.load(Ordering::SeqCst)
    }

    pub fn wake_reason(&self) -> String {
        self.wake_reason.lock().clone()
    }
}

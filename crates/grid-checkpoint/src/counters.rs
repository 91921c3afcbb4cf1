// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Page counters attached to a checkpoint (spec.md §4.B
//! `initCounters`/`update*`/`clearCounters`).

use crate::error::CheckpointError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Point-in-time read of a checkpoint's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub written: u64,
    pub synced: u64,
    pub evicted: u64,
    pub recovery: u64,
}

/// Four independently-advancing page counters, installed together by
/// `init` and torn down together by `clear`. `written`/`synced` reject
/// updates while uninstalled; `evicted`/`recovery` silently no-op
/// (spec.md §4.B: eviction and recovery bookkeeping are optional even
/// when a checkpoint is otherwise tracking pages). Every update requires
/// a positive delta regardless of installed state; `delta == 0` is
/// always a contract error (spec.md §4.B "Δ > 0 only").
#[derive(Debug, Default)]
pub struct Counters {
    installed: AtomicBool,
    total: AtomicU64,
    written: AtomicU64,
    synced: AtomicU64,
    evicted: AtomicU64,
    recovery: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&self, total_pages: u64) {
        self.total.store(total_pages, Ordering::SeqCst);
        self.written.store(0, Ordering::SeqCst);
        self.synced.store(0, Ordering::SeqCst);
        self.evicted.store(0, Ordering::SeqCst);
        self.recovery.store(0, Ordering::SeqCst);
        self.installed.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.installed.store(false, Ordering::SeqCst);
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn update_written(&self, delta: u64) -> Result<(), CheckpointError> {
        self.update_required(&self.written, delta)
    }

    pub fn update_synced(&self, delta: u64) -> Result<(), CheckpointError> {
        self.update_required(&self.synced, delta)
    }

    pub fn update_evicted(&self, delta: u64) -> Result<(), CheckpointError> {
        if delta == 0 {
            return Err(CheckpointError::InvalidDelta);
        }
        if self.is_installed() {
            self.evicted.fetch_add(delta, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn update_recovery(&self, delta: u64) -> Result<(), CheckpointError> {
        if delta == 0 {
            return Err(CheckpointError::InvalidDelta);
        }
        if self.is_installed() {
            self.recovery.fetch_add(delta, Ordering::SeqCst);
        }
        Ok(())
    }

    fn update_required(&self, counter: &AtomicU64, delta: u64) -> Result<(), CheckpointError> {
        if delta == 0 {
            return Err(CheckpointError::InvalidDelta);
        }
        if !self.is_installed() {
            return Err(CheckpointError::CountersNotInitialized);
        }
        let updated = counter.fetch_add(delta, Ordering::SeqCst) + delta;
        let total = self.total.load(Ordering::SeqCst);
        if updated > total {
            return Err(CheckpointError::CounterOutOfRange {
                detail: format!("{updated} exceeds declared total {total}"),
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.load(Ordering::SeqCst),
            written: self.written.load(Ordering::SeqCst),
            synced: self.synced.load(Ordering::SeqCst),
            evicted: self.evicted.load(Ordering::SeqCst),
            recovery: self.recovery.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_and_synced_require_init() {
        let counters = Counters::new();
        assert_eq!(
            counters.update_written(1),
            Err(CheckpointError::CountersNotInitialized)
        );
    }

    #[test]
    fn evicted_and_recovery_noop_without_init() {
        let counters = Counters::new();
        counters.update_evicted(5).unwrap();
        counters.update_recovery(5).unwrap();
        assert_eq!(counters.snapshot().evicted, 0);
        assert_eq!(counters.snapshot().recovery, 0);
    }

    #[test]
    fn zero_delta_is_always_rejected() {
        let counters = Counters::new();
        assert_eq!(counters.update_evicted(0), Err(CheckpointError::InvalidDelta));
        assert_eq!(counters.update_recovery(0), Err(CheckpointError::InvalidDelta));
        assert_eq!(counters.update_written(0), Err(CheckpointError::InvalidDelta));

        counters.init(10);
        assert_eq!(counters.update_written(0), Err(CheckpointError::InvalidDelta));
        assert_eq!(counters.update_synced(0), Err(CheckpointError::InvalidDelta));
    }

    #[test]
    fn update_past_total_is_out_of_range() {
        let counters = Counters::new();
        counters.init(10);
        counters.update_written(10).unwrap();
        assert!(matches!(
            counters.update_written(1),
            Err(CheckpointError::CounterOutOfRange { .. })
        ));
    }

    #[test]
    fn clear_uninstalls_and_future_updates_fail() {
        let counters = Counters::new();
        counters.init(10);
        counters.update_written(3).unwrap();
        counters.clear();
        assert_eq!(
            counters.update_written(1),
            Err(CheckpointError::CountersNotInitialized)
        );
    }
}

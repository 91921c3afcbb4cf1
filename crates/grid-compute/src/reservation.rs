// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partition Reservation (spec.md §4.F) — the pre-flight guard ensuring a
//! job's cache partitions remain locally owned for its duration.
//!
//! `CacheTopology` is the collaborator this component consumes: the real
//! partition map lives in the cache engine (spec.md §1 "cache partition
//! reservation ... treated as opaque pre-flight checks"); we model just
//! enough of its surface to implement `reserve()`/`release()` faithfully.

use grid_core::{PartitionRef, PartitionReservation};
use parking_lot::Mutex;
use std::sync::Arc;

/// A partition's state as seen by the local cache topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Owning,
    Moving,
    Lost,
}

/// The collaborator surface this component needs from the cache engine:
/// whether a cache context exists and has started, and the state of one of
/// its partitions.
pub trait CacheTopology: Send + Sync {
    fn cache_started(&self, cache_id: i32) -> bool;
    fn partition_state(&self, cache_id: i32, partition_id: i32) -> Option<PartitionState>;
}

/// Walks a job's `{cacheId, partitionId, topologyVersion}` list and reserves
/// each partition, releasing everything already reserved on the first
/// failure (spec.md §4.F).
pub struct CachePartitionReservation {
    partitions: Vec<PartitionRef>,
    topology: Arc<dyn CacheTopology>,
    reserved: Mutex<Vec<PartitionRef>>,
}

impl CachePartitionReservation {
    pub fn new(partitions: Vec<PartitionRef>, topology: Arc<dyn CacheTopology>) -> Self {
        Self {
            partitions,
            topology,
            reserved: Mutex::new(Vec::new()),
        }
    }

    fn owning(&self, p: &PartitionRef) -> bool {
        matches!(
            self.topology.partition_state(p.cache_id, p.partition_id),
            Some(PartitionState::Owning)
        )
    }
}

impl PartitionReservation for CachePartitionReservation {
    /// For each cache: a missing or not-yet-started cache context fails
    /// reservation outright. For each reserved partition the cache must
    /// report `Owning`. A final re-read double-checks every partition this
    /// call reserved; any divergence is treated as a failed reservation too
    /// (spec.md §4.F, design note: modeled as a pre-return check rather
    /// than a `finally`-raised exception).
    fn reserve(&self) -> bool {
        let mut reserved = self.reserved.lock();
        reserved.clear();

        for p in &self.partitions {
            if !self.topology.cache_started(p.cache_id) || !self.owning(p) {
                reserved.clear();
                return false;
            }
            reserved.push(*p);
        }

        let all_still_owning = reserved.iter().all(|p| self.owning(p));
        if !all_still_owning {
            reserved.clear();
            return false;
        }
        true
    }

    fn release(&self) {
        self.reserved.lock().clear();
    }

    fn partitions(&self) -> &[PartitionRef] {
        &self.partitions
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// A `CacheTopology` double whose state is mutated directly by tests.
    #[derive(Default)]
    pub struct TestCacheTopology {
        started: RwLock<HashMap<i32, bool>>,
        states: RwLock<HashMap<(i32, i32), PartitionState>>,
    }

    impl TestCacheTopology {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn start_cache(&self, cache_id: i32) {
            self.started.write().insert(cache_id, true);
        }

        pub fn set_partition_state(&self, cache_id: i32, partition_id: i32, state: PartitionState) {
            self.states.write().insert((cache_id, partition_id), state);
        }
    }

    impl CacheTopology for TestCacheTopology {
        fn cache_started(&self, cache_id: i32) -> bool {
            self.started.read().get(&cache_id).copied().unwrap_or(false)
        }

        fn partition_state(&self, cache_id: i32, partition_id: i32) -> Option<PartitionState> {
            self.states.read().get(&(cache_id, partition_id)).copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestCacheTopology;
    use super::*;

    fn partition_ref(cache_id: i32, partition_id: i32) -> PartitionRef {
        PartitionRef {
            cache_id,
            partition_id,
            topology_version: 1,
        }
    }

    #[test]
    fn reserve_succeeds_when_every_partition_is_owning() {
        let topo = Arc::new(TestCacheTopology::new());
        topo.start_cache(1);
        topo.set_partition_state(1, 0, PartitionState::Owning);
        let reservation = CachePartitionReservation::new(vec![partition_ref(1, 0)], topo);
        assert!(reservation.reserve());
    }

    #[test]
    fn reserve_fails_when_cache_not_started() {
        let topo = Arc::new(TestCacheTopology::new());
        let reservation = CachePartitionReservation::new(vec![partition_ref(1, 0)], topo);
        assert!(!reservation.reserve());
    }

    #[test]
    fn reserve_fails_and_releases_earlier_partitions_on_first_non_owning() {
        let topo = Arc::new(TestCacheTopology::new());
        topo.start_cache(1);
        topo.set_partition_state(1, 0, PartitionState::Owning);
        topo.set_partition_state(1, 1, PartitionState::Moving);
        let reservation =
            CachePartitionReservation::new(vec![partition_ref(1, 0), partition_ref(1, 1)], topo);
        assert!(!reservation.reserve());
        assert!(reservation.reserved.lock().is_empty());
    }

    #[test]
    fn a_reservation_over_no_partitions_always_succeeds() {
        let topo = Arc::new(TestCacheTopology::new());
        let reservation = CachePartitionReservation::new(vec![], topo);
        assert!(reservation.reserve());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed configuration surface (spec.md §6, §9).
//!
//! `computeJobWorkerInterruptTimeout` is the only property spec.md names,
//! but it is explicitly "updatable at runtime" and injected rather than a
//! singleton (§9 DESIGN NOTES), so this is a small trait object, not a
//! constant.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default interrupt timeout, milliseconds — spec.md §5 "defaulting to the
/// failure-detection timeout"; we don't model failure detection itself, so
/// we hardcode a conservative default matching a typical detection window.
pub const DEFAULT_INTERRUPT_TIMEOUT_MS: u64 = 10_000;

/// A distributed-config property source, injected into the scheduler at
/// construction rather than read from a process-wide singleton.
pub trait DistributedConfig: Send + Sync {
    /// Milliseconds to wait after a cooperative cancel before interrupting
    /// a worker's thread (spec.md §5 "Cancellation & timeouts").
    fn compute_job_worker_interrupt_timeout_ms(&self) -> u64;
}

/// On-disk defaults, read once from a `toml` file at startup. Mirrors the
/// teacher's use of `toml` for static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_interrupt_timeout")]
    pub compute_job_worker_interrupt_timeout_ms: u64,
}

fn default_interrupt_timeout() -> u64 {
    DEFAULT_INTERRUPT_TIMEOUT_MS
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self { compute_job_worker_interrupt_timeout_ms: DEFAULT_INTERRUPT_TIMEOUT_MS }
    }
}

impl StaticConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

impl DistributedConfig for StaticConfig {
    fn compute_job_worker_interrupt_timeout_ms(&self) -> u64 {
        self.compute_job_worker_interrupt_timeout_ms
    }
}

/// Lock-free, runtime-updatable config backing the "updatable at runtime"
/// requirement in spec.md §6.
pub struct AtomicConfig {
    interrupt_timeout_ms: AtomicU64,
}

impl AtomicConfig {
    pub fn new(initial: &impl DistributedConfig) -> Self {
        Self {
            interrupt_timeout_ms: AtomicU64::new(
                initial.compute_job_worker_interrupt_timeout_ms(),
            ),
        }
    }

    pub fn set_interrupt_timeout_ms(&self, ms: u64) {
        self.interrupt_timeout_ms.store(ms, Ordering::Relaxed);
    }
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self { interrupt_timeout_ms: AtomicU64::new(DEFAULT_INTERRUPT_TIMEOUT_MS) }
    }
}

impl DistributedConfig for AtomicConfig {
    fn compute_job_worker_interrupt_timeout_ms(&self) -> u64 {
        self.interrupt_timeout_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_config_defaults_when_toml_is_empty() {
        let cfg = StaticConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.compute_job_worker_interrupt_timeout_ms, DEFAULT_INTERRUPT_TIMEOUT_MS);
    }

    #[test]
    fn static_config_reads_override() {
        let cfg = StaticConfig::from_toml_str("compute_job_worker_interrupt_timeout_ms = 500")
            .unwrap();
        assert_eq!(cfg.compute_job_worker_interrupt_timeout_ms, 500);
    }

    #[test]
    fn atomic_config_is_updatable_at_runtime() {
        let cfg = AtomicConfig::default();
        assert_eq!(cfg.compute_job_worker_interrupt_timeout_ms(), DEFAULT_INTERRUPT_TIMEOUT_MS);
        cfg.set_interrupt_timeout_ms(42);
        assert_eq!(cfg.compute_job_worker_interrupt_timeout_ms(), 42);
    }
}

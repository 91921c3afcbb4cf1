// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete collision policies.

use crate::context::CollisionJobContext;
use crate::policy::CollisionPolicy;

/// Activates every passive job immediately. This is the scheduler's
/// built-in default (spec.md §4.D "A default policy activates everything
/// immediately"); in practice the scheduler skips invoking any policy at
/// all when collision is disabled, so this type exists for callers who
/// want an explicit, always-on collision pass (e.g. to exercise the SPI
/// plumbing in tests) without writing admission logic of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysActivate;

impl CollisionPolicy for AlwaysActivate {
    fn on_collision(
        &self,
        passive: &[Box<dyn CollisionJobContext>],
        _active: &[Box<dyn CollisionJobContext>],
        _held: &[Box<dyn CollisionJobContext>],
    ) {
        for ctx in passive {
            ctx.activate();
        }
    }
}

/// Keeps at most `max_active` jobs active (counting already-active jobs),
/// activating passive jobs in view order until the window is full and
/// rejecting the rest. Used by the spec.md §8 S1 scenario ("cancel
/// everything beyond 2") and by the demo CLI.
pub struct ActiveWindowPolicy {
    max_active: usize,
}

impl ActiveWindowPolicy {
    pub fn new(max_active: usize) -> Self {
        Self { max_active }
    }
}

impl CollisionPolicy for ActiveWindowPolicy {
    fn on_collision(
        &self,
        passive: &[Box<dyn CollisionJobContext>],
        active: &[Box<dyn CollisionJobContext>],
        _held: &[Box<dyn CollisionJobContext>],
    ) {
        let mut slots = self.max_active.saturating_sub(active.len());
        for ctx in passive {
            if slots > 0 {
                if ctx.activate() {
                    slots -= 1;
                }
            } else {
                tracing::debug!(job_id = %ctx.job_id(), max_active = self.max_active, "active window full; rejecting");
                ctx.cancel();
            }
        }
    }
}

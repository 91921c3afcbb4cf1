// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `CollisionPolicy` SPI itself (spec.md §4.D, §6 "Collision SPI surface exposed").

use crate::context::CollisionJobContext;
use std::sync::Arc;

/// Callback a policy uses to ask the scheduler to re-run the collision pass,
/// e.g. when the policy's own internal queue changes independently of the
/// scheduler's maps (spec.md §6 `setExternalListener`).
pub type ExternalListener = Arc<dyn Fn() + Send + Sync>;

/// A pluggable admission/prioritization decision over queued and running
/// jobs. Implementations see a point-in-time view of the scheduler's maps
/// and may `activate()` or `cancel()` individual job contexts.
///
/// The scheduler guarantees (spec.md §4.D):
/// - views reflect scheduler state at iteration time and do not support
///   removal through the iterator;
/// - recursive calls into `on_collision` from within the callback are
///   suppressed by the scheduler's own thread-local guard, not by the
///   policy.
pub trait CollisionPolicy: Send + Sync {
    /// Called with the scheduler's current passive, active, and held views,
    /// each a forward-only slice of live contexts.
    fn on_collision(
        &self,
        passive: &[Box<dyn CollisionJobContext>],
        active: &[Box<dyn CollisionJobContext>],
        held: &[Box<dyn CollisionJobContext>],
    );

    /// Register a listener the policy can invoke to ask for a re-run.
    /// Default is a no-op: most policies are purely reactive to the views
    /// they're handed.
    fn set_external_listener(&self, _listener: ExternalListener) {}

    /// Unregister the listener set by `set_external_listener`.
    fn unset_external_listener(&self) {}
}

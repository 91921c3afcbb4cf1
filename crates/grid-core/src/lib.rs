// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared identifiers, error taxonomy, and collaborator interfaces for the
//! compute grid.
//!
//! This crate has no knowledge of scheduling, checkpointing, or spill
//! buffers — it is the seam every other crate in the workspace depends on.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod ids;
pub mod macros;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use collaborators::{
    Cluster, ClusterNode, Deployment, DeploymentRegistry, ListenerId, MessageHandler, Messenger,
    NodeId, NoopPartitionReservation, OrderedSendOptions, PartitionRef, PartitionReservation,
    Topic,
};
pub use config::{AtomicConfig, DistributedConfig, StaticConfig};
pub use error::GridError;
pub use ids::{JobId, SessionId};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;

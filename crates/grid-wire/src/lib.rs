// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Message DTOs and well-known topic names for the execute/cancel/session
//! pipeline (spec.md §6, design note "Inheritance-heavy hierarchies" — the
//! source's message-kind class hierarchy becomes tagged variants here).
//!
//! This crate carries no wire-format compatibility goal with the source
//! (spec.md §1 Non-goals); it exists to give the scheduler and its callers
//! a shared, serializable vocabulary.

pub mod messages;
pub mod topics;

pub use messages::{
    CancelRequest, ExecuteRequest, ExecuteResponse, SessionRequest, SiblingsRequest,
    SiblingsResponse,
};
pub use topics::Topics;

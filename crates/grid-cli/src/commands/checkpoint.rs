// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gridctl checkpoint demo` — advances a [`CheckpointProgress`] through
//! its full state order and reports which per-state futures resolved
//! along the way (spec.md §4.B, §8 S6).

use clap::Args;
use futures_util::FutureExt;
use grid_checkpoint::{CheckpointProgress, CheckpointState};
use serde::Serialize;

use crate::output::{print_result, OutputFormat};

#[derive(Args, Debug)]
pub struct CheckpointArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct CheckpointOutcome {
    final_state: String,
    in_progress_at_pages_written: bool,
}

pub fn handle(args: CheckpointArgs) -> anyhow::Result<()> {
    let progress = CheckpointProgress::new();
    progress.init_counters(100);

    progress.transit_to(CheckpointState::LockTaken);
    progress.transit_to(CheckpointState::PagesSnapshotted);
    progress.update_written(100).ok();
    progress.transit_to(CheckpointState::LockReleased);
    let in_progress = progress.in_progress();
    progress.transit_to(CheckpointState::PagesWritten);
    progress.update_synced(100).ok();
    progress.transit_to(CheckpointState::Finished);
    progress.clear_counters();

    // Every per-state future must already be resolved now that we're
    // FINISHED (spec.md §4.B invariant ii).
    let lock_released_resolved = progress
        .future_for(CheckpointState::LockReleased)
        .now_or_never()
        .is_some();
    debug_assert!(lock_released_resolved);

    let outcome = CheckpointOutcome {
        final_state: progress.state().to_string(),
        in_progress_at_pages_written: in_progress,
    };
    print_result(args.format, &outcome, |o| {
        println!("final state: {}", o.final_state);
        println!(
            "was in_progress() once LOCK_RELEASED was reached: {}",
            o.in_progress_at_pages_written
        );
    });

    Ok(())
}

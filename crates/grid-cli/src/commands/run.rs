// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gridctl run` — submits a batch of demo jobs through the scheduler's
//! real execute-request path (spec.md §4.E), optionally gated by an
//! admission policy, and prints the resulting view/metrics once every job
//! has settled.

use std::time::Duration;

use clap::Args;
use grid_collision::{ActiveWindowPolicy, CollisionPolicy};
use grid_wire::ExecuteRequest;
use serde::Serialize;
use std::sync::Arc;

use crate::harness::Harness;
use crate::output::{print_result, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of demo jobs to submit.
    #[arg(long, default_value_t = 4)]
    pub jobs: usize,

    /// Task name to submit (`sleepy` blocks ~500ms cooperatively; anything
    /// else completes immediately).
    #[arg(long, default_value = "sleepy")]
    pub task: String,

    /// Cap concurrently-active jobs via `ActiveWindowPolicy`; omit to run
    /// with collision disabled (every job activates immediately).
    #[arg(long)]
    pub window: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct RunOutcome {
    submitted: usize,
    metrics: grid_compute::SchedulerMetrics,
}

pub async fn handle(args: RunArgs) -> anyhow::Result<()> {
    let policy: Option<Arc<dyn CollisionPolicy>> =
        args.window.map(|n| Arc::new(ActiveWindowPolicy::new(n)) as Arc<dyn CollisionPolicy>);
    let harness = Harness::new(policy);
    let local = harness.local_node();

    for _ in 0..args.jobs {
        let req = ExecuteRequest {
            session_id: grid_core::SessionId::new(),
            job_id: grid_core::JobId::new(),
            task_name: args.task.clone(),
            class_name: "Demo".to_string(),
            deployment_mode: "SHARED".to_string(),
            class_loader_id: "1".to_string(),
            loader_participants: vec![],
            create_time_ms: 0,
            timeout_ms: None,
            topology_version: 1,
            siblings: None,
            session_attrs: None,
            job_attrs: None,
            executor_name: None,
            cache_ids: vec![],
            partition_id: None,
            internal: false,
            session_full_support: false,
            topology_predicate: None,
        };
        harness.scheduler.handle_execute_request(local, req).await;
    }

    // Demo-only convenience: poll until every submitted job has settled.
    // A real caller drives this off the response messages instead.
    for _ in 0..200 {
        let m = harness.scheduler.metrics();
        if m.finished >= args.jobs {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let outcome = RunOutcome {
        submitted: args.jobs,
        metrics: harness.scheduler.metrics(),
    };

    print_result(args.format, &outcome, |o| {
        println!("submitted {} job(s)", o.submitted);
        println!(
            "active={} held={} passive={} cancelled={} finished={}",
            o.metrics.active, o.metrics.held, o.metrics.passive, o.metrics.cancelled, o.metrics.finished
        );
        println!(
            "executed={} rejected={} cancelled_total={}",
            o.metrics.total_executed, o.metrics.total_rejected, o.metrics.total_cancelled
        );
    });

    Ok(())
}

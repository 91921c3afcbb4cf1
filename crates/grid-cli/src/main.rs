// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `gridctl` — a small demo binary wiring an in-memory `Messenger`/
//! `Cluster`/`Deployment` harness to the compute grid so the scheduler,
//! checkpoint coordinator, and LOB buffer are runnable end to end,
//! mirroring the teacher's `oj-daemon`/`oj-cli` split (binary crate at the
//! edge, library crates doing the work).

mod commands;
mod harness;
mod output;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gridctl", about = "Demo driver for the compute grid crates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a batch of demo jobs through the scheduler's execute-request
    /// path and print the resulting metrics.
    Run(commands::run::RunArgs),
    /// Exercise the LOB spill buffer's memory-to-tempfile promotion.
    Lob(commands::lob::LobArgs),
    /// Walk a checkpoint through its full state order.
    Checkpoint(commands::checkpoint::CheckpointArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::handle(args).await,
        Command::Lob(args) => commands::lob::handle(args),
        Command::Checkpoint(args) => commands::checkpoint::handle(args),
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting shared across subcommands (mirrors the teacher's
//! `oj` CLI `OutputFormat`/text-vs-JSON split in `output.rs`).

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `value` as pretty JSON, or hand off to `text` for the human
/// format. Every subcommand funnels its result through this so `--format
/// json` behaves uniformly.
pub fn print_result<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("failed to serialize output: {e}"),
        },
        OutputFormat::Text => text(value),
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gridctl lob demo` — writes past a configurable threshold and reports
//! the spill-to-disk promotion (spec.md §4.A, §8 S4).

use std::io::{Read, Write};

use clap::Args;
use grid_lob::LobBuffer;
use serde::Serialize;

use crate::output::{print_result, OutputFormat};

#[derive(Args, Debug)]
pub struct LobArgs {
    /// Bytes the buffer may hold in memory before spilling to a tempfile.
    #[arg(long, default_value_t = 16)]
    pub max_memory_bytes: u64,

    /// Total bytes to write, split into 10-byte chunks.
    #[arg(long, default_value_t = 40)]
    pub total_bytes: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct LobOutcome {
    total_written: u64,
    is_tempfile: bool,
}

pub fn handle(args: LobArgs) -> anyhow::Result<()> {
    let buffer = LobBuffer::new(args.max_memory_bytes);
    let mut pos = 0u64;
    let chunk = vec![0xABu8; 10];
    while pos < args.total_bytes {
        let mut writer = buffer.open_write(pos)?;
        let n = chunk.len().min((args.total_bytes - pos) as usize);
        writer.write_all(&chunk[..n])?;
        pos += n as u64;
        tracing::debug!(pos, is_tempfile = buffer.is_tempfile(), "lob write");
    }

    let mut reader = buffer.open_read()?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;

    let outcome = LobOutcome {
        total_written: out.len() as u64,
        is_tempfile: buffer.is_tempfile(),
    };
    print_result(args.format, &outcome, |o| {
        println!(
            "wrote {} bytes; storage is now {}",
            o.total_written,
            if o.is_tempfile { "tempfile" } else { "memory" }
        );
    });

    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A reader handle over a [`crate::LobBuffer`] (spec.md §4.A "Marked/reset
//! streams").

use crate::state::LobState;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;

/// A cursor into a live [`crate::LobBuffer`]. Not thread-safe on its own
/// (`&mut self` methods), but any number of readers and writers may be
/// open concurrently on the same buffer; reads see writes from any of
/// them, even ones created before the write.
pub struct LobReader {
    pub(crate) state: Arc<Mutex<LobState>>,
    pub(crate) pos: u64,
    pub(crate) end: Option<u64>,
    pub(crate) mark: u64,
}

impl LobReader {
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Snapshots the current position. Honored to at least `MAX_INT`
    /// bytes away, since we just store an integer rather than buffering.
    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    /// Restores the position recorded by the last `mark()` (or the start
    /// of the reader's range if `mark()` was never called).
    pub fn reset(&mut self) {
        self.pos = self.mark;
    }

    pub(crate) fn advance(&mut self, n: u64) {
        self.pos += n;
    }
}

impl Read for LobReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let limit = match self.end {
            Some(end) => (end.saturating_sub(self.pos)).min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }
        let mut state = self.state.lock();
        let n = state.read_at(self.pos, &mut buf[..limit])?;
        drop(state);
        self.pos += n as u64;
        Ok(n)
    }
}

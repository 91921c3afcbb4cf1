// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A writer handle over a [`crate::LobBuffer`] (spec.md §4.A `openWrite`).

use crate::state::LobState;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

pub struct LobWriter {
    pub(crate) state: Arc<Mutex<LobState>>,
    pub(crate) pos: u64,
}

impl LobWriter {
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Write for LobWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock();
        let n = state.write_at(self.pos, buf)?;
        drop(state);
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

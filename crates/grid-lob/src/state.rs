// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage sum type and its promotion algorithm (spec.md §4.A, design
//! note "Storage promotion").

use crate::error::LobError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// `ReadOnlyMem →(first write)→ RwMem`, `RwMem →(size > threshold)→
/// TempFile`. No transition returns.
pub(crate) enum Storage {
    ReadOnlyMem(Arc<[u8]>),
    RwMem(Vec<u8>),
    TempFile(File),
}

impl Storage {
    fn is_tempfile(&self) -> bool {
        matches!(self, Storage::TempFile(_))
    }
}

pub(crate) struct LobState {
    storage: Storage,
    total: u64,
    max_memory_bytes: u64,
    closed: bool,
}

impl LobState {
    pub(crate) fn empty(max_memory_bytes: u64) -> Self {
        Self {
            storage: Storage::RwMem(Vec::new()),
            total: 0,
            max_memory_bytes,
            closed: false,
        }
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>, max_memory_bytes: u64) -> Self {
        let total = bytes.len() as u64;
        Self {
            storage: Storage::ReadOnlyMem(Arc::from(bytes)),
            total,
            max_memory_bytes,
            closed: false,
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_tempfile(&self) -> bool {
        self.storage.is_tempfile()
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn check_open(&self) -> Result<(), LobError> {
        if self.closed {
            Err(LobError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn read_at(&mut self, pos: u64, out: &mut [u8]) -> Result<usize, LobError> {
        self.check_open()?;
        if pos >= self.total {
            return Ok(0);
        }
        let n = (out.len() as u64).min(self.total - pos) as usize;
        match &mut self.storage {
            Storage::ReadOnlyMem(bytes) => {
                out[..n].copy_from_slice(&bytes[pos as usize..pos as usize + n]);
            }
            Storage::RwMem(vec) => {
                out[..n].copy_from_slice(&vec[pos as usize..pos as usize + n]);
            }
            Storage::TempFile(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(&mut out[..n])?;
            }
        }
        Ok(n)
    }

    /// Promotion algorithm (spec.md §4.A): before each write, drain to a
    /// tempfile if the write would push the buffer past `max_memory_bytes`
    /// and it is not already tempfile-backed; then, if still read-only,
    /// copy into a fresh read-write memory storage before retrying.
    pub(crate) fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<usize, LobError> {
        self.check_open()?;
        if pos > self.total {
            return Err(LobError::OutOfRange);
        }
        let len = buf.len() as u64;
        let needed = pos.max(self.total).max(pos + len);
        if needed > self.max_memory_bytes && !self.storage.is_tempfile() {
            self.promote_to_tempfile()?;
        }
        if matches!(self.storage, Storage::ReadOnlyMem(_)) {
            let content = self.snapshot();
            self.storage = Storage::RwMem(content);
        }

        let end = pos + len;
        match &mut self.storage {
            Storage::RwMem(vec) => {
                if (vec.len() as u64) < end {
                    vec.resize(end as usize, 0);
                }
                vec[pos as usize..end as usize].copy_from_slice(buf);
            }
            Storage::TempFile(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.write_all(buf)?;
            }
            Storage::ReadOnlyMem(_) => unreachable!("converted to RwMem above"),
        }
        self.total = self.total.max(end);
        Ok(buf.len())
    }

    pub(crate) fn truncate(&mut self, len: u64) -> Result<(), LobError> {
        self.check_open()?;
        if len > self.total {
            return Err(LobError::OutOfRange);
        }
        match &mut self.storage {
            Storage::RwMem(vec) => vec.truncate(len as usize),
            Storage::TempFile(file) => file.set_len(len)?,
            Storage::ReadOnlyMem(_) => {}
        }
        self.total = len;
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        match &self.storage {
            Storage::ReadOnlyMem(bytes) => bytes[..self.total as usize].to_vec(),
            Storage::RwMem(vec) => vec[..self.total as usize].to_vec(),
            Storage::TempFile(_) => unreachable!("tempfile never drained through snapshot"),
        }
    }

    fn promote_to_tempfile(&mut self) -> Result<(), LobError> {
        let mut file = tempfile::tempfile()?;
        let content = self.snapshot();
        file.write_all(&content)?;
        self.storage = Storage::TempFile(file);
        tracing::debug!(bytes = self.total, "lob buffer spilled to tempfile");
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`LobBuffer`] — the public handle over one spill-to-disk byte sequence.

use crate::error::LobError;
use crate::reader::LobReader;
use crate::state::LobState;
use crate::writer::LobWriter;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;

/// A random-access byte sequence that promotes from memory to a tempfile
/// once it outgrows `max_memory_bytes`. Cheap to clone; clones share the
/// same underlying storage.
#[derive(Clone)]
pub struct LobBuffer(Arc<Mutex<LobState>>);

impl LobBuffer {
    pub fn new(max_memory_bytes: u64) -> Self {
        Self(Arc::new(Mutex::new(LobState::empty(max_memory_bytes))))
    }

    /// A buffer pre-loaded with an existing, not-yet-written-to blob.
    /// Starts in read-only memory mode; the first write copies it into a
    /// read-write storage (spec.md design note "Storage promotion").
    pub fn from_bytes(bytes: Vec<u8>, max_memory_bytes: u64) -> Self {
        Self(Arc::new(Mutex::new(LobState::from_bytes(
            bytes,
            max_memory_bytes,
        ))))
    }

    pub fn total(&self) -> Result<u64, LobError> {
        let state = self.0.lock();
        state.check_open()?;
        Ok(state.total())
    }

    pub fn is_tempfile(&self) -> bool {
        self.0.lock().is_tempfile()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().is_closed()
    }

    pub fn close(&self) {
        self.0.lock().close();
    }

    /// Unbounded reader over the entire current content; reflects future
    /// appends since it re-reads `total` on every call.
    pub fn open_read(&self) -> Result<LobReader, LobError> {
        self.open_read_from(0)
    }

    fn open_read_from(&self, pos: u64) -> Result<LobReader, LobError> {
        self.0.lock().check_open()?;
        Ok(LobReader {
            state: self.0.clone(),
            pos,
            end: None,
            mark: pos,
        })
    }

    pub fn open_read_bounded(&self, pos: u64, len: u64) -> Result<LobReader, LobError> {
        let state = self.0.lock();
        state.check_open()?;
        let total = state.total();
        if pos >= total || len > total - pos {
            return Err(LobError::OutOfRange);
        }
        drop(state);
        Ok(LobReader {
            state: self.0.clone(),
            pos,
            end: Some(pos + len),
            mark: pos,
        })
    }

    pub fn open_write(&self, pos: u64) -> Result<LobWriter, LobError> {
        let state = self.0.lock();
        state.check_open()?;
        if pos > state.total() {
            return Err(LobError::OutOfRange);
        }
        drop(state);
        Ok(LobWriter {
            state: self.0.clone(),
            pos,
        })
    }

    pub fn truncate(&self, len: u64) -> Result<(), LobError> {
        self.0.lock().truncate(len)
    }

    /// `position(pattern, startOneBased)` (spec.md §4.A) — the smallest
    /// one-based index `i ≥ start` such that `buffer[i-1..i-1+|pattern|) =
    /// pattern`, or `-1` if exhausted, `pattern` is empty or longer than
    /// the buffer, or `start` is past the end. `start < 1` is an error.
    pub fn position(&self, pattern: &[u8], start_one_based: i64) -> Result<i64, LobError> {
        if start_one_based < 1 {
            return Err(LobError::OutOfRange);
        }
        let total = self.total()?;
        let start0 = (start_one_based - 1) as u64;
        if pattern.is_empty() || pattern.len() as u64 > total || start0 >= total {
            return Ok(-1);
        }

        let mut reader = self.open_read_from(start0)?;
        let mut candidate = start0;
        let mut byte = [0u8; 1];
        reader.mark();

        loop {
            let mut idx = 0usize;
            loop {
                let n = reader.read(&mut byte)?;
                if n == 0 {
                    return Ok(-1);
                }
                if byte[0] != pattern[idx] {
                    break;
                }
                idx += 1;
                if idx == pattern.len() {
                    return Ok((candidate + 1) as i64);
                }
            }
            reader.reset();
            candidate += 1;
            reader.advance(1);
            reader.mark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn drain(reader: &mut LobReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    // spec.md §8 P7.
    #[test]
    fn round_trip_covers_the_whole_buffer() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"hello, ").unwrap();
        let mut writer2 = buffer.open_write(7).unwrap();
        writer2.write_all(b"world!").unwrap();

        let mut reader = buffer.open_read().unwrap();
        assert_eq!(drain(&mut reader), b"hello, world!");
    }

    // spec.md §8 P8 / S4.
    #[test]
    fn spills_to_tempfile_past_threshold_and_never_returns_to_memory() {
        let buffer = LobBuffer::new(16);
        let mut w1 = buffer.open_write(0).unwrap();
        w1.write_all(&[1u8; 10]).unwrap();
        assert!(!buffer.is_tempfile());

        let reader_before_second_write = buffer.open_read().unwrap();

        let mut w2 = buffer.open_write(10).unwrap();
        w2.write_all(&[2u8; 10]).unwrap();
        assert!(buffer.is_tempfile());
        assert_eq!(buffer.total().unwrap(), 20);

        let mut reader = reader_before_second_write;
        assert_eq!(drain(&mut reader).len(), 20);

        buffer.truncate(5).unwrap();
        assert!(buffer.is_tempfile());
        assert_eq!(buffer.total().unwrap(), 5);
        let mut reader = buffer.open_read().unwrap();
        assert_eq!(drain(&mut reader), vec![1u8; 5]);
    }

    // spec.md §8 P9 / S5.
    #[test]
    fn pattern_search_finds_first_match_from_start() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"abcabcabd").unwrap();

        assert_eq!(buffer.position(b"abcabd", 1).unwrap(), 4);
        assert_eq!(buffer.position(b"abcabd", 5).unwrap(), -1);
    }

    #[test]
    fn pattern_search_rejects_start_below_one() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"abc").unwrap();
        assert!(matches!(
            buffer.position(b"a", 0),
            Err(LobError::OutOfRange)
        ));
    }

    #[test]
    fn pattern_search_past_end_is_not_found() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"abc").unwrap();
        assert_eq!(buffer.position(b"a", 100).unwrap(), -1);
    }

    #[test]
    fn open_read_bounded_rejects_pos_at_or_past_total() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"abc").unwrap();
        assert!(matches!(
            buffer.open_read_bounded(3, 0),
            Err(LobError::OutOfRange)
        ));
        assert!(buffer.open_read_bounded(0, 3).is_ok());
        assert!(matches!(
            buffer.open_read_bounded(0, 4),
            Err(LobError::OutOfRange)
        ));
    }

    #[test]
    fn open_write_allows_append_at_exactly_total() {
        let buffer = LobBuffer::new(1024);
        let mut writer = buffer.open_write(0).unwrap();
        writer.write_all(b"abc").unwrap();
        assert!(buffer.open_write(3).is_ok());
        assert!(matches!(buffer.open_write(4), Err(LobError::OutOfRange)));
    }

    #[test]
    fn operations_after_close_fail() {
        let buffer = LobBuffer::new(1024);
        buffer.close();
        assert!(matches!(buffer.open_read(), Err(LobError::Closed)));
        assert!(matches!(buffer.open_write(0), Err(LobError::Closed)));
        assert!(matches!(buffer.truncate(0), Err(LobError::Closed)));
    }

    #[test]
    fn read_only_mem_promotes_on_first_write() {
        let buffer = LobBuffer::from_bytes(b"seed".to_vec(), 1024);
        let mut writer = buffer.open_write(4).unwrap();
        writer.write_all(b"ling").unwrap();
        let mut reader = buffer.open_read().unwrap();
        assert_eq!(drain(&mut reader), b"seedling");
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    /// Splits `data` into `n` chunks (possibly empty) preserving order.
    fn chunk(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut cuts: Vec<usize> = cuts.iter().map(|c| *c % (data.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();
        let mut out = Vec::new();
        let mut prev = 0;
        for c in cuts {
            out.push(data[prev..c].to_vec());
            prev = c;
        }
        out.push(data[prev..].to_vec());
        out
    }

    proptest! {
        // spec.md §8 P7: for any slicing of sequential writes, a full
        // read-back reproduces the original bytes exactly.
        #[test]
        fn p7_round_trip_covers_whole_buffer_for_any_slicing(
            data in prop::collection::vec(any::<u8>(), 0..200),
            cuts in prop::collection::vec(any::<usize>(), 0..8),
            max_memory_bytes in 1u64..64,
        ) {
            let buffer = LobBuffer::new(max_memory_bytes);
            let mut pos = 0u64;
            for piece in chunk(&data, &cuts) {
                if piece.is_empty() {
                    continue;
                }
                let mut writer = buffer.open_write(pos).unwrap();
                writer.write_all(&piece).unwrap();
                pos += piece.len() as u64;
            }

            let mut reader = buffer.open_read().unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            prop_assert_eq!(out, data);
        }

        // spec.md §8 P8: once a buffer has spilled to a tempfile, no
        // subsequent operation ever demotes it back to memory.
        #[test]
        fn p8_promotion_to_tempfile_is_monotone(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..20), 1..10),
            max_memory_bytes in 1u64..40,
        ) {
            let buffer = LobBuffer::new(max_memory_bytes);
            let mut pos = 0u64;
            let mut was_tempfile = false;
            for piece in chunks {
                let mut writer = buffer.open_write(pos).unwrap();
                writer.write_all(&piece).unwrap();
                pos += piece.len() as u64;

                let is_tempfile = buffer.is_tempfile();
                prop_assert!(!was_tempfile || is_tempfile, "tempfile storage must not revert to memory");
                was_tempfile = is_tempfile;
            }
            buffer.truncate(0).unwrap();
            prop_assert!(!was_tempfile || buffer.is_tempfile());
        }

        // spec.md §8 P9: `position` returns the smallest one-based index
        // `i >= start` with `buffer[i-1..i-1+|pattern|) == pattern`, or -1.
        #[test]
        fn p9_pattern_search_matches_naive_scan(
            data in prop::collection::vec(0u8..4, 0..64),
            pattern in prop::collection::vec(0u8..4, 1..5),
            start in 1usize..10,
        ) {
            let buffer = LobBuffer::new(1024);
            if !data.is_empty() {
                let mut writer = buffer.open_write(0).unwrap();
                writer.write_all(&data).unwrap();
            }

            let expected = {
                let start0 = start - 1;
                if start0 >= data.len() || pattern.len() > data.len() {
                    -1i64
                } else {
                    (start0..=data.len().saturating_sub(pattern.len()))
                        .find(|&i| data[i..i + pattern.len()] == pattern[..])
                        .map(|i| (i + 1) as i64)
                        .unwrap_or(-1)
                }
            };

            let actual = buffer.position(&pattern, start as i64).unwrap();
            prop_assert_eq!(actual, expected);
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LOB buffer failure semantics (spec.md §4.A "Failure semantics").

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LobError {
    #[error("position or length out of range")]
    OutOfRange,

    #[error("buffer is closed")]
    Closed,

    #[error("I/O failure: {0}")]
    IoFailed(String),
}

impl From<std::io::Error> for LobError {
    fn from(e: std::io::Error) -> Self {
        if let Some(inner) = e.get_ref() {
            if let Some(lob) = inner.downcast_ref::<LobError>() {
                return lob.clone();
            }
        }
        LobError::IoFailed(e.to_string())
    }
}

impl From<LobError> for std::io::Error {
    fn from(e: LobError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

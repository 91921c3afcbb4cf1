// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and session identifiers.
//!
//! Every task has a [`SessionId`]; every job has a [`JobId`]. Both are
//! globally-unique opaque 128-bit values (spec.md §3 "Job identity").

crate::define_id! {
    /// Unique identifier for a task's session (shared context across sibling jobs).
    pub struct SessionId;
}

crate::define_id! {
    /// Unique identifier for a single job instance.
    pub struct JobId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_display_as_uuid() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn roundtrips_through_string() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn nil_is_distinguishable_default_sentinel() {
        assert!(JobId::nil().is_nil());
        assert!(!JobId::new().is_nil());
    }

    #[test]
    fn serde_roundtrip_is_transparent_string() {
        let id = JobId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}

//! Claim registry for in-flight resolutions
//!
//! Prevents two resolution tasks from searching for the same track of the
//! same catalog at the same time. A claim lives as long as its
//! [`ClaimGuard`]; dropping the guard releases it whether the resolution
//! succeeded, failed or panicked.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::app::models::TrackKey;

type ClaimSet = Arc<Mutex<HashSet<(String, TrackKey)>>>;

/// Status of a claim attempt
#[derive(Debug)]
pub enum ClaimStatus {
    /// The track already has a ledger row
    AlreadyResolved,
    /// Claim acquired; resolve while holding the guard
    Claimed(ClaimGuard),
    /// Another task is resolving this track right now
    ClaimedByOther,
}

impl ClaimStatus {
    /// True if the caller now owns the claim
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimStatus::Claimed(_))
    }
}

/// Registry of claimed `(catalog, key)` pairs
#[derive(Debug, Clone, Default)]
pub struct ClaimRegistry {
    claims: ClaimSet,
}

impl ClaimRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a track; `None` if somebody else holds it
    pub fn try_claim(&self, catalog: &str, key: &TrackKey) -> Option<ClaimGuard> {
        let entry = (catalog.to_string(), key.clone());
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        if !claims.insert(entry.clone()) {
            return None;
        }

        Some(ClaimGuard {
            claims: Arc::clone(&self.claims),
            entry,
            claimed_at: Utc::now(),
        })
    }

    /// True if the track is currently claimed
    pub fn is_claimed(&self, catalog: &str, key: &TrackKey) -> bool {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.contains(&(catalog.to_string(), key.clone()))
    }

    /// Number of live claims
    pub fn active(&self) -> usize {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Ownership of a claim; releases it on drop
#[derive(Debug)]
pub struct ClaimGuard {
    claims: ClaimSet,
    entry: (String, TrackKey),
    claimed_at: DateTime<Utc>,
}

impl ClaimGuard {
    /// Catalog of the claimed track
    pub fn catalog(&self) -> &str {
        &self.entry.0
    }

    /// Key of the claimed track
    pub fn key(&self) -> &TrackKey {
        &self.entry.1
    }

    /// When the claim was taken
    pub fn claimed_at(&self) -> DateTime<Utc> {
        self.claimed_at
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.remove(&self.entry);
    }
}

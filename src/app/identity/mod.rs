//! Network identity rotation
//!
//! Rotating the egress identity affects every in-flight network call of the
//! process, so rotation is funnelled through a single [`IdentityGuard`]
//! shared by the resolver and all download workers. The guard collapses
//! concurrent rotation requests into one actual rotation and enforces a
//! minimum interval between rotations.
//!
//! Callers record [`IdentityGuard::generation`] before a network call and
//! pass it to [`IdentityGuard::rotate_if_stale`] when that call was rate
//! limited. If another caller already rotated since then the request is
//! coalesced instead of rotating again.

pub mod tor;

pub use tor::TorControl;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::identity::MIN_ROTATION_INTERVAL;
use crate::errors::IdentityResult;

/// A capability that obtains a new network egress identity
#[async_trait]
pub trait IdentityRotator: Send + Sync {
    /// Request a new identity; success or failure only
    async fn rotate(&self) -> IdentityResult<()>;
}

/// What a rotation request ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// A new identity was obtained
    Rotated,
    /// Someone else rotated recently; nothing was done
    Coalesced,
    /// No rotator is configured
    Disabled,
    /// The rotator reported an error (logged, not fatal)
    Failed,
}

/// Counters for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationStats {
    pub rotations: u64,
    pub coalesced: u64,
    pub failures: u64,
}

/// Single-flight, rate-limited front for an [`IdentityRotator`]
pub struct IdentityGuard {
    rotator: Option<Arc<dyn IdentityRotator>>,
    min_interval: Duration,
    generation: AtomicU64,
    last_rotation: Mutex<Option<Instant>>,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

impl IdentityGuard {
    /// Guard a rotator with the default minimum interval
    pub fn new(rotator: Arc<dyn IdentityRotator>) -> Self {
        Self::with_min_interval(rotator, MIN_ROTATION_INTERVAL)
    }

    /// Guard a rotator with an explicit minimum interval
    pub fn with_min_interval(rotator: Arc<dyn IdentityRotator>, min_interval: Duration) -> Self {
        Self {
            rotator: Some(rotator),
            min_interval,
            generation: AtomicU64::new(0),
            last_rotation: Mutex::new(None),
            coalesced: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// A guard that never rotates
    pub fn disabled() -> Self {
        Self {
            rotator: None,
            min_interval: Duration::ZERO,
            generation: AtomicU64::new(0),
            last_rotation: Mutex::new(None),
            coalesced: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// True if a rotator is configured
    pub fn is_enabled(&self) -> bool {
        self.rotator.is_some()
    }

    /// Number of successful rotations so far; read before a network call
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Rotate unless somebody already did since `observed_generation` or
    /// the last rotation is more recent than the minimum interval
    pub async fn rotate_if_stale(&self, observed_generation: u64) -> RotationOutcome {
        let Some(rotator) = &self.rotator else {
            return RotationOutcome::Disabled;
        };

        // Holding the lock across the rotation makes concurrent callers wait
        // and then see the new generation.
        let mut last_rotation = self.last_rotation.lock().await;

        if self.generation() != observed_generation {
            debug!("Identity already rotated by another caller");
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return RotationOutcome::Coalesced;
        }

        if let Some(last) = *last_rotation {
            if last.elapsed() < self.min_interval {
                debug!(
                    "Identity rotated {:?} ago, below minimum interval {:?}",
                    last.elapsed(),
                    self.min_interval
                );
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                return RotationOutcome::Coalesced;
            }
        }

        match rotator.rotate().await {
            Ok(()) => {
                *last_rotation = Some(Instant::now());
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!("Network identity rotated (generation {})", generation);
                RotationOutcome::Rotated
            }
            Err(e) => {
                warn!("Identity rotation failed, continuing without it: {}", e);
                self.failures.fetch_add(1, Ordering::Relaxed);
                RotationOutcome::Failed
            }
        }
    }

    /// Counters so far
    pub fn stats(&self) -> RotationStats {
        RotationStats {
            rotations: self.generation(),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for IdentityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityGuard")
            .field("enabled", &self.is_enabled())
            .field("min_interval", &self.min_interval)
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IdentityError;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingRotator {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl IdentityRotator for CountingRotator {
        async fn rotate(&self) -> IdentityResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(IdentityError::Rejected {
                    reply: "515 Authentication failed".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_collapse_into_one_rotation() {
        let rotator = Arc::new(CountingRotator::default());
        let guard = Arc::new(IdentityGuard::with_min_interval(rotator.clone(), Duration::ZERO));

        let observed = guard.generation();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move { guard.rotate_if_stale(observed).await })
            })
            .collect();

        let mut rotated = 0;
        for handle in handles {
            if handle.await.unwrap() == RotationOutcome::Rotated {
                rotated += 1;
            }
        }

        assert_eq!(rotated, 1);
        assert_eq!(rotator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.stats().coalesced, 4);
    }

    #[tokio::test]
    async fn test_sequential_requests_rotate_each_time() {
        let rotator = Arc::new(CountingRotator::default());
        let guard = IdentityGuard::with_min_interval(rotator.clone(), Duration::ZERO);

        assert_eq!(guard.rotate_if_stale(guard.generation()).await, RotationOutcome::Rotated);
        assert_eq!(guard.rotate_if_stale(guard.generation()).await, RotationOutcome::Rotated);
        assert_eq!(rotator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(guard.generation(), 2);
    }

    #[tokio::test]
    async fn test_min_interval_limits_rotation_rate() {
        let rotator = Arc::new(CountingRotator::default());
        let guard = IdentityGuard::with_min_interval(rotator.clone(), Duration::from_secs(60));

        assert_eq!(guard.rotate_if_stale(0).await, RotationOutcome::Rotated);
        assert_eq!(guard.rotate_if_stale(1).await, RotationOutcome::Coalesced);
        assert_eq!(rotator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_fatal() {
        let rotator = Arc::new(CountingRotator {
            fail: true,
            ..Default::default()
        });
        let guard = IdentityGuard::with_min_interval(rotator, Duration::ZERO);

        assert_eq!(guard.rotate_if_stale(0).await, RotationOutcome::Failed);
        assert_eq!(guard.generation(), 0);
        assert_eq!(guard.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_disabled_guard() {
        let guard = IdentityGuard::disabled();
        assert!(!guard.is_enabled());
        assert_eq!(guard.rotate_if_stale(0).await, RotationOutcome::Disabled);
    }
}

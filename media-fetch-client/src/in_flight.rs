use crate::cache::ResourceKey;
use crate::utils::deadline;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strum_macros::Display;

/// Configuration for the in-flight guard
#[derive(Clone, Debug)]
pub struct InFlightConfig {
    /// Hard expiry of an in-progress marker, whether or not it is released
    pub in_progress_expiry: Duration,
}

impl Default for InFlightConfig {
    fn default() -> Self {
        Self {
            in_progress_expiry: Duration::minutes(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum MarkerState {
    InProgress,
    Cooldown,
}

/// How a marker is released
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// Remove the marker immediately
    Clear,
    /// Keep the key blocked for the cooldown recorded at acquisition
    Cooldown,
}

#[derive(Clone, Debug)]
pub struct InFlightMarker {
    pub state: MarkerState,
    pub expires_at: DateTime<Utc>,
    cooldown: Option<Duration>,
    token: u64,
}

impl InFlightMarker {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Returned when a key is already held
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Occupied {
    pub state: MarkerState,
    pub expires_at: DateTime<Utc>,
}

impl Occupied {
    /// Time until the blocking marker expires, at least one second
    pub fn retry_after(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::seconds(1))
    }
}

/// Per-key mutual exclusion with optional cooldown.
///
/// A key is held by at most one fetch at a time. Acquisition is a single
/// check-and-set on the map entry, so a concurrent second request observes
/// the marker instead of queuing behind it.
pub struct InFlightGuard {
    markers: DashMap<ResourceKey, InFlightMarker>,
    next_token: AtomicU64,
    config: InFlightConfig,
}

impl InFlightGuard {
    pub fn new(config: InFlightConfig) -> Self {
        Self {
            markers: DashMap::new(),
            next_token: AtomicU64::new(1),
            config,
        }
    }

    fn claim(&self, key: &ResourceKey, cooldown: Option<Duration>) -> Result<u64, Occupied> {
        let now = Utc::now();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let marker = InFlightMarker {
            state: MarkerState::InProgress,
            expires_at: deadline(now, self.config.in_progress_expiry),
            cooldown: cooldown.filter(|cooldown| *cooldown > Duration::zero()),
            token,
        };

        match self.markers.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    log::debug!("Replacing expired {} marker for key: {}", entry.get().state, key);
                    entry.insert(marker);
                    Ok(token)
                } else {
                    let current = entry.get();
                    Err(Occupied {
                        state: current.state,
                        expires_at: current.expires_at,
                    })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(marker);
                Ok(token)
            }
        }
    }

    /// Atomically mark `key` as in progress. Returns false if it is already
    /// in progress or cooling down.
    pub fn try_acquire(&self, key: &ResourceKey, cooldown: Option<Duration>) -> bool {
        self.claim(key, cooldown).is_ok()
    }

    /// Like [`try_acquire`](Self::try_acquire), but hands out a permit that
    /// clears the marker when dropped, and reports what blocked a failed attempt.
    pub fn acquire(
        self: &Arc<Self>,
        key: &ResourceKey,
        cooldown: Option<Duration>,
    ) -> Result<InFlightPermit, Occupied> {
        let token = self.claim(key, cooldown)?;
        log::debug!("Acquired in-flight marker for key: {}", key);
        Ok(InFlightPermit {
            guard: Arc::clone(self),
            key: key.clone(),
            token,
            released: false,
        })
    }

    /// Release whatever in-progress marker holds `key`
    pub fn release(&self, key: &ResourceKey, release: Release) {
        let token = match self.markers.get(key) {
            Some(marker) if marker.state == MarkerState::InProgress => marker.token,
            _ => return,
        };
        self.release_token(key, token, release);
    }

    fn release_token(&self, key: &ResourceKey, token: u64, release: Release) {
        if release == Release::Cooldown {
            if let Some(mut marker) = self.markers.get_mut(key) {
                if marker.token != token {
                    return;
                }
                if let Some(cooldown) = marker.cooldown {
                    marker.state = MarkerState::Cooldown;
                    marker.expires_at = deadline(Utc::now(), cooldown);
                    log::debug!("Key {} cooling down for {}s", key, cooldown.num_seconds());
                    return;
                }
            }
        }

        if self
            .markers
            .remove_if(key, |_, marker| marker.token == token)
            .is_some()
        {
            log::debug!("Released in-flight marker for key: {}", key);
        }
    }

    /// Current state of `key`, ignoring expired markers
    pub fn state(&self, key: &ResourceKey) -> Option<MarkerState> {
        let now = Utc::now();
        self.markers
            .get(key)
            .filter(|marker| !marker.is_expired(now))
            .map(|marker| marker.state)
    }

    /// Remove markers past their hard expiry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.markers.len();
        self.markers.retain(|key, marker| {
            let keep = !marker.is_expired(now);
            if !keep && marker.state == MarkerState::InProgress {
                log::warn!("In-flight marker for key {} expired without release", key);
            }
            keep
        });
        let purged = before.saturating_sub(self.markers.len());
        log::debug!("Purged {} expired in-flight markers", purged);
        purged
    }

    /// Get statistics about held keys
    pub fn stats(&self) -> GuardStats {
        let now = Utc::now();
        let mut stats = GuardStats::default();
        for marker in self.markers.iter() {
            if marker.is_expired(now) {
                continue;
            }
            match marker.state {
                MarkerState::InProgress => stats.in_progress += 1,
                MarkerState::Cooldown => stats.cooling_down += 1,
            }
        }
        stats
    }

    /// Clear all markers
    pub fn clear(&self) {
        self.markers.clear();
        log::info!("In-flight guard cleared");
    }
}

/// Statistics for the in-flight guard
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct GuardStats {
    pub in_progress: usize,
    pub cooling_down: usize,
}

/// Holds an in-progress marker. Dropping it without calling
/// [`complete`](Self::complete) clears the marker.
#[derive(Debug)]
pub struct InFlightPermit {
    guard: SharedInFlightGuard,
    key: ResourceKey,
    token: u64,
    released: bool,
}

impl InFlightPermit {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Release after a successful fetch, entering cooldown when one was requested
    pub fn complete(mut self) {
        self.released = true;
        self.guard.release_token(&self.key, self.token, Release::Cooldown);
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        if !self.released {
            self.guard.release_token(&self.key, self.token, Release::Clear);
        }
    }
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("markers", &self.markers.len())
            .finish()
    }
}

/// Thread-safe wrapper for the guard
pub type SharedInFlightGuard = Arc<InFlightGuard>;

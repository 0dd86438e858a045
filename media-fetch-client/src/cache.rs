use crate::media::{DownloadRecord, VideoInfo};
use crate::utils::deadline;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// Configuration for the result cache
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// How long an entry stays valid after it was stored
    pub ttl: Duration,
    /// Maximum number of cached entries
    pub max_entries: usize,
    /// How often the background sweeper runs
    pub sweep_interval: Duration,
    /// Whether caching is enabled
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            max_entries: 100,
            sweep_interval: Duration::minutes(5),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(ttl: Duration, max_entries: usize, sweep_interval: Duration) -> Self {
        Self {
            ttl,
            max_entries,
            sweep_interval,
            enabled: true,
        }
    }
}

/// Key shared by the result cache and the in-flight guard
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum ResourceKey {
    VideoInfo(String), // Hash of the normalized url
    Download(String),  // Hash of the normalized url
}

impl ResourceKey {
    const VIDEO_INFO: &'static str = "video-info";
    const DOWNLOAD: &'static str = "download";

    /// Key for a metadata lookup of `url`
    pub fn video_info(url: &str) -> Self {
        ResourceKey::VideoInfo(Self::digest(Self::VIDEO_INFO, url))
    }

    /// Key for a media download of `url`
    pub fn download(url: &str) -> Self {
        ResourceKey::Download(Self::digest(Self::DOWNLOAD, url))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ResourceKey::VideoInfo(_) => Self::VIDEO_INFO,
            ResourceKey::Download(_) => Self::DOWNLOAD,
        }
    }

    fn digest(operation: &str, url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        // Separator keeps "a" + "bc" and "ab" + "c" apart
        hasher.update([0u8]);
        hasher.update(normalize_url(url).as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = match self {
            ResourceKey::VideoInfo(hash) | ResourceKey::Download(hash) => hash,
        };
        write!(f, "{}:{}", self.operation(), &hash[..hash.len().min(12)])
    }
}

/// Canonical form of a user supplied url.
///
/// Absolute urls are re-serialized so that scheme and host casing or a missing
/// root path do not produce distinct keys. Anything else is only trimmed.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Typed value stored in the cache, one variant per operation
#[derive(Clone, Debug, PartialEq)]
pub enum CachedValue {
    VideoInfo(VideoInfo),
    Download(DownloadRecord),
}

/// Cached value with its creation metadata
#[derive(Clone, Debug)]
pub struct CachedResult {
    pub value: CachedValue,
    pub created_at: DateTime<Utc>,
    sequence: u64,
}

impl CachedResult {
    fn new(value: CachedValue, sequence: u64) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            sequence,
        }
    }

    /// Check if the cached result is still valid
    pub fn is_valid(&self, ttl: Duration) -> bool {
        Utc::now() < deadline(self.created_at, ttl)
    }

    fn age_rank(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// What a single sweep removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub trimmed: usize,
}

/// In-memory result cache using DashMap for thread safety.
///
/// Expiry and capacity eviction are both driven by creation time; reads never
/// refresh an entry.
pub struct ResultCache {
    cache: DashMap<ResourceKey, CachedResult>,
    sequence: AtomicU64,
    pub config: CacheConfig,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: DashMap::new(),
            sequence: AtomicU64::new(0),
            config,
        }
    }

    fn capacity(&self) -> usize {
        self.config.max_entries.max(1)
    }

    /// Get cached value if available and valid
    pub fn get(&self, key: &ResourceKey) -> Option<CachedValue> {
        if !self.config.enabled {
            return None;
        }

        let fresh = match self.cache.get(key) {
            Some(cached) if cached.is_valid(self.config.ttl) => Some(cached.value.clone()),
            Some(_) => None,
            None => {
                log::debug!("Cache miss for key: {}", key);
                return None;
            }
        };

        if fresh.is_some() {
            log::debug!("Cache hit for key: {}", key);
        } else {
            log::debug!("Cache expired for key: {}", key);
            let ttl = self.config.ttl;
            self.cache.remove_if(key, |_, cached| !cached.is_valid(ttl));
        }
        fresh
    }

    /// Store value in cache, replacing any previous value for the key
    pub fn put(&self, key: ResourceKey, value: CachedValue) {
        if !self.config.enabled {
            return;
        }

        self.cache.remove(&key);

        while self.cache.len() >= self.capacity() {
            if !self.evict_oldest() {
                break;
            }
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        log::debug!("Stored in cache with key: {}", key);
        self.cache.insert(key, CachedResult::new(value, sequence));
    }

    /// Remove expired entries from cache
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let expired_keys: Vec<_> = self
            .cache
            .iter()
            .filter(|entry| !entry.value().is_valid(ttl))
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired_count = 0;
        for key in expired_keys {
            if self.cache.remove_if(&key, |_, cached| !cached.is_valid(ttl)).is_some() {
                expired_count += 1;
            }
        }

        log::debug!("Evicted {} expired cache entries", expired_count);
        expired_count
    }

    /// Remove the single oldest entry. Returns false when the cache is empty.
    fn evict_oldest(&self) -> bool {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().age_rank())
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                self.cache.remove(&key);
                log::debug!("Evicted oldest cache entry: {}", key);
                true
            }
            None => false,
        }
    }

    /// Trim the cache down to its capacity, oldest entries first
    fn trim_to_capacity(&self) -> usize {
        let excess = self.cache.len().saturating_sub(self.capacity());
        if excess == 0 {
            return 0;
        }

        let mut entries: Vec<_> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().age_rank()))
            .collect();
        entries.sort_by_key(|(_, rank)| *rank);

        let mut trimmed = 0;
        for (key, _) in entries.into_iter().take(excess) {
            if self.cache.remove(&key).is_some() {
                trimmed += 1;
            }
        }
        log::debug!("Trimmed {} cache entries over capacity", trimmed);
        trimmed
    }

    /// One maintenance pass: drop expired entries, then enforce capacity
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            expired: self.evict_expired(),
            trimmed: self.trim_to_capacity(),
        }
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.cache.clear();
        log::info!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let ttl = self.config.ttl;
        let total_entries = self.cache.len();
        let expired_entries = self
            .cache
            .iter()
            .filter(|entry| !entry.value().is_valid(ttl))
            .count();

        CacheStats {
            total_entries,
            valid_entries: total_entries.saturating_sub(expired_entries),
            expired_entries,
            max_entries: self.config.max_entries,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
}

/// Thread-safe wrapper for the cache
pub type SharedResultCache = Arc<ResultCache>;

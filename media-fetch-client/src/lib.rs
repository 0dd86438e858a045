pub mod cache;
pub mod download;
pub mod duration_gate;
mod error;
pub mod in_flight;
mod media;
pub mod progress;
pub mod resolver;
pub mod sweeper;
pub mod utils;

#[cfg(test)]
mod tests;

use cache::{CacheConfig, CachedValue, ResourceKey, ResultCache, SharedResultCache};
use chrono::Duration;
use download::{ActiveDownload, MediaBody};
use in_flight::{InFlightConfig, InFlightGuard, MarkerState, SharedInFlightGuard};
use progress::{ProgressBoard, ProgressSink, ProgressState, ProgressTracker, ProgressUpdate};
use resolver::yt_dlp::YtDlp;
use resolver::{MediaResolver, ResolutionError, SharedResolver};
use std::sync::Arc;
use sweeper::Sweeper;

// Re-export the public surface
pub use cache::CacheStats;
pub use download::MediaDownload;
pub use error::{Error, ErrorKind};
pub use in_flight::GuardStats;
pub use media::{DownloadRecord, MediaMetadata, VideoInfo};

/// Orchestration settings
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Longest accepted media duration
    pub max_duration_seconds: u64,
    /// Upper bound on a single metadata resolution
    pub resolver_timeout: Duration,
    /// How long a key stays blocked after a completed download, if at all
    pub download_cooldown: Option<Duration>,
    pub cache: CacheConfig,
    pub in_flight: InFlightConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_duration_seconds: duration_gate::DEFAULT_MAX_DURATION_SECONDS,
            resolver_timeout: Duration::seconds(10),
            download_cooldown: Some(Duration::seconds(60)),
            cache: CacheConfig::default(),
            in_flight: InFlightConfig::default(),
        }
    }
}

/// Answers metadata and media requests, consulting the result cache and the
/// in-flight guard before doing any upstream work.
#[derive(Clone)]
pub struct MediaClient {
    resolver: SharedResolver,
    cache: SharedResultCache,
    guard: SharedInFlightGuard,
    progress: Arc<ProgressBoard>,
    config: FetchConfig,
}

impl MediaClient {
    /// Create a client backed by `yt-dlp` on the `PATH`
    pub fn new(config: FetchConfig) -> Self {
        Self::with_resolver(config, Arc::new(YtDlp::default()))
    }

    pub fn with_resolver(config: FetchConfig, resolver: SharedResolver) -> Self {
        Self {
            resolver,
            cache: Arc::new(ResultCache::new(config.cache.clone())),
            guard: Arc::new(InFlightGuard::new(config.in_flight.clone())),
            progress: Arc::new(ProgressBoard::new()),
            config,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedResultCache {
        &self.cache
    }

    pub fn guard(&self) -> &SharedInFlightGuard {
        &self.guard
    }

    /// Metadata for `url`, served from cache when possible
    pub async fn get_metadata(&self, url: &str) -> Result<VideoInfo, Error> {
        let url = checked_url(url)?;
        let key = ResourceKey::video_info(url);

        if let Some(CachedValue::VideoInfo(info)) = self.cache.get(&key) {
            log::info!("Returning cached video info for url: {}", url);
            return Ok(info);
        }

        let metadata = self
            .resolve(url)
            .await
            .map_err(Error::UpstreamUnavailable)?;
        let valid = duration_gate::check(&metadata, self.config.max_duration_seconds);
        let info = VideoInfo::new(metadata, valid);

        self.cache.put(key, CachedValue::VideoInfo(info.clone()));
        Ok(info)
    }

    /// Start a download of `url`.
    ///
    /// The in-flight marker for the url is held until the returned body is
    /// fully consumed, fails, or is dropped.
    pub async fn fetch_media(&self, url: &str) -> Result<MediaDownload, Error> {
        let url = checked_url(url)?;
        let key = ResourceKey::download(url);

        let permit = self
            .guard
            .acquire(&key, self.config.download_cooldown)
            .map_err(|occupied| match occupied.state {
                MarkerState::Cooldown => {
                    log::info!("Download of {} rejected, key {} is cooling down", url, key);
                    Error::TooManyRequests {
                        retry_after_secs: occupied.retry_after().num_seconds().max(1) as u64,
                    }
                }
                MarkerState::InProgress => {
                    log::info!("Download of {} rejected, key {} is in progress", url, key);
                    Error::Conflict
                }
            })?;

        let tracker = ProgressTracker::new();
        let registration = self.progress.register(key.clone(), &tracker);

        let metadata = match self.resolve(url).await {
            Ok(metadata) => metadata,
            Err(err) => {
                tracker.report(ProgressUpdate::Failed(err.to_string()));
                return Err(Error::TransferFailed(err));
            }
        };

        if !duration_gate::check(&metadata, self.config.max_duration_seconds) {
            let error = Error::PolicyViolation {
                duration_seconds: metadata.duration_seconds().unwrap_or_default(),
                max_seconds: self.config.max_duration_seconds,
            };
            tracker.report(ProgressUpdate::Failed(error.to_string()));
            return Err(error);
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(tracker.clone());
        let transfer = match self.resolver.transfer(url, &metadata, sink).await {
            Ok(transfer) => transfer,
            Err(err) => {
                tracker.report(ProgressUpdate::Failed(err.to_string()));
                return Err(Error::TransferFailed(err));
            }
        };

        let extension = transfer
            .extension
            .clone()
            .unwrap_or_else(|| metadata.extension().clone());
        let filename = utils::suggested_filename(metadata.title(), &extension);
        let content_type = utils::content_type_for(&extension).to_string();
        log::info!("Streaming {} as {:?}", url, filename);

        let record = DownloadRecord::new(metadata.clone(), filename.clone(), content_type.clone(), 0);
        let progress = tracker.subscribe();
        let active = ActiveDownload::new(registration, permit, tracker, self.cache.clone(), record);

        Ok(MediaDownload::new(
            metadata,
            filename,
            content_type,
            progress,
            MediaBody::new(transfer.body, active),
        ))
    }

    /// Progress of an active download of `url`
    pub fn progress(&self, url: &str) -> Option<ProgressState> {
        self.progress.snapshot(&ResourceKey::download(url))
    }

    async fn resolve(&self, url: &str) -> Result<MediaMetadata, ResolutionError> {
        let timeout = self
            .config
            .resolver_timeout
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(10));
        match tokio::time::timeout(timeout, self.resolver.resolve(url)).await {
            Ok(result) => result.inspect_err(|err| log::warn!("Resolving {} failed: {}", url, err)),
            Err(_) => {
                log::warn!("Resolving {} timed out after {:?}", url, timeout);
                Err(ResolutionError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Start the background sweeper for this client's cache and guard
    pub fn start_sweeper(&self) -> Sweeper {
        let period = self
            .config
            .cache
            .sweep_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(300));
        Sweeper::spawn(self.cache.clone(), self.guard.clone(), period)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn guard_stats(&self) -> GuardStats {
        self.guard.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn checked_url(url: &str) -> Result<&str, Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    Ok(trimmed)
}

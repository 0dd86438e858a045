use crate::cache::{CacheConfig, CachedValue, ResourceKey};
use crate::in_flight::{InFlightConfig, MarkerState};
use crate::progress::{ProgressSink, ProgressStatus, ProgressUpdate};
use crate::resolver::{MediaResolver, MediaTransfer, ResolutionError};
use crate::{Error, FetchConfig, MediaClient, MediaMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use futures::{stream, StreamExt, TryStreamExt};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const URL: &str = "https://example/video";

struct MockResolver {
    duration: Option<f64>,
    resolve_delay: Option<StdDuration>,
    fail_resolve: bool,
    fail_mid_stream: bool,
    resolve_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
}

impl MockResolver {
    fn with_duration(duration: Option<f64>) -> Self {
        Self {
            duration,
            resolve_delay: None,
            fail_resolve: false,
            fail_mid_stream: false,
            resolve_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
        }
    }

    fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for MockResolver {
    async fn resolve(&self, _url: &str) -> Result<MediaMetadata, ResolutionError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_resolve {
            return Err(ResolutionError::Failed("ERROR: Unsupported URL".to_string()));
        }
        Ok(MediaMetadata::new(
            "Test clip".to_string(),
            self.duration,
            Some("https://example/thumb.jpg".to_string()),
            "18 - 640x360".to_string(),
            "mp4".to_string(),
        ))
    }

    async fn transfer(
        &self,
        _url: &str,
        _metadata: &MediaMetadata,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MediaTransfer, ResolutionError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        progress.report(ProgressUpdate::Downloading {
            percent: 50.0,
            speed: Some("1.00MiB/s".to_string()),
            eta: Some("00:01".to_string()),
        });

        let mut chunks: Vec<io::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        if self.fail_mid_stream {
            chunks.push(Err(io::Error::other("connection reset")));
        }
        Ok(MediaTransfer::new(stream::iter(chunks).boxed()))
    }
}

fn client(resolver: Arc<MockResolver>, cooldown: Option<Duration>) -> MediaClient {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = FetchConfig {
        download_cooldown: cooldown,
        resolver_timeout: Duration::milliseconds(200),
        cache: CacheConfig::new(Duration::minutes(5), 100, Duration::minutes(5)),
        ..FetchConfig::default()
    };
    MediaClient::with_resolver(config, resolver)
}

async fn collect(download: crate::MediaDownload) -> io::Result<Vec<u8>> {
    let chunks: Vec<Bytes> = download.into_body().try_collect().await?;
    Ok(chunks.concat())
}

#[tokio::test]
async fn test_get_metadata_is_cached() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), None);

    let first = client.get_metadata(URL).await.unwrap();
    let second = client.get_metadata(URL).await.unwrap();

    assert_eq!(first, second);
    assert!(first.valid());
    assert_eq!(first.metadata().title(), "Test clip");
    assert_eq!(resolver.resolve_calls(), 1);
}

#[tokio::test]
async fn test_get_metadata_reports_invalid_duration() {
    let resolver = Arc::new(MockResolver::with_duration(Some(300.0)));
    let client = client(resolver, None);

    let info = client.get_metadata(URL).await.unwrap();
    assert!(!info.valid());
}

#[tokio::test]
async fn test_get_metadata_upstream_failure() {
    let mut mock = MockResolver::with_duration(Some(60.0));
    mock.fail_resolve = true;
    let client = client(Arc::new(mock), None);

    let err = client.get_metadata(URL).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
    // Failures are not cached
    assert!(client.cache().get(&ResourceKey::video_info(URL)).is_none());
}

#[tokio::test]
async fn test_get_metadata_times_out() {
    let mut mock = MockResolver::with_duration(Some(60.0));
    mock.resolve_delay = Some(StdDuration::from_secs(5));
    let client = client(Arc::new(mock), None);

    let started = std::time::Instant::now();
    let err = client.get_metadata(URL).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(ResolutionError::Timeout(_))));
    assert!(started.elapsed() < StdDuration::from_secs(2));
}

#[tokio::test]
async fn test_empty_url_rejected() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), None);

    assert!(matches!(client.get_metadata("  ").await, Err(Error::InvalidUrl(_))));
    assert!(matches!(client.fetch_media("").await, Err(Error::InvalidUrl(_))));
    assert_eq!(resolver.resolve_calls(), 0);
}

#[tokio::test]
async fn test_fetch_media_success() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), None);
    let key = ResourceKey::download(URL);

    let download = client.fetch_media(URL).await.unwrap();
    assert_eq!(client.guard().state(&key), Some(MarkerState::InProgress));
    assert_eq!(download.filename(), "Test clip.mp4");
    assert_eq!(download.content_type(), "video/mp4");
    let progress = download.progress();

    let body = collect(download).await.unwrap();
    assert_eq!(body, b"hello world");
    assert_eq!(resolver.transfer_calls(), 1);

    // Released on success, and the record is cached under the url's key
    assert_eq!(client.guard().state(&key), None);
    match client.cache().get(&key) {
        Some(CachedValue::Download(record)) => {
            assert_eq!(record.bytes(), 11);
            assert_eq!(record.filename(), "Test clip.mp4");
        }
        other => panic!("unexpected cache entry: {:?}", other),
    }

    let state = progress.borrow().clone();
    assert_eq!(state.status, ProgressStatus::Completed);
    assert_eq!(state.percent, 100.0);
    assert!(client.progress(URL).is_none());
}

#[tokio::test]
async fn test_fetch_media_conflict_while_in_progress() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), None);

    let download = client.fetch_media(URL).await.unwrap();
    let progress = client.progress(URL).unwrap();
    assert_eq!(progress.status, ProgressStatus::Downloading);
    assert_eq!(progress.percent, 50.0);

    let err = client.fetch_media(URL).await.unwrap_err();
    assert!(matches!(err, Error::Conflict));
    assert_eq!(resolver.resolve_calls(), 1);

    collect(download).await.unwrap();
    // Without cooldown the url can be fetched again right away
    let again = client.fetch_media(URL).await.unwrap();
    collect(again).await.unwrap();
    assert_eq!(resolver.transfer_calls(), 2);
}

#[tokio::test]
async fn test_fetch_media_cooldown() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), Some(Duration::seconds(60)));

    let download = client.fetch_media(URL).await.unwrap();
    collect(download).await.unwrap();

    let err = client.fetch_media(URL).await.unwrap_err();
    match err {
        Error::TooManyRequests { retry_after_secs } => {
            assert!(retry_after_secs > 50 && retry_after_secs <= 60)
        }
        other => panic!("expected TooManyRequests, got {:?}", other),
    }
    assert_eq!(resolver.resolve_calls(), 1);
    assert_eq!(
        client.guard().state(&ResourceKey::download(URL)),
        Some(MarkerState::Cooldown)
    );
}

#[tokio::test]
async fn test_fetch_media_cooldown_expires() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), Some(Duration::milliseconds(50)));

    collect(client.fetch_media(URL).await.unwrap()).await.unwrap();
    assert!(matches!(
        client.fetch_media(URL).await,
        Err(Error::TooManyRequests { .. })
    ));

    tokio::time::sleep(StdDuration::from_millis(80)).await;
    collect(client.fetch_media(URL).await.unwrap()).await.unwrap();
    assert_eq!(resolver.transfer_calls(), 2);
}

#[tokio::test]
async fn test_fetch_media_policy_violation() {
    let resolver = Arc::new(MockResolver::with_duration(Some(300.0)));
    let client = client(resolver.clone(), Some(Duration::seconds(60)));

    let err = client.fetch_media(URL).await.unwrap_err();
    match err {
        Error::PolicyViolation {
            duration_seconds,
            max_seconds,
        } => {
            assert_eq!(duration_seconds, 300.0);
            assert_eq!(max_seconds, 120);
        }
        other => panic!("expected PolicyViolation, got {:?}", other),
    }
    assert_eq!(resolver.transfer_calls(), 0);
    // Released without cooldown
    assert_eq!(client.guard().state(&ResourceKey::download(URL)), None);
    assert!(client.progress(URL).is_none());
}

#[tokio::test]
async fn test_fetch_media_unknown_duration_accepted() {
    let resolver = Arc::new(MockResolver::with_duration(None));
    let client = client(resolver.clone(), None);

    let body = collect(client.fetch_media(URL).await.unwrap()).await.unwrap();
    assert_eq!(body, b"hello world");
}

#[tokio::test]
async fn test_fetch_media_resolve_failure() {
    let mut mock = MockResolver::with_duration(Some(60.0));
    mock.fail_resolve = true;
    let resolver = Arc::new(mock);
    let client = client(resolver.clone(), Some(Duration::seconds(60)));

    let err = client.fetch_media(URL).await.unwrap_err();
    assert!(matches!(err, Error::TransferFailed(_)));
    assert_eq!(resolver.transfer_calls(), 0);
    assert_eq!(client.guard().state(&ResourceKey::download(URL)), None);
}

#[tokio::test]
async fn test_fetch_media_mid_stream_failure_releases_guard() {
    let mut mock = MockResolver::with_duration(Some(60.0));
    mock.fail_mid_stream = true;
    let client = client(Arc::new(mock), Some(Duration::seconds(60)));
    let key = ResourceKey::download(URL);

    let download = client.fetch_media(URL).await.unwrap();
    let progress = download.progress();
    assert!(collect(download).await.is_err());

    assert_eq!(client.guard().state(&key), None);
    assert!(client.cache().get(&key).is_none());
    assert_eq!(progress.borrow().status, ProgressStatus::Error);
}

#[tokio::test]
async fn test_dropped_body_releases_guard() {
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let client = client(resolver.clone(), Some(Duration::seconds(60)));
    let key = ResourceKey::download(URL);

    let download = client.fetch_media(URL).await.unwrap();
    let mut body = download.into_body();
    assert!(body.next().await.is_some());
    drop(body);

    assert_eq!(client.guard().state(&key), None);
    assert!(client.fetch_media(URL).await.is_ok());
}

#[tokio::test]
async fn test_fetch_media_resolve_timeout_releases_guard() {
    let mut mock = MockResolver::with_duration(Some(60.0));
    mock.resolve_delay = Some(StdDuration::from_secs(5));
    let resolver = Arc::new(mock);
    let client = client(resolver.clone(), Some(Duration::seconds(60)));

    let started = std::time::Instant::now();
    let err = client.fetch_media(URL).await.unwrap_err();
    assert!(matches!(err, Error::TransferFailed(ResolutionError::Timeout(_))));
    assert!(started.elapsed() < StdDuration::from_secs(2));

    assert_eq!(resolver.transfer_calls(), 0);
    assert_eq!(client.guard().state(&ResourceKey::download(URL)), None);
    assert!(client.progress(URL).is_none());
}

#[tokio::test]
async fn test_stale_download_keeps_newer_progress() {
    let _ = env_logger::builder().is_test(true).try_init();
    let resolver = Arc::new(MockResolver::with_duration(Some(60.0)));
    let config = FetchConfig {
        download_cooldown: None,
        in_flight: InFlightConfig {
            in_progress_expiry: Duration::milliseconds(20),
        },
        ..FetchConfig::default()
    };
    let client = MediaClient::with_resolver(config, resolver);

    let stale = client.fetch_media(URL).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(40)).await;

    // The stale marker has expired, so a second download takes over the key
    let fresh = client.fetch_media(URL).await.unwrap();
    assert!(client.progress(URL).is_some());

    drop(stale);
    let progress = client.progress(URL).unwrap();
    assert_eq!(progress.status, ProgressStatus::Downloading);

    collect(fresh).await.unwrap();
    assert!(client.progress(URL).is_none());
}

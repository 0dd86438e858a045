use crate::cache::{CachedValue, ResourceKey, SharedResultCache};
use crate::in_flight::InFlightPermit;
use crate::media::{DownloadRecord, MediaMetadata};
use crate::progress::{ProgressRegistration, ProgressSink, ProgressState, ProgressTracker, ProgressUpdate};
use crate::resolver::MediaStream;
use bytes::Bytes;
use bytesize::ByteSize;
use futures::{Stream, StreamExt};
use getset::Getters;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::watch;

/// A started media download, ready to be streamed to the caller
#[derive(Getters)]
#[get = "pub"]
pub struct MediaDownload {
    metadata: MediaMetadata,
    filename: String,
    content_type: String,
    #[getset(skip)]
    progress: watch::Receiver<ProgressState>,
    #[getset(skip)]
    body: MediaBody,
}

impl MediaDownload {
    pub(crate) fn new(
        metadata: MediaMetadata,
        filename: String,
        content_type: String,
        progress: watch::Receiver<ProgressState>,
        body: MediaBody,
    ) -> Self {
        Self {
            metadata,
            filename,
            content_type,
            progress,
            body,
        }
    }

    /// Live progress of this download
    pub fn progress(&self) -> watch::Receiver<ProgressState> {
        self.progress.clone()
    }

    pub fn into_body(self) -> MediaBody {
        self.body
    }
}

impl std::fmt::Debug for MediaDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownload")
            .field("metadata", &self.metadata)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Bookkeeping that lives exactly as long as the transfer
pub(crate) struct ActiveDownload {
    // Dropped before the permit, so the key is never free while this
    // download still owns its progress entry
    registration: Option<ProgressRegistration>,
    permit: InFlightPermit,
    tracker: ProgressTracker,
    cache: SharedResultCache,
    record: Option<DownloadRecord>,
    bytes: u64,
    started: Instant,
}

impl ActiveDownload {
    pub(crate) fn new(
        registration: ProgressRegistration,
        permit: InFlightPermit,
        tracker: ProgressTracker,
        cache: SharedResultCache,
        record: DownloadRecord,
    ) -> Self {
        Self {
            registration: Some(registration),
            permit,
            tracker,
            cache,
            record: Some(record),
            bytes: 0,
            started: Instant::now(),
        }
    }

    fn key(&self) -> &ResourceKey {
        self.permit.key()
    }

    fn finish(mut self) {
        self.tracker.report(ProgressUpdate::Completed);
        let key = self.key().clone();
        if let Some(record) = self.record.take() {
            log::info!(
                "Finished download of {:?} ({}) in {:?}",
                record.filename(),
                ByteSize::b(self.bytes),
                self.started.elapsed()
            );
            let record = DownloadRecord::new(
                record.metadata().clone(),
                record.filename().clone(),
                record.content_type().clone(),
                self.bytes,
            );
            self.cache.put(key, CachedValue::Download(record));
        }
        self.registration.take();
        self.permit.complete();
    }

    fn fail(mut self, message: String) {
        log::warn!(
            "Download for key {} failed after {}: {}",
            self.key(),
            ByteSize::b(self.bytes),
            message
        );
        self.tracker.report(ProgressUpdate::Failed(message));
        self.registration.take();
        // Dropping the permit clears the marker without cooldown
    }
}

/// The media bytes of a download.
///
/// Completing the stream caches the download record and releases the
/// in-flight marker with cooldown. An error, or dropping the body early,
/// releases the marker without cooldown.
pub struct MediaBody {
    inner: MediaStream,
    active: Option<ActiveDownload>,
}

impl MediaBody {
    pub(crate) fn new(inner: MediaStream, active: ActiveDownload) -> Self {
        Self {
            inner,
            active: Some(active),
        }
    }
}

impl Stream for MediaBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(active) = this.active.as_mut() {
                    active.bytes += chunk.len() as u64;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                if let Some(active) = this.active.take() {
                    active.fail(err.to_string());
                }
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if let Some(active) = this.active.take() {
                    active.finish();
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MediaBody {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fail("Download cancelled before completion".to_string());
        }
    }
}

pub mod yt_dlp;

use crate::media::MediaMetadata;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use std::sync::Arc;

/// Incremental media bytes
pub type MediaStream = BoxStream<'static, io::Result<Bytes>>;

/// A started transfer
pub struct MediaTransfer {
    pub body: MediaStream,
    /// Extension of the delivered format, when it differs from the metadata
    pub extension: Option<String>,
}

impl MediaTransfer {
    pub fn new(body: MediaStream) -> Self {
        Self {
            body,
            extension: None,
        }
    }
}

/// Any failure of the media resolution service
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("failed to launch resolver: {0}")]
    Launch(#[source] io::Error),
    #[error("resolver timed out after {0}s")]
    Timeout(u64),
    #[error("resolver failed: {0}")]
    Failed(String),
    #[error("resolver returned malformed metadata: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Media resolution service
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Fetch metadata for `url` without downloading it
    async fn resolve(&self, url: &str) -> Result<MediaMetadata, ResolutionError>;

    /// Start streaming the media for `url`, reporting progress to `progress`
    async fn transfer(
        &self,
        url: &str,
        metadata: &MediaMetadata,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MediaTransfer, ResolutionError>;
}

pub type SharedResolver = Arc<dyn MediaResolver>;

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::Serialize;

/// Metadata reported by a [`MediaResolver`](crate::resolver::MediaResolver) for a single URL.
#[derive(Clone, Debug, PartialEq, Serialize, Getters)]
#[get = "pub"]
pub struct MediaMetadata {
    title: String,
    /// Duration in seconds, when the source reports one.
    duration_seconds: Option<f64>,
    thumbnail_url: Option<String>,
    /// Human readable description of the selected format.
    format: String,
    /// File extension of the selected format, without the dot.
    extension: String,
}

impl MediaMetadata {
    pub fn new(
        title: String,
        duration_seconds: Option<f64>,
        thumbnail_url: Option<String>,
        format: String,
        extension: String,
    ) -> Self {
        Self {
            title,
            duration_seconds,
            thumbnail_url,
            format,
            extension,
        }
    }
}

/// Answer to a metadata lookup.
#[derive(Clone, Debug, PartialEq, Getters)]
#[get = "pub"]
pub struct VideoInfo {
    metadata: MediaMetadata,
    /// Whether the media passes the duration policy. Informational only.
    #[getset(skip)]
    valid: bool,
}

impl VideoInfo {
    pub fn new(metadata: MediaMetadata, valid: bool) -> Self {
        Self { metadata, valid }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }
}

/// Summary of a download that was fully delivered to its caller.
#[derive(Clone, Debug, PartialEq, Getters)]
#[get = "pub"]
pub struct DownloadRecord {
    metadata: MediaMetadata,
    filename: String,
    content_type: String,
    #[getset(skip)]
    bytes: u64,
    completed_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(metadata: MediaMetadata, filename: String, content_type: String, bytes: u64) -> Self {
        Self {
            metadata,
            filename,
            content_type,
            bytes,
            completed_at: Utc::now(),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

use crate::resolver::ResolutionError;

/// Failure of a metadata lookup or a media fetch
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid URL: {0:?}")]
    InvalidUrl(String),
    #[error("Could not fetch video information: {0}")]
    UpstreamUnavailable(#[source] ResolutionError),
    #[error("Video duration should not exceed {max_seconds} seconds")]
    PolicyViolation {
        duration_seconds: f64,
        max_seconds: u64,
    },
    #[error("A download for this URL is already in progress")]
    Conflict,
    #[error("Too many requests for this URL, retry in {retry_after_secs} seconds")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("Download failed: {0}")]
    TransferFailed(#[source] ResolutionError),
}

/// Broad classes of [`Error`], as seen by callers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was rejected and must not be retried unchanged
    Rejected,
    /// The request may succeed if retried later
    RetryLater,
    /// The upstream service failed
    Upstream,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl(_) | Error::PolicyViolation { .. } => ErrorKind::Rejected,
            Error::Conflict | Error::TooManyRequests { .. } => ErrorKind::RetryLater,
            Error::UpstreamUnavailable(_) | Error::TransferFailed(_) => ErrorKind::Upstream,
        }
    }
}

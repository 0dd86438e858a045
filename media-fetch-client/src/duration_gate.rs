use crate::media::MediaMetadata;

/// Default maximum accepted media duration, in seconds
pub const DEFAULT_MAX_DURATION_SECONDS: u64 = 120;

/// Whether `metadata` is within `max_seconds`.
///
/// Sources that report no duration, or a duration of zero, are accepted.
/// The limit itself is inclusive.
pub fn check(metadata: &MediaMetadata, max_seconds: u64) -> bool {
    match metadata.duration_seconds() {
        Some(duration) if *duration > 0.0 => *duration <= max_seconds as f64,
        _ => true,
    }
}

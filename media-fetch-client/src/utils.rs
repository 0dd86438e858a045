use chrono::{DateTime, Duration, Utc};
use filenamify::filenamify;

/// `from + span`, saturating at the latest representable instant
pub fn deadline(from: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    from.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `<title>.<ext>` made safe for a `Content-Disposition` header
pub fn suggested_filename(title: &str, extension: &str) -> String {
    let stem = filenamify(title).replace('"', "'");
    let stem = if stem.trim().is_empty() { "video".to_string() } else { stem };
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "3gp" => "video/3gpp",
        "flv" => "video/x-flv",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Human readable duration such as `1 hour, 2 minutes and 5 seconds`
pub fn precise_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    if total == 0 {
        return "0 seconds".to_string();
    }

    let units = [("day", 86_400), ("hour", 3_600), ("minute", 60), ("second", 1)];
    let mut remaining = total;
    let mut parts = vec![];
    for (name, size) in units {
        let count = remaining / size;
        remaining %= size;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }

    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        _ => parts.join(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_saturates() {
        let now = Utc::now();
        assert_eq!(deadline(now, Duration::seconds(5)), now + Duration::seconds(5));
        assert_eq!(
            deadline(now, Duration::seconds(10_000_000_000_000)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_suggested_filename() {
        assert_eq!(suggested_filename("My clip", "mp4"), "My clip.mp4");

        let sanitized = suggested_filename("a/b", ".webm");
        assert!(sanitized.ends_with(".webm"));
        assert!(!sanitized.contains('/'));

        let quoted = suggested_filename("say \"hi\"", "mp4");
        assert!(!quoted.contains('"'));
        assert!(quoted.ends_with(".mp4"));

        assert_eq!(suggested_filename("   ", ""), "video");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("MP4"), "video/mp4");
        assert_eq!(content_type_for("webm"), "video/webm");
        assert_eq!(content_type_for("xyz"), "application/octet-stream");
    }

    #[test]
    fn test_precise_duration() {
        assert_eq!(precise_duration(0.0), "0 seconds");
        assert_eq!(precise_duration(1.0), "1 second");
        assert_eq!(precise_duration(65.0), "1 minute and 5 seconds");
        assert_eq!(precise_duration(3725.0), "1 hour, 2 minutes and 5 seconds");
        assert_eq!(precise_duration(120.0), "2 minutes");
    }
}

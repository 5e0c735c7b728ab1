use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// Container extensions recognised as episode sources (lowercase, no dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v"];

/// Containers that may carry several audio tracks worth probing.
pub const MULTI_TRACK_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v", "mov"];

static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("filename character class is valid"));

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").expect("timestamp pattern is valid")
});

/// Sanitize a name for use as a single path component
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_FILENAME_CHARS.replace_all(name, "_");

    // Trim whitespace and dots
    let trimmed = sanitized.trim_matches(|c: char| c.is_whitespace() || c == '.');

    // Limit length to 200 characters
    let limited: String = trimmed.chars().take(200).collect();

    if limited.is_empty() {
        "untitled".to_string()
    } else {
        limited
    }
}

/// Parse an `HH:MM:SS.cc` timestamp into seconds.
///
/// The fractional part may have any number of digits, so the tool's
/// machine-readable `00:01:15.000000` form parses as well.
pub fn parse_timestamp(timestamp: &str) -> Option<f64> {
    let captures = TIMESTAMP.captures(timestamp.trim())?;
    let hours = captures[1].parse::<u64>().ok()?;
    let minutes = captures[2].parse::<u64>().ok()?;
    let seconds = captures[3].parse::<f64>().ok()?;
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// Format duration from seconds to human-readable format
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Get the lowercased file extension of a path
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if file has a supported video container extension
pub fn is_video_file(path: &Path) -> bool {
    get_file_extension(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if the container can hold more than one audio track
pub fn is_multi_track_container(path: &Path) -> bool {
    get_file_extension(path)
        .map(|ext| MULTI_TRACK_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Keep at most `max_chars` characters from the end of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

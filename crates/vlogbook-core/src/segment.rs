//! Segment and filename sanitization.
//!
//! A "segment" is the sanitized user identifier partitioning all storage.
//! Filenames derived from user titles are scrubbed of path separators and
//! characters that are invalid on common filesystems.

use chrono::{DateTime, Utc};

use crate::defaults;

/// Sanitize a user identifier into a filesystem-safe segment key.
///
/// Keeps ASCII alphanumerics, `-`, `_`, and `.`; everything else becomes
/// `_`. Missing, empty, or dot-only identifiers map to the anonymous
/// segment.
pub fn sanitize_segment(user_id: Option<&str>) -> String {
    let raw = match user_id.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return defaults::ANONYMOUS_SEGMENT.to_string(),
    };

    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // "." and ".." would escape the data root
    if sanitized.chars().all(|c| c == '.') {
        return defaults::ANONYMOUS_SEGMENT.to_string();
    }

    sanitized
}

/// Sanitize a filename for safe storage.
///
/// Strips path components, replaces dangerous characters, and falls back to
/// a fixed name when nothing usable remains.
pub fn sanitize_filename(filename: &str) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    // Replace dangerous characters
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    // Truncate if too long (preserve extension)
    if sanitized.len() > 255 {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let ext = &sanitized[dot_pos..];
            let name = &sanitized[..255 - ext.len()];
            return format!("{}{}", name, ext);
        }
        return sanitized[..255].to_string();
    }

    sanitized.to_string()
}

/// Build the media file name used after a title rename:
/// `"<timestamp> - <sanitized title>.<ext>"`.
pub fn media_file_name(created_at: DateTime<Utc>, title: &str, extension: &str) -> String {
    let stamp = created_at.format("%Y-%m-%d %H-%M-%S");
    let name = sanitize_filename(title);
    if extension.is_empty() {
        format!("{} - {}", stamp, name)
    } else {
        format!("{} - {}.{}", stamp, name, extension)
    }
}

//! Data model for vlogbook: entries, upload sessions, preferences, and the
//! request types exchanged with the entry store and enrichment pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

/// Enrichment lifecycle state of an entry.
///
/// `Failed` is terminal but retryable: resubmitting the entry to the
/// pipeline moves it back to `InProgress`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// No enrichment was ever requested.
    #[default]
    None,
    /// Enqueued; the worker is processing it or will pick it up.
    InProgress,
    /// The worker finished, whether or not any optional stage produced output.
    Completed,
    /// The worker raised an unhandled error.
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid processing status: {}", s)),
        }
    }
}

/// A persisted video diary entry.
///
/// The description embedding is never serialized inline; it is materialized
/// from the sidecar file when the entry is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoEntry {
    pub id: Uuid,
    /// Never empty after normalization; defaults to "Untitled".
    pub title: String,
    pub description: Option<String>,
    /// Case-insensitively unique, first-seen casing preserved.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Bare filename, segment-relative path, or absolute path.
    pub video_path: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    /// Hydrated from the `.embeddings` sidecar on read.
    #[serde(skip)]
    pub description_embedding: Option<Vec<f32>>,
}

/// A resumable chunked upload in flight.
///
/// Held only in memory; a process restart loses the session and the client
/// must restart the upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: Uuid,
    /// Owning segment; only this segment may append, complete, or cancel.
    pub segment: String,
    pub temp_path: PathBuf,
    pub file_name: String,
    /// Declared total; informational only and may be inaccurate.
    pub total_bytes: u64,
    pub bytes_received: u64,
    pub created_at: DateTime<Utc>,
}

/// Per-segment user preferences, normalized on every write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub camera_device_id: Option<String>,
    pub microphone_device_id: Option<String>,
    pub transcript_language: String,
    /// Vocabulary constraining automatic tag suggestions.
    #[serde(default)]
    pub favorite_tags: Vec<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            camera_device_id: None,
            microphone_device_id: None,
            transcript_language: defaults::DEFAULT_TRANSCRIPT_LANGUAGE.to_string(),
            favorite_tags: Vec::new(),
        }
    }
}

impl UserPreferences {
    /// Trim strings, drop empties, dedup favorite tags case-insensitively.
    pub fn normalized(mut self) -> Self {
        self.camera_device_id = self.camera_device_id.and_then(non_empty_trimmed);
        self.microphone_device_id = self.microphone_device_id.and_then(non_empty_trimmed);
        self.transcript_language = match non_empty_trimmed(self.transcript_language) {
            Some(lang) => lang,
            None => defaults::DEFAULT_TRANSCRIPT_LANGUAGE.to_string(),
        };
        self.favorite_tags = dedup_tags(self.favorite_tags);
        self
    }
}

/// Request to enrich an entry, carried on the pipeline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingRequest {
    pub entry_id: Uuid,
    /// When the user supplied an explicit title, auto-title generation is
    /// suppressed.
    pub title_provided: bool,
}

/// Metadata accompanying a new media save.
#[derive(Debug, Clone, Default)]
pub struct CreateEntryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Pre-existing transcript to persist as a sidecar.
    pub transcript: Option<String>,
    /// Pre-computed description embedding to persist as a sidecar.
    pub embedding: Option<Vec<f32>>,
}

/// Partial update applied to an existing entry. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateEntryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Normalize a user-supplied title: trim, and fall back to "Untitled" when
/// empty or whitespace.
pub fn normalize_title(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => defaults::UNTITLED.to_string(),
    }
}

/// Trim and deduplicate tags case-insensitively, preserving first-seen
/// casing and order.
pub fn dedup_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Merge `additions` into `existing` with case-insensitive dedup.
pub fn merge_tags(existing: &[String], additions: &[String]) -> Vec<String> {
    dedup_tags(existing.iter().chain(additions.iter()))
}

/// Case-insensitive membership test.
pub fn contains_tag(tags: &[String], candidate: &str) -> bool {
    let lower = candidate.trim().to_lowercase();
    tags.iter().any(|t| t.to_lowercase() == lower)
}

fn non_empty_trimmed(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_status_default() {
        assert_eq!(ProcessingStatus::default(), ProcessingStatus::None);
    }

    #[test]
    fn test_processing_status_display_roundtrip() {
        for status in [
            ProcessingStatus::None,
            ProcessingStatus::InProgress,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            let parsed: ProcessingStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_processing_status_from_str_invalid() {
        let result = "bogus".parse::<ProcessingStatus>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid processing status"));
    }

    #[test]
    fn test_processing_status_serde() {
        let json = serde_json::to_string(&ProcessingStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: ProcessingStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProcessingStatus::InProgress);
    }

    #[test]
    fn test_normalize_title_blank_is_untitled() {
        assert_eq!(normalize_title(None), "Untitled");
        assert_eq!(normalize_title(Some("")), "Untitled");
        assert_eq!(normalize_title(Some("   \t ")), "Untitled");
    }

    #[test]
    fn test_normalize_title_trims() {
        assert_eq!(normalize_title(Some("  My Trip  ")), "My Trip");
    }

    #[test]
    fn test_dedup_tags_case_insensitive_first_seen_casing() {
        let tags = dedup_tags(["Travel", "travel", "TRAVEL", "Food"]);
        assert_eq!(tags, vec!["Travel", "Food"]);
    }

    #[test]
    fn test_dedup_tags_drops_empty_and_trims() {
        let tags = dedup_tags(["  beach ", "", "   ", "beach"]);
        assert_eq!(tags, vec!["beach"]);
    }

    #[test]
    fn test_merge_tags() {
        let existing = vec!["Travel".to_string(), "food".to_string()];
        let additions = vec!["FOOD".to_string(), "sunset".to_string()];
        let merged = merge_tags(&existing, &additions);
        assert_eq!(merged, vec!["Travel", "food", "sunset"]);
    }

    #[test]
    fn test_contains_tag() {
        let tags = vec!["Travel".to_string()];
        assert!(contains_tag(&tags, "travel"));
        assert!(contains_tag(&tags, " TRAVEL "));
        assert!(!contains_tag(&tags, "food"));
    }

    #[test]
    fn test_preferences_normalized() {
        let prefs = UserPreferences {
            camera_device_id: Some("  cam-1  ".to_string()),
            microphone_device_id: Some("   ".to_string()),
            transcript_language: "".to_string(),
            favorite_tags: vec!["Travel".to_string(), "travel ".to_string()],
        }
        .normalized();

        assert_eq!(prefs.camera_device_id.as_deref(), Some("cam-1"));
        assert_eq!(prefs.microphone_device_id, None);
        assert_eq!(prefs.transcript_language, "en-US");
        assert_eq!(prefs.favorite_tags, vec!["Travel"]);
    }

    #[test]
    fn test_entry_embedding_not_serialized() {
        let entry = VideoEntry {
            id: Uuid::new_v4(),
            title: "Clip".to_string(),
            description: None,
            tags: vec![],
            video_path: "clip.webm".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            processing_status: ProcessingStatus::None,
            description_embedding: Some(vec![1.0, 2.0]),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("description_embedding"));

        let back: VideoEntry = serde_json::from_str(&json).unwrap();
        assert!(back.description_embedding.is_none());
    }
}

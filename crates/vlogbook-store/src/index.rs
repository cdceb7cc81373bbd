//! On-disk index document for a segment and its legacy-shape fallback
//! parsing.
//!
//! Three shapes are accepted on read, attempted in order:
//!
//! 1. current versioned document `{version, entries, preferences}`
//! 2. legacy `{entries, preferences}` document
//! 3. bare entry array
//!
//! After a successful legacy parse the index is rewritten in the current
//! shape, so the migration cost is paid once. Legacy documents may carry
//! inline embedding payloads (base64, possibly gzip or quantized) and inline
//! transcripts; both are migrated to sidecar files and never written back.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vlogbook_core::defaults;
use vlogbook_core::embedding::decode_embedding;
use vlogbook_core::{Error, ProcessingStatus, Result, UserPreferences, VideoEntry};

/// An entry as stored in `entries.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub video_path: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,

    /// Legacy inline embedding payload (base64). Decoded to a sidecar during
    /// migration; never written back.
    #[serde(default, skip_serializing)]
    pub embedding: Option<String>,
    /// Legacy inline transcript. Migrated to a sidecar; never written back.
    #[serde(default, skip_serializing)]
    pub transcript: Option<String>,
}

impl PersistedEntry {
    /// Whether this record still carries legacy inline payloads.
    pub fn has_inline_payloads(&self) -> bool {
        self.embedding.is_some() || self.transcript.is_some()
    }

    /// Decode the inline embedding payload, tolerating every legacy binary
    /// format.
    pub fn decode_inline_embedding(&self) -> Result<Option<Vec<f32>>> {
        let Some(encoded) = &self.embedding else {
            return Ok(None);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Embedding(format!("Inline embedding base64: {}", e)))?;
        decode_embedding(&bytes).map(Some)
    }
}

impl From<&VideoEntry> for PersistedEntry {
    fn from(entry: &VideoEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title.clone(),
            description: entry.description.clone(),
            tags: entry.tags.clone(),
            video_path: entry.video_path.clone(),
            created_at: entry.created_at,
            completed_at: entry.completed_at,
            processing_status: entry.processing_status,
            embedding: None,
            transcript: None,
        }
    }
}

impl From<PersistedEntry> for VideoEntry {
    fn from(record: PersistedEntry) -> Self {
        VideoEntry {
            id: record.id,
            title: vlogbook_core::normalize_title(Some(&record.title)),
            description: record.description,
            tags: vlogbook_core::dedup_tags(record.tags),
            video_path: record.video_path,
            created_at: record.created_at,
            completed_at: record.completed_at,
            processing_status: record.processing_status,
            description_embedding: None,
        }
    }
}

/// Current on-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexDocument {
    pub version: u32,
    pub entries: Vec<PersistedEntry>,
    #[serde(default)]
    pub preferences: UserPreferences,
}

/// Prior document shape: entries + preferences without a version marker.
#[derive(Debug, Deserialize)]
struct LegacyDocument {
    entries: Vec<PersistedEntry>,
    #[serde(default)]
    preferences: UserPreferences,
}

/// Result of parsing an index file in any accepted shape.
#[derive(Debug)]
pub struct ParsedIndex {
    pub entries: Vec<PersistedEntry>,
    pub preferences: UserPreferences,
    /// True when the file was not in the current shape and must be
    /// rewritten.
    pub needs_rewrite: bool,
}

/// Parse index bytes, attempting the three accepted shapes in order.
pub fn parse_index(bytes: &[u8]) -> Result<ParsedIndex> {
    if let Ok(doc) = serde_json::from_slice::<IndexDocument>(bytes) {
        let inline = doc.entries.iter().any(PersistedEntry::has_inline_payloads);
        return Ok(ParsedIndex {
            entries: doc.entries,
            preferences: doc.preferences.normalized(),
            needs_rewrite: inline,
        });
    }

    if let Ok(doc) = serde_json::from_slice::<LegacyDocument>(bytes) {
        return Ok(ParsedIndex {
            entries: doc.entries,
            preferences: doc.preferences.normalized(),
            needs_rewrite: true,
        });
    }

    let entries = serde_json::from_slice::<Vec<PersistedEntry>>(bytes).map_err(|e| {
        Error::Serialization(format!("Index file matches no known shape: {}", e))
    })?;

    Ok(ParsedIndex {
        entries,
        preferences: UserPreferences::default(),
        needs_rewrite: true,
    })
}

/// Render the current document shape.
pub fn render_index(entries: &[PersistedEntry], preferences: &UserPreferences) -> Result<Vec<u8>> {
    let doc = IndexDocument {
        version: defaults::INDEX_SCHEMA_VERSION,
        entries: entries.to_vec(),
        preferences: preferences.clone(),
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlogbook_core::embedding::{encode_embedding, encode_embedding_gzip};

    fn sample_entry_json() -> serde_json::Value {
        serde_json::json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "title": "Morning walk",
            "description": "A walk in the park",
            "tags": ["walk"],
            "video_path": "clip.webm",
            "created_at": "2026-01-15T08:30:00Z",
            "completed_at": null,
            "processing_status": "completed"
        })
    }

    #[test]
    fn test_parse_current_shape() {
        let doc = serde_json::json!({
            "version": 3,
            "entries": [sample_entry_json()],
            "preferences": { "transcript_language": "de-DE" }
        });

        let parsed = parse_index(doc.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.preferences.transcript_language, "de-DE");
        assert!(!parsed.needs_rewrite);
    }

    #[test]
    fn test_parse_legacy_entries_preferences_shape() {
        let doc = serde_json::json!({
            "entries": [sample_entry_json()],
            "preferences": { "transcript_language": "en-US" }
        });

        let parsed = parse_index(doc.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert!(parsed.needs_rewrite);
    }

    #[test]
    fn test_parse_bare_array_shape() {
        let doc = serde_json::json!([sample_entry_json()]);

        let parsed = parse_index(doc.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.preferences, UserPreferences::default());
        assert!(parsed.needs_rewrite);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_index(b"not json at all").is_err());
        assert!(parse_index(b"{\"unrelated\": true}").is_err());
    }

    #[test]
    fn test_inline_embedding_forces_rewrite() {
        let mut entry = sample_entry_json();
        let payload = base64::engine::general_purpose::STANDARD
            .encode(encode_embedding(&[0.1f32, 0.2]));
        entry["embedding"] = serde_json::Value::String(payload);

        let doc = serde_json::json!({ "version": 3, "entries": [entry] });
        let parsed = parse_index(doc.to_string().as_bytes()).unwrap();
        assert!(parsed.needs_rewrite);
        assert_eq!(
            parsed.entries[0].decode_inline_embedding().unwrap().unwrap(),
            vec![0.1f32, 0.2]
        );
    }

    #[test]
    fn test_inline_gzip_embedding_decodes() {
        let payload = base64::engine::general_purpose::STANDARD
            .encode(encode_embedding_gzip(&[1.0f32, -1.0]).unwrap());
        let record = PersistedEntry {
            embedding: Some(payload),
            ..serde_json::from_value(sample_entry_json()).unwrap()
        };

        assert_eq!(
            record.decode_inline_embedding().unwrap().unwrap(),
            vec![1.0f32, -1.0]
        );
    }

    #[test]
    fn test_render_drops_inline_payloads() {
        let mut record: PersistedEntry = serde_json::from_value(sample_entry_json()).unwrap();
        record.embedding = Some("AAAA".to_string());
        record.transcript = Some("inline text".to_string());

        let bytes = render_index(&[record], &UserPreferences::default()).unwrap();
        let rendered = String::from_utf8(bytes).unwrap();
        assert!(!rendered.contains("inline text"));
        assert!(!rendered.contains("\"embedding\""));
        assert!(rendered.contains("\"version\""));
    }

    #[test]
    fn test_persisted_entry_normalizes_on_load() {
        let mut value = sample_entry_json();
        value["title"] = serde_json::Value::String("   ".to_string());
        value["tags"] = serde_json::json!(["A", "a", "b"]);

        let record: PersistedEntry = serde_json::from_value(value).unwrap();
        let entry: VideoEntry = record.into();
        assert_eq!(entry.title, "Untitled");
        assert_eq!(entry.tags, vec!["A", "b"]);
    }
}

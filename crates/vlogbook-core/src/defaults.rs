//! Named constants and environment variable names used across vlogbook.
//!
//! Every tunable default lives here so the individual crates never hard-code
//! magic values inline.

// ─── Storage layout ────────────────────────────────────────────────────────

/// Segment used when no authenticated user is present.
pub const ANONYMOUS_SEGMENT: &str = "anonymous";

/// File name of the per-segment entry index.
pub const INDEX_FILE_NAME: &str = "entries.json";

/// Current on-disk index schema version. Older shapes are migrated on read.
pub const INDEX_SCHEMA_VERSION: u32 = 3;

/// Extension of the transcript sidecar (replaces the media extension).
pub const TRANSCRIPT_EXTENSION: &str = "txt";

/// Extension of the embedding sidecar (replaces the media extension).
pub const EMBEDDING_EXTENSION: &str = "embeddings";

/// Extension of the soft-delete marker (replaces the media extension).
pub const DELETED_MARKER_EXTENSION: &str = "DELETED";

/// Directory under a segment root holding in-flight upload temp files.
pub const UPLOAD_DIR_NAME: &str = "uploads";

/// Extension of upload temp files.
pub const UPLOAD_TEMP_EXTENSION: &str = "part";

/// Fallback media extension when the original file name has none.
pub const DEFAULT_MEDIA_EXTENSION: &str = "webm";

// ─── Entry defaults ────────────────────────────────────────────────────────

/// Title assigned when the user supplies none (or only whitespace).
pub const UNTITLED: &str = "Untitled";

/// Default transcript language preference (BCP-47).
pub const DEFAULT_TRANSCRIPT_LANGUAGE: &str = "en-US";

// ─── Search ────────────────────────────────────────────────────────────────

/// Maximum number of results returned by a single search.
pub const SEARCH_RESULT_LIMIT: usize = 25;

/// Relevance score assigned to every keyword match.
pub const KEYWORD_MATCH_SCORE: f32 = 1.0;

// ─── Pipeline ──────────────────────────────────────────────────────────────

/// Capacity of the worker event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ─── Inference ─────────────────────────────────────────────────────────────

/// Default embedding dimension (nomic-embed-text).
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Default generation model for summary/title/tag stages.
pub const DEFAULT_OLLAMA_GEN_MODEL: &str = "llama3.2:3b";

/// Default embedding model.
pub const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text";

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default Whisper model (OpenAI-compatible servers).
pub const DEFAULT_WHISPER_MODEL: &str = "Systran/faster-whisper-base";

/// Generation request timeout in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Embedding request timeout in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Transcription request timeout in seconds (long audio needs headroom).
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 300;

// ─── Environment variable names ────────────────────────────────────────────

pub const ENV_DATA_ROOT: &str = "VLOGBOOK_DATA_ROOT";
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_OLLAMA_GEN_MODEL: &str = "OLLAMA_GEN_MODEL";
pub const ENV_OLLAMA_EMBED_MODEL: &str = "OLLAMA_EMBED_MODEL";
pub const ENV_OLLAMA_EMBED_DIMENSION: &str = "OLLAMA_EMBED_DIMENSION";
pub const ENV_TRANSCRIPT_STAGE: &str = "ENRICH_TRANSCRIPT_ENABLED";
pub const ENV_SUMMARY_STAGE: &str = "ENRICH_SUMMARY_ENABLED";
pub const ENV_TITLE_STAGE: &str = "ENRICH_TITLE_ENABLED";
pub const ENV_TAGS_STAGE: &str = "ENRICH_TAGS_ENABLED";
pub const ENV_SEMANTIC_SEARCH: &str = "SEMANTIC_SEARCH_ENABLED";

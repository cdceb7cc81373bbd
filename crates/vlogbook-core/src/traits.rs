//! Capability traits consumed from external providers.
//!
//! Each capability may return `Ok(None)` (or an empty list) to signal
//! unavailability or misconfiguration without raising an error; callers
//! degrade gracefully.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Produces a transcript from a media file's audio track.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe the media file at `media_path`.
    ///
    /// `language` is a BCP-47 tag from the user's preferences. Returns
    /// `Ok(None)` when the backend has no result to offer.
    async fn transcribe(&self, media_path: &Path, language: &str) -> Result<Option<String>>;

    /// Model identifier used, for logging.
    fn model_name(&self) -> &str;
}

/// Produces text completions for the summary, title, and tag stages.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Summarize a transcript into a short description.
    async fn summarize(&self, transcript: &str) -> Result<Option<String>>;

    /// Generate a short title from a summary/description.
    async fn generate_title(&self, summary: &str) -> Result<Option<String>>;

    /// Suggest tags for a description, constrained to the favorite
    /// vocabulary. Implementations should stay inside `favorites`, but
    /// callers must still filter the result; provider output is untrusted.
    async fn suggest_tags(
        &self,
        description: &str,
        favorites: &[String],
        existing: &[String],
    ) -> Result<Vec<String>>;
}

/// Produces embedding vectors for semantic search.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text. Returns `Ok(None)` when no vector is available.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Output dimension of the embedding model.
    fn dimension(&self) -> usize;
}

//! Environment-driven inference configuration.

use vlogbook_core::defaults::{
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_EMBED_MODEL,
    DEFAULT_OLLAMA_GEN_MODEL, DEFAULT_WHISPER_MODEL, ENV_OLLAMA_BASE_URL,
    ENV_OLLAMA_EMBED_DIMENSION, ENV_OLLAMA_EMBED_MODEL, ENV_OLLAMA_GEN_MODEL,
    ENV_WHISPER_BASE_URL, ENV_WHISPER_MODEL,
};

/// Resolved configuration for the inference backends.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `WHISPER_BASE_URL` | unset | OpenAI-compatible transcription endpoint; unset disables transcription |
/// | `WHISPER_MODEL` | `Systran/faster-whisper-base` | Transcription model |
/// | `OLLAMA_BASE_URL` | `http://localhost:11434` | Ollama endpoint |
/// | `OLLAMA_GEN_MODEL` | `llama3.2:3b` | Generation model |
/// | `OLLAMA_EMBED_MODEL` | `nomic-embed-text` | Embedding model |
/// | `OLLAMA_EMBED_DIMENSION` | `768` | Embedding output dimension |
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub whisper_base_url: Option<String>,
    pub whisper_model: String,
    pub ollama_base_url: String,
    pub gen_model: String,
    pub embed_model: String,
    pub embed_dimension: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            whisper_base_url: None,
            whisper_model: DEFAULT_WHISPER_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            gen_model: DEFAULT_OLLAMA_GEN_MODEL.to_string(),
            embed_model: DEFAULT_OLLAMA_EMBED_MODEL.to_string(),
            embed_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl InferenceConfig {
    /// Build from environment variables, with defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            whisper_base_url: std::env::var(ENV_WHISPER_BASE_URL)
                .ok()
                .filter(|v| !v.is_empty()),
            whisper_model: std::env::var(ENV_WHISPER_MODEL).unwrap_or(base.whisper_model),
            ollama_base_url: std::env::var(ENV_OLLAMA_BASE_URL).unwrap_or(base.ollama_base_url),
            gen_model: std::env::var(ENV_OLLAMA_GEN_MODEL).unwrap_or(base.gen_model),
            embed_model: std::env::var(ENV_OLLAMA_EMBED_MODEL).unwrap_or(base.embed_model),
            embed_dimension: std::env::var(ENV_OLLAMA_EMBED_DIMENSION)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.embed_dimension),
        }
    }
}

//! # vlogbook-inference
//!
//! Capability backends for the enrichment pipeline and search index:
//!
//! - [`WhisperBackend`]: transcription against an OpenAI-compatible
//!   Whisper endpoint (Speaches, faster-whisper-server)
//! - [`OllamaBackend`]: summary/title/tag generation via `/api/chat` and
//!   embeddings via `/api/embed`
//! - [`MockBackend`]: deterministic in-memory backend for tests
//!
//! Every backend implements the narrow traits from `vlogbook_core::traits`;
//! `Ok(None)` (or an empty list) signals "no result" without an error.

pub mod config;
pub mod mock;
pub mod ollama;
pub mod whisper;

pub use config::InferenceConfig;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use whisper::WhisperBackend;

//! # vlogbook-core
//!
//! Core types, traits, and abstractions for the vlogbook video diary engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other vlogbook crates depend on.

pub mod defaults;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod models;
pub mod segment;
pub mod traits;

// Re-export commonly used types at crate root
pub use embedding::{decode_embedding, encode_embedding};
pub use error::{Error, Result};
pub use models::*;
pub use segment::{media_file_name, sanitize_filename, sanitize_segment};
pub use traits::{EmbeddingBackend, GenerationBackend, TranscriptionBackend};

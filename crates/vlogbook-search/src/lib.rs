//! # vlogbook-search
//!
//! In-memory hybrid search over enriched entries: cosine-similarity vector
//! search with keyword substring fallback, lazily hydrated from the entry
//! store once per process lifetime.

pub mod index;
pub mod similarity;

pub use index::{SearchIndex, SearchQuery, SearchResult};
pub use similarity::cosine_similarity;

//! In-memory hybrid search index.
//!
//! The index is a read-derived, eventually-consistent projection of the
//! entry store, partitioned by segment and rebuilt lazily once per process
//! lifetime. Each indexed record carries a volatile transcript (sourced
//! from the sidecar) used only for keyword matching; it is never written
//! back onto the entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use vlogbook_core::defaults;
use vlogbook_core::{EmbeddingBackend, Result, VideoEntry};
use vlogbook_store::{sidecar, EntryStore};

use crate::similarity::cosine_similarity;

/// A search request. Either side may be absent; vector search falls back to
/// keyword search when it yields nothing.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub vector_query: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entry: VideoEntry,
    pub score: f32,
}

struct IndexedEntry {
    entry: VideoEntry,
    transcript: Option<String>,
}

/// Hybrid keyword/semantic index over enriched entries.
pub struct SearchIndex {
    store: Arc<EntryStore>,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    semantic_enabled: bool,
    entries: RwLock<HashMap<String, HashMap<Uuid, IndexedEntry>>>,
    hydrated: Mutex<HashSet<String>>,
}

impl SearchIndex {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self {
            store,
            embedder: None,
            semantic_enabled: false,
            entries: RwLock::new(HashMap::new()),
            hydrated: Mutex::new(HashSet::new()),
        }
    }

    /// Attach an embedding backend and enable semantic search.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self.semantic_enabled = true;
        self
    }

    /// Toggle semantic search without detaching the embedder.
    pub fn with_semantic_enabled(mut self, enabled: bool) -> Self {
        self.semantic_enabled = enabled;
        self
    }

    /// Upsert an entry into the index.
    ///
    /// A missing transcript is hydrated from the sidecar store; a missing
    /// embedding is hydrated or generated (and written back to the store)
    /// when semantic search is enabled.
    pub async fn index(
        &self,
        segment: &str,
        mut entry: VideoEntry,
        transcript: Option<String>,
    ) -> Result<()> {
        let media = self.store.resolve_media(segment, &entry);

        let transcript = match transcript {
            Some(text) => Some(text),
            None => sidecar::read_transcript(&media).await?,
        };

        if entry.description_embedding.is_none() && self.semantic_search_active() {
            entry.description_embedding = sidecar::read_embedding(&media).await?;

            if entry.description_embedding.is_none() {
                if let (Some(text), Some(embedder)) = (&entry.description, &self.embedder) {
                    match embedder.embed(text).await {
                        Ok(Some(vector)) => {
                            // Write back so the next process start finds it.
                            if let Err(e) = self
                                .store
                                .update_description_embedding(segment, entry.id, Some(vector.clone()))
                                .await
                            {
                                warn!(segment, entry_id = %entry.id, error = %e,
                                    "Failed to persist generated embedding");
                            }
                            entry.description_embedding = Some(vector);
                        }
                        Ok(None) => {
                            debug!(segment, entry_id = %entry.id, "Embedder returned no vector");
                        }
                        Err(e) => {
                            warn!(segment, entry_id = %entry.id, error = %e,
                                "Embedding generation failed during indexing");
                        }
                    }
                }
            }
        }

        let mut entries = self.entries.write().await;
        entries
            .entry(segment.to_string())
            .or_default()
            .insert(entry.id, IndexedEntry { entry, transcript });
        Ok(())
    }

    /// Evict an entry from the index. Backing files are untouched.
    pub async fn remove(&self, segment: &str, id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(segment_entries) = entries.get_mut(segment) {
            segment_entries.remove(&id);
        }
    }

    /// Number of indexed entries for a segment (test/diagnostic aid).
    pub async fn indexed_count(&self, segment: &str) -> usize {
        let entries = self.entries.read().await;
        entries.get(segment).map(|m| m.len()).unwrap_or(0)
    }

    /// Execute a hybrid search: semantic first when a vector query is
    /// available, keyword substring fallback otherwise.
    pub async fn search(&self, segment: &str, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.ensure_hydrated(segment).await?;

        if self.semantic_search_active() {
            if let Some(vector_query) = query.vector_query.as_deref().map(str::trim) {
                if !vector_query.is_empty() {
                    let results = self.vector_search(segment, vector_query).await?;
                    if !results.is_empty() {
                        return Ok(results);
                    }
                    debug!(segment, "Vector search yielded nothing; falling back to keyword");
                }
            }
        }

        self.keyword_search(segment, query).await
    }

    fn semantic_search_active(&self) -> bool {
        self.semantic_enabled && self.embedder.is_some()
    }

    async fn vector_search(&self, segment: &str, text: &str) -> Result<Vec<SearchResult>> {
        let embedder = match &self.embedder {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let query_vector = match embedder.embed(text).await {
            Ok(Some(vector)) => vector,
            Ok(None) => {
                debug!(segment, "Query embedding unavailable");
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(segment, error = %e, "Query embedding failed");
                return Ok(Vec::new());
            }
        };

        let entries = self.entries.read().await;
        let mut results: Vec<SearchResult> = entries
            .get(segment)
            .map(|m| {
                m.values()
                    .filter_map(|indexed| {
                        let embedding = indexed.entry.description_embedding.as_ref()?;
                        let score = cosine_similarity(&query_vector, embedding);
                        if score > 0.0 {
                            Some(SearchResult {
                                entry: indexed.entry.clone(),
                                score,
                            })
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.entry.created_at.cmp(&a.entry.created_at))
        });
        results.truncate(defaults::SEARCH_RESULT_LIMIT);

        trace!(segment, result_count = results.len(), "Vector search complete");
        Ok(results)
    }

    async fn keyword_search(&self, segment: &str, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let needle = query
            .keyword
            .as_deref()
            .or(query.vector_query.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let Some(needle) = needle else {
            return Ok(Vec::new());
        };

        let entries = self.entries.read().await;
        let mut results: Vec<SearchResult> = entries
            .get(segment)
            .map(|m| {
                m.values()
                    .filter(|indexed| keyword_matches(indexed, &needle))
                    .map(|indexed| SearchResult {
                        entry: indexed.entry.clone(),
                        score: defaults::KEYWORD_MATCH_SCORE,
                    })
                    .collect()
            })
            .unwrap_or_default();

        results.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then(b.entry.id.cmp(&a.entry.id))
        });
        results.truncate(defaults::SEARCH_RESULT_LIMIT);

        trace!(segment, result_count = results.len(), "Keyword search complete");
        Ok(results)
    }

    /// Rebuild a segment's projection from the store, once per process
    /// lifetime. The mutex keeps concurrent first-queries from hydrating
    /// twice.
    async fn ensure_hydrated(&self, segment: &str) -> Result<()> {
        let mut hydrated = self.hydrated.lock().await;
        if hydrated.contains(segment) {
            return Ok(());
        }

        let listed = self.store.list(segment).await?;
        let count = listed.len();
        for entry in listed {
            self.index(segment, entry, None).await?;
        }

        hydrated.insert(segment.to_string());
        debug!(segment, result_count = count, "Hydrated search index from store");
        Ok(())
    }
}

fn keyword_matches(indexed: &IndexedEntry, needle_lower: &str) -> bool {
    if indexed.entry.title.to_lowercase().contains(needle_lower) {
        return true;
    }
    if let Some(description) = &indexed.entry.description {
        if description.to_lowercase().contains(needle_lower) {
            return true;
        }
    }
    if let Some(transcript) = &indexed.transcript {
        if transcript.to_lowercase().contains(needle_lower) {
            return true;
        }
    }
    false
}

//! Integration tests for the hybrid search index, driven through a real
//! filesystem-backed store and the deterministic mock embedder.

use std::sync::Arc;

use vlogbook_core::{CreateEntryRequest, EmbeddingBackend, VideoEntry};
use vlogbook_inference::MockBackend;
use vlogbook_search::{SearchIndex, SearchQuery};
use vlogbook_store::{EntryStore, MediaSource, SaveRequest, StoreConfig};

fn store_in(dir: &tempfile::TempDir) -> Arc<EntryStore> {
    Arc::new(EntryStore::new(StoreConfig::new(dir.path())))
}

async fn save_entry(
    store: &EntryStore,
    segment: &str,
    title: &str,
    description: Option<&str>,
    transcript: Option<&str>,
) -> VideoEntry {
    store
        .save(
            segment,
            SaveRequest {
                media: MediaSource::Bytes(b"video".to_vec()),
                original_file_name: "clip.webm".to_string(),
                metadata: CreateEntryRequest {
                    title: Some(title.to_string()),
                    description: description.map(String::from),
                    transcript: transcript.map(String::from),
                    ..Default::default()
                },
            },
        )
        .await
        .unwrap()
}

fn keyword(q: &str) -> SearchQuery {
    SearchQuery {
        keyword: Some(q.to_string()),
        vector_query: None,
    }
}

#[tokio::test]
async fn test_keyword_matches_title_description_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    save_entry(&store, "alice", "Beach day", None, None).await;
    save_entry(&store, "alice", "Untagged", Some("we saw dolphins"), None).await;
    save_entry(&store, "alice", "Quiet", None, Some("talking about the beach again")).await;

    let results = index.search("alice", &keyword("beach")).await.unwrap();
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.score, 1.0);
    }

    let results = index.search("alice", &keyword("DOLPHINS")).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entry.title, "Untagged");
}

#[tokio::test]
async fn test_keyword_results_are_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    save_entry(&store, "alice", "walk one", None, None).await;
    save_entry(&store, "alice", "walk two", None, None).await;

    let results = index.search("alice", &keyword("walk")).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].entry.created_at >= results[1].entry.created_at);
}

#[tokio::test]
async fn test_no_cross_segment_results() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    save_entry(&store, "alice", "private beach", None, None).await;

    let results = index.search("bob", &keyword("beach")).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_semantic_search_ranks_exact_description_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let embedder: Arc<dyn EmbeddingBackend> = Arc::new(MockBackend::new());
    let index = SearchIndex::new(store.clone()).with_embedder(embedder);

    save_entry(&store, "alice", "a", Some("surfing at sunrise"), None).await;
    save_entry(&store, "alice", "b", Some("cooking pasta"), None).await;

    // The deterministic mock embeds identical text identically, so querying
    // with an exact description scores cosine 1.0 on that entry.
    let results = index
        .search(
            "alice",
            &SearchQuery {
                keyword: None,
                vector_query: Some("surfing at sunrise".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].entry.title, "a");
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_semantic_generates_and_persists_missing_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let mock = MockBackend::new();
    let index =
        SearchIndex::new(store.clone()).with_embedder(Arc::new(mock.clone()));

    let entry = save_entry(&store, "alice", "t", Some("a described clip"), None).await;
    index.search("alice", &keyword("t")).await.unwrap();

    // The hydration pass generated an embedding and wrote it back.
    assert!(mock.call_count("embed") >= 1);
    let hydrated = store.get("alice", entry.id).await.unwrap();
    assert!(hydrated.description_embedding.is_some());
}

#[tokio::test]
async fn test_vector_query_falls_back_to_keyword_when_embedder_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let embedder: Arc<dyn EmbeddingBackend> = Arc::new(MockBackend::new().with_embed_unavailable());
    let index = SearchIndex::new(store.clone()).with_embedder(embedder);

    save_entry(&store, "alice", "Beach day", Some("sand and waves"), None).await;

    let results = index
        .search(
            "alice",
            &SearchQuery {
                keyword: Some("beach".to_string()),
                vector_query: Some("ocean holiday".to_string()),
            },
        )
        .await
        .unwrap();

    // Keyword fallback still finds the entry at the fixed score.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 1.0);
    assert_eq!(results[0].entry.title, "Beach day");
}

#[tokio::test]
async fn test_reindexing_unchanged_entry_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    let entry = save_entry(&store, "alice", "stable", None, None).await;

    let before = index.search("alice", &keyword("stable")).await.unwrap();
    index.index("alice", entry.clone(), None).await.unwrap();
    index.index("alice", entry, None).await.unwrap();
    let after = index.search("alice", &keyword("stable")).await.unwrap();

    assert_eq!(before.len(), after.len());
    assert_eq!(index.indexed_count("alice").await, 1);
}

#[tokio::test]
async fn test_remove_evicts_without_touching_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    let entry = save_entry(&store, "alice", "gone soon", None, None).await;
    assert_eq!(index.search("alice", &keyword("gone")).await.unwrap().len(), 1);

    index.remove("alice", entry.id).await;
    assert!(index.search("alice", &keyword("gone")).await.unwrap().is_empty());

    // Backing files are untouched.
    assert!(store.resolve_media("alice", &entry).exists());
}

#[tokio::test]
async fn test_result_cap() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    for i in 0..30 {
        save_entry(&store, "alice", &format!("walk {}", i), None, None).await;
    }

    let results = index.search("alice", &keyword("walk")).await.unwrap();
    assert_eq!(results.len(), 25);
}

#[tokio::test]
async fn test_empty_query_returns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    save_entry(&store, "alice", "something", None, None).await;

    let results = index.search("alice", &SearchQuery::default()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_indexed_transcript_is_searchable_without_persisting_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let index = SearchIndex::new(store.clone());

    let entry = save_entry(&store, "alice", "plain", None, None).await;

    // First query hydrates the index from the store (no transcript found).
    assert!(index.search("alice", &keyword("nebula")).await.unwrap().is_empty());

    // Attach a volatile transcript at index time only, the way the
    // pipeline does after generating one.
    index
        .index("alice", entry.clone(), Some("nebula footage".to_string()))
        .await
        .unwrap();

    let results = index.search("alice", &keyword("nebula")).await.unwrap();
    assert_eq!(results.len(), 1);

    // The store's copy of the entry carries no transcript field at all; the
    // sidecar is also absent since the transcript came from the caller.
    let media = store.resolve_media("alice", &entry);
    assert!(!media.with_extension("txt").exists());
}

//! Durable, per-segment entry store.
//!
//! All state for a segment (in-memory cache + `entries.json` persist) is
//! serialized behind one async mutex per segment, held in a keyed map.
//! Initialization happens lazily, at most once per segment per process,
//! inside the same gate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vlogbook_core::{
    defaults, dedup_tags, media_file_name, normalize_title, CreateEntryRequest, EmbeddingBackend,
    Error, ProcessingStatus, Result, UpdateEntryRequest, UserPreferences, VideoEntry,
};

use crate::index::{parse_index, render_index, ParsedIndex, PersistedEntry};
use crate::paths::{deleted_marker_path, write_atomic, SegmentPaths};
use crate::sidecar;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per segment.
    pub data_root: PathBuf,
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Read the data root from `VLOGBOOK_DATA_ROOT` (default `./data`).
    pub fn from_env() -> Self {
        let root = std::env::var(defaults::ENV_DATA_ROOT).unwrap_or_else(|_| "./data".to_string());
        Self::new(root)
    }
}

/// Raw media handed to [`EntryStore::save`].
#[derive(Debug)]
pub enum MediaSource {
    /// In-memory buffer (small direct saves).
    Bytes(Vec<u8>),
    /// An assembled upload temp file, adopted by rename (copy fallback for
    /// cross-device moves).
    TempFile(PathBuf),
}

/// A new media save.
#[derive(Debug)]
pub struct SaveRequest {
    pub media: MediaSource,
    pub original_file_name: String,
    pub metadata: CreateEntryRequest,
}

struct SegmentState {
    paths: SegmentPaths,
    initialized: bool,
    entries: HashMap<Uuid, VideoEntry>,
    preferences: UserPreferences,
}

/// Per-user durable entry store. Cheap to clone via `Arc`.
pub struct EntryStore {
    data_root: PathBuf,
    embedder: Option<Arc<dyn EmbeddingBackend>>,
    segments: std::sync::Mutex<HashMap<String, Arc<Mutex<SegmentState>>>>,
}

impl EntryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            data_root: config.data_root,
            embedder: None,
            segments: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Attach an embedding backend used to derive description embeddings at
    /// save/update time. Without one, embedding generation is deferred to
    /// the search index.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Root directory holding all segments.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Filesystem layout of a segment.
    pub fn segment_paths(&self, segment: &str) -> SegmentPaths {
        SegmentPaths::new(&self.data_root, segment)
    }

    /// Resolve an entry's media location on disk.
    pub fn resolve_media(&self, segment: &str, entry: &VideoEntry) -> PathBuf {
        self.segment_paths(segment).resolve(&entry.video_path)
    }

    // ───────────────────────── entry CRUD ─────────────────────────────────

    /// Persist a new entry: write the media, derive or defer the description
    /// embedding, persist supplied sidecars, insert into the cache, and
    /// atomically rewrite the index.
    pub async fn save(&self, segment: &str, request: SaveRequest) -> Result<VideoEntry> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let id = Uuid::new_v4();
        let title = normalize_title(request.metadata.title.as_deref());
        let tags = dedup_tags(request.metadata.tags);
        let description = request
            .metadata
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);

        let extension = Path::new(&request.original_file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(defaults::DEFAULT_MEDIA_EXTENSION)
            .to_string();
        let file_name = format!("{}.{}", id, extension);
        let media = state.paths.root().join(&file_name);

        fs::create_dir_all(state.paths.root()).await?;
        match request.media {
            MediaSource::Bytes(data) => write_atomic(&media, &data).await?,
            MediaSource::TempFile(temp) => adopt_file(&temp, &media).await?,
        }

        // Sidecars supplied up front
        if let Some(transcript) = request
            .metadata
            .transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            sidecar::write_transcript(&media, transcript).await?;
        }

        let mut embedding = request.metadata.embedding;
        if embedding.is_none() {
            if let (Some(text), Some(embedder)) = (&description, &self.embedder) {
                match embedder.embed(text).await {
                    Ok(vector) => embedding = vector,
                    Err(e) => {
                        warn!(segment, entry_id = %id, error = %e,
                            "Embedding derivation failed at save; deferring");
                    }
                }
            }
        }
        if let Some(vector) = &embedding {
            sidecar::write_embedding(&media, vector).await?;
        }

        let entry = VideoEntry {
            id,
            title,
            description,
            tags,
            video_path: file_name,
            created_at: Utc::now(),
            completed_at: None,
            processing_status: ProcessingStatus::None,
            description_embedding: embedding,
        };

        state.entries.insert(id, entry.clone());
        self.persist(&state).await?;

        info!(segment, entry_id = %id, title = %entry.title, "Saved entry");
        Ok(entry)
    }

    /// All entries for the segment, newest first, embeddings hydrated.
    pub async fn list(&self, segment: &str) -> Result<Vec<VideoEntry>> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;
        self.hydrate_embeddings(&mut state).await?;

        let mut entries: Vec<VideoEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    /// A single entry, embedding hydrated.
    pub async fn get(&self, segment: &str, id: Uuid) -> Result<VideoEntry> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let media = {
            let entry = state.entries.get(&id).ok_or(Error::EntryNotFound(id))?;
            if entry.description_embedding.is_some() {
                return Ok(entry.clone());
            }
            state.paths.resolve(&entry.video_path)
        };

        let embedding = sidecar::read_embedding(&media).await?;
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(Error::EntryNotFound(id))?;
        entry.description_embedding = embedding;
        Ok(entry.clone())
    }

    /// Apply a partial update. The embedding is recomputed only when the
    /// description text actually changed; a title change renames the media
    /// file and its sidecars, and a failed rename keeps the old path.
    pub async fn update(
        &self,
        segment: &str,
        id: Uuid,
        request: UpdateEntryRequest,
    ) -> Result<VideoEntry> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let mut entry = state
            .entries
            .get(&id)
            .cloned()
            .ok_or(Error::EntryNotFound(id))?;

        // Description: recompute the embedding only on actual text change.
        let mut description_changed = false;
        if let Some(raw) = request.description {
            let new_description = {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            };
            if new_description != entry.description {
                description_changed = true;
                entry.description = new_description;
            }
        }

        // Title: rename the backing file; collisions and rename errors are
        // non-fatal and keep the previous path.
        if let Some(raw) = request.title {
            let new_title = normalize_title(Some(&raw));
            if new_title != entry.title {
                let old_media = state.paths.resolve(&entry.video_path);
                let extension = old_media
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or(defaults::DEFAULT_MEDIA_EXTENSION);
                let new_name = media_file_name(entry.created_at, &new_title, extension);
                let new_media = state.paths.root().join(&new_name);

                match rename_media(&old_media, &new_media).await {
                    Ok(true) => {
                        sidecar::rename_sidecars(&old_media, &new_media).await;
                        entry.video_path = new_name;
                    }
                    Ok(false) | Err(_) => {
                        // Logged inside rename_media; record keeps old path.
                    }
                }
                entry.title = new_title;
            }
        }

        if let Some(tags) = request.tags {
            entry.tags = dedup_tags(tags);
        }
        if let Some(completed_at) = request.completed_at {
            entry.completed_at = Some(completed_at);
        }

        if description_changed {
            let media = state.paths.resolve(&entry.video_path);
            match (&entry.description, &self.embedder) {
                (Some(text), Some(embedder)) => match embedder.embed(text).await {
                    Ok(Some(vector)) => {
                        sidecar::write_embedding(&media, &vector).await?;
                        entry.description_embedding = Some(vector);
                    }
                    Ok(None) => {
                        debug!(segment, entry_id = %id, "Embedder returned no vector");
                        entry.description_embedding = None;
                    }
                    Err(e) => {
                        warn!(segment, entry_id = %id, error = %e,
                            "Embedding recompute failed; keeping entry without one");
                        entry.description_embedding = None;
                    }
                },
                (None, _) => {
                    sidecar::delete_embedding(&media).await?;
                    entry.description_embedding = None;
                }
                (Some(_), None) => {
                    // No embedder configured; the search index will fill it
                    // in lazily.
                    entry.description_embedding = None;
                }
            }
        }

        state.entries.insert(id, entry.clone());
        self.persist(&state).await?;

        debug!(segment, entry_id = %id, "Updated entry");
        Ok(entry)
    }

    /// Remove the entry from the index but keep its files, leaving a
    /// `.DELETED` marker holding a snapshot of the record. Whether soft or
    /// deep deletion applies is the caller's authorization decision.
    pub async fn soft_delete(&self, segment: &str, id: Uuid) -> Result<bool> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let Some(entry) = state.entries.remove(&id) else {
            return Ok(false);
        };

        let media = state.paths.resolve(&entry.video_path);
        let snapshot = serde_json::to_vec_pretty(&PersistedEntry::from(&entry))?;
        write_atomic(&deleted_marker_path(&media), &snapshot).await?;

        self.persist(&state).await?;
        info!(segment, entry_id = %id, "Soft-deleted entry");
        Ok(true)
    }

    /// Remove the entry and physically delete its media and sidecars.
    pub async fn deep_delete(&self, segment: &str, id: Uuid) -> Result<bool> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let Some(entry) = state.entries.remove(&id) else {
            return Ok(false);
        };

        let media = state.paths.resolve(&entry.video_path);
        match fs::remove_file(&media).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        sidecar::delete_sidecars(&media).await?;

        self.persist(&state).await?;
        info!(segment, entry_id = %id, "Deep-deleted entry");
        Ok(true)
    }

    // ─────────────────────── pipeline mutations ───────────────────────────

    /// Set an entry's processing status and persist.
    pub async fn update_processing_status(
        &self,
        segment: &str,
        id: Uuid,
        status: ProcessingStatus,
    ) -> Result<()> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(Error::EntryNotFound(id))?;
        entry.processing_status = status;

        self.persist(&state).await?;
        debug!(segment, entry_id = %id, status = %status, "Updated processing status");
        Ok(())
    }

    /// Replace (or clear) an entry's description embedding and persist.
    pub async fn update_description_embedding(
        &self,
        segment: &str,
        id: Uuid,
        vector: Option<Vec<f32>>,
    ) -> Result<()> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        let media = {
            let entry = state.entries.get(&id).ok_or(Error::EntryNotFound(id))?;
            state.paths.resolve(&entry.video_path)
        };

        match &vector {
            Some(v) => sidecar::write_embedding(&media, v).await?,
            None => sidecar::delete_embedding(&media).await?,
        }

        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(Error::EntryNotFound(id))?;
        entry.description_embedding = vector;

        self.persist(&state).await?;
        Ok(())
    }

    /// Ids of entries still marked `InProgress` (crash-recovery input).
    pub async fn unfinished_entries(&self, segment: &str) -> Result<Vec<Uuid>> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        Ok(state
            .entries
            .values()
            .filter(|e| e.processing_status == ProcessingStatus::InProgress)
            .map(|e| e.id)
            .collect())
    }

    /// Segment directories present under the data root.
    pub async fn segments_on_disk(&self) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        let mut dir = match fs::read_dir(&self.data_root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(segments),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                if let Some(name) = item.file_name().to_str() {
                    segments.push(name.to_string());
                }
            }
        }
        segments.sort();
        Ok(segments)
    }

    // ───────────────────────── preferences ────────────────────────────────

    /// The segment's preferences.
    pub async fn preferences(&self, segment: &str) -> Result<UserPreferences> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;
        Ok(state.preferences.clone())
    }

    /// Replace the segment's preferences (normalized) and persist.
    pub async fn update_preferences(&self, segment: &str, prefs: UserPreferences) -> Result<()> {
        let state_arc = self.segment_handle(segment);
        let mut state = state_arc.lock().await;
        self.ensure_initialized(&mut state).await?;

        state.preferences = prefs.normalized();
        self.persist(&state).await?;
        Ok(())
    }

    // ───────────────────────── internals ──────────────────────────────────

    fn segment_handle(&self, segment: &str) -> Arc<Mutex<SegmentState>> {
        let mut segments = self.segments.lock().expect("segment map poisoned");
        segments
            .entry(segment.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SegmentState {
                    paths: SegmentPaths::new(&self.data_root, segment),
                    initialized: false,
                    entries: HashMap::new(),
                    preferences: UserPreferences::default(),
                }))
            })
            .clone()
    }

    /// Read and migrate the segment's index file. Runs at most once per
    /// segment per process, under the segment gate.
    async fn ensure_initialized(&self, state: &mut SegmentState) -> Result<()> {
        if state.initialized {
            return Ok(());
        }

        let index_file = state.paths.index_file();
        let parsed = match fs::read(&index_file).await {
            Ok(bytes) => parse_index(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ParsedIndex {
                entries: Vec::new(),
                preferences: UserPreferences::default(),
                needs_rewrite: false,
            },
            Err(e) => return Err(e.into()),
        };

        let entry_count = parsed.entries.len();
        for record in parsed.entries {
            let inline_embedding = match record.decode_inline_embedding() {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(entry_id = %record.id, error = %e,
                        "Dropping undecodable inline embedding during migration");
                    None
                }
            };
            let inline_transcript = record.transcript.clone();

            let entry: VideoEntry = record.into();
            let media = state.paths.resolve(&entry.video_path);

            if let Some(vector) = inline_embedding {
                if let Err(e) = sidecar::write_embedding(&media, &vector).await {
                    warn!(entry_id = %entry.id, error = %e,
                        "Failed to migrate inline embedding to sidecar");
                }
            }
            if let Some(text) = inline_transcript {
                match sidecar::read_transcript(&media).await {
                    Ok(None) => {
                        if let Err(e) = sidecar::write_transcript(&media, &text).await {
                            warn!(entry_id = %entry.id, error = %e,
                                "Failed to migrate inline transcript to sidecar");
                        }
                    }
                    Ok(Some(_)) => {}
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e,
                            "Transcript sidecar probe failed during migration");
                    }
                }
            }

            state.entries.insert(entry.id, entry);
        }
        state.preferences = parsed.preferences;
        state.initialized = true;

        if parsed.needs_rewrite {
            info!(index = %index_file.display(), entry_count,
                "Migrated legacy index to current shape");
            self.persist(state).await?;
        } else {
            debug!(index = %index_file.display(), entry_count, "Loaded segment index");
        }
        Ok(())
    }

    async fn hydrate_embeddings(&self, state: &mut SegmentState) -> Result<()> {
        let pending: Vec<(Uuid, PathBuf)> = state
            .entries
            .values()
            .filter(|e| e.description_embedding.is_none())
            .map(|e| (e.id, state.paths.resolve(&e.video_path)))
            .collect();

        for (id, media) in pending {
            let embedding = sidecar::read_embedding(&media).await?;
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.description_embedding = embedding;
            }
        }
        Ok(())
    }

    /// Atomically rewrite the segment's index in the current shape.
    async fn persist(&self, state: &SegmentState) -> Result<()> {
        let mut records: Vec<PersistedEntry> =
            state.entries.values().map(PersistedEntry::from).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let bytes = render_index(&records, &state.preferences)?;
        write_atomic(&state.paths.index_file(), &bytes).await
    }
}

/// Move an assembled temp file into place, copying when rename crosses a
/// filesystem boundary.
async fn adopt_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
    }
}

/// Rename media to a new path. Returns `Ok(false)` on a destination
/// collision; rename errors are logged and returned.
async fn rename_media(old: &Path, new: &Path) -> Result<bool> {
    if fs::try_exists(new).await? {
        warn!(from = %old.display(), to = %new.display(),
            "Rename destination already exists; keeping old path");
        return Ok(false);
    }
    match fs::rename(old, new).await {
        Ok(()) => {
            // The record only moves once the file is really there.
            if fs::try_exists(new).await? {
                Ok(true)
            } else {
                warn!(to = %new.display(), "Renamed file missing at destination; keeping old path");
                Ok(false)
            }
        }
        Err(e) => {
            warn!(from = %old.display(), to = %new.display(), error = %e,
                "Media rename failed; keeping old path");
            Err(e.into())
        }
    }
}

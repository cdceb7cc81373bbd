//! Enrichment queue and background worker.
//!
//! One consumer drains an unbounded MPSC channel of processing requests.
//! Enqueue never blocks the caller. Each entry runs the stage sequence
//! transcript → summary → title → tags; a stage only runs when its feature
//! is enabled and its precondition holds, and a provider failure skips the
//! stage without failing the entry.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vlogbook_core::{
    contains_tag, defaults, merge_tags, Error, GenerationBackend, ProcessingRequest,
    ProcessingStatus, Result, TranscriptionBackend, UpdateEntryRequest,
};
use vlogbook_search::SearchIndex;
use vlogbook_store::{sidecar, EntryStore};

/// Stage toggles for the worker.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub transcript_enabled: bool,
    pub summary_enabled: bool,
    pub title_enabled: bool,
    pub tags_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transcript_enabled: true,
            summary_enabled: true,
            title_enabled: true,
            tags_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ENRICH_TRANSCRIPT_ENABLED` | `true` | Run the transcript stage |
    /// | `ENRICH_SUMMARY_ENABLED` | `true` | Run the summary stage |
    /// | `ENRICH_TITLE_ENABLED` | `true` | Run the title stage |
    /// | `ENRICH_TAGS_ENABLED` | `true` | Run the tag stage |
    pub fn from_env() -> Self {
        fn enabled(var: &str) -> bool {
            std::env::var(var).map(|v| v != "false" && v != "0").unwrap_or(true)
        }
        Self {
            transcript_enabled: enabled(defaults::ENV_TRANSCRIPT_STAGE),
            summary_enabled: enabled(defaults::ENV_SUMMARY_STAGE),
            title_enabled: enabled(defaults::ENV_TITLE_STAGE),
            tags_enabled: enabled(defaults::ENV_TAGS_STAGE),
        }
    }
}

/// A queued unit of work: the target segment plus the processing request.
#[derive(Debug, Clone)]
struct QueuedRequest {
    segment: String,
    request: ProcessingRequest,
}

/// Producer half of the enrichment queue. Cheap to clone.
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
}

impl EnrichmentQueue {
    /// Enqueue without touching the store. Never blocks; a send to a
    /// stopped worker is logged and dropped.
    pub fn enqueue(&self, segment: &str, request: ProcessingRequest) {
        let queued = QueuedRequest {
            segment: segment.to_string(),
            request,
        };
        if self.tx.send(queued).is_err() {
            warn!(entry_id = %request.entry_id, "Enrichment worker is gone; request dropped");
        }
    }

    /// Mark the entry `InProgress` and enqueue it. The status write is what
    /// makes the request crash-recoverable.
    pub async fn submit(
        &self,
        store: &EntryStore,
        segment: &str,
        request: ProcessingRequest,
    ) -> Result<()> {
        store
            .update_processing_status(segment, request.entry_id, ProcessingStatus::InProgress)
            .await?;
        self.enqueue(segment, request);
        Ok(())
    }
}

/// Event emitted by the enrichment worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started draining the queue.
    Started,
    /// An entry finished the stage sequence.
    EntryCompleted { segment: String, entry_id: Uuid },
    /// An entry failed with an unhandled error.
    EntryFailed {
        segment: String,
        entry_id: Uuid,
        error: String,
    },
    /// Worker stopped.
    Stopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully and wait for it to stop.
    /// An entry being processed finishes first; queued entries stay
    /// `InProgress` and are recovered on the next start.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Worker task panicked: {}", e)))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Background worker running the enrichment stage sequence.
pub struct EnrichmentWorker {
    store: Arc<EntryStore>,
    index: Arc<SearchIndex>,
    transcription: Option<Arc<dyn TranscriptionBackend>>,
    generation: Option<Arc<dyn GenerationBackend>>,
    config: PipelineConfig,
    queue_tx: mpsc::UnboundedSender<QueuedRequest>,
    queue_rx: mpsc::UnboundedReceiver<QueuedRequest>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl EnrichmentWorker {
    pub fn new(store: Arc<EntryStore>, index: Arc<SearchIndex>, config: PipelineConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(defaults::EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            index,
            transcription: None,
            generation: None,
            config,
            queue_tx,
            queue_rx,
            event_tx,
        }
    }

    /// Attach a transcription backend.
    pub fn with_transcription(mut self, backend: Arc<dyn TranscriptionBackend>) -> Self {
        self.transcription = Some(backend);
        self
    }

    /// Attach a generation backend for the summary/title/tag stages.
    pub fn with_generation(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.generation = Some(backend);
        self
    }

    /// Producer handle for this worker's queue.
    pub fn queue(&self) -> EnrichmentQueue {
        EnrichmentQueue {
            tx: self.queue_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Re-enqueue every entry left `InProgress` by a previous process.
    ///
    /// Call before [`start`](Self::start). Returns the number of recovered
    /// entries. An entry whose title is still the default is assumed to
    /// have had no user-supplied title, so auto-titling may run for it.
    pub async fn recover(&self) -> Result<usize> {
        let queue = self.queue();
        let mut recovered = 0;

        for segment in self.store.segments_on_disk().await? {
            for entry_id in self.store.unfinished_entries(&segment).await? {
                let title_provided = match self.store.get(&segment, entry_id).await {
                    Ok(entry) => entry.title != defaults::UNTITLED,
                    Err(e) => {
                        warn!(segment, entry_id = %entry_id, error = %e,
                            "Skipping unreadable entry during recovery");
                        continue;
                    }
                };
                queue.enqueue(
                    &segment,
                    ProcessingRequest {
                        entry_id,
                        title_provided,
                    },
                );
                recovered += 1;
                info!(segment, entry_id = %entry_id, "Re-enqueued interrupted entry");
            }
        }

        Ok(recovered)
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let join = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!("Enrichment worker started");
        let _ = self.event_tx.send(WorkerEvent::Started);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Enrichment worker received shutdown signal");
                    break;
                }
                queued = self.queue_rx.recv() => {
                    match queued {
                        Some(queued) => self.run_one(queued).await,
                        None => break,
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::Stopped);
        info!("Enrichment worker stopped");
    }

    /// Process one request, translating the outcome into a terminal status.
    async fn run_one(&self, queued: QueuedRequest) {
        let start = Instant::now();
        let segment = queued.segment.as_str();
        let entry_id = queued.request.entry_id;

        debug!(segment, entry_id = %entry_id, "Processing entry");

        match self.process(segment, &queued.request).await {
            Ok(true) => {
                if let Err(e) = self
                    .store
                    .update_processing_status(segment, entry_id, ProcessingStatus::Completed)
                    .await
                {
                    error!(segment, entry_id = %entry_id, error = %e,
                        "Failed to mark entry completed");
                    self.mark_failed(segment, entry_id, &e.to_string()).await;
                } else {
                    info!(
                        segment,
                        entry_id = %entry_id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Entry enrichment completed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::EntryCompleted {
                        segment: segment.to_string(),
                        entry_id,
                    });
                }
            }
            Ok(false) => {
                // Entry vanished between enqueue and processing.
                debug!(segment, entry_id = %entry_id, "Entry gone; request dropped");
            }
            Err(e) => {
                error!(segment, entry_id = %entry_id, error = %e, "Entry enrichment failed");
                self.mark_failed(segment, entry_id, &e.to_string()).await;
            }
        }
    }

    async fn mark_failed(&self, segment: &str, entry_id: Uuid, error: &str) {
        if let Err(e) = self
            .store
            .update_processing_status(segment, entry_id, ProcessingStatus::Failed)
            .await
        {
            error!(segment, entry_id = %entry_id, error = %e, "Failed to mark entry failed");
        }
        let _ = self.event_tx.send(WorkerEvent::EntryFailed {
            segment: segment.to_string(),
            entry_id,
            error: error.to_string(),
        });
    }

    /// Run the stage sequence. Returns `Ok(false)` when the entry no longer
    /// exists. Provider failures are recovered locally; only storage
    /// failures propagate.
    async fn process(&self, segment: &str, request: &ProcessingRequest) -> Result<bool> {
        let entry = match self.store.get(segment, request.entry_id).await {
            Ok(entry) => entry,
            Err(Error::EntryNotFound(_)) => {
                warn!(segment, entry_id = %request.entry_id, "Queued entry no longer exists");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let media = self.store.resolve_media(segment, &entry);

        // Stage 1: transcript. Reuse the sidecar, generate otherwise.
        let mut transcript = sidecar::read_transcript(&media).await?;
        let mut transcript_generated = false;
        if transcript.is_none() && self.config.transcript_enabled {
            if let Some(backend) = &self.transcription {
                let language = self.store.preferences(segment).await?.transcript_language;

                let lock = sidecar::transcript_lock(&media);
                let _guard = lock.lock().await;
                // A concurrent caller may have generated it while we waited.
                transcript = sidecar::read_transcript(&media).await?;
                if transcript.is_none() {
                    match backend.transcribe(&media, &language).await {
                        Ok(Some(text)) => {
                            let text = text.trim().to_string();
                            if !text.is_empty() {
                                sidecar::write_transcript(&media, &text).await?;
                                transcript = Some(text);
                                transcript_generated = true;
                            }
                        }
                        Ok(None) => {
                            debug!(segment, entry_id = %entry.id, stage = "transcript",
                                "Backend produced no transcript");
                        }
                        Err(e) => {
                            warn!(segment, entry_id = %entry.id, stage = "transcript",
                                error = %e, "Stage skipped after provider failure");
                        }
                    }
                }
            }
        }

        // Stage 2: summary. Only when no description exists yet.
        let mut new_description: Option<String> = None;
        if entry.description.is_none() && self.config.summary_enabled {
            if let (Some(text), Some(backend)) = (&transcript, &self.generation) {
                match backend.summarize(text).await {
                    Ok(Some(summary)) => {
                        let summary = summary.trim().to_string();
                        if !summary.is_empty() {
                            new_description = Some(summary);
                        }
                    }
                    Ok(None) => {
                        debug!(segment, entry_id = %entry.id, stage = "summary",
                            "Backend produced no summary");
                    }
                    Err(e) => {
                        warn!(segment, entry_id = %entry.id, stage = "summary",
                            error = %e, "Stage skipped after provider failure");
                    }
                }
            }
        }
        let description = new_description.clone().or_else(|| entry.description.clone());

        // Stage 3: title. Never overwrite a user-provided title.
        let mut new_title: Option<String> = None;
        if !request.title_provided && self.config.title_enabled {
            if let (Some(text), Some(backend)) = (&description, &self.generation) {
                match backend.generate_title(text).await {
                    Ok(Some(title)) => {
                        let title = title.trim().to_string();
                        if !title.is_empty() && title != entry.title {
                            new_title = Some(title);
                        }
                    }
                    Ok(None) => {
                        debug!(segment, entry_id = %entry.id, stage = "title",
                            "Backend produced no title");
                    }
                    Err(e) => {
                        warn!(segment, entry_id = %entry.id, stage = "title",
                            error = %e, "Stage skipped after provider failure");
                    }
                }
            }
        }

        // Stage 4: tags. Suggestions are constrained to the favorite vocabulary.
        let mut new_tags: Option<Vec<String>> = None;
        if self.config.tags_enabled {
            if let (Some(text), Some(backend)) = (&description, &self.generation) {
                let favorites = self.store.preferences(segment).await?.favorite_tags;
                if favorites.is_empty() {
                    debug!(segment, entry_id = %entry.id, stage = "tags",
                        "No favorite vocabulary; stage skipped");
                } else {
                    match backend.suggest_tags(text, &favorites, &entry.tags).await {
                        Ok(suggestions) => {
                            // Out-of-vocabulary suggestions are discarded even
                            // if the provider returns them.
                            let allowed: Vec<String> = suggestions
                                .into_iter()
                                .filter(|s| contains_tag(&favorites, s))
                                .collect();
                            let merged = merge_tags(&entry.tags, &allowed);
                            if merged != entry.tags {
                                new_tags = Some(merged);
                            }
                        }
                        Err(e) => {
                            warn!(segment, entry_id = %entry.id, stage = "tags",
                                error = %e, "Stage skipped after provider failure");
                        }
                    }
                }
            }
        }

        // One store update and one re-index when anything changed. The
        // transcript rides along into the index only; it is not part of the
        // persisted entry.
        let changed = transcript_generated
            || new_description.is_some()
            || new_title.is_some()
            || new_tags.is_some();
        if changed {
            let updated = self
                .store
                .update(
                    segment,
                    entry.id,
                    UpdateEntryRequest {
                        title: new_title,
                        description: new_description,
                        tags: new_tags,
                        completed_at: None,
                    },
                )
                .await?;
            self.index.index(segment, updated, transcript).await?;
        }

        Ok(true)
    }
}

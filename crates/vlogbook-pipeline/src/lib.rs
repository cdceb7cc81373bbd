//! # vlogbook-pipeline
//!
//! Asynchronous enrichment of video diary entries.
//!
//! A single background worker drains an unbounded queue of processing
//! requests and runs the transcript → summary → title → tags stage sequence
//! against pluggable capability backends. Provider failures degrade
//! gracefully; entries interrupted by a crash are recovered on the next
//! start.
//!
//! ## Example
//!
//! ```ignore
//! use vlogbook_pipeline::{EnrichmentWorker, PipelineConfig};
//!
//! let worker = EnrichmentWorker::new(store, index, PipelineConfig::from_env())
//!     .with_transcription(whisper)
//!     .with_generation(ollama);
//!
//! let queue = worker.queue();
//! worker.recover().await?;            // re-enqueue InProgress entries
//! let handle = worker.start();
//!
//! queue.submit(&store, "alice", request).await?;
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod worker;

pub use worker::{
    EnrichmentQueue, EnrichmentWorker, PipelineConfig, WorkerEvent, WorkerHandle,
};

//! # vlogbook-store
//!
//! Durable, per-user-segment storage for vlogbook:
//!
//! - [`EntryStore`]: JSON-indexed entry CRUD with lazy per-segment
//!   initialization, legacy index migration, and atomic index rewrites
//! - transcript/embedding sidecar files stored next to each media file
//! - [`UploadSessionManager`]: resumable chunked uploads to temp files
//!
//! All persistence for a segment lives under `<data_root>/<segment>/`.

pub mod index;
pub mod paths;
pub mod sidecar;
pub mod store;
pub mod upload;

pub use paths::SegmentPaths;
pub use store::{EntryStore, MediaSource, SaveRequest, StoreConfig};
pub use upload::UploadSessionManager;

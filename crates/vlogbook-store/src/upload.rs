//! Resumable chunked upload sessions.
//!
//! Sessions are held only in memory; a process restart loses in-flight
//! uploads and clients must restart. Ownership violations are reported as
//! [`Error::SessionNotFound`] so a foreign caller cannot distinguish "not
//! mine" from "does not exist".

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vlogbook_core::{defaults, Error, Result, UploadSession};

use crate::paths::SegmentPaths;

/// Tracks resumable chunked uploads to per-segment temp files.
pub struct UploadSessionManager {
    data_root: PathBuf,
    sessions: RwLock<HashMap<Uuid, UploadSession>>,
}

impl UploadSessionManager {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Begin a new upload session, allocating a temp file under the
    /// segment's upload directory.
    pub async fn start(
        &self,
        segment: &str,
        file_name: &str,
        total_bytes: u64,
    ) -> Result<UploadSession> {
        let id = Uuid::new_v4();
        let upload_dir = SegmentPaths::new(&self.data_root, segment).upload_dir();
        fs::create_dir_all(&upload_dir).await?;

        let temp_path = upload_dir.join(format!("{}.{}", id, defaults::UPLOAD_TEMP_EXTENSION));
        // Create the file up front so out-of-order first chunks have
        // something to seek in.
        fs::File::create(&temp_path).await?;

        let session = UploadSession {
            id,
            segment: segment.to_string(),
            temp_path,
            file_name: file_name.to_string(),
            total_bytes,
            bytes_received: 0,
            created_at: Utc::now(),
        };

        info!(segment, session_id = %id, file_name, total_bytes, "Started upload session");
        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    /// Append a chunk at `offset`, clamped to the current file length when
    /// the client sends chunks out of order. Returns the new file length.
    ///
    /// A `declared_total` larger than the session's recorded total extends
    /// it; the declared total is informational and never trusted over the
    /// actual byte count.
    pub async fn append_chunk(
        &self,
        segment: &str,
        id: Uuid,
        chunk: &[u8],
        offset: u64,
        declared_total: Option<u64>,
    ) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .filter(|s| s.segment == segment)
            .ok_or(Error::SessionNotFound(id))?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&session.temp_path)
            .await?;
        let current_len = file.metadata().await?.len();

        let write_at = if offset > current_len {
            warn!(
                session_id = %id,
                offset,
                current_len,
                "Out-of-order chunk offset clamped to current length"
            );
            current_len
        } else {
            offset
        };

        file.seek(SeekFrom::Start(write_at)).await?;
        file.write_all(chunk).await?;
        file.flush().await?;

        let new_len = current_len.max(write_at + chunk.len() as u64);
        session.bytes_received = new_len;
        if let Some(total) = declared_total {
            if total > session.total_bytes {
                session.total_bytes = total;
            }
        }

        debug!(session_id = %id, byte_count = chunk.len(), new_len, "Appended chunk");
        Ok(new_len)
    }

    /// Consume the session, returning its metadata for the caller to hand to
    /// the entry store. The temp file is left in place.
    pub async fn complete(&self, segment: &str, id: Uuid) -> Result<UploadSession> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(s) if s.segment == segment => {}
            _ => return Err(Error::SessionNotFound(id)),
        }
        let session = sessions.remove(&id).expect("session checked above");
        info!(segment, session_id = %id, bytes_received = session.bytes_received,
            "Completed upload session");
        Ok(session)
    }

    /// Discard the session and delete its temp file. Returns `false` when
    /// the session does not exist (or is not owned by `segment`).
    pub async fn cancel(&self, segment: &str, id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(s) if s.segment == segment => {}
            _ => return Ok(false),
        }
        let session = sessions.remove(&id).expect("session checked above");
        drop(sessions);

        match fs::remove_file(&session.temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(segment, session_id = %id, "Cancelled upload session");
        Ok(true)
    }

    /// Number of live sessions (all segments).
    pub async fn live_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_creates_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());

        let session = manager.start("alice", "clip.webm", 100).await.unwrap();
        assert!(session.temp_path.exists());
        assert_eq!(session.bytes_received, 0);
        assert_eq!(manager.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_append_sequential_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 10).await.unwrap();

        let len = manager
            .append_chunk("alice", session.id, b"hello", 0, None)
            .await
            .unwrap();
        assert_eq!(len, 5);
        let len = manager
            .append_chunk("alice", session.id, b" world", 5, None)
            .await
            .unwrap();
        assert_eq!(len, 11);

        let done = manager.complete("alice", session.id).await.unwrap();
        assert_eq!(done.bytes_received, 11);
        assert_eq!(std::fs::read(&done.temp_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_out_of_order_offset_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 0).await.unwrap();

        // Declared offset far beyond the current length: clamp to 0.
        let len = manager
            .append_chunk("alice", session.id, b"abc", 999, None)
            .await
            .unwrap();
        assert_eq!(len, 3);

        let done = manager.complete("alice", session.id).await.unwrap();
        assert_eq!(std::fs::read(&done.temp_path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_foreign_segment_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 10).await.unwrap();

        let result = manager
            .append_chunk("mallory", session.id, b"x", 0, None)
            .await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));

        let result = manager.complete("mallory", session.id).await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));

        // Alice still owns the session.
        assert!(manager.complete("alice", session.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_consumes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 10).await.unwrap();

        manager.complete("alice", session.id).await.unwrap();
        let again = manager.complete("alice", session.id).await;
        assert!(matches!(again, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_deletes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 10).await.unwrap();
        let temp = session.temp_path.clone();

        assert!(manager.cancel("alice", session.id).await.unwrap());
        assert!(!temp.exists());
        assert!(!manager.cancel("alice", session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_declared_total_only_extends() {
        let dir = tempfile::tempdir().unwrap();
        let manager = UploadSessionManager::new(dir.path());
        let session = manager.start("alice", "clip.webm", 100).await.unwrap();

        manager
            .append_chunk("alice", session.id, b"abc", 0, Some(50))
            .await
            .unwrap();
        manager
            .append_chunk("alice", session.id, b"def", 3, Some(200))
            .await
            .unwrap();

        let done = manager.complete("alice", session.id).await.unwrap();
        assert_eq!(done.total_bytes, 200);
        // The actual byte count, not the declared total, is authoritative.
        assert_eq!(done.bytes_received, 6);
    }
}

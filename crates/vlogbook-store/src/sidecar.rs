//! Sidecar files: derived artifacts stored next to each media file.
//!
//! Transcripts live at the media path with a `.txt` extension, embeddings
//! with `.embeddings`. Embedding sidecar writes are last-write-wins; the
//! vector is derived solely from the description text, so the last writer
//! always holds the current value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::fs;
use tracing::{debug, warn};

use vlogbook_core::embedding::{decode_embedding, encode_embedding};
use vlogbook_core::Result;

use crate::paths::{deleted_marker_path, embedding_path, transcript_path, write_atomic};

/// Global map of media path → transcript generation lock.
///
/// At most one in-flight transcript generation per path. Entries are created
/// on demand and never removed; path cardinality is bounded by the library
/// size.
static TRANSCRIPT_LOCKS: Lazy<std::sync::Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    Lazy::new(|| std::sync::Mutex::new(HashMap::new()));

/// Lock handle guarding transcript generation for `media`.
pub fn transcript_lock(media: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = TRANSCRIPT_LOCKS.lock().expect("transcript lock map poisoned");
    locks
        .entry(media.to_path_buf())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
}

/// Read the transcript sidecar. Whitespace-only content counts as absent.
pub async fn read_transcript(media: &Path) -> Result<Option<String>> {
    let path = transcript_path(media);
    match fs::read_to_string(&path).await {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the transcript sidecar.
pub async fn write_transcript(media: &Path, text: &str) -> Result<()> {
    let path = transcript_path(media);
    debug!(path = %path.display(), byte_count = text.len(), "Writing transcript sidecar");
    write_atomic(&path, text.as_bytes()).await
}

/// Read and decode the embedding sidecar. Decoding failures are logged and
/// reported as absent so one corrupt sidecar cannot poison listings.
pub async fn read_embedding(media: &Path) -> Result<Option<Vec<f32>>> {
    let path = embedding_path(media);
    match fs::read(&path).await {
        Ok(bytes) => match decode_embedding(&bytes) {
            Ok(vector) => Ok(Some(vector)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Undecodable embedding sidecar");
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the embedding sidecar in the current binary format.
pub async fn write_embedding(media: &Path, vector: &[f32]) -> Result<()> {
    let path = embedding_path(media);
    debug!(path = %path.display(), dimension = vector.len(), "Writing embedding sidecar");
    write_atomic(&path, &encode_embedding(vector)).await
}

/// Delete the embedding sidecar if present.
pub async fn delete_embedding(media: &Path) -> Result<()> {
    remove_if_exists(&embedding_path(media)).await
}

/// Delete every sidecar (transcript, embedding, soft-delete marker).
pub async fn delete_sidecars(media: &Path) -> Result<()> {
    remove_if_exists(&transcript_path(media)).await?;
    remove_if_exists(&embedding_path(media)).await?;
    remove_if_exists(&deleted_marker_path(media)).await?;
    Ok(())
}

/// Move sidecars alongside a renamed media file. Missing sidecars are
/// skipped; individual rename failures are logged and do not abort the
/// remaining renames.
pub async fn rename_sidecars(old_media: &Path, new_media: &Path) {
    for (from, to) in [
        (transcript_path(old_media), transcript_path(new_media)),
        (embedding_path(old_media), embedding_path(new_media)),
    ] {
        match fs::try_exists(&from).await {
            Ok(true) => {
                if let Err(e) = fs::rename(&from, &to).await {
                    warn!(from = %from.display(), to = %to.display(), error = %e,
                        "Sidecar rename failed");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %from.display(), error = %e, "Sidecar existence check failed");
            }
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transcript_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");

        assert_eq!(read_transcript(&media).await.unwrap(), None);

        write_transcript(&media, "hello world").await.unwrap();
        assert_eq!(
            read_transcript(&media).await.unwrap(),
            Some("hello world".to_string())
        );
    }

    #[tokio::test]
    async fn test_whitespace_transcript_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");

        write_transcript(&media, "   \n\t ").await.unwrap();
        assert_eq!(read_transcript(&media).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_embedding_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");

        let vector = vec![0.5f32, -1.0, 2.5];
        write_embedding(&media, &vector).await.unwrap();
        assert_eq!(read_embedding(&media).await.unwrap(), Some(vector));
    }

    #[tokio::test]
    async fn test_corrupt_embedding_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");

        std::fs::write(embedding_path(&media), [1u8, 2, 3]).unwrap();
        assert_eq!(read_embedding(&media).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_sidecars_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");

        write_transcript(&media, "text").await.unwrap();
        delete_sidecars(&media).await.unwrap();
        delete_sidecars(&media).await.unwrap();
        assert_eq!(read_transcript(&media).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rename_sidecars_moves_existing() {
        let dir = tempfile::tempdir().unwrap();
        let old_media = dir.path().join("old.mp4");
        let new_media = dir.path().join("new.mp4");

        write_transcript(&old_media, "text").await.unwrap();
        rename_sidecars(&old_media, &new_media).await;

        assert_eq!(read_transcript(&old_media).await.unwrap(), None);
        assert_eq!(
            read_transcript(&new_media).await.unwrap(),
            Some("text".to_string())
        );
    }

    #[test]
    fn test_transcript_lock_same_path_same_lock() {
        let a = transcript_lock(Path::new("/data/x/clip.mp4"));
        let b = transcript_lock(Path::new("/data/x/clip.mp4"));
        assert!(Arc::ptr_eq(&a, &b));

        let c = transcript_lock(Path::new("/data/x/other.mp4"));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

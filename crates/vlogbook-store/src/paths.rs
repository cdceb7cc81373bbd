//! Segment-rooted path resolution and atomic file writes.
//!
//! Historic index files recorded media locations inconsistently: sometimes
//! a bare filename, sometimes a full path. [`SegmentPaths::resolve`] accepts
//! both: relative paths resolve against the segment root, absolute paths
//! pass through unchanged.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use vlogbook_core::defaults;
use vlogbook_core::Result;

/// Filesystem layout of one user segment.
#[derive(Debug, Clone)]
pub struct SegmentPaths {
    root: PathBuf,
}

impl SegmentPaths {
    /// Paths for `segment` under `data_root`. The segment key must already
    /// be sanitized.
    pub fn new(data_root: impl AsRef<Path>, segment: &str) -> Self {
        Self {
            root: data_root.as_ref().join(segment),
        }
    }

    /// Segment root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The segment's `entries.json`.
    pub fn index_file(&self) -> PathBuf {
        self.root.join(defaults::INDEX_FILE_NAME)
    }

    /// Directory for in-flight upload temp files.
    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(defaults::UPLOAD_DIR_NAME)
    }

    /// Resolve a stored media path: absolute paths pass through, everything
    /// else is taken relative to the segment root.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Transcript sidecar path for a media file (`clip.mp4` → `clip.txt`).
pub fn transcript_path(media: &Path) -> PathBuf {
    media.with_extension(defaults::TRANSCRIPT_EXTENSION)
}

/// Embedding sidecar path for a media file (`clip.mp4` → `clip.embeddings`).
pub fn embedding_path(media: &Path) -> PathBuf {
    media.with_extension(defaults::EMBEDDING_EXTENSION)
}

/// Soft-delete marker path for a media file (`clip.mp4` → `clip.DELETED`).
pub fn deleted_marker_path(media: &Path) -> PathBuf {
    media.with_extension(defaults::DELETED_MARKER_EXTENSION)
}

/// Atomically write `data` to `path`: write a temp file, fsync, rename.
///
/// A crash mid-write leaves the previous file contents intact.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            warn!(parent = %parent.display(), error = %e, "create_dir_all failed");
            e
        })?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "File::create failed");
        e
    })?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(|e| {
        warn!(from = %temp_path.display(), to = %path.display(), error = %e, "rename failed");
        e
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_against_root() {
        let paths = SegmentPaths::new("/data", "alice");
        assert_eq!(
            paths.resolve("clip.mp4"),
            PathBuf::from("/data/alice/clip.mp4")
        );
    }

    #[test]
    fn test_resolve_absolute_passthrough() {
        let paths = SegmentPaths::new("/data", "alice");
        assert_eq!(
            paths.resolve("/mnt/old/clip.mp4"),
            PathBuf::from("/mnt/old/clip.mp4")
        );
    }

    #[test]
    fn test_index_file_location() {
        let paths = SegmentPaths::new("/data", "bob");
        assert_eq!(paths.index_file(), PathBuf::from("/data/bob/entries.json"));
    }

    #[test]
    fn test_sidecar_paths_replace_extension() {
        let media = Path::new("/data/alice/clip.mp4");
        assert_eq!(transcript_path(media), Path::new("/data/alice/clip.txt"));
        assert_eq!(
            embedding_path(media),
            Path::new("/data/alice/clip.embeddings")
        );
        assert_eq!(
            deleted_marker_path(media),
            Path::new("/data/alice/clip.DELETED")
        );
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.json");

        write_atomic(&target, b"one").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"one");

        write_atomic(&target, b"two").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"two");

        // No temp file left behind
        assert!(!target.with_extension("tmp").exists());
    }
}

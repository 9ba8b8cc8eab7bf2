//! Handle for the decoded upload and its cleanup.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::chunk::ChunkSource;

/// A decoded upload on local storage: a finite, seekable byte source plus
/// the capability to delete it.
///
/// Created by the upload decoder before the relay starts; read-only while
/// the relay runs; deleted by [`discard`](Self::discard) afterwards. Discard
/// consumes the artifact, so the backing file is deleted at most once.
#[derive(Debug)]
pub struct UploadArtifact {
    path: PathBuf,
    len: u64,
}

impl UploadArtifact {
    /// Wrap an already-written file.
    pub fn new(path: PathBuf, len: u64) -> Self {
        Self { path, len }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total byte length of the upload.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the upload carried zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open the upload for one chunked read pass.
    pub async fn open(&self, chunk_size: usize) -> std::io::Result<ChunkSource<tokio::fs::File>> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ChunkSource::new(file, chunk_size))
    }

    /// Delete the backing file.
    ///
    /// Runs after the response has been decided, so a deletion failure is
    /// logged and never surfaced to the client.
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed upload artifact"),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to remove upload artifact");
            }
        }
    }
}

//! Content-addressed persistence for screenshot artifacts.
//!
//! The store is append-mostly: writes of the same checksum are idempotent,
//! so concurrent writers need no coordination beyond the interior lock.

use crate::artifact::ScreenshotArtifact;
use crate::result::{CotejarError, CotejarResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Content-addressed blob store for screenshot bytes
pub trait ScreenshotStore: Send + Sync {
    /// Persist an artifact; returns its checksum.
    ///
    /// Writing a checksum that is already present is a no-op.
    fn put(&self, artifact: &ScreenshotArtifact) -> CotejarResult<String>;

    /// Fetch stored bytes by checksum
    fn get(&self, checksum: &str) -> CotejarResult<Vec<u8>>;

    /// Whether the store holds bytes for this checksum
    fn contains(&self, checksum: &str) -> bool;
}

/// In-memory store, used for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryScreenshotStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryScreenshotStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().expect("store lock poisoned").len()
    }

    /// True when no blobs are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScreenshotStore for MemoryScreenshotStore {
    fn put(&self, artifact: &ScreenshotArtifact) -> CotejarResult<String> {
        let mut blobs = self.blobs.write().expect("store lock poisoned");
        blobs
            .entry(artifact.checksum.clone())
            .or_insert_with(|| artifact.bytes.clone());
        Ok(artifact.checksum.clone())
    }

    fn get(&self, checksum: &str) -> CotejarResult<Vec<u8>> {
        let blobs = self.blobs.read().expect("store lock poisoned");
        blobs
            .get(checksum)
            .cloned()
            .ok_or_else(|| CotejarError::Storage {
                message: format!("artifact {checksum} not found in memory store"),
            })
    }

    fn contains(&self, checksum: &str) -> bool {
        self.blobs
            .read()
            .expect("store lock poisoned")
            .contains_key(checksum)
    }
}

/// Filesystem store: one file per checksum under a root directory
#[derive(Debug)]
pub struct FsScreenshotStore {
    dir: PathBuf,
}

impl FsScreenshotStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> CotejarResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| CotejarError::Storage {
            message: format!("failed to create store directory {}: {e}", dir.display()),
        })?;
        Ok(Self { dir })
    }

    fn blob_path(&self, checksum: &str) -> PathBuf {
        self.dir.join(format!("{checksum}.png"))
    }
}

/// Per-process sequence so concurrent writers never share a temp path
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl ScreenshotStore for FsScreenshotStore {
    fn put(&self, artifact: &ScreenshotArtifact) -> CotejarResult<String> {
        let path = self.blob_path(&artifact.checksum);
        if path.exists() {
            return Ok(artifact.checksum.clone());
        }
        // Unique temp file + rename keeps a concurrent reader from seeing a
        // torn write, and keeps concurrent writers of the same checksum off
        // each other's temp files
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(
            ".{}.{}.{seq}.tmp",
            artifact.checksum,
            std::process::id()
        ));
        fs::write(&tmp, &artifact.bytes).map_err(|e| CotejarError::Storage {
            message: format!("failed to write artifact {}: {e}", artifact.checksum),
        })?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            // Another writer of the same checksum winning the rename is the
            // idempotent no-op case, not a failure
            if path.exists() {
                return Ok(artifact.checksum.clone());
            }
            return Err(CotejarError::Storage {
                message: format!("failed to commit artifact {}: {e}", artifact.checksum),
            });
        }
        tracing::debug!(checksum = %artifact.checksum, key = %artifact.key, "stored artifact");
        Ok(artifact.checksum.clone())
    }

    fn get(&self, checksum: &str) -> CotejarResult<Vec<u8>> {
        let path = self.blob_path(checksum);
        fs::read(&path).map_err(|e| CotejarError::Storage {
            message: format!("failed to read artifact {checksum}: {e}"),
        })
    }

    fn contains(&self, checksum: &str) -> bool {
        self.blob_path(checksum).exists()
    }
}

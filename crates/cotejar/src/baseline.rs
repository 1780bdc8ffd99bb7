//! Baseline lifecycle management.
//!
//! Each capture key moves through `absent → active(v1) → active(v2) → …`.
//! The first comparison (or an explicit accept) creates version 1; only an
//! explicit accept advances the version — a failed comparison never
//! replaces a baseline on its own, since adopting a regression as the new
//! normal must stay a deliberate, auditable action. Baselines are never
//! deleted by the engine.

use crate::artifact::BaselineKey;
use crate::result::{CotejarError, CotejarResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// The active baseline for one capture key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    /// Capture key (minus variant) this baseline belongs to
    pub key: BaselineKey,
    /// Checksum of the accepted baseline artifact
    pub checksum: String,
    /// Monotonically increasing version, starting at 1
    pub version: u64,
    /// When version 1 was created
    pub created_at: DateTime<Utc>,
    /// When the current version was accepted
    pub updated_at: DateTime<Utc>,
}

/// Owns baseline existence/version state per capture key.
///
/// Reads take a shared lock and touch no I/O. Updates serialize on the
/// write lock, which is held only for the map swap and index rewrite, so
/// two concurrent accepts cannot interleave into an inconsistent version
/// and a caller-side timeout can never observe a half-applied update.
#[derive(Debug, Default)]
pub struct BaselineManager {
    index: RwLock<HashMap<BaselineKey, BaselineRecord>>,
    index_path: Option<PathBuf>,
}

impl BaselineManager {
    /// Create an in-memory manager with no durable index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager backed by a JSON index file, loading existing
    /// records if the file is present.
    ///
    /// # Errors
    ///
    /// Returns [`CotejarError::BaselineIndex`] if the file exists but
    /// cannot be read or parsed.
    pub fn with_index(path: impl AsRef<Path>) -> CotejarResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = HashMap::new();
        if path.exists() {
            let bytes = fs::read(&path).map_err(|e| CotejarError::BaselineIndex {
                message: format!("failed to read index {}: {e}", path.display()),
            })?;
            let records: Vec<BaselineRecord> =
                serde_json::from_slice(&bytes).map_err(|e| CotejarError::BaselineIndex {
                    message: format!("failed to parse index {}: {e}", path.display()),
                })?;
            for record in records {
                index.insert(record.key.clone(), record);
            }
        }
        Ok(Self {
            index: RwLock::new(index),
            index_path: Some(path),
        })
    }

    /// Active baseline for `key`, if any
    #[must_use]
    pub fn get(&self, key: &BaselineKey) -> Option<BaselineRecord> {
        self.index
            .read()
            .expect("baseline index lock poisoned")
            .get(key)
            .cloned()
    }

    /// Number of keys with an active baseline
    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .read()
            .expect("baseline index lock poisoned")
            .len()
    }

    /// True when no baselines exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `absent → active(v1)` transition; first writer wins.
    ///
    /// Returns the record and whether this call created it. When another
    /// caller already created a baseline for `key`, the existing record is
    /// returned with `created = false` and the supplied checksum is ignored.
    pub fn create_if_absent(
        &self,
        key: &BaselineKey,
        checksum: &str,
    ) -> CotejarResult<(BaselineRecord, bool)> {
        let mut index = self.index.write().expect("baseline index lock poisoned");
        if let Some(existing) = index.get(key) {
            return Ok((existing.clone(), false));
        }
        let now = Utc::now();
        let record = BaselineRecord {
            key: key.clone(),
            checksum: checksum.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.persist_with(&index, &record)?;
        index.insert(key.clone(), record.clone());
        tracing::info!(key = %key, checksum = %checksum, "baseline created");
        Ok((record, true))
    }

    /// Explicit "accept new baseline" operation.
    ///
    /// `absent → active(v1)` or `active(vN) → active(vN+1)`. The prior
    /// artifact stays retrievable by its checksum in the screenshot store;
    /// only the active mapping moves.
    pub fn accept(&self, key: &BaselineKey, checksum: &str) -> CotejarResult<BaselineRecord> {
        let mut index = self.index.write().expect("baseline index lock poisoned");
        let now = Utc::now();
        let record = match index.get(key) {
            Some(existing) => BaselineRecord {
                key: key.clone(),
                checksum: checksum.to_string(),
                version: existing.version + 1,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => BaselineRecord {
                key: key.clone(),
                checksum: checksum.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
            },
        };
        self.persist_with(&index, &record)?;
        index.insert(key.clone(), record.clone());
        tracing::info!(
            key = %key,
            version = record.version,
            checksum = %checksum,
            "baseline accepted"
        );
        Ok(record)
    }

    /// Rewrite the durable index while the write lock is held, with
    /// `pending` standing in for its key's current record.
    ///
    /// Called before the in-memory insert: if the rewrite fails, the map
    /// still matches the file on disk. Records are sorted by key so the
    /// file is byte-stable for unchanged state, and written via temp file
    /// + rename so a crash mid-write never leaves a torn index.
    fn persist_with(
        &self,
        index: &HashMap<BaselineKey, BaselineRecord>,
        pending: &BaselineRecord,
    ) -> CotejarResult<()> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };
        let mut records: Vec<&BaselineRecord> =
            index.values().filter(|r| r.key != pending.key).collect();
        records.push(pending);
        records.sort_by(|a, b| a.key.cmp(&b.key));
        let json = serde_json::to_vec_pretty(&records)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &json).map_err(|e| CotejarError::BaselineIndex {
            message: format!("failed to write index {}: {e}", path.display()),
        })?;
        fs::rename(&tmp, path).map_err(|e| CotejarError::BaselineIndex {
            message: format!("failed to commit index {}: {e}", path.display()),
        })?;
        Ok(())
    }
}

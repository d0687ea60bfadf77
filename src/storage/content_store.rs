// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-addressed blob store.
//!
//! Blobs are keyed by `sha256-<hex digest>` of their bytes. Identical bytes
//! always map to the same id, so `put` is idempotent and a stored blob can
//! be re-verified against its id on every read.
//!
//! ## Layout
//!
//! ```text
//! {data_dir}/blobs/
//!   {content_id}.bin    # sealed bytes exactly as handed to `put`
//!   {content_id}.json   # BlobMeta sidecar (size, mime type, pin state)
//! ```
//!
//! A blob counts as present only once its sidecar exists; the data file is
//! written first.

use std::fmt;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::blob_fs::{FsError, LocalFs};
use super::StoragePaths;

const CONTENT_ID_PREFIX: &str = "sha256-";
const DIGEST_HEX_LEN: usize = 64;

/// Default retention for unpinned blobs.
pub const DEFAULT_GC_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("content {content_id} failed verification: {reason}")]
    Integrity { content_id: String, reason: String },

    #[error("content {0} is pinned")]
    Pinned(String),

    #[error("content store not initialized")]
    NotInitialized,

    #[error("filesystem error: {0}")]
    Fs(FsError),
}

impl From<FsError> for ContentStoreError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotInitialized => ContentStoreError::NotInitialized,
            other => ContentStoreError::Fs(other),
        }
    }
}

pub type ContentResult<T> = Result<T, ContentStoreError>;

// =============================================================================
// Types
// =============================================================================

/// Self-certifying content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(
    value_type = String,
    example = "sha256-9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
)]
pub struct ContentId(String);

impl ContentId {
    /// Derive the id of `bytes`.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("{CONTENT_ID_PREFIX}{:x}", Sha256::digest(bytes)))
    }

    /// Parse an id received from outside. Rejects anything that is not a
    /// lowercase hex SHA-256 digest, which also keeps ids path-safe.
    pub fn parse(raw: &str) -> Option<Self> {
        let digest = raw.strip_prefix(CONTENT_ID_PREFIX)?;
        let well_formed = digest.len() == DIGEST_HEX_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sidecar metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlobMeta {
    pub content_id: ContentId,
    pub size: u64,
    pub mime_type: String,
    pub stored_at: DateTime<Utc>,
    pub pinned: bool,
}

/// Aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentStats {
    pub total_blobs: u64,
    pub total_bytes: u64,
    pub pinned_blobs: u64,
}

/// One blob in an export snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobSnapshot {
    #[serde(flatten)]
    pub meta: BlobMeta,
    /// Base64 of the sealed bytes.
    pub data: String,
}

// =============================================================================
// ContentStore
// =============================================================================

/// Local content-addressed store for sealed blobs.
#[derive(Debug)]
pub struct ContentStore {
    fs: LocalFs,
}

impl ContentStore {
    /// Create a store rooted at `paths`. Call [`ContentStore::init`] before use.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            fs: LocalFs::new(paths),
        }
    }

    /// Create directories and mark the store open. Idempotent.
    pub fn init(&self) -> ContentResult<()> {
        self.fs.initialize()?;
        info!(root = %self.fs.paths().root().display(), "Content store initialized");
        Ok(())
    }

    /// Mark the store closed. Subsequent operations fail with `NotInitialized`.
    pub fn close(&self) {
        self.fs.close();
        info!("Content store closed");
    }

    /// Underlying filesystem handle (shared with the audit log).
    pub fn fs(&self) -> &LocalFs {
        &self.fs
    }

    pub fn paths(&self) -> &StoragePaths {
        self.fs.paths()
    }

    /// Store `bytes` and return their content id.
    ///
    /// Storing bytes that are already present leaves the blob untouched and
    /// returns the same id. New blobs are pinned.
    pub fn put(&self, bytes: &[u8], mime_type: &str) -> ContentResult<ContentId> {
        let content_id = ContentId::for_bytes(bytes);
        let meta_path = self.paths().blob_meta(content_id.as_str());

        if self.fs.exists(&meta_path) {
            debug!(content_id = %content_id, "Content already stored");
            return Ok(content_id);
        }

        self.fs
            .write_raw(self.paths().blob_data(content_id.as_str()), bytes)?;

        let meta = BlobMeta {
            content_id: content_id.clone(),
            size: bytes.len() as u64,
            mime_type: mime_type.to_string(),
            stored_at: Utc::now(),
            pinned: true,
        };
        self.fs.write_json(&meta_path, &meta)?;

        debug!(content_id = %content_id, size = meta.size, "Stored content");
        Ok(content_id)
    }

    /// Fetch the bytes stored under `content_id`.
    ///
    /// The bytes are re-hashed; a mismatch with the id is reported as
    /// [`ContentStoreError::Integrity`]. Malformed ids are `NotFound`.
    pub fn get(&self, content_id: &str) -> ContentResult<Vec<u8>> {
        let id = Self::checked_id(content_id)?;
        if !self.fs.is_initialized() {
            return Err(ContentStoreError::NotInitialized);
        }
        if !self.fs.exists(self.paths().blob_meta(id.as_str())) {
            return Err(ContentStoreError::NotFound(content_id.to_string()));
        }

        let bytes = match self.fs.read_raw(self.paths().blob_data(id.as_str())) {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(_)) => {
                return Err(ContentStoreError::Integrity {
                    content_id: content_id.to_string(),
                    reason: "metadata present but data file missing".to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if ContentId::for_bytes(&bytes) != id {
            warn!(content_id = %id, "Stored bytes do not match content id");
            return Err(ContentStoreError::Integrity {
                content_id: content_id.to_string(),
                reason: "digest mismatch".to_string(),
            });
        }
        Ok(bytes)
    }

    /// Whether a blob is present.
    pub fn exists(&self, content_id: &str) -> bool {
        ContentId::parse(content_id)
            .is_some_and(|id| self.fs.exists(self.paths().blob_meta(id.as_str())))
    }

    /// Sidecar metadata of a blob.
    pub fn stat(&self, content_id: &str) -> ContentResult<BlobMeta> {
        let id = Self::checked_id(content_id)?;
        self.read_meta(&id)
    }

    /// Mark a blob as exempt from garbage collection.
    pub fn pin(&self, content_id: &str) -> ContentResult<()> {
        self.set_pinned(content_id, true)
    }

    /// Make a blob eligible for garbage collection.
    pub fn unpin(&self, content_id: &str) -> ContentResult<()> {
        self.set_pinned(content_id, false)
    }

    /// Remove an unpinned blob.
    pub fn remove(&self, content_id: &str) -> ContentResult<()> {
        let id = Self::checked_id(content_id)?;
        let meta = self.read_meta(&id)?;
        if meta.pinned {
            return Err(ContentStoreError::Pinned(content_id.to_string()));
        }
        self.delete_blob(&id)
    }

    /// Remove a blob regardless of pin state.
    ///
    /// Used to roll back a blob written by an upload that failed later on.
    pub(crate) fn discard(&self, content_id: &ContentId) -> ContentResult<()> {
        self.delete_blob(content_id)
    }

    /// All stored blobs, ordered by content id.
    pub fn list(&self) -> ContentResult<Vec<BlobMeta>> {
        let ids = self.fs.list_files(self.paths().blobs_dir(), "json")?;
        let mut metas = Vec::with_capacity(ids.len());
        for raw in ids {
            let Some(id) = ContentId::parse(&raw) else {
                warn!(file = %raw, "Ignoring unexpected file in blob directory");
                continue;
            };
            metas.push(self.read_meta(&id)?);
        }
        Ok(metas)
    }

    /// Remove unpinned blobs stored longer ago than `older_than`.
    ///
    /// Returns the number of blobs removed.
    pub fn gc(&self, older_than: Duration) -> ContentResult<usize> {
        let max_age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut removed = 0;
        for meta in self.list()? {
            if meta.pinned || meta.stored_at >= cutoff {
                continue;
            }
            self.delete_blob(&meta.content_id)?;
            removed += 1;
        }

        info!(removed, max_age_secs = older_than.as_secs(), "Content garbage collection finished");
        Ok(removed)
    }

    /// Aggregate blob statistics.
    /// Remove every blob, pinned or not. Data files left without a sidecar
    /// are removed too.
    ///
    /// Returns the number of content ids removed.
    pub fn clear(&self) -> ContentResult<usize> {
        let dir = self.paths().blobs_dir();
        let mut ids = self.fs.list_files(&dir, "json")?;
        ids.extend(self.fs.list_files(&dir, "bin")?);
        ids.sort();
        ids.dedup();

        let mut removed = 0;
        for raw in ids {
            let Some(id) = ContentId::parse(&raw) else {
                warn!(file = %raw, "Ignoring unexpected file in blob directory");
                continue;
            };
            self.delete_blob(&id)?;
            removed += 1;
        }

        warn!(removed, "Content store cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> ContentResult<ContentStats> {
        let mut stats = ContentStats::default();
        for meta in self.list()? {
            stats.total_blobs += 1;
            stats.total_bytes += meta.size;
            if meta.pinned {
                stats.pinned_blobs += 1;
            }
        }
        Ok(stats)
    }

    /// Snapshot of every blob with its sealed bytes in base64.
    pub fn export(&self) -> ContentResult<Vec<BlobSnapshot>> {
        let metas = self.list()?;
        let mut out = Vec::with_capacity(metas.len());
        for meta in metas {
            let bytes = self.fs.read_raw(self.paths().blob_data(meta.content_id.as_str()))?;
            out.push(BlobSnapshot {
                data: Base64::encode_string(&bytes),
                meta,
            });
        }
        Ok(out)
    }

    /// Probe the data directory.
    pub fn health_check(&self) -> ContentResult<()> {
        self.fs.health_check()?;
        Ok(())
    }

    // ========== Internals ==========

    fn checked_id(content_id: &str) -> ContentResult<ContentId> {
        ContentId::parse(content_id)
            .ok_or_else(|| ContentStoreError::NotFound(content_id.to_string()))
    }

    fn read_meta(&self, id: &ContentId) -> ContentResult<BlobMeta> {
        match self.fs.read_json(self.paths().blob_meta(id.as_str())) {
            Ok(meta) => Ok(meta),
            Err(FsError::NotFound(_)) => Err(ContentStoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn set_pinned(&self, content_id: &str, pinned: bool) -> ContentResult<()> {
        let id = Self::checked_id(content_id)?;
        let mut meta = self.read_meta(&id)?;
        if meta.pinned != pinned {
            meta.pinned = pinned;
            self.fs.write_json(self.paths().blob_meta(id.as_str()), &meta)?;
        }
        Ok(())
    }

    fn delete_blob(&self, id: &ContentId) -> ContentResult<()> {
        // Sidecar first: once it is gone the blob no longer counts as present.
        for path in [
            self.paths().blob_meta(id.as_str()),
            self.paths().blob_data(id.as_str()),
        ] {
            match self.fs.delete(&path) {
                Ok(()) | Err(FsError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(content_id = %id, "Removed content");
        Ok(())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk vault layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent vault data.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities for the vault data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all vault data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Blob Paths ==========

    /// Directory containing all content-addressed blobs.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path to the sealed bytes of a blob.
    pub fn blob_data(&self, content_id: &str) -> PathBuf {
        self.blobs_dir().join(format!("{content_id}.bin"))
    }

    /// Path to the metadata sidecar of a blob.
    pub fn blob_meta(&self, content_id: &str) -> PathBuf {
        self.blobs_dir().join(format!("{content_id}.json"))
    }

    // ========== Metadata Index ==========

    /// Path to the embedded metadata index database.
    pub fn index_db(&self) -> PathBuf {
        self.root.join("index.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("./data"));
    }

    #[test]
    fn blob_paths_share_a_stem() {
        let paths = StoragePaths::new("/tmp/vault");
        assert_eq!(paths.blobs_dir(), PathBuf::from("/tmp/vault/blobs"));
        assert_eq!(
            paths.blob_data("sha256-ab"),
            PathBuf::from("/tmp/vault/blobs/sha256-ab.bin")
        );
        assert_eq!(
            paths.blob_meta("sha256-ab"),
            PathBuf::from("/tmp/vault/blobs/sha256-ab.json")
        );
    }

    #[test]
    fn index_and_audit_paths_are_correct() {
        let paths = StoragePaths::new("/tmp/vault");
        assert_eq!(paths.index_db(), PathBuf::from("/tmp/vault/index.redb"));
        assert_eq!(
            paths.audit_events_file("2026-03-01"),
            PathBuf::from("/tmp/vault/audit/2026-03-01/events.jsonl")
        );
    }
}

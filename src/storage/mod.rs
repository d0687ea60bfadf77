// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Storage
//!
//! Persistent state of the vault, split in two halves:
//!
//! - **Content store**: sealed object bytes, addressed by the SHA-256 of
//!   those bytes. It never sees plaintext or keys.
//! - **Metadata index**: owners, object metadata, per-object key records,
//!   access grants, and shared-key copies in an embedded redb database.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   blobs/
//!     {content_id}.bin     # Sealed object bytes
//!     {content_id}.json    # Blob sidecar (size, mime type, pin state)
//!   index.redb             # Metadata index
//!   audit/
//!     {date}/events.jsonl  # Daily audit logs
//! ```

pub mod audit;
pub mod blob_fs;
pub mod content_store;
pub mod index;
pub mod ownership;
pub mod paths;
pub mod records;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use blob_fs::{FsError, FsResult, LocalFs};
pub use content_store::{
    BlobMeta, BlobSnapshot, ContentId, ContentStats, ContentStore, ContentStoreError,
    DEFAULT_GC_MAX_AGE,
};
pub use index::{
    GrantOutcome, IndexError, IndexSnapshot, IndexStats, IntegrityIssue, IssueKind,
    MetadataIndex, RevokeOutcome,
};
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use paths::StoragePaths;
pub use records::{
    AccessGrant, DataCategory, EncryptionKeyRecord, ObjectRecord, OwnerRecord, SharedKeyCopy,
};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded metadata index backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Primary tables (id → JSON record):
//! - `owners`: address → OwnerRecord
//! - `objects`: object_id → ObjectRecord
//! - `key_records`: key_id → EncryptionKeyRecord
//! - `access_grants`: grant_id → AccessGrant
//! - `shared_keys`: shared_key_id → SharedKeyCopy
//!
//! Secondary indexes (composite keys are `scope|id`):
//! - `idx_objects_by_owner`: owner|object_id → content_id
//! - `idx_objects_by_content`: content_id → object_id
//! - `idx_key_by_object`: object_id → key_id
//! - `idx_grants_by_owner`: owner|grant_id → grantee
//! - `idx_grants_by_grantee`: grantee|grant_id → owner
//! - `idx_shared_by_grantee`: grantee|object_id → shared_key_id
//!
//! - `ledger_state`: key → value (reconciler checkpoint)
//!
//! Every multi-record mutation runs in a single write transaction, so a
//! crash never leaves an object without its key or a grant half-applied.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::records::{
    AccessGrant, EncryptionKeyRecord, ObjectRecord, OwnerRecord, SharedKeyCopy,
};

// =============================================================================
// Table Definitions
// =============================================================================

const OWNERS: TableDefinition<&str, &[u8]> = TableDefinition::new("owners");
const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");
const KEY_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("key_records");
const ACCESS_GRANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("access_grants");
const SHARED_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("shared_keys");

const OBJECTS_BY_OWNER: TableDefinition<&[u8], &str> =
    TableDefinition::new("idx_objects_by_owner");
const OBJECTS_BY_CONTENT: TableDefinition<&str, &str> =
    TableDefinition::new("idx_objects_by_content");
const KEY_BY_OBJECT: TableDefinition<&str, &str> = TableDefinition::new("idx_key_by_object");
const GRANTS_BY_OWNER: TableDefinition<&[u8], &str> = TableDefinition::new("idx_grants_by_owner");
const GRANTS_BY_GRANTEE: TableDefinition<&[u8], &str> =
    TableDefinition::new("idx_grants_by_grantee");
const SHARED_BY_GRANTEE: TableDefinition<&[u8], &str> =
    TableDefinition::new("idx_shared_by_grantee");

const LEDGER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger_state");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("index inconsistency: {0}")]
    Integrity(String),

    #[error("owner {0} has no complete objects to share")]
    NothingToShare(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

// =============================================================================
// Result Types
// =============================================================================

/// Outcome of [`MetadataIndex::grant_access`].
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    /// The active grant for the pair (reused if one already existed).
    pub grant: AccessGrant,
    /// Shared-key copies created by this call.
    pub created: Vec<SharedKeyCopy>,
    /// Objects the grantee already had a copy for.
    pub already_shared: usize,
}

/// Outcome of [`MetadataIndex::revoke_access`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RevokeOutcome {
    pub removed_copies: usize,
    pub deactivated_grants: usize,
}

/// Row counts per primary table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IndexStats {
    pub owners: u64,
    pub objects: u64,
    pub key_records: u64,
    pub access_grants: u64,
    pub shared_keys: u64,
}

/// Full dump of every primary table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub owners: Vec<OwnerRecord>,
    pub objects: Vec<ObjectRecord>,
    pub key_records: Vec<EncryptionKeyRecord>,
    pub access_grants: Vec<AccessGrant>,
    pub shared_keys: Vec<SharedKeyCopy>,
}

/// Kind of inconsistency found by [`MetadataIndex::verify_integrity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    OrphanObject,
    MissingKeyRecord,
    IncompleteObject,
    OrphanKeyRecord,
    DanglingSharedKey,
    StaleIndexEntry,
    /// Object whose sealed bytes are absent from the content store.
    MissingBlob,
}

/// One inconsistency between records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntegrityIssue {
    pub kind: IssueKind,
    pub record_id: String,
    pub detail: String,
}

impl IntegrityIssue {
    pub fn new(kind: IssueKind, record_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            record_id: record_id.into(),
            detail: detail.into(),
        }
    }
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Composite key `scope|id`.
fn make_index_key(scope: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + id.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Prefix key for range scanning everything under `scope`.
fn make_prefix(scope: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(scope.len() + 1);
    prefix.extend_from_slice(scope.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a range scan (prefix with 0xFF bytes appended).
///
/// Ids are ASCII, so any key under the prefix sorts below this bound.
fn make_prefix_end(scope: &str) -> Vec<u8> {
    let mut end = make_prefix(scope);
    end.extend_from_slice(&[0xFF; 4]);
    end
}

/// The `id` half of a composite key.
fn id_from_key(key: &[u8]) -> Option<String> {
    let pos = key.iter().position(|&b| b == b'|')?;
    String::from_utf8(key[pos + 1..].to_vec()).ok()
}

/// `(id, value)` pairs of every index entry under `scope`.
fn scan_scope<T>(table: &T, scope: &str) -> IndexResult<Vec<(String, String)>>
where
    T: ReadableTable<&'static [u8], &'static str>,
{
    let start = make_prefix(scope);
    let end = make_prefix_end(scope);

    let mut entries = Vec::new();
    for entry in table.range(start.as_slice()..end.as_slice())? {
        let (key, value) = entry?;
        if let Some(id) = id_from_key(key.value()) {
            entries.push((id, value.value().to_string()));
        }
    }
    Ok(entries)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> IndexResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Deserialize every row of a primary table.
fn decode_all<T, R>(table: &R) -> IndexResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

// =============================================================================
// MetadataIndex
// =============================================================================

/// Embedded ACID store for owners, objects, keys, grants, and shared keys.
pub struct MetadataIndex {
    db: Database,
}

impl MetadataIndex {
    /// Open (or create) the index at the given path.
    pub fn open(path: &Path) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OWNERS)?;
            let _ = write_txn.open_table(OBJECTS)?;
            let _ = write_txn.open_table(KEY_RECORDS)?;
            let _ = write_txn.open_table(ACCESS_GRANTS)?;
            let _ = write_txn.open_table(SHARED_KEYS)?;
            let _ = write_txn.open_table(OBJECTS_BY_OWNER)?;
            let _ = write_txn.open_table(OBJECTS_BY_CONTENT)?;
            let _ = write_txn.open_table(KEY_BY_OBJECT)?;
            let _ = write_txn.open_table(GRANTS_BY_OWNER)?;
            let _ = write_txn.open_table(GRANTS_BY_GRANTEE)?;
            let _ = write_txn.open_table(SHARED_BY_GRANTEE)?;
            let _ = write_txn.open_table(LEDGER_STATE)?;
        }
        write_txn.commit()?;

        info!(path = %path.display(), "Metadata index opened");
        Ok(Self { db })
    }

    // =========================================================================
    // Owners
    // =========================================================================

    /// Insert a new owner profile.
    pub fn insert_owner(&self, owner: &OwnerRecord) -> IndexResult<()> {
        let json = serde_json::to_vec(owner)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OWNERS)?;
            if table.get(owner.address.as_str())?.is_some() {
                return Err(IndexError::Conflict(format!("owner {}", owner.address)));
            }
            table.insert(owner.address.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_owner(&self, address: &str) -> IndexResult<Option<OwnerRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OWNERS)?;
        match table.get(address)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// All owners, ordered by address.
    pub fn list_owners(&self) -> IndexResult<Vec<OwnerRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OWNERS)?;
        decode_all(&table)
    }

    // =========================================================================
    // Objects and key records
    // =========================================================================

    /// Insert an object together with its key record.
    ///
    /// Fails with `NotFound` if the owner is unknown and `Conflict` if the
    /// object id or content id is already indexed. Nothing is written on
    /// failure.
    pub fn insert_object_with_key(
        &self,
        object: &ObjectRecord,
        key: &EncryptionKeyRecord,
    ) -> IndexResult<()> {
        if object.key_record_id.as_deref() != Some(key.id.as_str()) || key.object_id != object.id
        {
            return Err(IndexError::Integrity(format!(
                "object {} and key record {} do not reference each other",
                object.id, key.id
            )));
        }

        let object_json = serde_json::to_vec(object)?;
        let key_json = serde_json::to_vec(key)?;

        let write_txn = self.db.begin_write()?;
        {
            let owners = write_txn.open_table(OWNERS)?;
            if owners.get(object.owner_address.as_str())?.is_none() {
                return Err(IndexError::NotFound(format!("owner {}", object.owner_address)));
            }

            let mut objects = write_txn.open_table(OBJECTS)?;
            if objects.get(object.id.as_str())?.is_some() {
                return Err(IndexError::Conflict(format!("object {}", object.id)));
            }
            let mut by_content = write_txn.open_table(OBJECTS_BY_CONTENT)?;
            if by_content.get(object.content_id.as_str())?.is_some() {
                return Err(IndexError::Conflict(format!("content {}", object.content_id)));
            }

            let mut keys = write_txn.open_table(KEY_RECORDS)?;
            let mut key_by_object = write_txn.open_table(KEY_BY_OBJECT)?;
            let mut by_owner = write_txn.open_table(OBJECTS_BY_OWNER)?;

            objects.insert(object.id.as_str(), object_json.as_slice())?;
            keys.insert(key.id.as_str(), key_json.as_slice())?;
            key_by_object.insert(object.id.as_str(), key.id.as_str())?;
            by_content.insert(object.content_id.as_str(), object.id.as_str())?;
            let owner_key = make_index_key(&object.owner_address, &object.id);
            by_owner.insert(owner_key.as_slice(), object.content_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_object(&self, object_id: &str) -> IndexResult<Option<ObjectRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OBJECTS)?;
        match table.get(object_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up the object stored under a content id.
    pub fn get_object_by_content(&self, content_id: &str) -> IndexResult<Option<ObjectRecord>> {
        let read_txn = self.db.begin_read()?;
        let by_content = read_txn.open_table(OBJECTS_BY_CONTENT)?;
        let objects = read_txn.open_table(OBJECTS)?;

        let object_id = match by_content.get(content_id)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        match objects.get(object_id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Err(IndexError::Integrity(format!(
                "content {content_id} points at missing object {object_id}"
            ))),
        }
    }

    /// Objects owned by `owner`, oldest first.
    pub fn list_objects_by_owner(&self, owner: &str) -> IndexResult<Vec<ObjectRecord>> {
        let read_txn = self.db.begin_read()?;
        let by_owner = read_txn.open_table(OBJECTS_BY_OWNER)?;
        let objects = read_txn.open_table(OBJECTS)?;

        let mut out = Vec::new();
        for (object_id, _) in scan_scope(&by_owner, owner)? {
            match objects.get(object_id.as_str())? {
                Some(value) => out.push(decode::<ObjectRecord>(value.value())?),
                None => {
                    warn!(owner, object_id = %object_id, "Owner index points at missing object")
                }
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn get_key_record(&self, key_id: &str) -> IndexResult<Option<EncryptionKeyRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEY_RECORDS)?;
        match table.get(key_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Key record for an object, via the object → key index.
    pub fn get_key_for_object(&self, object_id: &str) -> IndexResult<Option<EncryptionKeyRecord>> {
        let read_txn = self.db.begin_read()?;
        let key_by_object = read_txn.open_table(KEY_BY_OBJECT)?;
        let keys = read_txn.open_table(KEY_RECORDS)?;

        let key_id = match key_by_object.get(object_id)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        match keys.get(key_id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Grants and shared keys
    // =========================================================================

    /// Record a grant and hand the grantee a copy of every complete object
    /// key of `owner` they do not hold yet.
    ///
    /// An existing active grant for the pair is reused. Fails with
    /// `NothingToShare` (and writes nothing) when the owner has no object
    /// with a resolvable key.
    pub fn grant_access(
        &self,
        owner: &str,
        grantee: &str,
        now: DateTime<Utc>,
    ) -> IndexResult<GrantOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let by_owner = write_txn.open_table(OBJECTS_BY_OWNER)?;
            let key_by_object = write_txn.open_table(KEY_BY_OBJECT)?;
            let keys = write_txn.open_table(KEY_RECORDS)?;
            let mut shared = write_txn.open_table(SHARED_KEYS)?;
            let mut shared_idx = write_txn.open_table(SHARED_BY_GRANTEE)?;
            let mut grants = write_txn.open_table(ACCESS_GRANTS)?;
            let mut grants_by_owner = write_txn.open_table(GRANTS_BY_OWNER)?;
            let mut grants_by_grantee = write_txn.open_table(GRANTS_BY_GRANTEE)?;

            let mut shareable = Vec::new();
            for (object_id, _) in scan_scope(&by_owner, owner)? {
                let key_id = match key_by_object.get(object_id.as_str())? {
                    Some(value) => value.value().to_string(),
                    None => continue,
                };
                if keys.get(key_id.as_str())?.is_none() {
                    warn!(
                        object_id = %object_id,
                        key_id = %key_id,
                        "Skipping object with dangling key record"
                    );
                    continue;
                }
                shareable.push((object_id, key_id));
            }
            if shareable.is_empty() {
                return Err(IndexError::NothingToShare(owner.to_string()));
            }

            let mut existing = None;
            for (grant_id, granted_to) in scan_scope(&grants_by_owner, owner)? {
                if granted_to != grantee {
                    continue;
                }
                if let Some(value) = grants.get(grant_id.as_str())? {
                    let grant: AccessGrant = decode(value.value())?;
                    if grant.is_active {
                        existing = Some(grant);
                        break;
                    }
                }
            }

            let grant = match existing {
                Some(grant) => grant,
                None => {
                    let grant = AccessGrant {
                        id: uuid::Uuid::new_v4().to_string(),
                        owner_address: owner.to_string(),
                        granted_to: grantee.to_string(),
                        granted_at: now,
                        revoked_at: None,
                        is_active: true,
                    };
                    let json = serde_json::to_vec(&grant)?;
                    grants.insert(grant.id.as_str(), json.as_slice())?;
                    let owner_key = make_index_key(owner, &grant.id);
                    grants_by_owner.insert(owner_key.as_slice(), grantee)?;
                    let grantee_key = make_index_key(grantee, &grant.id);
                    grants_by_grantee.insert(grantee_key.as_slice(), owner)?;
                    grant
                }
            };

            let mut created = Vec::new();
            let mut already_shared = 0;
            for (object_id, key_id) in shareable {
                let idx_key = make_index_key(grantee, &object_id);
                if shared_idx.get(idx_key.as_slice())?.is_some() {
                    already_shared += 1;
                    continue;
                }
                let copy = SharedKeyCopy {
                    id: uuid::Uuid::new_v4().to_string(),
                    original_key_record_id: key_id,
                    shared_with: grantee.to_string(),
                    shared_by: owner.to_string(),
                    object_id,
                    shared_at: now,
                };
                let json = serde_json::to_vec(&copy)?;
                shared.insert(copy.id.as_str(), json.as_slice())?;
                shared_idx.insert(idx_key.as_slice(), copy.id.as_str())?;
                created.push(copy);
            }

            GrantOutcome {
                grant,
                created,
                already_shared,
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Remove every shared-key copy `grantee` holds for objects of `owner`
    /// and deactivate the pair's active grants.
    pub fn revoke_access(
        &self,
        owner: &str,
        grantee: &str,
        now: DateTime<Utc>,
    ) -> IndexResult<RevokeOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let by_owner = write_txn.open_table(OBJECTS_BY_OWNER)?;
            let mut shared = write_txn.open_table(SHARED_KEYS)?;
            let mut shared_idx = write_txn.open_table(SHARED_BY_GRANTEE)?;
            let mut grants = write_txn.open_table(ACCESS_GRANTS)?;
            let grants_by_owner = write_txn.open_table(GRANTS_BY_OWNER)?;

            let mut outcome = RevokeOutcome::default();

            for (object_id, _) in scan_scope(&by_owner, owner)? {
                let idx_key = make_index_key(grantee, &object_id);
                let removed = shared_idx
                    .remove(idx_key.as_slice())?
                    .map(|value| value.value().to_string());
                if let Some(copy_id) = removed {
                    shared.remove(copy_id.as_str())?;
                    outcome.removed_copies += 1;
                }
            }

            for (grant_id, granted_to) in scan_scope(&grants_by_owner, owner)? {
                if granted_to != grantee {
                    continue;
                }
                let bytes = match grants.get(grant_id.as_str())? {
                    Some(value) => value.value().to_vec(),
                    None => continue,
                };
                let mut grant: AccessGrant = decode(&bytes)?;
                if !grant.is_active {
                    continue;
                }
                grant.is_active = false;
                grant.revoked_at = Some(now);
                let json = serde_json::to_vec(&grant)?;
                grants.insert(grant_id.as_str(), json.as_slice())?;
                outcome.deactivated_grants += 1;
            }

            outcome
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// The shared-key copy `grantee` holds for `object_id`, if any.
    pub fn get_shared_key(
        &self,
        grantee: &str,
        object_id: &str,
    ) -> IndexResult<Option<SharedKeyCopy>> {
        let read_txn = self.db.begin_read()?;
        let shared_idx = read_txn.open_table(SHARED_BY_GRANTEE)?;
        let shared = read_txn.open_table(SHARED_KEYS)?;

        let idx_key = make_index_key(grantee, object_id);
        let copy_id = match shared_idx.get(idx_key.as_slice())? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        match shared.get(copy_id.as_str())? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every shared-key copy held by `grantee`.
    pub fn list_shared_keys_for_grantee(&self, grantee: &str) -> IndexResult<Vec<SharedKeyCopy>> {
        let read_txn = self.db.begin_read()?;
        let shared_idx = read_txn.open_table(SHARED_BY_GRANTEE)?;
        let shared = read_txn.open_table(SHARED_KEYS)?;

        let mut out = Vec::new();
        for (_, copy_id) in scan_scope(&shared_idx, grantee)? {
            if let Some(value) = shared.get(copy_id.as_str())? {
                out.push(decode(value.value())?);
            }
        }
        Ok(out)
    }

    /// Grants issued by `owner`, newest first.
    pub fn list_grants_by_owner(&self, owner: &str) -> IndexResult<Vec<AccessGrant>> {
        self.list_grants(GRANTS_BY_OWNER, owner)
    }

    /// Grants received by `grantee`, newest first.
    pub fn list_grants_by_grantee(&self, grantee: &str) -> IndexResult<Vec<AccessGrant>> {
        self.list_grants(GRANTS_BY_GRANTEE, grantee)
    }

    /// Most recent grant between `owner` and `grantee`, active or not.
    pub fn latest_grant(&self, owner: &str, grantee: &str) -> IndexResult<Option<AccessGrant>> {
        Ok(self
            .list_grants_by_owner(owner)?
            .into_iter()
            .find(|grant| grant.granted_to == grantee))
    }

    fn list_grants(
        &self,
        index: TableDefinition<'static, &'static [u8], &'static str>,
        scope: &str,
    ) -> IndexResult<Vec<AccessGrant>> {
        let read_txn = self.db.begin_read()?;
        let idx = read_txn.open_table(index)?;
        let grants = read_txn.open_table(ACCESS_GRANTS)?;

        let mut out = Vec::new();
        for (grant_id, _) in scan_scope(&idx, scope)? {
            if let Some(value) = grants.get(grant_id.as_str())? {
                out.push(decode::<AccessGrant>(value.value())?);
            }
        }
        out.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(out)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub fn stats(&self) -> IndexResult<IndexStats> {
        let read_txn = self.db.begin_read()?;
        Ok(IndexStats {
            owners: read_txn.open_table(OWNERS)?.len()?,
            objects: read_txn.open_table(OBJECTS)?.len()?,
            key_records: read_txn.open_table(KEY_RECORDS)?.len()?,
            access_grants: read_txn.open_table(ACCESS_GRANTS)?.len()?,
            shared_keys: read_txn.open_table(SHARED_KEYS)?.len()?,
        })
    }

    /// Dump every primary table in a single consistent read.
    pub fn export(&self) -> IndexResult<IndexSnapshot> {
        let read_txn = self.db.begin_read()?;
        Ok(IndexSnapshot {
            owners: decode_all(&read_txn.open_table(OWNERS)?)?,
            objects: decode_all(&read_txn.open_table(OBJECTS)?)?,
            key_records: decode_all(&read_txn.open_table(KEY_RECORDS)?)?,
            access_grants: decode_all(&read_txn.open_table(ACCESS_GRANTS)?)?,
            shared_keys: decode_all(&read_txn.open_table(SHARED_KEYS)?)?,
        })
    }

    /// Cross-check records and indexes. Read-only; returns every issue found.
    pub fn verify_integrity(&self) -> IndexResult<Vec<IntegrityIssue>> {
        let snapshot = self.export()?;
        let read_txn = self.db.begin_read()?;
        let by_content = read_txn.open_table(OBJECTS_BY_CONTENT)?;
        let key_by_object = read_txn.open_table(KEY_BY_OBJECT)?;

        let owners: std::collections::HashSet<&str> =
            snapshot.owners.iter().map(|o| o.address.as_str()).collect();
        let objects: std::collections::HashSet<&str> =
            snapshot.objects.iter().map(|o| o.id.as_str()).collect();
        let keys: std::collections::HashSet<&str> =
            snapshot.key_records.iter().map(|k| k.id.as_str()).collect();

        let mut issues = Vec::new();

        for object in &snapshot.objects {
            if !owners.contains(object.owner_address.as_str()) {
                issues.push(IntegrityIssue::new(
                    IssueKind::OrphanObject,
                    &object.id,
                    format!("owner {} is not registered", object.owner_address),
                ));
            }
            match object.key_record_id.as_deref() {
                None => issues.push(IntegrityIssue::new(
                    IssueKind::IncompleteObject,
                    &object.id,
                    "object has no key record",
                )),
                Some(key_id) if !keys.contains(key_id) => issues.push(IntegrityIssue::new(
                    IssueKind::MissingKeyRecord,
                    &object.id,
                    format!("key record {key_id} does not exist"),
                )),
                Some(_) => {}
            }
            if by_content.get(object.content_id.as_str())?.is_none() {
                issues.push(IntegrityIssue::new(
                    IssueKind::StaleIndexEntry,
                    &object.id,
                    "missing from content index",
                ));
            }
            if key_by_object.get(object.id.as_str())?.is_none() && object.key_record_id.is_some() {
                issues.push(IntegrityIssue::new(
                    IssueKind::StaleIndexEntry,
                    &object.id,
                    "missing from key index",
                ));
            }
        }

        for key in &snapshot.key_records {
            if !objects.contains(key.object_id.as_str()) {
                issues.push(IntegrityIssue::new(
                    IssueKind::OrphanKeyRecord,
                    &key.id,
                    format!("object {} does not exist", key.object_id),
                ));
            }
        }

        for copy in &snapshot.shared_keys {
            if !keys.contains(copy.original_key_record_id.as_str())
                || !objects.contains(copy.object_id.as_str())
            {
                issues.push(IntegrityIssue::new(
                    IssueKind::DanglingSharedKey,
                    &copy.id,
                    format!(
                        "references key {} / object {}",
                        copy.original_key_record_id, copy.object_id
                    ),
                ));
            }
        }

        for entry in by_content.iter()? {
            let (content_id, object_id) = entry?;
            if !objects.contains(object_id.value()) {
                issues.push(IntegrityIssue::new(
                    IssueKind::StaleIndexEntry,
                    content_id.value(),
                    format!("content index points at missing object {}", object_id.value()),
                ));
            }
        }

        Ok(issues)
    }

    /// Drop and recompute every secondary index from the primary tables.
    ///
    /// Returns the number of index entries written.
    pub fn rebuild_indexes(&self) -> IndexResult<usize> {
        let write_txn = self.db.begin_write()?;
        let written = {
            let objects: Vec<ObjectRecord> = decode_all(&write_txn.open_table(OBJECTS)?)?;
            let key_records: Vec<EncryptionKeyRecord> =
                decode_all(&write_txn.open_table(KEY_RECORDS)?)?;
            let grants: Vec<AccessGrant> = decode_all(&write_txn.open_table(ACCESS_GRANTS)?)?;
            let shared: Vec<SharedKeyCopy> = decode_all(&write_txn.open_table(SHARED_KEYS)?)?;

            write_txn.delete_table(OBJECTS_BY_OWNER)?;
            write_txn.delete_table(OBJECTS_BY_CONTENT)?;
            write_txn.delete_table(KEY_BY_OBJECT)?;
            write_txn.delete_table(GRANTS_BY_OWNER)?;
            write_txn.delete_table(GRANTS_BY_GRANTEE)?;
            write_txn.delete_table(SHARED_BY_GRANTEE)?;

            let mut by_owner = write_txn.open_table(OBJECTS_BY_OWNER)?;
            let mut by_content = write_txn.open_table(OBJECTS_BY_CONTENT)?;
            let mut key_by_object = write_txn.open_table(KEY_BY_OBJECT)?;
            let mut grants_by_owner = write_txn.open_table(GRANTS_BY_OWNER)?;
            let mut grants_by_grantee = write_txn.open_table(GRANTS_BY_GRANTEE)?;
            let mut shared_idx = write_txn.open_table(SHARED_BY_GRANTEE)?;

            let key_ids: std::collections::HashSet<&str> =
                key_records.iter().map(|k| k.id.as_str()).collect();
            let mut written = 0usize;

            for object in &objects {
                let owner_key = make_index_key(&object.owner_address, &object.id);
                by_owner.insert(owner_key.as_slice(), object.content_id.as_str())?;
                by_content.insert(object.content_id.as_str(), object.id.as_str())?;
                written += 2;
                if let Some(key_id) = object.key_record_id.as_deref() {
                    if key_ids.contains(key_id) {
                        key_by_object.insert(object.id.as_str(), key_id)?;
                        written += 1;
                    }
                }
            }

            for grant in &grants {
                let owner_key = make_index_key(&grant.owner_address, &grant.id);
                grants_by_owner.insert(owner_key.as_slice(), grant.granted_to.as_str())?;
                let grantee_key = make_index_key(&grant.granted_to, &grant.id);
                grants_by_grantee.insert(grantee_key.as_slice(), grant.owner_address.as_str())?;
                written += 2;
            }

            for copy in &shared {
                let idx_key = make_index_key(&copy.shared_with, &copy.object_id);
                shared_idx.insert(idx_key.as_slice(), copy.id.as_str())?;
                written += 1;
            }

            written
        };
        write_txn.commit()?;

        info!(entries = written, "Secondary indexes rebuilt");
        Ok(written)
    }

    /// Empty every table, the reconciler checkpoint included, in one write
    /// transaction.
    ///
    /// Returns the primary-table row counts that were removed.
    pub fn clear_all(&self) -> IndexResult<IndexStats> {
        let write_txn = self.db.begin_write()?;
        let removed = IndexStats {
            owners: write_txn.open_table(OWNERS)?.len()?,
            objects: write_txn.open_table(OBJECTS)?.len()?,
            key_records: write_txn.open_table(KEY_RECORDS)?.len()?,
            access_grants: write_txn.open_table(ACCESS_GRANTS)?.len()?,
            shared_keys: write_txn.open_table(SHARED_KEYS)?.len()?,
        };

        for table in [OWNERS, OBJECTS, KEY_RECORDS, ACCESS_GRANTS, SHARED_KEYS, LEDGER_STATE] {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }
        for table in [OBJECTS_BY_OWNER, GRANTS_BY_OWNER, GRANTS_BY_GRANTEE, SHARED_BY_GRANTEE] {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }
        for table in [OBJECTS_BY_CONTENT, KEY_BY_OBJECT] {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }
        write_txn.commit()?;

        warn!(?removed, "Metadata index cleared");
        Ok(removed)
    }

    // =========================================================================
    // Reconciler checkpoint
    // =========================================================================

    /// Last ledger block fully applied under `name`, if any.
    pub fn get_checkpoint(&self, name: &str) -> IndexResult<Option<u64>> {
        let key = format!("last_block_{name}");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LEDGER_STATE)?;
        let value = table.get(key.as_str())?;
        Ok(value.and_then(|v| <[u8; 8]>::try_from(v.value()).ok().map(u64::from_be_bytes)))
    }

    /// Persist the last applied ledger block under `name`.
    pub fn set_checkpoint(&self, name: &str, block: u64) -> IndexResult<()> {
        let key = format!("last_block_{name}");
        let bytes = block.to_be_bytes();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LEDGER_STATE)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

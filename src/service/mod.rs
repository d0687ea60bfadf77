// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access & Key Distribution Service
//!
//! Sits above the content store, the metadata index, and the cipher, and asks
//! the ledger before anything leaves the vault.
//!
//! ## Read path
//!
//! 1. Resolve the object by content id.
//! 2. Authorize: the owner reads directly. Anyone else needs a local
//!    shared-key copy **and** a positive ledger answer. Strangers without a
//!    copy are denied before the ledger or the cipher is touched.
//! 3. Resolve the key record, fetch and verify the sealed bytes, decrypt.
//!
//! ## Write paths
//!
//! - Upload seals the bytes with a fresh per-object key, stores the blob, and
//!   indexes object and key in one transaction. A failed index write removes
//!   the blob again.
//! - Grant requires the ledger to already record the permission, then hands
//!   the grantee a copy of every existing object key. Later uploads are not
//!   shared.
//! - Revoke never waits for the ledger: local copies are removed first.

pub mod error;
pub mod locks;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::audit_log;
use crate::crypto::{self, ObjectKey};
use crate::ledger::{LedgerEvent, LedgerEventKind, LedgerOracle, OracleResult};
use crate::models::AccountAddress;
use crate::storage::{
    AccessGrant, AuditEvent, AuditEventType, BlobSnapshot, ContentId, ContentStats, ContentStore,
    DataCategory, EncryptionKeyRecord, IndexError, IndexSnapshot, IndexStats, IntegrityIssue,
    IssueKind, MetadataIndex, ObjectRecord, OwnerRecord, OwnershipEnforcer, RevokeOutcome,
};

pub use error::{ServiceError, ServiceResult, UploadStep};
pub use locks::PairLocks;

/// Default bound on a single ledger query.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const MAX_DESCRIPTION_LEN: usize = 1024;
const MAX_NAME_LEN: usize = 255;

// =============================================================================
// Types
// =============================================================================

/// Caller-supplied metadata of an upload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewObject {
    pub category: DataCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Identifiers produced by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadReceipt {
    pub object_id: String,
    pub content_id: ContentId,
    pub key_record_id: String,
}

/// Decrypted object.
#[derive(Debug, Clone)]
pub struct Download {
    pub plaintext: Vec<u8>,
    pub object: ObjectRecord,
}

/// Profile submitted by the registrar.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OwnerProfile {
    pub address: AccountAddress,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub emergency_contact: String,
}

/// Result of a grant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GrantReceipt {
    pub grant: AccessGrant,
    /// Keys copied to the grantee by this call.
    pub keys_shared: usize,
    /// Objects the grantee could already read.
    pub already_shared: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VaultStats {
    pub content: ContentStats,
    pub index: IndexStats,
}

/// What a reset removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct VaultReset {
    pub index: IndexStats,
    pub blobs_removed: usize,
}

/// Backup of the whole vault. Contains key material.
#[derive(Debug, Clone, Serialize)]
pub struct VaultExport {
    pub exported_at: DateTime<Utc>,
    pub index: IndexSnapshot,
    pub blobs: Vec<BlobSnapshot>,
}

// =============================================================================
// Service
// =============================================================================

pub struct AccessService<O> {
    store: Arc<ContentStore>,
    index: Arc<MetadataIndex>,
    oracle: O,
    oracle_timeout: Duration,
    locks: PairLocks,
}

impl<O: LedgerOracle> AccessService<O> {
    pub fn new(
        store: Arc<ContentStore>,
        index: Arc<MetadataIndex>,
        oracle: O,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            index,
            oracle,
            oracle_timeout,
            locks: PairLocks::new(),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Run one ledger query under the configured timeout.
    async fn ask<T>(&self, query: impl Future<Output = OracleResult<T>>) -> ServiceResult<T> {
        match tokio::time::timeout(self.oracle_timeout, query).await {
            Ok(answer) => Ok(answer?),
            Err(_) => Err(ServiceError::OracleUnavailable(format!(
                "no answer within {}ms",
                self.oracle_timeout.as_millis()
            ))),
        }
    }

    fn deny(
        &self,
        actor: &AccountAddress,
        resource_type: &str,
        resource_id: &str,
        reason: &str,
    ) -> ServiceError {
        warn!(actor = %actor, resource_type, resource_id, reason, "Access denied");
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::AccessDenied)
                .with_actor(actor.as_str())
                .with_resource(resource_type, resource_id)
                .failed(reason)
        );
        ServiceError::AccessDenied
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Seal and store `plaintext` for `owner`.
    pub fn upload(
        &self,
        owner: &AccountAddress,
        plaintext: &[u8],
        meta: NewObject,
    ) -> ServiceResult<UploadReceipt> {
        if meta.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        if meta.original_name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "original name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if self.index.get_owner(owner.as_str())?.is_none() {
            return Err(ServiceError::NotFound(format!("owner {owner}")));
        }

        let encrypt_failed = |e: crypto::CipherError| ServiceError::UploadFailed {
            step: UploadStep::Encrypt,
            reason: e.to_string(),
        };
        let key = crypto::generate_key().map_err(encrypt_failed)?;
        let sealed = crypto::encrypt(plaintext, &key).map_err(encrypt_failed)?;

        let mime_type = if meta.mime_type.trim().is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            meta.mime_type.trim().to_string()
        };

        let was_stored = self
            .store
            .exists(ContentId::for_bytes(&sealed.ciphertext).as_str());
        let content_id = self
            .store
            .put(&sealed.ciphertext, &mime_type)
            .map_err(|e| ServiceError::UploadFailed {
                step: UploadStep::Store,
                reason: e.to_string(),
            })?;

        let now = Utc::now();
        let object_id = uuid::Uuid::new_v4().to_string();
        let key_record_id = uuid::Uuid::new_v4().to_string();
        let object = ObjectRecord {
            id: object_id.clone(),
            content_id: content_id.clone(),
            owner_address: owner.to_string(),
            category: meta.category,
            description: meta.description,
            size_bytes: plaintext.len() as u64,
            original_name: meta.original_name,
            mime_type,
            created_at: now,
            key_record_id: Some(key_record_id.clone()),
        };
        let key_record = EncryptionKeyRecord {
            id: key_record_id.clone(),
            key_material: crypto::export_key(&key),
            iv: crypto::encode_nonce(&sealed.nonce),
            object_id: object_id.clone(),
            created_by: owner.to_string(),
            created_at: now,
        };

        if let Err(e) = self.index.insert_object_with_key(&object, &key_record) {
            if !was_stored {
                if let Err(cleanup) = self.store.discard(&content_id) {
                    warn!(
                        content_id = %content_id,
                        error = %cleanup,
                        "Failed to remove blob of failed upload"
                    );
                }
            }
            return Err(match e {
                IndexError::NotFound(what) => ServiceError::NotFound(what),
                IndexError::Conflict(what) => ServiceError::AlreadyExists(what),
                other => ServiceError::UploadFailed {
                    step: UploadStep::Index,
                    reason: other.to_string(),
                },
            });
        }

        info!(
            owner = %owner,
            content_id = %content_id,
            category = ?object.category,
            size = object.size_bytes,
            "Object uploaded"
        );
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::ObjectUploaded)
                .with_actor(owner.as_str())
                .with_resource("object", content_id.as_str())
                .with_details(serde_json::json!({
                    "object_id": object_id,
                    "category": object.category,
                    "size_bytes": object.size_bytes,
                }))
        );

        Ok(UploadReceipt {
            object_id,
            content_id,
            key_record_id,
        })
    }

    /// Decrypt the object stored under `content_id` for `requester`.
    pub async fn download(
        &self,
        content_id: &str,
        requester: &AccountAddress,
    ) -> ServiceResult<Download> {
        let object = self
            .index
            .get_object_by_content(content_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("object {content_id}")))?;
        let Some(own_key_id) = object.key_record_id.clone() else {
            return Err(ServiceError::NotFound(format!(
                "object {content_id} has no key record"
            )));
        };
        let owner = AccountAddress::parse(&object.owner_address)
            .map_err(|e| ServiceError::Integrity(format!("object {}: {e}", object.id)))?;

        let key_id = if object.is_owned_by(requester) {
            own_key_id
        } else {
            let Some(copy) = self.index.get_shared_key(requester.as_str(), &object.id)? else {
                return Err(self.deny(requester, "object", content_id, "no shared key"));
            };
            if !self.ask(self.oracle.is_authorized(&owner, requester)).await? {
                warn!(owner = %owner, grantee = %requester, "Shared key held without ledger grant");
                return Err(self.deny(requester, "object", content_id, "ledger denies access"));
            }
            copy.original_key_record_id
        };

        let key_record = self.index.get_key_record(&key_id)?.ok_or_else(|| {
            ServiceError::Integrity(format!("object {} references missing key {key_id}", object.id))
        })?;
        if key_record.object_id != object.id {
            return Err(ServiceError::Integrity(format!(
                "key {key_id} belongs to object {}, not {}",
                key_record.object_id, object.id
            )));
        }

        let sealed = self
            .store
            .get(object.content_id.as_str())
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::NotFound(what) => {
                    ServiceError::Integrity(format!("indexed {what} is missing from the store"))
                }
                other => other,
            })?;

        let key: ObjectKey = crypto::import_key(&key_record.key_material)?;
        let nonce = crypto::decode_nonce(&key_record.iv)?;
        let plaintext = crypto::decrypt(&sealed, &nonce, &key)?;

        debug!(content_id, requester = %requester, "Object decrypted");
        audit_log!(
            self.store.fs(),
            AuditEventType::ObjectDownloaded,
            requester.as_str(),
            "object",
            content_id
        );

        Ok(Download { plaintext, object })
    }

    /// Objects `principal` can read: its own complete objects plus those
    /// shared with it. Oldest first.
    pub fn accessible_objects(
        &self,
        principal: &AccountAddress,
    ) -> ServiceResult<Vec<ObjectRecord>> {
        let mut seen = HashSet::new();
        let mut objects = Vec::new();

        for object in self.index.list_objects_by_owner(principal.as_str())? {
            if object.key_record_id.is_some() && seen.insert(object.id.clone()) {
                objects.push(object);
            }
        }
        for copy in self.index.list_shared_keys_for_grantee(principal.as_str())? {
            if !seen.insert(copy.object_id.clone()) {
                continue;
            }
            match self.index.get_object(&copy.object_id)? {
                Some(object) => objects.push(object),
                None => warn!(
                    copy_id = %copy.id,
                    object_id = %copy.object_id,
                    "Shared key points at missing object"
                ),
            }
        }

        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(objects)
    }

    pub fn owner_objects(&self, owner: &AccountAddress) -> ServiceResult<Vec<ObjectRecord>> {
        Ok(self.index.list_objects_by_owner(owner.as_str())?)
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Mirror a ledger grant: copy every existing object key of `owner` to
    /// `grantee`.
    pub async fn grant_access(
        &self,
        owner: &AccountAddress,
        grantee: &AccountAddress,
    ) -> ServiceResult<GrantReceipt> {
        if owner == grantee {
            return Err(ServiceError::InvalidInput(
                "owner and grantee must differ".to_string(),
            ));
        }

        let _pair = self.locks.acquire(owner, grantee).await;

        if !self.ask(self.oracle.is_authorized(owner, grantee)).await? {
            return Err(self.deny(owner, "grant", grantee.as_str(), "ledger has no grant"));
        }

        let outcome = self
            .index
            .grant_access(owner.as_str(), grantee.as_str(), Utc::now())?;

        info!(
            owner = %owner,
            grantee = %grantee,
            keys_shared = outcome.created.len(),
            already_shared = outcome.already_shared,
            "Access granted"
        );
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::AccessGranted)
                .with_actor(owner.as_str())
                .with_resource("grant", outcome.grant.id.as_str())
                .with_details(serde_json::json!({
                    "grantee": grantee,
                    "keys_shared": outcome.created.len(),
                }))
        );

        Ok(GrantReceipt {
            keys_shared: outcome.created.len(),
            already_shared: outcome.already_shared,
            grant: outcome.grant,
        })
    }

    /// Remove every key copy `grantee` holds for `owner` and deactivate the
    /// pair's grants. Does not depend on the ledger.
    pub async fn revoke_access(
        &self,
        owner: &AccountAddress,
        grantee: &AccountAddress,
    ) -> ServiceResult<RevokeOutcome> {
        if owner == grantee {
            return Err(ServiceError::InvalidInput(
                "owner and grantee must differ".to_string(),
            ));
        }

        let _pair = self.locks.acquire(owner, grantee).await;

        let outcome = self
            .index
            .revoke_access(owner.as_str(), grantee.as_str(), Utc::now())?;

        match self.ask(self.oracle.is_authorized(owner, grantee)).await {
            Ok(true) => {
                warn!(owner = %owner, grantee = %grantee, "Ledger still authorizes revoked grantee")
            }
            Ok(false) => {}
            Err(e) => debug!(error = %e, "Skipped ledger drift check"),
        }

        info!(
            owner = %owner,
            grantee = %grantee,
            removed_copies = outcome.removed_copies,
            deactivated_grants = outcome.deactivated_grants,
            "Access revoked"
        );
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::AccessRevoked)
                .with_actor(owner.as_str())
                .with_resource("account", grantee.as_str())
                .with_details(serde_json::to_value(outcome).unwrap_or_default())
        );

        Ok(outcome)
    }

    pub fn grants_issued(&self, owner: &AccountAddress) -> ServiceResult<Vec<AccessGrant>> {
        Ok(self.index.list_grants_by_owner(owner.as_str())?)
    }

    pub fn grants_received(&self, grantee: &AccountAddress) -> ServiceResult<Vec<AccessGrant>> {
        Ok(self.index.list_grants_by_grantee(grantee.as_str())?)
    }

    // =========================================================================
    // Owners
    // =========================================================================

    /// Fail with `AccessDenied` unless `requester` is the ledger registrar.
    pub async fn ensure_registrar(&self, requester: &AccountAddress) -> ServiceResult<()> {
        let registrar = self.ask(self.oracle.registrar()).await?;
        if *requester != registrar {
            return Err(self.deny(requester, "registrar", registrar.as_str(), "not the registrar"));
        }
        Ok(())
    }

    /// Store the profile of an owner the ledger already knows.
    pub async fn register_owner(
        &self,
        registrar: &AccountAddress,
        profile: OwnerProfile,
    ) -> ServiceResult<OwnerRecord> {
        let name = profile.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }

        self.ensure_registrar(registrar).await?;

        let registered = self.ask(self.oracle.registered_owners()).await?;
        if !registered.iter().any(|owner| owner.address == profile.address) {
            return Err(ServiceError::NotFound(format!(
                "owner {} is not registered on the ledger",
                profile.address
            )));
        }

        let record = OwnerRecord {
            address: profile.address.to_string(),
            name: name.to_string(),
            age: profile.age,
            phone_number: profile.phone_number,
            emergency_contact: profile.emergency_contact,
            registered_at: Utc::now(),
            registered_by: Some(registrar.to_string()),
        };
        self.index.insert_owner(&record)?;

        info!(owner = %record.address, registrar = %registrar, "Owner registered");
        audit_log!(
            self.store.fs(),
            AuditEventType::OwnerRegistered,
            registrar.as_str(),
            "owner",
            record.address.as_str()
        );
        Ok(record)
    }

    pub fn get_owner(&self, address: &AccountAddress) -> ServiceResult<OwnerRecord> {
        self.index
            .get_owner(address.as_str())?
            .ok_or_else(|| ServiceError::NotFound(format!("owner {address}")))
    }

    pub fn list_owners(&self) -> ServiceResult<Vec<OwnerRecord>> {
        Ok(self.index.list_owners()?)
    }

    // =========================================================================
    // Ledger reconciliation
    // =========================================================================

    /// Bring local state in line with one ledger event.
    ///
    /// Returns whether local state changed.
    pub async fn apply_ledger_event(&self, event: &LedgerEvent) -> ServiceResult<bool> {
        let changed = match &event.kind {
            LedgerEventKind::OwnerRegistered { owner, name, age } => {
                if self.index.get_owner(owner.as_str())?.is_some() {
                    false
                } else {
                    let record = OwnerRecord {
                        address: owner.to_string(),
                        name: name.clone(),
                        age: u32::try_from(*age).unwrap_or(u32::MAX),
                        phone_number: String::new(),
                        emergency_contact: String::new(),
                        registered_at: Utc::now(),
                        registered_by: None,
                    };
                    match self.index.insert_owner(&record) {
                        Ok(()) => true,
                        Err(IndexError::Conflict(_)) => false,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            LedgerEventKind::ObjectAdded { owner, content_id, .. } => {
                match self.index.get_object_by_content(content_id)? {
                    Some(object) if object.is_owned_by(owner) => {}
                    Some(object) => warn!(
                        content_id = %content_id,
                        ledger_owner = %owner,
                        local_owner = %object.owner_address,
                        "Ledger object owner differs from index"
                    ),
                    None => warn!(
                        content_id = %content_id,
                        owner = %owner,
                        "Ledger object not present in index"
                    ),
                }
                false
            }
            LedgerEventKind::AccessGranted { owner, grantee } => {
                let _pair = self.locks.acquire(owner, grantee).await;
                match self
                    .index
                    .grant_access(owner.as_str(), grantee.as_str(), Utc::now())
                {
                    Ok(outcome) => !outcome.created.is_empty(),
                    Err(IndexError::NothingToShare(_)) => {
                        debug!(
                            owner = %owner,
                            grantee = %grantee,
                            "Ledger grant for owner without objects"
                        );
                        false
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            LedgerEventKind::AccessRevoked { owner, grantee } => {
                let _pair = self.locks.acquire(owner, grantee).await;
                let outcome = self
                    .index
                    .revoke_access(owner.as_str(), grantee.as_str(), Utc::now())?;
                outcome.removed_copies > 0 || outcome.deactivated_grants > 0
            }
        };

        if changed {
            audit_log!(
                self.store.fs(),
                AuditEvent::new(AuditEventType::LedgerEventApplied)
                    .with_resource("block", event.block_number.to_string())
                    .with_details(serde_json::to_value(event).unwrap_or_default())
            );
        }
        Ok(changed)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub fn stats(&self) -> ServiceResult<VaultStats> {
        Ok(VaultStats {
            content: self.store.stats()?,
            index: self.index.stats()?,
        })
    }

    pub fn export_all(&self) -> ServiceResult<VaultExport> {
        Ok(VaultExport {
            exported_at: Utc::now(),
            index: self.index.export()?,
            blobs: self.store.export()?,
        })
    }

    /// Remove unpinned blobs older than `older_than`.
    pub fn garbage_collect(&self, older_than: Duration) -> ServiceResult<usize> {
        let removed = self.store.gc(older_than)?;
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::MaintenanceRun)
                .with_resource("maintenance", "gc")
                .with_details(serde_json::json!({ "removed": removed }))
        );
        Ok(removed)
    }

    /// Recompute every secondary index from the primary tables.
    pub fn rebuild_indexes(&self) -> ServiceResult<usize> {
        let entries = self.index.rebuild_indexes()?;
        info!(entries, "Secondary indexes rebuilt");
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::MaintenanceRun)
                .with_resource("maintenance", "reindex")
                .with_details(serde_json::json!({ "entries": entries }))
        );
        Ok(entries)
    }

    /// Wipe the vault: every record, index, checkpoint and blob.
    ///
    /// The index goes first so no object is ever left pointing at a removed
    /// blob. The audit log is kept.
    pub fn reset_all(&self, actor: &AccountAddress) -> ServiceResult<VaultReset> {
        let index = self.index.clear_all()?;
        let blobs_removed = self.store.clear()?;
        warn!(
            actor = %actor,
            objects = index.objects,
            blobs_removed,
            "Vault reset"
        );
        audit_log!(
            self.store.fs(),
            AuditEvent::new(AuditEventType::MaintenanceRun)
                .with_actor(actor.as_str())
                .with_resource("maintenance", "reset")
                .with_details(serde_json::json!({
                    "index": index,
                    "blobs_removed": blobs_removed,
                }))
        );
        Ok(VaultReset {
            index,
            blobs_removed,
        })
    }

    /// Index consistency issues, plus objects whose blob is gone.
    pub fn verify_integrity(&self) -> ServiceResult<Vec<IntegrityIssue>> {
        let mut issues = self.index.verify_integrity()?;
        for object in self.index.export()?.objects {
            if !self.store.exists(object.content_id.as_str()) {
                issues.push(IntegrityIssue::new(
                    IssueKind::MissingBlob,
                    object.id,
                    format!("content {} is not in the store", object.content_id),
                ));
            }
        }
        if !issues.is_empty() {
            warn!(issues = issues.len(), "Integrity check found issues");
        }
        Ok(issues)
    }

    // =========================================================================
    // Health
    // =========================================================================

    pub fn check_storage(&self) -> ServiceResult<()> {
        self.store.health_check()?;
        self.index.stats()?;
        Ok(())
    }

    /// Current ledger head, as a reachability probe.
    pub async fn check_ledger(&self) -> ServiceResult<u64> {
        self.ask(self.oracle.head()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::storage::{AuditRepository, StoragePaths};
    use tempfile::TempDir;

    struct Harness {
        _temp: TempDir,
        ledger: Arc<MemoryLedger>,
        service: AccessService<Arc<MemoryLedger>>,
    }

    fn addr(raw: &str) -> AccountAddress {
        AccountAddress::parse(raw).unwrap()
    }

    fn harness() -> Harness {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let store = Arc::new(ContentStore::new(paths.clone()));
        store.init().unwrap();
        let index = Arc::new(MetadataIndex::open(&paths.index_db()).unwrap());
        let ledger = Arc::new(MemoryLedger::new(addr("0xdoc")));
        let service = AccessService::new(store, index, ledger.clone(), Duration::from_millis(200));
        Harness {
            _temp: temp,
            ledger,
            service,
        }
    }

    impl Harness {
        async fn owner(&self, raw: &str) -> AccountAddress {
            let owner = addr(raw);
            self.ledger.register_owner(&owner, "Ada", 36);
            self.service
                .register_owner(
                    &addr("0xdoc"),
                    OwnerProfile {
                        address: owner.clone(),
                        name: "Ada".to_string(),
                        age: 36,
                        phone_number: String::new(),
                        emergency_contact: String::new(),
                    },
                )
                .await
                .unwrap();
            owner
        }

        fn upload(&self, owner: &AccountAddress, bytes: &[u8]) -> UploadReceipt {
            self.service
                .upload(owner, bytes, diagnosis("scan"))
                .unwrap()
        }
    }

    fn diagnosis(description: &str) -> NewObject {
        NewObject {
            category: DataCategory::Diagnosis,
            description: description.to_string(),
            original_name: "scan.txt".to_string(),
            mime_type: "text/plain".to_string(),
        }
    }

    #[tokio::test]
    async fn owner_shares_diagnosis_with_reader() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = addr("0xb");

        let receipt = h.upload(&a, b"hello");
        assert!(receipt.content_id.as_str().starts_with("sha256-"));

        let own = h.service.download(receipt.content_id.as_str(), &a).await.unwrap();
        assert_eq!(own.plaintext, b"hello");
        assert_eq!(own.object.category, DataCategory::Diagnosis);

        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &b).await,
            Err(ServiceError::AccessDenied)
        ));

        h.ledger.grant(&a, &b);
        let granted = h.service.grant_access(&a, &b).await.unwrap();
        assert_eq!(granted.keys_shared, 1);

        let shared = h.service.download(receipt.content_id.as_str(), &b).await.unwrap();
        assert_eq!(shared.plaintext, b"hello");

        h.ledger.revoke(&a, &b);
        h.service.revoke_access(&a, &b).await.unwrap();
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &b).await,
            Err(ServiceError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn grant_is_not_retroactive() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = addr("0xb");
        let first = h.upload(&a, b"first");

        h.ledger.grant(&a, &b);
        h.service.grant_access(&a, &b).await.unwrap();
        let later = h.upload(&a, b"later");

        assert!(h.service.download(first.content_id.as_str(), &b).await.is_ok());
        assert!(matches!(
            h.service.download(later.content_id.as_str(), &b).await,
            Err(ServiceError::AccessDenied)
        ));

        let again = h.service.grant_access(&a, &b).await.unwrap();
        assert_eq!(again.keys_shared, 1);
        assert_eq!(again.already_shared, 1);
        assert_eq!(h.service.accessible_objects(&b).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn grant_requires_ledger_and_data() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = addr("0xb");

        h.upload(&a, b"x");
        assert!(matches!(
            h.service.grant_access(&a, &b).await,
            Err(ServiceError::AccessDenied)
        ));

        let empty = h.owner("0xe").await;
        h.ledger.grant(&empty, &b);
        assert!(matches!(
            h.service.grant_access(&empty, &b).await,
            Err(ServiceError::NoData(_))
        ));
        assert!(matches!(
            h.service.grant_access(&a, &a).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn stranger_is_denied_without_asking_the_ledger() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"secret");

        h.ledger.set_available(false);
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &addr("0xstranger")).await,
            Err(ServiceError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn stranger_is_denied_before_the_cipher() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"secret");

        let blob = h.service.store().paths().blob_data(receipt.content_id.as_str());
        std::fs::write(&blob, b"garbage").unwrap();

        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &addr("0xstranger")).await,
            Err(ServiceError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn slow_ledger_is_unavailable_for_grantees() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = addr("0xb");
        let receipt = h.upload(&a, b"hello");
        h.ledger.grant(&a, &b);
        h.service.grant_access(&a, &b).await.unwrap();

        h.ledger.set_latency(Duration::from_secs(5));
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &b).await,
            Err(ServiceError::OracleUnavailable(_))
        ));
        assert!(matches!(
            h.service.grant_access(&a, &addr("0xc")).await,
            Err(ServiceError::OracleUnavailable(_))
        ));

        // Owners never wait on the ledger.
        assert!(h.service.download(receipt.content_id.as_str(), &a).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_works_while_ledger_is_down() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = addr("0xb");
        let receipt = h.upload(&a, b"hello");
        h.ledger.grant(&a, &b);
        h.service.grant_access(&a, &b).await.unwrap();

        h.ledger.set_available(false);
        let outcome = h.service.revoke_access(&a, &b).await.unwrap();
        assert_eq!(outcome.removed_copies, 1);
        assert_eq!(outcome.deactivated_grants, 1);

        h.ledger.set_available(true);
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &b).await,
            Err(ServiceError::AccessDenied)
        ));
        let history = h.service.grants_issued(&a).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_active);
        assert!(history[0].revoked_at.is_some());
    }

    #[tokio::test]
    async fn tampered_blob_is_an_integrity_error() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"hello");

        let blob = h.service.store().paths().blob_data(receipt.content_id.as_str());
        let mut bytes = std::fs::read(&blob).unwrap();
        bytes[0] ^= 0x01;
        std::fs::write(&blob, bytes).unwrap();

        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &a).await,
            Err(ServiceError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn missing_blob_is_an_integrity_error() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"hello");
        std::fs::remove_file(h.service.store().paths().blob_data(receipt.content_id.as_str()))
            .unwrap();

        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &a).await,
            Err(ServiceError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn upload_requires_registered_owner() {
        let h = harness();
        let result = h.service.upload(&addr("0xnobody"), b"x", diagnosis("scan"));
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert_eq!(h.service.stats().unwrap().content.total_blobs, 0);
    }

    #[tokio::test]
    async fn unknown_content_is_not_found() {
        let h = harness();
        let a = h.owner("0xa").await;
        assert!(matches!(
            h.service.download("sha256-nope", &a).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn registration_rules() {
        let h = harness();
        let profile = |raw: &str| OwnerProfile {
            address: addr(raw),
            name: "Grace".to_string(),
            age: 40,
            phone_number: String::new(),
            emergency_contact: String::new(),
        };

        h.ledger.register_owner(&addr("0xa"), "Grace", 40);
        assert!(matches!(
            h.service.register_owner(&addr("0xa"), profile("0xa")).await,
            Err(ServiceError::AccessDenied)
        ));
        assert!(matches!(
            h.service.register_owner(&addr("0xdoc"), profile("0xunknown")).await,
            Err(ServiceError::NotFound(_))
        ));

        let record = h.service.register_owner(&addr("0xdoc"), profile("0xa")).await.unwrap();
        assert_eq!(record.registered_by.as_deref(), Some("0xdoc"));
        assert!(matches!(
            h.service.register_owner(&addr("0xdoc"), profile("0xa")).await,
            Err(ServiceError::AlreadyExists(_))
        ));
        assert_eq!(h.service.list_owners().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_events_are_mirrored() {
        let h = harness();
        let a = addr("0xa");
        let b = addr("0xb");
        h.ledger.register_owner(&a, "Ada", 36);

        let events = h.ledger.events(0, 10).await.unwrap();
        assert!(h.service.apply_ledger_event(&events[0]).await.unwrap());
        assert!(!h.service.apply_ledger_event(&events[0]).await.unwrap());
        assert_eq!(h.service.get_owner(&a).unwrap().registered_by, None);

        let receipt = h.upload(&a, b"hello");
        h.ledger.grant(&a, &b);
        let grant = h.ledger.events(2, 2).await.unwrap().remove(0);
        assert!(h.service.apply_ledger_event(&grant).await.unwrap());
        assert!(h.service.download(receipt.content_id.as_str(), &b).await.is_ok());

        h.ledger.revoke(&a, &b);
        let revoke = h.ledger.events(3, 3).await.unwrap().remove(0);
        assert!(h.service.apply_ledger_event(&revoke).await.unwrap());
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &b).await,
            Err(ServiceError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn verify_reports_missing_blobs() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"hello");
        assert!(h.service.verify_integrity().unwrap().is_empty());

        let paths = h.service.store().paths().clone();
        std::fs::remove_file(paths.blob_data(receipt.content_id.as_str())).unwrap();
        std::fs::remove_file(paths.blob_meta(receipt.content_id.as_str())).unwrap();

        let issues = h.service.verify_integrity().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::MissingBlob);
        assert_eq!(issues[0].record_id, receipt.object_id);
    }

    #[tokio::test]
    async fn same_plaintext_uploaded_twice_is_two_objects() {
        let h = harness();
        let a = h.owner("0xa").await;
        let first = h.upload(&a, b"hello");
        let second = h.upload(&a, b"hello");

        assert_ne!(first.content_id, second.content_id);
        assert_ne!(first.object_id, second.object_id);
        assert_ne!(first.key_record_id, second.key_record_id);

        let stats = h.service.stats().unwrap();
        assert_eq!(stats.index.objects, 2);
        assert_eq!(stats.index.key_records, 2);
        assert_eq!(stats.content.total_blobs, 2);

        for receipt in [&first, &second] {
            let download = h
                .service
                .download(receipt.content_id.as_str(), &a)
                .await
                .unwrap();
            assert_eq!(download.plaintext, b"hello");
        }
    }

    #[tokio::test]
    async fn reset_wipes_records_indexes_and_blobs() {
        let h = harness();
        let a = h.owner("0xa").await;
        let b = h.owner("0xb").await;
        let receipt = h.upload(&a, b"hello");
        h.ledger.grant(&a, &b);
        h.service.grant_access(&a, &b).await.unwrap();
        h.service.index().set_checkpoint("ledger", 4).unwrap();

        let reset = h.service.reset_all(&addr("0xdoc")).unwrap();
        assert_eq!(reset.index.owners, 2);
        assert_eq!(reset.index.objects, 1);
        assert_eq!(reset.index.shared_keys, 1);
        assert_eq!(reset.blobs_removed, 1);

        let stats = h.service.stats().unwrap();
        assert_eq!(stats.index, IndexStats::default());
        assert_eq!(stats.content.total_blobs, 0);
        assert_eq!(h.service.index().get_checkpoint("ledger").unwrap(), None);
        assert!(h.service.verify_integrity().unwrap().is_empty());
        assert!(matches!(
            h.service.download(receipt.content_id.as_str(), &a).await,
            Err(ServiceError::NotFound(_))
        ));

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(h.service.store().fs())
            .search_by_resource("maintenance", "reset", &today)
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn operations_leave_an_audit_trail() {
        let h = harness();
        let a = h.owner("0xa").await;
        let receipt = h.upload(&a, b"hello");
        let _ = h.service.download(receipt.content_id.as_str(), &addr("0xstranger")).await;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(h.service.store().fs())
            .search_by_resource("object", receipt.content_id.as_str(), &today)
            .unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(kinds, vec![AuditEventType::ObjectUploaded, AuditEventType::AccessDenied]);

        let raw = std::fs::read_to_string(
            h.service.store().paths().audit_events_file(&today),
        )
        .unwrap();
        assert!(!raw.contains("hello"));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent record types kept in the metadata index.
//!
//! Addresses are stored in their normalized (lowercase) string form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto::ExportedKey;
use crate::storage::content_store::ContentId;

use super::ownership::OwnedResource;

/// Category of a stored record, using the ledger's numeric encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    PersonalInfo,
    Diagnosis,
    Treatment,
    LabResults,
    GeneralMedical,
}

impl DataCategory {
    /// Ledger encoding (0..=4).
    pub fn code(self) -> u8 {
        match self {
            DataCategory::PersonalInfo => 0,
            DataCategory::Diagnosis => 1,
            DataCategory::Treatment => 2,
            DataCategory::LabResults => 3,
            DataCategory::GeneralMedical => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DataCategory::PersonalInfo),
            1 => Some(DataCategory::Diagnosis),
            2 => Some(DataCategory::Treatment),
            3 => Some(DataCategory::LabResults),
            4 => Some(DataCategory::GeneralMedical),
            _ => None,
        }
    }

    /// Clinical data the ledger also exposes to the research role. Personal
    /// info and treatment records stay registrar-only.
    pub fn is_diagnostic(self) -> bool {
        matches!(
            self,
            DataCategory::Diagnosis | DataCategory::LabResults | DataCategory::GeneralMedical
        )
    }
}

/// A registered data owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OwnerRecord {
    pub address: String,
    pub name: String,
    pub age: u32,
    pub phone_number: String,
    pub emergency_contact: String,
    pub registered_at: DateTime<Utc>,
    /// Registrar that created the profile, `None` when mirrored from a
    /// ledger event.
    pub registered_by: Option<String>,
}

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ObjectRecord {
    pub id: String,
    pub content_id: ContentId,
    pub owner_address: String,
    pub category: DataCategory,
    pub description: String,
    /// Plaintext size in bytes.
    pub size_bytes: u64,
    pub original_name: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    /// Key record that decrypts this object. An object without one is
    /// incomplete and unreadable.
    pub key_record_id: Option<String>,
}

impl OwnedResource for ObjectRecord {
    fn owner_address(&self) -> &str {
        &self.owner_address
    }
}

/// Key material for one object. Never leaves the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyRecord {
    pub id: String,
    pub key_material: ExportedKey,
    /// Base64url nonce used when the object was sealed.
    pub iv: String,
    pub object_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Owner to grantee permission, mirrored from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessGrant {
    pub id: String,
    pub owner_address: String,
    pub granted_to: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// A grantee's handle onto an object's key record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedKeyCopy {
    pub id: String,
    pub original_key_record_id: String,
    pub shared_with: String,
    pub shared_by: String,
    pub object_id: String,
    pub shared_at: DateTime<Utc>,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller-facing error taxonomy of the access service.
//!
//! Lower layers keep their own error enums. They are translated here, once,
//! so that "not allowed", "broken" and "try later" stay distinguishable all
//! the way to the HTTP boundary.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use crate::crypto::CipherError;
use crate::ledger::OracleError;
use crate::storage::{ContentStoreError, IndexError};

/// Step of an upload that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    Encrypt,
    Store,
    Index,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStep::Encrypt => write!(f, "encrypt"),
            UploadStep::Store => write!(f, "store"),
            UploadStep::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Object, content, key, or owner is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requester is not authorized.
    #[error("access denied")]
    AccessDenied,

    /// Authenticated decryption failed.
    #[error("decryption failed")]
    Decryption,

    /// Stored state references something that does not exist or no longer
    /// matches its digest.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The ledger could not be reached or did not answer in time.
    #[error("ledger unavailable: {0}")]
    OracleUnavailable(String),

    /// Grant attempted for an owner with no readable objects.
    #[error("owner {0} has no data to share")]
    NoData(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upload failed at {step} step: {reason}")]
    UploadFailed { step: UploadStep, reason: String },

    /// Local I/O or database failure.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ContentStoreError> for ServiceError {
    fn from(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::NotFound(id) => ServiceError::NotFound(format!("content {id}")),
            ContentStoreError::Integrity { content_id, reason } => {
                ServiceError::Integrity(format!("content {content_id}: {reason}"))
            }
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<IndexError> for ServiceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotFound(what) => ServiceError::NotFound(what),
            IndexError::Conflict(what) => ServiceError::AlreadyExists(what),
            IndexError::Integrity(what) => ServiceError::Integrity(what),
            IndexError::NothingToShare(owner) => ServiceError::NoData(owner),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

/// Everything but a rejected address means the ledger could not answer.
impl From<OracleError> for ServiceError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::InvalidAddress(reason) => ServiceError::InvalidInput(reason),
            other => ServiceError::OracleUnavailable(other.to_string()),
        }
    }
}

/// Only the read path converts cipher errors implicitly; upload wraps them in
/// [`ServiceError::UploadFailed`].
impl From<CipherError> for ServiceError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Decrypt => ServiceError::Decryption,
            CipherError::InvalidKey(reason) | CipherError::InvalidNonce(reason) => {
                ServiceError::Integrity(format!("stored key material is malformed: {reason}"))
            }
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_is_never_folded_into_denial() {
        assert!(matches!(
            ServiceError::from(CipherError::Decrypt),
            ServiceError::Decryption
        ));
    }

    #[test]
    fn index_errors_map_to_taxonomy() {
        assert!(matches!(
            ServiceError::from(IndexError::NothingToShare("0xa".into())),
            ServiceError::NoData(_)
        ));
        assert!(matches!(
            ServiceError::from(IndexError::Conflict("owner 0xa".into())),
            ServiceError::AlreadyExists(_)
        ));
        assert!(matches!(
            ServiceError::from(IndexError::Integrity("dangling".into())),
            ServiceError::Integrity(_)
        ));
    }

    #[test]
    fn oracle_failures_are_unavailable() {
        for err in [
            OracleError::Unavailable,
            OracleError::Rpc("connection refused".into()),
            OracleError::Contract("reverted".into()),
        ] {
            assert!(matches!(
                ServiceError::from(err),
                ServiceError::OracleUnavailable(_)
            ));
        }
    }

    #[test]
    fn unrepresentable_address_is_invalid_input() {
        let err = ServiceError::from(OracleError::InvalidAddress("'alice'".into()));
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn content_integrity_keeps_reason() {
        let err = ServiceError::from(ContentStoreError::Integrity {
            content_id: "sha256-ab".into(),
            reason: "digest mismatch".into(),
        });
        assert_eq!(
            err.to_string(),
            "integrity error: content sha256-ab: digest mismatch"
        );
    }

    #[test]
    fn upload_step_display() {
        let err = ServiceError::UploadFailed {
            step: UploadStep::Index,
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "upload failed at index step: disk full");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The ledger as seen by the vault.
//!
//! The ledger is the authority on who may read whose records. The vault only
//! mirrors it: every read by a non-owner and every grant is confirmed here
//! first, and the reconciler replays ledger events into local state.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::AccountAddress;
use crate::storage::DataCategory;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("ledger RPC error: {0}")]
    Rpc(String),

    #[error("ledger contract call failed: {0}")]
    Contract(String),

    #[error("invalid ledger configuration: {0}")]
    Config(String),

    /// The account cannot be expressed on this ledger.
    #[error("not a ledger address: {0}")]
    InvalidAddress(String),

    #[error("ledger unavailable")]
    Unavailable,
}

pub type OracleResult<T> = Result<T, OracleError>;

// =============================================================================
// Types
// =============================================================================

/// An owner known to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredOwner {
    pub address: AccountAddress,
    /// Number of records the ledger lists for this owner.
    pub record_count: u64,
}

/// A state change observed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    OwnerRegistered {
        owner: AccountAddress,
        name: String,
        age: u64,
    },
    ObjectAdded {
        owner: AccountAddress,
        content_id: String,
        category: Option<DataCategory>,
        description: String,
    },
    AccessGranted {
        owner: AccountAddress,
        grantee: AccountAddress,
    },
    AccessRevoked {
        owner: AccountAddress,
        grantee: AccountAddress,
    },
}

/// A ledger event with its position, for monotonic replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub block_number: u64,
    pub log_index: u64,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
}

impl LedgerEvent {
    /// Replay order: block, then position within the block.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Read-only view of the access-control ledger.
pub trait LedgerOracle: Send + Sync {
    /// Whether `accessor` may read records of `owner`.
    ///
    /// True for the owner, the registrar, and any accessor with a live grant.
    fn is_authorized(
        &self,
        owner: &AccountAddress,
        accessor: &AccountAddress,
    ) -> impl Future<Output = OracleResult<bool>> + Send;

    /// Every owner registered on the ledger.
    fn registered_owners(&self) -> impl Future<Output = OracleResult<Vec<RegisteredOwner>>> + Send;

    /// The account allowed to register owners.
    fn registrar(&self) -> impl Future<Output = OracleResult<AccountAddress>> + Send;

    /// Latest block number.
    fn head(&self) -> impl Future<Output = OracleResult<u64>> + Send;

    /// Events in `from_block..=to_block`, ordered by position.
    fn events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = OracleResult<Vec<LedgerEvent>>> + Send;
}

impl<T: LedgerOracle> LedgerOracle for Arc<T> {
    fn is_authorized(
        &self,
        owner: &AccountAddress,
        accessor: &AccountAddress,
    ) -> impl Future<Output = OracleResult<bool>> + Send {
        (**self).is_authorized(owner, accessor)
    }

    fn registered_owners(&self) -> impl Future<Output = OracleResult<Vec<RegisteredOwner>>> + Send {
        (**self).registered_owners()
    }

    fn registrar(&self) -> impl Future<Output = OracleResult<AccountAddress>> + Send {
        (**self).registrar()
    }

    fn head(&self) -> impl Future<Output = OracleResult<u64>> + Send {
        (**self).head()
    }

    fn events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = OracleResult<Vec<LedgerEvent>>> + Send {
        (**self).events(from_block, to_block)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger
//!
//! Read access to the access-control ledger, plus the background reconciler
//! that mirrors ledger events into the metadata index.
//!
//! - [`ContractOracle`]: the deployed contract over HTTP JSON-RPC.
//! - [`MemoryLedger`]: an in-process ledger for tests and local development.
//! - [`OracleBackend`]: the one the server runs with, chosen by `LEDGER_MODE`.

pub mod contract;
pub mod memory;
pub mod oracle;
pub mod reconciler;

use std::sync::Arc;

pub use contract::ContractOracle;
pub use memory::MemoryLedger;
pub use oracle::{
    LedgerEvent, LedgerEventKind, LedgerOracle, OracleError, OracleResult, RegisteredOwner,
};
pub use reconciler::{LedgerReconciler, ReconcileError};

use crate::models::AccountAddress;

/// Ledger implementation selected at startup.
pub enum OracleBackend {
    Contract(ContractOracle),
    Memory(Arc<MemoryLedger>),
}

impl OracleBackend {
    /// Short name for logs and health output.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Contract(_) => "contract",
            Self::Memory(_) => "memory",
        }
    }

    /// The in-process ledger, when that is what the vault runs against.
    pub fn memory(&self) -> Option<&MemoryLedger> {
        match self {
            Self::Memory(ledger) => Some(ledger.as_ref()),
            Self::Contract(_) => None,
        }
    }
}

impl LedgerOracle for OracleBackend {
    async fn is_authorized(
        &self,
        owner: &AccountAddress,
        accessor: &AccountAddress,
    ) -> OracleResult<bool> {
        match self {
            Self::Contract(oracle) => oracle.is_authorized(owner, accessor).await,
            Self::Memory(ledger) => ledger.is_authorized(owner, accessor).await,
        }
    }

    async fn registered_owners(&self) -> OracleResult<Vec<RegisteredOwner>> {
        match self {
            Self::Contract(oracle) => oracle.registered_owners().await,
            Self::Memory(ledger) => ledger.registered_owners().await,
        }
    }

    async fn registrar(&self) -> OracleResult<AccountAddress> {
        match self {
            Self::Contract(oracle) => oracle.registrar().await,
            Self::Memory(ledger) => ledger.registrar().await,
        }
    }

    async fn head(&self) -> OracleResult<u64> {
        match self {
            Self::Contract(oracle) => oracle.head().await,
            Self::Memory(ledger) => ledger.head().await,
        }
    }

    async fn events(&self, from_block: u64, to_block: u64) -> OracleResult<Vec<LedgerEvent>> {
        match self {
            Self::Contract(oracle) => oracle.events(from_block, to_block).await,
            Self::Memory(ledger) => ledger.events(from_block, to_block).await,
        }
    }
}

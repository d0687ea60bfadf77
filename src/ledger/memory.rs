// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger.
//!
//! Behaves like the on-chain contract: each mutation is one "block" holding
//! one event. Used by tests and by `LEDGER_MODE=memory` development runs,
//! where it can also simulate an unreachable or slow ledger.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::models::AccountAddress;
use crate::storage::DataCategory;

use super::oracle::{
    LedgerEvent, LedgerEventKind, LedgerOracle, OracleError, OracleResult, RegisteredOwner,
};

#[derive(Debug)]
struct LedgerState {
    registrar: AccountAddress,
    owners: BTreeMap<AccountAddress, u64>,
    grants: HashSet<(AccountAddress, AccountAddress)>,
    events: Vec<LedgerEvent>,
    block: u64,
    available: bool,
    latency: Duration,
}

impl LedgerState {
    fn push(&mut self, kind: LedgerEventKind) -> u64 {
        self.block += 1;
        self.events.push(LedgerEvent {
            block_number: self.block,
            log_index: 0,
            kind,
        });
        self.block
    }
}

/// Ledger kept in memory.
#[derive(Debug)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(registrar: AccountAddress) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                registrar,
                owners: BTreeMap::new(),
                grants: HashSet::new(),
                events: Vec::new(),
                block: 0,
                available: true,
                latency: Duration::ZERO,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Ledger transactions ==========
    //
    // Each returns the block that recorded it.

    pub fn register_owner(&self, owner: &AccountAddress, name: &str, age: u64) -> u64 {
        let mut state = self.lock();
        state.owners.entry(owner.clone()).or_insert(0);
        state.push(LedgerEventKind::OwnerRegistered {
            owner: owner.clone(),
            name: name.to_string(),
            age,
        })
    }

    pub fn add_object(
        &self,
        owner: &AccountAddress,
        content_id: &str,
        category: DataCategory,
        description: &str,
    ) -> u64 {
        let mut state = self.lock();
        *state.owners.entry(owner.clone()).or_insert(0) += 1;
        state.push(LedgerEventKind::ObjectAdded {
            owner: owner.clone(),
            content_id: content_id.to_string(),
            category: Some(category),
            description: description.to_string(),
        })
    }

    pub fn grant(&self, owner: &AccountAddress, grantee: &AccountAddress) -> u64 {
        let mut state = self.lock();
        state.grants.insert((owner.clone(), grantee.clone()));
        state.push(LedgerEventKind::AccessGranted {
            owner: owner.clone(),
            grantee: grantee.clone(),
        })
    }

    pub fn revoke(&self, owner: &AccountAddress, grantee: &AccountAddress) -> u64 {
        let mut state = self.lock();
        state.grants.remove(&(owner.clone(), grantee.clone()));
        state.push(LedgerEventKind::AccessRevoked {
            owner: owner.clone(),
            grantee: grantee.clone(),
        })
    }

    pub fn is_registered(&self, owner: &AccountAddress) -> bool {
        self.lock().owners.contains_key(owner)
    }

    // ========== Fault simulation ==========

    /// When false, every query fails with `OracleError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Delay applied to every query.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    async fn reachable(&self) -> OracleResult<()> {
        let (available, latency) = {
            let state = self.lock();
            (state.available, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if available {
            Ok(())
        } else {
            Err(OracleError::Unavailable)
        }
    }
}

impl LedgerOracle for MemoryLedger {
    async fn is_authorized(
        &self,
        owner: &AccountAddress,
        accessor: &AccountAddress,
    ) -> OracleResult<bool> {
        self.reachable().await?;
        let state = self.lock();
        Ok(owner == accessor
            || *accessor == state.registrar
            || state.grants.contains(&(owner.clone(), accessor.clone())))
    }

    async fn registered_owners(&self) -> OracleResult<Vec<RegisteredOwner>> {
        self.reachable().await?;
        let state = self.lock();
        Ok(state
            .owners
            .iter()
            .map(|(address, record_count)| RegisteredOwner {
                address: address.clone(),
                record_count: *record_count,
            })
            .collect())
    }

    async fn registrar(&self) -> OracleResult<AccountAddress> {
        self.reachable().await?;
        Ok(self.lock().registrar.clone())
    }

    async fn head(&self) -> OracleResult<u64> {
        self.reachable().await?;
        Ok(self.lock().block)
    }

    async fn events(&self, from_block: u64, to_block: u64) -> OracleResult<Vec<LedgerEvent>> {
        self.reachable().await?;
        let state = self.lock();
        Ok(state
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: &str) -> AccountAddress {
        AccountAddress::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn grants_and_registrar_authorize() {
        let ledger = MemoryLedger::new(addr("0xdoc"));
        let (owner, reader) = (addr("0xa"), addr("0xb"));

        assert!(!ledger.is_authorized(&owner, &reader).await.unwrap());
        assert!(ledger.is_authorized(&owner, &owner).await.unwrap());
        assert!(ledger.is_authorized(&owner, &addr("0xDOC")).await.unwrap());

        ledger.grant(&owner, &reader);
        assert!(ledger.is_authorized(&owner, &reader).await.unwrap());

        ledger.revoke(&owner, &reader);
        assert!(!ledger.is_authorized(&owner, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn events_are_one_per_block_and_filterable() {
        let ledger = MemoryLedger::new(addr("0xdoc"));
        let (owner, reader) = (addr("0xa"), addr("0xb"));
        ledger.register_owner(&owner, "Ada", 36);
        ledger.add_object(&owner, "sha256-00", DataCategory::Diagnosis, "scan");
        assert_eq!(ledger.grant(&owner, &reader), 3);
        assert!(ledger.is_registered(&owner));
        assert!(!ledger.is_registered(&reader));

        assert_eq!(ledger.head().await.unwrap(), 3);
        let events = ledger.events(2, 3).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].block_number, 2);
        assert!(matches!(events[1].kind, LedgerEventKind::AccessGranted { .. }));

        let owners = ledger.registered_owners().await.unwrap();
        assert_eq!(
            owners,
            vec![RegisteredOwner {
                address: owner,
                record_count: 1,
            }]
        );
    }

    #[tokio::test]
    async fn unavailable_ledger_fails_every_query() {
        let ledger = MemoryLedger::new(addr("0xdoc"));
        ledger.set_available(false);

        assert!(matches!(ledger.head().await, Err(OracleError::Unavailable)));
        assert!(matches!(
            ledger.is_authorized(&addr("0xa"), &addr("0xb")).await,
            Err(OracleError::Unavailable)
        ));

        ledger.set_available(true);
        assert_eq!(ledger.head().await.unwrap(), 0);
    }
}

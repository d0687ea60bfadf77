// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per (owner, grantee) serialization of grant and revoke.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::AccountAddress;

type PairKey = (AccountAddress, AccountAddress);

/// Async mutex per account pair.
///
/// The guard is held across the ledger check and the index write, so two
/// concurrent grant/revoke calls for the same pair cannot interleave. Pairs
/// nobody holds are dropped from the map on the next acquire.
#[derive(Debug, Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        owner: &AccountAddress,
        grantee: &AccountAddress,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((owner.clone(), grantee.clone()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of pairs currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

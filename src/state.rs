// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::ledger::OracleBackend;
use crate::service::AccessService;
use crate::storage::DEFAULT_GC_MAX_AGE;

pub type VaultService = AccessService<OracleBackend>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VaultService>,
    /// Default age threshold of garbage collection requests.
    pub gc_max_age: Duration,
}

impl AppState {
    pub fn new(service: Arc<VaultService>) -> Self {
        Self {
            service,
            gc_max_age: DEFAULT_GC_MAX_AGE,
        }
    }

    pub fn with_gc_max_age(mut self, gc_max_age: Duration) -> Self {
        self.gc_max_age = gc_max_age;
        self
    }
}

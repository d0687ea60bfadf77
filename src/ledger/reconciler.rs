// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Reconciler
//!
//! Background task that replays ledger events into the metadata index, so
//! grants and revocations made directly on the ledger reach the vault even
//! when nobody calls the HTTP API.
//!
//! ## Checkpointing
//!
//! The last applied block is stored in the index (`ledger_state` table).
//! On restart the reconciler resumes after it. A chunk is checkpointed only
//! after all of its events were applied, so a failed step is retried from
//! the same block.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::service::{AccessService, ServiceError};
use crate::storage::IndexError;

use super::oracle::{LedgerEvent, LedgerOracle, OracleError};

/// Checkpoint name in the `ledger_state` table.
const CHECKPOINT: &str = "reconciler";

/// Default block chunk size per events query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default poll interval when caught up to the ledger head.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Outcome of one [`LedgerReconciler::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub from_block: u64,
    pub to_block: u64,
    pub events_seen: usize,
    pub events_applied: usize,
}

pub struct LedgerReconciler<O> {
    service: Arc<AccessService<O>>,
    poll_interval: Duration,
    chunk_size: u64,
    start_block: u64,
}

impl<O: LedgerOracle> LedgerReconciler<O> {
    pub fn new(service: Arc<AccessService<O>>) -> Self {
        Self {
            service,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            start_block: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// First block to read when no checkpoint exists yet.
    pub fn with_start_block(mut self, start_block: u64) -> Self {
        self.start_block = start_block;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(reconciler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            poll_secs = self.poll_interval.as_secs(),
            chunk_size = self.chunk_size,
            "Ledger reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Ledger reconciler shutting down");
                return;
            }

            match self.step().await {
                Ok(report) if report.events_applied > 0 => tracing::info!(
                    from_block = report.from_block,
                    to_block = report.to_block,
                    applied = report.events_applied,
                    "Reconciled ledger events"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Reconciler step failed, will retry"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Ledger reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// Apply every event between the checkpoint and the ledger head.
    pub async fn step(&self) -> Result<StepReport, ReconcileError> {
        let index = self.service.index();
        let checkpoint = index.get_checkpoint(CHECKPOINT)?;
        let head = self.service.oracle().head().await?;

        let start = match checkpoint {
            Some(block) => block + 1,
            None => self.start_block,
        };
        let mut report = StepReport {
            from_block: start,
            to_block: head,
            ..StepReport::default()
        };
        if start > head {
            return Ok(report);
        }

        let mut from = start;
        while from <= head {
            let to = from.saturating_add(self.chunk_size - 1).min(head);

            let mut events = self.service.oracle().events(from, to).await?;
            events.sort_by_key(LedgerEvent::position);

            for event in &events {
                report.events_seen += 1;
                if self.service.apply_ledger_event(event).await? {
                    report.events_applied += 1;
                }
                tracing::debug!(
                    block = event.block_number,
                    log_index = event.log_index,
                    "Ledger event processed"
                );
            }

            index.set_checkpoint(CHECKPOINT, to)?;
            from = to + 1;
        }

        Ok(report)
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("ledger error: {0}")]
    Oracle(#[from] OracleError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("apply failed: {0}")]
    Apply(#[from] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::models::AccountAddress;
    use crate::service::NewObject;
    use crate::storage::{ContentStore, DataCategory, MetadataIndex, StoragePaths};
    use tempfile::TempDir;

    fn addr(raw: &str) -> AccountAddress {
        AccountAddress::parse(raw).unwrap()
    }

    fn setup() -> (TempDir, Arc<MemoryLedger>, Arc<AccessService<Arc<MemoryLedger>>>) {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let store = Arc::new(ContentStore::new(paths.clone()));
        store.init().unwrap();
        let index = Arc::new(MetadataIndex::open(&paths.index_db()).unwrap());
        let ledger = Arc::new(MemoryLedger::new(addr("0xdoc")));
        let service = Arc::new(AccessService::new(
            store,
            index,
            ledger.clone(),
            Duration::from_secs(1),
        ));
        (temp, ledger, service)
    }

    fn upload(service: &AccessService<Arc<MemoryLedger>>, owner: &AccountAddress) -> String {
        service
            .upload(
                owner,
                b"hello",
                NewObject {
                    category: DataCategory::Diagnosis,
                    description: "scan".into(),
                    original_name: "scan.txt".into(),
                    mime_type: "text/plain".into(),
                },
            )
            .unwrap()
            .content_id
            .to_string()
    }

    #[tokio::test]
    async fn applies_revoke_events_and_checkpoints() {
        let (_temp, ledger, service) = setup();
        let reconciler = LedgerReconciler::new(service.clone()).with_chunk_size(2);
        let (a, b) = (addr("0xa"), addr("0xb"));

        ledger.register_owner(&a, "Ada", 36);
        let report = reconciler.step().await.unwrap();
        assert_eq!(report.events_applied, 1);
        assert!(service.get_owner(&a).is_ok());

        let content_id = upload(&service, &a);
        ledger.grant(&a, &b);
        reconciler.step().await.unwrap();
        assert!(service.download(&content_id, &b).await.is_ok());

        ledger.revoke(&a, &b);
        let report = reconciler.step().await.unwrap();
        assert_eq!(report.from_block, 3);
        assert_eq!(report.events_applied, 1);
        assert!(matches!(
            service.download(&content_id, &b).await,
            Err(ServiceError::AccessDenied)
        ));

        assert_eq!(service.index().get_checkpoint(CHECKPOINT).unwrap(), Some(3));
        let idle = reconciler.step().await.unwrap();
        assert_eq!(idle.events_seen, 0);
    }

    #[tokio::test]
    async fn failed_step_keeps_checkpoint() {
        let (_temp, ledger, service) = setup();
        let reconciler = LedgerReconciler::new(service.clone());
        ledger.register_owner(&addr("0xa"), "Ada", 36);

        ledger.set_available(false);
        assert!(matches!(
            reconciler.step().await,
            Err(ReconcileError::Oracle(OracleError::Unavailable))
        ));
        assert_eq!(service.index().get_checkpoint(CHECKPOINT).unwrap(), None);

        ledger.set_available(true);
        assert_eq!(reconciler.step().await.unwrap().events_applied, 1);
    }

    #[tokio::test]
    async fn grants_without_data_are_skipped() {
        let (_temp, ledger, service) = setup();
        let reconciler = LedgerReconciler::new(service.clone());
        let (a, b) = (addr("0xa"), addr("0xb"));
        ledger.register_owner(&a, "Ada", 36);
        ledger.grant(&a, &b);

        let report = reconciler.step().await.unwrap();
        assert_eq!(report.events_seen, 2);
        assert_eq!(report.events_applied, 1);
        assert!(service.grants_received(&b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (_temp, _ledger, service) = setup();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            LedgerReconciler::new(service)
                .with_poll_interval(Duration::from_secs(60))
                .run(shutdown.clone()),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}

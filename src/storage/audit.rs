// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Uploads, downloads, denials, grants, revocations, registrations, ledger
//! reconciliation, and maintenance runs are appended to a daily JSONL file
//! under `{data_dir}/audit/`. Audit lines never contain key material or
//! plaintext.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::blob_fs::{FsError, FsResult, LocalFs};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Object events
    ObjectUploaded,
    ObjectDownloaded,
    AccessDenied,

    // Access events
    AccessGranted,
    AccessRevoked,

    // Owner events
    OwnerRegistered,

    // Background / admin events
    LedgerEventApplied,
    MaintenanceRun,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Account that triggered the event (if known).
    pub actor: Option<String>,
    /// Resource type (object, owner, grant, ...).
    pub resource_type: Option<String>,
    /// Resource affected (content id, address, ...).
    pub resource_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    fs: &'a LocalFs,
}

impl<'a> AuditRepository<'a> {
    pub fn new(fs: &'a LocalFs) -> Self {
        Self { fs }
    }

    /// Append an event to the daily log (JSONL format).
    pub fn log(&self, event: &AuditEvent) -> FsResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.fs.paths().audit_events_file(&date);
        let line = serde_json::to_string(event)?;
        self.fs.append_line(&path, &line)
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> FsResult<Vec<AuditEvent>> {
        let path = self.fs.paths().audit_events_file(date);
        let content = self.fs.read_raw(&path)?;
        let content = String::from_utf8(content)
            .map_err(|e| FsError::IntegrityViolation(format!("Invalid UTF-8 in audit log: {e}")))?;

        let mut events = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Read events for an inclusive date range. Days without a log are skipped.
    pub fn read_events_range(&self, start: NaiveDate, end: NaiveDate) -> FsResult<Vec<AuditEvent>> {
        let mut all_events = Vec::new();
        for day in start.iter_days().take_while(|day| *day <= end) {
            match self.read_events(&day.format("%Y-%m-%d").to_string()) {
                Ok(events) => all_events.extend(events),
                Err(FsError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(all_events)
    }

    /// Events of one resource on a given date.
    pub fn search_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        date: &str,
    ) -> FsResult<Vec<AuditEvent>> {
        let events = self.read_events(date)?;
        Ok(events
            .into_iter()
            .filter(|e| {
                e.resource_type.as_deref() == Some(resource_type)
                    && e.resource_id.as_deref() == Some(resource_id)
            })
            .collect())
    }
}

/// Helper macro for logging audit events.
///
/// Audit failures are logged and never fail the audited operation.
#[macro_export]
macro_rules! audit_log {
    ($fs:expr, $event:expr) => {{
        let repo = $crate::storage::AuditRepository::new($fs);
        if let Err(e) = repo.log(&$event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    }};
    ($fs:expr, $event_type:expr, $actor:expr, $resource_type:expr, $resource_id:expr) => {{
        $crate::audit_log!(
            $fs,
            $crate::storage::AuditEvent::new($event_type)
                .with_actor($actor)
                .with_resource($resource_type, $resource_id)
        )
    }};
}

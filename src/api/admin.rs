// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Maintenance endpoints. Every handler requires the ledger registrar.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::requester::Requester;
use crate::{
    error::{ApiError, ErrorBody},
    service::{VaultExport, VaultReset, VaultStats},
    state::AppState,
    storage::IntegrityIssue,
};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize, IntoParams)]
pub struct GcQuery {
    /// Remove unpinned blobs older than this many days.
    pub max_age_days: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GcResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReindexResponse {
    pub entries_written: usize,
    /// Issues remaining after the rebuild.
    pub issues: Vec<IntegrityIssue>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    tag = "Admin",
    responses(
        (status = 200, body = VaultStats),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn stats(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<VaultStats>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    Ok(Json(state.service.stats()?))
}

#[utoipa::path(
    get,
    path = "/v1/admin/export",
    tag = "Admin",
    responses(
        (status = 200, description = "Snapshot of every table and blob, including key material"),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn export(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<VaultExport>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    let snapshot = state.service.export_all()?;
    tracing::info!(
        requester = %requester,
        objects = snapshot.index.objects.len(),
        blobs = snapshot.blobs.len(),
        "Vault exported"
    );
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/v1/admin/gc",
    params(GcQuery),
    tag = "Admin",
    responses(
        (status = 200, body = GcResponse),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn garbage_collect(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Query(query): Query<GcQuery>,
) -> Result<Json<GcResponse>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    let max_age = query
        .max_age_days
        .map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
        .unwrap_or(state.gc_max_age);
    let removed = state.service.garbage_collect(max_age)?;
    Ok(Json(GcResponse { removed }))
}

#[utoipa::path(
    post,
    path = "/v1/admin/reindex",
    tag = "Admin",
    responses(
        (status = 200, body = ReindexResponse),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn reindex(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<ReindexResponse>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    let entries_written = state.service.rebuild_indexes()?;
    let issues = state.service.verify_integrity()?;
    Ok(Json(ReindexResponse {
        entries_written,
        issues,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/admin/integrity",
    tag = "Admin",
    responses(
        (status = 200, body = [IntegrityIssue]),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn integrity(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<Vec<IntegrityIssue>>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    Ok(Json(state.service.verify_integrity()?))
}

/// Empty the vault in one call. Meant for development and test deployments.
#[utoipa::path(
    post,
    path = "/v1/admin/reset",
    tag = "Admin",
    responses(
        (status = 200, description = "Every record, index and blob was removed", body = VaultReset),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn reset(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<VaultReset>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    Ok(Json(state.service.reset_all(&requester)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{self, owner, test_state, upload};
    use axum::http::StatusCode;

    fn registrar() -> Requester {
        Requester(test_support::registrar())
    }

    #[tokio::test]
    async fn stats_and_export_reflect_uploads() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        upload(&state, &a, b"hello");

        let Json(stats) = stats(State(state.clone()), registrar()).await.unwrap();
        assert_eq!(stats.content.total_blobs, 1);
        assert_eq!(stats.index.objects, 1);
        assert_eq!(stats.index.key_records, 1);

        let Json(snapshot) = export(State(state), registrar()).await.unwrap();
        assert_eq!(snapshot.index.owners.len(), 1);
        assert_eq!(snapshot.blobs.len(), 1);
    }

    #[tokio::test]
    async fn maintenance_requires_registrar() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;

        let err = reindex(State(state.clone()), Requester(a.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = export(State(state), Requester(a)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn reindex_reports_clean_state() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        upload(&state, &a, b"hello");

        let Json(report) = reindex(State(state.clone()), registrar()).await.unwrap();
        assert!(report.entries_written > 0);
        assert!(report.issues.is_empty());

        let Json(issues) = integrity(State(state), registrar()).await.unwrap();
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn gc_keeps_pinned_blobs() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        upload(&state, &a, b"hello");

        let Json(response) = garbage_collect(
            State(state),
            registrar(),
            Query(GcQuery {
                max_age_days: Some(0),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.removed, 0);
    }

    #[tokio::test]
    async fn reset_empties_the_vault() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        upload(&state, &a, b"hello");
        upload(&state, &a, b"world");

        let err = reset(State(state.clone()), Requester(a)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let Json(removed) = reset(State(state.clone()), registrar()).await.unwrap();
        assert_eq!(removed.index.owners, 1);
        assert_eq!(removed.index.objects, 2);
        assert_eq!(removed.blobs_removed, 2);

        let Json(stats) = stats(State(state), registrar()).await.unwrap();
        assert_eq!(stats.index.owners, 0);
        assert_eq!(stats.index.objects, 0);
        assert_eq!(stats.content.total_blobs, 0);
    }
}

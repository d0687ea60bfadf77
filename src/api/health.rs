// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Content store and metadata index.
    pub storage: String,
    /// Ledger reachability.
    pub ledger: String,
    /// Ledger head block, when reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_head: Option<u64>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let storage_ok = match state.service.check_storage() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        }
    };
    let ledger_head = match state.service.check_ledger().await {
        Ok(head) => Some(head),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger health check failed");
            None
        }
    };
    let all_ok = storage_ok && ledger_head.is_some();

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            storage: if storage_ok { "ok" } else { "unavailable" }.to_string(),
            ledger: if ledger_head.is_some() { "ok" } else { "unavailable" }.to_string(),
            ledger_head,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;

    #[tokio::test]
    async fn healthy_when_storage_and_ledger_respond() {
        let (_temp, _ledger, state) = test_state();
        let (status, Json(response)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.checks.ledger_head, Some(0));
    }

    #[tokio::test]
    async fn degraded_when_ledger_is_down() {
        let (_temp, ledger, state) = test_state();
        ledger.set_available(false);
        let (status, Json(response)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status, "degraded");
        assert_eq!(response.checks.ledger, "unavailable");
        assert_eq!(response.checks.storage, "ok");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let Json(response) = liveness().await;
        assert_eq!(response.status, "ok");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use super::requester::Requester;
use crate::{
    error::{ApiError, ErrorBody},
    models::AccountAddress,
    service::GrantReceipt,
    state::AppState,
    storage::{AccessGrant, RevokeOutcome},
};

/// Grant or revoke request. The requester is the owner.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub grantee: AccountAddress,
}

#[utoipa::path(
    post,
    path = "/v1/access/grant",
    request_body = AccessRequest,
    tag = "Access",
    responses(
        (status = 200, body = GrantReceipt),
        (status = 400, description = "Account cannot exist on the ledger", body = ErrorBody),
        (status = 403, description = "Ledger does not record the grant", body = ErrorBody),
        (status = 409, description = "Owner has no data to share", body = ErrorBody),
        (status = 503, description = "Ledger unavailable", body = ErrorBody)
    )
)]
pub async fn grant_access(
    State(state): State<AppState>,
    Requester(owner): Requester,
    Json(request): Json<AccessRequest>,
) -> Result<Json<GrantReceipt>, ApiError> {
    Ok(Json(
        state.service.grant_access(&owner, &request.grantee).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/access/revoke",
    request_body = AccessRequest,
    tag = "Access",
    responses((status = 200, body = RevokeOutcome))
)]
pub async fn revoke_access(
    State(state): State<AppState>,
    Requester(owner): Requester,
    Json(request): Json<AccessRequest>,
) -> Result<Json<RevokeOutcome>, ApiError> {
    Ok(Json(
        state.service.revoke_access(&owner, &request.grantee).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/v1/access/issued",
    tag = "Access",
    responses(
        (
            status = 200,
            description = "Grants issued by the requester, newest first",
            body = [AccessGrant]
        )
    )
)]
pub async fn grants_issued(
    State(state): State<AppState>,
    Requester(owner): Requester,
) -> Result<Json<Vec<AccessGrant>>, ApiError> {
    Ok(Json(state.service.grants_issued(&owner)?))
}

#[utoipa::path(
    get,
    path = "/v1/access/received",
    tag = "Access",
    responses(
        (
            status = 200,
            description = "Grants received by the requester, newest first",
            body = [AccessGrant]
        )
    )
)]
pub async fn grants_received(
    State(state): State<AppState>,
    Requester(grantee): Requester,
) -> Result<Json<Vec<AccessGrant>>, ApiError> {
    Ok(Json(state.service.grants_received(&grantee)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{contract_state, owner, test_state, upload};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn grant_and_revoke_round() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        let b = AccountAddress::parse("0xb").unwrap();
        upload(&state, &a, b"hello");

        let err = grant_access(
            State(state.clone()),
            Requester(a.clone()),
            Json(AccessRequest { grantee: b.clone() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        ledger.grant(&a, &b);
        let Json(receipt) = grant_access(
            State(state.clone()),
            Requester(a.clone()),
            Json(AccessRequest { grantee: b.clone() }),
        )
        .await
        .unwrap();
        assert_eq!(receipt.keys_shared, 1);

        let Json(received) = grants_received(State(state.clone()), Requester(b.clone()))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].is_active);

        let Json(outcome) = revoke_access(
            State(state.clone()),
            Requester(a.clone()),
            Json(AccessRequest { grantee: b }),
        )
        .await
        .unwrap();
        assert_eq!(outcome.removed_copies, 1);

        let Json(issued) = grants_issued(State(state), Requester(a)).await.unwrap();
        assert!(!issued[0].is_active);
    }

    #[tokio::test]
    async fn ledger_outage_is_service_unavailable() {
        let (_temp, ledger, state) = test_state();
        let a = owner(&ledger, &state, "0xa").await;
        upload(&state, &a, b"hello");
        ledger.set_available(false);

        let err = grant_access(
            State(state),
            Requester(a),
            Json(AccessRequest {
                grantee: AccountAddress::parse("0xb").unwrap(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn non_evm_grantee_is_bad_request_against_contract() {
        let (_temp, state) = contract_state();
        let owner = AccountAddress::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap();

        let err = grant_access(
            State(state),
            Requester(owner),
            Json(AccessRequest {
                grantee: AccountAddress::parse("bob").unwrap(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code, "invalid_input");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transactions against the in-process ledger.
//!
//! With `LEDGER_MODE=memory` there is no contract to send transactions to, so
//! these routes stand in for them: the registrar registers owners, owners
//! grant and revoke. The vault itself still only mirrors what the ledger
//! says, through `/v1/owners` and `/v1/access/*` or the reconciler.
//!
//! Against a deployed contract they answer 409 `ledger_read_only`.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::access::AccessRequest;
use super::requester::Requester;
use crate::{
    error::{ApiError, ErrorBody},
    ledger::MemoryLedger,
    models::AccountAddress,
    state::AppState,
};

const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LedgerOwnerRequest {
    pub address: AccountAddress,
    pub name: String,
    pub age: u64,
}

/// Block that recorded the transaction.
#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerReceipt {
    pub block_number: u64,
}

fn memory_ledger(state: &AppState) -> Result<&MemoryLedger, ApiError> {
    state.service.oracle().memory().ok_or_else(|| {
        ApiError::new(
            StatusCode::CONFLICT,
            "ledger_read_only",
            "the ledger is a deployed contract, send the transaction to it",
        )
    })
}

fn registered_owner<'a>(
    ledger: &MemoryLedger,
    owner: &'a AccountAddress,
) -> Result<&'a AccountAddress, ApiError> {
    if ledger.is_registered(owner) {
        Ok(owner)
    } else {
        Err(ApiError::not_found(format!("{owner} is not registered on the ledger")))
    }
}

#[utoipa::path(
    post,
    path = "/v1/ledger/owners",
    request_body = LedgerOwnerRequest,
    tag = "Ledger",
    responses(
        (status = 201, body = LedgerReceipt),
        (status = 403, description = "Requester is not the registrar", body = ErrorBody),
        (status = 409, description = "Already registered, or ledger is read-only", body = ErrorBody)
    )
)]
pub async fn register_owner(
    State(state): State<AppState>,
    Requester(registrar): Requester,
    Json(request): Json<LedgerOwnerRequest>,
) -> Result<(StatusCode, Json<LedgerReceipt>), ApiError> {
    let ledger = memory_ledger(&state)?;
    state.service.ensure_registrar(&registrar).await?;

    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    if ledger.is_registered(&request.address) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "already_exists",
            format!("{} is already registered on the ledger", request.address),
        ));
    }

    let block_number = ledger.register_owner(&request.address, name, request.age);
    tracing::info!(owner = %request.address, block_number, "Owner registered on memory ledger");
    Ok((StatusCode::CREATED, Json(LedgerReceipt { block_number })))
}

#[utoipa::path(
    post,
    path = "/v1/ledger/grants",
    request_body = AccessRequest,
    tag = "Ledger",
    responses(
        (status = 200, body = LedgerReceipt),
        (status = 404, description = "Requester is not a registered owner", body = ErrorBody),
        (status = 409, description = "Ledger is read-only", body = ErrorBody)
    )
)]
pub async fn grant_access(
    State(state): State<AppState>,
    Requester(owner): Requester,
    Json(request): Json<AccessRequest>,
) -> Result<Json<LedgerReceipt>, ApiError> {
    let ledger = memory_ledger(&state)?;
    let owner = registered_owner(ledger, &owner)?;
    if *owner == request.grantee {
        return Err(ApiError::bad_request("owner and grantee must differ"));
    }

    let block_number = ledger.grant(owner, &request.grantee);
    tracing::info!(
        owner = %owner,
        grantee = %request.grantee,
        block_number,
        "Ledger grant recorded"
    );
    Ok(Json(LedgerReceipt { block_number }))
}

#[utoipa::path(
    post,
    path = "/v1/ledger/revocations",
    request_body = AccessRequest,
    tag = "Ledger",
    responses(
        (status = 200, body = LedgerReceipt),
        (status = 404, description = "Requester is not a registered owner", body = ErrorBody),
        (status = 409, description = "Ledger is read-only", body = ErrorBody)
    )
)]
pub async fn revoke_access(
    State(state): State<AppState>,
    Requester(owner): Requester,
    Json(request): Json<AccessRequest>,
) -> Result<Json<LedgerReceipt>, ApiError> {
    let ledger = memory_ledger(&state)?;
    let owner = registered_owner(ledger, &owner)?;

    let block_number = ledger.revoke(owner, &request.grantee);
    tracing::info!(
        owner = %owner,
        grantee = %request.grantee,
        block_number,
        "Ledger revocation recorded"
    );
    Ok(Json(LedgerReceipt { block_number }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{contract_state, registrar, test_state};
    use crate::ledger::LedgerOracle;

    fn addr(raw: &str) -> AccountAddress {
        AccountAddress::parse(raw).unwrap()
    }

    fn ada(address: &str) -> Json<LedgerOwnerRequest> {
        Json(LedgerOwnerRequest {
            address: addr(address),
            name: "Ada".into(),
            age: 36,
        })
    }

    #[tokio::test]
    async fn registrar_registers_on_ledger_once() {
        let (_temp, ledger, state) = test_state();

        let (status, Json(receipt)) =
            register_owner(State(state.clone()), Requester(registrar()), ada("0xa"))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(ledger.registered_owners().await.unwrap().len(), 1);

        let err = register_owner(State(state), Requester(registrar()), ada("0xa"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error_code, "already_exists");
    }

    #[tokio::test]
    async fn only_registrar_registers() {
        let (_temp, _ledger, state) = test_state();
        let err = register_owner(State(state), Requester(addr("0xa")), ada("0xa"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn owner_grants_and_revokes_on_ledger() {
        let (_temp, ledger, state) = test_state();
        let (a, b) = (addr("0xa"), addr("0xb"));
        ledger.register_owner(&a, "Ada", 36);

        let grant = Json(AccessRequest { grantee: b.clone() });
        grant_access(State(state.clone()), Requester(a.clone()), grant)
            .await
            .unwrap();
        assert!(ledger.is_authorized(&a, &b).await.unwrap());

        let revoke = Json(AccessRequest { grantee: b.clone() });
        revoke_access(State(state), Requester(a.clone()), revoke)
            .await
            .unwrap();
        assert!(!ledger.is_authorized(&a, &b).await.unwrap());
    }

    #[tokio::test]
    async fn unregistered_owner_cannot_grant() {
        let (_temp, _ledger, state) = test_state();
        let grant = Json(AccessRequest { grantee: addr("0xb") });
        let err = grant_access(State(state), Requester(addr("0xa")), grant)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn contract_ledger_is_read_only() {
        let (_temp, state) = contract_state();

        let err = register_owner(State(state.clone()), Requester(registrar()), ada("0xa"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error_code, "ledger_read_only");

        let grant = Json(AccessRequest { grantee: addr("0xb") });
        let err = grant_access(State(state), Requester(addr("0xa")), grant)
            .await
            .unwrap_err();
        assert_eq!(err.error_code, "ledger_read_only");
    }
}

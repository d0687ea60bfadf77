// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::requester::Requester;
use crate::{
    error::{ApiError, ErrorBody},
    models::AccountAddress,
    service::OwnerProfile,
    state::AppState,
    storage::OwnerRecord,
};

#[utoipa::path(
    post,
    path = "/v1/owners",
    request_body = OwnerProfile,
    tag = "Owners",
    responses(
        (status = 201, body = OwnerRecord),
        (status = 403, description = "Requester is not the registrar", body = ErrorBody),
        (status = 404, description = "Owner is not registered on the ledger", body = ErrorBody),
        (status = 409, description = "Owner already registered", body = ErrorBody)
    )
)]
pub async fn register_owner(
    State(state): State<AppState>,
    Requester(registrar): Requester,
    Json(profile): Json<OwnerProfile>,
) -> Result<(StatusCode, Json<OwnerRecord>), ApiError> {
    let owner = state.service.register_owner(&registrar, profile).await?;
    Ok((StatusCode::CREATED, Json(owner)))
}

#[utoipa::path(
    get,
    path = "/v1/owners",
    tag = "Owners",
    responses((status = 200, description = "All owners (registrar only)", body = [OwnerRecord]))
)]
pub async fn list_owners(
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<Vec<OwnerRecord>>, ApiError> {
    state.service.ensure_registrar(&requester).await?;
    Ok(Json(state.service.list_owners()?))
}

#[utoipa::path(
    get,
    path = "/v1/owners/{address}",
    params(
        ("address" = String, Path, description = "Owner account address")
    ),
    tag = "Owners",
    responses(
        (status = 200, body = OwnerRecord),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn get_owner(
    Path(address): Path<String>,
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<OwnerRecord>, ApiError> {
    let address = AccountAddress::parse(&address)
        .map_err(|e| ApiError::bad_request(format!("address: {e}")))?;
    if address != requester {
        state.service.ensure_registrar(&requester).await?;
    }
    Ok(Json(state.service.get_owner(&address)?))
}

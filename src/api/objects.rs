// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64ct::{Base64Url, Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::requester::Requester;
use crate::{
    error::{ApiError, ErrorBody},
    service::{NewObject, UploadReceipt},
    state::AppState,
    storage::{DataCategory, ObjectRecord},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    pub category: DataCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub mime_type: String,
    /// Object bytes, base64url (padding optional).
    pub data: String,
}

/// Filters for the object list. Both apply when both are given.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ObjectQuery {
    /// Only objects of this category.
    pub category: Option<DataCategory>,
    /// Only objects whose category is (or is not) clinical data the ledger
    /// shares with researchers.
    pub diagnostic: Option<bool>,
}

impl ObjectQuery {
    fn matches(&self, object: &ObjectRecord) -> bool {
        self.category.is_none_or(|category| object.category == category)
            && self
                .diagnostic
                .is_none_or(|diagnostic| object.category.is_diagnostic() == diagnostic)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadResponse {
    pub object: ObjectRecord,
    /// Decrypted bytes, base64url without padding.
    pub data: String,
}

fn decode_payload(data: &str) -> Result<Vec<u8>, ApiError> {
    let data = data.trim();
    Base64UrlUnpadded::decode_vec(data)
        .or_else(|_| Base64Url::decode_vec(data))
        .map_err(|_| ApiError::bad_request("data must be base64url encoded"))
}

#[utoipa::path(
    post,
    path = "/v1/objects",
    request_body = UploadRequest,
    tag = "Objects",
    responses(
        (status = 201, body = UploadReceipt),
        (status = 404, description = "Requester is not a registered owner", body = ErrorBody)
    )
)]
pub async fn upload_object(
    State(state): State<AppState>,
    Requester(owner): Requester,
    Json(request): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadReceipt>), ApiError> {
    let bytes = decode_payload(&request.data)?;
    let receipt = state.service.upload(
        &owner,
        &bytes,
        NewObject {
            category: request.category,
            description: request.description,
            original_name: request.original_name,
            mime_type: request.mime_type,
        },
    )?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/v1/objects",
    params(ObjectQuery),
    tag = "Objects",
    responses(
        (
            status = 200,
            description = "Objects the requester owns or was granted",
            body = [ObjectRecord]
        )
    )
)]
pub async fn list_objects(
    State(state): State<AppState>,
    Requester(requester): Requester,
    Query(query): Query<ObjectQuery>,
) -> Result<Json<Vec<ObjectRecord>>, ApiError> {
    let mut objects = state.service.accessible_objects(&requester)?;
    objects.retain(|object| query.matches(object));
    Ok(Json(objects))
}

#[utoipa::path(
    get,
    path = "/v1/objects/{content_id}",
    params(
        ("content_id" = String, Path, description = "Content id of the sealed object")
    ),
    tag = "Objects",
    responses(
        (status = 200, body = DownloadResponse),
        (status = 403, description = "Not authorized", body = ErrorBody),
        (status = 404, body = ErrorBody),
        (status = 422, description = "Decryption failed", body = ErrorBody),
        (status = 503, description = "Ledger unavailable", body = ErrorBody)
    )
)]
pub async fn download_object(
    Path(content_id): Path<String>,
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<DownloadResponse>, ApiError> {
    let download = state.service.download(&content_id, &requester).await?;
    Ok(Json(DownloadResponse {
        data: Base64UrlUnpadded::encode_string(&download.plaintext),
        object: download.object,
    }))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    models::AccountAddress,
    service::{
        GrantReceipt, NewObject, OwnerProfile, UploadReceipt, UploadStep, VaultReset, VaultStats,
    },
    state::AppState,
    storage::{
        AccessGrant, ContentId, ContentStats, DataCategory, IndexStats, IntegrityIssue, IssueKind,
        ObjectRecord, OwnerRecord, RevokeOutcome,
    },
};

pub mod access;
pub mod admin;
pub mod health;
pub mod ledger;
pub mod objects;
pub mod owners;
pub mod requester;

pub use requester::{
    signing_message, Requester, REQUESTER_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/owners",
            get(owners::list_owners).post(owners::register_owner),
        )
        .route("/owners/{address}", get(owners::get_owner))
        .route(
            "/objects",
            get(objects::list_objects).post(objects::upload_object),
        )
        .route("/objects/{content_id}", get(objects::download_object))
        .route("/access/grant", post(access::grant_access))
        .route("/access/revoke", post(access::revoke_access))
        .route("/access/issued", get(access::grants_issued))
        .route("/access/received", get(access::grants_received))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/export", get(admin::export))
        .route("/admin/gc", post(admin::garbage_collect))
        .route("/admin/reindex", post(admin::reindex))
        .route("/admin/integrity", get(admin::integrity))
        .route("/admin/reset", post(admin::reset))
        .route("/ledger/owners", post(ledger::register_owner))
        .route("/ledger/grants", post(ledger::grant_access))
        .route("/ledger/revocations", post(ledger::revoke_access))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        owners::register_owner,
        owners::list_owners,
        owners::get_owner,
        objects::upload_object,
        objects::list_objects,
        objects::download_object,
        access::grant_access,
        access::revoke_access,
        access::grants_issued,
        access::grants_received,
        admin::stats,
        admin::export,
        admin::garbage_collect,
        admin::reindex,
        admin::integrity,
        admin::reset,
        ledger::register_owner,
        ledger::grant_access,
        ledger::revoke_access,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            AccountAddress,
            ContentId,
            DataCategory,
            OwnerProfile,
            OwnerRecord,
            NewObject,
            ObjectRecord,
            UploadReceipt,
            UploadStep,
            objects::UploadRequest,
            objects::DownloadResponse,
            access::AccessRequest,
            AccessGrant,
            GrantReceipt,
            RevokeOutcome,
            VaultStats,
            VaultReset,
            ContentStats,
            IndexStats,
            IntegrityIssue,
            IssueKind,
            admin::GcResponse,
            admin::ReindexResponse,
            ledger::LedgerOwnerRequest,
            ledger::LedgerReceipt,
            ErrorBody,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Owners", description = "Owner registration and profiles"),
        (name = "Objects", description = "Encrypted object upload and download"),
        (name = "Access", description = "Grant and revoke read access"),
        (name = "Admin", description = "Statistics, export, and maintenance"),
        (name = "Ledger", description = "Transactions against the in-process development ledger"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy::primitives::{hex, B256};
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use axum::http::request::Builder;
    use chrono::Utc;
    use tempfile::TempDir;

    use super::{signing_message, REQUESTER_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use crate::ledger::{ContractOracle, MemoryLedger, OracleBackend};
    use crate::models::AccountAddress;
    use crate::service::{AccessService, NewObject, OwnerProfile, UploadReceipt};
    use crate::state::AppState;
    use crate::storage::{ContentStore, DataCategory, MetadataIndex, StoragePaths};

    /// Deterministic key for test accounts.
    pub fn signer(seed: u8) -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).unwrap()
    }

    pub fn account_of(signer: &PrivateKeySigner) -> AccountAddress {
        AccountAddress::parse(&format!("{:#x}", signer.address())).unwrap()
    }

    pub fn registrar_signer() -> PrivateKeySigner {
        signer(0xd0)
    }

    pub fn registrar() -> AccountAddress {
        account_of(&registrar_signer())
    }

    /// Add identity headers for `method path`, signed now by `signer`.
    pub fn sign(builder: Builder, signer: &PrivateKeySigner, method: &str, path: &str) -> Builder {
        let account = account_of(signer);
        let timestamp = Utc::now().timestamp();
        let message = signing_message(method, path, &account, timestamp);
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        builder
            .header(REQUESTER_HEADER, account.as_str())
            .header(SIGNATURE_HEADER, hex::encode_prefixed(signature.as_bytes()))
            .header(TIMESTAMP_HEADER, timestamp.to_string())
    }

    pub fn test_state() -> (TempDir, Arc<MemoryLedger>, AppState) {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let store = Arc::new(ContentStore::new(paths.clone()));
        store.init().unwrap();
        let index = Arc::new(MetadataIndex::open(&paths.index_db()).unwrap());
        let ledger = Arc::new(MemoryLedger::new(registrar()));
        let service = AccessService::new(
            store,
            index,
            OracleBackend::Memory(ledger.clone()),
            Duration::from_millis(500),
        );
        (temp, ledger, AppState::new(Arc::new(service)))
    }

    /// State running against a contract on an RPC endpoint nothing listens
    /// on. Only paths that never reach the chain can be exercised.
    pub fn contract_state() -> (TempDir, AppState) {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let store = Arc::new(ContentStore::new(paths.clone()));
        store.init().unwrap();
        let index = Arc::new(MetadataIndex::open(&paths.index_db()).unwrap());
        let oracle = ContractOracle::new(
            "http://127.0.0.1:9",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            0,
        )
        .unwrap();
        let service = AccessService::new(
            store,
            index,
            OracleBackend::Contract(oracle),
            Duration::from_millis(500),
        );
        (temp, AppState::new(Arc::new(service)))
    }

    /// Register `raw` on the ledger and in the vault.
    pub async fn owner(ledger: &MemoryLedger, state: &AppState, raw: &str) -> AccountAddress {
        let address = AccountAddress::parse(raw).unwrap();
        ledger.register_owner(&address, "Ada", 36);
        state
            .service
            .register_owner(
                &registrar(),
                OwnerProfile {
                    address: address.clone(),
                    name: "Ada".into(),
                    age: 36,
                    phone_number: String::new(),
                    emergency_contact: String::new(),
                },
            )
            .await
            .unwrap();
        address
    }

    pub fn upload(state: &AppState, owner: &AccountAddress, bytes: &[u8]) -> UploadReceipt {
        state
            .service
            .upload(
                owner,
                bytes,
                NewObject {
                    category: DataCategory::Diagnosis,
                    description: "scan".into(),
                    original_name: "scan.txt".into(),
                    mime_type: "text/plain".into(),
                },
            )
            .unwrap()
    }
}

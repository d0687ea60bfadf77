// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use record_vault::{
    api::router,
    config::{Config, LedgerConfig},
    ledger::{ContractOracle, LedgerReconciler, MemoryLedger, OracleBackend},
    service::AccessService,
    state::AppState,
    storage::{ContentStore, MetadataIndex, StoragePaths},
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    tracing::info!(
        "Record vault v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let paths = StoragePaths::new(&config.data_dir);
    let store = Arc::new(ContentStore::new(paths.clone()));
    store.init().expect("Failed to initialize content store");
    let index = Arc::new(
        MetadataIndex::open(&paths.index_db()).expect("Failed to open metadata index"),
    );

    let oracle = match &config.ledger {
        LedgerConfig::Contract {
            rpc_url,
            contract_address,
        } => OracleBackend::Contract(
            ContractOracle::new(rpc_url, contract_address, config.ledger_start_block)
                .expect("Failed to configure ledger contract"),
        ),
        LedgerConfig::Memory { registrar } => {
            tracing::warn!(registrar = %registrar, "Using in-memory ledger (development only)");
            OracleBackend::Memory(Arc::new(MemoryLedger::new(registrar.clone())))
        }
    };
    tracing::info!(mode = oracle.mode(), "Ledger oracle configured");

    let service = Arc::new(AccessService::new(
        store.clone(),
        index,
        oracle,
        config.oracle_timeout,
    ));

    let shutdown = CancellationToken::new();
    let reconciler = LedgerReconciler::new(service.clone())
        .with_poll_interval(config.reconcile_interval)
        .with_start_block(config.ledger_start_block);
    let reconciler_task = tokio::spawn(reconciler.run(shutdown.clone()));

    let state = AppState::new(service).with_gc_max_age(config.gc_max_age);
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Record vault listening on http://{addr} (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = reconciler_task.await {
        tracing::warn!(error = %e, "Reconciler task ended abnormally");
    }
    store.close();
    tracing::info!("Record vault stopped");
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record Vault - Encrypted Record Store Mirroring an On-Chain Access Ledger
//!
//! Stores records sealed with per-object AES-256-GCM keys in a
//! content-addressed blob store, indexes them in an embedded database, and
//! hands out keys only to accounts the access-control ledger authorizes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `crypto` - Per-object authenticated encryption
//! - `ledger` - Ledger oracle implementations and the reconciler
//! - `service` - Access and key distribution
//! - `storage` - Content store, metadata index, audit log

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod models;
pub mod service;
pub mod state;
pub mod storage;
pub mod telemetry;

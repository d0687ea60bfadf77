// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cipher Engine
//!
//! Per-object symmetric encryption. Every stored object gets its own
//! AES-256-GCM key and a fresh 96-bit nonce; keys are exported in a JWK
//! shape so they can be persisted next to the object metadata and handed
//! to grantees unchanged.
//!
//! Cryptographic primitives come from `ring`; nothing here stores state.

pub mod cipher;

pub use cipher::{
    decode_nonce, decrypt, encode_nonce, encrypt, export_key, generate_key, import_key,
    CipherError, CipherResult, ExportedKey, ObjectKey, Sealed, KEY_LEN, NONCE_LEN,
};

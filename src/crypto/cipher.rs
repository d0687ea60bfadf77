// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM sealing with per-object keys.
//!
//! ## Wire formats
//!
//! - Sealed payload: ciphertext with the 16-byte GCM tag appended.
//! - Nonce: 12 random bytes, base64url (unpadded) when persisted.
//! - Exported key: `{"kty":"oct","alg":"A256GCM","k":"<base64url>","ext":true}`.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (96-bit GCM IV).
pub const NONCE_LEN: usize = aead::NONCE_LEN;

const JWK_KTY: &str = "oct";
const JWK_ALG: &str = "A256GCM";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The system CSPRNG could not produce bytes.
    #[error("random number generator failure")]
    Rng,

    /// Key material has the wrong length or shape.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Nonce is not exactly 12 bytes or is not valid base64url.
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Sealing failed inside the AEAD implementation.
    #[error("encryption failed")]
    Encrypt,

    /// Wrong key, wrong nonce, or tampered ciphertext.
    #[error("decryption failed: authentication tag mismatch")]
    Decrypt,
}

pub type CipherResult<T> = Result<T, CipherError>;

// =============================================================================
// Types
// =============================================================================

/// A per-object AES-256-GCM key.
///
/// The raw bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectKey([u8; KEY_LEN]);

impl ObjectKey {
    fn from_slice(bytes: &[u8]) -> CipherResult<Self> {
        let raw: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CipherError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }

    fn aead_key(&self) -> CipherResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CipherError::InvalidKey("rejected by AES-256-GCM".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObjectKey(<redacted>)")
    }
}

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Ciphertext followed by the authentication tag.
    pub ciphertext: Vec<u8>,
    /// The 12-byte nonce used for this encryption.
    pub nonce: [u8; NONCE_LEN],
}

/// Portable JWK representation of an [`ObjectKey`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedKey {
    pub kty: String,
    pub alg: String,
    /// Base64url (unpadded) key bytes.
    pub k: String,
    pub ext: bool,
}

impl std::fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedKey")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("k", &"<redacted>")
            .field("ext", &self.ext)
            .finish()
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Generate a fresh random 256-bit key.
pub fn generate_key() -> CipherResult<ObjectKey> {
    let mut raw = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut raw)
        .map_err(|_| CipherError::Rng)?;
    Ok(ObjectKey(raw))
}

/// Encrypt `plaintext` under `key` with a freshly generated nonce.
pub fn encrypt(plaintext: &[u8], key: &ObjectKey) -> CipherResult<Sealed> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| CipherError::Rng)?;

    let sealing_key = key.aead_key()?;
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| CipherError::Encrypt)?;

    Ok(Sealed {
        ciphertext: in_out,
        nonce,
    })
}

/// Decrypt and authenticate `ciphertext`.
///
/// Any mismatch of key, nonce, or ciphertext yields [`CipherError::Decrypt`];
/// partial plaintext is never returned.
pub fn decrypt(ciphertext: &[u8], nonce: &[u8], key: &ObjectKey) -> CipherResult<Vec<u8>> {
    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| {
        CipherError::InvalidNonce(format!("expected {NONCE_LEN} bytes, got {}", nonce.len()))
    })?;

    let opening_key = key.aead_key()?;
    let mut in_out = ciphertext.to_vec();
    let plaintext_len = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CipherError::Decrypt)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Export a key to its JWK form.
pub fn export_key(key: &ObjectKey) -> ExportedKey {
    ExportedKey {
        kty: JWK_KTY.to_string(),
        alg: JWK_ALG.to_string(),
        k: Base64UrlUnpadded::encode_string(&key.0),
        ext: true,
    }
}

/// Import a key previously produced by [`export_key`].
pub fn import_key(exported: &ExportedKey) -> CipherResult<ObjectKey> {
    if exported.kty != JWK_KTY {
        return Err(CipherError::InvalidKey(format!(
            "unsupported key type '{}'",
            exported.kty
        )));
    }
    if exported.alg != JWK_ALG {
        return Err(CipherError::InvalidKey(format!(
            "unsupported algorithm '{}'",
            exported.alg
        )));
    }
    let raw = Base64UrlUnpadded::decode_vec(&exported.k)
        .map_err(|_| CipherError::InvalidKey("key is not valid base64url".to_string()))?;
    ObjectKey::from_slice(&raw)
}

/// Encode a nonce for persistence.
pub fn encode_nonce(nonce: &[u8; NONCE_LEN]) -> String {
    Base64UrlUnpadded::encode_string(nonce)
}

/// Decode a persisted nonce.
pub fn decode_nonce(encoded: &str) -> CipherResult<[u8; NONCE_LEN]> {
    let raw = Base64UrlUnpadded::decode_vec(encoded)
        .map_err(|_| CipherError::InvalidNonce("not valid base64url".to_string()))?;
    raw.as_slice().try_into().map_err(|_| {
        CipherError::InvalidNonce(format!("expected {NONCE_LEN} bytes, got {}", raw.len()))
    })
}

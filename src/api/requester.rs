// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Requester identity extractor.
//!
//! The vault does not manage sessions. Every request names its account in
//! `x-account-address` and proves control of it with an EIP-191 signature
//! (`personal_sign`) over [`signing_message`], sent as `x-account-signature`
//! together with the unix timestamp it signed in `x-account-timestamp`.
//!
//! The signed message binds the method, the path, the account, and the
//! timestamp, so a captured signature is only good for the same call within
//! [`MAX_CLOCK_SKEW_SECS`].
//!
//! # Rejections
//!
//! | Situation | Status | `error_code` |
//! |---|---|---|
//! | No account header | 401 | `missing_requester` |
//! | No signature or timestamp | 401 | `missing_signature` |
//! | Timestamp outside the window | 401 | `signature_expired` |
//! | Signature malformed or from another account | 401 | `invalid_signature` |
//! | Header is not an address | 400 | `invalid_input` |

use alloy::primitives::{hex, Signature};
use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{request::Parts, StatusCode},
};
use chrono::Utc;

use crate::error::ApiError;
use crate::models::AccountAddress;

pub const REQUESTER_HEADER: &str = "x-account-address";
pub const SIGNATURE_HEADER: &str = "x-account-signature";
pub const TIMESTAMP_HEADER: &str = "x-account-timestamp";

/// Largest accepted distance between the signed timestamp and server time.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Account on whose behalf the request is made, verified by signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester(pub AccountAddress);

/// Text the account signs for one request.
pub fn signing_message(
    method: &str,
    path: &str,
    account: &AccountAddress,
    timestamp: i64,
) -> String {
    format!("record-vault request\n{method} {path}\naccount: {account}\ntimestamp: {timestamp}")
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("{name} is not valid text"))),
    }
}

fn invalid_signature(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "invalid_signature", message)
}

/// Account that produced `signature` over `message`, if it parses and
/// recovers.
fn recover_signer(message: &str, signature: &str) -> Option<AccountAddress> {
    let bytes = hex::decode(signature.trim()).ok()?;
    let signature = Signature::try_from(bytes.as_slice()).ok()?;
    let address = signature.recover_address_from_msg(message.as_bytes()).ok()?;
    AccountAddress::parse(&format!("{address:#x}")).ok()
}

impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, REQUESTER_HEADER)?
            .ok_or_else(|| ApiError::unauthorized(format!("missing {REQUESTER_HEADER} header")))?;
        let account = AccountAddress::parse(raw)
            .map_err(|e| ApiError::bad_request(format!("{REQUESTER_HEADER}: {e}")))?;

        let (Some(signature), Some(timestamp)) = (
            header(parts, SIGNATURE_HEADER)?,
            header(parts, TIMESTAMP_HEADER)?,
        ) else {
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "missing_signature",
                format!("{SIGNATURE_HEADER} and {TIMESTAMP_HEADER} are required"),
            ));
        };

        let timestamp: i64 = timestamp.trim().parse().map_err(|_| {
            invalid_signature(format!("{TIMESTAMP_HEADER} is not a unix timestamp"))
        })?;
        if (Utc::now().timestamp() - timestamp).abs() > MAX_CLOCK_SKEW_SECS {
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "signature_expired",
                "request signature is outside the accepted time window",
            ));
        }

        // Nested routers see a stripped path; sign over the one the client sent.
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.0.path().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned());
        let message = signing_message(parts.method.as_str(), &path, &account, timestamp);

        match recover_signer(&message, signature) {
            Some(signer) if signer == account => Ok(Requester(account)),
            Some(signer) => {
                tracing::warn!(
                    claimed = %account,
                    signer = %signer,
                    path = %path,
                    "Signature from another account"
                );
                Err(invalid_signature("signature does not match the account"))
            }
            None => Err(invalid_signature("signature could not be verified")),
        }
    }
}

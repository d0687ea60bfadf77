// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared domain primitives.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Maximum accepted length of an account address.
const MAX_ADDRESS_LEN: usize = 128;

/// Ledger account identifier.
///
/// Addresses are compared case-insensitively on the ledger, so they are
/// trimmed and lowercased on construction. The `|` byte is reserved as the
/// composite-key separator in the metadata index and is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "0x8ba1f109551bd432803012645ac136ddd64dba72")]
pub struct AccountAddress(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("account address is empty")]
    Empty,
    #[error("account address exceeds {MAX_ADDRESS_LEN} characters")]
    TooLong,
    #[error("account address contains an invalid character")]
    InvalidCharacter,
}

impl AccountAddress {
    /// Parse and normalize an address.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        if trimmed.len() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong);
        }
        if trimmed
            .chars()
            .any(|c| c == '|' || c.is_whitespace() || c.is_control())
        {
            return Err(AddressError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AccountAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountAddress> for String {
    fn from(value: AccountAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for AccountAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_trimmed_and_lowercased() {
        let a = AccountAddress::parse("  0xABCdef0000000000000000000000000000000001 ").unwrap();
        let b = AccountAddress::parse("0xabcdef0000000000000000000000000000000001").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        assert_eq!(AccountAddress::parse("   "), Err(AddressError::Empty));
        assert_eq!(
            AccountAddress::parse("0xabc|0xdef"),
            Err(AddressError::InvalidCharacter)
        );
        assert_eq!(
            AccountAddress::parse("0xabc def"),
            Err(AddressError::InvalidCharacter)
        );
        assert_eq!(
            AccountAddress::parse(&"a".repeat(MAX_ADDRESS_LEN + 1)),
            Err(AddressError::TooLong)
        );
    }

    #[test]
    fn serde_normalizes_on_deserialize() {
        let parsed: AccountAddress = serde_json::from_str("\"0xAbC\"").unwrap();
        assert_eq!(parsed.as_str(), "0xabc");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"0xabc\"");

        let rejected: Result<AccountAddress, _> = serde_json::from_str("\"\"");
        assert!(rejected.is_err());
    }
}

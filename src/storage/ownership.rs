// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership checks for owner-scoped records.
//!
//! The owner of a record is always authorized for it without consulting the
//! ledger; everyone else goes through the access service.

use crate::models::AccountAddress;

/// Trait for records that have an owner.
pub trait OwnedResource {
    /// Normalized address of the owner.
    fn owner_address(&self) -> &str;
}

/// Trait for enforcing ownership on stored records.
pub trait OwnershipEnforcer {
    /// Whether `requester` owns this record.
    fn is_owned_by(&self, requester: &AccountAddress) -> bool;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn is_owned_by(&self, requester: &AccountAddress) -> bool {
        self.owner_address() == requester.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestResource {
        owner: String,
    }

    impl OwnedResource for TestResource {
        fn owner_address(&self) -> &str {
            &self.owner
        }
    }

    fn addr(raw: &str) -> AccountAddress {
        AccountAddress::parse(raw).unwrap()
    }

    #[test]
    fn owner_is_matched_after_normalization() {
        let resource = TestResource {
            owner: "0xaaa".to_string(),
        };
        assert!(resource.is_owned_by(&addr("0xAAA")));
        assert!(resource.is_owned_by(&addr("0xaaa")));
    }

    #[test]
    fn other_accounts_do_not_own() {
        let resource = TestResource {
            owner: "0xaaa".to_string(),
        };
        assert!(!resource.is_owned_by(&addr("0xbbb")));
    }
}

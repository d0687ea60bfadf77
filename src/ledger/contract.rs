// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-chain ledger backed by the patient data sharing contract.

use std::str::FromStr;

use alloy::{
    network::Ethereum,
    primitives::{Address, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::{Filter, Log},
    sol,
    sol_types::SolEvent,
};
use tokio::sync::OnceCell;

use crate::models::AccountAddress;
use crate::storage::DataCategory;

use super::oracle::{
    LedgerEvent, LedgerEventKind, LedgerOracle, OracleError, OracleResult, RegisteredOwner,
};

sol! {
    #[sol(rpc)]
    interface IPatientDataSharing {
        event PatientRegistered(address indexed patient, string name, uint256 age);
        event DataAdded(address indexed patient, string cid, uint8 dataType, string description);
        event AccessGranted(address indexed patient, address indexed grantedTo);
        event AccessRevoked(address indexed patient, address indexed revokedFrom);

        function doctor() external view returns (address);
        function isAccessGranted(address patient, address accessor) external view returns (bool);
        function getDataCount(address patient) external view returns (uint256);
    }
}

/// HTTP provider type (with the default fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Default block chunk size per `eth_getLogs` query.
const LOG_CHUNK_SIZE: u64 = 2000;

/// Ledger oracle reading the deployed contract over JSON-RPC.
pub struct ContractOracle {
    contract: IPatientDataSharing::IPatientDataSharingInstance<HttpProvider>,
    address: Address,
    /// First block the contract can have emitted events in.
    start_block: u64,
    registrar: OnceCell<AccountAddress>,
}

impl ContractOracle {
    pub fn new(rpc_url: &str, contract_address: &str, start_block: u64) -> OracleResult<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| OracleError::Config(format!("RPC URL: {e}")))?;
        let address = Address::from_str(contract_address)
            .map_err(|e| OracleError::Config(format!("contract address: {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url);
        let contract = IPatientDataSharing::new(address, provider);

        Ok(Self {
            contract,
            address,
            start_block,
            registrar: OnceCell::new(),
        })
    }

    fn provider(&self) -> &HttpProvider {
        self.contract.provider()
    }

    async fn logs(&self, from_block: u64, to_block: u64) -> OracleResult<Vec<Log>> {
        let filter = Filter::new()
            .address(self.address)
            .from_block(from_block)
            .to_block(to_block);

        self.provider()
            .get_logs(&filter)
            .await
            .map_err(|e| OracleError::Rpc(e.to_string()))
    }
}

fn to_account(address: Address) -> OracleResult<AccountAddress> {
    AccountAddress::parse(&format!("{address:#x}"))
        .map_err(|e| OracleError::Contract(format!("ledger address: {e}")))
}

fn to_evm(account: &AccountAddress) -> OracleResult<Address> {
    Address::from_str(account.as_str())
        .map_err(|e| OracleError::InvalidAddress(format!("'{account}' is not an EVM address: {e}")))
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn decode<E: SolEvent>(log: &Log) -> OracleResult<E> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|e| OracleError::Contract(format!("undecodable log: {e}")))
}

/// Map a raw log to a ledger event. Logs of other events are skipped.
fn to_event(log: &Log) -> OracleResult<Option<LedgerEvent>> {
    let Some(topic) = log.topic0() else {
        return Ok(None);
    };

    let kind = if *topic == IPatientDataSharing::PatientRegistered::SIGNATURE_HASH {
        let event = decode::<IPatientDataSharing::PatientRegistered>(log)?;
        LedgerEventKind::OwnerRegistered {
            owner: to_account(event.patient)?,
            name: event.name,
            age: saturating_u64(event.age),
        }
    } else if *topic == IPatientDataSharing::DataAdded::SIGNATURE_HASH {
        let event = decode::<IPatientDataSharing::DataAdded>(log)?;
        LedgerEventKind::ObjectAdded {
            owner: to_account(event.patient)?,
            content_id: event.cid,
            category: DataCategory::from_code(event.dataType),
            description: event.description,
        }
    } else if *topic == IPatientDataSharing::AccessGranted::SIGNATURE_HASH {
        let event = decode::<IPatientDataSharing::AccessGranted>(log)?;
        LedgerEventKind::AccessGranted {
            owner: to_account(event.patient)?,
            grantee: to_account(event.grantedTo)?,
        }
    } else if *topic == IPatientDataSharing::AccessRevoked::SIGNATURE_HASH {
        let event = decode::<IPatientDataSharing::AccessRevoked>(log)?;
        LedgerEventKind::AccessRevoked {
            owner: to_account(event.patient)?,
            grantee: to_account(event.revokedFrom)?,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(LedgerEvent {
        block_number: log.block_number.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        kind,
    }))
}

impl LedgerOracle for ContractOracle {
    async fn is_authorized(
        &self,
        owner: &AccountAddress,
        accessor: &AccountAddress,
    ) -> OracleResult<bool> {
        if owner == accessor {
            return Ok(true);
        }
        let (owner_evm, accessor_evm) = (to_evm(owner)?, to_evm(accessor)?);
        if *accessor == self.registrar().await? {
            return Ok(true);
        }

        self.contract
            .isAccessGranted(owner_evm, accessor_evm)
            .call()
            .await
            .map_err(|e| OracleError::Contract(e.to_string()))
    }

    async fn registered_owners(&self) -> OracleResult<Vec<RegisteredOwner>> {
        let head = self.head().await?;
        let mut addresses: Vec<AccountAddress> = Vec::new();
        for event in self.events(self.start_block, head).await? {
            if let LedgerEventKind::OwnerRegistered { owner, .. } = event.kind {
                if !addresses.contains(&owner) {
                    addresses.push(owner);
                }
            }
        }

        let mut owners = Vec::with_capacity(addresses.len());
        for address in addresses {
            let count = self
                .contract
                .getDataCount(to_evm(&address)?)
                .call()
                .await
                .map_err(|e| OracleError::Contract(e.to_string()))?;
            owners.push(RegisteredOwner {
                address,
                record_count: saturating_u64(count),
            });
        }
        Ok(owners)
    }

    async fn registrar(&self) -> OracleResult<AccountAddress> {
        self.registrar
            .get_or_try_init(|| async {
                let doctor = self
                    .contract
                    .doctor()
                    .call()
                    .await
                    .map_err(|e| OracleError::Contract(e.to_string()))?;
                to_account(doctor)
            })
            .await
            .cloned()
    }

    async fn head(&self) -> OracleResult<u64> {
        self.provider()
            .get_block_number()
            .await
            .map_err(|e| OracleError::Rpc(e.to_string()))
    }

    async fn events(&self, from_block: u64, to_block: u64) -> OracleResult<Vec<LedgerEvent>> {
        let mut events = Vec::new();
        let mut from = from_block.max(self.start_block);
        while from <= to_block {
            let to = from.saturating_add(LOG_CHUNK_SIZE - 1).min(to_block);
            for log in self.logs(from, to).await? {
                match to_event(&log) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, block = ?log.block_number, "Skipping ledger log")
                    }
                }
            }
            from = to + 1;
        }
        events.sort_by_key(LedgerEvent::position);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_signatures_match_contract_abi() {
        assert_eq!(
            IPatientDataSharing::AccessGranted::SIGNATURE,
            "AccessGranted(address,address)"
        );
        assert_eq!(
            IPatientDataSharing::DataAdded::SIGNATURE,
            "DataAdded(address,string,uint8,string)"
        );
        assert_eq!(
            IPatientDataSharing::PatientRegistered::SIGNATURE,
            "PatientRegistered(address,string,uint256)"
        );
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            ContractOracle::new("not a url", "0x0000000000000000000000000000000000000001", 0),
            Err(OracleError::Config(_))
        ));
        assert!(matches!(
            ContractOracle::new("http://127.0.0.1:8545", "0xnope", 0),
            Err(OracleError::Config(_))
        ));
    }

    #[test]
    fn accounts_round_trip_through_evm_addresses() {
        let evm = Address::from_str("0x52908400098527886E0F7030069857D2E4169EE7").unwrap();
        let account = to_account(evm).unwrap();
        assert_eq!(account.as_str(), "0x52908400098527886e0f7030069857d2e4169ee7");
        assert_eq!(to_evm(&account).unwrap(), evm);
    }

    #[test]
    fn non_evm_accounts_are_rejected() {
        let account = AccountAddress::parse("alice").unwrap();
        assert!(matches!(
            to_evm(&account),
            Err(OracleError::InvalidAddress(_))
        ));
    }

    #[test]
    fn large_values_saturate() {
        assert_eq!(saturating_u64(U256::from(42u64)), 42);
        assert_eq!(saturating_u64(U256::MAX), u64::MAX);
    }
}

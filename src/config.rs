// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, their defaults, and [`Config::from_env`],
//! which reads them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for blobs, index, and audit logs | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `LEDGER_MODE` | `contract` or `memory` | `memory` |
//! | `LEDGER_RPC_URL` | JSON-RPC endpoint of the ledger chain | Required for `contract` |
//! | `LEDGER_CONTRACT_ADDRESS` | Deployed access-control contract | Required for `contract` |
//! | `LEDGER_START_BLOCK` | First block the reconciler reads | `0` |
//! | `LEDGER_REGISTRAR` | Registrar account of the in-memory ledger | `0xf39f…2266` |
//! | `ORACLE_TIMEOUT_MS` | Bound on a single ledger query | `5000` |
//! | `RECONCILE_INTERVAL_SECS` | Reconciler poll interval | `15` |
//! | `GC_MAX_AGE_DAYS` | Default age threshold of `/v1/admin/gc` | `30` |
//!
//! Numbers that fail to parse fall back to the default with a warning.
//!
//! The default registrar is the first development account of Anvil and
//! Hardhat. Its private key is public, so a local client can sign as the
//! registrar out of the box; any shared deployment must override it.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::AccountAddress;
use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const LEDGER_MODE_ENV: &str = "LEDGER_MODE";
pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
pub const LEDGER_CONTRACT_ADDRESS_ENV: &str = "LEDGER_CONTRACT_ADDRESS";
pub const LEDGER_START_BLOCK_ENV: &str = "LEDGER_START_BLOCK";
pub const LEDGER_REGISTRAR_ENV: &str = "LEDGER_REGISTRAR";
pub const ORACLE_TIMEOUT_MS_ENV: &str = "ORACLE_TIMEOUT_MS";
pub const RECONCILE_INTERVAL_SECS_ENV: &str = "RECONCILE_INTERVAL_SECS";
pub const GC_MAX_AGE_DAYS_ENV: &str = "GC_MAX_AGE_DAYS";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_GC_MAX_AGE_DAYS: u64 = 30;
pub const DEFAULT_REGISTRAR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerConfig {
    Contract {
        rpc_url: String,
        contract_address: String,
    },
    Memory {
        registrar: AccountAddress,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set when LEDGER_MODE=contract")]
    Missing(&'static str),

    #[error("unknown LEDGER_MODE '{0}' (expected 'contract' or 'memory')")]
    UnknownLedgerMode(String),

    #[error("invalid {LEDGER_REGISTRAR_ENV}: {0}")]
    InvalidRegistrar(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub ledger: LedgerConfig,
    pub ledger_start_block: u64,
    pub oracle_timeout: Duration,
    pub reconcile_interval: Duration,
    pub gc_max_age: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let ledger = match get(LEDGER_MODE_ENV).as_deref().unwrap_or("memory") {
            "contract" => LedgerConfig::Contract {
                rpc_url: get(LEDGER_RPC_URL_ENV).ok_or(ConfigError::Missing(LEDGER_RPC_URL_ENV))?,
                contract_address: get(LEDGER_CONTRACT_ADDRESS_ENV)
                    .ok_or(ConfigError::Missing(LEDGER_CONTRACT_ADDRESS_ENV))?,
            },
            "memory" => {
                let raw =
                    get(LEDGER_REGISTRAR_ENV).unwrap_or_else(|| DEFAULT_REGISTRAR.to_string());
                LedgerConfig::Memory {
                    registrar: AccountAddress::parse(&raw)
                        .map_err(|e| ConfigError::InvalidRegistrar(e.to_string()))?,
                }
            }
            other => return Err(ConfigError::UnknownLedgerMode(other.to_string())),
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, PORT_ENV, DEFAULT_PORT),
            log_format,
            ledger,
            ledger_start_block: parse_or(&get, LEDGER_START_BLOCK_ENV, 0),
            oracle_timeout: Duration::from_millis(parse_or(
                &get,
                ORACLE_TIMEOUT_MS_ENV,
                DEFAULT_ORACLE_TIMEOUT_MS,
            )),
            reconcile_interval: Duration::from_secs(parse_or(
                &get,
                RECONCILE_INTERVAL_SECS_ENV,
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )),
            gc_max_age: Duration::from_secs(
                parse_or(&get, GC_MAX_AGE_DAYS_ENV, DEFAULT_GC_MAX_AGE_DAYS) * 24 * 60 * 60,
            ),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match get(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                variable = name,
                value = %raw,
                default = %default,
                "Invalid number, using default"
            );
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.oracle_timeout, Duration::from_millis(5000));
        assert_eq!(config.reconcile_interval, Duration::from_secs(15));
        assert_eq!(config.gc_max_age, Duration::from_secs(30 * 86_400));
        assert!(matches!(config.ledger, LedgerConfig::Memory { .. }));
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = config(&[("PORT", "eighty"), ("ORACLE_TIMEOUT_MS", "-1")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.oracle_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn contract_mode_requires_endpoint() {
        assert!(matches!(
            config(&[("LEDGER_MODE", "contract")]),
            Err(ConfigError::Missing(LEDGER_RPC_URL_ENV))
        ));

        let config = config(&[
            ("LEDGER_MODE", "contract"),
            ("LEDGER_RPC_URL", "http://127.0.0.1:8545"),
            ("LEDGER_CONTRACT_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(matches!(config.ledger, LedgerConfig::Contract { .. }));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(matches!(
            config(&[("LEDGER_MODE", "ipfs")]),
            Err(ConfigError::UnknownLedgerMode(_))
        ));
    }

    #[test]
    fn default_registrar_has_a_known_dev_key() {
        use alloy::signers::local::PrivateKeySigner;

        let dev_key: PrivateKeySigner =
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        let dev_account = AccountAddress::parse(&format!("{:#x}", dev_key.address())).unwrap();

        let config = config(&[]).unwrap();
        assert_eq!(
            config.ledger,
            LedgerConfig::Memory {
                registrar: dev_account
            }
        );
    }

    #[test]
    fn memory_registrar_is_normalized() {
        let config = config(&[("LEDGER_REGISTRAR", " 0xDOC ")]).unwrap();
        assert_eq!(
            config.ledger,
            LedgerConfig::Memory {
                registrar: AccountAddress::parse("0xdoc").unwrap()
            }
        );
    }
}

// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Service configuration.
//!
//! ## Format (TOML)
//!
//! ```text
//! [node]
//! name = "omnisupply-1"
//! data_dir = "./data"
//! log_format = "json"             # or "compact"
//!
//! [http]
//! listen_addr = "127.0.0.1:9100"
//!
//! [oracle]
//! address = "0x...40 hex"          # identity presented to bridges when pausing
//! admin = "0x...40 hex"
//! signers = ["<64 hex ed25519 public key>", "..."]
//! operators = ["0x..."]
//! emergency = ["0x..."]
//! required_signatures = 2
//! expected_supply = "1000000000000000000000000000"   # base units, decimal string
//! tolerance = "1000000000000000000"
//! reconciliation_interval_secs = 3600
//! nonce_validity_secs = 3600
//! max_future_nonce_secs = 300
//! mismatch_policy = "signal"       # or "pause_bridges"
//! ```
//!
//! Amounts are decimal strings because TOML integers stop at 64 bits.

use crate::core::{
    oracle::supply_oracle::{
        MismatchPolicy, OracleConfig, OracleError, DEFAULT_MAX_FUTURE_NONCE_SECS,
        DEFAULT_NONCE_VALIDITY_SECS,
    },
    types::{Address, Amount},
};
use serde::Deserialize;
use std::{fs, net::SocketAddr, path::Path, str::FromStr};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "OMNISUPPLY_CONFIG";
/// Config path used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/omnisupply.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the file.
    #[error("read config {0}")]
    Read(String),
    /// Not valid TOML or wrong schema.
    #[error("parse config: {0}")]
    Parse(String),
    /// Address field is not 20 hex bytes.
    #[error("invalid address in {field}")]
    BadAddress {
        /// Offending field.
        field: &'static str,
    },
    /// Signer key is not 32 hex bytes.
    #[error("invalid signer public key at index {0}")]
    BadPubkey(usize),
    /// Amount is not a base-10 u128.
    #[error("invalid amount in {field}")]
    BadAmount {
        /// Offending field.
        field: &'static str,
    },
    /// Inconsistent settings.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
    /// Oracle parameters rejected.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single line.
    Compact,
}

/// `[node]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeSection {
    /// Instance name, attached to logs.
    #[serde(default = "default_node_name")]
    pub name: String,
    /// Directory holding the signer key and audit log.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            data_dir: default_data_dir(),
            log_format: LogFormat::default(),
        }
    }
}

/// `[http]` section.
#[derive(Clone, Debug, Deserialize)]
pub struct HttpSection {
    /// Bind address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

/// `[oracle]` section, as written in the file.
#[derive(Clone, Debug, Deserialize)]
pub struct OracleSection {
    /// Oracle identity (hex).
    pub address: String,
    /// Admin (hex).
    pub admin: String,
    /// Signer public keys (hex).
    #[serde(default)]
    pub signers: Vec<String>,
    /// Operator addresses (hex).
    #[serde(default)]
    pub operators: Vec<String>,
    /// Emergency addresses (hex).
    #[serde(default)]
    pub emergency: Vec<String>,
    /// Quorum threshold.
    pub required_signatures: usize,
    /// Expected supply (decimal string).
    pub expected_supply: String,
    /// Tolerance (decimal string).
    #[serde(default = "zero_amount")]
    pub tolerance: String,
    /// Reconciliation cadence.
    #[serde(default = "default_interval")]
    pub reconciliation_interval_secs: u64,
    /// Nonce freshness window.
    #[serde(default = "default_nonce_validity")]
    pub nonce_validity_secs: u64,
    /// Clock-skew allowance.
    #[serde(default = "default_max_future")]
    pub max_future_nonce_secs: u64,
    /// Mismatch response.
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
}

/// Whole file.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSection,
    /// HTTP settings.
    #[serde(default)]
    pub http: HttpSection,
    /// Oracle settings.
    pub oracle: OracleSection,
}

fn default_node_name() -> String {
    "omnisupply".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_listen_addr() -> String {
    "127.0.0.1:9100".to_string()
}
fn zero_amount() -> String {
    "0".to_string()
}
fn default_interval() -> u64 {
    3_600
}
fn default_nonce_validity() -> u64 {
    DEFAULT_NONCE_VALIDITY_SECS
}
fn default_max_future() -> u64 {
    DEFAULT_MAX_FUTURE_NONCE_SECS
}

fn parse_address(raw: &str, field: &'static str) -> Result<Address, ConfigError> {
    let a = Address::from_str(raw.trim()).map_err(|_| ConfigError::BadAddress { field })?;
    if a.is_zero() {
        return Err(ConfigError::BadAddress { field });
    }
    Ok(a)
}

fn parse_amount(raw: &str, field: &'static str) -> Result<Amount, ConfigError> {
    Amount::from_str(raw.trim().replace('_', "").as_str())
        .map_err(|_| ConfigError::BadAmount { field })
}

/// Decode a 32-byte hex string (optional `0x`).
pub fn parse_hex_32(raw: &str) -> Option<[u8; 32]> {
    let s = raw.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
    bytes.try_into().ok()
}

impl ServiceConfig {
    /// Oracle identity.
    pub fn oracle_address(&self) -> Result<Address, ConfigError> {
        parse_address(&self.oracle.address, "oracle.address")
    }

    /// Admin address.
    pub fn admin(&self) -> Result<Address, ConfigError> {
        parse_address(&self.oracle.admin, "oracle.admin")
    }

    /// Signer public keys.
    pub fn signer_keys(&self) -> Result<Vec<[u8; 32]>, ConfigError> {
        self.oracle
            .signers
            .iter()
            .enumerate()
            .map(|(i, s)| parse_hex_32(s).ok_or(ConfigError::BadPubkey(i)))
            .collect()
    }

    /// Operator addresses.
    pub fn operators(&self) -> Result<Vec<Address>, ConfigError> {
        self.oracle.operators.iter().map(|s| parse_address(s, "oracle.operators")).collect()
    }

    /// Emergency addresses.
    pub fn emergency(&self) -> Result<Vec<Address>, ConfigError> {
        self.oracle.emergency.iter().map(|s| parse_address(s, "oracle.emergency")).collect()
    }

    /// Typed oracle parameters.
    pub fn oracle_config(&self) -> Result<OracleConfig, ConfigError> {
        let o = &self.oracle;
        let cfg = OracleConfig {
            required_signatures: o.required_signatures,
            expected_supply: parse_amount(&o.expected_supply, "oracle.expected_supply")?,
            tolerance: parse_amount(&o.tolerance, "oracle.tolerance")?,
            reconciliation_interval_secs: o.reconciliation_interval_secs,
            nonce_validity_secs: o.nonce_validity_secs,
            max_future_nonce_secs: o.max_future_nonce_secs,
            mismatch_policy: o.mismatch_policy,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// HTTP bind address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::Invalid("http.listen_addr is not a socket address"))
    }

    /// Check every field parses and the quorum is reachable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oracle_address()?;
        self.admin()?;
        self.operators()?;
        self.emergency()?;
        self.listen_addr()?;
        let cfg = self.oracle_config()?;
        let keys = self.signer_keys()?;
        let mut distinct = keys.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() != keys.len() {
            return Err(ConfigError::Invalid("duplicate signer key"));
        }
        if cfg.required_signatures > keys.len() {
            return Err(ConfigError::Invalid("required_signatures exceeds configured signers"));
        }
        Ok(())
    }
}

/// Parse and validate a config document.
pub fn parse_config(raw: &str) -> Result<ServiceConfig, ConfigError> {
    let cfg: ServiceConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Read, parse and validate `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|_| ConfigError::Read(path.display().to_string()))?;
    parse_config(&raw)
}

/// Path from [`CONFIG_ENV`], else [`DEFAULT_CONFIG_PATH`].
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(required: usize) -> String {
        format!(
            r#"
[node]
name = "t"
log_format = "compact"

[oracle]
address = "0x000000000000000000000000000000000000000a"
admin = "0x0000000000000000000000000000000000000001"
signers = ["{k1}", "{k2}"]
operators = ["0x0000000000000000000000000000000000000002"]
required_signatures = {required}
expected_supply = "1_000_000_000000000000000000"
tolerance = "5"
mismatch_policy = "pause_bridges"
"#,
            k1 = "11".repeat(32),
            k2 = "22".repeat(32),
        )
    }

    #[test]
    fn parses_full_document() {
        let cfg = parse_config(&sample(2)).unwrap();
        assert_eq!(cfg.node.log_format, LogFormat::Compact);
        assert_eq!(cfg.http.listen_addr, "127.0.0.1:9100");
        let oc = cfg.oracle_config().unwrap();
        assert_eq!(oc.expected_supply, 1_000_000_000_000_000_000_000_000);
        assert_eq!(oc.tolerance, 5);
        assert_eq!(oc.mismatch_policy, MismatchPolicy::PauseBridges);
        assert_eq!(oc.nonce_validity_secs, DEFAULT_NONCE_VALIDITY_SECS);
        assert_eq!(cfg.signer_keys().unwrap()[1], [0x22u8; 32]);
        assert_eq!(cfg.operators().unwrap(), vec![Address::from_low_u64(2)]);
    }

    #[test]
    fn unreachable_quorum_rejected() {
        assert!(matches!(parse_config(&sample(3)), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            parse_config(&sample(0)),
            Err(ConfigError::Oracle(OracleError::InvalidThreshold))
        ));
    }

    #[test]
    fn bad_fields_rejected() {
        let bad_addr = sample(2).replace("0x000000000000000000000000000000000000000a", "0x1234");
        assert!(matches!(
            parse_config(&bad_addr),
            Err(ConfigError::BadAddress { field: "oracle.address" })
        ));
        let bad_amount = sample(2).replace("tolerance = \"5\"", "tolerance = \"-5\"");
        assert!(matches!(parse_config(&bad_amount), Err(ConfigError::BadAmount { .. })));
        assert!(matches!(parse_config("not toml ["), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omnisupply.toml");
        std::fs::write(&path, sample(1)).unwrap();
        assert!(load_config(&path).is_ok());
        assert!(matches!(load_config(dir.path().join("missing.toml")), Err(ConfigError::Read(_))));
    }
}

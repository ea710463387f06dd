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

//! Wire protocol profiles: fee model, latency, and trust model per protocol.
//!
//! | Protocol  | Fee                                  | Latency | Trust             |
//! |-----------|--------------------------------------|---------|-------------------|
//! | LayerZero | flat per destination                 | 180 s   | DVN quorum        |
//! | Celer     | bps of amount, clamped to [min, max] | 900 s   | message bus       |
//! | Hyperlane | gas limit x destination gas price    | 300 s   | validator set ISM |

use crate::core::types::{Amount, ChainId, ProtocolId, SecurityLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const NATIVE: Amount = 1_000_000_000_000_000_000;

/// Basis points denominator.
pub const BPS_DENOMINATOR: Amount = 10_000;
/// Smallest destination gas limit a caller may request.
pub const MIN_GAS_LIMIT: u64 = 50_000;
/// Largest destination gas limit a caller may request.
pub const MAX_GAS_LIMIT: u64 = 2_000_000;

/// Who vouches for a delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustModel {
    /// Independent decentralized verifier networks, all required.
    DvnQuorum,
    /// Single message-bus attestation.
    MessageBus,
    /// Threshold of a validator set (interchain security module).
    ValidatorSet,
}

/// Caller-supplied options forwarded to the protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    /// Destination execution gas; protocols that meter gas use their default when absent.
    pub gas_limit: Option<u64>,
}

/// Static facts about a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProtocolInfo {
    /// Protocol id.
    pub protocol: ProtocolId,
    /// Typical end-to-end delivery time.
    pub delivery_secs: u64,
    /// Coarse security tag.
    pub security_level: SecurityLevel,
    /// Trust model.
    pub trust_model: TrustModel,
}

/// Fee quote for one transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    /// Native fee required.
    pub fee: Amount,
    /// Protocol facts.
    pub info: ProtocolInfo,
}

/// Fee model errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    /// Gas limit outside [`MIN_GAS_LIMIT`, `MAX_GAS_LIMIT`].
    #[error("gas limit {0} out of range")]
    GasLimit(u64),
    /// Profile parameters are inconsistent.
    #[error("invalid fee parameters: {0}")]
    InvalidParams(&'static str),
}

/// A burn-and-mint wire protocol.
pub trait WireProtocol: Send + Sync + 'static {
    /// Protocol id.
    const ID: ProtocolId;
    /// Typical delivery latency.
    const DELIVERY_SECS: u64;
    /// Security tag.
    const SECURITY: SecurityLevel;
    /// Trust model.
    const TRUST: TrustModel;

    /// Native fee for sending `amount` to `destination`.
    fn quote(
        &self,
        destination: ChainId,
        amount: Amount,
        params: &BridgeParams,
    ) -> Result<Amount, QuoteError>;

    /// Reject inconsistent parameters.
    fn validate(&self) -> Result<(), QuoteError> {
        Ok(())
    }

    /// Static facts.
    fn info() -> ProtocolInfo {
        ProtocolInfo {
            protocol: Self::ID,
            delivery_secs: Self::DELIVERY_SECS,
            security_level: Self::SECURITY,
            trust_model: Self::TRUST,
        }
    }
}

/// LayerZero-style OFT: flat native fee per destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerZero {
    /// Fee when no per-chain override exists.
    pub default_fee: Amount,
    /// Per-destination overrides.
    pub per_chain_fee: BTreeMap<ChainId, Amount>,
}

impl Default for LayerZero {
    fn default() -> Self {
        Self { default_fee: NATIVE / 100, per_chain_fee: BTreeMap::new() }
    }
}

impl WireProtocol for LayerZero {
    const ID: ProtocolId = ProtocolId::LayerZero;
    const DELIVERY_SECS: u64 = 180;
    const SECURITY: SecurityLevel = SecurityLevel::Maximum;
    const TRUST: TrustModel = TrustModel::DvnQuorum;

    fn quote(
        &self,
        destination: ChainId,
        _amount: Amount,
        _params: &BridgeParams,
    ) -> Result<Amount, QuoteError> {
        Ok(self.per_chain_fee.get(&destination).copied().unwrap_or(self.default_fee))
    }
}

/// Celer IM: percentage of the amount, clamped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Celer {
    /// Fee rate in basis points.
    pub fee_bps: u32,
    /// Lower clamp.
    pub min_fee: Amount,
    /// Upper clamp.
    pub max_fee: Amount,
}

impl Default for Celer {
    fn default() -> Self {
        Self { fee_bps: 50, min_fee: NATIVE / 1_000, max_fee: NATIVE / 10 }
    }
}

impl WireProtocol for Celer {
    const ID: ProtocolId = ProtocolId::Celer;
    const DELIVERY_SECS: u64 = 900;
    const SECURITY: SecurityLevel = SecurityLevel::Standard;
    const TRUST: TrustModel = TrustModel::MessageBus;

    fn quote(
        &self,
        _destination: ChainId,
        amount: Amount,
        _params: &BridgeParams,
    ) -> Result<Amount, QuoteError> {
        self.validate()?;
        let raw = amount.saturating_mul(Amount::from(self.fee_bps)) / BPS_DENOMINATOR;
        Ok(raw.clamp(self.min_fee, self.max_fee))
    }

    fn validate(&self) -> Result<(), QuoteError> {
        if Amount::from(self.fee_bps) > BPS_DENOMINATOR {
            return Err(QuoteError::InvalidParams("fee_bps above 100%"));
        }
        if self.min_fee > self.max_fee {
            return Err(QuoteError::InvalidParams("min_fee above max_fee"));
        }
        Ok(())
    }
}

/// Hyperlane mailbox: interchain gas payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlane {
    /// Gas limit used when the caller does not specify one.
    pub default_gas_limit: u64,
    /// Gas price when no per-chain price exists.
    pub default_gas_price: Amount,
    /// Per-destination gas prices.
    pub gas_price: BTreeMap<ChainId, Amount>,
}

impl Default for Hyperlane {
    fn default() -> Self {
        Self {
            default_gas_limit: 200_000,
            default_gas_price: 5_000_000_000,
            gas_price: BTreeMap::new(),
        }
    }
}

impl WireProtocol for Hyperlane {
    const ID: ProtocolId = ProtocolId::Hyperlane;
    const DELIVERY_SECS: u64 = 300;
    const SECURITY: SecurityLevel = SecurityLevel::High;
    const TRUST: TrustModel = TrustModel::ValidatorSet;

    fn quote(
        &self,
        destination: ChainId,
        _amount: Amount,
        params: &BridgeParams,
    ) -> Result<Amount, QuoteError> {
        let gas = params.gas_limit.unwrap_or(self.default_gas_limit);
        if !(MIN_GAS_LIMIT..=MAX_GAS_LIMIT).contains(&gas) {
            return Err(QuoteError::GasLimit(gas));
        }
        let price = self.gas_price.get(&destination).copied().unwrap_or(self.default_gas_price);
        Ok(Amount::from(gas).saturating_mul(price))
    }

    fn validate(&self) -> Result<(), QuoteError> {
        if !(MIN_GAS_LIMIT..=MAX_GAS_LIMIT).contains(&self.default_gas_limit) {
            return Err(QuoteError::GasLimit(self.default_gas_limit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layerzero_flat_with_override() {
        let mut lz = LayerZero::default();
        lz.per_chain_fee.insert(8453, 42);
        let p = BridgeParams::default();
        assert_eq!(lz.quote(56, 1, &p).unwrap(), NATIVE / 100);
        assert_eq!(lz.quote(56, 1_000_000 * NATIVE, &p).unwrap(), NATIVE / 100);
        assert_eq!(lz.quote(8453, 1, &p).unwrap(), 42);
    }

    #[test]
    fn celer_percentage_is_clamped() {
        let c = Celer { fee_bps: 100, min_fee: 10, max_fee: 1_000 };
        let p = BridgeParams::default();
        assert_eq!(c.quote(1, 100, &p).unwrap(), 10);
        assert_eq!(c.quote(1, 50_000, &p).unwrap(), 500);
        assert_eq!(c.quote(1, 10_000_000, &p).unwrap(), 1_000);
        // zero supply edge: min clamp still applies
        assert_eq!(c.quote(1, 0, &p).unwrap(), 10);

        let bad = Celer { fee_bps: 100, min_fee: 2_000, max_fee: 1_000 };
        assert!(bad.quote(1, 1, &p).is_err());
    }

    #[test]
    fn hyperlane_gas_payment() {
        let mut h = Hyperlane::default();
        h.gas_price.insert(10, 3);
        assert_eq!(h.quote(10, 0, &BridgeParams { gas_limit: Some(100_000) }).unwrap(), 300_000);
        assert_eq!(
            h.quote(10, 0, &BridgeParams { gas_limit: Some(1) }),
            Err(QuoteError::GasLimit(1))
        );
        assert_eq!(h.quote(99, 0, &BridgeParams::default()).unwrap(), 200_000 * 5_000_000_000);
    }

    #[test]
    fn latencies_differ() {
        assert_ne!(LayerZero::info().delivery_secs, Celer::info().delivery_secs);
        assert_ne!(Celer::info().delivery_secs, Hyperlane::info().delivery_secs);
        assert_eq!(Hyperlane::info().trust_model, TrustModel::ValidatorSet);
    }
}

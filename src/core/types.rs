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
#![warn(missing_docs)]

//! Deterministic core types and canonical encoding helpers.

use bincode::Options;
use ring::digest;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

/// Chain identifier (EVM-style numeric id, e.g. 56 for BSC, 97 for BSC testnet).
pub type ChainId = u64;

/// Token amount in base units.
pub type Amount = u128;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
    #[error("invalid address length: expected 20 bytes, got {0}")]
    AddressLength(usize),
    #[error("unsupported message version {0}")]
    Version(u8),
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with the canonical options. Maps must be ordered (`BTreeMap`/`BTreeSet`)
/// for the bytes to be stable.
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // `with_limit` is in bytes; keep it aligned to the external `max`.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// 256-bit hash type (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct H256([u8; 32]);

impl H256 {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
    /// SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let d = digest::digest(&digest::SHA256, data);
        let mut out = [0u8; 32];
        out.copy_from_slice(d.as_ref());
        Self(out)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Ed25519 signature bytes (expected 64).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// 20-byte account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address. Never a valid recipient, bridge or withdrawal target.
    pub const ZERO: Address = Address([0u8; 20]);

    /// True for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convenience constructor used by tests and fixtures: `0x00..00NN`.
    pub fn from_low_u64(v: u64) -> Self {
        let mut b = [0u8; 20];
        b[12..].copy_from_slice(&v.to_be_bytes());
        Self(b)
    }

    /// Strict decode: exactly 20 bytes, no padding accepted.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != 20 {
            return Err(CodecError::AddressLength(bytes.len()));
        }
        let mut b = [0u8; 20];
        b.copy_from_slice(bytes);
        Ok(Self(b))
    }

    /// Address of an Ed25519 signer: the first 20 bytes of SHA-256(public key).
    pub fn from_public_key(pk: &[u8; 32]) -> Self {
        let h = H256::digest(pk);
        let mut b = [0u8; 20];
        b.copy_from_slice(&h.as_bytes()[..20]);
        Self(b)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| CodecError::Deserialize)?;
        Self::from_slice(&bytes)
    }
}

/// 32-byte remote sender identity as carried by the transports (bytes32 form).
///
/// EVM addresses are left-padded with zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteAddress(pub [u8; 32]);

impl RemoteAddress {
    /// Left-pad a 20-byte address.
    pub fn from_address(a: Address) -> Self {
        let mut b = [0u8; 32];
        b[12..].copy_from_slice(&a.0);
        Self(b)
    }

    /// True for the all-zero identity.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

/// Bridge wire protocol identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolId {
    /// LayerZero-style OFT messaging (DVN quorum).
    LayerZero,
    /// Celer IM message bus (SGN attestation).
    Celer,
    /// Hyperlane mailbox (validator-set ISM).
    Hyperlane,
}

impl ProtocolId {
    /// All protocols in canonical order.
    pub const ALL: [ProtocolId; 3] = [
        ProtocolId::LayerZero,
        ProtocolId::Celer,
        ProtocolId::Hyperlane,
    ];

    /// Stable one-byte tag used in transfer identifiers.
    pub fn tag(self) -> u8 {
        match self {
            ProtocolId::LayerZero => 0,
            ProtocolId::Celer => 1,
            ProtocolId::Hyperlane => 2,
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolId::LayerZero => "layerzero",
            ProtocolId::Celer => "celer",
            ProtocolId::Hyperlane => "hyperlane",
        };
        f.write_str(s)
    }
}

/// Coarse security tag reported by adapters so callers can compare protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Single attestation path.
    Standard,
    /// Threshold attestation by a validator set.
    High,
    /// Independent verifier quorum.
    Maximum,
}

/// Canonical map type alias.
pub type CanonicalMap<K, V> = BTreeMap<K, V>;

/// Failure classes shared by every component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller lacks the required role.
    Authorization,
    /// Malformed or unacceptable input.
    Validation,
    /// Replayed, stale or untrusted message.
    Replay,
    /// Rate limit exceeded; retry after the window slides.
    Capacity,
    /// A state invariant would be broken.
    InvariantViolation,
    /// Component is paused or in emergency mode.
    Halted,
    /// Collaborator or lock failure.
    Internal,
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    /// Failure class.
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_decode_is_strict() {
        assert!(Address::from_slice(&[1u8; 20]).is_ok());
        assert!(matches!(Address::from_slice(&[1u8; 19]), Err(CodecError::AddressLength(19))));
        assert!(matches!(Address::from_slice(&[1u8; 32]), Err(CodecError::AddressLength(32))));
    }

    #[test]
    fn address_hex_parse() {
        let a: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(a, Address::from_low_u64(0xff));
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn remote_address_pads_left() {
        let r = RemoteAddress::from_address(Address::from_low_u64(7));
        assert_eq!(r.0[31], 7);
        assert!(r.0[..12].iter().all(|b| *b == 0));
    }

    #[test]
    fn canonical_roundtrip_rejects_trailing() {
        let bytes = encode_canonical(&(1u64, 2u128)).unwrap();
        let back: (u64, u128) = decode_canonical_limited(&bytes, 64).unwrap();
        assert_eq!(back, (1, 2));
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(decode_canonical_limited::<(u64, u128)>(&longer, 64).is_err());
    }
}

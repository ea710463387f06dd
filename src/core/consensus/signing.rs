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

//! Domain-separated hashes and signing bytes for supply attestations.

use crate::core::{
    oracle::supply_oracle::SupplyReport,
    types::{encode_canonical, Amount, ChainId, H256},
};
use thiserror::Error;

const SUPPLY_DOMAIN: &[u8] = b"Omnisupply-Supply-v1";
const BATCH_DOMAIN: &[u8] = b"Omnisupply-Batch-v1";
const ATTEST_DOMAIN: &[u8] = b"Omnisupply-Attest-v1";

/// Signing error.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Canonical encoding failed.
    #[error("codec")]
    Codec,
}

/// Update hash for one chain: domain || chain_id || total || locked || nonce
///
/// Signers that agree on the same tuple produce the same hash, which is what
/// the quorum accumulates on.
pub fn supply_update_hash(
    chain_id: ChainId,
    total_supply: Amount,
    locked_supply: Amount,
    nonce: u64,
) -> H256 {
    let mut out = Vec::with_capacity(SUPPLY_DOMAIN.len() + 8 + 16 + 16 + 8);
    out.extend_from_slice(SUPPLY_DOMAIN);
    out.extend_from_slice(&chain_id.to_be_bytes());
    out.extend_from_slice(&total_supply.to_be_bytes());
    out.extend_from_slice(&locked_supply.to_be_bytes());
    out.extend_from_slice(&nonce.to_be_bytes());
    H256::digest(&out)
}

/// Update hash for a batch: domain || canonical(reports) || nonce
///
/// Order matters; signers must list chains identically.
pub fn batch_update_hash(reports: &[SupplyReport], nonce: u64) -> Result<H256, SigningError> {
    let body = encode_canonical(&reports).map_err(|_| SigningError::Codec)?;
    let mut out = Vec::with_capacity(BATCH_DOMAIN.len() + body.len() + 8);
    out.extend_from_slice(BATCH_DOMAIN);
    out.extend_from_slice(&body);
    out.extend_from_slice(&nonce.to_be_bytes());
    Ok(H256::digest(&out))
}

/// Bytes an oracle signer signs: domain || update_hash || signer_pubkey
pub fn attestation_signing_bytes(update_hash: &H256, signer_pubkey: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ATTEST_DOMAIN.len() + 32 + 32);
    out.extend_from_slice(ATTEST_DOMAIN);
    out.extend_from_slice(update_hash.as_bytes());
    out.extend_from_slice(signer_pubkey);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_binds_every_field() {
        let base = supply_update_hash(97, 500_000, 100_000, 1);
        assert_eq!(base, supply_update_hash(97, 500_000, 100_000, 1));
        assert_ne!(base, supply_update_hash(98, 500_000, 100_000, 1));
        assert_ne!(base, supply_update_hash(97, 500_001, 100_000, 1));
        assert_ne!(base, supply_update_hash(97, 500_000, 100_001, 1));
        assert_ne!(base, supply_update_hash(97, 500_000, 100_000, 2));
    }

    #[test]
    fn single_and_batch_are_separated() {
        let r = SupplyReport { chain_id: 97, total_supply: 500_000, locked_supply: 100_000 };
        let single = supply_update_hash(97, 500_000, 100_000, 1);
        let batch = batch_update_hash(&[r], 1).unwrap();
        assert_ne!(single, batch);
    }

    #[test]
    fn signing_bytes_bind_signer() {
        let h = supply_update_hash(1, 1, 0, 1);
        assert_ne!(
            attestation_signing_bytes(&h, &[1u8; 32]),
            attestation_signing_bytes(&h, &[2u8; 32])
        );
    }
}

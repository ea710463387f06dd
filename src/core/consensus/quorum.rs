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

//! M-of-N attestation accumulator keyed by update hash.
//!
//! Distinct signers only; a signer attesting the same hash twice is rejected
//! and does not count again. Entries carry an expiry and are dropped by
//! [`QuorumAccumulator::prune_expired`], so abandoned updates cannot pin memory.

use crate::core::types::{Address, H256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Quorum errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuorumError {
    /// Signer already attested this hash.
    #[error("duplicate attestation by {signer} for {hash}")]
    DuplicateAttestation {
        /// Signer.
        signer: Address,
        /// Update hash.
        hash: H256,
    },
}

/// Signers collected so far for one update hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingAttestation {
    /// Distinct signers.
    pub signers: BTreeSet<Address>,
    /// Unix seconds after which the entry is discarded.
    pub expires_at: u64,
}

/// Pending attestations by update hash.
#[derive(Clone, Debug, Default)]
pub struct QuorumAccumulator {
    pending: BTreeMap<H256, PendingAttestation>,
}

impl QuorumAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signer` for `hash`; returns the distinct signer count.
    pub fn attest(
        &mut self,
        hash: H256,
        signer: Address,
        expires_at: u64,
    ) -> Result<usize, QuorumError> {
        let entry = self.pending.entry(hash).or_insert_with(|| PendingAttestation {
            signers: BTreeSet::new(),
            expires_at,
        });
        if !entry.signers.insert(signer) {
            return Err(QuorumError::DuplicateAttestation { signer, hash });
        }
        Ok(entry.signers.len())
    }

    /// Drop the entry after commit.
    pub fn clear(&mut self, hash: &H256) -> Option<PendingAttestation> {
        self.pending.remove(hash)
    }

    /// Drop entries with `expires_at < now`; returns how many were removed.
    pub fn prune_expired(&mut self, now: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.expires_at >= now);
        before - self.pending.len()
    }

    /// Remove `signer` from every pending entry and drop entries left empty.
    /// Returns how many entries lost the signer.
    pub fn forget_signer(&mut self, signer: &Address) -> usize {
        let mut touched = 0;
        for p in self.pending.values_mut() {
            if p.signers.remove(signer) {
                touched += 1;
            }
        }
        self.pending.retain(|_, p| !p.signers.is_empty());
        touched
    }

    /// Pending hashes in ascending order.
    pub fn hashes(&self) -> Vec<H256> {
        self.pending.keys().copied().collect()
    }

    /// Pending entry for `hash`.
    pub fn get(&self, hash: &H256) -> Option<&PendingAttestation> {
        self.pending.get(hash)
    }

    /// Number of pending hashes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_distinct_signers() {
        let mut q = QuorumAccumulator::new();
        let h = H256::digest(b"u");
        assert_eq!(q.attest(h, Address::from_low_u64(1), 10).unwrap(), 1);
        assert_eq!(
            q.attest(h, Address::from_low_u64(1), 10),
            Err(QuorumError::DuplicateAttestation { signer: Address::from_low_u64(1), hash: h })
        );
        assert_eq!(q.attest(h, Address::from_low_u64(2), 10).unwrap(), 2);
        assert!(q.clear(&h).is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn prune_keeps_live_entries() {
        let mut q = QuorumAccumulator::new();
        q.attest(H256::digest(b"a"), Address::from_low_u64(1), 100).unwrap();
        q.attest(H256::digest(b"b"), Address::from_low_u64(1), 200).unwrap();
        assert_eq!(q.prune_expired(100), 0);
        assert_eq!(q.prune_expired(150), 1);
        assert!(q.get(&H256::digest(b"b")).is_some());
    }

    #[test]
    fn forgotten_signer_no_longer_counts() {
        let mut q = QuorumAccumulator::new();
        let (a, b) = (Address::from_low_u64(1), Address::from_low_u64(2));
        let (h1, h2) = (H256::digest(b"x"), H256::digest(b"y"));
        q.attest(h1, a, 10).unwrap();
        q.attest(h1, b, 10).unwrap();
        q.attest(h2, a, 10).unwrap();

        assert_eq!(q.forget_signer(&a), 2);
        assert_eq!(q.hashes(), vec![h1]);
        assert_eq!(q.get(&h1).map(|p| p.signers.len()), Some(1));
        assert_eq!(q.forget_signer(&a), 0);
    }
}

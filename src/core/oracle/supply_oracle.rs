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

//! Supply reconciliation oracle.
//!
//! Signers attest per-chain supply reports. An update commits once
//! `required_signatures` distinct signers attested the identical content hash
//! of `(chain_id, total, locked, nonce)`; the nonce is then burned for good.
//! After every commit and on every reconciliation the global view is
//! recomputed and compared against the expected supply.
//!
//! Nonces are unix-second timestamps. A nonce is stale once
//! `nonce + nonce_validity_secs < now` and rejected when it lies more than
//! `max_future_nonce_secs` ahead of the clock. Pending attestations expire
//! with their nonce and are pruned on the next write.

use crate::core::{
    access::{AccessControl, AccessError, Role},
    clock::Clock,
    consensus::{
        quorum::{PendingAttestation, QuorumAccumulator, QuorumError},
        signing::{attestation_signing_bytes, batch_update_hash, supply_update_hash, SigningError},
    },
    oracle::emergency::{pause_all, Pausable, PauseOutcome},
    security::keystore::{verify_pubkey_bytes, Keystore, KeystoreError, SignerBackend},
    types::{Address, Amount, ChainId, Classify, ErrorKind, Signature, H256},
};
use crate::monitoring::metrics::{tokens_gauge_value, Metrics};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest reconciliation interval an admin may configure.
pub const MIN_RECONCILIATION_INTERVAL_SECS: u64 = 300;
/// Default nonce freshness window.
pub const DEFAULT_NONCE_VALIDITY_SECS: u64 = 3_600;
/// Default clock-skew allowance for nonces ahead of local time.
pub const DEFAULT_MAX_FUTURE_NONCE_SECS: u64 = 300;
/// Largest batch accepted in one attestation.
pub const MAX_BATCH_SIZE: usize = 32;

const MAX_BUFFERED_EVENTS: usize = 1_024;

/// One chain's figures as attested by a signer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyReport {
    /// Chain id.
    pub chain_id: ChainId,
    /// Total supply on the chain.
    pub total_supply: Amount,
    /// Portion of `total_supply` locked in bridge custody.
    pub locked_supply: Amount,
}

/// Committed per-chain record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChainSupply {
    /// Chain id.
    pub chain_id: ChainId,
    /// Total supply.
    pub total_supply: Amount,
    /// Locked supply, never above `total_supply`.
    pub locked_supply: Amount,
    /// Commit time (unix seconds).
    pub last_update: u64,
}

/// Aggregate view across all chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GlobalSupply {
    /// Configured expected supply.
    pub expected: Amount,
    /// Sum of committed totals.
    pub actual: Amount,
    /// Sum of committed locked amounts.
    pub locked: Amount,
    /// `actual - locked`.
    pub circulating: Amount,
    /// `|actual - expected|`.
    pub deviation: Amount,
    /// `deviation <= tolerance`.
    pub healthy: bool,
}

/// Response when deviation exceeds tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Emit [`OracleEvent::SupplyMismatch`] only.
    #[default]
    Signal,
    /// Signal, then pause every registered bridge.
    PauseBridges,
}

/// Oracle parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleConfig {
    /// Quorum threshold.
    pub required_signatures: usize,
    /// Expected global supply.
    pub expected_supply: Amount,
    /// Absolute deviation tolerance.
    pub tolerance: Amount,
    /// Reconciliation cadence.
    pub reconciliation_interval_secs: u64,
    /// Nonce freshness window.
    pub nonce_validity_secs: u64,
    /// Clock-skew allowance.
    pub max_future_nonce_secs: u64,
    /// Mismatch response.
    pub mismatch_policy: MismatchPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            required_signatures: 2,
            expected_supply: 0,
            tolerance: 0,
            reconciliation_interval_secs: 3_600,
            nonce_validity_secs: DEFAULT_NONCE_VALIDITY_SECS,
            max_future_nonce_secs: DEFAULT_MAX_FUTURE_NONCE_SECS,
            mismatch_policy: MismatchPolicy::Signal,
        }
    }
}

impl OracleConfig {
    /// Reject unusable parameters.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.required_signatures == 0 {
            return Err(OracleError::InvalidThreshold);
        }
        if self.reconciliation_interval_secs < MIN_RECONCILIATION_INTERVAL_SECS {
            return Err(OracleError::IntervalTooShort(self.reconciliation_interval_secs));
        }
        if self.nonce_validity_secs == 0 {
            return Err(OracleError::InvalidConfig("nonce_validity_secs must be positive"));
        }
        Ok(())
    }
}

/// Oracle errors.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Missing role.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Oracle paused; updates rejected.
    #[error("oracle paused")]
    Paused,
    /// Chain id 0.
    #[error("invalid chain id")]
    InvalidChain,
    /// `locked > total`.
    #[error("locked supply {locked} exceeds total {total} on chain {chain_id}")]
    LockedExceedsTotal {
        /// Chain.
        chain_id: ChainId,
        /// Reported locked.
        locked: Amount,
        /// Reported total.
        total: Amount,
    },
    /// Committed totals would overflow.
    #[error("global supply overflow")]
    SupplyOverflow,
    /// Nonce already consumed by a commit.
    #[error("nonce {0} already used")]
    NonceUsed(u64),
    /// Nonce older than the freshness window.
    #[error("nonce {nonce} is stale at {now}")]
    StaleNonce {
        /// Nonce.
        nonce: u64,
        /// Clock.
        now: u64,
    },
    /// Nonce too far ahead of the clock.
    #[error("nonce {nonce} is ahead of clock {now}")]
    FutureNonce {
        /// Nonce.
        nonce: u64,
        /// Clock.
        now: u64,
    },
    /// Signer attested this hash already.
    #[error(transparent)]
    Duplicate(#[from] QuorumError),
    /// Batch without reports.
    #[error("empty batch")]
    EmptyBatch,
    /// Batch above [`MAX_BATCH_SIZE`].
    #[error("batch of {0} reports exceeds limit")]
    BatchTooLarge(usize),
    /// Same chain twice in one batch.
    #[error("chain {0} appears twice in batch")]
    DuplicateChain(ChainId),
    /// Interval below [`MIN_RECONCILIATION_INTERVAL_SECS`].
    #[error("reconciliation interval {0}s below minimum")]
    IntervalTooShort(u64),
    /// Quorum threshold of zero.
    #[error("required signatures must be at least 1")]
    InvalidThreshold,
    /// Other bad parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// Zero address.
    #[error("zero address")]
    ZeroAddress,
    /// Bridge already registered for the chain.
    #[error("bridge {address} already registered for chain {chain_id}")]
    BridgeAlreadyRegistered {
        /// Chain.
        chain_id: ChainId,
        /// Bridge.
        address: Address,
    },
    /// Signed attestation failed verification.
    #[error("invalid attestation signature")]
    BadSignature,
    /// Hashing failure.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl Classify for OracleError {
    fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Access(e) => e.kind(),
            OracleError::BadSignature => ErrorKind::Authorization,
            OracleError::Paused => ErrorKind::Halted,
            OracleError::LockedExceedsTotal { .. } | OracleError::SupplyOverflow => {
                ErrorKind::InvariantViolation
            }
            OracleError::NonceUsed(_)
            | OracleError::StaleNonce { .. }
            | OracleError::FutureNonce { .. }
            | OracleError::Duplicate(_) => ErrorKind::Replay,
            OracleError::InvalidChain
            | OracleError::EmptyBatch
            | OracleError::BatchTooLarge(_)
            | OracleError::DuplicateChain(_)
            | OracleError::IntervalTooShort(_)
            | OracleError::InvalidThreshold
            | OracleError::InvalidConfig(_)
            | OracleError::ZeroAddress
            | OracleError::BridgeAlreadyRegistered { .. } => ErrorKind::Validation,
            OracleError::Signing(_) => ErrorKind::Internal,
        }
    }
}

/// Result of an accepted attestation. Pending is the normal intermediate state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationOutcome {
    /// Recorded; quorum not reached.
    Pending {
        /// Update hash.
        hash: H256,
        /// Distinct signers so far.
        count: usize,
        /// Threshold.
        required: usize,
    },
    /// Quorum reached and committed.
    Committed {
        /// Update hash.
        hash: H256,
        /// Chains written.
        chains: Vec<ChainId>,
        /// Global view after the commit.
        global: GlobalSupply,
    },
}

impl AttestationOutcome {
    /// True on commit.
    pub fn is_committed(&self) -> bool {
        matches!(self, AttestationOutcome::Committed { .. })
    }
}

/// Signals raised by the oracle.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OracleEvent {
    /// Update committed.
    SupplyCommitted {
        /// Update hash.
        hash: H256,
        /// Nonce consumed.
        nonce: u64,
        /// Chains written.
        chains: Vec<ChainId>,
    },
    /// Deviation beyond tolerance.
    SupplyMismatch {
        /// Expected supply.
        expected: Amount,
        /// Observed supply.
        actual: Amount,
        /// Absolute deviation.
        deviation: Amount,
        /// Tolerance in force.
        tolerance: Amount,
    },
    /// Pause fan-out finished.
    BridgesPaused {
        /// Reason given.
        reason: String,
        /// One outcome per registered bridge.
        outcomes: Vec<PauseOutcome>,
    },
    /// Emergency mode toggled.
    EmergencyMode {
        /// New state.
        active: bool,
        /// Who toggled it.
        by: Address,
    },
}

/// Ed25519-signed single-chain report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    /// Report.
    pub report: SupplyReport,
    /// Nonce (unix seconds).
    pub nonce: u64,
    /// Signer public key.
    pub public_key: [u8; 32],
    /// Signature over [`attestation_signing_bytes`].
    pub signature: Signature,
}

/// Ed25519-signed multi-chain report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBatch {
    /// Reports, in the order the hash covers them.
    pub reports: Vec<SupplyReport>,
    /// Shared nonce.
    pub nonce: u64,
    /// Signer public key.
    pub public_key: [u8; 32],
    /// Signature over [`attestation_signing_bytes`].
    pub signature: Signature,
}

/// Sign a single-chain report with `keystore`.
pub fn sign_attestation<B: SignerBackend>(
    keystore: &Keystore<B>,
    report: SupplyReport,
    nonce: u64,
) -> Result<SignedAttestation, KeystoreError> {
    let public_key = keystore.public_key();
    let hash = supply_update_hash(
        report.chain_id,
        report.total_supply,
        report.locked_supply,
        nonce,
    );
    let signature = keystore.sign(&attestation_signing_bytes(&hash, &public_key))?;
    Ok(SignedAttestation { report, nonce, public_key, signature })
}

/// Sign a batch with `keystore`.
pub fn sign_batch<B: SignerBackend>(
    keystore: &Keystore<B>,
    reports: Vec<SupplyReport>,
    nonce: u64,
) -> Result<SignedBatch, KeystoreError> {
    let public_key = keystore.public_key();
    let hash = batch_update_hash(&reports, nonce).map_err(|_| KeystoreError::Crypto)?;
    let signature = keystore.sign(&attestation_signing_bytes(&hash, &public_key))?;
    Ok(SignedBatch { reports, nonce, public_key, signature })
}

struct RegisteredBridge {
    address: Address,
    handle: Arc<dyn Pausable>,
}

/// Reports behind a pending hash, kept until commit or expiry.
struct PendingUpdate {
    reports: Vec<SupplyReport>,
    nonce: u64,
}

/// The oracle state machine.
pub struct SupplyOracle {
    address: Address,
    cfg: OracleConfig,
    access: AccessControl,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
    supplies: BTreeMap<ChainId, ChainSupply>,
    quorum: QuorumAccumulator,
    pending_updates: BTreeMap<H256, PendingUpdate>,
    used_nonces: BTreeSet<u64>,
    bridges: BTreeMap<ChainId, Vec<RegisteredBridge>>,
    paused: bool,
    emergency: bool,
    last_reconciliation: Option<u64>,
    events: VecDeque<OracleEvent>,
}

impl SupplyOracle {
    /// Create an oracle at `address` administered by `admin`.
    ///
    /// `address` is the identity the oracle presents to bridges when pausing them.
    pub fn new(
        address: Address,
        admin: Address,
        cfg: OracleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OracleError> {
        if address.is_zero() || admin.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        cfg.validate()?;
        Ok(Self {
            address,
            cfg,
            access: AccessControl::with_admin(admin),
            clock,
            metrics: None,
            supplies: BTreeMap::new(),
            quorum: QuorumAccumulator::new(),
            pending_updates: BTreeMap::new(),
            used_nonces: BTreeSet::new(),
            bridges: BTreeMap::new(),
            paused: false,
            emergency: false,
            last_reconciliation: None,
            events: VecDeque::new(),
        })
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Oracle identity.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current parameters.
    pub fn config(&self) -> &OracleConfig {
        &self.cfg
    }

    // ---- roles ----

    /// Admin: grant a role.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        who: Address,
    ) -> Result<(), OracleError> {
        self.access.grant(caller, role, who)?;
        info!(?role, %who, "oracle role granted");
        Ok(())
    }

    /// Admin: revoke a role.
    ///
    /// Revoking `OracleSigner` also withdraws every pending attestation by
    /// `who`, so it no longer counts toward any quorum.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        who: &Address,
    ) -> Result<(), OracleError> {
        self.access.revoke(caller, role, who)?;
        if role == Role::OracleSigner {
            let withdrawn = self.quorum.forget_signer(who);
            self.sync_pending_updates();
            if withdrawn > 0 {
                warn!(
                    target: "security",
                    %who,
                    withdrawn,
                    "revoked signer's pending attestations withdrawn"
                );
            }
        }
        info!(?role, %who, "oracle role revoked");
        Ok(())
    }

    /// True if `who` holds `role`.
    pub fn has_role(&self, role: Role, who: &Address) -> bool {
        self.access.has_role(role, who)
    }

    // ---- bridge registry ----

    /// Admin: register a pausable bridge for `chain_id`.
    pub fn register_bridge(
        &mut self,
        caller: &Address,
        chain_id: ChainId,
        address: Address,
        handle: Arc<dyn Pausable>,
    ) -> Result<(), OracleError> {
        self.access.require(Role::Admin, caller)?;
        if address.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        if chain_id == 0 {
            return Err(OracleError::InvalidChain);
        }
        let list = self.bridges.entry(chain_id).or_default();
        if list.iter().any(|b| b.address == address) {
            return Err(OracleError::BridgeAlreadyRegistered { chain_id, address });
        }
        list.push(RegisteredBridge { address, handle });
        info!(chain_id, %address, "bridge registered with oracle");
        Ok(())
    }

    /// Bridges registered for `chain_id`.
    pub fn registered_bridges(&self, chain_id: ChainId) -> Vec<Address> {
        self.bridges
            .get(&chain_id)
            .map(|l| l.iter().map(|b| b.address).collect())
            .unwrap_or_default()
    }

    // ---- attestations ----

    /// Oracle signer: attest a single-chain report.
    pub fn update_supply(
        &mut self,
        caller: &Address,
        chain_id: ChainId,
        total_supply: Amount,
        locked_supply: Amount,
        nonce: u64,
    ) -> Result<AttestationOutcome, OracleError> {
        self.access.require(Role::OracleSigner, caller)?;
        if self.paused {
            return Err(OracleError::Paused);
        }
        let report = SupplyReport { chain_id, total_supply, locked_supply };
        Self::check_report(&report)?;
        let hash = supply_update_hash(chain_id, total_supply, locked_supply, nonce);
        self.attest(*caller, hash, vec![report], nonce)
    }

    /// Oracle signer: attest a set of reports sharing one nonce.
    pub fn batch_update_supply(
        &mut self,
        caller: &Address,
        reports: &[SupplyReport],
        nonce: u64,
    ) -> Result<AttestationOutcome, OracleError> {
        self.access.require(Role::OracleSigner, caller)?;
        if self.paused {
            return Err(OracleError::Paused);
        }
        if reports.is_empty() {
            return Err(OracleError::EmptyBatch);
        }
        if reports.len() > MAX_BATCH_SIZE {
            return Err(OracleError::BatchTooLarge(reports.len()));
        }
        let mut seen = BTreeSet::new();
        for r in reports {
            Self::check_report(r)?;
            if !seen.insert(r.chain_id) {
                return Err(OracleError::DuplicateChain(r.chain_id));
            }
        }
        let hash = batch_update_hash(reports, nonce)?;
        self.attest(*caller, hash, reports.to_vec(), nonce)
    }

    /// Verify a signed single-chain report, then attest as its signer.
    pub fn submit_signed_attestation(
        &mut self,
        att: &SignedAttestation,
    ) -> Result<AttestationOutcome, OracleError> {
        let r = att.report;
        let hash = supply_update_hash(r.chain_id, r.total_supply, r.locked_supply, att.nonce);
        let signer = Self::verify_signer(&hash, &att.public_key, &att.signature)?;
        self.update_supply(&signer, r.chain_id, r.total_supply, r.locked_supply, att.nonce)
    }

    /// Verify a signed batch, then attest as its signer.
    pub fn submit_signed_batch(
        &mut self,
        batch: &SignedBatch,
    ) -> Result<AttestationOutcome, OracleError> {
        let hash = batch_update_hash(&batch.reports, batch.nonce)?;
        let signer = Self::verify_signer(&hash, &batch.public_key, &batch.signature)?;
        self.batch_update_supply(&signer, &batch.reports, batch.nonce)
    }

    fn verify_signer(
        hash: &H256,
        public_key: &[u8; 32],
        signature: &Signature,
    ) -> Result<Address, OracleError> {
        let msg = attestation_signing_bytes(hash, public_key);
        verify_pubkey_bytes(public_key, &msg, signature).map_err(|_| {
            warn!(target: "security", %hash, "attestation signature rejected");
            OracleError::BadSignature
        })?;
        Ok(Address::from_public_key(public_key))
    }

    fn check_report(r: &SupplyReport) -> Result<(), OracleError> {
        if r.chain_id == 0 {
            return Err(OracleError::InvalidChain);
        }
        if r.locked_supply > r.total_supply {
            return Err(OracleError::LockedExceedsTotal {
                chain_id: r.chain_id,
                locked: r.locked_supply,
                total: r.total_supply,
            });
        }
        Ok(())
    }

    fn check_nonce(&self, nonce: u64, now: u64) -> Result<(), OracleError> {
        if self.used_nonces.contains(&nonce) {
            return Err(OracleError::NonceUsed(nonce));
        }
        if nonce.saturating_add(self.cfg.nonce_validity_secs) < now {
            return Err(OracleError::StaleNonce { nonce, now });
        }
        if nonce > now.saturating_add(self.cfg.max_future_nonce_secs) {
            return Err(OracleError::FutureNonce { nonce, now });
        }
        Ok(())
    }

    /// Sum of totals with `reports` overlaid on the committed figures.
    fn projected_totals(&self, reports: &[SupplyReport]) -> Option<(Amount, Amount)> {
        let mut view: BTreeMap<ChainId, (Amount, Amount)> = self
            .supplies
            .iter()
            .map(|(c, s)| (*c, (s.total_supply, s.locked_supply)))
            .collect();
        for r in reports {
            view.insert(r.chain_id, (r.total_supply, r.locked_supply));
        }
        view.values().try_fold((0u128, 0u128), |(t, l), (vt, vl)| {
            Some((t.checked_add(*vt)?, l.checked_add(*vl)?))
        })
    }

    fn attest(
        &mut self,
        signer: Address,
        hash: H256,
        reports: Vec<SupplyReport>,
        nonce: u64,
    ) -> Result<AttestationOutcome, OracleError> {
        let now = self.clock.now();
        if let Err(e) = self.check_nonce(nonce, now) {
            warn!(target: "security", %signer, nonce, error = %e, "supply attestation rejected");
            self.count_replay();
            return Err(e);
        }
        if self.projected_totals(&reports).is_none() {
            return Err(OracleError::SupplyOverflow);
        }

        let pruned = self.quorum.prune_expired(now);
        if pruned > 0 {
            self.sync_pending_updates();
            debug!(pruned, "expired pending attestations dropped");
        }

        let expires_at = nonce.saturating_add(self.cfg.nonce_validity_secs);
        if let Err(e) = self.quorum.attest(hash, signer, expires_at) {
            warn!(target: "security", %signer, %hash, "duplicate attestation");
            self.count_replay();
            return Err(e.into());
        }
        if let Some(m) = &self.metrics {
            m.oracle_attestations_total.inc();
        }

        let required = self.cfg.required_signatures;
        let count = self.live_signers(&hash);
        if count < required {
            self.pending_updates.entry(hash).or_insert(PendingUpdate { reports, nonce });
            debug!(%signer, %hash, count, required, "attestation recorded");
            return Ok(AttestationOutcome::Pending { hash, count, required });
        }
        self.pending_updates.remove(&hash);
        Ok(self.commit(hash, PendingUpdate { reports, nonce }, count, now))
    }

    /// Signers on `hash` that still hold the signer role.
    fn live_signers(&self, hash: &H256) -> usize {
        self.quorum.get(hash).map_or(0, |p| {
            p.signers
                .iter()
                .filter(|s| self.access.has_role(Role::OracleSigner, s))
                .count()
        })
    }

    fn sync_pending_updates(&mut self) {
        let quorum = &self.quorum;
        self.pending_updates.retain(|h, _| quorum.get(h).is_some());
    }

    fn commit(
        &mut self,
        hash: H256,
        update: PendingUpdate,
        signers: usize,
        now: u64,
    ) -> AttestationOutcome {
        let PendingUpdate { reports, nonce } = update;
        let chains: Vec<ChainId> = reports.iter().map(|r| r.chain_id).collect();
        for r in &reports {
            self.supplies.insert(
                r.chain_id,
                ChainSupply {
                    chain_id: r.chain_id,
                    total_supply: r.total_supply,
                    locked_supply: r.locked_supply,
                    last_update: now,
                },
            );
        }
        self.used_nonces.insert(nonce);
        self.quorum.clear(&hash);
        self.pending_updates.remove(&hash);
        if let Some(m) = &self.metrics {
            m.oracle_commits_total.inc();
        }
        info!(%hash, nonce, ?chains, signers, "supply update committed");
        self.push_event(OracleEvent::SupplyCommitted {
            hash,
            nonce,
            chains: chains.clone(),
        });

        let global = self.evaluate_deviation();
        AttestationOutcome::Committed {
            hash,
            chains,
            global,
        }
    }

    fn count_replay(&self) {
        if let Some(m) = &self.metrics {
            m.replay_rejected_total.inc();
        }
    }

    fn push_event(&mut self, ev: OracleEvent) {
        if self.events.len() == MAX_BUFFERED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ev);
    }

    // ---- global view ----

    /// Aggregate view over committed figures.
    pub fn global_supply(&self) -> GlobalSupply {
        let (actual, locked) = self.supplies.values().fold((0u128, 0u128), |(t, l), s| {
            (t.saturating_add(s.total_supply), l.saturating_add(s.locked_supply))
        });
        let deviation = actual.abs_diff(self.cfg.expected_supply);
        GlobalSupply {
            expected: self.cfg.expected_supply,
            actual,
            locked,
            circulating: actual - locked.min(actual),
            deviation,
            healthy: deviation <= self.cfg.tolerance,
        }
    }

    fn evaluate_deviation(&mut self) -> GlobalSupply {
        let global = self.global_supply();
        if let Some(m) = &self.metrics {
            m.oracle_actual_supply_tokens.set(tokens_gauge_value(global.actual));
            m.oracle_deviation_tokens.set(tokens_gauge_value(global.deviation));
        }
        if global.healthy {
            return global;
        }
        warn!(
            expected = global.expected,
            actual = global.actual,
            deviation = global.deviation,
            tolerance = self.cfg.tolerance,
            "global supply mismatch"
        );
        if let Some(m) = &self.metrics {
            m.oracle_supply_mismatch_total.inc();
        }
        self.push_event(OracleEvent::SupplyMismatch {
            expected: global.expected,
            actual: global.actual,
            deviation: global.deviation,
            tolerance: self.cfg.tolerance,
        });
        if self.cfg.mismatch_policy == MismatchPolicy::PauseBridges {
            self.fan_out_pause("supply mismatch");
        }
        global
    }

    /// Operator: recompute and check deviation; never touches per-chain records.
    pub fn reconcile_supply(&mut self, caller: &Address) -> Result<GlobalSupply, OracleError> {
        self.access.require(Role::Operator, caller)?;
        let now = self.clock.now();
        let global = self.evaluate_deviation();
        self.last_reconciliation = Some(now);
        debug!(actual = global.actual, healthy = global.healthy, "reconciliation complete");
        Ok(global)
    }

    /// True once the configured interval has elapsed since the last reconciliation.
    pub fn reconciliation_due(&self, now: u64) -> bool {
        match self.last_reconciliation {
            None => true,
            Some(t) => t.saturating_add(self.cfg.reconciliation_interval_secs) <= now,
        }
    }

    /// Time of the last reconciliation.
    pub fn last_reconciliation(&self) -> Option<u64> {
        self.last_reconciliation
    }

    // ---- admin parameters ----

    /// Admin: interval (floored) and tolerance.
    pub fn update_reconciliation_params(
        &mut self,
        caller: &Address,
        interval_secs: u64,
        tolerance: Amount,
    ) -> Result<(), OracleError> {
        self.access.require(Role::Admin, caller)?;
        if interval_secs < MIN_RECONCILIATION_INTERVAL_SECS {
            return Err(OracleError::IntervalTooShort(interval_secs));
        }
        self.cfg.reconciliation_interval_secs = interval_secs;
        self.cfg.tolerance = tolerance;
        info!(interval_secs, tolerance, "reconciliation parameters updated");
        Ok(())
    }

    /// Admin: quorum threshold.
    ///
    /// Pending entries that already meet the new threshold commit at once, in
    /// hash order; the outcomes are returned. An entry whose nonce was used by
    /// an earlier commit in the same pass, or has gone stale, is dropped.
    pub fn update_required_signatures(
        &mut self,
        caller: &Address,
        n: usize,
    ) -> Result<Vec<AttestationOutcome>, OracleError> {
        self.access.require(Role::Admin, caller)?;
        if n == 0 {
            return Err(OracleError::InvalidThreshold);
        }
        self.cfg.required_signatures = n;
        info!(required = n, "quorum threshold updated");

        let now = self.clock.now();
        let mut committed = Vec::new();
        for hash in self.quorum.hashes() {
            let count = self.live_signers(&hash);
            if count < n {
                continue;
            }
            let Some(update) = self.pending_updates.remove(&hash) else {
                self.quorum.clear(&hash);
                continue;
            };
            let fresh = self.check_nonce(update.nonce, now).is_ok();
            if !fresh || self.projected_totals(&update.reports).is_none() {
                debug!(%hash, nonce = update.nonce, "pending update dropped on threshold change");
                self.quorum.clear(&hash);
                continue;
            }
            committed.push(self.commit(hash, update, count, now));
        }
        Ok(committed)
    }

    /// Admin: expected global supply.
    pub fn update_expected_supply(
        &mut self,
        caller: &Address,
        expected: Amount,
    ) -> Result<(), OracleError> {
        self.access.require(Role::Admin, caller)?;
        self.cfg.expected_supply = expected;
        info!(expected, "expected supply updated");
        Ok(())
    }

    /// Admin: mismatch response.
    pub fn set_mismatch_policy(
        &mut self,
        caller: &Address,
        policy: MismatchPolicy,
    ) -> Result<(), OracleError> {
        self.access.require(Role::Admin, caller)?;
        self.cfg.mismatch_policy = policy;
        Ok(())
    }

    // ---- pause and emergency ----

    /// Operator: reject new attestations.
    pub fn pause(&mut self, caller: &Address) -> Result<(), OracleError> {
        self.access.require(Role::Operator, caller)?;
        self.paused = true;
        info!("oracle paused");
        Ok(())
    }

    /// Operator: accept attestations again.
    pub fn unpause(&mut self, caller: &Address) -> Result<(), OracleError> {
        self.access.require(Role::Operator, caller)?;
        self.paused = false;
        info!("oracle unpaused");
        Ok(())
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Emergency: set emergency mode and pause every registered bridge.
    pub fn activate_emergency_mode(
        &mut self,
        caller: &Address,
    ) -> Result<Vec<PauseOutcome>, OracleError> {
        self.access.require(Role::Emergency, caller)?;
        self.emergency = true;
        warn!(by = %caller, "emergency mode activated");
        self.push_event(OracleEvent::EmergencyMode { active: true, by: *caller });
        Ok(self.fan_out_pause("emergency mode"))
    }

    /// Emergency: clear emergency mode. Bridges stay paused until their
    /// operators resume them.
    pub fn deactivate_emergency_mode(&mut self, caller: &Address) -> Result<(), OracleError> {
        self.access.require(Role::Emergency, caller)?;
        self.emergency = false;
        info!(by = %caller, "emergency mode deactivated");
        self.push_event(OracleEvent::EmergencyMode { active: false, by: *caller });
        Ok(())
    }

    /// True while in emergency mode.
    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Emergency: pause every registered bridge, one outcome per bridge.
    pub fn pause_bridges_on_mismatch(
        &mut self,
        caller: &Address,
        reason: &str,
    ) -> Result<Vec<PauseOutcome>, OracleError> {
        self.access.require(Role::Emergency, caller)?;
        Ok(self.fan_out_pause(reason))
    }

    fn fan_out_pause(&mut self, reason: &str) -> Vec<PauseOutcome> {
        let targets = self
            .bridges
            .iter()
            .flat_map(|(chain, list)| list.iter().map(move |b| (*chain, b.address, &b.handle)));
        let outcomes = pause_all(targets, self.address, reason);
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if let Some(m) = &self.metrics {
            m.oracle_pause_failures_total.inc_by(failed as u64);
        }
        info!(reason, total = outcomes.len(), failed, "bridge pause fan-out finished");
        self.push_event(OracleEvent::BridgesPaused {
            reason: reason.to_string(),
            outcomes: outcomes.clone(),
        });
        outcomes
    }

    // ---- reads ----

    /// Committed record for `chain_id`.
    pub fn chain_supply(&self, chain_id: ChainId) -> Option<ChainSupply> {
        self.supplies.get(&chain_id).copied()
    }

    /// Chains with committed records.
    pub fn chains(&self) -> Vec<ChainId> {
        self.supplies.keys().copied().collect()
    }

    /// Pending attestations for `hash`.
    pub fn pending_attestations(&self, hash: &H256) -> Option<&PendingAttestation> {
        self.quorum.get(hash)
    }

    /// True once `nonce` has been consumed by a commit.
    pub fn is_nonce_used(&self, nonce: u64) -> bool {
        self.used_nonces.contains(&nonce)
    }

    /// Take buffered events, oldest first.
    pub fn drain_events(&mut self) -> Vec<OracleEvent> {
        self.events.drain(..).collect()
    }
}

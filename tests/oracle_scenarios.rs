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

use omnisupply::core::access::Role;
use omnisupply::core::bridge::{
    adapter::{AdapterError, BridgeAdapter, LayerZeroAdapter},
    ledger::InMemoryLedger,
    protocols::{BridgeParams, LayerZero},
    transport::InMemoryTransport,
};
use omnisupply::core::clock::{Clock, ManualClock};
use omnisupply::core::oracle::emergency::Pausable;
use omnisupply::core::oracle::supply_oracle::{
    AttestationOutcome, MismatchPolicy, OracleConfig, OracleError, OracleEvent, SupplyOracle,
    SupplyReport,
};
use omnisupply::core::types::{Address, ChainId, Classify, ErrorKind};
use std::{collections::BTreeMap, sync::Arc};

const NOW: u64 = 1_700_000_000;
const TESTNET: ChainId = 97;

struct Env {
    admin: Address,
    s1: Address,
    s2: Address,
    s3: Address,
    operator: Address,
    guardian: Address,
    clock: Arc<ManualClock>,
    oracle: SupplyOracle,
}

fn env(cfg: OracleConfig) -> Env {
    let admin = Address::from_low_u64(1);
    let (s1, s2, s3) = (
        Address::from_low_u64(11),
        Address::from_low_u64(12),
        Address::from_low_u64(13),
    );
    let operator = Address::from_low_u64(20);
    let guardian = Address::from_low_u64(30);
    let clock = Arc::new(ManualClock::new(NOW));
    let mut oracle =
        SupplyOracle::new(Address::from_low_u64(0x0a), admin, cfg, clock.clone()).unwrap();
    for s in [s1, s2, s3] {
        oracle.grant_role(&admin, Role::OracleSigner, s).unwrap();
    }
    oracle.grant_role(&admin, Role::Operator, operator).unwrap();
    oracle.grant_role(&admin, Role::Emergency, guardian).unwrap();
    Env { admin, s1, s2, s3, operator, guardian, clock, oracle }
}

fn cfg(expected: u128, tolerance: u128) -> OracleConfig {
    OracleConfig {
        required_signatures: 2,
        expected_supply: expected,
        tolerance,
        ..OracleConfig::default()
    }
}

fn adapter(chain: ChainId, me: u64, admin: Address) -> Arc<LayerZeroAdapter> {
    let ledger = Arc::new(InMemoryLedger::new(chain, admin));
    let a = Arc::new(
        LayerZeroAdapter::new(
            Address::from_low_u64(me),
            admin,
            30_000 + chain as u32,
            LayerZero { default_fee: 1, per_chain_fee: BTreeMap::new() },
            ledger.clone(),
            Arc::new(InMemoryTransport::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap(),
    );
    ledger.authorize_bridge(&admin, a.address()).unwrap();
    a
}

#[test]
fn two_of_three_quorum_commits_single_chain() {
    let mut e = env(cfg(500_000, 0));
    let out = e.oracle.update_supply(&e.s1, TESTNET, 500_000, 100_000, NOW).unwrap();
    assert!(matches!(out, AttestationOutcome::Pending { count: 1, required: 2, .. }));
    assert!(e.oracle.chain_supply(TESTNET).is_none());

    let out = e.oracle.update_supply(&e.s2, TESTNET, 500_000, 100_000, NOW).unwrap();
    let AttestationOutcome::Committed { chains, global, .. } = out else {
        panic!("expected commit");
    };
    assert_eq!(chains, vec![TESTNET]);
    assert_eq!(global.actual, 500_000);
    assert_eq!(global.locked, 100_000);
    assert_eq!(global.circulating, 400_000);
    assert_eq!(global.deviation, 0);
    assert!(global.healthy);

    let rec = e.oracle.chain_supply(TESTNET).unwrap();
    assert_eq!(rec.last_update, NOW);
    assert!(e.oracle.is_nonce_used(NOW));

    // Third signer arrives late: the nonce is spent.
    let err = e.oracle.update_supply(&e.s3, TESTNET, 500_000, 100_000, NOW).unwrap_err();
    assert!(matches!(err, OracleError::NonceUsed(NOW)));
    assert_eq!(err.kind(), ErrorKind::Replay);
}

#[test]
fn disagreeing_signers_never_commit() {
    let mut e = env(cfg(500_000, 0));
    let a = e.oracle.update_supply(&e.s1, TESTNET, 500_000, 100_000, NOW).unwrap();
    let b = e.oracle.update_supply(&e.s2, TESTNET, 500_001, 100_000, NOW).unwrap();
    assert!(!a.is_committed());
    assert!(!b.is_committed());
    assert!(e.oracle.chains().is_empty());
    assert!(!e.oracle.is_nonce_used(NOW));
}

#[test]
fn duplicate_signer_does_not_count_twice() {
    let mut e = env(cfg(500_000, 0));
    e.oracle.update_supply(&e.s1, TESTNET, 500_000, 0, NOW).unwrap();
    let err = e.oracle.update_supply(&e.s1, TESTNET, 500_000, 0, NOW).unwrap_err();
    assert!(matches!(err, OracleError::Duplicate(_)));
    assert!(e.oracle.chains().is_empty());
}

#[test]
fn revoked_signer_stops_counting_toward_quorum() {
    let mut e = env(cfg(999_999, 0));
    let first = e.oracle.update_supply(&e.s1, TESTNET, 999_999, 0, NOW).unwrap();
    let AttestationOutcome::Pending { hash, .. } = first else {
        panic!("expected pending");
    };
    e.oracle.revoke_role(&e.admin, Role::OracleSigner, &e.s1).unwrap();
    assert!(e.oracle.pending_attestations(&hash).is_none());

    let out = e.oracle.update_supply(&e.s2, TESTNET, 999_999, 0, NOW).unwrap();
    assert!(matches!(out, AttestationOutcome::Pending { count: 1, required: 2, .. }));
    assert!(e.oracle.chain_supply(TESTNET).is_none());

    let err = e.oracle.update_supply(&e.s1, TESTNET, 999_999, 0, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let out = e.oracle.update_supply(&e.s3, TESTNET, 999_999, 0, NOW).unwrap();
    assert!(out.is_committed());
}

#[test]
fn lowering_threshold_commits_entries_already_at_quorum() {
    let mut e = env(OracleConfig { required_signatures: 3, ..cfg(500_000, 0) });
    e.oracle.update_supply(&e.s1, TESTNET, 500_000, 0, NOW).unwrap();
    e.oracle.update_supply(&e.s2, TESTNET, 500_000, 0, NOW).unwrap();
    e.oracle.update_supply(&e.s3, TESTNET, 400_000, 0, NOW).unwrap();
    assert!(e.oracle.chains().is_empty());

    let committed = e.oracle.update_required_signatures(&e.admin, 2).unwrap();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].is_committed());
    assert_eq!(e.oracle.chain_supply(TESTNET).map(|c| c.total_supply), Some(500_000));
    assert!(e.oracle.is_nonce_used(NOW));

    // Nothing left to settle; a further change is a no-op.
    assert!(e.oracle.update_required_signatures(&e.admin, 1).unwrap().is_empty());
    assert_eq!(e.oracle.chain_supply(TESTNET).map(|c| c.total_supply), Some(500_000));
}

#[test]
fn nonce_freshness_window() {
    let mut e = env(cfg(500_000, 0));
    let validity = e.oracle.config().nonce_validity_secs;
    let max_future = e.oracle.config().max_future_nonce_secs;

    let stale = NOW - validity - 1;
    let err = e.oracle.update_supply(&e.s1, TESTNET, 1, 0, stale).unwrap_err();
    assert!(matches!(err, OracleError::StaleNonce { .. }));

    let edge = NOW - validity;
    assert!(e.oracle.update_supply(&e.s1, TESTNET, 1, 0, edge).is_ok());

    let future = NOW + max_future + 1;
    let err = e.oracle.update_supply(&e.s1, TESTNET, 1, 0, future).unwrap_err();
    assert!(matches!(err, OracleError::FutureNonce { .. }));
    assert_eq!(err.kind(), ErrorKind::Replay);
}

#[test]
fn pending_attestation_expires_with_its_nonce() {
    let mut e = env(cfg(500_000, 0));
    e.oracle.update_supply(&e.s1, TESTNET, 500_000, 0, NOW).unwrap();
    let validity = e.oracle.config().nonce_validity_secs;
    e.clock.advance(validity + 1);
    // The nonce is now stale, so the second signer cannot complete it.
    let err = e.oracle.update_supply(&e.s2, TESTNET, 500_000, 0, NOW).unwrap_err();
    assert!(matches!(err, OracleError::StaleNonce { .. }));
    // A fresh nonce starts a new, independent quorum.
    let fresh = e.clock.now();
    assert!(!e.oracle.update_supply(&e.s2, TESTNET, 500_000, 0, fresh).unwrap().is_committed());
    assert!(e.oracle.update_supply(&e.s3, TESTNET, 500_000, 0, fresh).unwrap().is_committed());
}

#[test]
fn batch_commits_all_chains_atomically() {
    let mut e = env(cfg(900_000, 0));
    let reports = [
        SupplyReport { chain_id: 1, total_supply: 400_000, locked_supply: 0 },
        SupplyReport { chain_id: 56, total_supply: 300_000, locked_supply: 50_000 },
        SupplyReport { chain_id: 8453, total_supply: 200_000, locked_supply: 0 },
    ];
    assert!(!e.oracle.batch_update_supply(&e.s1, &reports, NOW).unwrap().is_committed());
    let out = e.oracle.batch_update_supply(&e.s3, &reports, NOW).unwrap();
    let AttestationOutcome::Committed { chains, global, .. } = out else {
        panic!("expected commit");
    };
    assert_eq!(chains, vec![1, 56, 8453]);
    assert_eq!(global.actual, 900_000);
    assert_eq!(global.circulating, 850_000);
    assert!(global.healthy);

    let dup = [reports[0], reports[0]];
    assert!(matches!(
        e.oracle.batch_update_supply(&e.s1, &dup, NOW + 1),
        Err(OracleError::DuplicateChain(1))
    ));
    assert!(matches!(
        e.oracle.batch_update_supply(&e.s1, &[], NOW + 1),
        Err(OracleError::EmptyBatch)
    ));
}

#[test]
fn invalid_reports_rejected_before_counting() {
    let mut e = env(cfg(500_000, 0));
    let err = e.oracle.update_supply(&e.s1, TESTNET, 100, 101, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(matches!(e.oracle.update_supply(&e.s1, 0, 1, 0, NOW), Err(OracleError::InvalidChain)));
    let err = e.oracle.update_supply(&e.operator, TESTNET, 1, 0, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn mismatch_signals_without_pausing_by_default() {
    let mut e = env(cfg(1_000_000, 10));
    let bridge = adapter(TESTNET, 0xb1, e.admin);
    bridge.grant_role(&e.admin, Role::Emergency, e.oracle.address()).unwrap();
    e.oracle.register_bridge(&e.admin, TESTNET, bridge.address(), bridge.clone()).unwrap();

    e.oracle.update_supply(&e.s1, TESTNET, 500_000, 100_000, NOW).unwrap();
    let out = e.oracle.update_supply(&e.s2, TESTNET, 500_000, 100_000, NOW).unwrap();
    let AttestationOutcome::Committed { global, .. } = out else {
        panic!("expected commit");
    };
    assert!(!global.healthy);
    assert_eq!(global.deviation, 500_000);
    assert!(!bridge.is_paused());

    let events = e.oracle.drain_events();
    assert!(events
        .iter()
        .any(|ev| matches!(ev, OracleEvent::SupplyMismatch { deviation: 500_000, .. })));
    assert!(!events.iter().any(|ev| matches!(ev, OracleEvent::BridgesPaused { .. })));
}

#[test]
fn mismatch_policy_pauses_what_it_can() {
    let mut c = cfg(1_000_000, 10);
    c.mismatch_policy = MismatchPolicy::PauseBridges;
    let mut e = env(c);

    let trusted = adapter(TESTNET, 0xb1, e.admin);
    trusted.grant_role(&e.admin, Role::Emergency, e.oracle.address()).unwrap();
    // Never granted the oracle a pause role.
    let stubborn = adapter(56, 0xb2, e.admin);
    e.oracle.register_bridge(&e.admin, TESTNET, trusted.address(), trusted.clone()).unwrap();
    e.oracle.register_bridge(&e.admin, 56, stubborn.address(), stubborn.clone()).unwrap();

    e.oracle.update_supply(&e.s1, TESTNET, 500_000, 0, NOW).unwrap();
    e.oracle.update_supply(&e.s2, TESTNET, 500_000, 0, NOW).unwrap();

    assert!(trusted.is_paused());
    assert!(!stubborn.is_paused());
    let outcomes = e
        .oracle
        .drain_events()
        .into_iter()
        .find_map(|ev| match ev {
            OracleEvent::BridgesPaused { outcomes, .. } => Some(outcomes),
            _ => None,
        })
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);

    let err = trusted
        .bridge(
            Address::from_low_u64(5),
            1,
            Address::from_low_u64(6),
            1,
            &BridgeParams::default(),
            1,
        )
        .unwrap_err();
    assert!(matches!(err, AdapterError::Paused));
}

#[test]
fn emergency_mode_pauses_bridges_and_is_role_gated() {
    let mut e = env(cfg(500_000, 0));
    let bridge = adapter(TESTNET, 0xb1, e.admin);
    bridge.grant_role(&e.admin, Role::Emergency, e.oracle.address()).unwrap();
    e.oracle.register_bridge(&e.admin, TESTNET, bridge.address(), bridge.clone()).unwrap();

    let err = e.oracle.activate_emergency_mode(&e.operator).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let outcomes = e.oracle.activate_emergency_mode(&e.guardian).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());
    assert!(e.oracle.is_emergency());
    assert!(bridge.is_paused());

    e.oracle.deactivate_emergency_mode(&e.guardian).unwrap();
    assert!(!e.oracle.is_emergency());
    // Bridges resume only through their own operators.
    assert!(bridge.is_paused());
}

#[test]
fn paused_oracle_rejects_attestations_until_resumed() {
    let mut e = env(cfg(500_000, 0));
    e.oracle.pause(&e.operator).unwrap();
    let err = e.oracle.update_supply(&e.s1, TESTNET, 1, 0, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Halted);
    e.oracle.unpause(&e.operator).unwrap();
    assert!(e.oracle.update_supply(&e.s1, TESTNET, 1, 0, NOW).is_ok());
}

#[test]
fn reconciliation_schedule_and_parameters() {
    let mut e = env(cfg(500_000, 0));
    assert!(e.oracle.reconciliation_due(NOW));
    let g = e.oracle.reconcile_supply(&e.operator).unwrap();
    assert_eq!(g.actual, 0);
    assert!(!g.healthy);
    assert!(!e.oracle.reconciliation_due(NOW + 10));
    assert!(e.oracle.reconciliation_due(NOW + e.oracle.config().reconciliation_interval_secs));

    assert!(matches!(
        e.oracle.update_reconciliation_params(&e.admin, 60, 0),
        Err(OracleError::IntervalTooShort(60))
    ));
    assert!(matches!(
        e.oracle.update_required_signatures(&e.admin, 0),
        Err(OracleError::InvalidThreshold)
    ));
    e.oracle.update_expected_supply(&e.admin, 0).unwrap();
    assert!(e.oracle.global_supply().healthy);
}

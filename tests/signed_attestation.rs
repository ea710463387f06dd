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
use omnisupply::core::clock::ManualClock;
use omnisupply::core::oracle::supply_oracle::{
    sign_attestation, sign_batch, OracleConfig, OracleError, SupplyOracle, SupplyReport,
};
use omnisupply::core::security::keystore::Keystore;
use omnisupply::core::types::{Address, Classify, ErrorKind};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000;

fn oracle(required: usize) -> (SupplyOracle, Address) {
    let admin = Address::from_low_u64(1);
    let cfg = OracleConfig {
        required_signatures: required,
        expected_supply: 1_000,
        tolerance: 0,
        ..OracleConfig::default()
    };
    let clock = Arc::new(ManualClock::new(NOW));
    let o = SupplyOracle::new(Address::from_low_u64(0xa), admin, cfg, clock).unwrap();
    (o, admin)
}

#[test]
fn keystore_signed_reports_reach_quorum() {
    let d1 = tempfile::tempdir().unwrap();
    let d2 = tempfile::tempdir().unwrap();
    let k1 = Keystore::open(d1.path()).unwrap();
    let k2 = Keystore::open(d2.path()).unwrap();
    assert_ne!(k1.address(), k2.address());

    let (mut o, admin) = oracle(2);
    o.grant_role(&admin, Role::OracleSigner, k1.address()).unwrap();
    o.grant_role(&admin, Role::OracleSigner, k2.address()).unwrap();

    let report = SupplyReport { chain_id: 97, total_supply: 1_000, locked_supply: 250 };
    let a1 = sign_attestation(&k1, report, NOW).unwrap();
    let a2 = sign_attestation(&k2, report, NOW).unwrap();
    assert!(!o.submit_signed_attestation(&a1).unwrap().is_committed());
    assert!(o.submit_signed_attestation(&a2).unwrap().is_committed());
    assert_eq!(o.global_supply().circulating, 750);
}

#[test]
fn reopened_key_keeps_its_identity() {
    let dir = tempfile::tempdir().unwrap();
    let first = Keystore::open(dir.path()).unwrap().address();
    let second = Keystore::open(dir.path()).unwrap().address();
    assert_eq!(first, second);
}

#[test]
fn tampered_report_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::open(dir.path()).unwrap();
    let (mut o, admin) = oracle(1);
    o.grant_role(&admin, Role::OracleSigner, ks.address()).unwrap();

    let report = SupplyReport { chain_id: 97, total_supply: 1_000, locked_supply: 0 };
    let mut att = sign_attestation(&ks, report, NOW).unwrap();
    att.report.total_supply = 1_000_000;
    let err = o.submit_signed_attestation(&att).unwrap_err();
    assert!(matches!(err, OracleError::BadSignature));
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(o.chains().is_empty());
}

#[test]
fn valid_signature_without_role_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::open(dir.path()).unwrap();
    let (mut o, _) = oracle(1);
    let report = SupplyReport { chain_id: 97, total_supply: 1, locked_supply: 0 };
    let att = sign_attestation(&ks, report, NOW).unwrap();
    let err = o.submit_signed_attestation(&att).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn signed_batch_commits_with_single_signer_quorum() {
    let dir = tempfile::tempdir().unwrap();
    let ks = Keystore::open(dir.path()).unwrap();
    let (mut o, admin) = oracle(1);
    o.grant_role(&admin, Role::OracleSigner, ks.address()).unwrap();

    let reports = vec![
        SupplyReport { chain_id: 1, total_supply: 600, locked_supply: 0 },
        SupplyReport { chain_id: 97, total_supply: 400, locked_supply: 100 },
    ];
    let batch = sign_batch(&ks, reports, NOW).unwrap();
    assert!(o.submit_signed_batch(&batch).unwrap().is_committed());
    assert!(o.global_supply().healthy);

    // Same signed batch again: nonce is spent.
    let err = o.submit_signed_batch(&batch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Replay);
}

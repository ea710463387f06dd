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

use omnisupply::core::bridge::{
    adapter::{AdapterError, BridgeAdapter, CelerAdapter, HyperlaneAdapter, LayerZeroAdapter},
    ledger::{FungibleLedger, InMemoryLedger},
    protocols::{BridgeParams, Celer, Hyperlane, LayerZero},
    router::{BridgeRouter, RouterError},
    transport::{InMemoryTransport, InboundDelivery, OutboundPacket},
};
use omnisupply::core::clock::ManualClock;
use omnisupply::core::runtime::relay::{Relay, RelayError};
use omnisupply::core::types::{Address, ChainId, Classify, ErrorKind, ProtocolId, RemoteAddress};
use std::{collections::BTreeMap, sync::Arc};

const BSC: ChainId = 56;
const BASE: ChainId = 8453;

struct Side {
    ledger: Arc<InMemoryLedger>,
    lz: Arc<LayerZeroAdapter>,
    celer: Arc<CelerAdapter>,
    hyper: Arc<HyperlaneAdapter>,
    router: BridgeRouter,
}

struct World {
    admin: Address,
    alice: Address,
    bob: Address,
    transport: Arc<InMemoryTransport>,
    relay: Relay,
    bsc: Side,
    base: Side,
}

fn adapter_addr(chain: ChainId, protocol: ProtocolId) -> Address {
    Address::from_low_u64(chain * 100 + u64::from(protocol.tag()) + 1)
}

fn lz_eid(chain: ChainId) -> u32 {
    if chain == BSC {
        30102
    } else {
        30184
    }
}

fn side(
    chain: ChainId,
    remote: ChainId,
    admin: Address,
    transport: &Arc<InMemoryTransport>,
    clock: &Arc<ManualClock>,
) -> Side {
    let ledger = Arc::new(InMemoryLedger::new(chain, admin));
    let lz = Arc::new(
        LayerZeroAdapter::new(
            adapter_addr(chain, ProtocolId::LayerZero),
            admin,
            lz_eid(chain),
            LayerZero { default_fee: 100, per_chain_fee: BTreeMap::new() },
            ledger.clone(),
            transport.clone(),
            clock.clone(),
        )
        .unwrap(),
    );
    let celer = Arc::new(
        CelerAdapter::new(
            adapter_addr(chain, ProtocolId::Celer),
            admin,
            chain as u32,
            Celer { fee_bps: 10, min_fee: 20, max_fee: 500 },
            ledger.clone(),
            transport.clone(),
            clock.clone(),
        )
        .unwrap(),
    );
    let hyper = Arc::new(
        HyperlaneAdapter::new(
            adapter_addr(chain, ProtocolId::Hyperlane),
            admin,
            chain as u32,
            Hyperlane {
                default_gas_limit: 100_000,
                default_gas_price: 1,
                gas_price: BTreeMap::new(),
            },
            ledger.clone(),
            transport.clone(),
            clock.clone(),
        )
        .unwrap(),
    );

    let router_addr = Address::from_low_u64(chain * 100 + 99);
    for a in [lz.address(), celer.address(), hyper.address()] {
        ledger.authorize_bridge(&admin, a).unwrap();
    }
    let peer = |p| RemoteAddress::from_address(adapter_addr(remote, p));
    lz.set_chain_mapping(&admin, remote, lz_eid(remote)).unwrap();
    lz.set_trusted_remote(&admin, remote, peer(ProtocolId::LayerZero)).unwrap();
    lz.set_router(&admin, Some(router_addr)).unwrap();
    celer.set_chain_mapping(&admin, remote, remote as u32).unwrap();
    celer.set_trusted_remote(&admin, remote, peer(ProtocolId::Celer)).unwrap();
    celer.set_router(&admin, Some(router_addr)).unwrap();
    hyper.set_chain_mapping(&admin, remote, remote as u32).unwrap();
    hyper.set_trusted_remote(&admin, remote, peer(ProtocolId::Hyperlane)).unwrap();
    hyper.set_router(&admin, Some(router_addr)).unwrap();

    let router = BridgeRouter::new(router_addr, admin, ledger.clone(), clock.clone());
    router.register_protocol(&admin, ProtocolId::LayerZero, lz.clone()).unwrap();
    router.register_protocol(&admin, ProtocolId::Celer, celer.clone()).unwrap();
    router.register_protocol(&admin, ProtocolId::Hyperlane, hyper.clone()).unwrap();
    for p in ProtocolId::ALL {
        router.set_chain_protocol_support(&admin, remote, p, true).unwrap();
    }
    Side { ledger, lz, celer, hyper, router }
}

fn world() -> World {
    let admin = Address::from_low_u64(1);
    let alice = Address::from_low_u64(0xa11ce);
    let bob = Address::from_low_u64(0xb0b);
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let transport = Arc::new(InMemoryTransport::new());
    let bsc = side(BSC, BASE, admin, &transport, &clock);
    let base = side(BASE, BSC, admin, &transport, &clock);
    bsc.ledger.issue(&admin, alice, 1_000_000).unwrap();

    let mut relay = Relay::new();
    relay.register(lz_eid(BSC), bsc.lz.clone());
    relay.register(BSC as u32, bsc.celer.clone());
    relay.register(BSC as u32, bsc.hyper.clone());
    relay.register(lz_eid(BASE), base.lz.clone());
    relay.register(BASE as u32, base.celer.clone());
    relay.register(BASE as u32, base.hyper.clone());
    assert_eq!(relay.len(), 6);

    World { admin, alice, bob, transport, relay, bsc, base }
}

fn total(w: &World) -> u128 {
    w.bsc.ledger.total_supply().unwrap() + w.base.ledger.total_supply().unwrap()
}

#[test]
fn every_protocol_conserves_supply_end_to_end() {
    let w = world();
    let params = BridgeParams::default();
    w.bsc.ledger.approve(w.alice, w.bsc.router.address(), 30_000).unwrap();

    for (i, p) in ProtocolId::ALL.into_iter().enumerate() {
        let quote = w.bsc.router.estimate_bridge_fee(p, BASE, w.bob, 10_000, &params).unwrap();
        let receipt = w
            .bsc
            .router
            .bridge(w.alice, p, BASE, w.bob, 10_000, &params, quote.fee)
            .unwrap();
        assert_eq!(receipt.protocol, p);
        assert_eq!(receipt.fee_refund, 0);

        // Burned on the source, not yet minted on the destination.
        assert_eq!(total(&w), 1_000_000 - 10_000);

        let report = w.relay.pump(&w.transport).unwrap();
        assert!(report.failed.is_empty());
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].transfer_id, receipt.transfer_id);
        assert_eq!(w.base.ledger.balance_of(&w.bob).unwrap(), 10_000 * (i as u128 + 1));
        assert_eq!(total(&w), 1_000_000);
    }
    assert_eq!(w.bsc.ledger.balance_of(&w.alice).unwrap(), 970_000);
    assert_eq!(w.bsc.ledger.balance_of(&w.bsc.router.address()).unwrap(), 0);
}

#[test]
fn round_trip_back_to_origin() {
    let w = world();
    let params = BridgeParams::default();
    w.bsc.ledger.approve(w.alice, w.bsc.lz.address(), 5_000).unwrap();
    w.bsc.lz.bridge(w.alice, BASE, w.bob, 5_000, &params, 100).unwrap();
    w.relay.pump(&w.transport).unwrap();

    w.base.ledger.approve(w.bob, w.base.router.address(), 2_000).unwrap();
    let r = w
        .base
        .router
        .bridge_auto(w.bob, BSC, w.alice, 2_000, &params, 1_000)
        .unwrap();
    // Celer at 10 bps clamps to its 20 minimum, the cheapest option.
    assert_eq!(r.protocol, ProtocolId::Celer);
    assert_eq!(r.fee_charged, 20);
    w.relay.pump(&w.transport).unwrap();

    assert_eq!(w.bsc.ledger.balance_of(&w.alice).unwrap(), 997_000);
    assert_eq!(w.base.ledger.balance_of(&w.bob).unwrap(), 3_000);
    assert_eq!(total(&w), 1_000_000);
}

#[test]
fn replayed_delivery_mints_once() {
    let w = world();
    w.bsc.ledger.approve(w.alice, w.bsc.hyper.address(), 700).unwrap();
    w.bsc
        .hyper
        .bridge(w.alice, BASE, w.bob, 700, &BridgeParams::default(), 100_000)
        .unwrap();
    let packets = w.transport.drain().unwrap();
    assert_eq!(packets.len(), 1);

    w.relay.deliver(&packets[0]).unwrap();
    let err = w.relay.deliver(&packets[0]).unwrap_err();
    match err {
        RelayError::Adapter(e) => assert_eq!(e.kind(), ErrorKind::Replay),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(w.base.ledger.balance_of(&w.bob).unwrap(), 700);
    assert!(w.base.hyper.is_processed(BSC, 1));
}

#[test]
fn untrusted_sender_cannot_mint() {
    let w = world();
    let forged = omnisupply::core::bridge::message::TransferMessage {
        origin_chain: BSC,
        destination_chain: BASE,
        nonce: 77,
        sender: w.alice,
        recipient: w.bob,
        amount: 1_000_000_000,
    };
    let delivery = InboundDelivery {
        protocol: ProtocolId::Celer,
        origin_domain: BSC as u32,
        sender: RemoteAddress::from_address(Address::from_low_u64(0xbad)),
        payload: forged.encode(),
    };
    let err = w.base.celer.receive(delivery).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Replay);
    assert_eq!(w.base.ledger.total_supply().unwrap(), 0);
    assert!(!w.base.celer.is_processed(BSC, 77));
}

#[test]
fn unsupported_destination_and_inactive_protocol() {
    let w = world();
    w.bsc.ledger.approve(w.alice, w.bsc.router.address(), 1_000).unwrap();
    let p = BridgeParams::default();
    let err = w
        .bsc
        .router
        .bridge(w.alice, ProtocolId::LayerZero, 137, w.bob, 1_000, &p, 1_000)
        .unwrap_err();
    assert!(matches!(err, RouterError::ChainNotSupported { chain: 137, .. }));
    assert!(w.bsc.router.get_bridge_options(137, Some(1_000)).unwrap().is_empty());

    w.bsc.router.update_protocol_status(&w.admin, ProtocolId::LayerZero, false).unwrap();
    let err = w
        .bsc
        .router
        .bridge(w.alice, ProtocolId::LayerZero, BASE, w.bob, 1_000, &p, 1_000)
        .unwrap_err();
    assert!(matches!(err, RouterError::ProtocolInactive(ProtocolId::LayerZero)));
    assert_eq!(w.bsc.ledger.balance_of(&w.alice).unwrap(), 1_000_000);
}

#[test]
fn transport_outage_leaves_balances_untouched() {
    let w = world();
    w.bsc.ledger.approve(w.alice, w.bsc.router.address(), 4_000).unwrap();
    w.transport.set_offline(true);
    let err = w
        .bsc
        .router
        .bridge(
            w.alice,
            ProtocolId::Hyperlane,
            BASE,
            w.bob,
            4_000,
            &BridgeParams::default(),
            100_000,
        )
        .unwrap_err();
    assert!(matches!(err, RouterError::Adapter(AdapterError::Transport(_))));
    assert_eq!(w.bsc.ledger.balance_of(&w.alice).unwrap(), 1_000_000);
    assert_eq!(w.bsc.ledger.balance_of(&w.bsc.router.address()).unwrap(), 0);
    assert_eq!(total(&w), 1_000_000);
    assert_eq!(w.transport.pending(), 0);
}

#[test]
fn misrouted_packet_is_refused_by_destination_check() {
    let w = world();
    w.bsc.ledger.approve(w.alice, w.bsc.lz.address(), 300).unwrap();
    w.bsc.lz.bridge(w.alice, BASE, w.bob, 300, &BridgeParams::default(), 100).unwrap();
    let mut packets = w.transport.drain().unwrap();
    let mut p: OutboundPacket = packets.remove(0);
    // Point it back at the source chain's own adapter.
    p.destination_domain = lz_eid(BSC);
    let err = w.relay.deliver(&p).unwrap_err();
    assert!(matches!(err, RelayError::Adapter(_)));
    assert_eq!(w.bsc.ledger.balance_of(&w.bob).unwrap(), 0);
}

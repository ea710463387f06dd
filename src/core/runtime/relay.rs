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

//! Off-chain relay for the in-memory transport.
//!
//! Routes each queued packet to the adapter registered for
//! `(protocol, destination_domain)` and hands it over as an inbound delivery.
//! Rejections are reported per packet; one bad packet never blocks the rest.

use crate::core::bridge::{
    adapter::{AdapterError, BridgeAdapter, InboundReceipt},
    transport::{InMemoryTransport, InboundDelivery, OutboundPacket, TransportError},
};
use crate::core::types::ProtocolId;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No adapter listens on this protocol and domain.
    #[error("no route for {protocol} domain {domain}")]
    NoRoute {
        /// Protocol.
        protocol: ProtocolId,
        /// Destination domain.
        domain: u32,
    },
    /// Destination adapter refused the delivery.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Outcome of one [`Relay::pump`].
#[derive(Debug, Default)]
pub struct RelayReport {
    /// Successful mints.
    pub delivered: Vec<InboundReceipt>,
    /// Packets that failed, with the reason.
    pub failed: Vec<(OutboundPacket, RelayError)>,
}

/// Packet router keyed by protocol and destination domain.
#[derive(Default)]
pub struct Relay {
    routes: BTreeMap<(ProtocolId, u32), Arc<dyn BridgeAdapter>>,
}

impl Relay {
    /// Empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route packets for `adapter.protocol()` addressed to `domain` to `adapter`.
    ///
    /// Returns the adapter previously registered for the slot, if any.
    pub fn register(
        &mut self,
        domain: u32,
        adapter: Arc<dyn BridgeAdapter>,
    ) -> Option<Arc<dyn BridgeAdapter>> {
        self.routes.insert((adapter.protocol(), domain), adapter)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Deliver one packet.
    pub fn deliver(&self, packet: &OutboundPacket) -> Result<InboundReceipt, RelayError> {
        let adapter = self
            .routes
            .get(&(packet.protocol, packet.destination_domain))
            .ok_or(RelayError::NoRoute {
                protocol: packet.protocol,
                domain: packet.destination_domain,
            })?;
        Ok(adapter.receive(InboundDelivery::from(packet))?)
    }

    /// Drain `transport` and deliver everything queued.
    pub fn pump(&self, transport: &InMemoryTransport) -> Result<RelayReport, TransportError> {
        let mut report = RelayReport::default();
        for packet in transport.drain()? {
            match self.deliver(&packet) {
                Ok(receipt) => {
                    debug!(
                        protocol = %packet.protocol,
                        transfer_id = ?receipt.transfer_id,
                        "relayed"
                    );
                    report.delivered.push(receipt);
                }
                Err(e) => {
                    warn!(
                        protocol = %packet.protocol,
                        domain = packet.destination_domain,
                        error = %e,
                        "relay delivery failed"
                    );
                    report.failed.push((packet, e));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{bridge::transport::Transport, types::RemoteAddress};

    #[test]
    fn unroutable_packets_are_reported() {
        let relay = Relay::new();
        let transport = InMemoryTransport::new();
        transport
            .send(OutboundPacket {
                protocol: ProtocolId::Celer,
                origin_domain: 56,
                destination_domain: 137,
                sender: RemoteAddress::default(),
                payload: vec![1, 2, 3],
                fee: 0,
            })
            .unwrap();
        let report = relay.pump(&transport).unwrap();
        assert!(report.delivered.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].1,
            RelayError::NoRoute { protocol: ProtocolId::Celer, domain: 137 }
        ));
        assert_eq!(transport.pending(), 0);
    }
}

// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0

//! Transport boundary: the opaque wire protocol beneath each adapter.
//!
//! Real LayerZero/Celer/Hyperlane endpoints are out of scope. Adapters hand an
//! [`OutboundPacket`] to a [`Transport`]; delivery on the far side arrives as
//! an [`InboundDelivery`] passed to the destination adapter's `receive`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use crate::core::types::{Amount, Classify, ErrorKind, ProtocolId, RemoteAddress};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport rejected packet: {0}")]
    Rejected(String),
    #[error("transport queue poisoned")]
    StatePoisoned,
}

impl Classify for TransportError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Message handed to the transport by a source-chain adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundPacket {
    pub protocol: ProtocolId,
    /// Transport-level id of the source chain (LayerZero eid, Hyperlane domain, Celer chain id).
    pub origin_domain: u32,
    pub destination_domain: u32,
    /// Sending adapter, bytes32 form.
    pub sender: RemoteAddress,
    pub payload: Vec<u8>,
    /// Native fee forwarded to the transport.
    pub fee: Amount,
}

/// Message delivered by the transport to a destination-chain adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundDelivery {
    pub protocol: ProtocolId,
    pub origin_domain: u32,
    pub sender: RemoteAddress,
    pub payload: Vec<u8>,
}

impl From<&OutboundPacket> for InboundDelivery {
    fn from(p: &OutboundPacket) -> Self {
        Self {
            protocol: p.protocol,
            origin_domain: p.origin_domain,
            sender: p.sender,
            payload: p.payload.clone(),
        }
    }
}

pub trait Transport: Send + Sync {
    /// Accept a packet for delivery, returning the transport's sequence number.
    fn send(&self, packet: OutboundPacket) -> Result<u64, TransportError>;
}

/// Queue-backed transport; packets wait until a relay drains them.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    queue: Mutex<VecDeque<OutboundPacket>>,
    sequence: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every `send` fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Take every queued packet.
    pub fn drain(&self) -> Result<Vec<OutboundPacket>, TransportError> {
        let mut q = self.queue.lock().map_err(|_| TransportError::StatePoisoned)?;
        Ok(q.drain(..).collect())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, packet: OutboundPacket) -> Result<u64, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("endpoint offline".to_string()));
        }
        let mut q = self.queue.lock().map_err(|_| TransportError::StatePoisoned)?;
        q.push_back(packet);
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

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

//! Burn-and-mint adapter, generic over the wire protocol.
//!
//! Outbound: validate, burn from the caller, hand the encoded transfer to the
//! transport. Inbound: trusted-remote check, strict decode, destination check,
//! replay check keyed by `(origin, nonce, local chain)`, then mint.
//!
//! Every adapter binds replay records to its local chain id, so a message
//! replayed against another deployment of the same adapter fails the
//! destination check and never shares a replay slot.

use crate::core::{
    access::{AccessControl, AccessError, Role},
    bridge::{
        ledger::{FungibleLedger, LedgerError},
        message::TransferMessage,
        protocols::{
            BridgeParams, Celer, FeeQuote, Hyperlane, LayerZero, ProtocolInfo, QuoteError,
            WireProtocol,
        },
        transport::{InboundDelivery, OutboundPacket, Transport, TransportError},
    },
    clock::Clock,
    oracle::emergency::{PauseError, Pausable},
    security::rate_limiter::{Consumption, OperationType, RateLimitError, RateLimiter},
    types::{
        Address, Amount, ChainId, Classify, CodecError, ErrorKind, ProtocolId, RemoteAddress, H256,
    },
};
use crate::monitoring::metrics::Metrics;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

/// LayerZero-style instance.
pub type LayerZeroAdapter = BurnMintAdapter<LayerZero>;
/// Celer-style instance.
pub type CelerAdapter = BurnMintAdapter<Celer>;
/// Hyperlane-style instance.
pub type HyperlaneAdapter = BurnMintAdapter<Hyperlane>;

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter is paused.
    #[error("adapter paused")]
    Paused,
    /// Zero amount.
    #[error("amount must be positive")]
    ZeroAmount,
    /// Zero recipient.
    #[error("recipient is the zero address")]
    ZeroRecipient,
    /// Zero or self address given where an external account is required.
    #[error("invalid target address {0}")]
    InvalidTarget(Address),
    /// Destination equals the local chain.
    #[error("destination {0} is the local chain")]
    SameChain(ChainId),
    /// No transport id configured for the chain.
    #[error("chain {0} has no transport mapping")]
    ChainNotMapped(ChainId),
    /// Transport id not mapped back to a chain.
    #[error("unknown origin domain {0}")]
    UnknownOrigin(u32),
    /// Transport id already mapped to another chain.
    #[error("domain {domain} already mapped to chain {chain}")]
    DomainInUse {
        /// Transport id.
        domain: u32,
        /// Chain holding it.
        chain: ChainId,
    },
    /// No trusted remote configured for the chain.
    #[error("no trusted remote for chain {0}")]
    NoTrustedRemote(ChainId),
    /// Trusted remote may not be all zeroes.
    #[error("trusted remote must be non-zero")]
    ZeroRemote,
    /// Delivery from a sender other than the trusted remote.
    #[error("untrusted sender for origin chain {0}")]
    UntrustedSender(ChainId),
    /// Delivery arrived through another protocol.
    #[error("delivery for {got} reached a {expected} adapter")]
    WrongProtocol {
        /// Adapter's protocol.
        expected: ProtocolId,
        /// Delivery's protocol.
        got: ProtocolId,
    },
    /// Decoded origin differs from the transport origin.
    #[error("payload origin {payload} does not match transport origin {transport}")]
    OriginMismatch {
        /// Chain in the payload.
        payload: ChainId,
        /// Chain resolved from the transport.
        transport: ChainId,
    },
    /// Message addressed to another chain.
    #[error("message for chain {got} delivered to chain {local}")]
    WrongDestination {
        /// Local chain.
        local: ChainId,
        /// Payload destination.
        got: ChainId,
    },
    /// `(origin, nonce, local chain)` already processed.
    #[error("message from chain {origin} nonce {nonce} already processed")]
    AlreadyProcessed {
        /// Origin chain.
        origin: ChainId,
        /// Origin nonce.
        nonce: u64,
    },
    /// Fee payment below quote.
    #[error("insufficient fee: required {required}, provided {provided}")]
    InsufficientFee {
        /// Quoted fee.
        required: Amount,
        /// Fee paid.
        provided: Amount,
    },
    /// Payload failed strict decoding.
    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),
    /// Fee model error.
    #[error(transparent)]
    Quote(#[from] QuoteError),
    /// Ledger refused the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Transport refused the packet.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Rate limiter refused the operation.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    /// Missing role.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Lock poisoned.
    #[error("adapter state poisoned")]
    StatePoisoned,
}

impl Classify for AdapterError {
    fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Paused => ErrorKind::Halted,
            AdapterError::ZeroAmount
            | AdapterError::ZeroRecipient
            | AdapterError::InvalidTarget(_)
            | AdapterError::SameChain(_)
            | AdapterError::ChainNotMapped(_)
            | AdapterError::UnknownOrigin(_)
            | AdapterError::DomainInUse { .. }
            | AdapterError::NoTrustedRemote(_)
            | AdapterError::ZeroRemote
            | AdapterError::WrongProtocol { .. }
            | AdapterError::InsufficientFee { .. }
            | AdapterError::Malformed(_)
            | AdapterError::Quote(_) => ErrorKind::Validation,
            AdapterError::UntrustedSender(_)
            | AdapterError::OriginMismatch { .. }
            | AdapterError::WrongDestination { .. }
            | AdapterError::AlreadyProcessed { .. } => ErrorKind::Replay,
            AdapterError::Ledger(e) => e.kind(),
            AdapterError::Transport(e) => e.kind(),
            AdapterError::RateLimit(e) => e.kind(),
            AdapterError::Access(e) => e.kind(),
            AdapterError::StatePoisoned => ErrorKind::Internal,
        }
    }
}

/// Result of an accepted outbound transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Transfer identifier.
    pub transfer_id: H256,
    /// Protocol used.
    pub protocol: ProtocolId,
    /// Outbound nonce assigned.
    pub nonce: u64,
    /// Destination chain.
    pub destination: ChainId,
    /// Amount burned.
    pub amount: Amount,
    /// Fee forwarded to the transport.
    pub fee_charged: Amount,
    /// Fee paid above the quote, returned to the payer.
    pub fee_refund: Amount,
}

/// Result of an accepted inbound delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundReceipt {
    /// Transfer identifier.
    pub transfer_id: H256,
    /// Origin chain.
    pub origin: ChainId,
    /// Origin nonce.
    pub nonce: u64,
    /// Minted-to account.
    pub recipient: Address,
    /// Amount minted.
    pub amount: Amount,
}

/// Uniform adapter surface used by the router.
pub trait BridgeAdapter: Pausable {
    /// Protocol id.
    fn protocol(&self) -> ProtocolId;
    /// Adapter account on the local ledger.
    fn address(&self) -> Address;
    /// Chain the adapter is deployed on.
    fn local_chain(&self) -> ChainId;
    /// Static protocol facts.
    fn info(&self) -> ProtocolInfo;
    /// Burn `amount` from `caller` and dispatch it to `destination`.
    fn bridge(
        &self,
        caller: Address,
        destination: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
        fee_paid: Amount,
    ) -> Result<TransferReceipt, AdapterError>;
    /// Fee for a transfer; read-only.
    fn estimate_fee(
        &self,
        destination: ChainId,
        amount: Amount,
        params: &BridgeParams,
    ) -> Result<FeeQuote, AdapterError>;
    /// Verify and mint an inbound delivery.
    fn receive(&self, delivery: InboundDelivery) -> Result<InboundReceipt, AdapterError>;
    /// True when `destination` has both a transport mapping and a trusted remote.
    fn supports_chain(&self, destination: ChainId) -> bool;
}

/// Replay slot of an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplayKey {
    /// Origin chain.
    pub origin: ChainId,
    /// Origin nonce.
    pub nonce: u64,
    /// Local chain the message was accepted on.
    pub local: ChainId,
}

struct AdapterState<W: WireProtocol> {
    wire: W,
    access: AccessControl,
    paused: bool,
    chain_to_domain: BTreeMap<ChainId, u32>,
    domain_to_chain: BTreeMap<u32, ChainId>,
    trusted_remotes: BTreeMap<ChainId, RemoteAddress>,
    outbound_nonce: u64,
    processed: BTreeSet<ReplayKey>,
    router: Option<Address>,
    limiter: Option<Arc<RateLimiter>>,
}

/// Burn-and-mint adapter for wire protocol `W`.
pub struct BurnMintAdapter<W: WireProtocol> {
    address: Address,
    local_chain: ChainId,
    local_domain: u32,
    ledger: Arc<dyn FungibleLedger>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
    state: Mutex<AdapterState<W>>,
}

impl<W: WireProtocol> BurnMintAdapter<W> {
    /// Create an active adapter administered by `admin`.
    ///
    /// `local_domain` is this chain's transport-level id, stamped on outbound packets.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        admin: Address,
        local_domain: u32,
        wire: W,
        ledger: Arc<dyn FungibleLedger>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AdapterError> {
        if address.is_zero() {
            return Err(AdapterError::InvalidTarget(address));
        }
        wire.validate()?;
        let local_chain = ledger.chain_id();
        Ok(Self {
            address,
            local_chain,
            local_domain,
            ledger,
            transport,
            clock,
            metrics: None,
            state: Mutex::new(AdapterState {
                wire,
                access: AccessControl::with_admin(admin),
                paused: false,
                chain_to_domain: BTreeMap::new(),
                domain_to_chain: BTreeMap::new(),
                trusted_remotes: BTreeMap::new(),
                outbound_nonce: 0,
                processed: BTreeSet::new(),
                router: None,
                limiter: None,
            }),
        })
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, AdapterState<W>>, AdapterError> {
        self.state.lock().map_err(|_| AdapterError::StatePoisoned)
    }

    /// Admin: map `chain` to its transport-level id.
    pub fn set_chain_mapping(
        &self,
        caller: &Address,
        chain: ChainId,
        domain: u32,
    ) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if chain == self.local_chain {
            return Err(AdapterError::SameChain(chain));
        }
        if let Some(&holder) = st.domain_to_chain.get(&domain) {
            if holder != chain {
                return Err(AdapterError::DomainInUse { domain, chain: holder });
            }
        }
        if let Some(old) = st.chain_to_domain.insert(chain, domain) {
            st.domain_to_chain.remove(&old);
        }
        st.domain_to_chain.insert(domain, chain);
        debug!(protocol = %W::ID, chain, domain, "chain mapping set");
        Ok(())
    }

    /// Admin: set the only sender accepted from `chain`.
    pub fn set_trusted_remote(
        &self,
        caller: &Address,
        chain: ChainId,
        remote: RemoteAddress,
    ) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if remote.is_zero() {
            return Err(AdapterError::ZeroRemote);
        }
        st.trusted_remotes.insert(chain, remote);
        info!(protocol = %W::ID, chain, "trusted remote set");
        Ok(())
    }

    /// Admin: router whose calls are already rate limited upstream.
    pub fn set_router(
        &self,
        caller: &Address,
        router: Option<Address>,
    ) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        st.router = router;
        Ok(())
    }

    /// Admin: limiter consulted for direct (non-router) outbound calls.
    pub fn set_rate_limiter(
        &self,
        caller: &Address,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        st.limiter = limiter;
        Ok(())
    }

    /// Admin: replace the fee parameters.
    pub fn set_wire_config(&self, caller: &Address, wire: W) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        wire.validate()?;
        st.wire = wire;
        Ok(())
    }

    /// Admin: grant a role on this adapter.
    pub fn grant_role(
        &self,
        caller: &Address,
        role: Role,
        who: Address,
    ) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.grant(caller, role, who)?;
        Ok(())
    }

    /// Operator: pause for maintenance.
    pub fn pause(&self, caller: &Address) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Operator, caller)?;
        st.paused = true;
        info!(protocol = %W::ID, chain = self.local_chain, "adapter paused");
        Ok(())
    }

    /// Operator: resume.
    pub fn unpause(&self, caller: &Address) -> Result<(), AdapterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Operator, caller)?;
        st.paused = false;
        info!(protocol = %W::ID, chain = self.local_chain, "adapter unpaused");
        Ok(())
    }

    /// Admin: move tokens held by the adapter account. Fails unless the full
    /// amount moves.
    pub fn emergency_withdraw(
        &self,
        caller: &Address,
        token: &dyn FungibleLedger,
        to: Address,
        amount: Amount,
    ) -> Result<(), AdapterError> {
        let st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if to.is_zero() || to == self.address {
            return Err(AdapterError::InvalidTarget(to));
        }
        if amount == 0 {
            return Err(AdapterError::ZeroAmount);
        }
        token.transfer(self.address, to, amount)?;
        warn!(protocol = %W::ID, %to, amount, "emergency withdrawal");
        Ok(())
    }

    /// True if the inbound slot has been consumed.
    pub fn is_processed(&self, origin: ChainId, nonce: u64) -> bool {
        self.lock()
            .map(|st| st.processed.contains(&ReplayKey { origin, nonce, local: self.local_chain }))
            .unwrap_or(false)
    }

    /// Last outbound nonce used.
    pub fn outbound_nonce(&self) -> u64 {
        self.lock().map(|st| st.outbound_nonce).unwrap_or(0)
    }

    /// Trusted remote for `chain`, if any.
    pub fn trusted_remote(&self, chain: ChainId) -> Option<RemoteAddress> {
        self.lock().ok().and_then(|st| st.trusted_remotes.get(&chain).copied())
    }

    fn reject_replay(&self, err: AdapterError) -> AdapterError {
        warn!(
            target: "security",
            protocol = %W::ID,
            chain = self.local_chain,
            error = %err,
            "inbound message rejected"
        );
        if let Some(m) = &self.metrics {
            m.replay_rejected_total.inc();
        }
        err
    }

    fn refund_consumption(limiter: Option<&Arc<RateLimiter>>, consumption: Option<&Consumption>) {
        if let (Some(l), Some(c)) = (limiter, consumption) {
            if let Err(e) = l.refund(c) {
                warn!(error = %e, "rate limit refund failed");
            }
        }
    }
}

impl<W: WireProtocol> Pausable for BurnMintAdapter<W> {
    fn pause_for(&self, by: Address, reason: &str) -> Result<(), PauseError> {
        let mut st = self
            .state
            .lock()
            .map_err(|_| PauseError::Failed("adapter state poisoned".to_string()))?;
        if !st.access.has_role(Role::Operator, &by) && !st.access.has_role(Role::Emergency, &by) {
            return Err(PauseError::Unauthorized(by));
        }
        st.paused = true;
        warn!(
            protocol = %W::ID,
            chain = self.local_chain,
            %by,
            reason,
            "adapter paused by external request"
        );
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.state.lock().map(|st| st.paused).unwrap_or(true)
    }
}

impl<W: WireProtocol> BridgeAdapter for BurnMintAdapter<W> {
    fn protocol(&self) -> ProtocolId {
        W::ID
    }

    fn address(&self) -> Address {
        self.address
    }

    fn local_chain(&self) -> ChainId {
        self.local_chain
    }

    fn info(&self) -> ProtocolInfo {
        W::info()
    }

    fn bridge(
        &self,
        caller: Address,
        destination: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
        fee_paid: Amount,
    ) -> Result<TransferReceipt, AdapterError> {
        let mut st = self.lock()?;
        if st.paused {
            return Err(AdapterError::Paused);
        }
        if amount == 0 {
            return Err(AdapterError::ZeroAmount);
        }
        if recipient.is_zero() {
            return Err(AdapterError::ZeroRecipient);
        }
        if destination == self.local_chain {
            return Err(AdapterError::SameChain(destination));
        }
        let domain = *st
            .chain_to_domain
            .get(&destination)
            .ok_or(AdapterError::ChainNotMapped(destination))?;
        if !st.trusted_remotes.contains_key(&destination) {
            return Err(AdapterError::NoTrustedRemote(destination));
        }
        let fee = st.wire.quote(destination, amount, params)?;
        if fee_paid < fee {
            return Err(AdapterError::InsufficientFee { required: fee, provided: fee_paid });
        }

        let limiter = st.limiter.clone();
        let consumption = match (&limiter, st.router) {
            (Some(l), router) if router != Some(caller) => {
                let now = self.clock.now();
                let r = l.check_and_consume(caller, OperationType::Bridge, amount, now);
                if r.is_err() {
                    if let Some(m) = &self.metrics {
                        m.rate_limited_total.inc();
                    }
                }
                Some(r?)
            }
            _ => None,
        };

        let nonce = st.outbound_nonce + 1;
        let msg = TransferMessage {
            origin_chain: self.local_chain,
            destination_chain: destination,
            nonce,
            sender: caller,
            recipient,
            amount,
        };

        if let Err(e) = self.ledger.burn_from(self.address, caller, amount) {
            Self::refund_consumption(limiter.as_ref(), consumption.as_ref());
            return Err(e.into());
        }

        let packet = OutboundPacket {
            protocol: W::ID,
            origin_domain: self.local_domain,
            destination_domain: domain,
            sender: RemoteAddress::from_address(self.address),
            payload: msg.encode(),
            fee,
        };
        if let Err(e) = self.transport.send(packet) {
            // Restore the burned amount; the burn consumed the caller's approval,
            // so the re-mint goes straight back to the caller.
            if let Err(me) = self.ledger.mint(self.address, caller, amount) {
                warn!(
                    error = %me,
                    %caller,
                    amount,
                    "failed to restore burned amount after transport error"
                );
            }
            Self::refund_consumption(limiter.as_ref(), consumption.as_ref());
            return Err(e.into());
        }

        st.outbound_nonce = nonce;
        let transfer_id = msg.transfer_id(W::ID);
        if let Some(m) = &self.metrics {
            m.bridge_outbound_total.with_label_values(&[&W::ID.to_string()]).inc();
        }
        info!(
            protocol = %W::ID,
            from_chain = self.local_chain,
            to_chain = destination,
            nonce,
            amount,
            %recipient,
            transfer_id = %transfer_id,
            "bridge transfer dispatched"
        );
        Ok(TransferReceipt {
            transfer_id,
            protocol: W::ID,
            nonce,
            destination,
            amount,
            fee_charged: fee,
            fee_refund: fee_paid - fee,
        })
    }

    fn estimate_fee(
        &self,
        destination: ChainId,
        amount: Amount,
        params: &BridgeParams,
    ) -> Result<FeeQuote, AdapterError> {
        let st = self.lock()?;
        if !st.chain_to_domain.contains_key(&destination) {
            return Err(AdapterError::ChainNotMapped(destination));
        }
        let fee = st.wire.quote(destination, amount, params)?;
        Ok(FeeQuote { fee, info: W::info() })
    }

    fn receive(&self, delivery: InboundDelivery) -> Result<InboundReceipt, AdapterError> {
        let mut st = self.lock()?;
        if st.paused {
            return Err(AdapterError::Paused);
        }
        if delivery.protocol != W::ID {
            return Err(AdapterError::WrongProtocol { expected: W::ID, got: delivery.protocol });
        }
        let origin = *st
            .domain_to_chain
            .get(&delivery.origin_domain)
            .ok_or(AdapterError::UnknownOrigin(delivery.origin_domain))?;
        let trusted = st.trusted_remotes.get(&origin).ok_or(AdapterError::NoTrustedRemote(origin))?;
        if !bool::from(trusted.0.ct_eq(&delivery.sender.0)) {
            return Err(self.reject_replay(AdapterError::UntrustedSender(origin)));
        }

        let msg = TransferMessage::decode(&delivery.payload)?;
        if msg.origin_chain != origin {
            return Err(self.reject_replay(AdapterError::OriginMismatch {
                payload: msg.origin_chain,
                transport: origin,
            }));
        }
        if msg.destination_chain != self.local_chain {
            return Err(self.reject_replay(AdapterError::WrongDestination {
                local: self.local_chain,
                got: msg.destination_chain,
            }));
        }
        let key = ReplayKey { origin, nonce: msg.nonce, local: self.local_chain };
        if st.processed.contains(&key) {
            return Err(self.reject_replay(AdapterError::AlreadyProcessed {
                origin,
                nonce: msg.nonce,
            }));
        }
        if msg.recipient.is_zero() {
            return Err(AdapterError::ZeroRecipient);
        }
        if msg.amount == 0 {
            return Err(AdapterError::ZeroAmount);
        }

        st.processed.insert(key);
        if let Err(e) = self.ledger.mint(self.address, msg.recipient, msg.amount) {
            st.processed.remove(&key);
            return Err(e.into());
        }

        let transfer_id = msg.transfer_id(W::ID);
        if let Some(m) = &self.metrics {
            m.bridge_inbound_total.with_label_values(&[&W::ID.to_string()]).inc();
        }
        info!(
            protocol = %W::ID,
            from_chain = origin,
            to_chain = self.local_chain,
            nonce = msg.nonce,
            amount = msg.amount,
            recipient = %msg.recipient,
            "inbound transfer minted"
        );
        Ok(InboundReceipt {
            transfer_id,
            origin,
            nonce: msg.nonce,
            recipient: msg.recipient,
            amount: msg.amount,
        })
    }

    fn supports_chain(&self, destination: ChainId) -> bool {
        self.lock()
            .map(|st| {
                st.chain_to_domain.contains_key(&destination)
                    && st.trusted_remotes.contains_key(&destination)
            })
            .unwrap_or(false)
    }
}

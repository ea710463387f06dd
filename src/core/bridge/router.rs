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

//! Protocol registry and single entry point for outbound transfers.
//!
//! A transfer moves the caller's tokens into router custody, approves the
//! selected adapter, and lets the adapter burn from custody. Afterwards the
//! approval must be spent and custody back at its prior balance. Any failure
//! after custody is taken is compensated: approval cleared, custody returned,
//! rate-limit consumption refunded.
//!
//! Lock order: router state, then adapter state, then ledger. The router lock
//! is held across the whole custody-then-burn sequence.

use crate::core::{
    access::{AccessControl, AccessError, Role},
    bridge::{
        adapter::{AdapterError, BridgeAdapter, TransferReceipt},
        ledger::{FungibleLedger, LedgerError},
        protocols::{BridgeParams, FeeQuote, TrustModel},
    },
    clock::Clock,
    oracle::emergency::{PauseError, Pausable},
    security::rate_limiter::{Consumption, OperationType, RateLimitError, RateLimiter},
    types::{Address, Amount, ChainId, Classify, ErrorKind, ProtocolId, SecurityLevel},
};
use crate::monitoring::metrics::Metrics;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Router paused.
    #[error("router paused")]
    Paused,
    /// No adapter registered.
    #[error("protocol {0} not registered")]
    ProtocolNotRegistered(ProtocolId),
    /// Registered but deactivated.
    #[error("protocol {0} inactive")]
    ProtocolInactive(ProtocolId),
    /// Adapter reports a different protocol than it is registered under.
    #[error("adapter speaks {got}, registered as {expected}")]
    ProtocolMismatch {
        /// Registration key.
        expected: ProtocolId,
        /// Adapter's protocol.
        got: ProtocolId,
    },
    /// Pair not enabled.
    #[error("chain {chain} not supported by {protocol}")]
    ChainNotSupported {
        /// Destination.
        chain: ChainId,
        /// Protocol.
        protocol: ProtocolId,
    },
    /// Chain id 0.
    #[error("invalid chain id")]
    InvalidChain,
    /// Nothing usable for the chain.
    #[error("no available protocol for chain {0}")]
    NoAvailableProtocol(ChainId),
    /// Zero amount.
    #[error("amount must be positive")]
    ZeroAmount,
    /// Zero recipient.
    #[error("recipient is the zero address")]
    ZeroRecipient,
    /// Balance below amount.
    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Amount.
        needed: Amount,
        /// Balance.
        available: Amount,
    },
    /// Allowance to the router below amount.
    #[error("insufficient allowance: needed {needed}, available {available}")]
    InsufficientAllowance {
        /// Amount.
        needed: Amount,
        /// Allowance.
        available: Amount,
    },
    /// Fee payment below quote.
    #[error("insufficient fee: required {required}, provided {provided}")]
    InsufficientFee {
        /// Quote.
        required: Amount,
        /// Paid.
        provided: Amount,
    },
    /// Adapter returned success without burning from custody.
    #[error("adapter did not burn the custodied amount")]
    AdapterDidNotBurn,
    /// Adapter failure.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// Rate limiter refusal.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Missing role.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// Lock poisoned.
    #[error("router state poisoned")]
    StatePoisoned,
}

impl Classify for RouterError {
    fn kind(&self) -> ErrorKind {
        match self {
            RouterError::Paused => ErrorKind::Halted,
            RouterError::AdapterDidNotBurn => ErrorKind::InvariantViolation,
            RouterError::Adapter(e) => e.kind(),
            RouterError::RateLimit(e) => e.kind(),
            RouterError::Ledger(e) => e.kind(),
            RouterError::Access(e) => e.kind(),
            RouterError::StatePoisoned => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }
}

/// Registry entry.
#[derive(Clone)]
pub struct ProtocolRegistration {
    /// Adapter handle.
    pub adapter: Arc<dyn BridgeAdapter>,
    /// Router-level switch, independent of the adapter's own pause.
    pub active: bool,
}

/// One row of [`BridgeRouter::get_bridge_options`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BridgeOption {
    /// Protocol.
    pub protocol: ProtocolId,
    /// Usable right now for this chain.
    pub available: bool,
    /// Quoted fee, when a quote could be produced.
    pub fee: Option<Amount>,
    /// Typical delivery time.
    pub delivery_secs: u64,
    /// Security tag.
    pub security_level: SecurityLevel,
    /// Trust model.
    pub trust_model: TrustModel,
}

struct RouterState {
    access: AccessControl,
    paused: bool,
    protocols: BTreeMap<ProtocolId, ProtocolRegistration>,
    support: BTreeSet<(ChainId, ProtocolId)>,
    default_protocol: Option<ProtocolId>,
}

/// Outbound router.
pub struct BridgeRouter {
    address: Address,
    ledger: Arc<dyn FungibleLedger>,
    limiter: Option<Arc<RateLimiter>>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
    state: Mutex<RouterState>,
}

impl BridgeRouter {
    /// Router at `address` on `ledger`, administered by `admin`.
    pub fn new(
        address: Address,
        admin: Address,
        ledger: Arc<dyn FungibleLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            ledger,
            limiter: None,
            clock,
            metrics: None,
            state: Mutex::new(RouterState {
                access: AccessControl::with_admin(admin),
                paused: false,
                protocols: BTreeMap::new(),
                support: BTreeSet::new(),
                default_protocol: None,
            }),
        }
    }

    /// Consult `limiter` on every transfer.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Custody account.
    pub fn address(&self) -> Address {
        self.address
    }

    fn lock(&self) -> Result<MutexGuard<'_, RouterState>, RouterError> {
        self.state.lock().map_err(|_| RouterError::StatePoisoned)
    }

    // ---- administration ----

    /// Admin: register or replace the adapter for `protocol`; (re-)activates it.
    pub fn register_protocol(
        &self,
        caller: &Address,
        protocol: ProtocolId,
        adapter: Arc<dyn BridgeAdapter>,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if adapter.protocol() != protocol {
            return Err(RouterError::ProtocolMismatch {
                expected: protocol,
                got: adapter.protocol(),
            });
        }
        let address = adapter.address();
        st.protocols.insert(protocol, ProtocolRegistration { adapter, active: true });
        info!(%protocol, %address, "protocol registered");
        Ok(())
    }

    /// Admin: toggle a registered protocol. Chain support is untouched.
    pub fn update_protocol_status(
        &self,
        caller: &Address,
        protocol: ProtocolId,
        active: bool,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        let reg = st
            .protocols
            .get_mut(&protocol)
            .ok_or(RouterError::ProtocolNotRegistered(protocol))?;
        reg.active = active;
        info!(%protocol, active, "protocol status updated");
        Ok(())
    }

    /// Admin: enable or disable `(chain, protocol)`.
    pub fn set_chain_protocol_support(
        &self,
        caller: &Address,
        chain: ChainId,
        protocol: ProtocolId,
        supported: bool,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if chain == 0 {
            return Err(RouterError::InvalidChain);
        }
        if supported {
            st.support.insert((chain, protocol));
        } else {
            st.support.remove(&(chain, protocol));
        }
        debug!(chain, %protocol, supported, "chain support updated");
        Ok(())
    }

    /// Admin: protocol preferred by [`BridgeRouter::bridge_auto`].
    pub fn set_default_protocol(
        &self,
        caller: &Address,
        protocol: Option<ProtocolId>,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Admin, caller)?;
        if let Some(p) = protocol {
            if !st.protocols.contains_key(&p) {
                return Err(RouterError::ProtocolNotRegistered(p));
            }
        }
        st.default_protocol = protocol;
        Ok(())
    }

    /// Admin: grant a role.
    pub fn grant_role(
        &self,
        caller: &Address,
        role: Role,
        who: Address,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.grant(caller, role, who)?;
        Ok(())
    }

    /// Admin: revoke a role.
    pub fn revoke_role(
        &self,
        caller: &Address,
        role: Role,
        who: &Address,
    ) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.revoke(caller, role, who)?;
        Ok(())
    }

    /// Operator: halt transfers.
    pub fn pause(&self, caller: &Address) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Operator, caller)?;
        st.paused = true;
        info!("router paused");
        Ok(())
    }

    /// Operator: resume transfers.
    pub fn unpause(&self, caller: &Address) -> Result<(), RouterError> {
        let mut st = self.lock()?;
        st.access.require(Role::Operator, caller)?;
        st.paused = false;
        info!("router unpaused");
        Ok(())
    }

    // ---- reads ----

    /// True if `(chain, protocol)` is enabled.
    pub fn supports(&self, chain: ChainId, protocol: ProtocolId) -> bool {
        self.lock().map(|st| st.support.contains(&(chain, protocol))).unwrap_or(false)
    }

    /// Registry status of `protocol`: `None` when unregistered.
    pub fn protocol_active(&self, protocol: ProtocolId) -> Option<bool> {
        self.lock().ok().and_then(|st| st.protocols.get(&protocol).map(|r| r.active))
    }

    /// Current default.
    pub fn default_protocol(&self) -> Option<ProtocolId> {
        self.lock().ok().and_then(|st| st.default_protocol)
    }

    /// One row per registered protocol; empty when no protocol supports `chain`.
    pub fn get_bridge_options(
        &self,
        chain: ChainId,
        amount: Option<Amount>,
    ) -> Result<Vec<BridgeOption>, RouterError> {
        let st = self.lock()?;
        Ok(Self::options_locked(&st, chain, amount))
    }

    fn options_locked(
        st: &RouterState,
        chain: ChainId,
        amount: Option<Amount>,
    ) -> Vec<BridgeOption> {
        if !st.support.iter().any(|(c, _)| *c == chain) {
            return Vec::new();
        }
        let params = BridgeParams::default();
        st.protocols
            .iter()
            .map(|(pid, reg)| {
                let info = reg.adapter.info();
                let supported = st.support.contains(&(chain, *pid));
                let fee = if supported {
                    reg.adapter
                        .estimate_fee(chain, amount.unwrap_or(0), &params)
                        .ok()
                        .map(|q| q.fee)
                } else {
                    None
                };
                let available = reg.active
                    && supported
                    && !st.paused
                    && !reg.adapter.is_paused()
                    && fee.is_some();
                BridgeOption {
                    protocol: *pid,
                    available,
                    fee,
                    delivery_secs: info.delivery_secs,
                    security_level: info.security_level,
                    trust_model: info.trust_model,
                }
            })
            .collect()
    }

    /// Cheapest available protocol; ties go to the higher security level.
    pub fn optimal_protocol(
        &self,
        chain: ChainId,
        amount: Amount,
    ) -> Result<Option<ProtocolId>, RouterError> {
        let options = self.get_bridge_options(chain, Some(amount))?;
        Ok(Self::cheapest(&options))
    }

    fn cheapest(options: &[BridgeOption]) -> Option<ProtocolId> {
        options
            .iter()
            .filter(|o| o.available)
            .filter_map(|o| o.fee.map(|f| (f, o.security_level, o.protocol)))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, _, p)| p)
    }

    /// Fee quote from the adapter; read-only.
    pub fn estimate_bridge_fee(
        &self,
        protocol: ProtocolId,
        chain: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
    ) -> Result<FeeQuote, RouterError> {
        if recipient.is_zero() {
            return Err(RouterError::ZeroRecipient);
        }
        let adapter = {
            let st = self.lock()?;
            let reg = st
                .protocols
                .get(&protocol)
                .ok_or(RouterError::ProtocolNotRegistered(protocol))?;
            reg.adapter.clone()
        };
        Ok(adapter.estimate_fee(chain, amount, params)?)
    }

    // ---- transfers ----

    /// Transfer `amount` from `caller` to `recipient` on `destination` over `protocol`.
    ///
    /// `fee_paid` must cover the quote; the excess is reported in `fee_refund`.
    #[allow(clippy::too_many_arguments)]
    pub fn bridge(
        &self,
        caller: Address,
        protocol: ProtocolId,
        destination: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
        fee_paid: Amount,
    ) -> Result<TransferReceipt, RouterError> {
        let st = self.lock()?;
        if st.paused {
            return Err(RouterError::Paused);
        }
        let reg = st.protocols.get(&protocol).ok_or(RouterError::ProtocolNotRegistered(protocol))?;
        if !reg.active {
            return Err(RouterError::ProtocolInactive(protocol));
        }
        if !st.support.contains(&(destination, protocol)) {
            return Err(RouterError::ChainNotSupported { chain: destination, protocol });
        }
        if amount == 0 {
            return Err(RouterError::ZeroAmount);
        }
        if recipient.is_zero() {
            return Err(RouterError::ZeroRecipient);
        }
        let balance = self.ledger.balance_of(&caller)?;
        if balance < amount {
            return Err(RouterError::InsufficientBalance { needed: amount, available: balance });
        }
        let allowance = self.ledger.allowance(&caller, &self.address)?;
        if allowance < amount {
            return Err(RouterError::InsufficientAllowance { needed: amount, available: allowance });
        }
        let adapter = reg.adapter.clone();
        let quote = adapter.estimate_fee(destination, amount, params)?;
        if fee_paid < quote.fee {
            return Err(RouterError::InsufficientFee { required: quote.fee, provided: fee_paid });
        }

        let consumption = match &self.limiter {
            Some(l) => match l.check_and_consume(
                caller,
                OperationType::Bridge,
                amount,
                self.clock.now(),
            ) {
                Ok(c) => Some(c),
                Err(e) => {
                    debug!(%caller, amount, error = %e, "bridge rate limited");
                    if let Some(m) = &self.metrics {
                        m.rate_limited_total.inc();
                    }
                    return Err(e.into());
                }
            },
            None => None,
        };

        let custody_before = match self.ledger.balance_of(&self.address) {
            Ok(b) => b,
            Err(e) => {
                self.refund(consumption.as_ref());
                return Err(e.into());
            }
        };
        if let Err(e) = self.ledger.transfer_from(self.address, caller, self.address, amount) {
            self.refund(consumption.as_ref());
            return Err(e.into());
        }

        match self.dispatch(
            adapter.as_ref(),
            custody_before,
            destination,
            recipient,
            amount,
            params,
            quote.fee,
        ) {
            Ok(mut receipt) => {
                receipt.fee_charged = quote.fee;
                receipt.fee_refund = fee_paid - quote.fee;
                info!(
                    %caller,
                    %protocol,
                    to_chain = destination,
                    amount,
                    transfer_id = %receipt.transfer_id,
                    "routed bridge transfer"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    %caller,
                    %protocol,
                    to_chain = destination,
                    amount,
                    error = %e,
                    "bridge failed; compensating"
                );
                self.compensate(adapter.as_ref(), caller, custody_before);
                self.refund(consumption.as_ref());
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        adapter: &dyn BridgeAdapter,
        custody_before: Amount,
        destination: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
        fee: Amount,
    ) -> Result<TransferReceipt, RouterError> {
        let spender = adapter.address();
        self.ledger.approve(self.address, spender, amount)?;
        let receipt = adapter.bridge(self.address, destination, recipient, amount, params, fee)?;
        let leftover = self.ledger.allowance(&self.address, &spender)?;
        let custody_after = self.ledger.balance_of(&self.address)?;
        if leftover != 0 || custody_after != custody_before {
            warn!(
                target: "security",
                adapter = %spender,
                leftover,
                custody_before,
                custody_after,
                "adapter left custody unbalanced"
            );
            return Err(RouterError::AdapterDidNotBurn);
        }
        Ok(receipt)
    }

    fn compensate(&self, adapter: &dyn BridgeAdapter, caller: Address, custody_before: Amount) {
        if let Err(e) = self.ledger.approve(self.address, adapter.address(), 0) {
            warn!(error = %e, "failed to clear adapter approval");
        }
        match self.ledger.balance_of(&self.address) {
            Ok(now) if now > custody_before => {
                if let Err(e) = self.ledger.transfer(self.address, caller, now - custody_before) {
                    warn!(%caller, error = %e, "failed to return custody");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read custody balance"),
        }
    }

    fn refund(&self, consumption: Option<&Consumption>) {
        if let (Some(l), Some(c)) = (&self.limiter, consumption) {
            if let Err(e) = l.refund(c) {
                warn!(error = %e, "rate limit refund failed");
            }
        }
    }

    /// Transfer over the default protocol when it is available for
    /// `destination`, otherwise over the cheapest available one.
    pub fn bridge_auto(
        &self,
        caller: Address,
        destination: ChainId,
        recipient: Address,
        amount: Amount,
        params: &BridgeParams,
        fee_paid: Amount,
    ) -> Result<TransferReceipt, RouterError> {
        let protocol = {
            let st = self.lock()?;
            let options = Self::options_locked(&st, destination, Some(amount));
            let default_ok = st
                .default_protocol
                .filter(|d| options.iter().any(|o| o.protocol == *d && o.available));
            default_ok
                .or_else(|| Self::cheapest(&options))
                .ok_or(RouterError::NoAvailableProtocol(destination))?
        };
        self.bridge(caller, protocol, destination, recipient, amount, params, fee_paid)
    }
}

impl Pausable for BridgeRouter {
    fn pause_for(&self, by: Address, reason: &str) -> Result<(), PauseError> {
        let mut st = self
            .state
            .lock()
            .map_err(|_| PauseError::Failed("router state poisoned".to_string()))?;
        if !st.access.has_role(Role::Operator, &by) && !st.access.has_role(Role::Emergency, &by) {
            return Err(PauseError::Unauthorized(by));
        }
        st.paused = true;
        warn!(%by, reason, "router paused by external request");
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.state.lock().map(|st| st.paused).unwrap_or(true)
    }
}

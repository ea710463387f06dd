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

//! Fungible-balance ledger boundary.
//!
//! The token's own bookkeeping lives outside this crate; adapters and the
//! router only see [`FungibleLedger`]. [`InMemoryLedger`] is the reference
//! implementation used by the simulation harness and the tests.

use crate::core::types::{Address, Amount, ChainId, Classify, ErrorKind};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};
use thiserror::Error;

/// Ledger errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Balance too low.
    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Requested amount.
        needed: Amount,
        /// Current balance.
        available: Amount,
    },
    /// Allowance too low.
    #[error("insufficient allowance: needed {needed}, available {available}")]
    InsufficientAllowance {
        /// Requested amount.
        needed: Amount,
        /// Current allowance.
        available: Amount,
    },
    /// Caller may not mint or burn.
    #[error("account {0} is not an authorized bridge")]
    NotBridge(Address),
    /// Caller is not the ledger owner.
    #[error("account {0} is not the ledger owner")]
    NotOwner(Address),
    /// Transfers to or from the zero address.
    #[error("zero address")]
    ZeroAddress,
    /// Supply would overflow.
    #[error("supply overflow")]
    Overflow,
    /// Lock poisoned.
    #[error("ledger state poisoned")]
    StatePoisoned,
}

impl Classify for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotBridge(_) | LedgerError::NotOwner(_) => ErrorKind::Authorization,
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientAllowance { .. }
            | LedgerError::ZeroAddress => ErrorKind::Validation,
            LedgerError::Overflow => ErrorKind::InvariantViolation,
            LedgerError::StatePoisoned => ErrorKind::Internal,
        }
    }
}

/// Operations the bridge core needs from a token ledger.
pub trait FungibleLedger: Send + Sync {
    /// Chain this ledger lives on.
    fn chain_id(&self) -> ChainId;
    /// Balance of `who`.
    fn balance_of(&self, who: &Address) -> Result<Amount, LedgerError>;
    /// Amount `spender` may move on behalf of `owner`.
    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, LedgerError>;
    /// Total minted minus burned on this chain.
    fn total_supply(&self) -> Result<Amount, LedgerError>;
    /// Set (not add to) `spender`'s allowance over `owner`'s funds.
    fn approve(&self, owner: Address, spender: Address, amount: Amount) -> Result<(), LedgerError>;
    /// Move `amount` from `from` to `to`. Fails rather than moving less.
    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError>;
    /// Move `amount` from `from` to `to`, consuming `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError>;
    /// Bridge-gated mint.
    fn mint(&self, minter: Address, to: Address, amount: Amount) -> Result<(), LedgerError>;
    /// Bridge-gated burn. When `burner != from` the burner's allowance is consumed.
    fn burn_from(&self, burner: Address, from: Address, amount: Amount) -> Result<(), LedgerError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    bridges: BTreeSet<Address>,
    total_supply: Amount,
}

impl LedgerState {
    fn debit(&mut self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
        let bal = self.balances.get(from).copied().unwrap_or(0);
        if bal < amount {
            return Err(LedgerError::InsufficientBalance { needed: amount, available: bal });
        }
        self.balances.insert(*from, bal - amount);
        Ok(())
    }

    fn credit(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        let bal = self.balances.get(to).copied().unwrap_or(0);
        let new = bal.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.balances.insert(*to, new);
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let key = (*owner, *spender);
        let cur = self.allowances.get(&key).copied().unwrap_or(0);
        if cur < amount {
            return Err(LedgerError::InsufficientAllowance { needed: amount, available: cur });
        }
        self.allowances.insert(key, cur - amount);
        Ok(())
    }
}

/// Mutex-guarded in-memory ledger for one chain.
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_id: ChainId,
    owner: Address,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Empty ledger owned by `owner`.
    pub fn new(chain_id: ChainId, owner: Address) -> Self {
        Self { chain_id, owner, state: Mutex::new(LedgerState::default()) }
    }

    /// Owner-gated: allow `bridge` to mint and burn.
    pub fn authorize_bridge(&self, caller: &Address, bridge: Address) -> Result<(), LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::NotOwner(*caller));
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        st.bridges.insert(bridge);
        Ok(())
    }

    /// Owner-gated genesis issuance outside the bridge path.
    pub fn issue(&self, caller: &Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::NotOwner(*caller));
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        st.total_supply = st.total_supply.checked_add(amount).ok_or(LedgerError::Overflow)?;
        st.credit(&to, amount)
    }
}

impl FungibleLedger for InMemoryLedger {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn balance_of(&self, who: &Address) -> Result<Amount, LedgerError> {
        let st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        Ok(st.balances.get(who).copied().unwrap_or(0))
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, LedgerError> {
        let st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        Ok(st.allowances.get(&(*owner, *spender)).copied().unwrap_or(0))
    }

    fn total_supply(&self) -> Result<Amount, LedgerError> {
        let st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        Ok(st.total_supply)
    }

    fn approve(&self, owner: Address, spender: Address, amount: Amount) -> Result<(), LedgerError> {
        if owner.is_zero() || spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        st.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        st.debit(&from, amount)?;
        st.credit(&to, amount)
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        let bal = st.balances.get(&from).copied().unwrap_or(0);
        if bal < amount {
            return Err(LedgerError::InsufficientBalance { needed: amount, available: bal });
        }
        st.spend_allowance(&from, &spender, amount)?;
        st.debit(&from, amount)?;
        st.credit(&to, amount)
    }

    fn mint(&self, minter: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        if !st.bridges.contains(&minter) {
            return Err(LedgerError::NotBridge(minter));
        }
        let total = st.total_supply.checked_add(amount).ok_or(LedgerError::Overflow)?;
        st.credit(&to, amount)?;
        st.total_supply = total;
        Ok(())
    }

    fn burn_from(&self, burner: Address, from: Address, amount: Amount) -> Result<(), LedgerError> {
        let mut st = self.state.lock().map_err(|_| LedgerError::StatePoisoned)?;
        if !st.bridges.contains(&burner) {
            return Err(LedgerError::NotBridge(burner));
        }
        let bal = st.balances.get(&from).copied().unwrap_or(0);
        if bal < amount {
            return Err(LedgerError::InsufficientBalance { needed: amount, available: bal });
        }
        if burner != from {
            st.spend_allowance(&from, &burner, amount)?;
        }
        st.debit(&from, amount)?;
        st.total_supply = st.total_supply.saturating_sub(amount);
        Ok(())
    }
}

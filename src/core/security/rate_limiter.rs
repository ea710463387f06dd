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

//! Sliding-window rate limiter for value-moving operations.
//!
//! Two independent caps must both pass:
//! - per `(account, operation)`: amount and transaction count within the
//!   trailing `window_secs`;
//! - global: aggregate amount across every account within the trailing 24h.
//!
//! Windows are exact: an entry stamped `t` counts while `t + window > now`.
//! Eviction happens lazily on each check. There are no aligned buckets, so no
//! burst is possible at a bucket boundary.
//!
//! Locking: per-account windows and the global window sit behind separate
//! mutexes and are always taken in that order. The global window is the single
//! serialization point shared by every account.

use crate::core::{
    access::{AccessControl, AccessError, Role},
    types::{Address, Amount, Classify, ErrorKind},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Mutex,
};
use thiserror::Error;
use tracing::debug;

/// Smallest admissible per-account window.
pub const MIN_WINDOW_SECS: u64 = 60;
/// Length of the global window.
pub const GLOBAL_WINDOW_SECS: u64 = 86_400;

const TOKEN: Amount = 1_000_000_000_000_000_000;

/// Kind of value-moving operation being limited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Outbound bridge transfer.
    Bridge,
    /// Mint on the local ledger.
    Mint,
    /// Burn on the local ledger.
    Burn,
    /// Plain transfer.
    Transfer,
}

/// Limiter parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-account trailing window length in seconds.
    pub window_secs: u64,
    /// Per-account amount cap within the window.
    pub max_amount_per_window: Amount,
    /// Per-account transaction cap within the window.
    pub max_tx_per_window: u32,
    /// Aggregate cap across all accounts within [`GLOBAL_WINDOW_SECS`].
    pub global_daily_cap: Amount,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 3_600,
            max_amount_per_window: 500_000 * TOKEN,
            max_tx_per_window: 10,
            global_daily_cap: 20_000_000 * TOKEN,
        }
    }
}

impl RateLimitConfig {
    /// Reject configurations that would disable or defeat the limiter.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.window_secs < MIN_WINDOW_SECS {
            return Err(RateLimitError::InvalidConfig("window shorter than minimum"));
        }
        if self.max_tx_per_window == 0 {
            return Err(RateLimitError::InvalidConfig("transaction cap must be positive"));
        }
        if self.max_amount_per_window == 0 || self.global_daily_cap == 0 {
            return Err(RateLimitError::InvalidConfig("amount caps must be positive"));
        }
        Ok(())
    }
}

/// Rate limiter errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// Per-account amount cap would be exceeded.
    #[error("account amount cap {limit} exceeded: used {used}, requested {requested}")]
    AmountExceeded {
        /// Cap.
        limit: Amount,
        /// Already used in the window.
        used: Amount,
        /// Requested amount.
        requested: Amount,
    },
    /// Per-account transaction count cap would be exceeded.
    #[error("account transaction cap {limit} per {window_secs}s exceeded")]
    TxCountExceeded {
        /// Cap.
        limit: u32,
        /// Window length.
        window_secs: u64,
    },
    /// Global daily cap would be exceeded.
    #[error("global daily cap {limit} exceeded: used {used}, requested {requested}")]
    GlobalCapExceeded {
        /// Cap.
        limit: Amount,
        /// Already used in the window.
        used: Amount,
        /// Requested amount.
        requested: Amount,
    },
    /// Zero amounts are not rate-limited operations.
    #[error("amount must be positive")]
    ZeroAmount,
    /// Rejected configuration.
    #[error("invalid rate limit config: {0}")]
    InvalidConfig(&'static str),
    /// Missing role.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// A previous holder panicked while holding the lock.
    #[error("rate limiter state poisoned")]
    StatePoisoned,
}

impl Classify for RateLimitError {
    fn kind(&self) -> ErrorKind {
        match self {
            RateLimitError::AmountExceeded { .. }
            | RateLimitError::TxCountExceeded { .. }
            | RateLimitError::GlobalCapExceeded { .. } => ErrorKind::Capacity,
            RateLimitError::ZeroAmount | RateLimitError::InvalidConfig(_) => ErrorKind::Validation,
            RateLimitError::Access(e) => e.kind(),
            RateLimitError::StatePoisoned => ErrorKind::Internal,
        }
    }
}

/// Ordered `(timestamp, amount)` entries inside a trailing window.
#[derive(Clone, Debug, Default)]
pub struct RateWindow {
    entries: VecDeque<(u64, Amount)>,
}

impl RateWindow {
    fn evict(&mut self, now: u64, window_secs: u64) {
        while let Some(&(ts, _)) = self.entries.front() {
            if ts.saturating_add(window_secs) > now {
                break;
            }
            self.entries.pop_front();
        }
    }

    fn live(&self, now: u64, window_secs: u64) -> impl Iterator<Item = &(u64, Amount)> {
        self.entries.iter().filter(move |(ts, _)| ts.saturating_add(window_secs) > now)
    }

    fn used(&self) -> Amount {
        self.entries.iter().fold(0, |acc, (_, a)| acc.saturating_add(*a))
    }

    fn remove_entry(&mut self, ts: u64, amount: Amount) -> bool {
        match self.entries.iter().rposition(|e| *e == (ts, amount)) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receipt for an accepted consumption; hand back to [`RateLimiter::refund`]
/// to undo it when the surrounding operation fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumption {
    /// Account charged.
    pub account: Address,
    /// Operation kind.
    pub operation: OperationType,
    /// Timestamp of the recorded entry.
    pub timestamp: u64,
    /// Amount charged.
    pub amount: Amount,
    /// Exempt accounts are accepted without recording entries.
    pub exempt: bool,
}

/// Read-only projection of what an account may still do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RemainingCapacity {
    /// Amount left in the account window.
    pub amount: Amount,
    /// Transactions left in the account window.
    pub transactions: u32,
    /// Amount left in the global window.
    pub global_amount: Amount,
}

#[derive(Debug)]
struct LimiterState {
    cfg: RateLimitConfig,
    access: AccessControl,
    exempt: BTreeSet<Address>,
    windows: BTreeMap<(Address, OperationType), RateWindow>,
}

/// Per-account and global sliding-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<LimiterState>,
    global: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter administered by `admin`.
    pub fn new(admin: Address, cfg: RateLimitConfig) -> Result<Self, RateLimitError> {
        cfg.validate()?;
        Ok(Self {
            inner: Mutex::new(LimiterState {
                cfg,
                access: AccessControl::with_admin(admin),
                exempt: BTreeSet::new(),
                windows: BTreeMap::new(),
            }),
            global: Mutex::new(RateWindow::default()),
        })
    }

    /// Evict, check both caps, and record `amount` for `account` at `now`.
    pub fn check_and_consume(
        &self,
        account: Address,
        operation: OperationType,
        amount: Amount,
        now: u64,
    ) -> Result<Consumption, RateLimitError> {
        if amount == 0 {
            return Err(RateLimitError::ZeroAmount);
        }
        let mut st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        if st.exempt.contains(&account) {
            return Ok(Consumption { account, operation, timestamp: now, amount, exempt: true });
        }
        let cfg = st.cfg.clone();

        // Windows left empty after eviction are dropped.
        let key = (account, operation);
        let mut window = st.windows.remove(&key).unwrap_or_default();
        window.evict(now, cfg.window_secs);
        let admitted = self.admit(&mut window, &cfg, account, operation, amount, now);
        if !window.is_empty() {
            st.windows.insert(key, window);
        }
        admitted
    }

    /// Cap checks for one account window; records the entry on success.
    /// Called with the account state locked, so global is taken second.
    fn admit(
        &self,
        window: &mut RateWindow,
        cfg: &RateLimitConfig,
        account: Address,
        operation: OperationType,
        amount: Amount,
        now: u64,
    ) -> Result<Consumption, RateLimitError> {
        if window.len() as u64 + 1 > u64::from(cfg.max_tx_per_window) {
            debug!(%account, ?operation, "rate limit: transaction count cap");
            return Err(RateLimitError::TxCountExceeded {
                limit: cfg.max_tx_per_window,
                window_secs: cfg.window_secs,
            });
        }
        let used = window.used();
        if used.saturating_add(amount) > cfg.max_amount_per_window {
            debug!(%account, ?operation, used, amount, "rate limit: account amount cap");
            return Err(RateLimitError::AmountExceeded {
                limit: cfg.max_amount_per_window,
                used,
                requested: amount,
            });
        }

        let mut global = self.global.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        global.evict(now, GLOBAL_WINDOW_SECS);
        let global_used = global.used();
        if global_used.saturating_add(amount) > cfg.global_daily_cap {
            debug!(%account, global_used, amount, "rate limit: global daily cap");
            return Err(RateLimitError::GlobalCapExceeded {
                limit: cfg.global_daily_cap,
                used: global_used,
                requested: amount,
            });
        }

        window.entries.push_back((now, amount));
        global.entries.push_back((now, amount));
        Ok(Consumption {
            account,
            operation,
            timestamp: now,
            amount,
            exempt: false,
        })
    }

    /// Undo a consumption recorded by [`RateLimiter::check_and_consume`].
    pub fn refund(&self, c: &Consumption) -> Result<(), RateLimitError> {
        if c.exempt {
            return Ok(());
        }
        let mut st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        let key = (c.account, c.operation);
        if let Some(w) = st.windows.get_mut(&key) {
            w.remove_entry(c.timestamp, c.amount);
            if w.is_empty() {
                st.windows.remove(&key);
            }
        }
        let mut global = self.global.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        global.remove_entry(c.timestamp, c.amount);
        Ok(())
    }

    /// Remaining capacity for `account` at `now`, without mutating state.
    pub fn remaining_capacity(
        &self,
        account: Address,
        operation: OperationType,
        now: u64,
    ) -> Result<RemainingCapacity, RateLimitError> {
        let st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        let cfg = &st.cfg;
        let (used, count) = match st.windows.get(&(account, operation)) {
            Some(w) => w
                .live(now, cfg.window_secs)
                .fold((0u128, 0u32), |(s, n), (_, a)| (s.saturating_add(*a), n.saturating_add(1))),
            None => (0, 0),
        };
        let global = self.global.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        let global_used = global
            .live(now, GLOBAL_WINDOW_SECS)
            .fold(0u128, |s, (_, a)| s.saturating_add(*a));

        Ok(RemainingCapacity {
            amount: cfg.max_amount_per_window.saturating_sub(used),
            transactions: cfg.max_tx_per_window.saturating_sub(count),
            global_amount: cfg.global_daily_cap.saturating_sub(global_used),
        })
    }

    /// Admin-gated reconfiguration. Existing entries are kept and judged
    /// against the new parameters on the next check.
    pub fn update_config(
        &self,
        caller: &Address,
        cfg: RateLimitConfig,
    ) -> Result<(), RateLimitError> {
        let mut st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        st.access.require(Role::Admin, caller)?;
        cfg.validate()?;
        debug!(?cfg, "rate limit config updated");
        st.cfg = cfg;
        Ok(())
    }

    /// Admin-gated exemption toggle (system accounts such as a trusted router).
    pub fn set_exempt(
        &self,
        caller: &Address,
        account: Address,
        exempt: bool,
    ) -> Result<(), RateLimitError> {
        let mut st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        st.access.require(Role::Admin, caller)?;
        if exempt {
            st.exempt.insert(account);
        } else {
            st.exempt.remove(&account);
        }
        Ok(())
    }

    /// Admin-gated role grant.
    pub fn grant_role(
        &self,
        caller: &Address,
        role: Role,
        who: Address,
    ) -> Result<(), RateLimitError> {
        let mut st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        st.access.grant(caller, role, who)?;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> Result<RateLimitConfig, RateLimitError> {
        let st = self.inner.lock().map_err(|_| RateLimitError::StatePoisoned)?;
        Ok(st.cfg.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Address {
        Address::from_low_u64(1)
    }

    fn hourly(amount: Amount, txs: u32) -> RateLimiter {
        RateLimiter::new(
            admin(),
            RateLimitConfig {
                window_secs: 3_600,
                max_amount_per_window: amount,
                max_tx_per_window: txs,
                global_daily_cap: amount * 100,
            },
        )
        .unwrap()
    }

    #[test]
    fn fourth_transaction_in_window_rejected_regardless_of_amount() {
        let rl = hourly(500_000, 3);
        let user = Address::from_low_u64(42);
        for i in 0..3 {
            rl.check_and_consume(user, OperationType::Bridge, 100_000, 1_000 + i).unwrap();
        }
        let err = rl.check_and_consume(user, OperationType::Bridge, 1, 1_010).unwrap_err();
        assert!(matches!(err, RateLimitError::TxCountExceeded { limit: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn idle_and_rejected_accounts_leave_no_window_behind() {
        let rl = hourly(500_000, 3);
        let tracked = || rl.inner.lock().unwrap().windows.len();

        let err = rl.check_and_consume(Address::from_low_u64(7), OperationType::Bridge, 600_000, 0);
        assert!(err.is_err());
        assert_eq!(tracked(), 0);

        let user = Address::from_low_u64(8);
        let c = rl.check_and_consume(user, OperationType::Bridge, 1_000, 0).unwrap();
        assert_eq!(tracked(), 1);
        rl.refund(&c).unwrap();
        assert_eq!(tracked(), 0);

        rl.check_and_consume(user, OperationType::Bridge, 1_000, 10).unwrap();
        // Once the entry ages out, a rejected call drops the emptied window.
        assert!(rl.check_and_consume(user, OperationType::Bridge, 900_000, 10 + 3_600).is_err());
        assert_eq!(tracked(), 0);
    }

    #[test]
    fn amount_cap_enforced() {
        let rl = hourly(500_000, 10);
        let user = Address::from_low_u64(42);
        rl.check_and_consume(user, OperationType::Bridge, 400_000, 0).unwrap();
        let err = rl.check_and_consume(user, OperationType::Bridge, 100_001, 1).unwrap_err();
        assert_eq!(
            err,
            RateLimitError::AmountExceeded {
                limit: 500_000,
                used: 400_000,
                requested: 100_001
            }
        );
        rl.check_and_consume(user, OperationType::Bridge, 100_000, 2).unwrap();
    }

    #[test]
    fn window_slides_by_exact_timestamp() {
        let rl = hourly(500_000, 3);
        let user = Address::from_low_u64(42);
        rl.check_and_consume(user, OperationType::Bridge, 100_000, 100).unwrap();
        rl.check_and_consume(user, OperationType::Bridge, 100_000, 200).unwrap();
        rl.check_and_consume(user, OperationType::Bridge, 100_000, 300).unwrap();

        // The first entry is still live one second before it ages out.
        assert!(rl.check_and_consume(user, OperationType::Bridge, 1, 3_699).is_err());
        // Exactly one window later it has been evicted; the others remain.
        rl.check_and_consume(user, OperationType::Bridge, 1, 3_700).unwrap();
        assert!(rl.check_and_consume(user, OperationType::Bridge, 1, 3_750).is_err());
    }

    #[test]
    fn operations_and_accounts_are_independent() {
        let rl = hourly(500_000, 1);
        let a = Address::from_low_u64(10);
        let b = Address::from_low_u64(11);
        rl.check_and_consume(a, OperationType::Bridge, 10, 0).unwrap();
        rl.check_and_consume(a, OperationType::Transfer, 10, 0).unwrap();
        rl.check_and_consume(b, OperationType::Bridge, 10, 0).unwrap();
        assert!(rl.check_and_consume(a, OperationType::Bridge, 10, 0).is_err());
    }

    #[test]
    fn global_cap_spans_accounts() {
        let rl = RateLimiter::new(
            admin(),
            RateLimitConfig {
                window_secs: 3_600,
                max_amount_per_window: 1_000,
                max_tx_per_window: 10,
                global_daily_cap: 1_500,
            },
        )
        .unwrap();
        let (first, second) = (Address::from_low_u64(10), Address::from_low_u64(11));
        let bridge = OperationType::Bridge;
        rl.check_and_consume(first, bridge, 1_000, 0).unwrap();
        let err = rl.check_and_consume(second, bridge, 600, 10).unwrap_err();
        assert!(matches!(err, RateLimitError::GlobalCapExceeded { used: 1_000, .. }));

        // A rejected global check leaves the account window untouched.
        let cap = rl.remaining_capacity(second, bridge, 10).unwrap();
        assert_eq!(cap.transactions, 10);

        // Global window is 24h, independent of the hourly account window.
        assert!(rl.check_and_consume(second, bridge, 600, 7_200).is_err());
        rl.check_and_consume(second, bridge, 600, GLOBAL_WINDOW_SECS).unwrap();
    }

    #[test]
    fn remaining_capacity_is_read_only() {
        let rl = hourly(500_000, 3);
        let user = Address::from_low_u64(42);
        rl.check_and_consume(user, OperationType::Bridge, 200_000, 0).unwrap();

        let cap = rl.remaining_capacity(user, OperationType::Bridge, 10).unwrap();
        assert_eq!(cap.amount, 300_000);
        assert_eq!(cap.transactions, 2);
        assert_eq!(cap.global_amount, 50_000_000 - 200_000);

        // Projection after the window passes reflects eviction without performing it.
        let later = rl.remaining_capacity(user, OperationType::Bridge, 3_600).unwrap();
        assert_eq!(later.amount, 500_000);
        let again = rl.remaining_capacity(user, OperationType::Bridge, 10).unwrap();
        assert_eq!(again, cap);
    }

    #[test]
    fn refund_restores_capacity() {
        let rl = hourly(500_000, 1);
        let user = Address::from_low_u64(42);
        let c = rl.check_and_consume(user, OperationType::Bridge, 500_000, 5).unwrap();
        assert!(rl.check_and_consume(user, OperationType::Bridge, 1, 6).is_err());
        rl.refund(&c).unwrap();
        rl.check_and_consume(user, OperationType::Bridge, 500_000, 7).unwrap();
    }

    #[test]
    fn exempt_accounts_bypass_limits() {
        let rl = hourly(10, 1);
        let system = Address::from_low_u64(99);
        rl.set_exempt(&admin(), system, true).unwrap();
        for t in 0..5 {
            let c = rl.check_and_consume(system, OperationType::Bridge, 1_000, t).unwrap();
            assert!(c.exempt);
        }
        assert!(rl.set_exempt(&system, system, false).is_err());
    }

    #[test]
    fn config_floor_and_admin_gate() {
        let rl = hourly(10, 1);
        let bad = RateLimitConfig { window_secs: 0, ..RateLimitConfig::default() };
        assert!(matches!(rl.update_config(&admin(), bad), Err(RateLimitError::InvalidConfig(_))));

        let outsider = Address::from_low_u64(5);
        let err = rl.update_config(&outsider, RateLimitConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        rl.update_config(&admin(), RateLimitConfig::default()).unwrap();
        assert_eq!(rl.config().unwrap(), RateLimitConfig::default());
    }

    #[test]
    fn zero_amount_rejected() {
        let rl = hourly(10, 1);
        assert_eq!(
            rl.check_and_consume(Address::from_low_u64(3), OperationType::Bridge, 0, 0),
            Err(RateLimitError::ZeroAmount)
        );
    }
}

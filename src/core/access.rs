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

//! Role-based authorization gateway.
//!
//! Every privileged operation goes through [`AccessControl::require`] once, at
//! the top of the call, before any state is read for mutation.

use crate::core::types::{Address, Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Roles recognised by the components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Configuration and role management.
    Admin,
    /// Submits supply attestations to the oracle.
    OracleSigner,
    /// Pause/unpause and reconciliation triggers.
    Operator,
    /// Emergency mode and pause fan-out.
    Emergency,
}

/// Authorization errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    /// Caller does not hold the role.
    #[error("account {account} is missing role {role:?}")]
    MissingRole {
        /// Role that was required.
        role: Role,
        /// Offending caller.
        account: Address,
    },
    /// Roles cannot be granted to the zero address.
    #[error("cannot grant a role to the zero address")]
    ZeroAddress,
}

impl Classify for AccessError {
    fn kind(&self) -> ErrorKind {
        match self {
            AccessError::MissingRole { .. } => ErrorKind::Authorization,
            AccessError::ZeroAddress => ErrorKind::Validation,
        }
    }
}

/// Role membership table owned by a single component.
#[derive(Clone, Debug, Default)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    /// Create a table with `admin` holding [`Role::Admin`].
    pub fn with_admin(admin: Address) -> Self {
        let mut ac = Self::default();
        ac.members.entry(Role::Admin).or_default().insert(admin);
        ac
    }

    /// True if `who` holds `role`.
    pub fn has_role(&self, role: Role, who: &Address) -> bool {
        self.members.get(&role).map(|s| s.contains(who)).unwrap_or(false)
    }

    /// Fail with [`AccessError::MissingRole`] unless `who` holds `role`.
    pub fn require(&self, role: Role, who: &Address) -> Result<(), AccessError> {
        if self.has_role(role, who) {
            Ok(())
        } else {
            Err(AccessError::MissingRole { role, account: *who })
        }
    }

    /// Admin-gated grant. Granting an already-held role is a no-op.
    pub fn grant(&mut self, caller: &Address, role: Role, who: Address) -> Result<(), AccessError> {
        self.require(Role::Admin, caller)?;
        if who.is_zero() {
            return Err(AccessError::ZeroAddress);
        }
        self.members.entry(role).or_default().insert(who);
        Ok(())
    }

    /// Admin-gated revoke.
    pub fn revoke(
        &mut self,
        caller: &Address,
        role: Role,
        who: &Address,
    ) -> Result<(), AccessError> {
        self.require(Role::Admin, caller)?;
        if let Some(set) = self.members.get_mut(&role) {
            set.remove(who);
        }
        Ok(())
    }

    /// Number of accounts holding `role`.
    pub fn count(&self, role: Role) -> usize {
        self.members.get(&role).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_requires_admin() {
        let admin = Address::from_low_u64(1);
        let other = Address::from_low_u64(2);
        let mut ac = AccessControl::with_admin(admin);

        let err = ac.grant(&other, Role::Operator, other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        ac.grant(&admin, Role::Operator, other).unwrap();
        assert!(ac.has_role(Role::Operator, &other));
        assert_eq!(ac.count(Role::Operator), 1);

        ac.revoke(&admin, Role::Operator, &other).unwrap();
        assert!(ac.require(Role::Operator, &other).is_err());
    }

    #[test]
    fn zero_address_cannot_hold_roles() {
        let admin = Address::from_low_u64(1);
        let mut ac = AccessControl::with_admin(admin);
        assert_eq!(ac.grant(&admin, Role::Emergency, Address::ZERO), Err(AccessError::ZeroAddress));
    }
}

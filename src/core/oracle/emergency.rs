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

//! Pause capability and best-effort fan-out.

use crate::core::types::{Address, ChainId};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Pause failures reported by a single target.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PauseError {
    /// The requester lacks the pause role on the target.
    #[error("{0} may not pause this target")]
    Unauthorized(Address),
    /// Target-side failure (poisoned state, unreachable endpoint).
    #[error("pause failed: {0}")]
    Failed(String),
}

/// Anything the oracle can halt.
pub trait Pausable: Send + Sync {
    /// Halt value-moving operations. Pausing an already paused target succeeds.
    fn pause_for(&self, by: Address, reason: &str) -> Result<(), PauseError>;
    /// Current state.
    fn is_paused(&self) -> bool;
}

/// Result of pausing one target.
#[derive(Clone, Debug, Serialize)]
pub struct PauseOutcome {
    /// Chain the target serves.
    pub chain_id: ChainId,
    /// Target address.
    pub target: Address,
    /// `None` on success, the failure reason otherwise.
    pub error: Option<String>,
}

impl PauseOutcome {
    /// True if the pause landed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Pause every target, isolating each attempt. Never short-circuits.
pub fn pause_all<'a, I>(targets: I, by: Address, reason: &str) -> Vec<PauseOutcome>
where
    I: IntoIterator<Item = (ChainId, Address, &'a Arc<dyn Pausable>)>,
{
    let mut out = Vec::new();
    for (chain_id, target, handle) in targets {
        let error = match handle.pause_for(by, reason) {
            Ok(()) => {
                info!(chain_id, %target, reason, "bridge paused");
                None
            }
            Err(e) => {
                warn!(chain_id, %target, error = %e, "bridge pause failed");
                Some(e.to_string())
            }
        };
        out.push(PauseOutcome { chain_id, target, error });
    }
    out
}

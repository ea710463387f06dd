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

//! Omnisupply - cross-chain supply oracle and burn-and-mint bridge router.
//!
//! This repository provides:
//! - A quorum-attested supply oracle with nonce freshness and mismatch detection
//! - Emergency pause fan-out to registered bridges
//! - Burn-and-mint adapters for LayerZero, Celer and Hyperlane style transports
//! - A router that compares fees and dispatches through a chosen adapter
//! - Sliding-window rate limiting per account, operation and globally
//! - Monitoring via Prometheus metrics and structured JSON logging

/// Core components (types, oracle, bridges, security).
pub mod core;
/// Observability (metrics, HTTP endpoints).
pub mod monitoring;

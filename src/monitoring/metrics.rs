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

use prometheus::{core::Collector, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Construction or registration of the named family failed.
    #[error("prometheus metric {0}")]
    Prom(&'static str),
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Supply attestations accepted (pending or committing).
    pub oracle_attestations_total: IntCounter,
    /// Quorum commits.
    pub oracle_commits_total: IntCounter,
    /// Deviation beyond tolerance observed.
    pub oracle_supply_mismatch_total: IntCounter,
    /// Pause attempts that failed during fan-out.
    pub oracle_pause_failures_total: IntCounter,
    /// Last computed actual global supply, in whole tokens.
    pub oracle_actual_supply_tokens: IntGauge,
    /// Last computed deviation, in whole tokens.
    pub oracle_deviation_tokens: IntGauge,

    /// Outbound transfers by protocol.
    pub bridge_outbound_total: IntCounterVec,
    /// Inbound mints by protocol.
    pub bridge_inbound_total: IntCounterVec,
    /// Replayed, stale or untrusted messages dropped.
    pub replay_rejected_total: IntCounter,
    /// Operations rejected by the rate limiter.
    pub rate_limited_total: IntCounter,
}

const WHOLE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Gauge value for a base-unit amount (whole tokens, saturating).
pub fn tokens_gauge_value(amount: u128) -> i64 {
    i64::try_from(amount / WHOLE_TOKEN).unwrap_or(i64::MAX)
}

fn registered<C>(
    registry: &Registry,
    name: &'static str,
    built: prometheus::Result<C>,
) -> Result<C, MetricsError>
where
    C: Collector + Clone + 'static,
{
    let collector = built.map_err(|_| MetricsError::Prom(name))?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|_| MetricsError::Prom(name))?;
    Ok(collector)
}

impl Metrics {
    /// Create and register every `omnisupply_*` family.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let counter = |name: &'static str, help: &str| {
            registered(&registry, name, IntCounter::new(name, help))
        };
        let gauge = |name: &'static str, help: &str| {
            registered(&registry, name, IntGauge::new(name, help))
        };
        let by_protocol = |name: &'static str, help: &str| {
            registered(&registry, name, IntCounterVec::new(Opts::new(name, help), &["protocol"]))
        };

        Ok(Self {
            oracle_attestations_total: counter(
                "omnisupply_oracle_attestations_total",
                "Supply attestations accepted",
            )?,
            oracle_commits_total: counter(
                "omnisupply_oracle_commits_total",
                "Quorum-committed supply updates",
            )?,
            oracle_supply_mismatch_total: counter(
                "omnisupply_oracle_supply_mismatch_total",
                "Global supply deviations beyond tolerance",
            )?,
            oracle_pause_failures_total: counter(
                "omnisupply_oracle_pause_failures_total",
                "Bridge pause attempts that failed",
            )?,
            oracle_actual_supply_tokens: gauge(
                "omnisupply_oracle_actual_supply_tokens",
                "Actual global supply in whole tokens",
            )?,
            oracle_deviation_tokens: gauge(
                "omnisupply_oracle_deviation_tokens",
                "Absolute deviation from expected supply in whole tokens",
            )?,
            bridge_outbound_total: by_protocol(
                "omnisupply_bridge_outbound_total",
                "Outbound burn-and-send transfers",
            )?,
            bridge_inbound_total: by_protocol(
                "omnisupply_bridge_inbound_total",
                "Inbound verified mints",
            )?,
            replay_rejected_total: counter(
                "omnisupply_replay_rejected_total",
                "Replayed, stale or untrusted messages rejected",
            )?,
            rate_limited_total: counter(
                "omnisupply_rate_limited_total",
                "Operations rejected by the rate limiter",
            )?,
            registry,
        })
    }
}

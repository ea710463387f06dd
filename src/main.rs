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

//! Omnisupply oracle service entrypoint (systemd-friendly).
//! Loads the config, opens the signer key, serves HTTP and runs reconciliation.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use omnisupply::core::{
    access::Role,
    clock::{Clock, SystemClock},
    config::{config_path_from_env, load_config, LogFormat},
    oracle::supply_oracle::SupplyOracle,
    security::keystore::Keystore,
    types::Address,
};
use omnisupply::monitoring::{http, metrics::Metrics};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RECONCILE_TICK: Duration = Duration::from_secs(30);

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,omnisupply=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(true)).try_init(),
    };
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received ctrl-c"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

async fn reconcile_loop(oracle: Arc<Mutex<SupplyOracle>>, operator: Address) {
    let clock = SystemClock;
    let mut tick = tokio::time::interval(RECONCILE_TICK);
    loop {
        tick.tick().await;
        let mut o = oracle.lock().await;
        if o.reconciliation_due(clock.now()) {
            match o.reconcile_supply(&operator) {
                Ok(g) => info!(
                    actual = %g.actual,
                    expected = %g.expected,
                    deviation = %g.deviation,
                    healthy = g.healthy,
                    "reconciled"
                ),
                Err(e) => error!(error = %e, "reconciliation failed"),
            }
        }
        for ev in o.drain_events() {
            info!(target: "oracle", event = ?ev, "oracle event");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path_from_env();
    let cfg = load_config(&path).with_context(|| format!("loading {path}"))?;
    init_logging(cfg.node.log_format);

    info!(
        node = %cfg.node.name,
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "omnisupply starting"
    );

    std::fs::create_dir_all(&cfg.node.data_dir)
        .with_context(|| format!("creating {}", cfg.node.data_dir))?;
    let keystore = Keystore::open(&cfg.node.data_dir).context("opening signer key")?;
    let service_addr = keystore.address();

    let metrics = Arc::new(Metrics::new().context("metrics init")?);
    let admin = cfg.admin()?;
    let mut oracle = SupplyOracle::new(
        cfg.oracle_address()?,
        admin,
        cfg.oracle_config()?,
        Arc::new(SystemClock),
    )?
        .with_metrics(metrics.clone());

    oracle.grant_role(&admin, Role::Operator, service_addr)?;
    for op in cfg.operators()? {
        oracle.grant_role(&admin, Role::Operator, op)?;
    }
    for em in cfg.emergency()? {
        oracle.grant_role(&admin, Role::Emergency, em)?;
    }
    let signers = cfg.signer_keys()?;
    for pk in &signers {
        oracle.grant_role(&admin, Role::OracleSigner, Address::from_public_key(pk))?;
    }
    info!(
        signers = signers.len(),
        required = cfg.oracle.required_signatures,
        service = %service_addr,
        "oracle configured"
    );

    let oracle = Arc::new(Mutex::new(oracle));
    let state = http::AppState {
        oracle: oracle.clone(),
        metrics,
        node_name: Arc::from(cfg.node.name.as_str()),
    };
    let listen = cfg.listen_addr()?;

    let reconcile = tokio::spawn(reconcile_loop(oracle, service_addr));
    let server = tokio::spawn(http::serve(listen, state));

    tokio::select! {
        _ = shutdown_signal() => info!("shutting down"),
        res = server => match res {
            Ok(Ok(())) => warn!("http server exited"),
            Ok(Err(e)) => error!(error = %e, "http server failed"),
            Err(e) => error!(error = %e, "http task panicked"),
        },
    }
    reconcile.abort();
    Ok(())
}

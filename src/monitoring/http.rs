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

//! HTTP surface of the oracle service.
//!
//! - `GET /healthz`: liveness plus pause state
//! - `GET /supply`: global view and per-chain records
//! - `GET /metrics`: Prometheus text format
//! - `POST /attestations`: one signed report
//! - `POST /attestations/batch`: one signed batch
//!
//! Amounts travel as decimal strings; keys and signatures as hex.

use crate::core::{
    config::parse_hex_32,
    oracle::supply_oracle::{
        AttestationOutcome, ChainSupply, OracleError, SignedAttestation, SignedBatch, SupplyOracle,
        SupplyReport,
    },
    types::{Amount, ChainId, Classify, ErrorKind, Signature},
};
use crate::monitoring::metrics::Metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Oracle.
    pub oracle: Arc<Mutex<SupplyOracle>>,
    /// Metrics registry.
    pub metrics: Arc<Metrics>,
    /// Instance name echoed by `/healthz`.
    pub node_name: Arc<str>,
}

/// Handler errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    /// Oracle rejected the request.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Replay => StatusCode::CONFLICT,
        ErrorKind::Capacity => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::InvariantViolation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Halted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Oracle(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        (status_for(kind), Json(ErrorBody { error: self.to_string(), kind })).into_response()
    }
}

/// Report as posted by signers.
#[derive(Clone, Debug, Deserialize)]
pub struct SupplyReportDto {
    /// Chain id.
    pub chain_id: ChainId,
    /// Decimal string.
    pub total_supply: String,
    /// Decimal string.
    pub locked_supply: String,
}

impl SupplyReportDto {
    fn into_report(self) -> Result<SupplyReport, ApiError> {
        Ok(SupplyReport {
            chain_id: self.chain_id,
            total_supply: parse_amount(&self.total_supply)?,
            locked_supply: parse_amount(&self.locked_supply)?,
        })
    }
}

/// Body of `POST /attestations`.
#[derive(Clone, Debug, Deserialize)]
pub struct SignedAttestationDto {
    /// Report.
    pub report: SupplyReportDto,
    /// Nonce (unix seconds).
    pub nonce: u64,
    /// Ed25519 public key, hex.
    pub public_key: String,
    /// Signature, hex.
    pub signature: String,
}

/// Body of `POST /attestations/batch`.
#[derive(Clone, Debug, Deserialize)]
pub struct SignedBatchDto {
    /// Reports.
    pub reports: Vec<SupplyReportDto>,
    /// Nonce (unix seconds).
    pub nonce: u64,
    /// Ed25519 public key, hex.
    pub public_key: String,
    /// Signature, hex.
    pub signature: String,
}

fn parse_amount(raw: &str) -> Result<Amount, ApiError> {
    raw.trim()
        .parse::<Amount>()
        .map_err(|_| ApiError::BadRequest("amount must be a decimal string"))
}

fn parse_public_key(raw: &str) -> Result<[u8; 32], ApiError> {
    parse_hex_32(raw).ok_or(ApiError::BadRequest("public key must be 32 hex bytes"))
}

fn parse_signature(raw: &str) -> Result<Signature, ApiError> {
    let s = raw.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|_| ApiError::BadRequest("signature hex"))?;
    if bytes.len() != 64 {
        return Err(ApiError::BadRequest("signature must be 64 bytes"));
    }
    Ok(Signature(bytes))
}

impl TryFrom<SignedAttestationDto> for SignedAttestation {
    type Error = ApiError;

    fn try_from(dto: SignedAttestationDto) -> Result<Self, Self::Error> {
        Ok(SignedAttestation {
            report: dto.report.into_report()?,
            nonce: dto.nonce,
            public_key: parse_public_key(&dto.public_key)?,
            signature: parse_signature(&dto.signature)?,
        })
    }
}

impl TryFrom<SignedBatchDto> for SignedBatch {
    type Error = ApiError;

    fn try_from(dto: SignedBatchDto) -> Result<Self, Self::Error> {
        Ok(SignedBatch {
            reports: dto
                .reports
                .into_iter()
                .map(SupplyReportDto::into_report)
                .collect::<Result<_, _>>()?,
            nonce: dto.nonce,
            public_key: parse_public_key(&dto.public_key)?,
            signature: parse_signature(&dto.signature)?,
        })
    }
}

/// Result of an accepted attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutcomeResponse {
    /// `pending` or `committed`.
    pub status: &'static str,
    /// Update hash, hex.
    pub hash: String,
    /// Distinct signers so far (pending only).
    pub count: Option<usize>,
    /// Threshold (pending only).
    pub required: Option<usize>,
    /// Chains written (committed only).
    pub chains: Vec<ChainId>,
}

impl From<AttestationOutcome> for OutcomeResponse {
    fn from(o: AttestationOutcome) -> Self {
        match o {
            AttestationOutcome::Pending { hash, count, required } => Self {
                status: "pending",
                hash: hash.to_string(),
                count: Some(count),
                required: Some(required),
                chains: Vec::new(),
            },
            AttestationOutcome::Committed { hash, chains, .. } => {
                Self {
                    status: "committed",
                    hash: hash.to_string(),
                    count: None,
                    required: None,
                    chains,
                }
            }
        }
    }
}

/// Per-chain record with string amounts.
#[derive(Clone, Debug, Serialize)]
pub struct ChainSupplyDto {
    /// Chain id.
    pub chain_id: ChainId,
    /// Total supply.
    pub total_supply: String,
    /// Locked supply.
    pub locked_supply: String,
    /// Commit time.
    pub last_update: u64,
}

impl From<ChainSupply> for ChainSupplyDto {
    fn from(c: ChainSupply) -> Self {
        Self {
            chain_id: c.chain_id,
            total_supply: c.total_supply.to_string(),
            locked_supply: c.locked_supply.to_string(),
            last_update: c.last_update,
        }
    }
}

/// Body of `GET /supply`.
#[derive(Clone, Debug, Serialize)]
pub struct SupplyResponse {
    /// Expected supply.
    pub expected: String,
    /// Sum of totals.
    pub actual: String,
    /// Sum of locked.
    pub locked: String,
    /// `actual - locked`.
    pub circulating: String,
    /// `|actual - expected|`.
    pub deviation: String,
    /// Deviation within tolerance.
    pub healthy: bool,
    /// Per-chain records.
    pub chains: Vec<ChainSupplyDto>,
}

/// Body of `GET /healthz`.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` when the server answers.
    pub status: &'static str,
    /// Instance name.
    pub node: String,
    /// Oracle paused.
    pub paused: bool,
    /// Emergency mode.
    pub emergency: bool,
    /// Last reconciliation time.
    pub last_reconciliation: Option<u64>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let oracle = state.oracle.lock().await;
    Json(HealthResponse {
        status: "ok",
        node: state.node_name.to_string(),
        paused: oracle.is_paused(),
        emergency: oracle.is_emergency(),
        last_reconciliation: oracle.last_reconciliation(),
    })
}

async fn supply(State(state): State<AppState>) -> Json<SupplyResponse> {
    let oracle = state.oracle.lock().await;
    let g = oracle.global_supply();
    let chains = oracle
        .chains()
        .into_iter()
        .filter_map(|c| oracle.chain_supply(c))
        .map(ChainSupplyDto::from)
        .collect();
    Json(SupplyResponse {
        expected: g.expected.to_string(),
        actual: g.actual.to_string(),
        locked: g.locked.to_string(),
        circulating: g.circulating.to_string(),
        deviation: g.deviation.to_string(),
        healthy: g.healthy,
        chains,
    })
}

async fn metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}

async fn post_attestation(
    State(state): State<AppState>,
    Json(dto): Json<SignedAttestationDto>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let att = SignedAttestation::try_from(dto)?;
    let outcome = state.oracle.lock().await.submit_signed_attestation(&att);
    match outcome {
        Ok(o) => Ok(Json(o.into())),
        Err(e) => {
            warn!(
                chain_id = att.report.chain_id,
                nonce = att.nonce,
                error = %e,
                "attestation rejected"
            );
            Err(e.into())
        }
    }
}

async fn post_batch(
    State(state): State<AppState>,
    Json(dto): Json<SignedBatchDto>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let batch = SignedBatch::try_from(dto)?;
    let outcome = state.oracle.lock().await.submit_signed_batch(&batch);
    match outcome {
        Ok(o) => Ok(Json(o.into())),
        Err(e) => {
            warn!(chains = batch.reports.len(), nonce = batch.nonce, error = %e, "batch rejected");
            Err(e.into())
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/supply", get(supply))
        .route("/metrics", get(metrics))
        .route("/attestations", post(post_attestation))
        .route("/attestations/batch", post(post_batch))
        .with_state(state)
}

/// Bind `addr` and serve until the task is dropped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http listening");
    axum::serve(listener, router(state)).await
}

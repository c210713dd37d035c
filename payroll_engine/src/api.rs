//! HTTP API for the Payroll Engine.
//!
//! This module exposes the engine using the
//! [`axum`](https://crates.io/crates/axum) framework.  Handlers are thin:
//! they look up the requested policy, call into the engine and map
//! errors to status codes.  Endpoints that commit periods go through the
//! shared [`StateStore`] under a single lock, so computing a period and
//! recording it happen together.

use crate::engine::{compute_payroll, run_payroll};
use crate::error::PayrollError;
use crate::models::{PayRunInput, PayrollPeriodInput, PayrollResult};
use crate::policy::{load_policies_from_dir, PayrollPolicy};
use crate::store::{Processed, StateStore};
use crate::withholding::{EmployeeTaxYearState, YearEndSummary};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Application state shared across requests.
pub struct AppState {
    pub policies: RwLock<HashMap<String, PayrollPolicy>>,
    pub store: Mutex<StateStore>,
}

impl AppState {
    pub fn new(policies: impl IntoIterator<Item = PayrollPolicy>) -> Self {
        let policies = policies.into_iter().map(|p| (p.id(), p)).collect();
        Self {
            policies: RwLock::new(policies),
            store: Mutex::new(StateStore::new()),
        }
    }

    async fn policy(&self, id: &str) -> Result<PayrollPolicy, ApiError> {
        self.policies
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("unknown policy {id}")))
    }
}

/// Errors surfaced by handlers.
#[derive(Debug)]
pub enum ApiError {
    Payroll(PayrollError),
    NotFound(String),
    Internal(String),
}

impl From<PayrollError> for ApiError {
    fn from(err: PayrollError) -> Self {
        ApiError::Payroll(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Payroll(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub policy_id: String,
    pub input: PayrollPeriodInput,
    /// State after the previous period; omitted for period 1.
    #[serde(default)]
    pub prior_state: Option<EmployeeTaxYearState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub result: PayrollResult,
    pub state: EmployeeTaxYearState,
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub policy_id: String,
    pub input: PayrollPeriodInput,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub result: PayrollResult,
    /// True when the period had already been committed.
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CloseYearRequest {
    pub policy_id: String,
    pub employee_id: String,
    pub year: i32,
}

/// Build the API router with the given application state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/payroll/preview", post(preview_handler))
        .route("/api/payroll/periods", post(commit_handler))
        .route("/api/payroll/batch", post(batch_handler))
        .route("/api/payroll/close-year", post(close_year_handler))
        .route("/api/payroll/state/:employee_id/:year", get(state_handler))
        .with_state(state)
}

/// Load policies from `policy_dir` and build the router.  Returns the
/// router and a handle to the state.
pub fn build_router(policy_dir: PathBuf) -> Result<(Router, Arc<AppState>)> {
    let policies = load_policies_from_dir(&policy_dir)?;
    if policies.is_empty() {
        tracing::warn!(dir = %policy_dir.display(), "no payroll policies loaded");
    }
    let state = Arc::new(AppState::new(policies));
    Ok((router(state.clone()), state))
}

/// Handler for POST /api/payroll/preview
async fn preview_handler(
    State(app): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let policy = app.policy(&req.policy_id).await?;
    let prior = req
        .prior_state
        .unwrap_or_else(|| EmployeeTaxYearState::new(req.input.employee_id.clone(), req.input.year));
    let (result, state) = compute_payroll(&req.input, &policy, &prior)?;
    Ok(Json(PreviewResponse { result, state }))
}

/// Handler for POST /api/payroll/periods
async fn commit_handler(
    State(app): State<Arc<AppState>>,
    Json(req): Json<CommitRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    let policy = app.policy(&req.policy_id).await?;
    let processed = app.store.lock().await.process(&req.input, &policy)?;
    let replayed = matches!(processed, Processed::Replayed(_));
    Ok(Json(CommitResponse {
        result: processed.into_result(),
        replayed,
    }))
}

/// Handler for POST /api/payroll/batch
async fn batch_handler(
    State(app): State<Arc<AppState>>,
    Json(input): Json<PayRunInput>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = app.policy(&input.policy_id).await?;
    // rayon work must not run on the async executor threads.
    let result = tokio::task::spawn_blocking(move || run_payroll(input, &policy))
        .await
        .map_err(|err| ApiError::Internal(format!("batch run aborted: {err}")))?;
    Ok(Json(result))
}

/// Handler for POST /api/payroll/close-year
async fn close_year_handler(
    State(app): State<Arc<AppState>>,
    Json(req): Json<CloseYearRequest>,
) -> Result<Json<YearEndSummary>, ApiError> {
    let policy = app.policy(&req.policy_id).await?;
    let summary = app
        .store
        .lock()
        .await
        .close_year(&req.employee_id, req.year, &policy)?;
    summary
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no tax year {} for employee {}", req.year, req.employee_id)))
}

/// Handler for GET /api/payroll/state/:employee_id/:year
async fn state_handler(
    State(app): State<Arc<AppState>>,
    Path((employee_id, year)): Path<(String, i32)>,
) -> Result<Json<EmployeeTaxYearState>, ApiError> {
    let state = app.store.lock().await.state(&employee_id, year).cloned();
    state
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no tax year {year} for employee {employee_id}")))
}

/// Launch the API server.  This function loads policies from
/// `policy_dir` and binds to the supplied address.  It blocks until the
/// server terminates.
pub async fn serve(addr: &str, policy_dir: PathBuf) -> Result<()> {
    let (router, _state) = build_router(policy_dir)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "payroll server listening");
    axum::serve(listener, router).await.context("server error")
}

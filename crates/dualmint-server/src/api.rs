//! HTTP surface of the recording service.
//!
//! | Method | Path                | Body                                   |
//! |--------|---------------------|----------------------------------------|
//! | POST   | `/api/mint`         | `{recipient, amount, chain, txHash, recipientEmail?}` |
//! | POST   | `/api/burn`         | `{target, amount, chain, txHash}`      |
//! | POST   | `/api/transactions` | `RecordSubmission`                     |
//! | GET    | `/api/health`       |                                        |
//!
//! Every POST route needs `Authorization: Bearer <token>`. Errors come back
//! as `{"error": <message>, "code": <kind>}`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use dualmint_adapters::{AuditLogAdapter, MemoryRecordStore, NotifierAdapter, SystemClockAdapter};
use dualmint_core::{
    ChainKind, PortError, RecordSubmission, RequestOrigin, TokenAction, TransactionRecorder,
};

use crate::auth::OperatorAuth;

pub type ServiceRecorder =
    TransactionRecorder<MemoryRecordStore, NotifierAdapter, AuditLogAdapter, SystemClockAdapter>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<ServiceRecorder>,
    pub auth: Arc<dyn OperatorAuth>,
}

impl AppState {
    pub fn new(recorder: ServiceRecorder, auth: impl OperatorAuth + 'static) -> Self {
        Self {
            recorder: Arc::new(recorder),
            auth: Arc::new(auth),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/mint", post(mint_handler))
        .route("/api/burn", post(burn_handler))
        .route("/api/transactions", post(transactions_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintRequest {
    recipient: String,
    amount: f64,
    chain: ChainKind,
    tx_hash: String,
    #[serde(default)]
    recipient_email: Option<String>,
}

impl From<MintRequest> for RecordSubmission {
    fn from(req: MintRequest) -> Self {
        RecordSubmission {
            chain: req.chain,
            action: TokenAction::Mint,
            tx_hash: req.tx_hash,
            counterparty_address: req.recipient,
            amount: req.amount,
            contact: req.recipient_email.filter(|c| !c.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BurnRequest {
    target: String,
    amount: f64,
    chain: ChainKind,
    tx_hash: String,
}

impl From<BurnRequest> for RecordSubmission {
    fn from(req: BurnRequest) -> Self {
        RecordSubmission {
            chain: req.chain,
            action: TokenAction::Burn,
            tx_hash: req.tx_hash,
            counterparty_address: req.target,
            amount: req.amount,
            contact: None,
        }
    }
}

/// Error response carrying the port error's kind as `code`.
#[derive(Debug)]
pub struct ApiError(PortError);

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PortError::Validation(_) => StatusCode::BAD_REQUEST,
            PortError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortError::Conflict(_) => StatusCode::CONFLICT,
            PortError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.kind(), "request failed");
        }
        let body = json!({ "error": self.0.to_string(), "code": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn request_origin(headers: &HeaderMap) -> RequestOrigin {
    let client_ip = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_owned);
    RequestOrigin {
        client_ip,
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_owned),
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    bearer_token(headers)
        .and_then(|token| state.auth.identify(token))
        .ok_or_else(|| {
            tracing::warn!("rejected request without a valid operator token");
            ApiError(PortError::Unauthorized)
        })
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, PortError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| PortError::Validation(rejection.body_text()))
}

/// Records one submission on behalf of the authenticated operator.
async fn record(
    state: &AppState,
    headers: &HeaderMap,
    action: TokenAction,
    submission: Result<RecordSubmission, PortError>,
) -> Result<Response, ApiError> {
    let initiator = authenticate(state, headers)?;
    let origin = request_origin(headers);

    let result = match submission {
        Ok(submission) => state.recorder.record(&submission, &initiator, &origin).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            let status = if outcome.already_existed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            tracing::info!(
                %initiator,
                action = action.as_str(),
                tx_hash = %outcome.record.tx_hash,
                already_existed = outcome.already_existed,
                "transaction recorded"
            );
            Ok((status, Json(outcome.into_receipt())).into_response())
        }
        Err(err) => {
            state
                .recorder
                .record_failure(action, &initiator, &origin, &err)
                .await;
            Err(err.into())
        }
    }
}

async fn mint_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<MintRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let submission = parse_body(body).map(RecordSubmission::from);
    record(&state, &headers, TokenAction::Mint, submission).await
}

async fn burn_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let submission = parse_body(body).map(RecordSubmission::from);
    record(&state, &headers, TokenAction::Burn, submission).await
}

async fn transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RecordSubmission>, JsonRejection>,
) -> Result<Response, ApiError> {
    let submission = match parse_body(body) {
        Ok(submission) => submission,
        Err(err) => {
            // Without a parsed body there is no action to attribute the
            // failure to, so only authentication is checked here.
            authenticate(&state, &headers)?;
            return Err(err.into());
        }
    };
    let action = submission.action;
    record(&state, &headers, action, Ok(submission)).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.recorder.health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if health.is_healthy() { "ok" } else { "degraded" },
        "storeOk": health.store_ok,
        "storeError": health.store_error,
        "notifierConfigured": health.notifier_configured,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (status, Json(body))
}

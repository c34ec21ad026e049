//! Mining Rewards Server
//!
//! HTTP surface over the mining engine and the claim ledger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::amount::Amount;
use crate::config::{Config, ConfigHandle};
use crate::error::{ClaimError, RejectionReason, SessionError, StoreError};
use crate::ledger::{ClaimLedger, ClaimReceipt, ClaimSubmission, ClaimView};
use crate::models::{
    BalanceView, ClaimKind, ClaimMode, MiningSession, RiskLevel, UserId, UserReputation,
};
use crate::session::{MiningEngine, SessionLength};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

pub struct AppState {
    pub engine: Arc<MiningEngine>,
    pub ledger: Arc<ClaimLedger>,
    pub config: ConfigHandle,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config", get(config_handler))
        .route("/admin/reload", post(reload_handler))
        .route("/sessions", post(start_session_handler))
        .route("/sessions/:user_id", get(session_status_handler))
        .route("/sessions/:user_id/multiplier", post(multiplier_handler))
        .route("/sessions/:user_id/sweep", post(sweep_handler))
        .route("/sessions/:user_id/history", get(session_history_handler))
        .route("/balances/:user_id", get(balance_handler))
        .route("/claims", post(submit_claim_handler))
        .route("/claims/:tracking_id", get(claim_status_handler))
        .route("/claims/:tracking_id/approve", post(approve_handler))
        .route("/claims/:tracking_id/reject", post(reject_handler))
        .route("/claims/:tracking_id/cancel", post(cancel_handler))
        .route("/users/:user_id/claims", get(claim_history_handler))
        .route("/users/:user_id/reputation", put(reputation_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub message: String,
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::Unavailable(_) => {
                error!("Store unavailable: {}", e);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "store_unavailable",
                    "storage is temporarily unavailable",
                )
            }
            StoreError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", "not_found", e.to_string())
            }
            StoreError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", "conflict", e.to_string())
            }
            StoreError::OutOfRange(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request",
                "amount_out_of_range",
                e.to_string(),
            ),
        }
    }
}

impl From<RejectionReason> for ApiError {
    fn from(reason: RejectionReason) -> Self {
        let status = match reason {
            RejectionReason::CooldownActive { .. } | RejectionReason::DailyLimitExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            RejectionReason::PendingClaimExists { .. } => StatusCode::CONFLICT,
            RejectionReason::InvalidAmount
            | RejectionReason::InsufficientBalance { .. }
            | RejectionReason::InvalidWallet(_)
            | RejectionReason::HighRiskRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, "claim_rejected", reason.code(), reason.to_string())
    }
}

impl From<ClaimError> for ApiError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::Rejected(reason) => reason.into(),
            ClaimError::NotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                "claim_not_found",
                format!("claim {} not found", id),
            ),
            ClaimError::InvalidTransition { .. } => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                "invalid_transition",
                e.to_string(),
            ),
            ClaimError::Store(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyActive => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                "session_already_active",
                e.to_string(),
            ),
            SessionError::NotEligible(_) => Self::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                "not_eligible",
                e.to_string(),
            ),
            SessionError::NoActiveSession => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                "no_active_session",
                e.to_string(),
            ),
            SessionError::InvalidMultiplier(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request",
                "invalid_multiplier",
                e.to_string(),
            ),
            SessionError::Store(e) => e.into(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// SERVICE
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "healthy": true,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config.snapshot())
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> ApiResult<Config> {
    match state.config.reload() {
        Ok(config) => {
            info!("Configuration reloaded");
            Ok(Json(config))
        }
        Err(e) => {
            error!("Configuration reload failed: {:#}", e);
            Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_config",
                "invalid_config",
                format!("{:#}", e),
            ))
        }
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub extended: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub accumulated: Amount,
    pub remaining_seconds: i64,
    pub daily_rate: Amount,
    pub session: MiningSession,
}

#[derive(Debug, Deserialize)]
pub struct MultiplierRequest {
    pub multiplier_bps: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub swept: Amount,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<MiningSession>), ApiError> {
    let length = if request.extended {
        SessionLength::Extended
    } else {
        SessionLength::Standard
    };
    let session = state.engine.start_session(request.user_id, length).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn session_status_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<SessionStatusResponse> {
    let observation = state
        .engine
        .observe(user_id, state.engine.now())
        .await?
        .ok_or(SessionError::NoActiveSession)?;
    Ok(Json(SessionStatusResponse {
        accumulated: observation.accumulated,
        remaining_seconds: observation.remaining_secs,
        daily_rate: observation.daily_rate,
        session: observation.session,
    }))
}

async fn multiplier_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(request): Json<MultiplierRequest>,
) -> ApiResult<MiningSession> {
    let session = state
        .engine
        .set_multiplier(user_id, request.multiplier_bps)
        .await?;
    Ok(Json(session))
}

async fn sweep_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<SweepResponse> {
    let swept = state.engine.sweep(user_id).await?;
    Ok(Json(SweepResponse { swept }))
}

async fn session_history_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<MiningSession>> {
    Ok(Json(state.engine.history(user_id, query.limit()).await?))
}

async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<BalanceView> {
    Ok(Json(state.engine.balance(user_id, state.engine.now()).await?))
}

// ============================================================================
// CLAIMS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitClaimRequest {
    pub user_id: UserId,
    pub kind: ClaimMode,
    #[serde(default)]
    pub amount: Option<Amount>,
    pub wallet_address: String,
    pub network: String,
}

impl SubmitClaimRequest {
    fn into_submission(self) -> Result<ClaimSubmission, ApiError> {
        let kind = match (self.kind, self.amount) {
            (ClaimMode::Manual, Some(amount)) => ClaimKind::Manual { amount },
            (ClaimMode::Manual, None) => return Err(RejectionReason::InvalidAmount.into()),
            (ClaimMode::Bulk, None) => ClaimKind::Bulk,
            (ClaimMode::Bulk, Some(_)) => {
                return Err(ApiError::bad_request("bulk claims take no amount"))
            }
        };
        Ok(ClaimSubmission {
            user_id: self.user_id,
            kind,
            wallet_address: self.wallet_address,
            network: self.network,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

async fn submit_claim_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitClaimRequest>,
) -> Result<(StatusCode, Json<ClaimReceipt>), ApiError> {
    let submission = request.into_submission()?;
    let receipt = state.ledger.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn claim_status_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> ApiResult<ClaimView> {
    Ok(Json(state.ledger.status(&tracking_id).await?))
}

async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> ApiResult<ClaimView> {
    Ok(Json(state.ledger.approve(&tracking_id).await?))
}

async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<ClaimView> {
    if request.reason.trim().is_empty() {
        return Err(ApiError::bad_request("a rejection reason is required"));
    }
    Ok(Json(state.ledger.reject(&tracking_id, &request.reason).await?))
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> ApiResult<ClaimView> {
    Ok(Json(state.ledger.cancel(&tracking_id).await?))
}

async fn claim_history_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<ClaimView>> {
    let claims = state
        .ledger
        .history(user_id, query.limit(), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(claims))
}

#[derive(Debug, Deserialize)]
pub struct ReputationUpdate {
    pub score: i32,
    pub instant_limit_usd: f64,
    pub express_limit_usd: f64,
    pub risk_level: RiskLevel,
}

async fn reputation_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(update): Json<ReputationUpdate>,
) -> ApiResult<UserReputation> {
    let limits = [update.instant_limit_usd, update.express_limit_usd];
    if limits.iter().any(|l| !l.is_finite() || *l < 0.0) {
        return Err(ApiError::bad_request("limits must be non-negative numbers"));
    }
    let reputation = UserReputation {
        user_id,
        score: update.score,
        instant_limit_usd: update.instant_limit_usd,
        express_limit_usd: update.express_limit_usd,
        risk_level: update.risk_level,
    };
    Ok(Json(state.ledger.set_reputation(reputation).await?))
}

/// Run the server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting Mining Rewards server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::LoggingSettlement;
    use crate::locks::UserLocks;
    use crate::pricing::FixedRate;
    use crate::storage::SqliteStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    const WALLET: &str = "UQBvW8Z5huBkMJYdnfAEM5JqTNkuWX3diqYENkWsIL0XggGG";

    fn app() -> (Router, Arc<ManualClock>) {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0));
        let locks = Arc::new(UserLocks::new());
        let config = ConfigHandle::new(Config::default());

        let engine = Arc::new(MiningEngine::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let ledger = Arc::new(ClaimLedger::new(
            store,
            config.clone(),
            clock.clone(),
            locks,
            Arc::new(FixedRate(0.1)),
            Arc::new(LoggingSettlement),
        ));
        let state = Arc::new(AppState {
            engine,
            ledger,
            config,
            started_at: std::time::Instant::now(),
        });
        (create_router(state), clock)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_http() {
        let (app, clock) = app();

        let (status, body) = call(&app, "POST", "/sessions", Some(serde_json::json!({ "user_id": 7 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "active");

        let (status, body) = call(&app, "POST", "/sessions", Some(serde_json::json!({ "user_id": 7 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "session_already_active");

        clock.advance(Duration::hours(12));
        let (status, body) = call(&app, "GET", "/sessions/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accumulated"], "25");
        assert_eq!(body["remaining_seconds"], 12 * 3600);

        let (status, body) = call(&app, "GET", "/balances/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accumulating"], "25");
        assert_eq!(body["claimable"], "0");

        let (status, body) = call(&app, "GET", "/sessions/8", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_active_session");

        let (status, body) = call(
            &app,
            "POST",
            "/sessions/7/multiplier",
            Some(serde_json::json!({ "multiplier_bps": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_multiplier");

        let (status, body) = call(&app, "POST", "/sessions/7/sweep", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["swept"], "25");
        let (_, body) = call(&app, "GET", "/balances/7", None).await;
        assert_eq!(body["claimable"], "25");
        assert_eq!(body["accumulating"], "0");
    }

    #[tokio::test]
    async fn test_claim_flow_over_http() {
        let (app, clock) = app();
        call(&app, "POST", "/sessions", Some(serde_json::json!({ "user_id": 7 }))).await;
        clock.advance(Duration::hours(12));

        // Nothing claimable yet, accumulated is not claimable for manual claims
        let manual = serde_json::json!({
            "user_id": 7,
            "kind": "manual",
            "amount": "10",
            "wallet_address": WALLET,
            "network": "TON",
        });
        let (status, body) = call(&app, "POST", "/claims", Some(manual)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "insufficient_balance");
        assert_eq!(body["error"], "claim_rejected");

        let bulk = serde_json::json!({
            "user_id": 7,
            "kind": "bulk",
            "wallet_address": WALLET,
            "network": "TON",
        });
        let (status, body) = call(&app, "POST", "/claims", Some(bulk)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["amount"], "25");
        assert_eq!(body["processing_tier"], "INSTANT");
        assert_eq!(body["status"], "COMPLETED");
        assert_eq!(body["recommended_action"], "PROCESS_IMMEDIATELY");

        let tracking_id = body["tracking_id"].as_str().unwrap().to_string();
        let (status, body) = call(&app, "GET", &format!("/claims/{}", tracking_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tracking_id"], tracking_id.as_str());

        let (status, body) = call(&app, "POST", &format!("/claims/{}/cancel", tracking_id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_transition");

        let (status, body) = call(&app, "GET", "/users/7/claims?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "GET", "/claims/RZC-NOPE", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "claim_not_found");
    }

    #[tokio::test]
    async fn test_reputation_update() {
        let (app, _) = app();
        let update = serde_json::json!({
            "score": 800,
            "instant_limit_usd": 1000.0,
            "express_limit_usd": 5000.0,
            "risk_level": "LOW",
        });
        let (status, body) = call(&app, "PUT", "/users/7/reputation", Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], 7);
        assert_eq!(body["score"], 800);

        let bad = serde_json::json!({
            "score": 800,
            "instant_limit_usd": -1.0,
            "express_limit_usd": 5000.0,
            "risk_level": "LOW",
        });
        let (status, _) = call(&app, "PUT", "/users/7/reputation", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_manual_claim_requires_amount() {
        let (app, _) = app();
        let request = serde_json::json!({
            "user_id": 7,
            "kind": "manual",
            "wallet_address": WALLET,
            "network": "TON",
        });
        let (status, body) = call(&app, "POST", "/claims", Some(request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_amount");
    }
}

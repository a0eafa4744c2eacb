//! Axum REST API handlers.

use std::sync::{Arc, LazyLock};

use alloy_primitives::{Address, B256};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::aggregator::{filter_pools, Aggregator};
use crate::cache::ListingCache;
use crate::chat;
use crate::config::VerificationConfig;
use crate::db;
use crate::errors::GatewayError;
use crate::models::PoolSummary;
use crate::tx::{self, ActionRequest, CreateContriboostRequest, CreateGoalFundRequest, CreatedKind};
use crate::verification::{self, ProofVerifier, VerifyRequest};

pub struct ApiState {
    pub pool: SqlitePool,
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<ListingCache>,
    pub verifier: Option<Arc<dyn ProofVerifier>>,
    pub verification: VerificationConfig,
    pub referral_tag: Option<Vec<u8>>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn now_secs() -> u64 {
    now().max(0) as u64
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsResponse {
    pub count: usize,
    pub pools: Vec<PoolSummary>,
    pub fetch_errors: Vec<String>,
    pub refreshed_at: i64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn error_response(e: GatewayError) -> Response {
    let status = match &e {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::Body(rejection) => rejection.status(),
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
        GatewayError::Rpc(_) | GatewayError::Transient(_) | GatewayError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {e}");
    }
    (
        status,
        Json(json!(ErrorResponse {
            error: e.to_string()
        })),
    )
        .into_response()
}

fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(json!(body))).into_response()
}

fn parse_address(raw: &str) -> Result<Address, GatewayError> {
    raw.trim()
        .parse()
        .map_err(|_| GatewayError::Validation(format!("Invalid address: {raw}")))
}

// ─────────────────────────────────────────────────────────
// Meta
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /chains`
///
/// Parameters a wallet needs to add or switch to each supported network.
pub async fn chains(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let chains = state.aggregator.networks().add_chain_params();
    ok(json!({ "count": chains.len(), "chains": chains }))
}

// ─────────────────────────────────────────────────────────
// Pools
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PoolsQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub account: Option<String>,
}

/// `GET /pools?search=&status=&account=`
///
/// Served from the background snapshot unless an account is given, in which
/// case the listing is read live so it can carry that account's status.
pub async fn list_pools(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PoolsQuery>,
) -> impl IntoResponse {
    let viewer = match query.account.as_deref().map(parse_address).transpose() {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };

    let listing = match viewer {
        None => state.cache.get_or_fill(&state.aggregator, now_secs()).await,
        Some(account) => state.aggregator.list_pools(Some(account), now_secs()).await,
    };

    let pools = filter_pools(
        &listing.pools,
        query.search.as_deref(),
        query.status.as_deref(),
    );
    ok(PoolsResponse {
        count: pools.len(),
        pools,
        fetch_errors: listing.fetch_errors,
        refreshed_at: listing.refreshed_at,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

/// `GET /pools/:network/:address?account=`
pub async fn pool_detail(
    State(state): State<Arc<ApiState>>,
    Path((network, address)): Path<(String, String)>,
    Query(query): Query<AccountQuery>,
) -> impl IntoResponse {
    let parsed = parse_address(&address)
        .and_then(|a| Ok((a, query.account.as_deref().map(parse_address).transpose()?)));
    let (address, viewer) = match parsed {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    match state
        .aggregator
        .pool_detail(&network, address, viewer, now_secs())
        .await
    {
        Ok(detail) => ok(detail),
        Err(e) => error_response(e),
    }
}

/// `GET /accounts/:address`
pub async fn account(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    match parse_address(&address) {
        Ok(user) => ok(state.aggregator.account(user, now_secs()).await),
        Err(e) => error_response(e),
    }
}

/// `GET /stats`
pub async fn stats(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.aggregator.stats(now_secs()).await {
        Ok(stats) => ok(stats),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────

/// `POST /tx/:network/contriboost`
pub async fn prepare_contriboost(
    State(state): State<Arc<ApiState>>,
    Path(network): Path<String>,
    Json(req): Json<CreateContriboostRequest>,
) -> impl IntoResponse {
    let prepared = state.aggregator.network(&network).and_then(|(net, _)| {
        tx::create_contriboost(net, &req, now_secs(), state.referral_tag.as_deref())
    });
    match prepared {
        Ok(tx) => ok(tx),
        Err(e) => error_response(e),
    }
}

/// `POST /tx/:network/goalfund`
pub async fn prepare_goal_fund(
    State(state): State<Arc<ApiState>>,
    Path(network): Path<String>,
    Json(req): Json<CreateGoalFundRequest>,
) -> impl IntoResponse {
    let prepared = state.aggregator.network(&network).and_then(|(net, _)| {
        tx::create_goal_fund(net, &req, now_secs(), state.referral_tag.as_deref())
    });
    match prepared {
        Ok(tx) => ok(tx),
        Err(e) => error_response(e),
    }
}

/// `POST /tx/:network/:address/:action`
pub async fn prepare_action(
    State(state): State<Arc<ApiState>>,
    Path((network, address, action)): Path<(String, String, String)>,
    body: Option<Json<ActionRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let prepared = parse_address(&address).and_then(|target| {
        let (net, _) = state.aggregator.network(&network)?;
        tx::prepare_action(net, target, &action, &req, state.referral_tag.as_deref())
    });
    match prepared {
        Ok(tx) => ok(tx),
        Err(e) => error_response(e),
    }
}

/// `GET /tx/:network/receipt/:hash/:kind`
///
/// Resolves the address of a contract created by a factory transaction.
pub async fn created_contract(
    State(state): State<Arc<ApiState>>,
    Path((network, hash, kind)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let (Ok(hash), Ok(kind)) = (hash.parse::<B256>(), kind.parse::<CreatedKind>()) else {
        return error_response(GatewayError::Validation(
            "Invalid transaction hash or contract kind".to_string(),
        ));
    };
    let resolved = match state.aggregator.network(&network) {
        Ok((net, reader)) => tx::resolve_created(net, reader, hash, kind).await,
        Err(e) => Err(e),
    };
    match resolved {
        Ok(created) => ok(created),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    pub email: Option<String>,
}

/// U+FEFF counts as whitespace here, as it does in browsers.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s\x{FEFF}@]+@[^\s\x{FEFF}@]+\.[^\s\x{FEFF}@]+$")
        .expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// `POST /api/subscribe`
pub async fn subscribe(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<SubscribeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let email = match payload.map_err(GatewayError::from) {
        Ok(Json(req)) => req.email.unwrap_or_default(),
        Err(e) => return subscribe_failed(e),
    };
    if !is_valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!(MessageResponse {
                message: "Invalid email address"
            })),
        )
            .into_response();
    }

    match db::insert_subscription(&state.pool, &email, now()).await {
        Ok(true) => {
            info!("New subscription stored");
            ok(MessageResponse {
                message: "Subscription successful",
            })
        }
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(json!(MessageResponse {
                message: "Email already subscribed"
            })),
        )
            .into_response(),
        Err(e) => subscribe_failed(e),
    }
}

fn subscribe_failed(e: GatewayError) -> Response {
    error!("Error subscribing: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!(MessageResponse {
            message: "Internal server error"
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Verification
// ─────────────────────────────────────────────────────────

/// `POST /api/verify`
///
/// Always answers HTTP 200; failures are reported in the body's `code`.
pub async fn verify(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<VerifyRequest>,
) -> impl IntoResponse {
    let resp = verification::verify(
        &state.pool,
        state.verifier.as_deref(),
        &state.verification,
        &req,
        now(),
    )
    .await;
    if let Some(code) = resp.code() {
        warn!("Verification rejected: {code}");
    }
    ok(resp)
}

/// `GET /api/verify/status/:userId`
pub async fn verify_status(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let Some(user_id) = verification::normalize_user_id(&user_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "verified": false,
                "reason": "Invalid user ID format. Expected Ethereum address.",
                "error_code": "INVALID_USER_ID_FORMAT",
            })),
        )
            .into_response();
    };

    match verification::status(&state.pool, &user_id, state.verification.ttl_days, now()).await {
        Ok(status) => ok(status),
        Err(e) => {
            error!("Verification status query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "verified": false,
                    "reason": "Database query error",
                    "error_code": "DATABASE_ERROR",
                })),
            )
                .into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────

const WALLET_HEADER: &str = "x-wallet-address";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub content: String,
}

async fn chat_access(
    state: &ApiState,
    network: &str,
    contract: &str,
    headers: &HeaderMap,
) -> Result<chat::ChatAccess, GatewayError> {
    let caller = headers.get(WALLET_HEADER).and_then(|v| v.to_str().ok());
    chat::authorize(&state.aggregator, network, contract, caller)
        .await
        .inspect_err(|e| warn!("Chat access denied for {contract}: {e}"))
}

/// `GET /chat/:network/:address`
pub async fn chat_history(
    State(state): State<Arc<ApiState>>,
    Path((network, address)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let access = match chat_access(&state, &network, &address, &headers).await {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };
    match chat::history(&state.pool, &access).await {
        Ok(messages) => ok(json!({
            "contract_address": access.contract,
            "count": messages.len(),
            "messages": messages,
        })),
        Err(e) => error_response(e),
    }
}

/// `POST /chat/:network/:address`
pub async fn chat_post(
    State(state): State<Arc<ApiState>>,
    Path((network, address)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    let access = match chat_access(&state, &network, &address, &headers).await {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };
    match chat::post(&state.pool, &access, &body.content, now()).await {
        Ok(message) => (StatusCode::CREATED, Json(json!(message))).into_response(),
        Err(e) => error_response(e),
    }
}

/// `PUT /chat/:network/:address/:id`
pub async fn chat_edit(
    State(state): State<Arc<ApiState>>,
    Path((network, address, id)): Path<(String, String, i64)>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    let access = match chat_access(&state, &network, &address, &headers).await {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };
    match chat::edit(&state.pool, &access, id, &body.content, now()).await {
        Ok(message) => ok(message),
        Err(e) => error_response(e),
    }
}

/// `DELETE /chat/:network/:address/:id`
pub async fn chat_delete(
    State(state): State<Arc<ApiState>>,
    Path((network, address, id)): Path<(String, String, i64)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let access = match chat_access(&state, &network, &address, &headers).await {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };
    match chat::delete(&state.pool, &access, id).await {
        Ok(()) => ok(json!({ "status": "success" })),
        Err(e) => error_response(e),
    }
}

use crate::broker::Broker;
use crate::db::{Database, LiquidityEvent, QuoteRecord, SwapRecord};
use crate::error::SwapError;
use crate::types::{Proof, SwapQuote, SwapRequest, SwapStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub db: Database,
}

/// Create the API router
pub fn create_router(state: AppState, cors_origins: Vec<String>) -> Router {
    let cors = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        // Swap endpoints
        .route("/quote", post(request_quote))
        .route("/quote/:id/accept", post(accept_quote))
        .route("/quote/:id/complete", post(complete_quote))
        .route("/quote/:id", get(get_quote_status))
        .route("/quotes", get(list_quotes))
        // Liquidity endpoints
        .route("/liquidity", get(get_liquidity))
        .route("/liquidity/:mint_url/events", get(get_liquidity_events))
        // Health & metrics
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ===== Request/Response Types =====

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub source_mint: String,
    pub target_mint: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_pubkey: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub quote: SwapQuote,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptQuoteRequest {
    /// Compressed client key, hex. Falls back to the key supplied with the
    /// quote request.
    #[serde(default)]
    pub client_pubkey: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptQuoteResponse {
    /// Target-mint proofs locked to `clientPubkey + T`.
    pub target_proofs: Vec<Proof>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteQuoteRequest {
    /// Source-mint proofs locked to the quote's tweaked broker key.
    pub source_proofs: Vec<Proof>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteQuoteResponse {
    /// The revealed adaptor secret, hex. Together with the client's own key
    /// it spends the locked target proofs.
    pub adaptor_secret: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteStatusResponse {
    pub quote: QuoteRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListQuotesQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiquidityResponse {
    pub mints: Vec<MintLiquidity>,
    pub total_balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MintLiquidity {
    pub mint_url: String,
    pub name: String,
    pub balance: u64,
    pub unit: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiquidityEventsResponse {
    pub events: Vec<LiquidityEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub total_quotes: u64,
    pub completed_swaps: u64,
    pub failed_swaps: u64,
    pub total_volume: u64,
    pub total_fees: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn rfc3339(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_default()
        .to_rfc3339()
}

/// Move the ledger's pending inventory changes into the database.
async fn persist_ledger_events(state: &AppState) -> Result<(), ApiError> {
    for event in state.broker.drain_ledger_events().await {
        let record = LiquidityEvent {
            id: None,
            mint_url: event.mint_url,
            event_type: event.event_type.as_str().to_string(),
            amount: event.amount as i64,
            balance_after: event.balance_after as i64,
            quote_id: event.quote_id,
            created_at: rfc3339(event.timestamp),
        };
        state
            .db
            .record_liquidity_event(&record)
            .await
            .map_err(ApiError::from)?;
    }
    Ok(())
}

// ===== Handlers =====

/// Request a swap quote
async fn request_quote(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let swap_request = SwapRequest {
        client_id: None, // Anonymous for HTTP API
        source_mint: req.source_mint.clone(),
        target_mint: req.target_mint.clone(),
        amount: req.amount,
        client_public_key: req.client_pubkey.clone(),
    };

    let quote = state
        .broker
        .request_quote(swap_request)
        .await
        .map_err(ApiError::from)?;

    let quote_record = QuoteRecord {
        id: quote.quote_id.clone(),
        source_mint: quote.source_mint.clone(),
        target_mint: quote.target_mint.clone(),
        amount_in: quote.input_amount as i64,
        amount_out: quote.output_amount as i64,
        fee: quote.fee as i64,
        fee_rate: quote.fee_rate,
        broker_pubkey: hex::encode(&quote.broker_public_key),
        adaptor_point: hex::encode(&quote.adaptor_point),
        tweaked_pubkey: hex::encode(&quote.tweaked_pubkey),
        status: SwapStatus::Pending.to_string(),
        created_at: rfc3339(quote.created_at),
        expires_at: rfc3339(quote.expires_at),
        accepted_at: None,
        completed_at: None,
        client_pubkey: req.client_pubkey,
        error_message: None,
    };

    state
        .db
        .create_quote(&quote_record)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(QuoteResponse { quote }))
}

/// Accept a quote: the broker locks target-mint tokens to the client
async fn accept_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AcceptQuoteRequest>,
) -> Result<Json<AcceptQuoteResponse>, ApiError> {
    let quote = state
        .db
        .get_quote(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Quote {} not found", id)))?;

    let client_pubkey_hex = req
        .client_pubkey
        .or(quote.client_pubkey)
        .ok_or_else(|| ApiError::BadRequest("No client_pubkey provided".to_string()))?;
    let client_pubkey = hex::decode(&client_pubkey_hex)
        .map_err(|e| ApiError::BadRequest(format!("Invalid client pubkey hex: {}", e)))?;

    let target_proofs = state
        .broker
        .accept_quote(&id, &client_pubkey)
        .await
        .map_err(ApiError::from)?;

    state
        .db
        .update_quote_status(&id, SwapStatus::Accepted, None)
        .await
        .map_err(ApiError::from)?;

    let swap_record = SwapRecord {
        id: Uuid::new_v4().to_string(),
        quote_id: id.clone(),
        source_proofs: None,
        target_proofs: Some(
            serde_json::to_string(&target_proofs)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        ),
        adaptor_signature: None,
        completed_signature: None,
        adaptor_secret: None,
        started_at: Utc::now().to_rfc3339(),
        completed_at: None,
    };
    state
        .db
        .create_swap(&swap_record)
        .await
        .map_err(ApiError::from)?;

    persist_ledger_events(&state).await?;

    Ok(Json(AcceptQuoteResponse { target_proofs }))
}

/// Complete a quote after receiving the client's witnessed source proofs
async fn complete_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteQuoteRequest>,
) -> Result<Json<CompleteQuoteResponse>, ApiError> {
    let source_proofs_json = serde_json::to_string(&req.source_proofs)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let adaptor_secret = state
        .broker
        .complete_swap(&id, req.source_proofs)
        .await
        .map_err(ApiError::from)?;

    state
        .db
        .update_quote_status(&id, SwapStatus::Completed, None)
        .await
        .map_err(ApiError::from)?;

    if let Some(swap) = state
        .db
        .get_swap_by_quote(&id)
        .await
        .map_err(ApiError::from)?
    {
        state
            .db
            .complete_swap(&swap.id, &source_proofs_json, None, Some(adaptor_secret.as_str()))
            .await
            .map_err(ApiError::from)?;
    }

    persist_ledger_events(&state).await?;

    Ok(Json(CompleteQuoteResponse {
        adaptor_secret,
        status: SwapStatus::Completed.to_string(),
    }))
}

/// Get quote status
async fn get_quote_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuoteStatusResponse>, ApiError> {
    let quote = state
        .db
        .get_quote(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Quote {} not found", id)))?;

    let swap = state
        .db
        .get_swap_by_quote(&id)
        .await
        .map_err(ApiError::from)?
        .and_then(|s| serde_json::to_value(s).ok());

    Ok(Json(QuoteStatusResponse { quote, swap }))
}

/// List quotes
async fn list_quotes(
    State(state): State<AppState>,
    Query(query): Query<ListQuotesQuery>,
) -> Result<Json<Vec<QuoteRecord>>, ApiError> {
    let status = query.status.and_then(|s| s.parse::<SwapStatus>().ok());

    let quotes = state
        .db
        .list_quotes(status, query.limit)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(quotes))
}

/// Get liquidity status
async fn get_liquidity(
    State(state): State<AppState>,
) -> Result<Json<LiquidityResponse>, ApiError> {
    let status = state.broker.get_liquidity_status().await;

    let mints: Vec<MintLiquidity> = status
        .mints
        .into_iter()
        .map(|mb| MintLiquidity {
            mint_url: mb.mint_url,
            name: mb.name,
            balance: mb.balance,
            unit: "sat".to_string(),
        })
        .collect();

    let total_balance = mints.iter().map(|m| m.balance).sum();

    Ok(Json(LiquidityResponse {
        mints,
        total_balance,
    }))
}

/// Get liquidity events for a mint
async fn get_liquidity_events(
    State(state): State<AppState>,
    Path(mint_url): Path<String>,
) -> Result<Json<LiquidityEventsResponse>, ApiError> {
    let events = state
        .db
        .get_liquidity_events(&mint_url, 100)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(LiquidityEventsResponse { events }))
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    // Test database connection
    let db_status = match state.db.pool().acquire().await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        database: db_status,
    }))
}

/// Get metrics
async fn get_metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ApiError> {
    let all_quotes = state
        .db
        .list_quotes(None, 10000)
        .await
        .map_err(ApiError::from)?;

    let total_quotes = all_quotes.len() as u64;
    let completed_swaps = all_quotes
        .iter()
        .filter(|q| q.status == SwapStatus::Completed.to_string())
        .count() as u64;
    let failed_swaps = all_quotes
        .iter()
        .filter(|q| q.status == SwapStatus::Failed.to_string())
        .count() as u64;

    let total_volume: i64 = all_quotes
        .iter()
        .filter(|q| q.status == SwapStatus::Completed.to_string())
        .map(|q| q.amount_in)
        .sum();

    let total_fees: i64 = all_quotes
        .iter()
        .filter(|q| q.status == SwapStatus::Completed.to_string())
        .map(|q| q.fee)
        .sum();

    Ok(Json(MetricsResponse {
        total_quotes,
        completed_swaps,
        failed_swaps,
        total_volume: total_volume as u64,
        total_fees: total_fees as u64,
    }))
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    Broker(SwapError),
}

impl From<SwapError> for ApiError {
    fn from(err: SwapError) -> Self {
        ApiError::Broker(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Broker(err) => match err {
                SwapError::QuoteNotFound(msg) => (StatusCode::NOT_FOUND, "QUOTE_NOT_FOUND", msg),
                SwapError::QuoteExpired(msg) => (StatusCode::BAD_REQUEST, "QUOTE_EXPIRED", msg),
                SwapError::InsufficientLiquidity { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INSUFFICIENT_LIQUIDITY",
                    err.to_string(),
                ),
                SwapError::AmountTooLow { .. } | SwapError::AmountTooHigh { .. } => {
                    (StatusCode::BAD_REQUEST, "AMOUNT_OUT_OF_BOUNDS", err.to_string())
                }
                SwapError::UnsupportedMint(_) | SwapError::SameMintSwap => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_MINT", err.to_string())
                }
                SwapError::InvalidSwapRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_SWAP_REQUEST", msg)
                }
                SwapError::Encoding(msg) => (StatusCode::BAD_REQUEST, "ENCODING_ERROR", msg),
                SwapError::MintRejected { .. } => {
                    (StatusCode::BAD_GATEWAY, "MINT_REJECTED", err.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "BROKER_ERROR",
                    err.to_string(),
                ),
            },
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

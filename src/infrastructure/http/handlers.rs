//! Control-Plane Handlers
//!
//! Thin translation of external add/remove/list/reconnect requests into
//! registry and store actions. Handlers never touch the socket or the
//! pool directly; everything goes through the ports carried in
//! [`AppState`].

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::ports::{CandleStore, StreamConnection, SubscriptionStore};
use crate::application::services::SubscriptionRegistry;
use crate::domain::market::{Candle, QuoteSnapshot, Timeframe};
use crate::domain::subscription::{Subscription, SubscriptionKey, SubscriptionKind};
use crate::infrastructure::cache::QuoteCache;
use crate::infrastructure::http::error::ApiError;

/// Shared state of the control plane.
#[derive(Clone)]
pub struct AppState {
    /// Subscription lifecycle service.
    pub registry: Arc<SubscriptionRegistry>,
    /// Durable subscription rows.
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Durable candle rows.
    pub candles: Arc<dyn CandleStore>,
    /// Latest-quote cache.
    pub quotes: Arc<QuoteCache>,
    /// Provider connection, for state reporting and reconnects.
    pub connection: Arc<dyn StreamConnection>,
    /// Process start time, for uptime reporting.
    pub started_at: Instant,
}

/// Body of `POST /symbols` and `DELETE /symbols`.
#[derive(Debug, Deserialize)]
pub struct SymbolRequest {
    /// Exchange name.
    pub exchange: String,
    /// Symbol short name.
    pub symbol: String,
    /// "candle" or "quote".
    pub kind: String,
    /// Interval string; required for candle subscriptions.
    #[serde(default)]
    pub timeframe: Option<String>,
}

impl SymbolRequest {
    fn into_key(self) -> Result<SubscriptionKey, ApiError> {
        let kind = SubscriptionKind::parse(&self.kind)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown kind: {}", self.kind)))?;
        let timeframe = match self.timeframe.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(raw.parse::<Timeframe>()?),
            None => None,
        };
        Ok(SubscriptionKey::new(
            self.exchange,
            self.symbol,
            kind,
            timeframe,
        )?)
    }
}

/// `GET /` — liveness info.
pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "tradingview-stream-ingest",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "connection": state.connection.state(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// `GET /health` — 200 while the process is up.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /reconnect` — tear down and re-establish the provider connection,
/// re-subscribing every enabled row.
pub async fn reconnect(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.registry.reconcile().await?;
    Ok(StatusCode::OK)
}

/// `POST /symbols` — add a subscription.
pub async fn create_symbol(
    State(state): State<AppState>,
    Json(request): Json<SymbolRequest>,
) -> Result<Json<Subscription>, ApiError> {
    let key = request.into_key()?;
    let subscription = state.registry.subscribe(key).await?;
    Ok(Json(subscription))
}

/// `DELETE /symbols` — unsubscribe one row.
pub async fn delete_symbol(
    State(state): State<AppState>,
    Json(request): Json<SymbolRequest>,
) -> Result<Json<Subscription>, ApiError> {
    let key = request.into_key()?;
    let Some(subscription) = state.subscriptions.find_enabled_by_key(&key).await? else {
        return Err(ApiError::NotFound("subscription not found".to_string()));
    };
    let updated = state.registry.unsubscribe(&subscription).await?;
    Ok(Json(updated))
}

/// `DELETE /symbols/unsubscribe` — unsubscribe every enabled row.
pub async fn unsubscribe_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let count = state.registry.unsubscribe_all().await?;
    Ok(Json(json!({
        "message": "unsubscribed all symbols",
        "count": count,
    })))
}

/// `GET /symbols` — list enabled rows.
pub async fn list_symbols(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.subscriptions.list_enabled().await?))
}

/// `GET /symbols/{exchange}/{symbol}` — enabled rows for one pair.
pub async fn symbols_for_pair(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(
        state
            .subscriptions
            .list_enabled_for_symbol(&exchange, &symbol)
            .await?,
    ))
}

/// `GET /symbols/session/{session_id}/status` — row by provider session id.
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Subscription>, ApiError> {
    state
        .subscriptions
        .find_by_session_id(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))
}

/// `GET /candles/{exchange}/{symbol}/{timeframe}/{limit}` — most recent
/// candles in ascending timestamp order.
pub async fn get_candles(
    State(state): State<AppState>,
    Path((exchange, symbol, timeframe, limit)): Path<(String, String, String, i64)>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let timeframe: Timeframe = timeframe.parse()?;
    if limit <= 0 {
        return Err(ApiError::BadRequest("limit must be positive".to_string()));
    }
    Ok(Json(
        state
            .candles
            .recent_ascending(&exchange, &symbol, timeframe, limit)
            .await?,
    ))
}

/// `GET /quotes/{exchange}/{symbol}` — cached snapshot.
pub async fn get_quote(
    State(state): State<AppState>,
    Path((exchange, symbol)): Path<(String, String)>,
) -> Result<Json<QuoteSnapshot>, ApiError> {
    let name = format!("{exchange}:{symbol}");
    state
        .quotes
        .get(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no cached quote for {name}")))
}

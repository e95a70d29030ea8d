//! HTTP API for the breakout daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Status (tracked symbols, ledger summary)
//! - Position lookup by symbol
//! - Disabling a symbol
//! - Publishing candles into the streaming feed

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use breakout_domain::{Candle, DomainError, Price, Symbol};
use breakout_exec::{CandleFeed, ExchangePort, ExecError};
use breakout_ledger::PositionSummary;

use crate::error::DaemonError;
use crate::orchestrator::{OrchestratorStatus, StrategyOrchestrator};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<E: ExchangePort + 'static> {
    pub orchestrator: Arc<StrategyOrchestrator<E>>,
    /// Feed that `POST /candles` publishes into, when the daemon runs one
    pub feed: Option<Arc<CandleFeed>>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One closed candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleRequest {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl CandleRequest {
    fn into_candle(self) -> Result<Candle, DomainError> {
        let symbol = Symbol::from_pair(&self.symbol)?;
        for value in [self.open, self.high, self.low, self.close] {
            Price::new(value)?;
        }
        if self.volume < Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "volume cannot be negative: {}",
                self.volume
            )));
        }
        Ok(Candle::new(
            symbol,
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<E>(state: Arc<ApiState<E>>) -> Router
where
    E: ExchangePort + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/positions/:symbol", get(get_position_handler))
        .route("/symbols/:symbol/disable", post(disable_handler))
        .route("/candles", post(candle_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Tracked symbols and ledger summary.
async fn status_handler<E>(
    State(state): State<Arc<ApiState<E>>>,
) -> Result<Json<OrchestratorStatus>, ApiError>
where
    E: ExchangePort + 'static,
{
    let status = state.orchestrator.status().await.map_err(to_error_response)?;
    Ok(Json(status))
}

/// Open position for a symbol.
async fn get_position_handler<E>(
    State(state): State<Arc<ApiState<E>>>,
    Path(symbol): Path<String>,
) -> Result<Json<PositionSummary>, ApiError>
where
    E: ExchangePort + 'static,
{
    let symbol = parse_symbol(&symbol)?;
    let position = state
        .orchestrator
        .ledger()
        .position(&symbol)
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("No open position for {}", symbol),
                }),
            )
        })?;

    Ok(Json(PositionSummary::from(&position)))
}

/// Stop evaluating a symbol.
async fn disable_handler<E>(
    State(state): State<Arc<ApiState<E>>>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, ApiError>
where
    E: ExchangePort + 'static,
{
    let symbol = parse_symbol(&symbol)?;
    state.orchestrator.disable(&symbol).await.map_err(to_error_response)?;

    if let Some(feed) = &state.feed {
        feed.unsubscribe(&symbol).map_err(|e| to_error_response(e.into()))?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Publish a candle to the worker of its symbol.
async fn candle_handler<E>(
    State(state): State<Arc<ApiState<E>>>,
    Json(req): Json<CandleRequest>,
) -> Result<StatusCode, ApiError>
where
    E: ExchangePort + 'static,
{
    let Some(feed) = &state.feed else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "No streaming candle feed configured".to_string(),
            }),
        ));
    };

    let candle = req.into_candle().map_err(|e| to_error_response(e.into()))?;
    feed.publish(candle).await.map_err(|e| to_error_response(e.into()))?;

    Ok(StatusCode::ACCEPTED)
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_symbol(raw: &str) -> Result<Symbol, ApiError> {
    Symbol::from_pair(raw).map_err(|e| to_error_response(e.into()))
}

fn to_error_response(error: DaemonError) -> ApiError {
    let status = match &error {
        DaemonError::SymbolNotTracked(_) => StatusCode::NOT_FOUND,
        DaemonError::Exec(ExecError::Feed(_)) => StatusCode::NOT_FOUND,
        DaemonError::SymbolAlreadyTracked(_) => StatusCode::CONFLICT,
        DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        DaemonError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use axum::body::Body;
    use axum::http::Request;
    use breakout_domain::StrategyParameters;
    use breakout_exec::{IntentJournal, OrderExecutor, StubExchange};
    use breakout_ledger::PositionLedger;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn create_test_app(feed: Option<Arc<CandleFeed>>) -> (Router, Arc<StrategyOrchestrator<StubExchange>>) {
        let exchange = Arc::new(StubExchange::new(dec!(10000)));
        let executor = Arc::new(OrderExecutor::new(exchange, Arc::new(IntentJournal::new())));
        let ledger = Arc::new(PositionLedger::new(StrategyParameters::default(), dec!(10000)));
        let orchestrator = Arc::new(StrategyOrchestrator::new(
            ledger,
            executor,
            Arc::new(EventBus::new(100)),
        ));

        let state = Arc::new(ApiState {
            orchestrator: orchestrator.clone(),
            feed,
        });
        (create_router(state), orchestrator)
    }

    fn btc() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn candle_body(pair: &str, close: &str) -> Body {
        let candle = serde_json::json!({
            "symbol": pair,
            "timestamp": "2024-01-01T00:00:00Z",
            "open": "100",
            "high": "101",
            "low": "99",
            "close": close,
            "volume": "10"
        });
        Body::from(candle.to_string())
    }

    fn post(uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = create_test_app(None);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let feed = Arc::new(CandleFeed::new(8));
        let (app, orchestrator) = create_test_app(Some(feed.clone()));
        orchestrator.track(btc(), feed.subscribe(&btc()).unwrap()).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["symbols"][0]["symbol"], "BTCUSDT");
        assert_eq!(status["symbols"][0]["state"], "idle");
        assert_eq!(status["ledger"]["positions_count"], 0);
    }

    #[tokio::test]
    async fn test_get_position_not_found() {
        let (app, _) = create_test_app(None);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/positions/BTCUSDT").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/positions/NOTAPAIR").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disable_symbol() {
        let feed = Arc::new(CandleFeed::new(8));
        let (app, orchestrator) = create_test_app(Some(feed.clone()));
        orchestrator.track(btc(), feed.subscribe(&btc()).unwrap()).await.unwrap();

        let response = app
            .clone()
            .oneshot(post("/symbols/BTCUSDT/disable", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(orchestrator.tracked_symbols().await.is_empty());
        assert!(feed.subscribed_symbols().is_empty());

        let response = app.oneshot(post("/symbols/BTCUSDT/disable", Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_publish_candle() {
        let feed = Arc::new(CandleFeed::new(8));
        let (app, orchestrator) = create_test_app(Some(feed.clone()));
        orchestrator.track(btc(), feed.subscribe(&btc()).unwrap()).await.unwrap();

        let response = app
            .clone()
            .oneshot(post("/candles", candle_body("BTCUSDT", "100.5")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(post("/candles", candle_body("ETHUSDT", "100.5")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(post("/candles", candle_body("BTCUSDT", "0"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_without_feed() {
        let (app, _) = create_test_app(None);

        let response = app.oneshot(post("/candles", candle_body("BTCUSDT", "100"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

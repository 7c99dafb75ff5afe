// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`:
//
//   GET  /health       liveness + state version
//   GET  /state        full session snapshot (candles, epoch log, result)
//   POST /analyze      start a run for {ticker, provider?}
//   POST /cancel       cancel the run in flight
//   GET  /suggestions  starter tickers
//   GET  /calculator   investment projection on the latest result
//
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::app_state::{AppState, RunRejected};
use crate::predictor::{InvestmentProjection, SUGGESTED_TICKERS};
use crate::types::ProviderKind;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/analyze", post(analyze))
        .route("/api/v1/cancel", post(cancel))
        .route("/api/v1/suggestions", get(suggestions))
        .route("/api/v1/calculator", get(calculator))
        .layer(cors)
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Run control
// =============================================================================

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    ticker: String,
    #[serde(default)]
    provider: Option<ProviderKind>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    run_id: Uuid,
    message: String,
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.launch_run(&req.ticker, req.provider) {
        Ok(run_id) => {
            info!(ticker = %req.ticker, %run_id, "analysis requested via API");
            Ok((
                StatusCode::ACCEPTED,
                Json(AnalyzeResponse {
                    run_id,
                    message: format!("Analysis of {} started", req.ticker.trim().to_uppercase()),
                }),
            ))
        }
        Err(RunRejected::EmptyTicker) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "ticker must not be empty",
        )),
        Err(RunRejected::Busy { ticker }) => Err(api_error(
            StatusCode::CONFLICT,
            format!("a run for {ticker} is already in progress"),
        )),
    }
}

async fn cancel(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cancelled = state.cancel_run();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

// =============================================================================
// Presentation helpers
// =============================================================================

#[derive(Serialize)]
struct Suggestion {
    symbol: &'static str,
    name: &'static str,
}

async fn suggestions() -> impl IntoResponse {
    let list: Vec<Suggestion> = SUGGESTED_TICKERS
        .iter()
        .map(|&(symbol, name)| Suggestion { symbol, name })
        .collect();
    Json(list)
}

fn default_amount() -> f64 {
    1000.0
}

#[derive(Debug, Deserialize)]
struct CalculatorQuery {
    #[serde(default = "default_amount")]
    amount: f64,
}

async fn calculator(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalculatorQuery>,
) -> Result<Json<InvestmentProjection>, ApiError> {
    if !query.amount.is_finite() || query.amount < 0.0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "amount must be a non-negative number",
        ));
    }
    match state.latest_result() {
        Some(result) => Ok(Json(result.project_investment(query.amount))),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            "no forecast available yet",
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::pipeline::PipelineEvent;
    use crate::predictor::PredictionResult;
    use crate::runtime_config::RuntimeConfig;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(RuntimeConfig::default()))
    }

    async fn send(state: Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(state(), get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn suggestions_list_all_tickers() {
        let (status, body) = send(state(), get("/api/v1/suggestions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), SUGGESTED_TICKERS.len());
    }

    #[tokio::test]
    async fn analyze_rejects_empty_ticker() {
        let req = post_json("/api/v1/analyze", serde_json::json!({ "ticker": "  " }));
        let (status, body) = send(state(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("ticker"));
    }

    #[tokio::test]
    async fn analyze_conflicts_while_a_run_is_active() {
        let state = state();
        state.begin_run("AAPL", ProviderKind::Yahoo).unwrap();
        let req = post_json("/api/v1/analyze", serde_json::json!({ "ticker": "MSFT" }));
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("AAPL"));
    }

    #[tokio::test]
    async fn calculator_needs_a_result() {
        let (status, _) = send(state(), get("/api/v1/calculator?amount=100")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn calculator_rejects_negative_amount() {
        let (status, _) = send(state(), get("/api/v1/calculator?amount=-5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn calculator_projects_latest_result() {
        let state = state();
        let (run_id, _) = state.begin_run("AAPL", ProviderKind::Yahoo).unwrap();
        let result = PredictionResult::from_prices(100.0, 110.0, &[1.0; 15], 63);
        state.apply_event(run_id, &PipelineEvent::Completed(result));

        let (status, body) = send(state, get("/api/v1/calculator")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 1000.0);
        assert!((body["next_day_value"].as_f64().unwrap() - 1100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancel_without_run_reports_false() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/cancel")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);
    }
}

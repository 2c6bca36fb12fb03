//! # Checkout HTTP API
//!
//! Builds the axum router that wallets talk to. All endpoints share
//! application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                           | Description                     |
//! |--------|--------------------------------|---------------------------------|
//! | GET    | `/health`                      | Liveness check                  |
//! | GET    | `/checkout`                    | Label and icon for the wallet   |
//! | POST   | `/checkout?reference=<address>`| Unsigned transaction for payer  |
//! | *      | `/checkout`                    | 405                             |
//!
//! Every error body is `{ "error": "<message>" }`. The messages are part of
//! the contract with wallets and must not change.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tillpoint_protocol::checkout::{CheckoutError, CheckoutService, ErrorResponse, PostRequest};

use crate::metrics::SharedMetrics;

const NO_ACCOUNT: &str = "No account provided";
const NO_REFERENCE: &str = "No reference provided";
const BUILD_FAILED: &str = "error creating transaction";
const METHOD_NOT_ALLOWED: &str = "Method not allowed";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Builds transactions; owns the ledger handle and merchant config.
    pub checkout: Arc<CheckoutService>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Response payload for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Query string of a checkout POST.
#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    pub reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, and tracing.
///
/// CORS is wide open: wallets fetch from whatever origin they run on.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/checkout",
            get(checkout_get_handler)
                .post(checkout_post_handler)
                .fallback(method_not_allowed_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness check.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// `GET /checkout`: label and icon. Same answer every time.
async fn checkout_get_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.checkout_gets_total.inc();
    Json(state.checkout.describe())
}

/// `POST /checkout`: build an unsigned transaction for the posted account.
///
/// The body is read leniently: anything that is not a JSON object with a
/// non-empty `account` string is treated as a missing account. The account
/// is checked before the reference.
async fn checkout_post_handler(
    State(state): State<AppState>,
    query: Option<Query<CheckoutQuery>>,
    body: Bytes,
) -> Response {
    state.metrics.checkout_posts_total.inc();

    let account = serde_json::from_slice::<PostRequest>(&body)
        .unwrap_or_default()
        .account
        .filter(|a| !a.is_empty());
    let Some(account) = account else {
        state.metrics.invalid_requests_total.inc();
        return error_response(StatusCode::BAD_REQUEST, NO_ACCOUNT);
    };

    let reference = query
        .and_then(|Query(q)| q.reference)
        .filter(|r| !r.is_empty());
    let Some(reference) = reference else {
        state.metrics.invalid_requests_total.inc();
        return error_response(StatusCode::BAD_REQUEST, NO_REFERENCE);
    };

    let timer = state.metrics.build_latency_seconds.start_timer();
    let result = state.checkout.build(&account, &reference).await;
    timer.observe_duration();

    match result {
        Ok(resp) => {
            state.metrics.transactions_built_total.inc();
            tracing::info!(%account, %reference, "checkout transaction issued");
            (StatusCode::OK, Json(resp)).into_response()
        }
        Err(CheckoutError::InvalidInput { field, source }) => {
            state.metrics.invalid_requests_total.inc();
            tracing::debug!(%field, error = %source, "rejected checkout request");
            error_response(StatusCode::BAD_REQUEST, format!("Invalid {} provided", field))
        }
        Err(e @ CheckoutError::BuildFailed(_)) => {
            state.metrics.build_failures_total.inc();
            tracing::error!(error = %e, "checkout build failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, BUILD_FAILED)
        }
    }
}

/// Any other method on `/checkout`.
async fn method_not_allowed_handler() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

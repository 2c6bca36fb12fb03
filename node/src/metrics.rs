//! # Prometheus Metrics
//!
//! Exposes checkout counters for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the checkout API.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct CheckoutMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// `GET /checkout` requests served.
    pub checkout_gets_total: IntCounter,
    /// `POST /checkout` requests received, whatever their outcome.
    pub checkout_posts_total: IntCounter,
    /// Transactions successfully built and returned.
    pub transactions_built_total: IntCounter,
    /// POSTs rejected with 400.
    pub invalid_requests_total: IntCounter,
    /// POSTs that failed with 500.
    pub build_failures_total: IntCounter,
    /// Time spent building a transaction, checkpoint fetch included.
    pub build_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl CheckoutMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tillpoint".into()), None)?;

        let checkout_gets_total = counter(
            &registry,
            "checkout_gets_total",
            "Total number of checkout metadata requests",
        )?;
        let checkout_posts_total = counter(
            &registry,
            "checkout_posts_total",
            "Total number of checkout transaction requests",
        )?;
        let transactions_built_total = counter(
            &registry,
            "transactions_built_total",
            "Total number of unsigned transactions returned to wallets",
        )?;
        let invalid_requests_total = counter(
            &registry,
            "invalid_requests_total",
            "Total number of checkout requests rejected as invalid",
        )?;
        let build_failures_total = counter(
            &registry,
            "build_failures_total",
            "Total number of checkout requests that failed to build",
        )?;

        let build_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "build_latency_seconds",
                "Checkout transaction build latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(build_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            checkout_gets_total,
            checkout_posts_total,
            transactions_built_total,
            invalid_requests_total,
            build_failures_total,
            build_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<CheckoutMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

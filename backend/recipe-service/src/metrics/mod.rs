//! Prometheus metrics for recipe-service.
//!
//! Search, idempotency and popularity collectors plus the `/metrics` handler.
//! Rate-limit decisions are counted by `actix-middleware`.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Search requests by outcome (ok, invalid, too_broad, unavailable, error).
    pub static ref SEARCH_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "recipe_search_requests_total",
        "Recipe search requests segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register recipe_search_requests_total");

    /// End-to-end duration of a search, corpus fetch included.
    pub static ref SEARCH_DURATION_SECONDS: Histogram = register_histogram!(
        "recipe_search_duration_seconds",
        "Recipe search duration in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("failed to register recipe_search_duration_seconds");

    /// Candidates scored per search after filtering.
    pub static ref SEARCH_CANDIDATES: Histogram = register_histogram!(
        "recipe_search_candidates",
        "Number of candidates scored per search",
        vec![0.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .expect("failed to register recipe_search_candidates");

    /// Idempotency gate outcomes (executed, replayed, conflict, in_progress, unavailable, passthrough).
    pub static ref IDEMPOTENCY_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "idempotency_outcomes_total",
        "Idempotent mutation outcomes",
        &["outcome"]
    )
    .expect("failed to register idempotency_outcomes_total");

    /// Popularity refresh attempts (success, error).
    pub static ref POPULARITY_REFRESH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "popularity_refresh_total",
        "Popularity aggregate refresh attempts",
        &["result"]
    )
    .expect("failed to register popularity_refresh_total");
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

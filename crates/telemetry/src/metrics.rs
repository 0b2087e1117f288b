//! Node-level prometheus metrics and the `/metrics` route.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

static EPOCHS_SETTLED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SATS_PAID_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static EVENTS_INGESTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// Registers the node metric collectors. Call once at startup, before any
/// recording helper; repeated calls are no-ops.
pub fn install_node_metrics() {
    if let Ok(counter) = register_int_counter!(
        "caravel_epochs_settled_total",
        "Epochs settled by this coordinator"
    ) {
        let _ = EPOCHS_SETTLED_TOTAL.set(counter);
    }
    if let Ok(counter) = register_int_counter!(
        "caravel_sats_paid_total",
        "Total sats paid out by settlement"
    ) {
        let _ = SATS_PAID_TOTAL.set(counter);
    }
    if let Ok(counter) = register_int_counter_vec!(
        "caravel_events_ingested_total",
        "Events ingested, by kind",
        &["kind"]
    ) {
        let _ = EVENTS_INGESTED_TOTAL.set(counter);
    }
}

/// Records one settled epoch and the sats it paid.
pub fn record_settled_epoch(paid_sats: u64) {
    if let Some(counter) = EPOCHS_SETTLED_TOTAL.get() {
        counter.inc();
    }
    if let Some(counter) = SATS_PAID_TOTAL.get() {
        counter.inc_by(paid_sats);
    }
}

/// Records an ingested event by kind label.
pub fn record_event_ingested(kind: &str) {
    if let Some(counter) = EVENTS_INGESTED_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

async fn serve_metrics() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain".to_string())],
            e.to_string().into_bytes(),
        ),
    }
}

/// The `/metrics` router, mountable on any node surface.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(serve_metrics))
}

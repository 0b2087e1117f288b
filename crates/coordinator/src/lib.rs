// Protocol-edge coordinator.
#![forbid(unsafe_code)]

//! The coordinator ingests signed events, accepts verified receipts for the
//! open epoch, materialises the host directory and bounty pools, manages
//! pin contracts, and exposes epoch summaries.

pub mod ingest;
pub mod sweep;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use caravel_api::CoordinatorStore;
use caravel_crypto::verify_payload;
use caravel_types::codec::Value;
use caravel_types::constants::{
    EVENT_MAX_BODY, MAX_LIST_ITEMS, PIN_CANCEL_FEE_PCT, PIN_MAX_COPIES, PIN_MIN_BUDGET_SATS,
};
use caravel_types::{
    cid_from_value, EpochClock, ErrorTag, EventV1, Hex32, HostPricing, PinContract, PinStatus,
    StorageError,
};
use ingest::EventIngestor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::warn;

pub use sweep::{AvailabilitySweeper, HttpSpotCheckProbe};

/// Shared state for the coordinator surface.
pub struct CoordinatorState {
    pub store: Arc<dyn CoordinatorStore>,
    pub clock: EpochClock,
    /// Mint public keys receipts may be signed by.
    pub trusted_mints: Vec<Hex32>,
    /// Pricing advertised on `/pricing`.
    pub pricing: HostPricing,
    ingestor: EventIngestor,
}

impl CoordinatorState {
    pub fn new(
        store: Arc<dyn CoordinatorStore>,
        clock: EpochClock,
        trusted_mints: Vec<Hex32>,
        pricing: HostPricing,
    ) -> Self {
        Self {
            ingestor: EventIngestor::new(store.clone()),
            store,
            clock,
            trusted_mints,
            pricing,
        }
    }
}

pub fn router(state: Arc<CoordinatorState>) -> Router {
    Router::new()
        .route("/event", post(post_event))
        .route("/receipt", post(post_receipt))
        .route("/bounty/:cid", get(get_bounty))
        .route("/directory", get(get_directory))
        .route("/pricing", get(get_pricing))
        .route("/pin", post(post_pin))
        .route("/pin/:id", get(get_pin))
        .route("/pin/:id/cancel", post(cancel_pin))
        .route("/epoch/summary/:epoch", get(get_epoch_summary))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(1024))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(4 * EVENT_MAX_BODY))
        .with_state(state)
}

// Small helper used by HandleErrorLayer to produce structured responses.
async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "error": { "code": "timeout", "message": "request timed out" }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": { "code": "overloaded", "message": err.to_string() }
            })),
        )
    }
}

fn error_json(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
        .into_response()
}

fn storage_error(e: StorageError) -> Response {
    match e {
        StorageError::NotFound => error_json(StatusCode::NOT_FOUND, "not_found", ""),
        StorageError::Conflict => error_json(StatusCode::CONFLICT, "conflict", ""),
        other => {
            warn!(target: "coordinator", error = %other, "storage failure");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "")
        }
    }
}

// --- events ---

async fn post_event(
    State(state): State<Arc<CoordinatorState>>,
    Json(raw): Json<serde_json::Value>,
) -> Response {
    let event: EventV1 = match serde_json::from_value(raw) {
        Ok(event) => event,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, "invalid_event", &e.to_string()),
    };
    match state.ingestor.ingest(&event).await {
        Ok((event_id, seq)) => {
            caravel_telemetry::record_event_ingested(&format!("{:?}", event.kind));
            Json(json!({ "event_id": event_id, "seq": seq })).into_response()
        }
        Err(ingest::IngestError::Storage(e)) => storage_error(e),
        Err(e) => error_json(StatusCode::BAD_REQUEST, &e.tag(), &e.to_string()),
    }
}

// --- receipts ---

async fn post_receipt(
    State(state): State<Arc<CoordinatorState>>,
    Json(raw): Json<serde_json::Value>,
) -> Response {
    let receipt = match caravel_verifier::verify_receipt_json(&raw, &state.trusted_mints) {
        Ok(receipt) => receipt,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &e.tag(), &e.to_string()),
    };

    // Receipts are only accepted for the currently open epoch; settlement
    // relies on closed epochs being complete.
    let open = state.clock.current_epoch();
    if receipt.epoch != open {
        return error_json(
            StatusCode::CONFLICT,
            "epoch_closed",
            &format!("epoch {} is not open (current {open})", receipt.epoch),
        );
    }

    match state.store.insert_receipt(&receipt).await {
        Ok(()) => Json(json!({
            "status": "accepted",
            "cid": receipt.settlement_cid(),
            "epoch": receipt.epoch,
        }))
        .into_response(),
        Err(e) => storage_error(e),
    }
}

// --- bounties / directory / pricing ---

async fn get_bounty(
    State(state): State<Arc<CoordinatorState>>,
    Path(raw_cid): Path<String>,
) -> Response {
    let Ok(cid) = raw_cid.parse::<Hex32>() else {
        return error_json(StatusCode::BAD_REQUEST, "invalid_cid", "");
    };
    match state.store.get_bounty(&cid).await {
        Ok(pool) => Json(json!({ "cid": cid, "pool": pool })).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn get_directory(State(state): State<Arc<CoordinatorState>>) -> Response {
    match state.store.list_hosts(MAX_LIST_ITEMS).await {
        Ok(hosts) => Json(json!({ "hosts": hosts })).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn get_pricing(State(state): State<Arc<CoordinatorState>>) -> Response {
    Json(json!({
        "pricing": state.pricing,
        "epoch": state.clock.current_epoch(),
        "epoch_length_ms": state.clock.epoch_length_ms(),
    }))
    .into_response()
}

// --- pins ---

/// A signed pin request. The signature covers the canonical payload of
/// every field except itself; the hash of that payload is the contract id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinRequest {
    pub asset_root: Hex32,
    pub budget_sats: u64,
    pub duration_epochs: u32,
    pub min_copies: u32,
    pub client: Hex32,
    pub sig: String,
}

impl PinRequest {
    fn canonical_value(&self) -> Value {
        Value::map([
            ("asset_root", Value::from(self.asset_root)),
            ("budget_sats", Value::from(self.budget_sats)),
            ("duration_epochs", Value::from(self.duration_epochs)),
            ("min_copies", Value::from(self.min_copies)),
            ("client", Value::from(self.client)),
        ])
    }

    fn validate(&self) -> Result<(), (&'static str, String)> {
        if self.budget_sats < PIN_MIN_BUDGET_SATS {
            return Err((
                "invalid_budget",
                format!("budget below minimum {PIN_MIN_BUDGET_SATS}"),
            ));
        }
        if self.duration_epochs == 0 {
            return Err(("invalid_duration", "duration must be at least 1".into()));
        }
        if self.min_copies == 0 || self.min_copies > PIN_MAX_COPIES {
            return Err((
                "invalid_min_copies",
                format!("min_copies must be 1..={PIN_MAX_COPIES}"),
            ));
        }
        Ok(())
    }
}

async fn post_pin(
    State(state): State<Arc<CoordinatorState>>,
    Json(request): Json<PinRequest>,
) -> Response {
    if let Err((code, message)) = request.validate() {
        return error_json(StatusCode::BAD_REQUEST, code, &message);
    }
    let payload = request.canonical_value();
    if !verify_payload(&request.client, &request.sig, &payload) {
        return error_json(StatusCode::BAD_REQUEST, "signature_invalid", "");
    }
    let id = match cid_from_value(&payload) {
        Ok(id) => id,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, "invalid_encoding", &e.to_string()),
    };

    let pin = PinContract {
        id,
        client: request.client,
        asset_root: request.asset_root,
        min_copies: request.min_copies,
        duration_epochs: request.duration_epochs,
        budget_sats: request.budget_sats,
        remaining_sats: request.budget_sats,
        drain_rate: request.budget_sats / request.duration_epochs as u64,
        status: PinStatus::Active,
        created_epoch: state.clock.current_epoch(),
    };
    match state.store.insert_pin(&pin).await {
        Ok(()) => (StatusCode::CREATED, Json(pin)).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn get_pin(
    State(state): State<Arc<CoordinatorState>>,
    Path(raw_id): Path<String>,
) -> Response {
    let Ok(id) = raw_id.parse::<Hex32>() else {
        return error_json(StatusCode::BAD_REQUEST, "invalid_cid", "");
    };
    match state.store.get_pin(&id).await {
        Ok(Some(pin)) => Json(pin).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "not_found", ""),
        Err(e) => storage_error(e),
    }
}

/// Cancellation payload: signed `{action: "cancel", pin: <id>}`.
#[derive(Debug, Deserialize)]
struct CancelRequest {
    client: Hex32,
    sig: String,
}

async fn cancel_pin(
    State(state): State<Arc<CoordinatorState>>,
    Path(raw_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Response {
    let Ok(id) = raw_id.parse::<Hex32>() else {
        return error_json(StatusCode::BAD_REQUEST, "invalid_cid", "");
    };
    let mut pin = match state.store.get_pin(&id).await {
        Ok(Some(pin)) => pin,
        Ok(None) => return error_json(StatusCode::NOT_FOUND, "not_found", ""),
        Err(e) => return storage_error(e),
    };

    if request.client != pin.client {
        return error_json(StatusCode::UNAUTHORIZED, "not_owner", "");
    }
    let payload = Value::map([
        ("action", Value::text("cancel")),
        ("pin", Value::from(id)),
    ]);
    if !verify_payload(&pin.client, &request.sig, &payload) {
        return error_json(StatusCode::BAD_REQUEST, "signature_invalid", "");
    }
    if pin.status != PinStatus::Active {
        return error_json(StatusCode::CONFLICT, "conflict", "pin is not active");
    }

    // The cancel fee stays with the protocol; the rest is returned to the
    // client out of band.
    let fee = (pin.remaining_sats as u128 * (PIN_CANCEL_FEE_PCT * 100.0) as u128 / 100) as u64;
    let refund = pin.remaining_sats - fee;
    pin.remaining_sats = 0;
    pin.status = PinStatus::Cancelled;

    if let Err(e) = state.store.update_pin(&pin).await {
        return storage_error(e);
    }
    if fee > 0 {
        if let Err(e) = state.store.credit_protocol(fee).await {
            return storage_error(e);
        }
    }
    Json(json!({ "id": id, "refund_sats": refund, "fee_sats": fee })).into_response()
}

// --- epoch summaries ---

async fn get_epoch_summary(
    State(state): State<Arc<CoordinatorState>>,
    Path(epoch): Path<u32>,
) -> Response {
    let settled = match state.store.epoch_has_summaries(epoch).await {
        Ok(settled) => settled,
        Err(e) => return storage_error(e),
    };
    match state.store.summaries_for_epoch(epoch).await {
        Ok(summaries) => Json(json!({
            "epoch": epoch,
            "settled": settled,
            "summaries": summaries,
        }))
        .into_response(),
        Err(e) => storage_error(e),
    }
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

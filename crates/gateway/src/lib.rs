// Storage-edge HTTP gateway.
#![forbid(unsafe_code)]

//! The gateway serves content-addressed blocks, manifests and assets, and
//! gates non-preview block fetches behind an L402 challenge: pay the
//! Lightning invoice, present the preimage, get the bytes plus a
//! mint-signed receipt token.

pub mod invoice_cache;
pub mod mint_client;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use caravel_api::{BlockStore, InvoicePort, InvoiceRequest, MetadataStore, MintClient, MintClientError, SignReceiptRequest};
use caravel_crypto::sha256;
use caravel_types::constants::{CHUNK_SIZE_DEFAULT, FREE_PREVIEW_MAX_BYTES, INVOICE_TTL_SECS};
use caravel_types::{
    cid_from_bytes, AssetRoot, EpochClock, ErrorTag, FileManifest, Hex32, HostPricing,
    PaymentError, StorageError,
};
use dashmap::DashMap;
use invoice_cache::InvoiceCache;
use once_cell::sync::OnceCell;
use prometheus::{register_int_counter_vec, IntCounterVec};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

// --- Error handling ---

enum AppError {
    BadRequest(&'static str, String),
    NotFound,
    Conflict,
    Unprocessable(&'static str, String),
    Unauthorized(String, String),
    Payment(PaymentError),
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => AppError::NotFound,
            StorageError::Conflict => AppError::Conflict,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(code, msg) => (StatusCode::BAD_REQUEST, code.to_string(), msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found".to_string(), String::new()),
            AppError::Conflict => (StatusCode::CONFLICT, "conflict".to_string(), String::new()),
            AppError::Unprocessable(code, msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, code.to_string(), msg)
            }
            AppError::Unauthorized(code, msg) => (StatusCode::UNAUTHORIZED, code, msg),
            AppError::Payment(e) => {
                let status = match &e {
                    PaymentError::LndUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    PaymentError::MintUnavailable(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::UNAUTHORIZED,
                };
                (status, e.tag().into_owned(), e.to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!(target: "gateway", "internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal".to_string(),
                    "internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}

// --- Metrics (local to gateway) ---

static GATEWAY_BLOCK_FETCHES: OnceCell<IntCounterVec> = OnceCell::new();

fn install_gateway_metrics() {
    // Re-registration (second router in one process) is a no-op.
    if let Ok(counter) = register_int_counter_vec!(
        "caravel_gateway_block_fetches_total",
        "Block fetches by tier and result",
        &["tier", "result"]
    ) {
        let _ = GATEWAY_BLOCK_FETCHES.set(counter);
    }
}

fn count_fetch(tier: &str, result: &str) {
    if let Some(counter) = GATEWAY_BLOCK_FETCHES.get() {
        counter.with_label_values(&[tier, result]).inc();
    }
}

// --- Rate limiter ---

#[derive(Clone)]
struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
}

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl IpLimiter {
    fn new(rps: u32, burst: u32) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: rps as f64,
            burst: burst as f64,
        }
    }

    fn client_ip<B>(req: &Request<B>) -> IpAddr {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
            .unwrap_or(IpAddr::from([127, 0, 0, 1]))
    }

    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = Self::client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
    }
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

// --- State ---

/// Everything the gateway handlers need. Ports are trait objects so tests
/// run against in-memory doubles.
pub struct GatewayState {
    pub blocks: Arc<dyn BlockStore>,
    pub metadata: Arc<dyn MetadataStore>,
    /// Lightning invoice port. `None` disables the L402 tier entirely.
    pub invoices: Option<Arc<dyn InvoicePort>>,
    /// Mint client for receipt tokens; required when L402 is enabled.
    pub mint: Option<Arc<dyn MintClient>>,
    pub invoice_cache: InvoiceCache,
    pub pricing: HostPricing,
    /// This gateway's host identity, named in receipts it serves.
    pub host_pubkey: Hex32,
    pub clock: EpochClock,
}

impl GatewayState {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        metadata: Arc<dyn MetadataStore>,
        host_pubkey: Hex32,
        clock: EpochClock,
    ) -> Self {
        Self {
            blocks,
            metadata,
            invoices: None,
            mint: None,
            invoice_cache: InvoiceCache::new(Duration::from_secs(INVOICE_TTL_SECS)),
            pricing: HostPricing::default(),
            host_pubkey,
            clock,
        }
    }

    pub fn with_l402(
        mut self,
        invoices: Arc<dyn InvoicePort>,
        mint: Arc<dyn MintClient>,
        pricing: HostPricing,
    ) -> Self {
        self.invoices = Some(invoices);
        self.mint = Some(mint);
        self.pricing = pricing;
        self
    }

    /// Price for serving `len` bytes: the volume rate with the per-request
    /// floor.
    fn price_for(&self, len: usize) -> u32 {
        let volume = (len as u128 * self.pricing.sats_per_gb as u128).div_ceil(1_000_000_000);
        (volume as u64).max(self.pricing.min_request_sats).min(u32::MAX as u64) as u32
    }
}

/// Builds the gateway router with its middleware stack.
pub fn router(state: Arc<GatewayState>) -> Router {
    install_gateway_metrics();
    let limiter = IpLimiter::new(50, 100);
    Router::new()
        .route("/block/:cid", put(put_block).get(get_block))
        .route("/file/:root", put(put_file).get(get_file))
        .route("/asset/:root", put(put_asset).get(get_asset))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(1024))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(2 * CHUNK_SIZE_DEFAULT as usize))
        .with_state(state)
}

fn parse_cid(raw: &str) -> Result<Hex32, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("invalid_cid", format!("bad cid {raw:?}")))
}

// --- Block routes ---

async fn put_block(
    State(state): State<Arc<GatewayState>>,
    Path(raw_cid): Path<String>,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let cid = parse_cid(&raw_cid)?;
    if cid_from_bytes(&body) != cid {
        return Err(AppError::Unprocessable(
            "cid_mismatch",
            "body does not hash to path cid".to_string(),
        ));
    }
    match state.blocks.put(&cid, &body).await {
        Ok(()) => Ok((StatusCode::CREATED, Json(json!({ "cid": cid }))).into_response()),
        Err(StorageError::Conflict) => Err(AppError::Conflict),
        Err(e) => Err(e.into()),
    }
}

async fn get_block(
    State(state): State<Arc<GatewayState>>,
    Path(raw_cid): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let cid = parse_cid(&raw_cid)?;
    let bytes = state
        .blocks
        .get(&cid)
        .await?
        .ok_or(AppError::NotFound)?;

    // Free preview tier.
    if bytes.len() <= FREE_PREVIEW_MAX_BYTES {
        count_fetch("free", "ok");
        let mut response = bytes_response(bytes, &cid);
        response
            .headers_mut()
            .insert("X-Free-Preview", HeaderValue::from_static("true"));
        return Ok(response);
    }

    // Without an invoice port there is no payment tier to enforce.
    let Some(invoices) = state.invoices.clone() else {
        count_fetch("open", "ok");
        return Ok(bytes_response(bytes, &cid));
    };

    match l402_preimage(&headers) {
        Some(preimage_hex) => {
            let response = serve_paid_block(&state, &cid, bytes, &preimage_hex).await;
            count_fetch("paid", if response.is_ok() { "ok" } else { "rejected" });
            response
        }
        None => {
            let response = issue_challenge(&state, invoices, &cid, bytes.len()).await;
            count_fetch("paid", "challenged");
            response
        }
    }
}

/// Extracts the preimage from an `Authorization: L402 <preimage>` header.
fn l402_preimage(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix("L402 ")?;
    Some(rest.trim().to_string())
}

/// 402 challenge: create an invoice bound to this CID and remember it.
async fn issue_challenge(
    state: &GatewayState,
    invoices: Arc<dyn InvoicePort>,
    cid: &Hex32,
    len: usize,
) -> Result<Response, AppError> {
    let price_sats = state.price_for(len);
    let created = invoices
        .create_invoice(InvoiceRequest {
            value_sats: price_sats as u64,
            memo: Some(format!("caravel block {cid}")),
            expiry_secs: Some(INVOICE_TTL_SECS),
        })
        .await
        .map_err(|e| AppError::Payment(PaymentError::LndUnavailable(e.to_string())))?;

    state
        .invoice_cache
        .insert(created.payment_hash, *cid, price_sats, created.bolt11.clone());

    let record = state
        .invoice_cache
        .get(&created.payment_hash)
        .ok_or_else(|| AppError::Internal("freshly inserted invoice missing".into()))?;

    debug!(target: "gateway", %cid, price_sats, "issued L402 challenge");
    Ok((
        StatusCode::PAYMENT_REQUIRED,
        [(header::WWW_AUTHENTICATE, "L402")],
        Json(json!({
            "invoice": created.bolt11,
            "payment_hash": created.payment_hash,
            "price_sats": price_sats,
            "expires_at": record.expires_at_ms,
        })),
    )
        .into_response())
}

/// Redemption: verify the preimage, have the mint attest settlement, serve
/// the bytes with receipt headers.
async fn serve_paid_block(
    state: &GatewayState,
    cid: &Hex32,
    bytes: Vec<u8>,
    preimage_hex: &str,
) -> Result<Response, AppError> {
    let preimage = hex::decode(preimage_hex)
        .map_err(|_| AppError::Payment(PaymentError::InvalidPreimage))?;
    let payment_hash = Hex32::from_bytes(sha256(&preimage));

    let record = state
        .invoice_cache
        .get(&payment_hash)
        .ok_or(AppError::Payment(PaymentError::UnknownPayment))?;
    if record.cid != *cid {
        return Err(AppError::Payment(PaymentError::CidMismatch));
    }

    let mint = state
        .mint
        .as_ref()
        .ok_or_else(|| AppError::Payment(PaymentError::MintUnavailable("no mint".into())))?;

    let response_hash = Hex32::from_bytes(sha256(&bytes));
    let signed = mint
        .sign_receipt(&SignReceiptRequest {
            host_pubkey: state.host_pubkey,
            epoch: state.clock.current_epoch(),
            block_cid: *cid,
            response_hash,
            price_sats: record.price_sats,
            payment_hash,
        })
        .await
        .map_err(|e| match e {
            MintClientError::Unavailable(msg) => {
                AppError::Payment(PaymentError::MintUnavailable(msg))
            }
            MintClientError::Rejected { tag, message } if tag == "lnd_unavailable" => {
                AppError::Payment(PaymentError::LndUnavailable(message))
            }
            MintClientError::Rejected { tag, message } => AppError::Unauthorized(tag, message),
        })?;

    state.invoice_cache.remove(&payment_hash);

    let mut response = bytes_response(bytes, cid);
    let headers = response.headers_mut();
    insert_header(headers, "X-Receipt-Token", &signed.receipt_token);
    insert_header(headers, "X-Payment-Hash", &payment_hash.to_hex());
    insert_header(headers, "X-Price-Sats", &record.price_sats.to_string());
    Ok(response)
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn bytes_response(bytes: Vec<u8>, cid: &Hex32) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response();
    insert_header(response.headers_mut(), "X-Content-CID", &cid.to_hex());
    response
}

// --- Manifest / asset routes ---

async fn put_file(
    State(state): State<Arc<GatewayState>>,
    Path(raw_root): Path<String>,
    Json(manifest): Json<FileManifest>,
) -> Result<Response, AppError> {
    let root = parse_cid(&raw_root)?;
    manifest
        .validate()
        .map_err(|e| AppError::BadRequest("invalid_manifest", e.to_string()))?;
    let actual = manifest
        .file_root()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if actual != root {
        return Err(AppError::Unprocessable(
            "cid_mismatch",
            format!("manifest hashes to {actual}"),
        ));
    }
    state.metadata.put_manifest(&root, &manifest).await?;
    Ok((StatusCode::CREATED, Json(json!({ "file_root": root }))).into_response())
}

async fn get_file(
    State(state): State<Arc<GatewayState>>,
    Path(raw_root): Path<String>,
) -> Result<Response, AppError> {
    let root = parse_cid(&raw_root)?;
    let manifest = state
        .metadata
        .get_manifest(&root)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(manifest).into_response())
}

async fn put_asset(
    State(state): State<Arc<GatewayState>>,
    Path(raw_root): Path<String>,
    Json(asset): Json<AssetRoot>,
) -> Result<Response, AppError> {
    let root = parse_cid(&raw_root)?;
    asset
        .validate()
        .map_err(|e| AppError::BadRequest("invalid_asset", e.to_string()))?;
    let actual = asset
        .asset_root()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if actual != root {
        return Err(AppError::Unprocessable(
            "cid_mismatch",
            format!("asset hashes to {actual}"),
        ));
    }
    state.metadata.put_asset(&root, &asset).await?;
    Ok((StatusCode::CREATED, Json(json!({ "asset_root": root }))).into_response())
}

async fn get_asset(
    State(state): State<Arc<GatewayState>>,
    Path(raw_root): Path<String>,
) -> Result<Response, AppError> {
    let root = parse_cid(&raw_root)?;
    let asset = state
        .metadata
        .get_asset(&root)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(asset).into_response())
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// Spawns the periodic invoice-cache sweep.
pub fn spawn_cache_sweeper(state: Arc<GatewayState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let before = state.invoice_cache.len();
            state.invoice_cache.sweep();
            let after = state.invoice_cache.len();
            if before != after {
                debug!(target: "gateway", evicted = before - after, "invoice cache sweep");
            }
        }
    });
}

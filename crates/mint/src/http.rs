//! HTTP surface of the mint: `POST /sign`, `GET /pubkey`, `GET /health`.

use crate::Mint;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use caravel_api::SignReceiptRequest;
use caravel_types::{ErrorTag, Hex32, MintError};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Builds the mint router.
pub fn router(mint: Arc<Mint>) -> Router {
    Router::new()
        .route("/sign", post(sign))
        .route("/pubkey", get(pubkey))
        .route("/health", get(health))
        .with_state(mint)
}

fn error_response(status: StatusCode, tag: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "code": tag, "message": message } })),
    )
        .into_response()
}

fn mint_error(e: MintError) -> Response {
    let status = match &e {
        MintError::InvalidField(_) => StatusCode::BAD_REQUEST,
        MintError::NotSettled | MintError::Underpaid { .. } => StatusCode::PAYMENT_REQUIRED,
        MintError::LndUnavailable(_) => StatusCode::BAD_GATEWAY,
        MintError::NoKey => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, &e.tag(), &e.to_string())
}

/// Field-by-field parse so a malformed request names the offending field.
fn parse_sign_request(raw: &serde_json::Value) -> Result<SignReceiptRequest, MintError> {
    let obj = raw.as_object().ok_or(MintError::InvalidField("body"))?;
    let hex = |name: &'static str| -> Result<Hex32, MintError> {
        obj.get(name)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or(MintError::InvalidField(name))
    };
    let uint = |name: &'static str| -> Result<u64, MintError> {
        obj.get(name)
            .and_then(|v| v.as_u64())
            .ok_or(MintError::InvalidField(name))
    };
    Ok(SignReceiptRequest {
        host_pubkey: hex("host_pubkey")?,
        epoch: u32::try_from(uint("epoch")?).map_err(|_| MintError::InvalidField("epoch"))?,
        block_cid: hex("block_cid")?,
        response_hash: hex("response_hash")?,
        price_sats: u32::try_from(uint("price_sats")?)
            .map_err(|_| MintError::InvalidField("price_sats"))?,
        payment_hash: hex("payment_hash")?,
    })
}

async fn sign(State(mint): State<Arc<Mint>>, Json(raw): Json<serde_json::Value>) -> Response {
    let request = match parse_sign_request(&raw) {
        Ok(request) => request,
        Err(e) => return mint_error(e),
    };
    match mint.sign_receipt(&request).await {
        Ok(signed) => Json(signed).into_response(),
        Err(e) => {
            warn!(target: "mint", error = %e, "sign request refused");
            mint_error(e)
        }
    }
}

async fn pubkey(State(mint): State<Arc<Mint>>) -> Response {
    match mint.pubkey() {
        Some(pk) => Json(json!({ "pubkey": pk })).into_response(),
        None => mint_error(MintError::NoKey),
    }
}

async fn health(State(mint): State<Arc<Mint>>) -> Response {
    Json(json!({ "status": "ok", "has_key": mint.pubkey().is_some() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryInvoicePort;
    use axum::body::Body;
    use axum::http::Request;
    use caravel_test_utils::{labeled_cid, seeded_keypair};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn call(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn sign_body(payment_hash: Hex32, price: u32) -> serde_json::Value {
        json!({
            "host_pubkey": seeded_keypair(2).public(),
            "epoch": 7,
            "block_cid": labeled_cid("block"),
            "response_hash": labeled_cid("response"),
            "price_sats": price,
            "payment_hash": payment_hash,
        })
    }

    #[tokio::test]
    async fn sign_round_trip() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let hash = invoices.add_settled(21).await;
        let app = router(Arc::new(Mint::new(seeded_keypair(1), invoices)));

        let (status, body) = call(app, "POST", "/sign", Some(sign_body(hash, 21))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mint_pubkey"], json!(seeded_keypair(1).public()));
        assert!(body["receipt_token"].as_str().unwrap().len() > 80);
    }

    #[tokio::test]
    async fn unsettled_invoice_is_402() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let hash = invoices.add_open(21).await;
        let app = router(Arc::new(Mint::new(seeded_keypair(1), invoices)));

        let (status, body) = call(app, "POST", "/sign", Some(sign_body(hash, 21))).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "not_settled");
    }

    #[tokio::test]
    async fn malformed_field_is_tagged() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let app = router(Arc::new(Mint::new(seeded_keypair(1), invoices)));
        let mut body = sign_body(labeled_cid("x"), 21);
        body["block_cid"] = json!("not-hex");
        let (status, body) = call(app, "POST", "/sign", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_field");
    }

    #[tokio::test]
    async fn keyless_mint_is_503() {
        let app = router(Arc::new(Mint::keyless()));
        let (status, body) = call(app, "GET", "/pubkey", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "no_key");
    }

    #[tokio::test]
    async fn health_reports_key_presence() {
        let app = router(Arc::new(Mint::keyless()));
        let (status, body) = call(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_key"], json!(false));
    }

    #[tokio::test]
    async fn lnd_outage_is_502() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        invoices.set_unreachable(true).await;
        let app = router(Arc::new(Mint::new(seeded_keypair(1), invoices)));
        let (status, body) = call(app, "POST", "/sign", Some(sign_body(labeled_cid("x"), 21))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "lnd_unavailable");
    }
}

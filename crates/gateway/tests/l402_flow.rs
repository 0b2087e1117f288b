//! End-to-end gateway behaviour against in-memory ports: block storage,
//! the free preview tier, and the full L402 challenge/redeem exchange.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use caravel_gateway::{router, GatewayState};
use caravel_mint::{LocalMintClient, MemoryInvoicePort, Mint};
use caravel_storage::{MemoryBlockStore, MemoryMetadataStore};
use caravel_test_utils::seeded_keypair;
use caravel_types::constants::FREE_PREVIEW_MAX_BYTES;
use caravel_types::{cid_from_bytes, EpochClock, Hex32, HostPricing};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: axum::Router,
    invoices: Arc<MemoryInvoicePort>,
}

fn harness() -> Harness {
    let invoices = Arc::new(MemoryInvoicePort::new());
    let mint = Arc::new(Mint::new(seeded_keypair(1), invoices.clone()));
    let state = GatewayState::new(
        Arc::new(MemoryBlockStore::new()),
        Arc::new(MemoryMetadataStore::new()),
        seeded_keypair(2).public(),
        EpochClock::with_default_length(0),
    )
    .with_l402(
        invoices.clone(),
        Arc::new(LocalMintClient::new(mint)),
        HostPricing {
            min_request_sats: 3,
            sats_per_gb: 50,
        },
    );
    Harness {
        app: router(Arc::new(state)),
        invoices,
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn put_block_req(cid: &Hex32, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/block/{cid}"))
        .body(Body::from(bytes))
        .unwrap()
}

fn get_block_req(cid: &Hex32) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/block/{cid}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn put_then_free_preview_get() {
    let h = harness();
    let bytes = b"small block".to_vec();
    let cid = cid_from_bytes(&bytes);

    let (status, _, _) = send(&h.app, put_block_req(&cid, bytes.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    // Re-upload conflicts.
    let (status, _, _) = send(&h.app, put_block_req(&cid, bytes.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, headers, body) = send(&h.app, get_block_req(&cid)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("X-Free-Preview").unwrap(), "true");
    assert_eq!(headers.get("X-Content-CID").unwrap(), cid.to_hex().as_str());
    assert_eq!(body, bytes);
}

#[tokio::test]
async fn put_rejects_wrong_cid_and_bad_hex() {
    let h = harness();
    let cid = cid_from_bytes(b"a");
    let (status, _, _) = send(&h.app, put_block_req(&cid, b"b".to_vec())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let bad = Request::builder()
        .method("PUT")
        .uri("/block/zzzz")
        .body(Body::from(&b"x"[..]))
        .unwrap();
    let (status, _, _) = send(&h.app, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn large_block_walks_the_l402_flow() {
    let h = harness();
    let bytes = vec![0xabu8; FREE_PREVIEW_MAX_BYTES + 1];
    let cid = cid_from_bytes(&bytes);
    let (status, _, _) = send(&h.app, put_block_req(&cid, bytes.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    // Unauthenticated fetch: 402 with an invoice.
    let (status, headers, body) = send(&h.app, get_block_req(&cid)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(headers.get("WWW-Authenticate").unwrap(), "L402");
    let challenge: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let payment_hash: Hex32 = challenge["payment_hash"].as_str().unwrap().parse().unwrap();
    assert!(challenge["invoice"].as_str().unwrap().starts_with("lnbcrt"));
    assert!(challenge["price_sats"].as_u64().unwrap() >= 3);

    // Pay the invoice out of band, then redeem with the preimage.
    h.invoices.settle(&payment_hash).await;
    let preimage = h.invoices.preimage(&payment_hash).await.unwrap();
    let authed = Request::builder()
        .method("GET")
        .uri(format!("/block/{cid}"))
        .header("Authorization", format!("L402 {preimage}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&h.app, authed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, bytes);
    assert_eq!(
        headers.get("X-Payment-Hash").unwrap(),
        payment_hash.to_hex().as_str()
    );
    assert!(headers.get("X-Receipt-Token").is_some());
    assert!(headers.get("X-Price-Sats").is_some());
}

#[tokio::test]
async fn wrong_preimage_and_unknown_payment_are_401() {
    let h = harness();
    let bytes = vec![0xcdu8; FREE_PREVIEW_MAX_BYTES + 1];
    let cid = cid_from_bytes(&bytes);
    send(&h.app, put_block_req(&cid, bytes.clone())).await;

    let bad = Request::builder()
        .method("GET")
        .uri(format!("/block/{cid}"))
        .header("Authorization", "L402 not-hex")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["code"], "invalid_preimage");

    // A valid preimage nobody issued an invoice for.
    let unknown = Request::builder()
        .method("GET")
        .uri(format!("/block/{cid}"))
        .header("Authorization", format!("L402 {}", hex::encode([9u8; 32])))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, unknown).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["code"], "unknown_payment");
}

#[tokio::test]
async fn unsettled_invoice_cannot_redeem() {
    let h = harness();
    let bytes = vec![0xefu8; FREE_PREVIEW_MAX_BYTES + 1];
    let cid = cid_from_bytes(&bytes);
    send(&h.app, put_block_req(&cid, bytes.clone())).await;

    let (_, _, body) = send(&h.app, get_block_req(&cid)).await;
    let challenge: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let payment_hash: Hex32 = challenge["payment_hash"].as_str().unwrap().parse().unwrap();

    // Preimage known but invoice never settled: the mint refuses.
    let preimage = h.invoices.preimage(&payment_hash).await.unwrap();
    let authed = Request::builder()
        .method("GET")
        .uri(format!("/block/{cid}"))
        .header("Authorization", format!("L402 {preimage}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, authed).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["error"]["code"], "not_settled");
}

#[tokio::test]
async fn manifest_roundtrip_and_mismatch() {
    let h = harness();
    let chunked = caravel_content::chunk_bytes(b"manifest body", None, 4).unwrap();
    let root = chunked.file_root;

    let ok = Request::builder()
        .method("PUT")
        .uri(format!("/file/{root}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&chunked.manifest).unwrap()))
        .unwrap();
    let (status, _, _) = send(&h.app, ok).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(
        &h.app,
        Request::builder()
            .method("GET")
            .uri(format!("/file/{root}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fetched: caravel_types::FileManifest = serde_json::from_slice(&body).unwrap();
    assert_eq!(fetched, chunked.manifest);

    // Same manifest under a different root: 422.
    let wrong_root = cid_from_bytes(b"not the root");
    let mismatch = Request::builder()
        .method("PUT")
        .uri(format!("/file/{wrong_root}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&chunked.manifest).unwrap()))
        .unwrap();
    let (status, _, _) = send(&h.app, mismatch).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

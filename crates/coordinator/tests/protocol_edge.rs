//! Coordinator surface behaviour: event ingest, receipt acceptance for the
//! open epoch, and the pin contract lifecycle.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use caravel_api::CoordinatorStore;
use caravel_coordinator::{router, CoordinatorState, PinRequest};
use caravel_crypto::sign_payload_b64;
use caravel_storage::MemoryCoordinatorStore;
use caravel_test_utils::{labeled_cid, seeded_keypair, signed_paid_event, signed_receipt};
use caravel_types::codec::Value;
use caravel_types::{EpochClock, EventKind, Hex32, HostPricing};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn world() -> (Arc<MemoryCoordinatorStore>, axum::Router) {
    let store = Arc::new(MemoryCoordinatorStore::new());
    // An enormous epoch length keeps the open epoch at 0 for the whole test.
    let clock = EpochClock::new(0, u64::MAX);
    let state = CoordinatorState::new(
        store.clone(),
        clock,
        vec![seeded_keypair(1).public()],
        HostPricing::default(),
    );
    (store, router(Arc::new(state)))
}

async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn fund_event_flows_into_the_bounty_endpoint() {
    let (_store, app) = world();
    let cid = labeled_cid("asset");
    let event = signed_paid_event(
        &seeded_keypair(3),
        EventKind::Fund,
        cid,
        String::new(),
        1_000,
        1,
    );
    let (status, body) = post_json(&app, "/event", serde_json::to_value(&event).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["event_id"].as_str().unwrap().len() == 64);

    let (status, body) = get_json(&app, &format!("/bounty/{cid}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pool"]["balance_sats"], 950);
}

#[tokio::test]
async fn tampered_event_is_rejected() {
    let (_store, app) = world();
    let mut event = signed_paid_event(
        &seeded_keypair(3),
        EventKind::Fund,
        labeled_cid("asset"),
        String::new(),
        1_000,
        1,
    );
    event.sats = 2_000;
    let (status, body) = post_json(&app, "/event", serde_json::to_value(&event).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "signature_invalid");
}

#[tokio::test]
async fn receipts_for_the_open_epoch_are_accepted() {
    let (store, app) = world();
    let mint = seeded_keypair(1);
    let receipt = signed_receipt(&mint, &seeded_keypair(2), &seeded_keypair(3), 0, None);
    let (status, body) = post_json(&app, "/receipt", serde_json::to_value(&receipt).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(store.receipts_for_epoch(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn receipts_for_closed_epochs_are_refused() {
    let (store, app) = world();
    let mint = seeded_keypair(1);
    let receipt = signed_receipt(&mint, &seeded_keypair(2), &seeded_keypair(3), 3, None);
    let (status, body) = post_json(&app, "/receipt", serde_json::to_value(&receipt).unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "epoch_closed");
    assert!(store.receipts_for_epoch(3).await.unwrap().is_empty());
}

#[tokio::test]
async fn untrusted_mint_receipt_is_refused() {
    let (_store, app) = world();
    let rogue_mint = seeded_keypair(9);
    let receipt = signed_receipt(&rogue_mint, &seeded_keypair(2), &seeded_keypair(3), 0, None);
    let (status, body) = post_json(&app, "/receipt", serde_json::to_value(&receipt).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "token_invalid");
}

fn signed_pin_request(client_tag: u8, budget: u64) -> PinRequest {
    let client = seeded_keypair(client_tag);
    let mut request = PinRequest {
        asset_root: labeled_cid("pinned"),
        budget_sats: budget,
        duration_epochs: 10,
        min_copies: 3,
        client: client.public(),
        sig: String::new(),
    };
    let payload = Value::map([
        ("asset_root", Value::from(request.asset_root)),
        ("budget_sats", Value::from(request.budget_sats)),
        ("duration_epochs", Value::from(request.duration_epochs)),
        ("min_copies", Value::from(request.min_copies)),
        ("client", Value::from(request.client)),
    ]);
    request.sig = sign_payload_b64(&client, &payload).unwrap();
    request
}

#[tokio::test]
async fn pin_lifecycle_create_fetch_cancel() {
    let (store, app) = world();
    let request = signed_pin_request(4, 1_000);

    let (status, body) = post_json(&app, "/pin", serde_json::to_value(&request).unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);
    let id: Hex32 = body["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["drain_rate"], 100);
    assert_eq!(body["status"], "ACTIVE");

    // Duplicate submission conflicts on the derived id.
    let (status, _) = post_json(&app, "/pin", serde_json::to_value(&request).unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get_json(&app, &format!("/pin/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_sats"], 1_000);

    // Cancel with the owner's signature; 5% fee is withheld.
    let client = seeded_keypair(4);
    let payload = Value::map([
        ("action", Value::text("cancel")),
        ("pin", Value::from(id)),
    ]);
    let cancel = serde_json::json!({
        "client": client.public(),
        "sig": sign_payload_b64(&client, &payload).unwrap(),
    });
    let (status, body) = post_json(&app, &format!("/pin/{id}/cancel"), cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fee_sats"], 50);
    assert_eq!(body["refund_sats"], 950);
    assert_eq!(store.protocol_balance().await.unwrap(), 50);

    let (_, body) = get_json(&app, &format!("/pin/{id}")).await;
    assert_eq!(body["status"], "CANCELLED");
}

#[tokio::test]
async fn undersized_pin_budget_is_rejected() {
    let (_store, app) = world();
    let request = signed_pin_request(4, 10);
    let (status, body) = post_json(&app, "/pin", serde_json::to_value(&request).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_budget");
}

#[tokio::test]
async fn foreign_signature_on_pin_is_rejected() {
    let (_store, app) = world();
    let mut request = signed_pin_request(4, 1_000);
    request.client = seeded_keypair(5).public();
    let (status, body) = post_json(&app, "/pin", serde_json::to_value(&request).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "signature_invalid");
}

//! Deterministic fixtures for testing Caravel components.
//!
//! Everything here is seeded: the same inputs always produce the same keys,
//! receipts and events, so assertions can be exact.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use caravel_crypto::{
    base_target, event_challenge, mine, pow_hash, receipt_challenge, sign_event, Ed25519KeyPair,
};
use caravel_types::{cid_from_bytes, EventKind, EventV1, Hex32, ReceiptV2};
use caravel_verifier::client_sig_payload;

/// A key pair derived from a one-byte tag. Stable across runs.
pub fn seeded_keypair(tag: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed(&[tag; 32])
}

/// A deterministic CID derived from a label.
pub fn labeled_cid(label: &str) -> Hex32 {
    cid_from_bytes(label.as_bytes())
}

/// Builds a fully valid receipt: mined proof-of-work, client signature and
/// mint token all verify.
pub fn signed_receipt(
    mint: &Ed25519KeyPair,
    host: &Ed25519KeyPair,
    client: &Ed25519KeyPair,
    epoch: u32,
    asset_root: Option<Hex32>,
) -> ReceiptV2 {
    signed_receipt_for_block(
        mint,
        host,
        client,
        epoch,
        asset_root,
        labeled_cid("fixture-file"),
        labeled_cid("fixture-block"),
        labeled_cid(&format!("payment-{}-{}", client.public(), epoch)),
    )
}

/// As [`signed_receipt`], with explicit content and payment identifiers.
#[allow(clippy::too_many_arguments)]
pub fn signed_receipt_for_block(
    mint: &Ed25519KeyPair,
    host: &Ed25519KeyPair,
    client: &Ed25519KeyPair,
    epoch: u32,
    asset_root: Option<Hex32>,
    file_root: Hex32,
    block_cid: Hex32,
    payment_hash: Hex32,
) -> ReceiptV2 {
    let response_hash = labeled_cid("fixture-response");
    let price_sats = 21u32;

    let challenge = receipt_challenge(
        asset_root.as_ref(),
        &file_root,
        &block_cid,
        &host.public(),
        &payment_hash,
        &response_hash,
        epoch,
        &client.public(),
    );
    let (nonce, pow) = mine(&challenge, &base_target());
    let pow_hash = Hex32::from_bytes(pow);

    let token_payload = caravel_types::receipt::token_payload(
        &host.public(),
        epoch,
        &block_cid,
        &response_hash,
        price_sats,
        &payment_hash,
    );
    let receipt_token = BASE64.encode(mint.sign_raw(&token_payload));

    let client_sig =
        BASE64.encode(client.sign_raw(&client_sig_payload(&challenge, nonce, &pow_hash)));

    ReceiptV2 {
        asset_root,
        file_root,
        block_cid,
        host_pubkey: host.public(),
        payment_hash,
        response_hash,
        price_sats,
        receipt_token,
        epoch,
        nonce,
        pow_hash,
        client_pubkey: client.public(),
        client_sig,
    }
}

/// Builds a signed paid event (no proof-of-work required).
pub fn signed_paid_event(
    signer: &Ed25519KeyPair,
    kind: EventKind,
    r#ref: Hex32,
    body_hex: String,
    sats: u64,
    ts: u64,
) -> EventV1 {
    let mut event = EventV1 {
        v: 1,
        kind,
        from: signer.public(),
        r#ref,
        body: body_hex,
        sats,
        ts,
        sig: String::new(),
        nonce: None,
        pow_hash: None,
    };
    sign_event(signer, &mut event).expect("fixture body encodes");
    event
}

/// Builds a signed free event with its proof-of-work mined.
pub fn signed_free_event(
    signer: &Ed25519KeyPair,
    kind: EventKind,
    r#ref: Hex32,
    body_hex: String,
    ts: u64,
) -> EventV1 {
    let mut event = EventV1 {
        v: 1,
        kind,
        from: signer.public(),
        r#ref,
        body: body_hex,
        sats: 0,
        ts,
        sig: String::new(),
        nonce: None,
        pow_hash: None,
    };
    let body = event.body_bytes().expect("fixture body is hex");
    let challenge = event_challenge(&event.from, event.ts, event.kind.as_u8(), &event.r#ref, &body);
    let target = caravel_crypto::event_target();
    let (nonce, _) = mine(&challenge, &target);
    event.nonce = Some(nonce);
    event.pow_hash = Some(Hex32::from_bytes(pow_hash(&challenge, nonce)));
    sign_event(signer, &mut event).expect("fixture body encodes");
    event
}

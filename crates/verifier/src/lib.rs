//! Zero-state receipt verification.
//!
//! A pure function over a receipt and a trusted mint set: no I/O, no
//! storage, no clock. Checks run in a fixed order and each failure mode has
//! its own tag, so external adopters can verify receipts without running
//! any other part of the system.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use caravel_crypto::{base_target, meets_target, pow_hash, receipt_challenge, verify_raw};
use caravel_types::{Hex32, ReceiptError, ReceiptV2};

/// Verifies a receipt against a set of trusted mint public keys.
///
/// Check order, each with a distinct tag:
/// 1. proof-of-work recomputation and base-target comparison,
/// 2. mint token decode + signature against any trusted key,
/// 3. client signature over `challenge ‖ nonce_be64 ‖ pow_hash`.
///
/// Hex shape is enforced by the `Hex32` type; callers holding untyped
/// wire data run it through [`verify_receipt_json`] first.
pub fn verify_receipt(
    receipt: &ReceiptV2,
    trusted_mint_pubkeys: &[Hex32],
) -> Result<(), ReceiptError> {
    // 1. Proof-of-work.
    let challenge = receipt_challenge(
        receipt.asset_root.as_ref(),
        &receipt.file_root,
        &receipt.block_cid,
        &receipt.host_pubkey,
        &receipt.payment_hash,
        &receipt.response_hash,
        receipt.epoch,
        &receipt.client_pubkey,
    );
    let computed = pow_hash(&challenge, receipt.nonce);
    if computed != *receipt.pow_hash.as_bytes() {
        return Err(ReceiptError::PowHashMismatch);
    }
    if !meets_target(&computed, &base_target()) {
        return Err(ReceiptError::PowInvalid);
    }

    // 2. Mint token.
    let token = BASE64
        .decode(&receipt.receipt_token)
        .map_err(|_| ReceiptError::TokenDecodeFailed)?;
    if token.len() != 64 {
        return Err(ReceiptError::TokenInvalidLength(token.len()));
    }
    let payload = receipt.token_payload();
    let minted = trusted_mint_pubkeys
        .iter()
        .any(|mpk| verify_raw(mpk, &token, &payload));
    if !minted {
        return Err(ReceiptError::TokenInvalid);
    }

    // 3. Client signature binds the proof-of-work to the client key.
    let mut client_payload = Vec::with_capacity(32 + 8 + 32);
    client_payload.extend_from_slice(&challenge);
    client_payload.extend_from_slice(&receipt.nonce.to_be_bytes());
    client_payload.extend_from_slice(receipt.pow_hash.as_bytes());
    let client_sig = BASE64
        .decode(&receipt.client_sig)
        .map_err(|_| ReceiptError::ClientSigInvalid)?;
    if !verify_raw(&receipt.client_pubkey, &client_sig, &client_payload) {
        return Err(ReceiptError::ClientSigInvalid);
    }

    Ok(())
}

/// The signing payload a client commits to when it co-signs a receipt.
pub fn client_sig_payload(challenge: &[u8; 32], nonce: u64, pow: &Hex32) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 8 + 32);
    out.extend_from_slice(challenge);
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(pow.as_bytes());
    out
}

/// Shape-checks untyped wire data field by field, then verifies, returning
/// the parsed receipt on success.
///
/// Each malformed field fails with its own `invalid_<field>` tag before any
/// cryptography runs, mirroring the boundary contract.
pub fn verify_receipt_json(
    raw: &serde_json::Value,
    trusted_mint_pubkeys: &[Hex32],
) -> Result<ReceiptV2, ReceiptError> {
    let obj = raw
        .as_object()
        .ok_or(ReceiptError::InvalidField("receipt"))?;

    let hex_field = |name: &'static str| -> Result<Hex32, ReceiptError> {
        obj.get(name)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or(ReceiptError::InvalidField(name))
    };
    let uint_field = |name: &'static str| -> Result<u64, ReceiptError> {
        obj.get(name)
            .and_then(|v| v.as_u64())
            .ok_or(ReceiptError::InvalidField(name))
    };
    let string_field = |name: &'static str| -> Result<String, ReceiptError> {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or(ReceiptError::InvalidField(name))
    };

    let asset_root = match obj.get("asset_root") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(
            v.as_str()
                .and_then(|s| s.parse().ok())
                .ok_or(ReceiptError::InvalidField("asset_root"))?,
        ),
    };

    let receipt = ReceiptV2 {
        asset_root,
        file_root: hex_field("file_root")?,
        block_cid: hex_field("block_cid")?,
        host_pubkey: hex_field("host_pubkey")?,
        payment_hash: hex_field("payment_hash")?,
        response_hash: hex_field("response_hash")?,
        price_sats: u32::try_from(uint_field("price_sats")?)
            .map_err(|_| ReceiptError::InvalidField("price_sats"))?,
        receipt_token: string_field("receipt_token")?,
        epoch: u32::try_from(uint_field("epoch")?)
            .map_err(|_| ReceiptError::InvalidField("epoch"))?,
        nonce: uint_field("nonce")?,
        pow_hash: hex_field("pow_hash")?,
        client_pubkey: hex_field("client_pubkey")?,
        client_sig: string_field("client_sig")?,
    };

    verify_receipt(&receipt, trusted_mint_pubkeys)?;
    Ok(receipt)
}

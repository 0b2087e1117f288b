//! Proof-of-fetch receipts, version 2.
//!
//! A receipt proves a paying client fetched a specific block from a specific
//! host in a specific epoch. It is double-signed: the mint's token attests
//! Lightning settlement, the client's signature binds the proof-of-work to
//! its own key.

use crate::cid::Hex32;
use crate::constants::RECEIPT_TOKEN_PREFIX;
use serde::{Deserialize, Serialize};

/// The receipt wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptV2 {
    /// Economic attachment point, when the fetched file belongs to an asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_root: Option<Hex32>,
    pub file_root: Hex32,
    pub block_cid: Hex32,
    pub host_pubkey: Hex32,
    pub payment_hash: Hex32,
    /// Digest of the response bytes the host served.
    pub response_hash: Hex32,
    pub price_sats: u32,
    /// Base64 of the mint's 64-byte Ed25519 token.
    pub receipt_token: String,
    pub epoch: u32,
    pub nonce: u64,
    /// `SHA256(challenge ‖ nonce_be64)`.
    pub pow_hash: Hex32,
    pub client_pubkey: Hex32,
    /// Base64 of the client's 64-byte Ed25519 signature.
    pub client_sig: String,
}

impl ReceiptV2 {
    /// The CID receipts aggregate under: the asset root when present,
    /// otherwise the file root.
    pub fn settlement_cid(&self) -> Hex32 {
        self.asset_root.unwrap_or(self.file_root)
    }

    /// The mint token payload for this receipt.
    pub fn token_payload(&self) -> Vec<u8> {
        token_payload(
            &self.host_pubkey,
            self.epoch,
            &self.block_cid,
            &self.response_hash,
            self.price_sats,
            &self.payment_hash,
        )
    }

    /// Projection used by epoch aggregation.
    pub fn digest(&self) -> ReceiptDigest {
        ReceiptDigest {
            host: self.host_pubkey,
            cid: self.settlement_cid(),
            client: self.client_pubkey,
            price_sats: self.price_sats as u64,
        }
    }
}

/// The byte string a mint signs: binds host, epoch, block, response and
/// price to the settled payment.
pub fn token_payload(
    host_pubkey: &Hex32,
    epoch: u32,
    block_cid: &Hex32,
    response_hash: &Hex32,
    price_sats: u32,
    payment_hash: &Hex32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 32 + 4 + 32 + 32 + 4 + 32);
    out.extend_from_slice(RECEIPT_TOKEN_PREFIX);
    out.extend_from_slice(host_pubkey.as_bytes());
    out.extend_from_slice(&epoch.to_be_bytes());
    out.extend_from_slice(block_cid.as_bytes());
    out.extend_from_slice(response_hash.as_bytes());
    out.extend_from_slice(&price_sats.to_be_bytes());
    out.extend_from_slice(payment_hash.as_bytes());
    out
}

/// What settlement needs from a receipt: who served what to whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDigest {
    pub host: Hex32,
    pub cid: Hex32,
    pub client: Hex32,
    pub price_sats: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_payload_layout_is_fixed() {
        let h = Hex32::from_bytes([0xaa; 32]);
        let c = Hex32::from_bytes([0xbb; 32]);
        let r = Hex32::from_bytes([0xcc; 32]);
        let p = Hex32::from_bytes([0xdd; 32]);
        let payload = token_payload(&h, 7, &c, &r, 42, &p);
        assert_eq!(payload.len(), 138);
        assert_eq!(&payload[0..2], b"R2");
        assert_eq!(&payload[2..34], &[0xaa; 32]);
        assert_eq!(&payload[34..38], &7u32.to_be_bytes());
        assert_eq!(&payload[102..106], &42u32.to_be_bytes());
        assert_eq!(&payload[106..138], &[0xdd; 32]);
    }

    #[test]
    fn settlement_cid_prefers_asset_root() {
        let file_root = Hex32::from_bytes([1; 32]);
        let asset_root = Hex32::from_bytes([2; 32]);
        let mut r = ReceiptV2 {
            asset_root: Some(asset_root),
            file_root,
            block_cid: Hex32::ZERO,
            host_pubkey: Hex32::ZERO,
            payment_hash: Hex32::ZERO,
            response_hash: Hex32::ZERO,
            price_sats: 1,
            receipt_token: String::new(),
            epoch: 0,
            nonce: 0,
            pow_hash: Hex32::ZERO,
            client_pubkey: Hex32::ZERO,
            client_sig: String::new(),
        };
        assert_eq!(r.settlement_cid(), asset_root);
        r.asset_root = None;
        assert_eq!(r.settlement_cid(), file_root);
    }
}

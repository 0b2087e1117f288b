//! Client interface to the receipt mint.

use async_trait::async_trait;
use caravel_types::Hex32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request for the mint to sign a receipt token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignReceiptRequest {
    pub host_pubkey: Hex32,
    pub epoch: u32,
    pub block_cid: Hex32,
    pub response_hash: Hex32,
    pub price_sats: u32,
    pub payment_hash: Hex32,
}

/// A signed token plus the key that signed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedReceiptToken {
    /// Base64 of the 64-byte Ed25519 token signature.
    pub receipt_token: String,
    pub mint_pubkey: Hex32,
}

/// Failures when calling the mint.
#[derive(Debug, Error)]
pub enum MintClientError {
    /// Transport-level failure. Transient; surfaces as `mint_unavailable`.
    #[error("mint unavailable: {0}")]
    Unavailable(String),
    /// The mint refused to sign; `tag` carries the mint's error tag.
    #[error("mint rejected request: {tag}")]
    Rejected { tag: String, message: String },
}

/// Anything that can obtain a mint-signed receipt token.
#[async_trait]
pub trait MintClient: Send + Sync {
    async fn sign_receipt(
        &self,
        req: &SignReceiptRequest,
    ) -> Result<SignedReceiptToken, MintClientError>;
}

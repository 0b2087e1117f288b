//! HTTP client for a remote mint.

use async_trait::async_trait;
use caravel_api::{MintClient, MintClientError, SignReceiptRequest, SignedReceiptToken};
use std::time::Duration;

/// Calls a mint's `/sign` endpoint with a deadline.
pub struct HttpMintClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMintClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MintClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MintClientError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl MintClient for HttpMintClient {
    async fn sign_receipt(
        &self,
        req: &SignReceiptRequest,
    ) -> Result<SignedReceiptToken, MintClientError> {
        let url = format!("{}/sign", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| MintClientError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            return response
                .json::<SignedReceiptToken>()
                .await
                .map_err(|e| MintClientError::Unavailable(e.to_string()));
        }

        // Mint errors arrive as { "error": { "code", "message" } }.
        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({}));
        let tag = body["error"]["code"].as_str().unwrap_or("mint_error").to_string();
        let message = body["error"]["message"].as_str().unwrap_or("").to_string();
        Err(MintClientError::Rejected { tag, message })
    }
}

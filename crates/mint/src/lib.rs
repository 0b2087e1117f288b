//! The receipt mint: an isolated signing oracle.
//!
//! The mint holds one Ed25519 key in memory and nothing else: no database,
//! no invoice records, no history. It verifies Lightning settlement through
//! the invoice port and emits a signature over the token payload. Double
//! signing a settled invoice is possible by design; epoch aggregation
//! deduplicates downstream.

pub mod http;
pub mod invoice_double;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use caravel_api::{InvoiceError, InvoicePort, SignReceiptRequest, SignedReceiptToken};
use caravel_crypto::Ed25519KeyPair;
use caravel_types::receipt::token_payload;
use caravel_types::{Hex32, MintError};
use std::sync::Arc;

pub use invoice_double::MemoryInvoicePort;

/// The signing oracle.
pub struct Mint {
    keypair: Option<Ed25519KeyPair>,
    invoice_port: Option<Arc<dyn InvoicePort>>,
}

impl Mint {
    /// A mint with a key and settlement checking.
    pub fn new(keypair: Ed25519KeyPair, invoice_port: Arc<dyn InvoicePort>) -> Self {
        Self {
            keypair: Some(keypair),
            invoice_port: Some(invoice_port),
        }
    }

    /// A mint that signs without checking settlement. Development only.
    pub fn without_invoice_port(keypair: Ed25519KeyPair) -> Self {
        Self {
            keypair: Some(keypair),
            invoice_port: None,
        }
    }

    /// A mint with no key loaded; every sign request fails with `no_key`.
    pub fn keyless() -> Self {
        Self {
            keypair: None,
            invoice_port: None,
        }
    }

    /// The mint's published public key.
    pub fn pubkey(&self) -> Option<Hex32> {
        self.keypair.as_ref().map(|kp| kp.public())
    }

    /// Verifies settlement and signs the token payload.
    pub async fn sign_receipt(
        &self,
        req: &SignReceiptRequest,
    ) -> Result<SignedReceiptToken, MintError> {
        let keypair = self.keypair.as_ref().ok_or(MintError::NoKey)?;

        if let Some(port) = &self.invoice_port {
            let status = port.lookup_invoice(&req.payment_hash).await.map_err(|e| match e {
                InvoiceError::NotFound => MintError::NotSettled,
                InvoiceError::Unavailable(msg) => MintError::LndUnavailable(msg),
            })?;
            if !status.settled {
                return Err(MintError::NotSettled);
            }
            if status.amt_paid_sats < req.price_sats as u64 {
                return Err(MintError::Underpaid {
                    required: req.price_sats as u64,
                    paid: status.amt_paid_sats,
                });
            }
        }

        let payload = token_payload(
            &req.host_pubkey,
            req.epoch,
            &req.block_cid,
            &req.response_hash,
            req.price_sats,
            &req.payment_hash,
        );
        Ok(SignedReceiptToken {
            receipt_token: BASE64.encode(keypair.sign_raw(&payload)),
            mint_pubkey: keypair.public(),
        })
    }
}

/// In-process mint client, for single-process deployments and tests.
pub struct LocalMintClient {
    mint: Arc<Mint>,
}

impl LocalMintClient {
    pub fn new(mint: Arc<Mint>) -> Self {
        Self { mint }
    }
}

#[async_trait::async_trait]
impl caravel_api::MintClient for LocalMintClient {
    async fn sign_receipt(
        &self,
        req: &SignReceiptRequest,
    ) -> Result<SignedReceiptToken, caravel_api::MintClientError> {
        self.mint.sign_receipt(req).await.map_err(|e| {
            use caravel_types::ErrorTag;
            caravel_api::MintClientError::Rejected {
                tag: e.tag().into_owned(),
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_test_utils::{labeled_cid, seeded_keypair};

    fn request(payment_hash: Hex32, price: u32) -> SignReceiptRequest {
        SignReceiptRequest {
            host_pubkey: seeded_keypair(2).public(),
            epoch: 7,
            block_cid: labeled_cid("block"),
            response_hash: labeled_cid("response"),
            price_sats: price,
            payment_hash,
        }
    }

    #[tokio::test]
    async fn signs_settled_invoices_with_a_verifiable_token() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let hash = invoices.add_settled(21).await;
        let mint = Mint::new(seeded_keypair(1), invoices);

        let signed = mint.sign_receipt(&request(hash, 21)).await.unwrap();
        assert_eq!(signed.mint_pubkey, seeded_keypair(1).public());

        let token = BASE64.decode(&signed.receipt_token).unwrap();
        let req = request(hash, 21);
        let payload = token_payload(
            &req.host_pubkey,
            req.epoch,
            &req.block_cid,
            &req.response_hash,
            req.price_sats,
            &req.payment_hash,
        );
        assert!(caravel_crypto::verify_raw(&signed.mint_pubkey, &token, &payload));
    }

    #[tokio::test]
    async fn unsettled_invoice_is_refused() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let hash = invoices.add_open(21).await;
        let mint = Mint::new(seeded_keypair(1), invoices);
        assert!(matches!(
            mint.sign_receipt(&request(hash, 21)).await,
            Err(MintError::NotSettled)
        ));
    }

    #[tokio::test]
    async fn underpaid_invoice_is_refused() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let hash = invoices.add_settled(10).await;
        let mint = Mint::new(seeded_keypair(1), invoices);
        assert!(matches!(
            mint.sign_receipt(&request(hash, 21)).await,
            Err(MintError::Underpaid { required: 21, paid: 10 })
        ));
    }

    #[tokio::test]
    async fn unknown_invoice_reads_as_not_settled() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        let mint = Mint::new(seeded_keypair(1), invoices);
        assert!(matches!(
            mint.sign_receipt(&request(labeled_cid("missing"), 21)).await,
            Err(MintError::NotSettled)
        ));
    }

    #[tokio::test]
    async fn unreachable_port_is_transient() {
        let invoices = Arc::new(MemoryInvoicePort::new());
        invoices.set_unreachable(true).await;
        let hash = labeled_cid("any");
        let mint = Mint::new(seeded_keypair(1), invoices);
        assert!(matches!(
            mint.sign_receipt(&request(hash, 21)).await,
            Err(MintError::LndUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn keyless_mint_refuses_everything() {
        let mint = Mint::keyless();
        assert!(matches!(
            mint.sign_receipt(&request(labeled_cid("x"), 1)).await,
            Err(MintError::NoKey)
        ));
    }
}

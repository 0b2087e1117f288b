//! The Lightning invoice port.
//!
//! Two operations, nothing else: the rest of the node never sees the
//! Lightning implementation behind them.

use async_trait::async_trait;
use caravel_types::Hex32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters for a new invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub value_sats: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_secs: Option<u64>,
}

/// A freshly created invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub payment_hash: Hex32,
    pub bolt11: String,
}

/// Invoice lifecycle state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceState {
    Open,
    Settled,
    Canceled,
    Accepted,
}

/// Settlement status of one invoice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvoiceStatus {
    pub settled: bool,
    pub value_sats: u64,
    pub amt_paid_sats: u64,
    pub state: InvoiceState,
}

/// Failures of the invoice port.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// The backend could not be reached within the deadline. Transient.
    #[error("invoice backend unavailable: {0}")]
    Unavailable(String),
    /// The payment hash is unknown to the backend.
    #[error("unknown invoice")]
    NotFound,
}

/// Narrow interface to a Lightning node.
#[async_trait]
pub trait InvoicePort: Send + Sync {
    async fn create_invoice(&self, req: InvoiceRequest) -> Result<CreatedInvoice, InvoiceError>;

    async fn lookup_invoice(&self, payment_hash: &Hex32) -> Result<InvoiceStatus, InvoiceError>;
}

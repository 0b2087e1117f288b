//! In-memory invoice port: the Lightning test double.

use async_trait::async_trait;
use caravel_api::{CreatedInvoice, InvoiceError, InvoicePort, InvoiceRequest, InvoiceState, InvoiceStatus};
use caravel_crypto::sha256;
use caravel_types::Hex32;
use std::collections::HashMap;
use tokio::sync::Mutex;

struct Entry {
    status: InvoiceStatus,
    preimage_hex: String,
}

/// Scriptable invoice backend. Payment hashes are real preimage hashes, so
/// the L402 redemption path (`SHA256(preimage) == payment_hash`) can be
/// exercised end to end; tests fetch the preimage with [`Self::preimage`].
pub struct MemoryInvoicePort {
    invoices: Mutex<HashMap<Hex32, Entry>>,
    unreachable: Mutex<bool>,
    counter: Mutex<u64>,
}

impl MemoryInvoicePort {
    pub fn new() -> Self {
        Self {
            invoices: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(false),
            counter: Mutex::new(0),
        }
    }

    /// Registers a settled invoice paid in full; returns its payment hash.
    pub async fn add_settled(&self, amount_sats: u64) -> Hex32 {
        self.add(amount_sats, amount_sats, true, InvoiceState::Settled)
            .await
    }

    /// Registers an open, unpaid invoice; returns its payment hash.
    pub async fn add_open(&self, amount_sats: u64) -> Hex32 {
        self.add(amount_sats, 0, false, InvoiceState::Open).await
    }

    /// Registers a settled but underpaid invoice.
    pub async fn add_underpaid(&self, value_sats: u64, paid_sats: u64) -> Hex32 {
        self.add(value_sats, paid_sats, true, InvoiceState::Settled)
            .await
    }

    async fn add(&self, value: u64, paid: u64, settled: bool, state: InvoiceState) -> Hex32 {
        let preimage = {
            let mut counter = self.counter.lock().await;
            *counter += 1;
            sha256(format!("preimage-{}", *counter).as_bytes())
        };
        let hash = Hex32::from_bytes(sha256(&preimage));
        self.invoices.lock().await.insert(
            hash,
            Entry {
                status: InvoiceStatus {
                    settled,
                    value_sats: value,
                    amt_paid_sats: paid,
                    state,
                },
                preimage_hex: hex::encode(preimage),
            },
        );
        hash
    }

    /// The hex preimage for an issued invoice. What a paying wallet would
    /// hand back to the client.
    pub async fn preimage(&self, payment_hash: &Hex32) -> Option<String> {
        self.invoices
            .lock()
            .await
            .get(payment_hash)
            .map(|e| e.preimage_hex.clone())
    }

    /// Marks an existing invoice as settled in full.
    pub async fn settle(&self, payment_hash: &Hex32) {
        if let Some(entry) = self.invoices.lock().await.get_mut(payment_hash) {
            entry.status.settled = true;
            entry.status.amt_paid_sats = entry.status.value_sats;
            entry.status.state = InvoiceState::Settled;
        }
    }

    /// Simulates the Lightning backend being down.
    pub async fn set_unreachable(&self, down: bool) {
        *self.unreachable.lock().await = down;
    }
}

impl Default for MemoryInvoicePort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoicePort for MemoryInvoicePort {
    async fn create_invoice(&self, req: InvoiceRequest) -> Result<CreatedInvoice, InvoiceError> {
        if *self.unreachable.lock().await {
            return Err(InvoiceError::Unavailable("backend down".into()));
        }
        let hash = self.add_open(req.value_sats).await;
        Ok(CreatedInvoice {
            payment_hash: hash,
            bolt11: format!("lnbcrt{}n1fake{}", req.value_sats, hash),
        })
    }

    async fn lookup_invoice(&self, payment_hash: &Hex32) -> Result<InvoiceStatus, InvoiceError> {
        if *self.unreachable.lock().await {
            return Err(InvoiceError::Unavailable("backend down".into()));
        }
        self.invoices
            .lock()
            .await
            .get(payment_hash)
            .map(|e| e.status)
            .ok_or(InvoiceError::NotFound)
    }
}

//! Storage ports.
//!
//! Blocks and metadata are opaque content-addressed stores; coordinator
//! state is relational. Writes to the block store are idempotent and
//! readers never observe partial writes: implementations use
//! write-then-rename or a transactional backend.

use async_trait::async_trait;
use caravel_types::{
    AssetRoot, BountyPool, EpochSummary, EventV1, FileManifest, Hex32, HostRecord, PinContract,
    ReceiptDigest, ReceiptV2, StorageError,
};
use serde::{Deserialize, Serialize};

/// Content-addressed block storage.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Stores bytes under their CID. Fails with `Conflict` when the block
    /// already exists; the caller treats that as success at the HTTP edge.
    async fn put(&self, cid: &Hex32, bytes: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, cid: &Hex32) -> Result<Option<Vec<u8>>, StorageError>;

    async fn contains(&self, cid: &Hex32) -> Result<bool, StorageError>;
}

/// Manifest and asset metadata storage, keyed by canonical hash.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_manifest(&self, root: &Hex32, manifest: &FileManifest)
        -> Result<(), StorageError>;

    async fn get_manifest(&self, root: &Hex32) -> Result<Option<FileManifest>, StorageError>;

    async fn put_asset(&self, root: &Hex32, asset: &AssetRoot) -> Result<(), StorageError>;

    async fn get_asset(&self, root: &Hex32) -> Result<Option<AssetRoot>, StorageError>;
}

/// One availability spot-check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotCheck {
    pub host: Hex32,
    pub cid: Hex32,
    pub epoch: u32,
    pub passed: bool,
}

/// The coordinator's relational state: receipts, hosts, spot checks,
/// bounty pools, pin contracts, epoch summaries and the append-only event
/// log.
#[async_trait]
pub trait CoordinatorStore: Send + Sync {
    // ---- receipts ----

    async fn insert_receipt(&self, receipt: &ReceiptV2) -> Result<(), StorageError>;

    /// Projection of all receipts in an epoch, for aggregation.
    async fn receipts_for_epoch(&self, epoch: u32) -> Result<Vec<ReceiptDigest>, StorageError>;

    // ---- event log ----

    /// Appends an event and returns its insertion sequence number. The
    /// sequence is the replay order.
    async fn append_event(&self, event_id: &Hex32, event: &EventV1) -> Result<u64, StorageError>;

    /// Events with sequence strictly greater than `after`, oldest first.
    async fn events_after(&self, after: u64, limit: usize)
        -> Result<Vec<(u64, EventV1)>, StorageError>;

    // ---- hosts ----

    async fn upsert_host(&self, host: &HostRecord) -> Result<(), StorageError>;

    async fn get_host(&self, pubkey: &Hex32) -> Result<Option<HostRecord>, StorageError>;

    async fn list_hosts(&self, limit: usize) -> Result<Vec<HostRecord>, StorageError>;

    /// Records that a host serves a CID.
    async fn add_serve(&self, host: &Hex32, cid: &Hex32) -> Result<(), StorageError>;

    /// All (host, cid) serve pairs.
    async fn list_serves(&self) -> Result<Vec<(Hex32, Hex32)>, StorageError>;

    // ---- spot checks ----

    async fn record_spot_check(&self, check: &SpotCheck) -> Result<(), StorageError>;

    /// `(passed, total)` counts for a host across an inclusive epoch range.
    async fn availability_counts(
        &self,
        host: &Hex32,
        epoch_lo: u32,
        epoch_hi: u32,
    ) -> Result<(u64, u64), StorageError>;

    // ---- bounty pools ----

    /// The pool for a CID; absent pools read as empty.
    async fn get_bounty(&self, cid: &Hex32) -> Result<BountyPool, StorageError>;

    async fn credit_bounty(&self, cid: &Hex32, amount: u64) -> Result<(), StorageError>;

    /// Debits up to `amount`, clamped to balance. Returns the actual debit.
    async fn debit_bounty(&self, cid: &Hex32, amount: u64, epoch: u32)
        -> Result<u64, StorageError>;

    /// Accrues protocol revenue (fund royalties, aggregator fees).
    async fn credit_protocol(&self, amount: u64) -> Result<(), StorageError>;

    async fn protocol_balance(&self) -> Result<u64, StorageError>;

    // ---- pin contracts ----

    async fn insert_pin(&self, pin: &PinContract) -> Result<(), StorageError>;

    async fn get_pin(&self, id: &Hex32) -> Result<Option<PinContract>, StorageError>;

    async fn update_pin(&self, pin: &PinContract) -> Result<(), StorageError>;

    /// ACTIVE contracts attached to a CID.
    async fn active_pins_for(&self, cid: &Hex32) -> Result<Vec<PinContract>, StorageError>;

    // ---- epoch summaries ----

    /// Whether any summary row exists for the epoch. The settlement
    /// idempotency guard.
    async fn epoch_has_summaries(&self, epoch: u32) -> Result<bool, StorageError>;

    /// Persists a batch of summaries atomically. Fails with `Conflict` if
    /// any (epoch, host, cid) row already exists; on failure nothing is
    /// written.
    async fn insert_summaries(&self, summaries: &[EpochSummary]) -> Result<(), StorageError>;

    async fn summaries_for_epoch(&self, epoch: u32) -> Result<Vec<EpochSummary>, StorageError>;
}

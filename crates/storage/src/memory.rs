//! In-memory implementations of every storage port.
//!
//! These are the workspace test doubles, but they implement the full
//! contract (conflict detection, clamped debits, atomic summary batches)
//! so behavioural tests against them carry over to the durable backends.

use async_trait::async_trait;
use caravel_api::{BlockStore, CoordinatorStore, MetadataStore, SpotCheck};
use caravel_types::{
    AssetRoot, BountyPool, EpochSummary, EventV1, FileManifest, Hex32, HostRecord, PinContract,
    PinStatus, ReceiptDigest, ReceiptV2, StorageError,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// In-memory content-addressed block store.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<Hex32, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, cid: &Hex32, bytes: &[u8]) -> Result<(), StorageError> {
        let mut blocks = self.blocks.lock().map_err(poisoned)?;
        if blocks.contains_key(cid) {
            return Err(StorageError::Conflict);
        }
        blocks.insert(*cid, bytes.to_vec());
        Ok(())
    }

    async fn get(&self, cid: &Hex32) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blocks.lock().map_err(poisoned)?.get(cid).cloned())
    }

    async fn contains(&self, cid: &Hex32) -> Result<bool, StorageError> {
        Ok(self.blocks.lock().map_err(poisoned)?.contains_key(cid))
    }
}

/// In-memory manifest/asset store.
#[derive(Default)]
pub struct MemoryMetadataStore {
    manifests: Mutex<HashMap<Hex32, FileManifest>>,
    assets: Mutex<HashMap<Hex32, AssetRoot>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put_manifest(
        &self,
        root: &Hex32,
        manifest: &FileManifest,
    ) -> Result<(), StorageError> {
        self.manifests
            .lock()
            .map_err(poisoned)?
            .insert(*root, manifest.clone());
        Ok(())
    }

    async fn get_manifest(&self, root: &Hex32) -> Result<Option<FileManifest>, StorageError> {
        Ok(self.manifests.lock().map_err(poisoned)?.get(root).cloned())
    }

    async fn put_asset(&self, root: &Hex32, asset: &AssetRoot) -> Result<(), StorageError> {
        self.assets
            .lock()
            .map_err(poisoned)?
            .insert(*root, asset.clone());
        Ok(())
    }

    async fn get_asset(&self, root: &Hex32) -> Result<Option<AssetRoot>, StorageError> {
        Ok(self.assets.lock().map_err(poisoned)?.get(root).cloned())
    }
}

#[derive(Default)]
struct Inner {
    receipts: Vec<ReceiptV2>,
    events: Vec<(Hex32, EventV1)>,
    hosts: BTreeMap<Hex32, HostRecord>,
    serves: BTreeSet<(Hex32, Hex32)>,
    checks: Vec<SpotCheck>,
    bounties: BTreeMap<Hex32, BountyPool>,
    protocol_sats: u64,
    pins: BTreeMap<Hex32, PinContract>,
    summaries: BTreeMap<(u32, Hex32, Hex32), EpochSummary>,
}

/// In-memory coordinator state.
#[derive(Default)]
pub struct MemoryCoordinatorStore {
    inner: Mutex<Inner>,
}

impl MemoryCoordinatorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Backend("lock poisoned".into())
}

#[async_trait]
impl CoordinatorStore for MemoryCoordinatorStore {
    async fn insert_receipt(&self, receipt: &ReceiptV2) -> Result<(), StorageError> {
        self.inner.lock().map_err(poisoned)?.receipts.push(receipt.clone());
        Ok(())
    }

    async fn receipts_for_epoch(&self, epoch: u32) -> Result<Vec<ReceiptDigest>, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .receipts
            .iter()
            .filter(|r| r.epoch == epoch)
            .map(|r| r.digest())
            .collect())
    }

    async fn append_event(&self, event_id: &Hex32, event: &EventV1) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        inner.events.push((*event_id, event.clone()));
        Ok(inner.events.len() as u64)
    }

    async fn events_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<(u64, EventV1)>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .events
            .iter()
            .enumerate()
            .map(|(i, (_, e))| (i as u64 + 1, e.clone()))
            .filter(|(seq, _)| *seq > after)
            .take(limit)
            .collect())
    }

    async fn upsert_host(&self, host: &HostRecord) -> Result<(), StorageError> {
        self.inner
            .lock()
            .map_err(poisoned)?
            .hosts
            .insert(host.pubkey, host.clone());
        Ok(())
    }

    async fn get_host(&self, pubkey: &Hex32) -> Result<Option<HostRecord>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner.hosts.get(pubkey).cloned().map(|mut record| {
            record.served_cids = served_for(&inner.serves, pubkey);
            record
        }))
    }

    async fn list_hosts(&self, limit: usize) -> Result<Vec<HostRecord>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .hosts
            .values()
            .take(limit)
            .cloned()
            .map(|mut record| {
                record.served_cids = served_for(&inner.serves, &record.pubkey);
                record
            })
            .collect())
    }

    async fn add_serve(&self, host: &Hex32, cid: &Hex32) -> Result<(), StorageError> {
        self.inner
            .lock()
            .map_err(poisoned)?
            .serves
            .insert((*host, *cid));
        Ok(())
    }

    async fn list_serves(&self) -> Result<Vec<(Hex32, Hex32)>, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .serves
            .iter()
            .copied()
            .collect())
    }

    async fn record_spot_check(&self, check: &SpotCheck) -> Result<(), StorageError> {
        self.inner.lock().map_err(poisoned)?.checks.push(*check);
        Ok(())
    }

    async fn availability_counts(
        &self,
        host: &Hex32,
        epoch_lo: u32,
        epoch_hi: u32,
    ) -> Result<(u64, u64), StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let mut passed = 0u64;
        let mut total = 0u64;
        for check in &inner.checks {
            if check.host == *host && check.epoch >= epoch_lo && check.epoch <= epoch_hi {
                total += 1;
                if check.passed {
                    passed += 1;
                }
            }
        }
        Ok((passed, total))
    }

    async fn get_bounty(&self, cid: &Hex32) -> Result<BountyPool, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .bounties
            .get(cid)
            .copied()
            .unwrap_or_default())
    }

    async fn credit_bounty(&self, cid: &Hex32, amount: u64) -> Result<(), StorageError> {
        self.inner
            .lock()
            .map_err(poisoned)?
            .bounties
            .entry(*cid)
            .or_default()
            .credit(amount);
        Ok(())
    }

    async fn debit_bounty(
        &self,
        cid: &Hex32,
        amount: u64,
        epoch: u32,
    ) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let pool = inner.bounties.entry(*cid).or_default();
        Ok(pool.debit(amount, epoch))
    }

    async fn credit_protocol(&self, amount: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        inner.protocol_sats = inner.protocol_sats.saturating_add(amount);
        Ok(())
    }

    async fn protocol_balance(&self) -> Result<u64, StorageError> {
        Ok(self.inner.lock().map_err(poisoned)?.protocol_sats)
    }

    async fn insert_pin(&self, pin: &PinContract) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if inner.pins.contains_key(&pin.id) {
            return Err(StorageError::Conflict);
        }
        inner.pins.insert(pin.id, pin.clone());
        Ok(())
    }

    async fn get_pin(&self, id: &Hex32) -> Result<Option<PinContract>, StorageError> {
        Ok(self.inner.lock().map_err(poisoned)?.pins.get(id).cloned())
    }

    async fn update_pin(&self, pin: &PinContract) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if !inner.pins.contains_key(&pin.id) {
            return Err(StorageError::NotFound);
        }
        inner.pins.insert(pin.id, pin.clone());
        Ok(())
    }

    async fn active_pins_for(&self, cid: &Hex32) -> Result<Vec<PinContract>, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .pins
            .values()
            .filter(|p| p.asset_root == *cid && p.status == PinStatus::Active)
            .cloned()
            .collect())
    }

    async fn epoch_has_summaries(&self, epoch: u32) -> Result<bool, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .summaries
            .keys()
            .any(|(e, _, _)| *e == epoch))
    }

    async fn insert_summaries(&self, summaries: &[EpochSummary]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        // All-or-nothing: reject the whole batch on any duplicate key.
        for summary in summaries {
            if inner
                .summaries
                .contains_key(&(summary.epoch, summary.host, summary.cid))
            {
                return Err(StorageError::Conflict);
            }
        }
        for summary in summaries {
            inner.summaries.insert(
                (summary.epoch, summary.host, summary.cid),
                summary.clone(),
            );
        }
        Ok(())
    }

    async fn summaries_for_epoch(&self, epoch: u32) -> Result<Vec<EpochSummary>, StorageError> {
        Ok(self
            .inner
            .lock()
            .map_err(poisoned)?
            .summaries
            .iter()
            .filter(|((e, _, _), _)| *e == epoch)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

fn served_for(serves: &BTreeSet<(Hex32, Hex32)>, host: &Hex32) -> BTreeSet<Hex32> {
    serves
        .iter()
        .filter(|(h, _)| h == host)
        .map(|(_, c)| *c)
        .collect()
}

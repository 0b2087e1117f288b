//! redb-backed coordinator state.
//!
//! Single database, one table per entity, prefix-encoded big-endian keys so
//! epoch and host scans are contiguous ranges. Monotonic sequence counters
//! live in a small META table. Summary batches commit in one transaction,
//! which is what makes the settlement idempotency guard sound across
//! crashes.

use async_trait::async_trait;
use caravel_api::{CoordinatorStore, SpotCheck};
use caravel_types::{
    BountyPool, EpochSummary, EventV1, Hex32, HostRecord, PinContract, PinStatus, ReceiptDigest,
    ReceiptV2, StorageError,
};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

/// ---- Table definitions (single DB, prefix-encoded keys) ----
const META: TableDefinition<&str, u64> = TableDefinition::new("META");
// key = [epoch_be4][seq_be8]
const RECEIPTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("RECEIPTS");
// key = [seq_be8], value = (event_id, event)
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("EVENTS");
// key = [pubkey_32]
const HOSTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("HOSTS");
// key = [host_32][cid_32]
const SERVES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("SERVES");
// key = [host_32][epoch_be4][seq_be8], value = [passed_u8]
const SPOT_CHECKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("SPOT_CHECKS");
// key = [cid_32]
const BOUNTIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BOUNTIES");
// key = [id_32]
const PINS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("PINS");
// key = [epoch_be4][host_32][cid_32]
const SUMMARIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("SUMMARIES");

const SEQ_RECEIPT: &str = "receipt_seq";
const SEQ_EVENT: &str = "event_seq";
const SEQ_SPOT: &str = "spot_seq";
const PROTOCOL_SATS: &str = "protocol_sats";

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn decode_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Decode(e.to_string())
}

// Rows hold schemas with optional, serde-skipped fields, so they need a
// self-describing encoding; JSON keeps them debuggable with redb tooling.
fn enc<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(decode_err)
}

fn dec<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(decode_err)
}

fn k_receipt(epoch: u32, seq: u64) -> Vec<u8> {
    [epoch.to_be_bytes().as_slice(), seq.to_be_bytes().as_slice()].concat()
}

fn k_serve(host: &Hex32, cid: &Hex32) -> Vec<u8> {
    [host.as_bytes().as_slice(), cid.as_bytes().as_slice()].concat()
}

fn k_spot(host: &Hex32, epoch: u32, seq: u64) -> Vec<u8> {
    [
        host.as_bytes().as_slice(),
        epoch.to_be_bytes().as_slice(),
        seq.to_be_bytes().as_slice(),
    ]
    .concat()
}

fn k_summary(epoch: u32, host: &Hex32, cid: &Hex32) -> Vec<u8> {
    [
        epoch.to_be_bytes().as_slice(),
        host.as_bytes().as_slice(),
        cid.as_bytes().as_slice(),
    ]
    .concat()
}

/// The exclusive upper bound for a prefix scan: the prefix with its last
/// non-0xff byte incremented. `None` means unbounded (all-0xff prefix).
fn prefix_upper(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last().copied() {
        if last == 0xff {
            upper.pop();
        } else {
            let end = upper.len() - 1;
            upper[end] = last + 1;
            return Some(upper);
        }
    }
    None
}

/// Durable coordinator state on redb.
#[derive(Clone)]
pub struct RedbCoordinatorStore {
    db: Arc<Database>,
}

impl RedbCoordinatorStore {
    /// Opens (or creates) the database and ensures every table exists, so
    /// later read transactions never hit a missing table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(backend)?;
        {
            let txn = db.begin_write().map_err(backend)?;
            {
                txn.open_table(META).map_err(backend)?;
                txn.open_table(RECEIPTS).map_err(backend)?;
                txn.open_table(EVENTS).map_err(backend)?;
                txn.open_table(HOSTS).map_err(backend)?;
                txn.open_table(SERVES).map_err(backend)?;
                txn.open_table(SPOT_CHECKS).map_err(backend)?;
                txn.open_table(BOUNTIES).map_err(backend)?;
                txn.open_table(PINS).map_err(backend)?;
                txn.open_table(SUMMARIES).map_err(backend)?;
            }
            txn.commit().map_err(backend)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    /// Bumps a META counter inside the caller's transaction and returns the
    /// new value.
    fn next_seq(txn: &redb::WriteTransaction, name: &str) -> Result<u64, StorageError> {
        let mut table = txn.open_table(META).map_err(backend)?;
        let current = table
            .get(name)
            .map_err(backend)?
            .map(|g| g.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(name, next).map_err(backend)?;
        Ok(next)
    }

    fn scan_prefix<T, F>(&self, table: TableDefinition<&[u8], &[u8]>, prefix: &[u8], mut f: F)
        -> Result<Vec<T>, StorageError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<Option<T>, StorageError>,
    {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(table).map_err(backend)?;
        let upper = prefix_upper(prefix);
        let bounds = (
            Bound::Included(prefix),
            match upper.as_deref() {
                Some(u) => Bound::Excluded(u),
                None => Bound::Unbounded,
            },
        );
        let mut out = Vec::new();
        for entry in table.range::<&[u8]>(bounds).map_err(backend)? {
            let (key, value) = entry.map_err(backend)?;
            if let Some(item) = f(key.value(), value.value())? {
                out.push(item);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl CoordinatorStore for RedbCoordinatorStore {
    async fn insert_receipt(&self, receipt: &ReceiptV2) -> Result<(), StorageError> {
        let bytes = enc(receipt)?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let seq = Self::next_seq(&txn, SEQ_RECEIPT)?;
            let mut table = txn.open_table(RECEIPTS).map_err(backend)?;
            table
                .insert(k_receipt(receipt.epoch, seq).as_slice(), bytes.as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn receipts_for_epoch(&self, epoch: u32) -> Result<Vec<ReceiptDigest>, StorageError> {
        self.scan_prefix(RECEIPTS, &epoch.to_be_bytes(), |_, value| {
            let receipt: ReceiptV2 = dec(value)?;
            Ok(Some(receipt.digest()))
        })
    }

    async fn append_event(&self, event_id: &Hex32, event: &EventV1) -> Result<u64, StorageError> {
        let bytes = enc(&(*event_id, event.clone()))?;
        let txn = self.db.begin_write().map_err(backend)?;
        let seq = {
            let seq = Self::next_seq(&txn, SEQ_EVENT)?;
            let mut table = txn.open_table(EVENTS).map_err(backend)?;
            table
                .insert(seq.to_be_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
            seq
        };
        txn.commit().map_err(backend)?;
        Ok(seq)
    }

    async fn events_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<(u64, EventV1)>, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(EVENTS).map_err(backend)?;
        let lo = (after + 1).to_be_bytes();
        let mut out = Vec::new();
        for entry in table
            .range::<&[u8]>((Bound::Included(lo.as_slice()), Bound::Unbounded))
            .map_err(backend)?
        {
            if out.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(backend)?;
            let raw: [u8; 8] = key
                .value()
                .try_into()
                .map_err(|_| StorageError::Decode("event key width".into()))?;
            let (_, event): (Hex32, EventV1) = dec(value.value())?;
            out.push((u64::from_be_bytes(raw), event));
        }
        Ok(out)
    }

    async fn upsert_host(&self, host: &HostRecord) -> Result<(), StorageError> {
        let bytes = enc(host)?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(HOSTS).map_err(backend)?;
            table
                .insert(host.pubkey.as_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn get_host(&self, pubkey: &Hex32) -> Result<Option<HostRecord>, StorageError> {
        let record = {
            let txn = self.db.begin_read().map_err(backend)?;
            let table = txn.open_table(HOSTS).map_err(backend)?;
            let result = match table.get(pubkey.as_bytes().as_slice()).map_err(backend)? {
                Some(guard) => Some(dec::<HostRecord>(guard.value())?),
                None => None,
            };
            result
        };
        match record {
            Some(mut record) => {
                record.served_cids = self.served_for(pubkey)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list_hosts(&self, limit: usize) -> Result<Vec<HostRecord>, StorageError> {
        let records = {
            let txn = self.db.begin_read().map_err(backend)?;
            let table = txn.open_table(HOSTS).map_err(backend)?;
            let mut records = Vec::new();
            for entry in table.iter().map_err(backend)? {
                if records.len() >= limit {
                    break;
                }
                let (_, value) = entry.map_err(backend)?;
                records.push(dec::<HostRecord>(value.value())?);
            }
            records
        };
        records
            .into_iter()
            .map(|mut record| {
                record.served_cids = self.served_for(&record.pubkey)?;
                Ok(record)
            })
            .collect()
    }

    async fn add_serve(&self, host: &Hex32, cid: &Hex32) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(SERVES).map_err(backend)?;
            table
                .insert(k_serve(host, cid).as_slice(), [].as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn list_serves(&self) -> Result<Vec<(Hex32, Hex32)>, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(SERVES).map_err(backend)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(backend)? {
            let (key, _) = entry.map_err(backend)?;
            out.push(split_serve_key(key.value())?);
        }
        Ok(out)
    }

    async fn record_spot_check(&self, check: &SpotCheck) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let seq = Self::next_seq(&txn, SEQ_SPOT)?;
            let mut table = txn.open_table(SPOT_CHECKS).map_err(backend)?;
            let value = [u8::from(check.passed)];
            table
                .insert(
                    k_spot(&check.host, check.epoch, seq).as_slice(),
                    value.as_slice(),
                )
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn availability_counts(
        &self,
        host: &Hex32,
        epoch_lo: u32,
        epoch_hi: u32,
    ) -> Result<(u64, u64), StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(SPOT_CHECKS).map_err(backend)?;
        let lo = [host.as_bytes().as_slice(), &epoch_lo.to_be_bytes()].concat();
        // Exclusive upper bound: first key past (host, epoch_hi).
        let hi_prefix = match epoch_hi.checked_add(1) {
            Some(next) => Some([host.as_bytes().as_slice(), &next.to_be_bytes()].concat()),
            None => prefix_upper(host.as_bytes()),
        };
        let bounds = (
            Bound::Included(lo.as_slice()),
            match hi_prefix.as_deref() {
                Some(hi) => Bound::Excluded(hi),
                None => Bound::Unbounded,
            },
        );
        let mut passed = 0u64;
        let mut total = 0u64;
        for entry in table.range::<&[u8]>(bounds).map_err(backend)? {
            let (_, value) = entry.map_err(backend)?;
            total += 1;
            if value.value().first() == Some(&1) {
                passed += 1;
            }
        }
        Ok((passed, total))
    }

    async fn get_bounty(&self, cid: &Hex32) -> Result<BountyPool, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(BOUNTIES).map_err(backend)?;
        let result = match table.get(cid.as_bytes().as_slice()).map_err(backend)? {
            Some(guard) => dec(guard.value()),
            None => Ok(BountyPool::default()),
        };
        result
    }

    async fn credit_bounty(&self, cid: &Hex32, amount: u64) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(BOUNTIES).map_err(backend)?;
            let mut pool = match table.get(cid.as_bytes().as_slice()).map_err(backend)? {
                Some(guard) => dec::<BountyPool>(guard.value())?,
                None => BountyPool::default(),
            };
            pool.credit(amount);
            let bytes = enc(&pool)?;
            table
                .insert(cid.as_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn debit_bounty(
        &self,
        cid: &Hex32,
        amount: u64,
        epoch: u32,
    ) -> Result<u64, StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        let debited = {
            let mut table = txn.open_table(BOUNTIES).map_err(backend)?;
            let mut pool = match table.get(cid.as_bytes().as_slice()).map_err(backend)? {
                Some(guard) => dec::<BountyPool>(guard.value())?,
                None => BountyPool::default(),
            };
            let debited = pool.debit(amount, epoch);
            let bytes = enc(&pool)?;
            table
                .insert(cid.as_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
            debited
        };
        txn.commit().map_err(backend)?;
        Ok(debited)
    }

    async fn credit_protocol(&self, amount: u64) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(META).map_err(backend)?;
            let current = table
                .get(PROTOCOL_SATS)
                .map_err(backend)?
                .map(|g| g.value())
                .unwrap_or(0);
            table
                .insert(PROTOCOL_SATS, current.saturating_add(amount))
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn protocol_balance(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(META).map_err(backend)?;
        let result = table
            .get(PROTOCOL_SATS)
            .map_err(backend)?
            .map(|g| g.value())
            .unwrap_or(0);
        Ok(result)
    }

    async fn insert_pin(&self, pin: &PinContract) -> Result<(), StorageError> {
        let bytes = enc(pin)?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(PINS).map_err(backend)?;
            if table
                .get(pin.id.as_bytes().as_slice())
                .map_err(backend)?
                .is_some()
            {
                return Err(StorageError::Conflict);
            }
            table
                .insert(pin.id.as_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn get_pin(&self, id: &Hex32) -> Result<Option<PinContract>, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(PINS).map_err(backend)?;
        let result = match table.get(id.as_bytes().as_slice()).map_err(backend)? {
            Some(guard) => Ok(Some(dec(guard.value())?)),
            None => Ok(None),
        };
        result
    }

    async fn update_pin(&self, pin: &PinContract) -> Result<(), StorageError> {
        let bytes = enc(pin)?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(PINS).map_err(backend)?;
            if table
                .get(pin.id.as_bytes().as_slice())
                .map_err(backend)?
                .is_none()
            {
                return Err(StorageError::NotFound);
            }
            table
                .insert(pin.id.as_bytes().as_slice(), bytes.as_slice())
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)
    }

    async fn active_pins_for(&self, cid: &Hex32) -> Result<Vec<PinContract>, StorageError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(PINS).map_err(backend)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(backend)? {
            let (_, value) = entry.map_err(backend)?;
            let pin: PinContract = dec(value.value())?;
            if pin.asset_root == *cid && pin.status == PinStatus::Active {
                out.push(pin);
            }
        }
        Ok(out)
    }

    async fn epoch_has_summaries(&self, epoch: u32) -> Result<bool, StorageError> {
        let found = self.scan_prefix(SUMMARIES, &epoch.to_be_bytes(), |_, _| Ok(Some(())))?;
        Ok(!found.is_empty())
    }

    async fn insert_summaries(&self, summaries: &[EpochSummary]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(SUMMARIES).map_err(backend)?;
            // All-or-nothing: any duplicate key aborts the transaction
            // before a single row lands.
            for summary in summaries {
                let key = k_summary(summary.epoch, &summary.host, &summary.cid);
                if table.get(key.as_slice()).map_err(backend)?.is_some() {
                    return Err(StorageError::Conflict);
                }
            }
            for summary in summaries {
                let key = k_summary(summary.epoch, &summary.host, &summary.cid);
                let bytes = enc(summary)?;
                table
                    .insert(key.as_slice(), bytes.as_slice())
                    .map_err(backend)?;
            }
        }
        txn.commit().map_err(backend)
    }

    async fn summaries_for_epoch(&self, epoch: u32) -> Result<Vec<EpochSummary>, StorageError> {
        self.scan_prefix(SUMMARIES, &epoch.to_be_bytes(), |_, value| {
            Ok(Some(dec::<EpochSummary>(value)?))
        })
    }
}

impl RedbCoordinatorStore {
    fn served_for(&self, host: &Hex32) -> Result<BTreeSet<Hex32>, StorageError> {
        let pairs = self.scan_prefix(SERVES, host.as_bytes(), |key, _| {
            Ok(Some(split_serve_key(key)?.1))
        })?;
        Ok(pairs.into_iter().collect())
    }
}

fn split_serve_key(key: &[u8]) -> Result<(Hex32, Hex32), StorageError> {
    if key.len() != 64 {
        return Err(StorageError::Decode("serve key width".into()));
    }
    let host: [u8; 32] = key[0..32]
        .try_into()
        .map_err(|_| StorageError::Decode("serve key host".into()))?;
    let cid: [u8; 32] = key[32..64]
        .try_into()
        .map_err(|_| StorageError::Decode("serve key cid".into()))?;
    Ok((Hex32::from_bytes(host), Hex32::from_bytes(cid)))
}

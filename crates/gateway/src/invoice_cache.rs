//! TTL cache of issued invoice records.
//!
//! Keyed by payment hash. Eviction is lazy on access plus an occasional
//! full sweep, which bounds memory without a background timer per entry.

use caravel_types::Hex32;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// One issued, not-yet-redeemed invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRecord {
    pub cid: Hex32,
    pub price_sats: u32,
    pub bolt11: String,
    pub expires_at_ms: u64,
    created: Instant,
}

pub struct InvoiceCache {
    records: DashMap<Hex32, InvoiceRecord>,
    ttl: Duration,
}

impl InvoiceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, payment_hash: Hex32, cid: Hex32, price_sats: u32, bolt11: String) {
        let record = InvoiceRecord {
            cid,
            price_sats,
            bolt11,
            expires_at_ms: caravel_types::epoch::now_ms() + self.ttl.as_millis() as u64,
            created: Instant::now(),
        };
        self.records.insert(payment_hash, record);
    }

    /// Returns a live record, evicting it first if it has expired.
    pub fn get(&self, payment_hash: &Hex32) -> Option<InvoiceRecord> {
        let expired = match self.records.get(payment_hash) {
            Some(record) if record.created.elapsed() > self.ttl => true,
            Some(record) => return Some(record.clone()),
            None => return None,
        };
        if expired {
            self.records.remove(payment_hash);
        }
        None
    }

    /// Removes a record after redemption.
    pub fn remove(&self, payment_hash: &Hex32) {
        self.records.remove(payment_hash);
    }

    /// Drops every expired record. Called from a periodic task.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.records.retain(|_, record| record.created.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_types::cid_from_bytes;

    #[test]
    fn expired_records_are_evicted_on_access() {
        let cache = InvoiceCache::new(Duration::from_millis(0));
        let hash = cid_from_bytes(b"h");
        cache.insert(hash, cid_from_bytes(b"c"), 21, "lnbcrt1".into());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&hash).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_clears_expired_records() {
        let cache = InvoiceCache::new(Duration::from_millis(0));
        for i in 0..4u8 {
            cache.insert(
                cid_from_bytes(&[i]),
                cid_from_bytes(b"c"),
                21,
                "lnbcrt1".into(),
            );
        }
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert!(cache.is_empty());
    }

    #[test]
    fn live_records_survive() {
        let cache = InvoiceCache::new(Duration::from_secs(60));
        let hash = cid_from_bytes(b"h");
        cache.insert(hash, cid_from_bytes(b"c"), 21, "lnbcrt1".into());
        assert_eq!(cache.get(&hash).unwrap().price_sats, 21);
        cache.sweep();
        assert_eq!(cache.len(), 1);
    }
}

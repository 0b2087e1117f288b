//! Grouping receipts into per-(host, cid) epoch groups.

use caravel_types::constants::{RECEIPT_MIN_COUNT, RECEIPT_MIN_UNIQUE_CLIENTS};
use caravel_types::{Hex32, ReceiptDigest};
use std::collections::{BTreeMap, BTreeSet};

/// One (host, cid) group within an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochGroup {
    pub host: Hex32,
    pub cid: Hex32,
    pub receipt_count: u64,
    pub unique_clients: u64,
}

impl EpochGroup {
    /// Reward eligibility: enough receipts from enough distinct clients.
    /// Ineligible groups still get a zero-reward summary row.
    pub fn is_eligible(&self) -> bool {
        self.receipt_count >= RECEIPT_MIN_COUNT
            && self.unique_clients >= RECEIPT_MIN_UNIQUE_CLIENTS
    }
}

/// Groups digests by (host, cid). Pure; input order never affects the
/// output, which comes back sorted by (host, cid).
///
/// Duplicate payment hashes are not filtered here: aggregation keys on the
/// client, so replays inflate `receipt_count` but never `unique_clients`.
pub fn aggregate_digests(digests: impl IntoIterator<Item = ReceiptDigest>) -> Vec<EpochGroup> {
    let mut groups: BTreeMap<(Hex32, Hex32), (u64, BTreeSet<Hex32>)> = BTreeMap::new();
    for digest in digests {
        let entry = groups
            .entry((digest.host, digest.cid))
            .or_insert_with(|| (0, BTreeSet::new()));
        entry.0 += 1;
        entry.1.insert(digest.client);
    }
    groups
        .into_iter()
        .map(|((host, cid), (count, clients))| EpochGroup {
            host,
            cid,
            receipt_count: count,
            unique_clients: clients.len() as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(host: u8, cid: u8, client: u8) -> ReceiptDigest {
        ReceiptDigest {
            host: Hex32::from_bytes([host; 32]),
            cid: Hex32::from_bytes([cid; 32]),
            client: Hex32::from_bytes([client; 32]),
            price_sats: 21,
        }
    }

    #[test]
    fn three_clients_three_receipts_is_not_eligible() {
        let groups = aggregate_digests(vec![
            digest(0xaa, 0x11, 1),
            digest(0xaa, 0x11, 2),
            digest(0xaa, 0x11, 3),
        ]);
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.receipt_count, 3);
        assert_eq!(g.unique_clients, 3);
        assert!(!g.is_eligible());
    }

    #[test]
    fn five_receipts_three_clients_is_eligible() {
        let groups = aggregate_digests(vec![
            digest(0xaa, 0x11, 1),
            digest(0xaa, 0x11, 1),
            digest(0xaa, 0x11, 2),
            digest(0xaa, 0x11, 2),
            digest(0xaa, 0x11, 3),
        ]);
        let g = &groups[0];
        assert_eq!((g.receipt_count, g.unique_clients), (5, 3));
        assert!(g.is_eligible());
    }

    #[test]
    fn grouping_is_order_independent() {
        let mut digests = vec![
            digest(1, 9, 1),
            digest(1, 9, 2),
            digest(2, 9, 1),
            digest(1, 8, 3),
            digest(1, 9, 2),
        ];
        let forward = aggregate_digests(digests.clone());
        digests.reverse();
        let backward = aggregate_digests(digests);
        assert_eq!(forward, backward);
    }

    #[test]
    fn unique_clients_never_exceed_receipt_count() {
        let groups = aggregate_digests((0..10u8).map(|i| digest(1, 2, i % 4)));
        for g in groups {
            assert!(g.unique_clients <= g.receipt_count);
        }
    }

    #[test]
    fn distinct_cids_form_distinct_groups() {
        let groups = aggregate_digests(vec![digest(1, 1, 1), digest(1, 2, 1)]);
        assert_eq!(groups.len(), 2);
    }
}

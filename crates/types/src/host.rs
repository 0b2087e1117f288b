//! Host registry records.

use crate::cid::Hex32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of a storage host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostStatus {
    /// Registered, no availability history yet.
    Pending,
    /// Passing availability checks.
    Trusted,
    /// Failing availability checks but still reachable sometimes.
    Degraded,
    /// No successful checks across the window.
    Inactive,
    /// Withdrawing stake; exempt from the inactive rule.
    Unbonding,
    /// Stake slashed; terminal.
    Slashed,
}

/// Posted pricing for paid block fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPricing {
    /// Floor price per request, in sats.
    pub min_request_sats: u64,
    /// Volume price, sats per gigabyte served.
    pub sats_per_gb: u64,
}

impl Default for HostPricing {
    fn default() -> Self {
        Self {
            min_request_sats: 1,
            sats_per_gb: 50,
        }
    }
}

/// One registered host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub pubkey: Hex32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub stake: u64,
    pub status: HostStatus,
    pub pricing: HostPricing,
    /// Rolling-window availability, in `[0, 1]`.
    pub availability_score: f64,
    /// CIDs the host has announced it serves.
    #[serde(default)]
    pub served_cids: BTreeSet<Hex32>,
}

impl HostRecord {
    /// A freshly registered host: pending until the first sweep scores it.
    pub fn new(pubkey: Hex32, endpoint: Option<String>, pricing: HostPricing) -> Self {
        Self {
            pubkey,
            endpoint,
            stake: 0,
            status: HostStatus::Pending,
            pricing,
            availability_score: 0.0,
            served_cids: BTreeSet::new(),
        }
    }
}

//! Per-CID bounty pools.

use serde::{Deserialize, Serialize};

/// Sats pledged against one CID, drained at settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyPool {
    pub balance_sats: u64,
    /// Last epoch this pool paid out in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payout_epoch: Option<u32>,
}

impl BountyPool {
    /// Debits up to `amount`, clamped to the available balance. The balance
    /// can never go negative. Returns the amount actually debited.
    pub fn debit(&mut self, amount: u64, epoch: u32) -> u64 {
        let debited = amount.min(self.balance_sats);
        self.balance_sats -= debited;
        if debited > 0 {
            self.last_payout_epoch = Some(epoch);
        }
        debited
    }

    pub fn credit(&mut self, amount: u64) {
        self.balance_sats = self.balance_sats.saturating_add(amount);
    }
}

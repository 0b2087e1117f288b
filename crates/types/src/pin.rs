//! Pin contracts: client-funded durability guarantees.

use crate::cid::Hex32;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PinStatus {
    Active,
    Exhausted,
    Cancelled,
}

/// A funded pledge to keep an asset replicated for a number of epochs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinContract {
    /// Content ID of the canonical pin request payload.
    pub id: Hex32,
    pub client: Hex32,
    pub asset_root: Hex32,
    pub min_copies: u32,
    pub duration_epochs: u32,
    /// Budget at creation.
    pub budget_sats: u64,
    /// Budget still undrained.
    pub remaining_sats: u64,
    /// Budget consumed per epoch: `budget_sats / duration_epochs`.
    pub drain_rate: u64,
    pub status: PinStatus,
    pub created_epoch: u32,
}

impl PinContract {
    /// Drains up to `amount` sats; transitions to EXHAUSTED when the budget
    /// hits zero. Returns the amount actually drained.
    pub fn drain(&mut self, amount: u64) -> u64 {
        if self.status != PinStatus::Active {
            return 0;
        }
        let drained = amount.min(self.remaining_sats);
        self.remaining_sats -= drained;
        if self.remaining_sats == 0 {
            self.status = PinStatus::Exhausted;
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clamps_and_exhausts() {
        let mut pin = PinContract {
            id: Hex32::ZERO,
            client: Hex32::ZERO,
            asset_root: Hex32::ZERO,
            min_copies: 3,
            duration_epochs: 10,
            budget_sats: 100,
            remaining_sats: 30,
            drain_rate: 10,
            status: PinStatus::Active,
            created_epoch: 0,
        };
        assert_eq!(pin.drain(25), 25);
        assert_eq!(pin.status, PinStatus::Active);
        assert_eq!(pin.drain(25), 5);
        assert_eq!(pin.status, PinStatus::Exhausted);
        assert_eq!(pin.drain(25), 0);
    }
}

//! Epoch arithmetic and settlement summary schemas.
//!
//! Epochs are numbered from a protocol genesis timestamp. The clock is pure
//! arithmetic over milliseconds; the process-wide instance is installed once
//! at startup and reset explicitly in tests, never implicitly.

use crate::cid::Hex32;
use crate::constants::EPOCH_LENGTH_MS;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Deterministic epoch arithmetic anchored at a genesis timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochClock {
    genesis_ms: u64,
    epoch_length_ms: u64,
}

impl EpochClock {
    pub fn new(genesis_ms: u64, epoch_length_ms: u64) -> Self {
        Self {
            genesis_ms,
            // A zero-length epoch would make every division below undefined.
            epoch_length_ms: epoch_length_ms.max(1),
        }
    }

    /// Clock with the default four-hour epoch length.
    pub fn with_default_length(genesis_ms: u64) -> Self {
        Self::new(genesis_ms, EPOCH_LENGTH_MS)
    }

    pub fn genesis_ms(&self) -> u64 {
        self.genesis_ms
    }

    pub fn epoch_length_ms(&self) -> u64 {
        self.epoch_length_ms
    }

    /// The epoch containing the given wall-clock millisecond timestamp.
    /// Timestamps before genesis land in epoch 0.
    pub fn epoch_at(&self, ts_ms: u64) -> u32 {
        let elapsed = ts_ms.saturating_sub(self.genesis_ms);
        (elapsed / self.epoch_length_ms) as u32
    }

    /// The first millisecond of the given epoch.
    pub fn start_ms(&self, epoch: u32) -> u64 {
        self.genesis_ms + epoch as u64 * self.epoch_length_ms
    }

    /// The currently open epoch.
    pub fn current_epoch(&self) -> u32 {
        self.epoch_at(now_ms())
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

static GLOBAL_CLOCK: Lazy<RwLock<Option<EpochClock>>> = Lazy::new(|| RwLock::new(None));

/// Installs the process-wide epoch clock. Later installs replace earlier
/// ones, which only happens in tests.
pub fn install_clock(clock: EpochClock) {
    if let Ok(mut guard) = GLOBAL_CLOCK.write() {
        *guard = Some(clock);
    }
}

/// The installed process-wide clock, if any.
pub fn installed_clock() -> Option<EpochClock> {
    GLOBAL_CLOCK.read().ok().and_then(|g| *g)
}

/// Clears the process-wide clock. Test hook.
pub fn reset_clock() {
    if let Ok(mut guard) = GLOBAL_CLOCK.write() {
        *guard = None;
    }
}

/// One settled (epoch, host, cid) group. The persisted row is the
/// idempotency key for settlement: if any summary exists for an epoch, that
/// epoch is already settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: u32,
    pub host: Hex32,
    pub cid: Hex32,
    pub receipt_count: u64,
    pub unique_clients: u64,
    pub reward_sats: u64,
    pub eligible: bool,
}

/// The result of one `settle_epoch` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementReport {
    pub epoch: u32,
    pub total_groups: u64,
    pub eligible_groups: u64,
    pub paid_groups: u64,
    pub total_paid_sats: u64,
    pub total_aggregator_fee_sats: u64,
    pub summaries: Vec<EpochSummary>,
}

impl SettlementReport {
    /// The empty report returned when the idempotency guard fires.
    pub fn already_settled(epoch: u32) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_boundaries_are_half_open() {
        let clock = EpochClock::new(1_000, 100);
        assert_eq!(clock.epoch_at(999), 0); // pre-genesis clamps to 0
        assert_eq!(clock.epoch_at(1_000), 0);
        assert_eq!(clock.epoch_at(1_099), 0);
        assert_eq!(clock.epoch_at(1_100), 1);
        assert_eq!(clock.start_ms(1), 1_100);
    }

    #[test]
    fn install_and_reset() {
        reset_clock();
        assert!(installed_clock().is_none());
        install_clock(EpochClock::new(0, 1_000));
        assert_eq!(installed_clock().unwrap().epoch_length_ms(), 1_000);
        reset_clock();
        assert!(installed_clock().is_none());
    }
}

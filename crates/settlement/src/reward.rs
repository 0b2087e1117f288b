//! Per-CID reward caps and weighted host splits.

use caravel_types::constants::{
    AGGREGATOR_FEE_PCT, EPOCH_REWARD_BASE_SATS, EPOCH_REWARD_PCT, W_CLIENTS, W_DIVERSITY, W_UPTIME,
};
use caravel_types::Hex32;

/// How much one CID's pool may pay out in a single epoch:
/// `min(balance × 2%, 50 × (1 + ⌊log2(balance/50 + 1)⌋))`.
///
/// The percentage term governs small pools; the logarithmic term keeps
/// large "endowment" pools from draining in a handful of epochs.
pub fn cid_epoch_cap(balance_sats: u64) -> u64 {
    if balance_sats == 0 {
        return 0;
    }
    let pct_cap = ((balance_sats as u128 * (EPOCH_REWARD_PCT * 100.0) as u128) / 100) as u64;
    let log_arg = balance_sats / EPOCH_REWARD_BASE_SATS + 1;
    let log_cap = EPOCH_REWARD_BASE_SATS * (1 + log_arg.ilog2() as u64);
    pct_cap.min(log_cap)
}

/// Inputs to one host's reward weight.
#[derive(Debug, Clone, PartialEq)]
pub struct HostScoreInputs {
    pub host: Hex32,
    pub unique_clients: u64,
    /// Availability over the rolling window, in `[0, 1]`.
    pub uptime: f64,
    /// Reserved for geo/ASN weighting; currently always 1.0.
    pub diversity: f64,
}

/// Weighted host score.
pub fn host_score(inputs: &HostScoreInputs) -> f64 {
    W_CLIENTS * inputs.unique_clients as f64
        + W_UPTIME * inputs.uptime
        + W_DIVERSITY * inputs.diversity
}

/// One CID pool's epoch payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSplit {
    /// Per-host rewards, same order as the input.
    pub rewards: Vec<(Hex32, u64)>,
    pub aggregator_fee_sats: u64,
    pub cap_sats: u64,
}

impl RewardSplit {
    pub fn total_rewards(&self) -> u64 {
        self.rewards.iter().map(|(_, r)| r).sum()
    }

    /// What settlement debits the pool: rewards plus the protocol fee.
    pub fn total_drain(&self) -> u64 {
        self.total_rewards() + self.aggregator_fee_sats
    }
}

/// Splits one CID's epoch cap across its eligible hosts by score weight.
///
/// Rewards floor-divide, so `Σ rewards + fee ≤ cap ≤ balance` always
/// holds; the fee is retained by the protocol even when rounding leaves
/// sats unspent.
pub fn distribute_rewards(balance_sats: u64, hosts: &[HostScoreInputs]) -> RewardSplit {
    let cap = cid_epoch_cap(balance_sats);
    let scores: Vec<f64> = hosts.iter().map(host_score).collect();
    let total_score: f64 = scores.iter().sum();

    if cap == 0 || hosts.is_empty() || total_score <= 0.0 {
        return RewardSplit {
            rewards: hosts.iter().map(|h| (h.host, 0)).collect(),
            aggregator_fee_sats: 0,
            cap_sats: cap,
        };
    }

    let payable = cap as f64 * (1.0 - AGGREGATOR_FEE_PCT);
    let rewards = hosts
        .iter()
        .zip(&scores)
        .map(|(h, score)| (h.host, (payable * score / total_score).floor() as u64))
        .collect();

    RewardSplit {
        rewards,
        aggregator_fee_sats: (cap as f64 * AGGREGATOR_FEE_PCT).floor() as u64,
        cap_sats: cap,
    }
}

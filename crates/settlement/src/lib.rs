//! The epoch settlement pipeline.
//!
//! Pure pieces first: availability scoring, receipt aggregation, reward
//! distribution. They compose into an idempotent engine driven by a
//! once-per-epoch scheduler.

pub mod aggregate;
pub mod availability;
pub mod engine;
pub mod reward;
pub mod scheduler;

pub use aggregate::{aggregate_digests, EpochGroup};
pub use availability::{apply_status_transition, availability_score, recommended_status};
pub use engine::SettlementEngine;
pub use reward::{cid_epoch_cap, distribute_rewards, host_score, HostScoreInputs, RewardSplit};
pub use scheduler::{AvailabilitySweep, EpochScheduler};

//! Protocol constants, defined once and consumed by value everywhere.
//!
//! The "frozen" group is part of the wire format; changing any of them is a
//! hard fork. The "tunable" group may change at an epoch boundary via node
//! configuration, never mid-epoch.

// ---- Frozen ----

/// Default chunk size for the file chunker, in bytes.
pub const CHUNK_SIZE_DEFAULT: u32 = 262_144;
/// Upper bound on blocks per manifest.
pub const MAX_MANIFEST_BLOCKS: usize = 32_768;
/// Upper bound on variant renditions per asset.
pub const MAX_ASSET_VARIANTS: usize = 8;
/// Receipt schema version.
pub const RECEIPT_VERSION: u8 = 2;
/// Maximum canonical-encoded event body size, in bytes.
pub const EVENT_MAX_BODY: usize = 16_384;
/// Blocks at or below this size are served without payment.
pub const FREE_PREVIEW_MAX_BYTES: usize = 16_384;
/// Maximum items returned by any listing endpoint.
pub const MAX_LIST_ITEMS: usize = 1_000;

/// Domain-separation prefix for receipt proof-of-work challenges.
pub const RECEIPT_POW_PREFIX: &[u8] = b"RECEIPT_V2";
/// Domain-separation prefix for event proof-of-work challenges.
pub const EVENT_POW_PREFIX: &[u8] = b"EV1_POW";
/// Domain-separation prefix for the block-selection PRF.
pub const BLOCK_SELECT_PREFIX: &[u8] = b"BLOCK_SELECT";
/// Domain-separation prefix for mint receipt tokens.
pub const RECEIPT_TOKEN_PREFIX: &[u8] = b"R2";

// ---- Tunable (epoch-boundary only) ----

/// Epoch length: four hours.
pub const EPOCH_LENGTH_MS: u64 = 4 * 60 * 60 * 1000;
/// Minimum receipts for an epoch group to be reward-eligible.
pub const RECEIPT_MIN_COUNT: u64 = 5;
/// Minimum distinct paying clients for an epoch group to be reward-eligible.
pub const RECEIPT_MIN_UNIQUE_CLIENTS: u64 = 3;
/// Receipt PoW base target exponent: hashes must be below `2^240`.
pub const POW_TARGET_BASE_EXP: u32 = 240;
/// Event PoW target exponent, shared with the receipt base.
pub const EVENT_POW_TARGET_EXP: u32 = 240;
/// Percentage-of-balance component of the per-CID epoch reward cap.
pub const EPOCH_REWARD_PCT: f64 = 0.02;
/// Base sats for the logarithmic component of the reward cap.
pub const EPOCH_REWARD_BASE_SATS: u64 = 50;
/// Protocol fee retained from each CID's epoch payout.
pub const AGGREGATOR_FEE_PCT: f64 = 0.03;
/// Host score weight: distinct paying clients.
pub const W_CLIENTS: f64 = 0.5;
/// Host score weight: availability over the rolling window.
pub const W_UPTIME: f64 = 0.3;
/// Host score weight: diversity (reserved, currently constant 1.0 input).
pub const W_DIVERSITY: f64 = 0.2;
/// Rolling availability window, in epochs.
pub const AVAILABILITY_WINDOW_EPOCHS: u32 = 6;
/// Availability score at or above which a host is trusted.
pub const AVAILABILITY_TRUSTED_THRESHOLD: f64 = 0.6;
/// Consecutive zero-score epochs before a host is marked inactive.
pub const INACTIVE_ZERO_EPOCHS: u32 = 6;
/// Minimum pin contract budget.
pub const PIN_MIN_BUDGET_SATS: u64 = 210;
/// Maximum replication factor a pin contract may request.
pub const PIN_MAX_COPIES: u32 = 20;
/// Fee retained when a pin contract is cancelled early.
pub const PIN_CANCEL_FEE_PCT: f64 = 0.05;
/// Royalty deducted from FUND events before crediting a bounty pool.
pub const FUND_ROYALTY_PCT: f64 = 0.05;

/// Default invoice record time-to-live in the gateway cache.
pub const INVOICE_TTL_SECS: u64 = 600;
/// Default settlement scheduler tick interval.
pub const SCHEDULER_TICK_SECS: u64 = 60;
/// Host availability assumed when a host has no recorded spot checks.
pub const AVAILABILITY_DEFAULT_SCORE: f64 = 0.5;

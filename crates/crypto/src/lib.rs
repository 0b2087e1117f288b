//! Cryptographic implementations for the Caravel protocol.
//!
//! Hashing, Ed25519 signing over canonical payloads, the two proof-of-work
//! variants and the block-selection PRF. Everything here is synchronous and
//! deterministic except key generation and the mining helpers.

pub mod hash;
pub mod pow;
pub mod select;
pub mod sign;

pub use hash::{sha256, sha256_parts};
pub use pow::{
    base_target, event_challenge, event_target, meets_target, mine, mine_blocking, pow_hash,
    receipt_challenge, receipt_target, verify_event_pow,
};
pub use select::block_select_index;
pub use sign::{
    sign_event, sign_payload_b64, verify_event, verify_payload, verify_raw, Ed25519KeyPair,
};

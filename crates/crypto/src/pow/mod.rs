//! Proof-of-work: receipt and event variants.
//!
//! Targets exceed 64 bits, so comparisons go through `BigUint`; hashes are
//! interpreted as big-endian 256-bit integers and never round-trip through
//! floats. Mining is CPU-bound and must run on a blocking worker to keep
//! the scheduler responsive.

use crate::hash::{sha256, sha256_parts};
use caravel_types::constants::{EVENT_POW_PREFIX, EVENT_POW_TARGET_EXP, POW_TARGET_BASE_EXP, RECEIPT_POW_PREFIX};
use caravel_types::{EventError, EventV1, Hex32};
use num_bigint::BigUint;

/// The receipt base target, `2^240`. Roughly 200 ms of hashing on
/// commodity hardware.
pub fn base_target() -> BigUint {
    BigUint::from(1u8) << POW_TARGET_BASE_EXP
}

/// The event target, `2^240`.
pub fn event_target() -> BigUint {
    BigUint::from(1u8) << EVENT_POW_TARGET_EXP
}

/// Difficulty schedule for receipts: the target halves each time
/// `receipt_count + 1` crosses a power of two, throttling spammy hosts.
pub fn receipt_target(receipt_count: u64) -> BigUint {
    let shift = (receipt_count + 1).ilog2();
    base_target() >> shift
}

/// The receipt challenge binds every receipt field except the nonce.
#[allow(clippy::too_many_arguments)]
pub fn receipt_challenge(
    asset_root: Option<&Hex32>,
    file_root: &Hex32,
    block_cid: &Hex32,
    host_pubkey: &Hex32,
    payment_hash: &Hex32,
    response_hash: &Hex32,
    epoch: u32,
    client_pubkey: &Hex32,
) -> [u8; 32] {
    let epoch_be = epoch.to_be_bytes();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(9);
    parts.push(RECEIPT_POW_PREFIX);
    if let Some(root) = asset_root {
        parts.push(root.as_bytes());
    }
    parts.push(file_root.as_bytes());
    parts.push(block_cid.as_bytes());
    parts.push(host_pubkey.as_bytes());
    parts.push(payment_hash.as_bytes());
    parts.push(response_hash.as_bytes());
    parts.push(&epoch_be);
    parts.push(client_pubkey.as_bytes());
    sha256_parts(&parts)
}

/// The event challenge: body enters as its own digest so the challenge
/// stays fixed-width.
pub fn event_challenge(
    from: &Hex32,
    ts: u64,
    kind: u8,
    r#ref: &Hex32,
    body_bytes: &[u8],
) -> [u8; 32] {
    let body_hash = sha256(body_bytes);
    sha256_parts(&[
        EVENT_POW_PREFIX,
        from.as_bytes(),
        &ts.to_be_bytes(),
        &[kind],
        r#ref.as_bytes(),
        &body_hash,
    ])
}

/// `SHA256(challenge ‖ nonce_be64)`.
pub fn pow_hash(challenge: &[u8; 32], nonce: u64) -> [u8; 32] {
    sha256_parts(&[challenge, &nonce.to_be_bytes()])
}

/// Whether a hash clears a target.
pub fn meets_target(hash: &[u8; 32], target: &BigUint) -> bool {
    BigUint::from_bytes_be(hash) < *target
}

/// Mines a nonce clearing the target. Synchronous and CPU-bound; call
/// through `mine_blocking` from async contexts.
pub fn mine(challenge: &[u8; 32], target: &BigUint) -> (u64, [u8; 32]) {
    let mut nonce = 0u64;
    loop {
        let hash = pow_hash(challenge, nonce);
        if meets_target(&hash, target) {
            return (nonce, hash);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Mines on the blocking worker pool.
pub async fn mine_blocking(
    challenge: [u8; 32],
    target: BigUint,
) -> Result<(u64, [u8; 32]), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || mine(&challenge, &target)).await
}

/// Full event PoW verification: paid events pass through, free events must
/// carry a nonce that reproduces the claimed hash and clears the target.
pub fn verify_event_pow(event: &EventV1) -> Result<(), EventError> {
    if !event.requires_pow() {
        return Ok(());
    }
    let (Some(nonce), Some(claimed)) = (event.nonce, event.pow_hash) else {
        return Err(EventError::PowMissing);
    };
    let body = event.body_bytes()?;
    let challenge = event_challenge(
        &event.from,
        event.ts,
        event.kind.as_u8(),
        &event.r#ref,
        &body,
    );
    let computed = pow_hash(&challenge, nonce);
    if computed != *claimed.as_bytes() {
        return Err(EventError::PowHashMismatch);
    }
    if !meets_target(&computed, &event_target()) {
        return Err(EventError::PowInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_schedule_is_monotone_and_halves_at_powers_of_two() {
        let base = base_target();
        assert_eq!(receipt_target(0), base);
        let mut last = receipt_target(0);
        for n in 1..200u64 {
            let t = receipt_target(n);
            assert!(t <= last, "target must be non-increasing at n={n}");
            last = t;
        }
        // Doubling points: n+1 hits a power of two.
        assert_eq!(receipt_target(1), base.clone() >> 1u32);
        assert_eq!(receipt_target(2), base.clone() >> 1u32);
        assert_eq!(receipt_target(3), base.clone() >> 2u32);
        assert_eq!(receipt_target(7), base.clone() >> 3u32);
        assert_eq!(receipt_target(8), base >> 3u32);
    }

    #[test]
    fn meets_target_is_a_strict_comparison() {
        // 2^240 itself must fail the base target.
        let mut at_target = [0u8; 32];
        at_target[1] = 0x01; // big-endian 2^240
        assert!(!meets_target(&at_target, &base_target()));

        let mut below = [0u8; 32];
        below[2] = 0xff;
        assert!(meets_target(&below, &base_target()));
    }

    #[test]
    fn mine_finds_a_valid_nonce_for_an_easy_target() {
        let challenge = sha256(b"challenge");
        let target = BigUint::from(1u8) << 252; // trivial difficulty
        let (nonce, hash) = mine(&challenge, &target);
        assert_eq!(pow_hash(&challenge, nonce), hash);
        assert!(meets_target(&hash, &target));
    }

    #[test]
    fn challenge_includes_optional_asset_root() {
        let a = Hex32::from_bytes([1; 32]);
        let f = Hex32::from_bytes([2; 32]);
        let with = receipt_challenge(Some(&a), &f, &f, &f, &f, &f, 3, &f);
        let without = receipt_challenge(None, &f, &f, &f, &f, &f, 3, &f);
        assert_ne!(with, without);
    }

    #[test]
    fn event_challenge_hashes_the_body() {
        let from = Hex32::from_bytes([3; 32]);
        let a = event_challenge(&from, 1, 2, &Hex32::ZERO, b"x");
        let b = event_challenge(&from, 1, 2, &Hex32::ZERO, b"y");
        assert_ne!(a, b);
    }
}

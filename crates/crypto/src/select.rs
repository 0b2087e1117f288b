//! The block-selection PRF.
//!
//! Neither clients nor hosts choose which block a paid fetch or spot check
//! targets: the index is derived from the epoch, the file and the client
//! key, so a host must hold every block of a file it claims to serve.

use crate::hash::sha256_parts;
use caravel_types::constants::BLOCK_SELECT_PREFIX;
use caravel_types::Hex32;

/// Deterministic block index for `(epoch, file_root, client)`.
///
/// The first 6 bytes of `SHA256("BLOCK_SELECT" ‖ epoch_be32 ‖ file_root ‖
/// client_pubkey)` read as a big-endian u48, reduced mod `num_blocks`.
/// Zero-block inputs return 0.
pub fn block_select_index(
    epoch: u32,
    file_root: &Hex32,
    client_pubkey: &Hex32,
    num_blocks: usize,
) -> usize {
    if num_blocks == 0 {
        return 0;
    }
    let digest = sha256_parts(&[
        BLOCK_SELECT_PREFIX,
        &epoch.to_be_bytes(),
        file_root.as_bytes(),
        client_pubkey.as_bytes(),
    ]);
    let mut raw = [0u8; 8];
    raw[2..8].copy_from_slice(&digest[0..6]);
    (u64::from_be_bytes(raw) % num_blocks as u64) as usize
}

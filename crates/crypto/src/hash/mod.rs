//! SHA-256 helpers.

pub use caravel_types::sha256;
use sha2::{Digest, Sha256};

/// Digest of several parts fed in order, without intermediate allocation.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_digest_equals_concat_digest() {
        let whole = sha256(b"abcdef");
        let parts = sha256_parts(&[b"ab", b"cd", b"ef"]);
        assert_eq!(whole, parts);
    }
}

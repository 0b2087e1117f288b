//! Binary Merkle root over an ordered list of CIDs.
//!
//! Leaves are the 32-byte decoded CIDs; interior nodes are `SHA256(L ‖ R)`.
//! A single unpaired node at any level is promoted to the next level
//! unchanged (not duplicated), and a single-leaf input is its own root.

use caravel_crypto::sha256_parts;
use caravel_types::{ContentError, Hex32};
use serde::{Deserialize, Serialize};

/// Which side a sibling hash joins from during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: the sibling and the side it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Hex32,
    pub side: Side,
}

/// An inclusion proof, ordered leaf-to-root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub steps: Vec<ProofStep>,
}

fn parent(left: &Hex32, right: &Hex32) -> Hex32 {
    Hex32::from_bytes(sha256_parts(&[left.as_bytes(), right.as_bytes()]))
}

/// The Merkle root of an ordered, non-empty leaf list.
pub fn merkle_root(leaves: &[Hex32]) -> Result<Hex32, ContentError> {
    if leaves.is_empty() {
        return Err(ContentError::EmptyManifest);
    }
    let mut level: Vec<Hex32> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [l, r] => next.push(parent(l, r)),
                // Odd node: promoted, not duplicated.
                [single] => next.push(*single),
                _ => unreachable!("chunks(2) yields 1- or 2-element slices"),
            }
        }
        level = next;
    }
    Ok(level[0])
}

/// Builds the inclusion proof for `index` into `leaves`.
pub fn merkle_proof(leaves: &[Hex32], index: usize) -> Result<MerkleProof, ContentError> {
    if leaves.is_empty() {
        return Err(ContentError::EmptyManifest);
    }
    if index >= leaves.len() {
        return Err(ContentError::IndexOutOfRange(index));
    }
    let mut steps = Vec::new();
    let mut level: Vec<Hex32> = leaves.to_vec();
    let mut pos = index;
    while level.len() > 1 {
        let sibling = if pos % 2 == 0 { pos + 1 } else { pos - 1 };
        if sibling < level.len() {
            steps.push(ProofStep {
                hash: level[sibling],
                side: if sibling < pos { Side::Left } else { Side::Right },
            });
        }
        // When the sibling is past the end the node is promoted and no step
        // is recorded at this level.
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [l, r] => next.push(parent(l, r)),
                [single] => next.push(*single),
                _ => unreachable!("chunks(2) yields 1- or 2-element slices"),
            }
        }
        level = next;
        pos /= 2;
    }
    Ok(MerkleProof { steps })
}

/// Walks a proof from the leaf up and compares against the claimed root.
pub fn verify_proof(leaf: &Hex32, proof: &MerkleProof, root: &Hex32) -> bool {
    let mut acc = *leaf;
    for step in &proof.steps {
        acc = match step.side {
            Side::Left => parent(&step.hash, &acc),
            Side::Right => parent(&acc, &step.hash),
        };
    }
    acc == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_types::cid_from_bytes;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<Hex32> {
        (0..n)
            .map(|i| cid_from_bytes(format!("leaf-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l).unwrap(), l[0]);
    }

    #[test]
    fn two_leaves_hash_pairwise() {
        let l = leaves(2);
        let expected = Hex32::from_bytes(sha256_parts(&[l[0].as_bytes(), l[1].as_bytes()]));
        assert_eq!(merkle_root(&l).unwrap(), expected);
    }

    #[test]
    fn odd_leaf_is_promoted_not_duplicated() {
        let l = leaves(3);
        let left = parent(&l[0], &l[1]);
        // If the odd leaf were duplicated the right node would be
        // parent(l[2], l[2]) instead of l[2] itself.
        let expected = parent(&left, &l[2]);
        assert_eq!(merkle_root(&l).unwrap(), expected);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(merkle_root(&[]).is_err());
    }

    #[test]
    fn root_depends_on_leaf_order() {
        let l = leaves(4);
        let mut swapped = l.clone();
        swapped.swap(1, 2);
        assert_ne!(merkle_root(&l).unwrap(), merkle_root(&swapped).unwrap());
    }

    proptest! {
        #[test]
        fn proofs_verify_for_every_index(n in 1usize..24) {
            let l = leaves(n);
            let root = merkle_root(&l).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let proof = merkle_proof(&l, i).unwrap();
                prop_assert!(verify_proof(leaf, &proof, &root));
            }
        }

        #[test]
        fn proofs_fail_for_the_wrong_leaf(n in 2usize..24) {
            let l = leaves(n);
            let root = merkle_root(&l).unwrap();
            let proof = merkle_proof(&l, 0).unwrap();
            prop_assert!(!verify_proof(&l[1], &proof, &root));
        }
    }
}

//! File chunking, Merkle commitments and verified reassembly.

pub mod chunker;
pub mod merkle;

pub use chunker::{chunk_bytes, reassemble, ChunkedFile};
pub use merkle::{merkle_proof, merkle_root, verify_proof, MerkleProof, ProofStep, Side};

//! Fixed-size chunking and verified reassembly.

use crate::merkle::merkle_root;
use caravel_types::constants::MAX_MANIFEST_BLOCKS;
use caravel_types::{cid_from_bytes, verify_cid, ContentError, FileManifest, Hex32};
use std::collections::HashMap;

/// The output of chunking one file: the blocks, their manifest and its root.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    /// Ordered `(cid, bytes)` pairs.
    pub blocks: Vec<(Hex32, Vec<u8>)>,
    pub manifest: FileManifest,
    pub file_root: Hex32,
}

/// Splits file bytes into fixed-size blocks and assembles the manifest.
///
/// An empty file yields a single empty block so that every file, including
/// the degenerate one, has a fetchable unit and a well-defined root.
pub fn chunk_bytes(
    bytes: &[u8],
    mime: Option<String>,
    chunk_size: u32,
) -> Result<ChunkedFile, ContentError> {
    if chunk_size == 0 {
        return Err(ContentError::ChunkSizeZero);
    }

    let blocks: Vec<(Hex32, Vec<u8>)> = if bytes.is_empty() {
        vec![(cid_from_bytes(b""), Vec::new())]
    } else {
        bytes
            .chunks(chunk_size as usize)
            .map(|chunk| (cid_from_bytes(chunk), chunk.to_vec()))
            .collect()
    };

    if blocks.len() > MAX_MANIFEST_BLOCKS {
        return Err(ContentError::TooManyBlocks(blocks.len()));
    }

    let cids: Vec<Hex32> = blocks.iter().map(|(cid, _)| *cid).collect();
    let manifest = FileManifest {
        version: 1,
        chunk_size,
        size: bytes.len() as u64,
        merkle_root: merkle_root(&cids)?,
        blocks: cids,
        mime,
    };
    let file_root = manifest.file_root()?;

    Ok(ChunkedFile {
        blocks,
        manifest,
        file_root,
    })
}

/// Reconstructs the original file from a manifest and a CID-keyed block
/// map, verifying every block against its CID and the total size against
/// the manifest.
pub fn reassemble(
    manifest: &FileManifest,
    block_map: &HashMap<Hex32, Vec<u8>>,
) -> Result<Vec<u8>, ContentError> {
    manifest.validate()?;

    let mut out = Vec::with_capacity(manifest.size as usize);
    for cid in &manifest.blocks {
        let bytes = block_map
            .get(cid)
            .ok_or(ContentError::MissingBlock(*cid))?;
        if !verify_cid(cid, bytes) {
            return Err(ContentError::CidMismatch { expected: *cid });
        }
        out.extend_from_slice(bytes);
    }

    if out.len() as u64 != manifest.size {
        return Err(ContentError::SizeMismatch {
            expected: manifest.size,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

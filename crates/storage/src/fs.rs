//! Filesystem block and metadata stores.
//!
//! Blocks land at `<root>/<cid[0..2]>/<cid[2..4]>/<cid>`; manifests and
//! assets under `<root>/_meta/`. All writes go through a temp file plus
//! rename, so a concurrent reader sees either the whole entry or nothing.

use async_trait::async_trait;
use caravel_api::{BlockStore, MetadataStore};
use caravel_types::{AssetRoot, FileManifest, Hex32, StorageError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn io_err(e: std::io::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Atomically writes `bytes` at `path` via a sibling temp file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Backend("path has no parent".into()))?;
    fs::create_dir_all(parent).map_err(io_err)?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

/// Content-addressed block storage on disk.
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn block_path(&self, cid: &Hex32) -> PathBuf {
        let hex = cid.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    async fn put(&self, cid: &Hex32, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.block_path(cid);
        if path.exists() {
            return Err(StorageError::Conflict);
        }
        write_atomic(&path, bytes)
    }

    async fn get(&self, cid: &Hex32) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.block_path(cid)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn contains(&self, cid: &Hex32) -> Result<bool, StorageError> {
        Ok(self.block_path(cid).exists())
    }
}

/// Manifest and asset JSON storage on disk.
pub struct FsMetadataStore {
    root: PathBuf,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self, root: &Hex32) -> PathBuf {
        self.root
            .join("_meta")
            .join("manifests")
            .join(format!("{}.json", root.to_hex()))
    }

    fn asset_path(&self, root: &Hex32) -> PathBuf {
        self.root
            .join("_meta")
            .join("assets")
            .join(format!("{}.json", root.to_hex()))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Decode(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(e)),
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn put_manifest(
        &self,
        root: &Hex32,
        manifest: &FileManifest,
    ) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec_pretty(manifest).map_err(|e| StorageError::Decode(e.to_string()))?;
        write_atomic(&self.manifest_path(root), &bytes)
    }

    async fn get_manifest(&self, root: &Hex32) -> Result<Option<FileManifest>, StorageError> {
        read_json(&self.manifest_path(root))
    }

    async fn put_asset(&self, root: &Hex32, asset: &AssetRoot) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec_pretty(asset).map_err(|e| StorageError::Decode(e.to_string()))?;
        write_atomic(&self.asset_path(root), &bytes)
    }

    async fn get_asset(&self, root: &Hex32) -> Result<Option<AssetRoot>, StorageError> {
        read_json(&self.asset_path(root))
    }
}

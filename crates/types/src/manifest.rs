//! File manifests and asset roots: the content-addressed metadata layer.
//!
//! A `FileManifest` describes one chunked file; an `AssetRoot` bundles the
//! original file with derived renditions and is the unit payments and
//! bounties attach to. Both hash through the canonical codec, so field
//! layout here is consensus-critical.

use crate::cid::{cid_from_value, Hex32};
use crate::codec::Value;
use crate::constants::{MAX_ASSET_VARIANTS, MAX_MANIFEST_BLOCKS};
use crate::error::{CodecError, ContentError};
use serde::{Deserialize, Serialize};

/// Ordered block list plus integrity metadata for one file. Version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub version: u8,
    pub chunk_size: u32,
    /// Total file size in bytes.
    pub size: u64,
    /// Ordered block CIDs; length 1..=`MAX_MANIFEST_BLOCKS`.
    pub blocks: Vec<Hex32>,
    /// Binary Merkle root over `blocks`.
    pub merkle_root: Hex32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl FileManifest {
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.blocks.is_empty() {
            return Err(ContentError::EmptyManifest);
        }
        if self.blocks.len() > MAX_MANIFEST_BLOCKS {
            return Err(ContentError::TooManyBlocks(self.blocks.len()));
        }
        if self.chunk_size == 0 {
            return Err(ContentError::ChunkSizeZero);
        }
        Ok(())
    }

    pub fn canonical_value(&self) -> Value {
        let mut entries = vec![
            ("version", Value::from(self.version)),
            ("chunk_size", Value::from(self.chunk_size)),
            ("size", Value::from(self.size)),
            (
                "blocks",
                Value::Array(self.blocks.iter().map(|b| Value::from(*b)).collect()),
            ),
            ("merkle_root", Value::from(self.merkle_root)),
        ];
        if let Some(mime) = &self.mime {
            entries.push(("mime", Value::text(mime.clone())));
        }
        Value::map(entries)
    }

    /// `file_root`: content ID of the canonical manifest.
    pub fn file_root(&self) -> Result<Hex32, CodecError> {
        cid_from_value(&self.canonical_value())
    }
}

/// The broad media category of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetKind {
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl AssetKind {
    fn canonical_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::Audio => "AUDIO",
            Self::Video => "VIDEO",
            Self::File => "FILE",
        }
    }
}

/// Reference to one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_root: Hex32,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl FileRef {
    fn canonical_value(&self) -> Value {
        let mut entries = vec![
            ("file_root", Value::from(self.file_root)),
            ("size", Value::from(self.size)),
        ];
        if let Some(mime) = &self.mime {
            entries.push(("mime", Value::text(mime.clone())));
        }
        Value::map(entries)
    }
}

/// A derived rendition of the original file (e.g. a transcode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRef {
    /// Rendition label, e.g. "720p" or "waveform".
    pub label: String,
    pub file_root: Hex32,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl VariantRef {
    fn canonical_value(&self) -> Value {
        let mut entries = vec![
            ("label", Value::text(self.label.clone())),
            ("file_root", Value::from(self.file_root)),
            ("size", Value::from(self.size)),
        ];
        if let Some(mime) = &self.mime {
            entries.push(("mime", Value::text(mime.clone())));
        }
        Value::map(entries)
    }
}

/// Integrity metadata carried alongside an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    /// Digest of the original, un-chunked file bytes.
    pub sha256_original: Hex32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

impl AssetMeta {
    fn canonical_value(&self) -> Value {
        let mut entries = vec![("sha256_original", Value::from(self.sha256_original))];
        if let Some(w) = self.width {
            entries.push(("width", Value::from(w)));
        }
        if let Some(h) = self.height {
            entries.push(("height", Value::from(h)));
        }
        if let Some(d) = self.duration_ms {
            entries.push(("duration_ms", Value::from(d)));
        }
        if let Some(n) = &self.original_name {
            entries.push(("original_name", Value::text(n.clone())));
        }
        Value::map(entries)
    }
}

/// The economic attachment point: original file plus renditions. Version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRoot {
    pub version: u8,
    pub kind: AssetKind,
    pub original: FileRef,
    #[serde(default)]
    pub variants: Vec<VariantRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbs: Option<Vec<FileRef>>,
    pub meta: AssetMeta,
}

impl AssetRoot {
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.variants.len() > MAX_ASSET_VARIANTS {
            return Err(ContentError::TooManyBlocks(self.variants.len()));
        }
        Ok(())
    }

    pub fn canonical_value(&self) -> Value {
        let mut entries = vec![
            ("version", Value::from(self.version)),
            ("kind", Value::text(self.kind.canonical_str())),
            ("original", self.original.canonical_value()),
            (
                "variants",
                Value::Array(self.variants.iter().map(|v| v.canonical_value()).collect()),
            ),
            ("meta", self.meta.canonical_value()),
        ];
        if let Some(poster) = &self.poster {
            entries.push(("poster", poster.canonical_value()));
        }
        if let Some(thumbs) = &self.thumbs {
            entries.push((
                "thumbs",
                Value::Array(thumbs.iter().map(|t| t.canonical_value()).collect()),
            ));
        }
        Value::map(entries)
    }

    /// `asset_root`: content ID of the canonical asset.
    pub fn asset_root(&self) -> Result<Hex32, CodecError> {
        cid_from_value(&self.canonical_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::cid_from_bytes;

    fn manifest() -> FileManifest {
        FileManifest {
            version: 1,
            chunk_size: 262_144,
            size: 5,
            blocks: vec![cid_from_bytes(b"hello")],
            merkle_root: cid_from_bytes(b"hello"),
            mime: Some("text/plain".into()),
        }
    }

    #[test]
    fn file_root_is_stable_across_clones() {
        let m = manifest();
        assert_eq!(m.file_root().unwrap(), m.clone().file_root().unwrap());
    }

    #[test]
    fn mime_presence_changes_the_root() {
        let with = manifest();
        let mut without = manifest();
        without.mime = None;
        assert_ne!(with.file_root().unwrap(), without.file_root().unwrap());
    }

    #[test]
    fn manifest_validation_bounds_blocks() {
        let mut m = manifest();
        m.blocks.clear();
        assert!(matches!(m.validate(), Err(ContentError::EmptyManifest)));
    }

    #[test]
    fn asset_root_covers_variants() {
        let base = AssetRoot {
            version: 1,
            kind: AssetKind::Image,
            original: FileRef {
                file_root: cid_from_bytes(b"orig"),
                size: 100,
                mime: Some("image/png".into()),
            },
            variants: vec![],
            poster: None,
            thumbs: None,
            meta: AssetMeta {
                sha256_original: cid_from_bytes(b"raw"),
                width: Some(640),
                height: Some(480),
                duration_ms: None,
                original_name: None,
            },
        };
        let mut with_variant = base.clone();
        with_variant.variants.push(VariantRef {
            label: "thumb".into(),
            file_root: cid_from_bytes(b"thumb"),
            size: 10,
            mime: None,
        });
        assert_ne!(
            base.asset_root().unwrap(),
            with_variant.asset_root().unwrap()
        );
    }

    #[test]
    fn manifest_serde_roundtrip() {
        let m = manifest();
        let json = serde_json::to_string(&m).unwrap();
        let back: FileManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.file_root().unwrap(), m.file_root().unwrap());
    }
}

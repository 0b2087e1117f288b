//! Core error types for the Caravel protocol.
//!
//! Every boundary-visible failure carries a stable machine tag (`ErrorTag`),
//! and internal layers surface the same tags so a failure reason is never
//! rewritten on its way out.

use crate::cid::Hex32;
use std::borrow::Cow;
use thiserror::Error;

/// A trait for assigning a stable, machine-readable tag to an error.
///
/// Tags are part of the external contract: HTTP surfaces serialize them
/// verbatim and clients branch on them.
pub trait ErrorTag {
    /// Returns the stable tag for this error variant.
    fn tag(&self) -> Cow<'static, str>;
}

/// Failures of the canonical codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Floating-point values are outside the canonical domain.
    #[error("floating-point values are not canonical")]
    FloatRejected,
    /// An indefinite-length item was encountered.
    #[error("indefinite-length items are not canonical")]
    IndefiniteLength,
    /// An integer or length argument used a longer head than required.
    #[error("non-minimal length encoding")]
    NonMinimalLength,
    /// A map key was out of order or duplicated.
    #[error("map key {0:?} out of canonical order")]
    UnsortedKey(String),
    /// A map key was not a text string.
    #[error("map keys must be text strings")]
    NonTextKey,
    /// A text string was not valid UTF-8.
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    /// CBOR tags are outside the canonical domain.
    #[error("tagged values are not canonical")]
    TagRejected,
    /// The input ended mid-value.
    #[error("unexpected end of input")]
    Truncated,
    /// Bytes remained after the top-level value.
    #[error("{0} trailing byte(s) after value")]
    TrailingBytes(usize),
    /// A reserved or malformed head byte.
    #[error("reserved head byte {0:#04x}")]
    ReservedHead(u8),
    /// Integer outside the CBOR range `[-2^64, 2^64-1]`.
    #[error("integer {0} outside the encodable range")]
    IntOutOfRange(i128),
    /// A hex wrapper string failed to decode.
    #[error("invalid hex input")]
    InvalidHex,
}

impl ErrorTag for CodecError {
    fn tag(&self) -> Cow<'static, str> {
        Cow::Borrowed("invalid_encoding")
    }
}

/// Failures parsing a `Hex32` identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidError {
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),
    #[error("expected lowercase hex characters")]
    InvalidCharacter,
}

impl ErrorTag for CidError {
    fn tag(&self) -> Cow<'static, str> {
        Cow::Borrowed("invalid_cid")
    }
}

/// Failures of the chunker, Merkle builder and reassembly.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A block named by the manifest was absent from the supplied map.
    #[error("missing block {0}")]
    MissingBlock(Hex32),
    /// Candidate bytes did not hash to the expected block CID.
    #[error("block bytes do not match cid {expected}")]
    CidMismatch {
        /// The CID the manifest expects.
        expected: Hex32,
    },
    /// Reassembled output length disagreed with the manifest.
    #[error("reassembled size {actual} does not match manifest size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    /// The manifest names more blocks than the protocol allows.
    #[error("manifest has {0} blocks, above the maximum")]
    TooManyBlocks(usize),
    /// A manifest must name at least one block.
    #[error("manifest has no blocks")]
    EmptyManifest,
    /// Chunk size must be non-zero.
    #[error("chunk size must be non-zero")]
    ChunkSizeZero,
    /// A proof or block index outside the manifest.
    #[error("index {0} out of range")]
    IndexOutOfRange(usize),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorTag for ContentError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::MissingBlock(_) => Cow::Borrowed("missing_block"),
            Self::CidMismatch { .. } => Cow::Borrowed("cid_mismatch"),
            Self::SizeMismatch { .. } => Cow::Borrowed("size_mismatch"),
            Self::TooManyBlocks(_) => Cow::Borrowed("invalid_blocks"),
            Self::EmptyManifest => Cow::Borrowed("invalid_blocks"),
            Self::ChunkSizeZero => Cow::Borrowed("invalid_chunk_size"),
            Self::IndexOutOfRange(_) => Cow::Borrowed("invalid_index"),
            Self::Codec(e) => e.tag(),
        }
    }
}

/// Failures validating or verifying an event envelope.
#[derive(Debug, Error)]
pub enum EventError {
    /// Canonical body exceeds `EVENT_MAX_BODY`.
    #[error("event body is {0} bytes, above the maximum")]
    BodyTooLarge(usize),
    /// An operation required a body and none was supplied.
    #[error("event body required")]
    BodyRequired,
    /// A field failed shape validation.
    #[error("invalid event field: {0}")]
    InvalidField(&'static str),
    /// The envelope signature did not verify against `from`.
    #[error("event signature invalid")]
    SignatureInvalid,
    /// A free event arrived without its proof-of-work.
    #[error("free events must carry proof-of-work")]
    PowMissing,
    /// The supplied nonce does not reproduce the claimed hash.
    #[error("event pow hash mismatch")]
    PowHashMismatch,
    /// The proof-of-work hash does not meet the event target.
    #[error("event pow below target")]
    PowInvalid,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorTag for EventError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::BodyTooLarge(_) => Cow::Borrowed("body_too_large"),
            Self::BodyRequired => Cow::Borrowed("body_required"),
            Self::InvalidField(f) => Cow::Owned(format!("invalid_{f}")),
            Self::SignatureInvalid => Cow::Borrowed("signature_invalid"),
            Self::PowMissing => Cow::Borrowed("pow_required"),
            Self::PowHashMismatch => Cow::Borrowed("pow_hash_mismatch"),
            Self::PowInvalid => Cow::Borrowed("pow_invalid"),
            Self::Codec(e) => e.tag(),
        }
    }
}

/// Receipt verification failures, one variant per check in the verifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiptError {
    /// A `Hex32` field failed the shape check.
    #[error("invalid receipt field: {0}")]
    InvalidField(&'static str),
    /// Recomputed challenge hash disagrees with the claimed `pow_hash`.
    #[error("pow hash mismatch")]
    PowHashMismatch,
    /// The pow hash does not meet the base target.
    #[error("pow hash does not meet target")]
    PowInvalid,
    /// The receipt token was not valid base64.
    #[error("receipt token is not valid base64")]
    TokenDecodeFailed,
    /// The receipt token decoded to the wrong length.
    #[error("receipt token is {0} bytes, expected 64")]
    TokenInvalidLength(usize),
    /// No trusted mint key verified the token.
    #[error("receipt token not signed by a trusted mint")]
    TokenInvalid,
    /// The client signature over the receipt did not verify.
    #[error("client signature invalid")]
    ClientSigInvalid,
}

impl ErrorTag for ReceiptError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidField(f) => Cow::Owned(format!("invalid_{f}")),
            Self::PowHashMismatch => Cow::Borrowed("pow_hash_mismatch"),
            Self::PowInvalid => Cow::Borrowed("pow_invalid"),
            Self::TokenDecodeFailed => Cow::Borrowed("token_decode_failed"),
            Self::TokenInvalidLength(_) => Cow::Borrowed("token_invalid_length"),
            Self::TokenInvalid => Cow::Borrowed("token_invalid"),
            Self::ClientSigInvalid => Cow::Borrowed("client_sig_invalid"),
        }
    }
}

/// Failures of the receipt mint.
#[derive(Debug, Error)]
pub enum MintError {
    /// A request field failed validation.
    #[error("invalid mint request field: {0}")]
    InvalidField(&'static str),
    /// The invoice exists but has not settled.
    #[error("invoice not settled")]
    NotSettled,
    /// The invoice settled for less than the quoted price.
    #[error("invoice paid {paid} sats, {required} required")]
    Underpaid { required: u64, paid: u64 },
    /// The invoice port could not be reached. Transient.
    #[error("invoice backend unavailable: {0}")]
    LndUnavailable(String),
    /// The mint has no signing key loaded.
    #[error("mint signing key not loaded")]
    NoKey,
}

impl ErrorTag for MintError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidField(_) => Cow::Borrowed("invalid_field"),
            Self::NotSettled => Cow::Borrowed("not_settled"),
            Self::Underpaid { .. } => Cow::Borrowed("underpaid"),
            Self::LndUnavailable(_) => Cow::Borrowed("lnd_unavailable"),
            Self::NoKey => Cow::Borrowed("no_key"),
        }
    }
}

/// Failures of the gateway's paid-fetch flow.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The presented preimage does not hash to the payment hash.
    #[error("preimage does not match payment hash")]
    InvalidPreimage,
    /// No invoice record exists for the payment hash.
    #[error("unknown payment hash")]
    UnknownPayment,
    /// The invoice was issued for a different CID.
    #[error("payment was issued for a different cid")]
    CidMismatch,
    /// The invoice port could not be reached. Transient.
    #[error("invoice backend unavailable: {0}")]
    LndUnavailable(String),
    /// The mint could not be reached. Transient.
    #[error("mint unavailable: {0}")]
    MintUnavailable(String),
}

impl ErrorTag for PaymentError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidPreimage => Cow::Borrowed("invalid_preimage"),
            Self::UnknownPayment => Cow::Borrowed("unknown_payment"),
            Self::CidMismatch => Cow::Borrowed("cid_mismatch"),
            Self::LndUnavailable(_) => Cow::Borrowed("lnd_unavailable"),
            Self::MintUnavailable(_) => Cow::Borrowed("mint_unavailable"),
        }
    }
}

/// Failures of the storage ports.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// The entity already exists and the operation does not overwrite.
    #[error("already exists")]
    Conflict,
    /// An error in the storage backend.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A stored row failed to decode.
    #[error("storage decode error: {0}")]
    Decode(String),
}

impl ErrorTag for StorageError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::NotFound => Cow::Borrowed("not_found"),
            Self::Conflict => Cow::Borrowed("conflict"),
            Self::Backend(_) => Cow::Borrowed("storage_error"),
            Self::Decode(_) => Cow::Borrowed("storage_error"),
        }
    }
}

/// Failures of the epoch settlement pipeline.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The epoch clock has not been installed.
    #[error("epoch clock not initialised")]
    ClockUnset,
    /// Signing or encoding the epoch summary event failed.
    #[error("summary event error: {0}")]
    SummaryEvent(String),
}

impl ErrorTag for SettlementError {
    fn tag(&self) -> Cow<'static, str> {
        match self {
            Self::Storage(e) => e.tag(),
            Self::ClockUnset => Cow::Borrowed("clock_unset"),
            Self::SummaryEvent(_) => Cow::Borrowed("summary_event_failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(ReceiptError::PowHashMismatch.tag(), "pow_hash_mismatch");
        assert_eq!(ReceiptError::InvalidField("block_cid").tag(), "invalid_block_cid");
        assert_eq!(
            MintError::Underpaid { required: 10, paid: 5 }.tag(),
            "underpaid"
        );
        assert_eq!(StorageError::NotFound.tag(), "not_found");
        assert_eq!(EventError::BodyTooLarge(20000).tag(), "body_too_large");
    }
}

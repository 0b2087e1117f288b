//! Core data structures and error types for the Caravel protocol.
//!
//! This crate is the stable leaf of the workspace: every other crate depends
//! on it and it depends on nothing internal. The canonical codec lives here
//! so all components hash the exact same bytes for the same value.

pub mod bounty;
pub mod cid;
pub mod codec;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod event;
pub mod host;
pub mod manifest;
pub mod pin;
pub mod receipt;

pub use bounty::BountyPool;
pub use cid::{cid_from_bytes, cid_from_value, sha256, verify_cid, Hex32};
pub use codec::Value;
pub use epoch::{EpochClock, EpochSummary, SettlementReport};
pub use error::{
    CidError, CodecError, ContentError, ErrorTag, EventError, MintError, PaymentError,
    ReceiptError, SettlementError, StorageError,
};
pub use event::{encode_event_body, EventKind, EventV1};
pub use host::{HostPricing, HostRecord, HostStatus};
pub use manifest::{AssetKind, AssetMeta, AssetRoot, FileManifest, FileRef, VariantRef};
pub use pin::{PinContract, PinStatus};
pub use receipt::{ReceiptDigest, ReceiptV2};

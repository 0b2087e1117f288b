//! Core traits and interfaces for Caravel components.
//!
//! This crate defines the stable contract between the engine crates and
//! their collaborators. Every port here has at least one production
//! implementation and one test double elsewhere in the workspace, so the
//! settlement engine, verifier and HTTP edges can be exercised without
//! Lightning, a filesystem or a database.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

/// Lightning invoice port: create and look up invoices.
pub mod invoice;
/// Client interface to the receipt mint.
pub mod mint;
/// Availability spot-check transport.
pub mod probe;
/// Storage ports: blocks, metadata and coordinator state.
pub mod storage;

pub use invoice::{CreatedInvoice, InvoiceError, InvoicePort, InvoiceRequest, InvoiceState, InvoiceStatus};
pub use mint::{MintClient, MintClientError, SignReceiptRequest, SignedReceiptToken};
pub use probe::{ProbeError, SpotCheckProbe};
pub use storage::{BlockStore, CoordinatorStore, MetadataStore, SpotCheck};

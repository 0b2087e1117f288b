#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! Storage implementations behind the `caravel-api` ports.
//!
//! Blocks live on the filesystem under sharded directories with
//! write-then-rename, so readers never observe a partial block. Coordinator
//! state lives in a single redb database with prefix-encoded big-endian
//! keys. Every port also has a full in-memory implementation used as the
//! test double across the workspace.

pub mod fs;
pub mod memory;
pub mod redb_store;

pub use fs::{FsBlockStore, FsMetadataStore};
pub use memory::{MemoryBlockStore, MemoryCoordinatorStore, MemoryMetadataStore};
pub use redb_store::RedbCoordinatorStore;

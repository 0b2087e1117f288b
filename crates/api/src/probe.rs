//! Transport for availability spot checks.

use async_trait::async_trait;
use caravel_types::{FileManifest, Hex32};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("probe timed out")]
    Timeout,
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Fetches manifests and blocks from a host endpoint, with a deadline. The
/// sweep verifies the returned bytes against the CID itself; the probe only
/// moves bytes.
#[async_trait]
pub trait SpotCheckProbe: Send + Sync {
    async fn fetch_manifest(
        &self,
        endpoint: &str,
        file_root: &Hex32,
    ) -> Result<FileManifest, ProbeError>;

    async fn fetch_block(&self, endpoint: &str, cid: &Hex32) -> Result<Vec<u8>, ProbeError>;
}

//! Node configuration: a TOML file with CLI/env overrides.

use anyhow::{anyhow, Context, Result};
use caravel_types::constants::EPOCH_LENGTH_MS;
use caravel_types::{HostPricing, Hex32};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for blocks, metadata and the coordinator database.
    pub data_dir: PathBuf,
    pub gateway_addr: SocketAddr,
    pub coordinator_addr: SocketAddr,
    pub mint_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    /// Protocol genesis, milliseconds since the UNIX epoch.
    pub genesis_ms: u64,
    pub epoch_length_ms: u64,
    /// 32-byte hex seeds. Generated fresh when absent (development mode).
    pub mint_seed_hex: Option<String>,
    pub host_seed_hex: Option<String>,
    pub coordinator_seed_hex: Option<String>,
    /// Mint public keys the coordinator trusts. The local mint's key is
    /// always included.
    pub trusted_mints: Vec<Hex32>,
    /// A remote mint to sign receipts with; defaults to the in-process one.
    pub mint_url: Option<String>,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub min_request_sats: u64,
    pub sats_per_gb: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let defaults = HostPricing::default();
        Self {
            min_request_sats: defaults.min_request_sats,
            sats_per_gb: defaults.sats_per_gb,
        }
    }
}

impl From<PricingConfig> for HostPricing {
    fn from(config: PricingConfig) -> Self {
        Self {
            min_request_sats: config.min_request_sats,
            sats_per_gb: config.sats_per_gb,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caravel-data"),
            gateway_addr: "127.0.0.1:8080".parse().expect("static addr"),
            coordinator_addr: "127.0.0.1:8081".parse().expect("static addr"),
            mint_addr: "127.0.0.1:8082".parse().expect("static addr"),
            metrics_addr: "127.0.0.1:9100".parse().expect("static addr"),
            genesis_ms: 1_735_689_600_000, // 2025-01-01T00:00:00Z
            epoch_length_ms: EPOCH_LENGTH_MS,
            mint_seed_hex: None,
            host_seed_hex: None,
            coordinator_seed_hex: None,
            trusted_mints: Vec::new(),
            mint_url: None,
            pricing: PricingConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

/// Decodes a configured 32-byte hex seed.
pub fn parse_seed(hex_seed: &str) -> Result<[u8; 32]> {
    let raw = hex::decode(hex_seed).context("seed is not hex")?;
    raw.try_into()
        .map_err(|_| anyhow!("seed must be exactly 32 bytes"))
}

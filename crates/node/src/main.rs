// The Caravel node: gateway, coordinator, mint and settlement in one process.
#![forbid(unsafe_code)]

mod config;

use anyhow::{Context, Result};
use caravel_coordinator::{AvailabilitySweeper, CoordinatorState, HttpSpotCheckProbe};
use caravel_crypto::Ed25519KeyPair;
use caravel_gateway::{mint_client::HttpMintClient, spawn_cache_sweeper, GatewayState};
use caravel_mint::{LocalMintClient, MemoryInvoicePort, Mint};
use caravel_settlement::{EpochScheduler, SettlementEngine};
use caravel_storage::{FsBlockStore, FsMetadataStore, RedbCoordinatorStore};
use caravel_types::epoch::{install_clock, EpochClock};
use clap::Parser;
use config::{parse_seed, NodeConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "caravel-node", about = "Caravel storage network node")]
struct Opts {
    /// Path to a TOML config file; compiled defaults apply when omitted.
    #[clap(long, env = "CARAVEL_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured data directory.
    #[clap(long)]
    data_dir: Option<PathBuf>,
}

fn keypair_from(seed_hex: Option<&String>, label: &str) -> Result<Ed25519KeyPair> {
    match seed_hex {
        Some(hex_seed) => {
            let seed = parse_seed(hex_seed).with_context(|| format!("{label} seed"))?;
            Ok(Ed25519KeyPair::from_seed(&seed))
        }
        None => {
            let keypair = Ed25519KeyPair::generate();
            info!(target: "node", key = %keypair.public(), "{label} key generated (ephemeral)");
            Ok(keypair)
        }
    }
}

async fn serve(addr: SocketAddr, router: axum::Router, label: &'static str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {label} on {addr}"))?;
    info!(target: "node", %addr, "{label} listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .with_context(|| format!("{label} server"))
}

#[tokio::main]
async fn main() -> Result<()> {
    caravel_telemetry::init_tracing()?;
    caravel_telemetry::install_node_metrics();

    let opts = Opts::parse();
    let mut config = NodeConfig::load(opts.config.as_deref())?;
    if let Some(data_dir) = opts.data_dir {
        config.data_dir = data_dir;
    }

    let clock = EpochClock::new(config.genesis_ms, config.epoch_length_ms);
    install_clock(clock);
    info!(
        target: "node",
        genesis_ms = config.genesis_ms,
        epoch = clock.current_epoch(),
        "epoch clock installed"
    );

    // Storage.
    std::fs::create_dir_all(&config.data_dir).context("creating data dir")?;
    let blocks = Arc::new(FsBlockStore::new(config.data_dir.join("blocks")));
    let metadata = Arc::new(FsMetadataStore::new(config.data_dir.join("blocks")));
    let store = Arc::new(RedbCoordinatorStore::open(
        config.data_dir.join("coordinator.redb"),
    )?);

    // Keys.
    let mint_keys = keypair_from(config.mint_seed_hex.as_ref(), "mint")?;
    let host_keys = keypair_from(config.host_seed_hex.as_ref(), "host")?;
    let coordinator_keys = keypair_from(config.coordinator_seed_hex.as_ref(), "coordinator")?;

    // The invoice backend is a port; the in-memory implementation stands in
    // until a Lightning node is wired up behind it.
    let invoices = Arc::new(MemoryInvoicePort::new());

    // Mint.
    let mint = Arc::new(Mint::new(mint_keys.clone(), invoices.clone()));
    let mint_router = caravel_mint::http::router(mint.clone());

    // Gateway, signing receipts through the configured mint.
    let mint_client: Arc<dyn caravel_api::MintClient> = match &config.mint_url {
        Some(url) => Arc::new(
            HttpMintClient::new(url.clone(), Duration::from_secs(10))
                .map_err(|e| anyhow::anyhow!("mint client: {e}"))?,
        ),
        None => Arc::new(LocalMintClient::new(mint.clone())),
    };
    let gateway_state = Arc::new(
        GatewayState::new(blocks, metadata, host_keys.public(), clock).with_l402(
            invoices.clone(),
            mint_client,
            config.pricing.clone().into(),
        ),
    );
    spawn_cache_sweeper(gateway_state.clone(), Duration::from_secs(60));
    let gateway_router = caravel_gateway::router(gateway_state);

    // Coordinator.
    let mut trusted_mints = config.trusted_mints.clone();
    if let Some(own) = mint.pubkey() {
        if !trusted_mints.contains(&own) {
            trusted_mints.push(own);
        }
    }
    let coordinator_state = Arc::new(CoordinatorState::new(
        store.clone(),
        clock,
        trusted_mints,
        config.pricing.clone().into(),
    ));
    let coordinator_router = caravel_coordinator::router(coordinator_state);

    // Settlement: engine + sweep on the epoch scheduler.
    let sweep_key = coordinator_keys.public();
    let engine = Arc::new(SettlementEngine::new(store.clone(), coordinator_keys));
    let probe = Arc::new(
        HttpSpotCheckProbe::new(Duration::from_secs(10))
            .map_err(|e| anyhow::anyhow!("probe: {e}"))?,
    );
    let sweeper: Arc<dyn caravel_settlement::AvailabilitySweep> =
        Arc::new(AvailabilitySweeper::new(store.clone(), probe, sweep_key));
    let scheduler = EpochScheduler::new(engine, clock, Some(sweeper));
    tokio::spawn(scheduler.run());

    // Serve all surfaces until one fails.
    tokio::select! {
        result = serve(config.gateway_addr, gateway_router, "gateway") => result,
        result = serve(config.coordinator_addr, coordinator_router, "coordinator") => result,
        result = serve(config.mint_addr, mint_router, "mint") => result,
        result = serve(config.metrics_addr, caravel_telemetry::metrics_router(), "metrics") => result,
    }
}

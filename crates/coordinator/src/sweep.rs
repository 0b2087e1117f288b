//! The availability sweep: PRF-selected spot checks against host endpoints.

use async_trait::async_trait;
use caravel_api::{CoordinatorStore, ProbeError, SpotCheck, SpotCheckProbe};
use caravel_crypto::block_select_index;
use caravel_settlement::{apply_status_transition, availability_score, AvailabilitySweep};
use caravel_types::constants::{AVAILABILITY_WINDOW_EPOCHS, MAX_LIST_ITEMS};
use caravel_types::{verify_cid, FileManifest, Hex32, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP probe against a host's gateway surface.
pub struct HttpSpotCheckProbe {
    client: reqwest::Client,
}

impl HttpSpotCheckProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }
}

fn transport_err(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Unreachable(e.to_string())
    }
}

#[async_trait]
impl SpotCheckProbe for HttpSpotCheckProbe {
    async fn fetch_manifest(
        &self,
        endpoint: &str,
        file_root: &Hex32,
    ) -> Result<FileManifest, ProbeError> {
        let url = format!("{}/file/{file_root}", endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(ProbeError::BadResponse(format!("status {}", response.status())));
        }
        response
            .json::<FileManifest>()
            .await
            .map_err(|e| ProbeError::BadResponse(e.to_string()))
    }

    async fn fetch_block(&self, endpoint: &str, cid: &Hex32) -> Result<Vec<u8>, ProbeError> {
        let url = format!("{}/block/{cid}", endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.map_err(transport_err)?;
        if !response.status().is_success() {
            return Err(ProbeError::BadResponse(format!("status {}", response.status())));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProbeError::BadResponse(e.to_string()))
    }
}

/// Walks the serve table, spot-checks each (host, cid) pair with the
/// block-selection PRF, then folds the rolling window into host statuses.
pub struct AvailabilitySweeper {
    store: Arc<dyn CoordinatorStore>,
    probe: Arc<dyn SpotCheckProbe>,
    /// The key the sweeper feeds into the PRF, standing in for a client.
    probe_key: Hex32,
}

impl AvailabilitySweeper {
    pub fn new(
        store: Arc<dyn CoordinatorStore>,
        probe: Arc<dyn SpotCheckProbe>,
        probe_key: Hex32,
    ) -> Self {
        Self {
            store,
            probe,
            probe_key,
        }
    }

    pub async fn sweep(&self, epoch: u32) -> Result<(), StorageError> {
        for (host, cid) in self.store.list_serves().await? {
            let Some(record) = self.store.get_host(&host).await? else {
                continue;
            };
            let Some(endpoint) = record.endpoint else {
                continue;
            };
            let passed = self.check_one(&endpoint, epoch, &cid).await;
            self.store
                .record_spot_check(&SpotCheck {
                    host,
                    cid,
                    epoch,
                    passed,
                })
                .await?;
            debug!(target: "coordinator", %host, %cid, passed, "spot check");
        }
        self.apply_window(epoch).await
    }

    /// One spot check: fetch the manifest, pick the PRF block, verify the
    /// served bytes. Any transport or integrity failure counts as a miss.
    async fn check_one(&self, endpoint: &str, epoch: u32, file_root: &Hex32) -> bool {
        let manifest = match self.probe.fetch_manifest(endpoint, file_root).await {
            Ok(m) => m,
            Err(_) => return false,
        };
        if manifest.file_root().ok() != Some(*file_root) {
            return false;
        }
        let index = block_select_index(epoch, file_root, &self.probe_key, manifest.blocks.len());
        let Some(block_cid) = manifest.blocks.get(index) else {
            return false;
        };
        match self.probe.fetch_block(endpoint, block_cid).await {
            Ok(bytes) => verify_cid(block_cid, &bytes),
            Err(_) => false,
        }
    }

    /// Recomputes every host's rolling-window score and applies the status
    /// transition table.
    async fn apply_window(&self, epoch: u32) -> Result<(), StorageError> {
        let lo = epoch.saturating_sub(AVAILABILITY_WINDOW_EPOCHS);
        for host in self.store.list_hosts(MAX_LIST_ITEMS).await? {
            let (passed, total) = self
                .store
                .availability_counts(&host.pubkey, lo, epoch)
                .await?;
            let Some(score) = availability_score(passed, total) else {
                continue;
            };
            let next = apply_status_transition(host.status, score);
            if next != host.status || (score - host.availability_score).abs() > f64::EPSILON {
                let mut updated = host;
                updated.availability_score = score;
                updated.status = next;
                self.store.upsert_host(&updated).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilitySweep for AvailabilitySweeper {
    async fn run(&self, current_epoch: u32) -> Result<(), String> {
        self.sweep(current_epoch).await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravel_storage::MemoryCoordinatorStore;
    use caravel_test_utils::seeded_keypair;
    use caravel_types::{HostRecord, HostStatus};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Scripted probe: serves blocks for hosts marked up, errors otherwise.
    struct ScriptedProbe {
        manifests: HashMap<Hex32, FileManifest>,
        blocks: HashMap<Hex32, Vec<u8>>,
        up: Mutex<bool>,
    }

    #[async_trait]
    impl SpotCheckProbe for ScriptedProbe {
        async fn fetch_manifest(
            &self,
            _endpoint: &str,
            file_root: &Hex32,
        ) -> Result<FileManifest, ProbeError> {
            if !*self.up.lock().await {
                return Err(ProbeError::Timeout);
            }
            self.manifests
                .get(file_root)
                .cloned()
                .ok_or(ProbeError::BadResponse("no manifest".into()))
        }

        async fn fetch_block(&self, _endpoint: &str, cid: &Hex32) -> Result<Vec<u8>, ProbeError> {
            if !*self.up.lock().await {
                return Err(ProbeError::Timeout);
            }
            self.blocks
                .get(cid)
                .cloned()
                .ok_or(ProbeError::BadResponse("no block".into()))
        }
    }

    async fn seeded_world() -> (Arc<MemoryCoordinatorStore>, Arc<ScriptedProbe>, Hex32, Hex32) {
        let store = Arc::new(MemoryCoordinatorStore::new());
        let host_key = seeded_keypair(5).public();
        store
            .upsert_host(&HostRecord::new(
                host_key,
                Some("http://host:8080".into()),
                Default::default(),
            ))
            .await
            .unwrap();

        let chunked = caravel_content::chunk_bytes(&[7u8; 100], None, 16).unwrap();
        store.add_serve(&host_key, &chunked.file_root).await.unwrap();

        let probe = Arc::new(ScriptedProbe {
            manifests: HashMap::from([(chunked.file_root, chunked.manifest.clone())]),
            blocks: chunked.blocks.iter().cloned().collect(),
            up: Mutex::new(true),
        });
        (store, probe, host_key, chunked.file_root)
    }

    #[tokio::test]
    async fn passing_sweep_promotes_pending_host() {
        let (store, probe, host_key, _) = seeded_world().await;
        let sweeper =
            AvailabilitySweeper::new(store.clone(), probe, seeded_keypair(6).public());
        sweeper.sweep(10).await.unwrap();

        let host = store.get_host(&host_key).await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Trusted);
        assert_eq!(host.availability_score, 1.0);
    }

    #[tokio::test]
    async fn failing_sweeps_degrade_then_deactivate() {
        let (store, probe, host_key, _) = seeded_world().await;
        let sweeper =
            AvailabilitySweeper::new(store.clone(), probe.clone(), seeded_keypair(6).public());

        // One good epoch, then the host goes dark.
        sweeper.sweep(10).await.unwrap();
        *probe.up.lock().await = false;
        for epoch in 11..=16 {
            sweeper.sweep(epoch).await.unwrap();
        }
        // Window [10, 16] still contains the early pass, score > 0.
        let host = store.get_host(&host_key).await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Degraded);
        assert!(host.availability_score > 0.0);

        // Once the pass falls out of the window the score hits zero and the
        // degraded host goes inactive.
        sweeper.sweep(17).await.unwrap();
        let host = store.get_host(&host_key).await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Inactive);
        assert_eq!(host.availability_score, 0.0);
    }
}

//! Saving and restoring federation membership across restarts.
//!
//! The state file holds the local cluster's record followed by every
//! sibling. Loading finds the local cluster by name and performs the same
//! join the database would have triggered.

use std::path::{Path, PathBuf};
use std::time::Instant;

use fedmgr_persistence::{ClusterEntry, FormatError, StateRecord};
use tracing::{debug, error, info};

use crate::error::FederationError;
use crate::manager::FederationManager;
use crate::types::{same_cluster, ClusterRecord};

/// What [`FederationManager::load_state`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No state file exists.
    NoState,
    /// The state file lists no clusters.
    NotFederated,
    /// The saved federation was joined.
    Joined { federation: String },
}

impl FederationManager {
    /// Writes current membership to the state file in `state_dir`.
    ///
    /// On failure the previous state file is left in place and the error
    /// carries the OS error code where there is one.
    pub async fn save_state(&self, state_dir: &Path) -> Result<(), FederationError> {
        let start = Instant::now();
        let record = {
            let state = self.lock().read().await;
            let clusters: Vec<ClusterEntry> = state
                .local()
                .into_iter()
                .chain(
                    state
                        .siblings()
                        .unwrap_or_default()
                        .iter()
                        .map(|s| s.record()),
                )
                .map(ClusterEntry::from)
                .collect();
            StateRecord::new(clusters)
        };

        let dir = state_dir.to_path_buf();
        let count = record.clusters.len();
        run_blocking(move || fedmgr_persistence::write_state(&dir, &record)).await?;
        debug!(
            clusters = count,
            elapsed_us = start.elapsed().as_micros() as u64,
            "saved federation state"
        );
        Ok(())
    }

    /// Restores membership from the state file in `state_dir`.
    ///
    /// A missing file is not an error. Live state is only changed by a
    /// successful join; any error leaves it untouched.
    pub async fn load_state(&self, state_dir: &Path) -> Result<LoadOutcome, FederationError> {
        let dir: PathBuf = state_dir.to_path_buf();
        let record = match run_blocking(move || fedmgr_persistence::read_state(&dir)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(
                    dir = %state_dir.display(),
                    "no federation state file to recover"
                );
                return Ok(LoadOutcome::NoState);
            }
            Err(e) => {
                if e.is_incompatible_version() {
                    error!("incompatible federation state file, ignoring it: {e}");
                } else {
                    error!("failed to read federation state: {e}");
                }
                return Err(e.into());
            }
        };
        debug!(
            version = record.version,
            saved_at = record.saved_at,
            clusters = record.clusters.len(),
            "read federation state"
        );

        let mut clusters: Vec<ClusterRecord> =
            record.clusters.into_iter().map(ClusterRecord::from).collect();
        if clusters.is_empty() {
            return Ok(LoadOutcome::NotFederated);
        }

        let Some(pos) = clusters
            .iter()
            .position(|c| same_cluster(&c.name, self.cluster_name()))
        else {
            error!(
                cluster = %self.cluster_name(),
                "local cluster missing from saved federation state"
            );
            return Err(FederationError::LocalClusterMissing {
                cluster: self.cluster_name().to_string(),
            });
        };
        let local = clusters.remove(pos);
        let federation = local.fed.name.clone();
        self.join(&local, &clusters).await?;
        info!(%federation, siblings = clusters.len(), "recovered federation state");
        Ok(LoadOutcome::Joined { federation })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, FormatError>
where
    F: FnOnce() -> Result<T, FormatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FormatError::Io(std::io::Error::other(e)))?
}

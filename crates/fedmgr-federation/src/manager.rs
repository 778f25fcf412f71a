//! Federation membership state and the join/leave transitions.
//!
//! [`FederationManager`] owns everything the controller knows about its
//! federation: the home federation identity, the local cluster's record
//! and one [`SiblingConnection`] per remote cluster. That state lives in a
//! [`FederationState`] behind the injected controller lock, and a
//! background monitor keeps the sibling connections alive while the
//! local cluster is federated.
//!
//! The state is consistent at every point another task can observe it:
//! a non-empty federation name, a sibling collection and a running
//! monitor come and go together, always under the write form of the lock.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::FederationError;
use crate::job_id::combine_job_id;
use crate::lock::ControllerLock;
use crate::monitor::{MonitorConfig, MonitorHandle};
use crate::sibling::SiblingConnection;
use crate::transport::ControllerTransport;
use crate::types::{same_cluster, ClusterRecord, FederationInfo, FederationMembership};

/// The controller lock specialized to federation state.
pub type FederationLock = ControllerLock<FederationState>;

/// Settings for a [`FederationManager`].
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// Name of the local cluster. Matched case-insensitively against
    /// federation definitions and saved state.
    pub cluster_name: String,
    pub monitor: MonitorConfig,
}

impl FederationConfig {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Federation membership as seen under the controller lock.
#[derive(Debug, Default)]
pub struct FederationState {
    identity: FederationMembership,
    local: Option<ClusterRecord>,
    siblings: Option<Vec<SiblingConnection>>,
    monitor: Option<MonitorHandle>,
}

impl FederationState {
    /// The home federation identity. Its name is empty when not federated.
    pub fn identity(&self) -> &FederationMembership {
        &self.identity
    }

    pub fn federation_name(&self) -> Option<&str> {
        (!self.identity.name.is_empty()).then_some(self.identity.name.as_str())
    }

    /// The database's record for the local cluster, kept for reporting.
    pub fn local(&self) -> Option<&ClusterRecord> {
        self.local.as_ref()
    }

    pub fn siblings(&self) -> Option<&[SiblingConnection]> {
        self.siblings.as_deref()
    }

    pub fn is_federated(&self) -> bool {
        !self.identity.name.is_empty()
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor.as_ref().is_some_and(MonitorHandle::is_running)
    }

    #[cfg(test)]
    pub(crate) fn with_siblings(federation: &str, siblings: Vec<SiblingConnection>) -> Self {
        Self {
            identity: FederationMembership::new(federation, 1),
            siblings: Some(siblings),
            ..Self::default()
        }
    }
}

/// Owns the local cluster's federation membership.
///
/// Construct one per controller with [`FederationManager::new`] and call
/// [`FederationManager::shutdown`] before dropping it.
pub struct FederationManager {
    config: FederationConfig,
    lock: Arc<FederationLock>,
    transport: Arc<dyn ControllerTransport>,
    /// Monitor tasks told to stop but not yet joined.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl FederationManager {
    pub fn new(
        config: FederationConfig,
        lock: Arc<FederationLock>,
        transport: Arc<dyn ControllerTransport>,
    ) -> Self {
        Self {
            config,
            lock,
            transport,
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// The controller lock this manager's state lives behind.
    pub fn lock(&self) -> &Arc<FederationLock> {
        &self.lock
    }

    /// Joins the federation named in `record`, the database's record for
    /// the local cluster. `members` lists every cluster of that
    /// federation; the local cluster is skipped.
    pub async fn join(
        &self,
        record: &ClusterRecord,
        members: &[ClusterRecord],
    ) -> Result<(), FederationError> {
        let mut state = self.lock.write().await;
        self.join_locked(&mut state, record, members).await
    }

    /// Performs a join on state the caller already holds the write form for.
    ///
    /// Existing sibling connections are always closed and rebuilt, even
    /// when the member list is unchanged. Sibling connects run while the
    /// lock is held, so readers only ever see the finished membership.
    pub async fn join_locked(
        &self,
        state: &mut FederationState,
        record: &ClusterRecord,
        members: &[ClusterRecord],
    ) -> Result<(), FederationError> {
        if record.fed.name.is_empty() {
            return Err(FederationError::MissingFederationName {
                cluster: record.name.clone(),
            });
        }
        if !same_cluster(&record.name, &self.config.cluster_name) {
            return Err(FederationError::NotLocalCluster {
                record: record.name.clone(),
                local: self.config.cluster_name.clone(),
            });
        }

        state.identity = record.fed.clone();
        state.local = Some(record.clone());
        info!(
            federation = %state.identity.name,
            cluster_id = state.identity.id,
            "joining federation"
        );

        if let Some(old) = state.siblings.take() {
            close_all(&old).await;
        }

        let mut siblings: Vec<SiblingConnection> = Vec::with_capacity(members.len());
        for member in members {
            if same_cluster(&member.name, &self.config.cluster_name) {
                continue;
            }
            if siblings.iter().any(|s| same_cluster(s.name(), &member.name)) {
                warn!(sibling = %member.name, "duplicate sibling in federation definition, ignoring");
                continue;
            }
            siblings.push(SiblingConnection::new(member.clone()));
        }

        let transport = self.transport.as_ref();
        let opened = join_all(siblings.iter().map(|s| s.open(transport))).await;
        debug!(
            siblings = siblings.len(),
            connected = opened.iter().filter(|ok| **ok).count(),
            "sibling connections opened"
        );
        state.siblings = Some(siblings);

        if !state.monitor_running() {
            if let Some(stale) = state.monitor.take() {
                self.retire(stale.stop());
            }
            state.monitor = Some(MonitorHandle::spawn(
                &self.lock,
                Arc::clone(&self.transport),
                self.config.monitor.ping_interval,
            ));
        }
        Ok(())
    }

    /// Leaves the current federation. A no-op when not federated.
    pub async fn leave(&self) {
        let mut state = self.lock.write().await;
        self.leave_locked(&mut state).await;
    }

    /// Performs a leave on state the caller already holds the write form for.
    ///
    /// The monitor is told to stop but not waited for; it may be finishing
    /// a ping and needs the read form to do so.
    pub async fn leave_locked(&self, state: &mut FederationState) {
        if !state.is_federated() {
            return;
        }
        info!(federation = %state.identity.name, "leaving federation");

        if let Some(siblings) = state.siblings.take() {
            close_all(&siblings).await;
        }
        if let Some(monitor) = state.monitor.take() {
            self.retire(monitor.stop());
        }
        state.identity = FederationMembership::default();
        state.local = None;
    }

    /// True when the local cluster belongs to a federation.
    pub async fn is_active(&self) -> bool {
        self.lock.read().await.is_federated()
    }

    /// Name of the home federation, if any.
    pub async fn federation_name(&self) -> Option<String> {
        self.lock.read().await.federation_name().map(str::to_string)
    }

    /// Copies the current membership: the local record first, then every
    /// sibling in definition order.
    pub async fn federation_info(&self) -> FederationInfo {
        let state = self.lock.read().await;
        let Some(name) = state.federation_name() else {
            return FederationInfo::default();
        };
        let clusters = state
            .local
            .iter()
            .cloned()
            .chain(
                state
                    .siblings()
                    .unwrap_or_default()
                    .iter()
                    .map(|s| s.record().clone()),
            )
            .collect();
        FederationInfo {
            name: Some(name.to_string()),
            clusters,
        }
    }

    /// Returns the name of the sibling whose control host is exactly `host`.
    pub async fn find_sibling_name_by_control_host(&self, host: &str) -> Option<String> {
        let state = self.lock.read().await;
        state
            .siblings()?
            .iter()
            .find(|s| s.record().control_host == host)
            .map(|s| s.name().to_string())
    }

    /// Encodes `local_id` with the local cluster's federation id.
    pub async fn federated_job_id(&self, local_id: u32) -> u32 {
        let cluster_id = self.lock.read().await.identity.id;
        combine_job_id(local_id, cluster_id)
    }

    /// Leaves the federation and waits for every stopped monitor task,
    /// aborting any that outlive the configured shutdown timeout.
    pub async fn shutdown(&self) {
        self.leave().await;

        let handles = std::mem::take(&mut *self.retired_tasks());
        let timeout = self.config.monitor.shutdown_timeout;
        for mut handle in handles {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!(?timeout, "federation monitor did not stop in time, aborting");
                handle.abort();
            }
        }
        debug!("federation manager shut down");
    }

    fn retire(&self, handle: JoinHandle<()>) {
        let mut retired = self.retired_tasks();
        retired.retain(|h| !h.is_finished());
        retired.push(handle);
    }

    fn retired_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FederationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn close_all(siblings: &[SiblingConnection]) {
    join_all(siblings.iter().map(|s| s.close())).await;
}

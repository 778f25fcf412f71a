//! Applying federation definitions from the database.

use tracing::{debug, error, warn};

use crate::manager::FederationManager;
use crate::types::{ClusterRecord, FederationRecord, FederationUpdate};

impl FederationManager {
    /// Reconciles membership with a set of federation definitions.
    ///
    /// If the local cluster is a member of a federation in the update, it
    /// joins that federation (rebuilding sibling connections even when
    /// nothing changed). Otherwise it leaves whatever federation it is in.
    /// An update without federation objects changes nothing.
    pub async fn update_federations(&self, update: &FederationUpdate) {
        let federations = match update.federations.as_deref() {
            Some(feds) if !feds.is_empty() => feds,
            _ => {
                debug!("federation update carried no federations, ignoring");
                return;
            }
        };

        let local_name = self.cluster_name();
        let mut homes = federations
            .iter()
            .filter_map(|fed| fed.find_cluster(local_name).map(|record| (fed, record)));
        let home = homes.next();
        if let Some((extra, _)) = homes.next() {
            warn!(
                cluster = %local_name,
                federation = %extra.name,
                "cluster listed in more than one federation, using the first"
            );
        }

        let mut state = self.lock().write().await;
        match home {
            Some((fed, record)) => {
                let record = tagged(fed, record);
                if let Err(e) = self.join_locked(&mut state, &record, &fed.clusters).await {
                    error!(federation = %fed.name, "failed to join federation: {e}");
                }
            }
            None => {
                debug!(cluster = %local_name, "cluster is not in any federation");
                self.leave_locked(&mut state).await;
            }
        }
    }
}

/// Copies a member record, tagging it with the federation name when the
/// database left the tag blank.
fn tagged(fed: &FederationRecord, record: &ClusterRecord) -> ClusterRecord {
    let mut record = record.clone();
    if record.fed.name.is_empty() {
        record.fed.name = fed.name.clone();
    }
    record
}

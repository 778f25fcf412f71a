//! Cluster and federation records exchanged with the database and
//! reported to the rest of the controller.

use fedmgr_persistence::ClusterEntry;
use serde::{Deserialize, Serialize};

/// A cluster's membership tag within a federation.
///
/// When adopted by the local cluster this is the federation identity:
/// the name of the home federation plus the cluster id the federation
/// assigned to us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMembership {
    /// Federation name. Empty when the cluster is not federated.
    pub name: String,
    /// Cluster id within the federation. Encoded into federated job ids.
    pub id: u32,
    /// Membership state as reported by the database.
    pub state: u32,
    /// Feature flags. Opaque to this crate.
    pub flags: u32,
}

impl FederationMembership {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
            ..Self::default()
        }
    }
}

/// A cluster as defined by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    /// Host of the cluster's controller. Empty when not configured.
    pub control_host: String,
    pub control_port: u16,
    pub fed: FederationMembership,
}

impl ClusterRecord {
    /// Creates a record with no federation membership.
    pub fn new(name: impl Into<String>, control_host: impl Into<String>, control_port: u16) -> Self {
        Self {
            name: name.into(),
            control_host: control_host.into(),
            control_port,
            fed: FederationMembership::default(),
        }
    }

    /// Tags the record as a member of `federation` with cluster id `id`.
    pub fn in_federation(mut self, federation: impl Into<String>, id: u32) -> Self {
        self.fed = FederationMembership::new(federation, id);
        self
    }
}

/// Cluster names are compared case-insensitively everywhere.
pub(crate) fn same_cluster(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A federation definition from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationRecord {
    pub name: String,
    pub clusters: Vec<ClusterRecord>,
}

impl FederationRecord {
    /// Returns the member cluster with the given name.
    pub fn find_cluster(&self, name: &str) -> Option<&ClusterRecord> {
        self.clusters.iter().find(|c| same_cluster(&c.name, name))
    }
}

/// An update notification from the database. `None` means the update
/// carried no federation objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FederationUpdate {
    pub federations: Option<Vec<FederationRecord>>,
}

impl FederationUpdate {
    pub fn new(federations: Vec<FederationRecord>) -> Self {
        Self {
            federations: Some(federations),
        }
    }
}

/// A point-in-time copy of the local federation membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationInfo {
    /// Name of the home federation, `None` when not federated.
    pub name: Option<String>,
    /// The local cluster's record followed by every sibling.
    pub clusters: Vec<ClusterRecord>,
}

impl FederationInfo {
    /// Returns the cluster names in report order.
    pub fn cluster_names(&self) -> Vec<&str> {
        self.clusters.iter().map(|c| c.name.as_str()).collect()
    }
}

impl From<&ClusterRecord> for ClusterEntry {
    fn from(record: &ClusterRecord) -> Self {
        ClusterEntry {
            name: record.name.clone(),
            control_host: record.control_host.clone(),
            control_port: record.control_port,
            fed_name: record.fed.name.clone(),
            fed_id: record.fed.id,
            fed_state: record.fed.state,
            fed_flags: record.fed.flags,
        }
    }
}

impl From<ClusterEntry> for ClusterRecord {
    fn from(entry: ClusterEntry) -> Self {
        ClusterRecord {
            name: entry.name,
            control_host: entry.control_host,
            control_port: entry.control_port,
            fed: FederationMembership {
                name: entry.fed_name,
                id: entry.fed_id,
                state: entry.fed_state,
                flags: entry.fed_flags,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_cluster_ignores_case() {
        let fed = FederationRecord {
            name: "fed1".into(),
            clusters: vec![
                ClusterRecord::new("Alpha", "10.0.0.1", 6817),
                ClusterRecord::new("beta", "10.0.0.2", 6817),
            ],
        };
        assert_eq!(fed.find_cluster("alpha").unwrap().control_host, "10.0.0.1");
        assert!(fed.find_cluster("gamma").is_none());
    }

    #[test]
    fn entry_conversion_keeps_membership() {
        let mut record = ClusterRecord::new("alpha", "10.0.0.1", 6817).in_federation("fed1", 3);
        record.fed.flags = 0x10;
        let entry = ClusterEntry::from(&record);
        assert_eq!(entry.fed_name, "fed1");
        assert_eq!(ClusterRecord::from(entry), record);
    }
}

//! Federated job id encoding.
//!
//! A federated job id carries the id of the cluster that created it in
//! its top six bits and the cluster-local id in the low 26 bits:
//!
//! ```text
//!  31      26 25                          0
//! +----------+-----------------------------+
//! |cluster id|        local job id         |
//! +----------+-----------------------------+
//! ```
//!
//! None of these functions validate their input. A local id above
//! [`MAX_JOB_ID`] spills into the cluster bits.

/// Bit offset of the cluster id within a federated job id.
pub const CLUSTER_ID_SHIFT: u32 = 26;

/// Largest cluster-local job id.
pub const MAX_JOB_ID: u32 = (1 << CLUSTER_ID_SHIFT) - 1;

/// Combines a local job id with the id of the cluster that owns it.
pub fn combine_job_id(local_id: u32, cluster_id: u32) -> u32 {
    local_id.wrapping_add(cluster_id << CLUSTER_ID_SHIFT)
}

/// Returns the cluster-local part of a federated job id.
pub fn extract_local_job_id(fed_job_id: u32) -> u32 {
    fed_job_id & MAX_JOB_ID
}

/// Returns the cluster id encoded in a federated job id.
pub fn extract_cluster_id(fed_job_id: u32) -> u32 {
    fed_job_id >> CLUSTER_ID_SHIFT
}

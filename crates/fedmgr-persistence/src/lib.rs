//! fedmgr-persistence: on-disk format for federation membership.
//!
//! Encodes the cluster list a controller was federated with so the
//! membership can be restored after a restart, and rotates the state
//! file in a crash-safe way.

pub mod format;
pub mod state;

pub use format::FormatError;
pub use state::{read_state, state_path, write_state, ClusterEntry, StateRecord, STATE_FILE};

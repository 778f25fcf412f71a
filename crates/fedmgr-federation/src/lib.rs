//! fedmgr-federation: federation membership for a cluster controller.
//!
//! A controller belongs to at most one federation. While it does, it keeps
//! a persistent connection to every sibling cluster's controller and a
//! background monitor pings them on a fixed interval, reopening any that
//! dropped.
//!
//! # Architecture
//!
//! - **Manager**: [`FederationManager`] owns the membership state behind
//!   an injected [`ControllerLock`] and performs join and leave
//! - **Reconciler**: [`FederationManager::update_federations`] turns
//!   database federation definitions into a join or a leave
//! - **Siblings**: [`SiblingConnection`] wraps one remote controller with
//!   its own connection mutex
//! - **Monitor**: a cancellable task that only ever takes the read lock
//! - **Persistence**: [`FederationManager::save_state`] and
//!   [`FederationManager::load_state`] carry membership across restarts
//! - **Transport**: [`ControllerTransport`] is the seam to the network;
//!   [`TcpTransport`] is the production implementation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fedmgr_federation::{
//!     FederationConfig, FederationLock, FederationManager, FederationState, TcpTransport,
//! };
//!
//! let lock = Arc::new(FederationLock::new(FederationState::default()));
//! let manager = FederationManager::new(
//!     FederationConfig::new("alpha"),
//!     lock,
//!     Arc::new(TcpTransport::default()),
//! );
//! manager.load_state(state_dir).await?;
//! // ...
//! manager.save_state(state_dir).await?;
//! manager.shutdown().await;
//! ```

mod auth;
mod error;
mod job_id;
mod lock;
mod manager;
mod monitor;
mod persist;
mod reconcile;
mod sibling;
mod tcp;
mod transport;
mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use auth::{ControllerSecret, TAG_LEN};
pub use error::{FederationError, TransportError};
pub use job_id::{
    combine_job_id, extract_cluster_id, extract_local_job_id, CLUSTER_ID_SHIFT, MAX_JOB_ID,
};
pub use lock::{ControllerLock, LockMode};
pub use manager::{FederationConfig, FederationLock, FederationManager, FederationState};
pub use monitor::{MonitorConfig, DEFAULT_PING_INTERVAL};
pub use persist::LoadOutcome;
pub use sibling::SiblingConnection;
pub use tcp::{serve_connection, TcpTransport};
pub use transport::{
    ControllerConn, ControllerRequest, ControllerResponse, ControllerTransport, RequestHandler,
    TransportConfig, GENERIC_ERROR, SUCCESS,
};
pub use types::{
    ClusterRecord, FederationInfo, FederationMembership, FederationRecord, FederationUpdate,
};

//! Error types for federation operations.

use std::io;
use std::time::Duration;

use fedmgr_persistence::FormatError;

/// Errors raised while talking to a sibling controller.
///
/// These never escape a join or the health monitor: a failed sibling is
/// marked disconnected and retried on the next monitor pass.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Read or write failure on an established connection.
    #[error("controller connection error: {0}")]
    Io(#[from] io::Error),

    /// The peer did not answer in time.
    #[error("controller request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection, or it was already closed locally.
    #[error("controller connection closed")]
    Closed,

    /// The peer answered with a non-success application status.
    #[error("controller returned error code {0}")]
    Status(i32),

    /// The peer sent a response that does not match the request.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Errors returned by federation state transitions and persistence.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The saved sibling list does not contain the local cluster.
    #[error("cluster '{cluster}' doesn't exist in the saved federation siblings")]
    LocalClusterMissing { cluster: String },

    /// A join was requested with a cluster record that has no federation.
    #[error("cluster record for '{cluster}' has no federation name")]
    MissingFederationName { cluster: String },

    /// A join was requested with another cluster's record as the local one.
    #[error("record for '{record}' does not describe the local cluster '{local}'")]
    NotLocalCluster { record: String, local: String },

    /// Reading or writing the state file failed.
    #[error("federation state: {0}")]
    Persistence(#[from] FormatError),
}

impl FederationError {
    /// Returns true when the state file was written by an unsupported
    /// version. Startup logs these prominently.
    pub fn is_incompatible_version(&self) -> bool {
        matches!(self, FederationError::Persistence(e) if e.is_incompatible_version())
    }

    /// Returns the OS error code behind a failed save or load, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FederationError::Persistence(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

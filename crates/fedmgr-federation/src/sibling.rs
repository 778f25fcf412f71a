//! Connections to sibling cluster controllers.
//!
//! Each sibling owns one persistent connection guarded by its own mutex.
//! The mutex serializes open, close and ping on the same sibling; access
//! to the sibling collection itself is serialized by the controller lock.

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::TransportError;
use crate::transport::{ControllerConn, ControllerRequest, ControllerTransport, SUCCESS};
use crate::types::ClusterRecord;

/// A remote cluster controller and the connection to it, if any.
///
/// The connection slot is either an open handle or `None`. Failed or
/// closed handles are dropped, never kept around.
pub struct SiblingConnection {
    record: ClusterRecord,
    conn: Mutex<Option<Box<dyn ControllerConn>>>,
}

impl SiblingConnection {
    /// Creates a sibling with no connection.
    pub fn new(record: ClusterRecord) -> Self {
        Self {
            record,
            conn: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &ClusterRecord {
        &self.record
    }

    /// Returns true if the sibling currently holds an open connection.
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Opens the connection, replacing any existing one.
    ///
    /// A sibling without a control host is left disconnected without a
    /// connect attempt. Returns whether a connection is now held.
    pub async fn open(&self, transport: &dyn ControllerTransport) -> bool {
        let mut slot = self.conn.lock().await;
        if let Some(old) = slot.take() {
            self.close_handle(old).await;
        }

        let host = &self.record.control_host;
        let port = self.record.control_port;
        if host.is_empty() {
            debug!(sibling = %self.record.name, "no control host, not connecting");
            return false;
        }

        match transport.connect(host, port).await {
            Ok(conn) => {
                debug!(sibling = %self.record.name, %host, port, "opened sibling connection");
                *slot = Some(conn);
                true
            }
            Err(e) => {
                warn!(sibling = %self.record.name, %host, port, "failed to open sibling connection: {e}");
                false
            }
        }
    }

    /// Closes the connection if one is open. The slot is always left empty.
    pub async fn close(&self) {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.take() {
            self.close_handle(conn).await;
        }
    }

    /// Sends a liveness probe over the open connection.
    ///
    /// Any failure, whether transport or a non-success status, drops the
    /// connection so the next health check reopens it. There is no retry.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let mut slot = self.conn.lock().await;
        let Some(conn) = slot.as_mut() else {
            return Err(TransportError::Closed);
        };

        let result = match conn.send_recv(&ControllerRequest::Ping).await {
            Ok(resp) if resp.return_code() == SUCCESS => Ok(()),
            Ok(resp) => Err(TransportError::Status(resp.return_code())),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(
                sibling = %self.record.name,
                host = %self.record.control_host,
                port = self.record.control_port,
                "ping failed: {e}"
            );
            if let Some(conn) = slot.take() {
                self.close_handle(conn).await;
            }
        }
        result
    }

    async fn close_handle(&self, conn: Box<dyn ControllerConn>) {
        match conn.close().await {
            Ok(()) => debug!(sibling = %self.record.name, "closed sibling connection"),
            Err(e) => {
                debug!(sibling = %self.record.name, "error closing sibling connection: {e}")
            }
        }
    }
}

impl std::fmt::Debug for SiblingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiblingConnection")
            .field("name", &self.record.name)
            .field("control_host", &self.record.control_host)
            .field("control_port", &self.record.control_port)
            .finish_non_exhaustive()
    }
}

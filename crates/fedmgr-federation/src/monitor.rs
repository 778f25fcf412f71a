//! Background health checks for sibling connections.
//!
//! While the local cluster is federated one monitor task runs. Every
//! interval it takes the read form of the controller lock, reopens any
//! sibling without a connection and pings the rest. A failed ping drops
//! the connection; the next pass reopens it.
//!
//! The monitor only ever takes the read form, so it cannot deadlock
//! against a join or leave holding the write form. A stop request is
//! observed while sleeping; a check already in flight runs to completion.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::manager::FederationLock;
use crate::sibling::SiblingConnection;
use crate::transport::ControllerTransport;

/// Default time between health checks.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Health monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between health check passes.
    pub ping_interval: Duration,
    /// How long shutdown waits for a stopped monitor before aborting it.
    pub shutdown_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// A running monitor task and its stop signal.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Starts the monitor. The task holds only a weak reference to the
    /// lock and exits once the lock is dropped.
    pub(crate) fn spawn(
        lock: &Arc<FederationLock>,
        transport: Arc<dyn ControllerTransport>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(Arc::downgrade(lock), transport, interval, stop_rx));
        Self { stop_tx, task }
    }

    /// True until the monitor is told to stop or its task exits.
    pub(crate) fn is_running(&self) -> bool {
        !*self.stop_tx.borrow() && !self.task.is_finished()
    }

    /// Signals the monitor to stop and hands back its task without
    /// waiting for it.
    pub(crate) fn stop(self) -> JoinHandle<()> {
        self.stop_tx.send_replace(true);
        self.task
    }
}

async fn run(
    lock: Weak<FederationLock>,
    transport: Arc<dyn ControllerTransport>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "federation health monitor started");
    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }
        let Some(lock) = lock.upgrade() else {
            break;
        };
        check_siblings(&lock, transport.as_ref()).await;
        drop(lock);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                // a dropped sender means the owning state is gone
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("federation health monitor stopped");
}

/// Runs one health check pass over every sibling.
pub(crate) async fn check_siblings(lock: &FederationLock, transport: &dyn ControllerTransport) {
    let state = lock.read().await;
    let Some(siblings) = state.siblings() else {
        return;
    };
    join_all(siblings.iter().map(|sibling| check_sibling(sibling, transport))).await;
}

async fn check_sibling(sibling: &SiblingConnection, transport: &dyn ControllerTransport) {
    if !sibling.is_connected().await && !sibling.open(transport).await {
        debug!(sibling = %sibling.name(), "sibling still unreachable");
        return;
    }
    // failures are logged and the connection dropped inside ping
    let _ = sibling.ping().await;
}

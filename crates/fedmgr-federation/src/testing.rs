//! A scripted in-memory transport for tests.
//!
//! [`MockTransport`] hands out connections that never touch the network.
//! It counts opens, closes and pings per host, can make a host
//! unreachable or answer its pings with an error status, and can hold
//! connects at a gate so a test can observe the federation mid-join.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::TransportError;
use crate::transport::{
    ControllerConn, ControllerRequest, ControllerResponse, ControllerTransport, SUCCESS,
};
use crate::types::FederationInfo;

#[derive(Debug, Default)]
struct Counters {
    opens: HashMap<String, usize>,
    closes: HashMap<String, usize>,
    pings: HashMap<String, usize>,
    unreachable: HashSet<String>,
    ping_status: HashMap<String, i32>,
    live: usize,
}

#[derive(Debug)]
struct Shared {
    counters: Mutex<Counters>,
    /// `true` while connects are held at the gate.
    paused: watch::Sender<bool>,
    /// Number of connects currently waiting at the gate.
    waiting: watch::Sender<usize>,
}

/// An in-memory [`ControllerTransport`]. Clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (waiting, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                counters: Mutex::new(Counters::default()),
                paused,
                waiting,
            }),
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        lock(&self.shared)
    }

    /// Makes connects to `host` fail, and pings on existing connections
    /// to it fail as if the peer went away.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut c = self.counters();
        if unreachable {
            c.unreachable.insert(host.to_string());
        } else {
            c.unreachable.remove(host);
        }
    }

    /// Sets the application status returned to pings sent to `host`.
    pub fn set_ping_status(&self, host: &str, status: i32) {
        self.counters().ping_status.insert(host.to_string(), status);
    }

    /// Successful connects to `host`.
    pub fn opens(&self, host: &str) -> usize {
        self.counters().opens.get(host).copied().unwrap_or(0)
    }

    pub fn closes(&self, host: &str) -> usize {
        self.counters().closes.get(host).copied().unwrap_or(0)
    }

    pub fn pings(&self, host: &str) -> usize {
        self.counters().pings.get(host).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.counters().opens.values().sum()
    }

    pub fn total_closes(&self) -> usize {
        self.counters().closes.values().sum()
    }

    /// Connections opened and not yet closed.
    pub fn live_connections(&self) -> usize {
        self.counters().live
    }

    /// Holds every subsequent connect until [`resume_connects`] is called.
    ///
    /// [`resume_connects`]: MockTransport::resume_connects
    pub fn pause_connects(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume_connects(&self) {
        self.shared.paused.send_replace(false);
    }

    /// Waits until at least one connect is held at the gate.
    pub async fn wait_for_connect(&self) {
        let mut rx = self.shared.waiting.subscribe();
        // the sender lives in `shared`, so the channel cannot close here
        let _ = rx.wait_for(|n| *n > 0).await;
    }
}

fn lock(shared: &Shared) -> MutexGuard<'_, Counters> {
    shared
        .counters
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ControllerTransport for MockTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn ControllerConn>, TransportError> {
        let mut paused = self.shared.paused.subscribe();
        let gated = *paused.borrow_and_update();
        if gated {
            self.shared.waiting.send_modify(|n| *n += 1);
            let _ = paused.wait_for(|p| !*p).await;
            self.shared.waiting.send_modify(|n| *n -= 1);
        }

        let mut c = self.counters();
        if c.unreachable.contains(host) {
            return Err(TransportError::Connect {
                host: host.to_string(),
                port,
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        *c.opens.entry(host.to_string()).or_default() += 1;
        c.live += 1;
        Ok(Box::new(MockConn {
            shared: Arc::clone(&self.shared),
            host: host.to_string(),
        }))
    }
}

struct MockConn {
    shared: Arc<Shared>,
    host: String,
}

#[async_trait]
impl ControllerConn for MockConn {
    async fn send_recv(
        &mut self,
        req: &ControllerRequest,
    ) -> Result<ControllerResponse, TransportError> {
        let mut c = lock(&self.shared);
        if c.unreachable.contains(&self.host) {
            return Err(TransportError::Closed);
        }
        match req {
            ControllerRequest::Ping => {
                *c.pings.entry(self.host.clone()).or_default() += 1;
                let status = c.ping_status.get(&self.host).copied().unwrap_or(SUCCESS);
                Ok(ControllerResponse::ReturnCode(status))
            }
            ControllerRequest::FederationInfo => {
                Ok(ControllerResponse::FederationInfo(FederationInfo::default()))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let mut c = lock(&self.shared);
        *c.closes.entry(self.host.clone()).or_default() += 1;
        c.live -= 1;
        Ok(())
    }
}

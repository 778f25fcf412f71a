//! The controller transport seam.
//!
//! Sibling connections only need three things from the transport: open a
//! persistent connection to a controller, exchange one request/response
//! over it, and close it. [`ControllerTransport`] and [`ControllerConn`]
//! capture exactly that so the federation logic can run against TCP in
//! production and a scripted transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::types::FederationInfo;

/// Application status code for a successful request.
pub const SUCCESS: i32 = 0;

/// Generic application failure status.
pub const GENERIC_ERROR: i32 = -1;

/// A request sent to another cluster's controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerRequest {
    /// Liveness probe.
    Ping,
    /// Asks for the controller's current federation membership.
    FederationInfo,
}

impl ControllerRequest {
    /// Short name used in logs.
    pub fn msg_type(&self) -> &'static str {
        match self {
            ControllerRequest::Ping => "REQUEST_PING",
            ControllerRequest::FederationInfo => "REQUEST_FED_INFO",
        }
    }
}

/// A controller's answer to a [`ControllerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerResponse {
    /// Bare application status.
    ReturnCode(i32),
    FederationInfo(FederationInfo),
}

impl ControllerResponse {
    /// The application-level status carried by the response.
    pub fn return_code(&self) -> i32 {
        match self {
            ControllerResponse::ReturnCode(rc) => *rc,
            ControllerResponse::FederationInfo(_) => SUCCESS,
        }
    }
}

/// Timeouts for the TCP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long to wait for a TCP connect.
    pub connect_timeout: Duration,
    /// How long to wait for one request/response exchange.
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens persistent connections to other controllers.
#[async_trait]
pub trait ControllerTransport: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16)
        -> Result<Box<dyn ControllerConn>, TransportError>;
}

/// One open connection to another controller.
#[async_trait]
pub trait ControllerConn: Send {
    /// Sends `req` and waits for the matching response.
    async fn send_recv(
        &mut self,
        req: &ControllerRequest,
    ) -> Result<ControllerResponse, TransportError>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Serves requests arriving from other controllers.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, req: ControllerRequest) -> ControllerResponse;
}

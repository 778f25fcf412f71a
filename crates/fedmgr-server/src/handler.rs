//! Answers requests from other controllers.

use std::sync::Arc;

use async_trait::async_trait;
use fedmgr_federation::{
    ControllerRequest, ControllerResponse, FederationManager, RequestHandler, SUCCESS,
};

/// Serves the liveness probe and federation info queries.
pub struct ControllerHandler {
    manager: Arc<FederationManager>,
}

impl ControllerHandler {
    pub fn new(manager: Arc<FederationManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl RequestHandler for ControllerHandler {
    async fn handle(&self, req: ControllerRequest) -> ControllerResponse {
        match req {
            ControllerRequest::Ping => ControllerResponse::ReturnCode(SUCCESS),
            ControllerRequest::FederationInfo => {
                ControllerResponse::FederationInfo(self.manager.federation_info().await)
            }
        }
    }
}

//! Manager for cluster decommission requests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::{DefaultProviderFactory, ProviderFactory};
use crate::config::Config;
use crate::entities::{
    valid_decommission_cluster_request, DecommissionClusterRequest, DecommissionRequest,
    InfrastructureOperation, OpResponse, TaskProgress,
};
use crate::executor::Executor;
use crate::{Error, Result};

/// Accepts decommission requests and tracks their operations
pub struct DecommissionManager {
    config: Config,
    executor: Arc<Executor>,
    factory: Arc<dyn ProviderFactory>,
    /// Operation per request identifier
    operations: Mutex<HashMap<String, Arc<dyn InfrastructureOperation>>>,
}

impl DecommissionManager {
    /// Create a manager bound to the process-wide executor.
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Executor::global(), Arc::new(DefaultProviderFactory))
    }

    /// Create a manager with explicit collaborators.
    pub fn with_parts(
        config: Config,
        executor: Arc<Executor>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            executor,
            factory,
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Trigger the decommission operation on the requested infrastructure
    /// provider.
    pub fn decommission_cluster(
        &self,
        request: &DecommissionClusterRequest,
    ) -> Result<OpResponse> {
        valid_decommission_cluster_request(request)?;
        debug!(request_id = %request.request_id, "Decommission request received");
        let provider = self.factory.create(
            request.target_platform,
            request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider
            .decommission(DecommissionRequest::from(request))
            .map_err(|err| {
                error!(error = %err, "cannot create decommission operation");
                err
            })?;

        let mut operations = self.operations.lock().expect("manager state poisoned");
        if operations.contains_key(&request.request_id) {
            return Err(Error::already_exists("request is already being processed"));
        }
        operations.insert(request.request_id.clone(), Arc::clone(&operation));
        self.executor.schedule_operation(operation);

        Ok(OpResponse {
            request_id: request.request_id.clone(),
            state: TaskProgress::Init,
            elapsed_time: 0,
            error: String::new(),
        })
    }

    /// Get an updated state of a decommission request.
    pub fn check_progress(&self, request_id: &str) -> Result<OpResponse> {
        let operations = self.operations.lock().expect("manager state poisoned");
        let operation = operations
            .get(request_id)
            .ok_or_else(|| Error::not_found("request_id not found"))?;
        operation.result().to_op_response()
    }

    /// Remove the information of a processed decommission request. Does not
    /// cancel in-flight work.
    pub fn remove_decommission(&self, request_id: &str) -> Result<()> {
        let mut operations = self.operations.lock().expect("manager state poisoned");
        if operations.remove(request_id).is_none() {
            return Err(Error::not_found("request_id not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AzureOptions, Platform};
    use crate::service::testutil::{test_credentials, StubFactory};

    fn valid_request(request_id: &str) -> DecommissionClusterRequest {
        DecommissionClusterRequest {
            request_id: request_id.to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            is_management_cluster: false,
            target_platform: Platform::Azure,
            azure_credentials: Some(test_credentials()),
            azure_options: Some(AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            }),
        }
    }

    #[tokio::test]
    async fn decommission_requests_are_tracked_until_removed() {
        let manager = DecommissionManager::with_parts(
            Config::default(),
            Executor::new(),
            Arc::new(StubFactory),
        );
        let response = manager.decommission_cluster(&valid_request("r-dec")).unwrap();
        assert_eq!(response.state, TaskProgress::Init);

        assert!(matches!(
            manager.decommission_cluster(&valid_request("r-dec")),
            Err(Error::AlreadyExists(_))
        ));

        manager.remove_decommission("r-dec").unwrap();
        assert!(matches!(
            manager.check_progress("r-dec"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn requests_without_identifier_are_rejected() {
        let manager = DecommissionManager::with_parts(
            Config::default(),
            Executor::new(),
            Arc::new(StubFactory),
        );
        let mut request = valid_request("");
        request.request_id = String::new();
        assert!(matches!(
            manager.decommission_cluster(&request),
            Err(Error::InvalidArgument(_))
        ));
    }
}

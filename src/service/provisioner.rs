//! Manager for cluster provisioning requests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::{DefaultProviderFactory, ProviderFactory};
use crate::config::Config;
use crate::entities::{
    valid_provision_cluster_request, InfrastructureOperation, ProvisionClusterRequest,
    ProvisionClusterResponse, ProvisionRequest, TaskProgress,
};
use crate::executor::Executor;
use crate::{Error, Result};

/// Accepts provisioning requests and tracks their operations
pub struct ProvisionManager {
    config: Config,
    executor: Arc<Executor>,
    factory: Arc<dyn ProviderFactory>,
    /// Operation per request identifier
    operations: Mutex<HashMap<String, Arc<dyn InfrastructureOperation>>>,
}

impl ProvisionManager {
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

    /// Trigger the provisioning operation on the requested infrastructure
    /// provider.
    pub fn provision_cluster(
        &self,
        request: &ProvisionClusterRequest,
    ) -> Result<ProvisionClusterResponse> {
        valid_provision_cluster_request(request)?;
        debug!(
            request_id = %request.request_id,
            target_platform = %request.target_platform,
            "Provision request received"
        );
        let provider = self.factory.create(
            request.target_platform,
            request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider
            .provision(ProvisionRequest::from(request))
            .map_err(|err| {
                error!(error = %err, "cannot create provision operation");
                err
            })?;

        let mut operations = self.operations.lock().expect("manager state poisoned");
        if operations.contains_key(&request.request_id) {
            return Err(Error::already_exists("request is already being processed"));
        }
        operations.insert(request.request_id.clone(), Arc::clone(&operation));
        self.executor.schedule_operation(operation);

        Ok(ProvisionClusterResponse {
            request_id: request.request_id.clone(),
            state: TaskProgress::Init,
            elapsed_time: 0,
            error: String::new(),
            cluster_name: String::new(),
            hostname: String::new(),
            raw_kube_config: String::new(),
            static_ip_addresses: None,
        })
    }

    /// Get an updated state of a provisioning request.
    pub fn check_progress(&self, request_id: &str) -> Result<ProvisionClusterResponse> {
        let operations = self.operations.lock().expect("manager state poisoned");
        let operation = operations
            .get(request_id)
            .ok_or_else(|| Error::not_found("request_id not found"))?;
        operation.result().to_provision_cluster_response()
    }

    /// Remove the information of a processed provisioning request. Does not
    /// cancel in-flight work.
    pub fn remove_provision(&self, request_id: &str) -> Result<()> {
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

    fn valid_request(request_id: &str) -> ProvisionClusterRequest {
        ProvisionClusterRequest {
            request_id: request_id.to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            cluster_name: "Dev 01".to_string(),
            kubernetes_version: "1.13.11".to_string(),
            num_nodes: 3,
            node_type: "Standard_DS2_v2".to_string(),
            zone: "westeurope".to_string(),
            is_management_cluster: false,
            is_production: false,
            target_platform: Platform::Azure,
            azure_credentials: Some(test_credentials()),
            azure_options: Some(AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: "example.tech".to_string(),
            }),
        }
    }

    fn manager() -> ProvisionManager {
        ProvisionManager::with_parts(Config::default(), Executor::new(), Arc::new(StubFactory))
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_scheduling() {
        let executor = Executor::new();
        let manager = ProvisionManager::with_parts(
            Config::default(),
            Arc::clone(&executor),
            Arc::new(StubFactory),
        );
        let mut request = valid_request("r-invalid");
        request.node_type = String::new();

        let result = manager.provision_cluster(&request);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!executor.is_managed("r-invalid"));
        assert!(manager.check_progress("r-invalid").is_err());
    }

    #[tokio::test]
    async fn duplicate_request_ids_are_rejected() {
        let manager = manager();
        let request = valid_request("r-dup");

        let first = manager.provision_cluster(&request).unwrap();
        assert_eq!(first.state, TaskProgress::Init);

        let second = manager.provision_cluster(&request);
        assert!(matches!(second, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn progress_is_served_from_the_tracked_operation() {
        let manager = manager();
        manager.provision_cluster(&valid_request("r-progress")).unwrap();

        // Wait for the stub operation to finish in the background.
        for _ in 0..50 {
            let response = manager.check_progress("r-progress").unwrap();
            if response.state == TaskProgress::Finished {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("operation never reported completion");
    }

    #[tokio::test]
    async fn removal_forgets_the_request() {
        let manager = manager();
        manager.provision_cluster(&valid_request("r-remove")).unwrap();

        manager.remove_provision("r-remove").unwrap();
        assert!(matches!(
            manager.check_progress("r-remove"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            manager.remove_provision("r-remove"),
            Err(Error::NotFound(_))
        ));
    }
}

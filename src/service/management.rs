//! Manager for synchronous management operations
//!
//! Management operations are bounded in duration (a single provider call),
//! so they bypass the executor: the manager drives `execute` directly with
//! a local completion flag and returns the result without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{DefaultProviderFactory, ProviderFactory};
use crate::config::Config;
use crate::entities::{
    valid_cluster_request, ClusterRequest, CompletionCallback, KubeConfigResponse,
    ManagementRequest, TaskProgress,
};
use crate::Result;

/// Executes management requests synchronously
pub struct ManagementManager {
    config: Config,
    factory: Arc<dyn ProviderFactory>,
}

impl ManagementManager {
    /// Create a manager using the default provider factory.
    pub fn new(config: Config) -> Self {
        Self::with_factory(config, Arc::new(DefaultProviderFactory))
    }

    /// Create a manager with an explicit provider factory.
    pub fn with_factory(config: Config, factory: Arc<dyn ProviderFactory>) -> Self {
        Self { config, factory }
    }

    /// Retrieve the kubeconfig needed to access a cluster.
    pub async fn get_kube_config(&self, request: &ClusterRequest) -> Result<KubeConfigResponse> {
        valid_cluster_request(request)?;
        debug!(request_id = %request.request_id, "GetKubeConfig request received");
        let provider = self.factory.create(
            request.target_platform,
            request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.get_kube_config(ManagementRequest::from(request))?;

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let callback: CompletionCallback = Arc::new(move |_request_id: &str| {
            flag.store(true, Ordering::SeqCst);
        });
        operation.set_progress(TaskProgress::InProgress);
        operation.execute(callback).await;
        debug_assert!(finished.load(Ordering::SeqCst), "operation finished without callback");

        operation.result().to_kube_config_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AzureOptions, Platform};
    use crate::service::testutil::{test_credentials, StubFactory};
    use crate::Error;

    fn valid_request() -> ClusterRequest {
        ClusterRequest {
            request_id: "r-kc".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            is_management_cluster: true,
            target_platform: Platform::Azure,
            azure_credentials: Some(test_credentials()),
            azure_options: Some(AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            }),
        }
    }

    #[tokio::test]
    async fn kubeconfig_is_returned_synchronously() {
        let manager = ManagementManager::with_factory(Config::default(), Arc::new(StubFactory));
        let response = manager.get_kube_config(&valid_request()).await.unwrap();
        assert_eq!(response.state, TaskProgress::Finished);
        assert_eq!(response.raw_kube_config, "contexts: []");
        assert!(response.error.is_empty());
    }

    #[tokio::test]
    async fn validation_runs_before_any_provider_call() {
        let manager = ManagementManager::with_factory(Config::default(), Arc::new(StubFactory));
        let mut request = valid_request();
        request.organization_id = String::new();
        assert!(matches!(
            manager.get_kube_config(&request).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}

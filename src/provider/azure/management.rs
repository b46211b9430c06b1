//! Management operations over existing clusters

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::api::AzureApi;
use super::credentials::AzureCredentials;
use super::operation::AzureOperation;
use crate::entities::{
    CompletionCallback, InfrastructureOperation, ManagementRequest, ManagementResult,
    OperationMetadata, OperationResult, OperationType, TaskProgress, TypedResult,
};
use crate::{Error, Result};

/// Supported management operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementOperationType {
    /// Retrieve the kubeconfig associated with a cluster
    GetKubeConfig,
}

/// Operation retrieving administrative data from an existing cluster
pub struct ManagementOperation {
    base: AzureOperation,
    target_op: ManagementOperationType,
    request: ManagementRequest,
    kube_config: Mutex<Option<String>>,
}

impl ManagementOperation {
    /// Create a new management operation.
    pub fn new(
        credentials: AzureCredentials,
        api: AzureApi,
        request: ManagementRequest,
        target_op: ManagementOperationType,
    ) -> Self {
        Self {
            base: AzureOperation::new(credentials, api),
            target_op,
            request,
            kube_config: Mutex::new(None),
        }
    }

    fn notify_error(&self, err: Error, callback: &CompletionCallback) {
        tracing::error!(error = %err, "operation failed");
        self.base.set_error(&err.to_string());
        callback(&self.request.request_id);
    }

    async fn get_kube_config(&self) -> Result<()> {
        let resource_name = self
            .base
            .get_resource_name(self.request.is_management_cluster, &self.request.cluster_id);
        let resource_group = &self.request.azure_options.resource_group;
        debug!(resource_group = %resource_group, resource_name = %resource_name, "GetKubeConfig params");
        let kube_config = self
            .base
            .retrieve_kube_config(resource_group, &resource_name)
            .await?;
        *self.kube_config.lock().expect("result poisoned") = Some(kube_config);
        Ok(())
    }
}

#[async_trait]
impl InfrastructureOperation for ManagementOperation {
    fn request_id(&self) -> String {
        self.request.request_id.clone()
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata {
            organization_id: self.request.organization_id.clone(),
            cluster_id: self.request.cluster_id.clone(),
            request_id: self.request.request_id.clone(),
        }
    }

    fn log(&self) -> Vec<String> {
        self.base.log()
    }

    fn progress(&self) -> TaskProgress {
        self.base.progress()
    }

    fn set_progress(&self, progress: TaskProgress) {
        self.base.set_progress(progress);
    }

    async fn execute(&self, callback: CompletionCallback) {
        debug!(
            organization_id = %self.request.organization_id,
            cluster_id = %self.request.cluster_id,
            "executing management operation"
        );
        self.base.mark_started();

        match self.target_op {
            ManagementOperationType::GetKubeConfig => match self.get_kube_config().await {
                Ok(()) => {
                    self.base.mark_finished();
                    callback(&self.request.request_id);
                }
                Err(err) => self.notify_error(err, &callback),
            },
        }
    }

    fn cancel(&self) -> Result<()> {
        Err(Error::unimplemented(
            "cancellation of management operations is not supported",
        ))
    }

    fn result(&self) -> OperationResult {
        let (progress, elapsed_nanos, error_message) = self.base.result_snapshot();
        let raw_kube_config = self
            .kube_config
            .lock()
            .expect("result poisoned")
            .clone()
            .unwrap_or_default();
        OperationResult {
            request_id: self.request.request_id.clone(),
            operation_type: OperationType::Management,
            progress,
            elapsed_nanos,
            error_message,
            typed: TypedResult::Management(ManagementResult { raw_kube_config }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use base64::Engine;

    use super::*;
    use crate::entities::AzureOptions;
    use crate::provider::azure::model::{CredentialResult, CredentialResults};
    use crate::provider::azure::operation::tests::{test_credentials, MockApiBuilder};

    fn management_request() -> ManagementRequest {
        ManagementRequest {
            request_id: "r-mgmt".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "Dev 01".to_string(),
            is_management_cluster: true,
            azure_options: AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn kubeconfig_lands_in_the_typed_result() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("contexts: []");
        let mut builder = MockApiBuilder::new();
        builder
            .clusters
            .expect_list_cluster_user_credentials()
            .withf(|resource_group, resource_name| {
                resource_group == "dev" && resource_name == "mngt-dev01"
            })
            .returning(move |_, _| {
                Ok(CredentialResults {
                    kubeconfigs: vec![CredentialResult {
                        name: "clusterUser".to_string(),
                        value: encoded.clone(),
                    }],
                })
            });

        let operation = ManagementOperation::new(
            test_credentials(),
            builder.build(),
            management_request(),
            ManagementOperationType::GetKubeConfig,
        );
        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&callbacks);
        let callback: CompletionCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        operation.execute(callback).await;

        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(operation.progress(), TaskProgress::Finished);
        let TypedResult::Management(management) = operation.result().typed else {
            panic!("expected a management result");
        };
        assert_eq!(management.raw_kube_config, "contexts: []");
    }

    #[tokio::test]
    async fn retrieval_failures_surface_in_the_result() {
        let mut builder = MockApiBuilder::new();
        builder
            .clusters
            .expect_list_cluster_user_credentials()
            .returning(|_, _| Err(Error::not_found("cannot obtain cluster credentials")));

        let operation = ManagementOperation::new(
            test_credentials(),
            builder.build(),
            management_request(),
            ManagementOperationType::GetKubeConfig,
        );
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;

        assert_eq!(operation.progress(), TaskProgress::Error);
        assert!(operation
            .result()
            .error_message
            .contains("cluster credentials"));
    }
}

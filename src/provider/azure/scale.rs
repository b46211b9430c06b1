//! Scaling workflow for existing AKS clusters

use async_trait::async_trait;
use tracing::{debug, error};

use super::api::AzureApi;
use super::credentials::AzureCredentials;
use super::model::ManagedCluster;
use super::operation::AzureOperation;
use super::provision::CLUSTER_CREATE_DEADLINE;
use crate::entities::{
    CompletionCallback, InfrastructureOperation, OperationMetadata, OperationResult,
    OperationType, ScaleRequest, TaskProgress, TypedResult,
};
use crate::{Error, Result};

/// Operation changing the number of nodes of an existing cluster
pub struct ScalerOperation {
    base: AzureOperation,
    request: ScaleRequest,
}

impl ScalerOperation {
    /// Create a new scaling operation.
    pub fn new(credentials: AzureCredentials, api: AzureApi, request: ScaleRequest) -> Self {
        Self {
            base: AzureOperation::new(credentials, api),
            request,
        }
    }

    fn notify_error(&self, err: Error, callback: &CompletionCallback) {
        error!(error = %err, "operation failed");
        self.base.set_error(&err.to_string());
        callback(&self.request.request_id);
    }

    /// Trigger the scaling of the existing cluster.
    async fn scale_aks(&self) -> Result<ManagedCluster> {
        self.base.add_to_log("Scaling existing cluster");
        let existing_cluster = self
            .base
            .get_cluster_details(
                self.request.is_management_cluster,
                &self.request.azure_options.resource_group,
                &self.request.cluster_id,
            )
            .await?;
        debug!(name = ?existing_cluster.name, "AKS cluster retrieved");

        let updated = self
            .base
            .get_kubernetes_update_request(existing_cluster, self.request.num_nodes)?;

        let resource_name = self
            .base
            .get_resource_name(self.request.is_management_cluster, &self.request.cluster_id);
        let resource_group = &self.request.azure_options.resource_group;
        debug!(resource_group = %resource_group, resource_name = %resource_name, "CreateOrUpdate params");
        let future = self
            .base
            .api
            .clusters
            .begin_create_or_update(resource_group, &resource_name, updated)
            .await?;
        self.base.add_to_log("waiting for AKS to be scaled");
        self.base
            .api
            .clusters
            .wait_for_cluster(future, CLUSTER_CREATE_DEADLINE)
            .await
    }
}

#[async_trait]
impl InfrastructureOperation for ScalerOperation {
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
            num_nodes = self.request.num_nodes,
            "executing scaling operation"
        );
        self.base.mark_started();

        if self.request.num_nodes < 3 {
            self.notify_error(
                Error::invalid_argument("cannot scale a cluster to less than 3 nodes"),
                &callback,
            );
            return;
        }

        match self.scale_aks().await {
            Ok(scaled) => {
                debug!(name = ?scaled.name, "cluster has been scaled");
                self.base.mark_finished();
                callback(&self.request.request_id);
            }
            Err(err) => self.notify_error(err, &callback),
        }
    }

    fn cancel(&self) -> Result<()> {
        Err(Error::unimplemented(
            "cancellation of scaling operations is not supported",
        ))
    }

    fn result(&self) -> OperationResult {
        let (progress, elapsed_nanos, error_message) = self.base.result_snapshot();
        OperationResult {
            request_id: self.request.request_id.clone(),
            operation_type: OperationType::Scale,
            progress,
            elapsed_nanos,
            error_message,
            typed: TypedResult::Scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::entities::AzureOptions;
    use crate::provider::azure::api::OperationFuture;
    use crate::provider::azure::model::{
        ManagedClusterAgentPoolProfile, ManagedClusterProperties,
    };
    use crate::provider::azure::operation::tests::{test_credentials, MockApiBuilder};
    use crate::provider::azure::operation::{CREATED_BY_TAG, CREATED_BY_VALUE};

    fn scale_request(num_nodes: i64) -> ScaleRequest {
        ScaleRequest {
            request_id: "r-scale".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c-1".to_string(),
            num_nodes,
            is_management_cluster: false,
            azure_options: AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            },
        }
    }

    fn existing_cluster(created_by: &str) -> ManagedCluster {
        let mut tags = BTreeMap::new();
        tags.insert(CREATED_BY_TAG.to_string(), created_by.to_string());
        ManagedCluster {
            name: Some("appcluster-c-1".to_string()),
            tags,
            properties: ManagedClusterProperties {
                agent_pool_profiles: vec![ManagedClusterAgentPoolProfile {
                    name: "nalejpool".to_string(),
                    count: 3,
                    vm_size: "Standard_DS2_v2".to_string(),
                    ..ManagedClusterAgentPoolProfile::default()
                }],
                ..ManagedClusterProperties::default()
            },
            ..ManagedCluster::default()
        }
    }

    #[tokio::test]
    async fn scaling_below_three_nodes_is_rejected_before_any_cloud_call() {
        // The mocks carry no expectations: any cloud call panics the test.
        let operation = ScalerOperation::new(
            test_credentials(),
            MockApiBuilder::new().build(),
            scale_request(2),
        );

        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&callbacks);
        let callback: CompletionCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        operation.execute(callback).await;

        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(operation.progress(), TaskProgress::Error);
        assert!(operation
            .result()
            .error_message
            .contains("less than 3 nodes"));
    }

    #[tokio::test]
    async fn scaling_refuses_clusters_with_foreign_lineage() {
        let mut builder = MockApiBuilder::new();
        builder
            .clusters
            .expect_get_cluster()
            .returning(|_, _| Ok(existing_cluster("someone-else")));
        builder.clusters.expect_begin_create_or_update().times(0);

        let operation =
            ScalerOperation::new(test_credentials(), builder.build(), scale_request(5));
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;

        assert_eq!(operation.progress(), TaskProgress::Error);
        assert!(operation
            .result()
            .error_message
            .contains("non Nalej created clusters"));
    }

    #[tokio::test]
    async fn scaling_submits_the_updated_node_count() {
        let mut builder = MockApiBuilder::new();
        builder
            .clusters
            .expect_get_cluster()
            .withf(|resource_group, resource_name| {
                resource_group == "dev" && resource_name == "appcluster-c-1"
            })
            .returning(|_, _| Ok(existing_cluster(CREATED_BY_VALUE)));
        builder
            .clusters
            .expect_begin_create_or_update()
            .withf(|_, resource_name, parameters| {
                resource_name == "appcluster-c-1"
                    && parameters.properties.agent_pool_profiles[0].count == 5
            })
            .times(1)
            .returning(|_, _, _| Ok(OperationFuture::default()));
        builder
            .clusters
            .expect_wait_for_cluster()
            .times(1)
            .returning(|_, _| Ok(existing_cluster(CREATED_BY_VALUE)));

        let operation =
            ScalerOperation::new(test_credentials(), builder.build(), scale_request(5));
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;

        assert_eq!(operation.progress(), TaskProgress::Finished);
        assert!(matches!(operation.result().typed, TypedResult::Scale));
    }
}

//! Decommission workflow for existing AKS clusters
//!
//! The DNS zone and cluster name are discovered from the cluster tags, so
//! clusters without lineage tags cannot be decommissioned.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use super::api::AzureApi;
use super::credentials::AzureCredentials;
use super::model::RecordType;
use super::operation::{
    AzureOperation, CLUSTER_NAME_TAG, CREATED_BY_TAG, CREATED_BY_VALUE, DNS_ZONE_TAG,
};
use crate::entities::{
    CompletionCallback, DecommissionRequest, InfrastructureOperation, OperationMetadata,
    OperationResult, OperationType, TaskProgress, TypedResult,
};
use crate::{Error, Result};

/// Deadline for the cluster deletion request to complete
pub const CLUSTER_DECOMMISSION_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Operation removing an existing cluster and its DNS entries
pub struct DecommissionerOperation {
    base: AzureOperation,
    request: DecommissionRequest,
}

impl DecommissionerOperation {
    /// Create a new decommission operation.
    pub fn new(
        credentials: AzureCredentials,
        api: AzureApi,
        request: DecommissionRequest,
    ) -> Self {
        Self {
            base: AzureOperation::new(credentials, api),
            request,
        }
    }

    fn notify_error(&self, err: Error, callback: &CompletionCallback) {
        error!(error = %err, "decommission operation failed");
        self.base.set_error(&err.to_string());
        callback(&self.request.request_id);
    }

    async fn run(&self) -> Result<()> {
        self.base.add_to_log("Obtaining Cluster information");
        let managed_cluster = self
            .base
            .get_cluster_details(
                self.request.is_management_cluster,
                &self.request.azure_options.resource_group,
                &self.request.cluster_id,
            )
            .await?;

        match managed_cluster.tags.get(CREATED_BY_TAG) {
            Some(value) if value == CREATED_BY_VALUE => {}
            _ => {
                return Err(Error::invalid_argument(
                    "cannot manage non Nalej created clusters",
                ));
            }
        }
        let dns_zone_name = managed_cluster.tags.get(DNS_ZONE_TAG).ok_or_else(|| {
            Error::failed_precondition(format!(
                "Cluster entity does not contain needed tag [{}]",
                DNS_ZONE_TAG
            ))
        })?;
        let cluster_name = managed_cluster.tags.get(CLUSTER_NAME_TAG).ok_or_else(|| {
            Error::failed_precondition(format!(
                "Cluster entity does not contain needed tag [{}]",
                CLUSTER_NAME_TAG
            ))
        })?;

        self.base.add_to_log("Obtaining DNS zone information");
        let zone = self.base.get_dns_zone(dns_zone_name).await?;
        let dns_zone_resource_group = self.base.get_dns_resource_group_name(&zone)?;

        self.base.add_to_log("Deleting DNS entries");
        self.delete_dns_entries(cluster_name, &dns_zone_resource_group, dns_zone_name)
            .await?;

        self.base.add_to_log("Decommissioning cluster");
        self.decommission_aks_cluster().await?;
        self.base.add_to_log("cluster has been decommissioned");
        Ok(())
    }

    /// Remove the A records of the cluster root and the NS records of its
    /// delegated subdomain. Record sets without a name are skipped.
    async fn delete_dns_entries(
        &self,
        cluster_name: &str,
        resource_group_name: &str,
        dns_zone_name: &str,
    ) -> Result<()> {
        let a_records = self
            .base
            .api
            .dns
            .list_record_sets_by_suffix(resource_group_name, dns_zone_name, RecordType::A, cluster_name)
            .await?;
        let ns_records = self
            .base
            .api
            .dns
            .list_record_sets_by_suffix(
                resource_group_name,
                dns_zone_name,
                RecordType::Ns,
                &format!("{}.{}", cluster_name, dns_zone_name),
            )
            .await?;

        let to_remove = a_records
            .into_iter()
            .map(|record_set| (record_set, RecordType::A))
            .chain(
                ns_records
                    .into_iter()
                    .map(|record_set| (record_set, RecordType::Ns)),
            );
        for (record_set, record_type) in to_remove {
            let Some(record_name) = record_set.name else {
                debug!(
                    resource_group_name,
                    dns_zone_name, "recovered a DNS recordset without name"
                );
                continue;
            };
            debug!(
                resource_group_name,
                record_name = %record_name,
                dns_zone_name,
                record_type = %record_type,
                "deleting DNS entry"
            );
            self.base
                .delete_dns_record_set(resource_group_name, &record_name, dns_zone_name, record_type)
                .await?;
            self.base
                .add_to_log(format!("DNS record set deleted {}", record_name));
        }
        Ok(())
    }

    /// Trigger the deletion of the AKS cluster.
    async fn decommission_aks_cluster(&self) -> Result<()> {
        self.base.add_to_log("Deleting existing cluster");
        let resource_name = self
            .base
            .get_resource_name(self.request.is_management_cluster, &self.request.cluster_id);
        let resource_group = &self.request.azure_options.resource_group;
        debug!(resource_group = %resource_group, resource_name = %resource_name, "Delete params");
        let future = self
            .base
            .api
            .clusters
            .begin_delete(resource_group, &resource_name)
            .await?;
        self.base
            .add_to_log("waiting for AKS cluster to be decommissioned");
        self.base
            .api
            .clusters
            .wait_for_deletion(future, CLUSTER_DECOMMISSION_DEADLINE)
            .await
    }
}

#[async_trait]
impl InfrastructureOperation for DecommissionerOperation {
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
            "executing decommission operation"
        );
        self.base.mark_started();
        match self.run().await {
            Ok(()) => {
                debug!("cluster has been decommissioned");
                self.base.mark_finished();
                callback(&self.request.request_id);
            }
            Err(err) => self.notify_error(err, &callback),
        }
    }

    fn cancel(&self) -> Result<()> {
        Err(Error::unimplemented(
            "cancellation of decommission operations is not supported",
        ))
    }

    fn result(&self) -> OperationResult {
        let (progress, elapsed_nanos, error_message) = self.base.result_snapshot();
        OperationResult {
            request_id: self.request.request_id.clone(),
            operation_type: OperationType::Decommission,
            progress,
            elapsed_nanos,
            error_message,
            typed: TypedResult::Decommission,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::entities::AzureOptions;
    use crate::provider::azure::api::OperationFuture;
    use crate::provider::azure::model::{ManagedCluster, RecordSet};
    use crate::provider::azure::operation::tests::{test_credentials, MockApiBuilder};

    fn decommission_request() -> DecommissionRequest {
        DecommissionRequest {
            request_id: "r-dec".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "Dev 01".to_string(),
            is_management_cluster: true,
            azure_options: AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            },
        }
    }

    fn tagged_cluster(tags: &[(&str, &str)]) -> ManagedCluster {
        ManagedCluster {
            tags: tags
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..ManagedCluster::default()
        }
    }

    fn named_record(name: &str) -> RecordSet {
        RecordSet {
            name: Some(name.to_string()),
            ..RecordSet::default()
        }
    }

    #[tokio::test]
    async fn missing_dns_zone_tag_stops_before_any_dns_delete() {
        let mut builder = MockApiBuilder::new();
        builder.clusters.expect_get_cluster().returning(|_, _| {
            Ok(tagged_cluster(&[
                (CREATED_BY_TAG, CREATED_BY_VALUE),
                (CLUSTER_NAME_TAG, "dev01"),
            ]))
        });
        // The DNS mock carries no expectations: any call panics the test.

        let operation = DecommissionerOperation::new(
            test_credentials(),
            builder.build(),
            decommission_request(),
        );
        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&callbacks);
        let callback: CompletionCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        operation.execute(callback).await;

        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(operation.progress(), TaskProgress::Error);
        assert!(operation.result().error_message.contains("dnsZone"));
    }

    #[tokio::test]
    async fn foreign_clusters_are_left_untouched() {
        let mut builder = MockApiBuilder::new();
        builder.clusters.expect_get_cluster().returning(|_, _| {
            Ok(tagged_cluster(&[
                (CREATED_BY_TAG, "someone-else"),
                (DNS_ZONE_TAG, "example.tech"),
                (CLUSTER_NAME_TAG, "dev01"),
            ]))
        });
        builder.clusters.expect_begin_delete().times(0);

        let operation = DecommissionerOperation::new(
            test_credentials(),
            builder.build(),
            decommission_request(),
        );
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;

        assert_eq!(operation.progress(), TaskProgress::Error);
        assert!(operation
            .result()
            .error_message
            .contains("non Nalej created clusters"));
    }

    #[tokio::test]
    async fn decommission_sweeps_records_and_deletes_the_cluster() {
        let mut builder = MockApiBuilder::new();
        builder.clusters.expect_get_cluster().returning(|_, _| {
            Ok(tagged_cluster(&[
                (CREATED_BY_TAG, CREATED_BY_VALUE),
                (DNS_ZONE_TAG, "example.tech"),
                (CLUSTER_NAME_TAG, "dev01"),
            ]))
        });
        builder.dns.expect_list_zones().returning(|| {
            Ok(vec![super::super::model::DnsZone {
                id: "/subscriptions/s/resourceGroups/dns-rg/providers/Microsoft.Network/dnszones/example.tech".to_string(),
                name: "example.tech".to_string(),
            }])
        });
        builder
            .dns
            .expect_list_record_sets_by_suffix()
            .withf(|_, _, record_type, suffix| {
                *record_type == RecordType::A && suffix == "dev01"
            })
            .returning(|_, _, _, _| {
                Ok(vec![
                    named_record("dev01"),
                    named_record("*.dev01"),
                    // A record set recovered without a name must be skipped.
                    RecordSet::default(),
                ])
            });
        builder
            .dns
            .expect_list_record_sets_by_suffix()
            .withf(|_, _, record_type, suffix| {
                *record_type == RecordType::Ns && suffix == "dev01.example.tech"
            })
            .returning(|_, _, _, _| Ok(vec![named_record("ep.dev01.example.tech")]));

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let deleted_records = Arc::clone(&deleted);
        builder
            .dns
            .expect_delete_record_set()
            .times(3)
            .returning(move |_, _, record_type, record_name| {
                deleted_records
                    .lock()
                    .unwrap()
                    .push((record_type, record_name.to_string()));
                Ok(())
            });
        builder
            .clusters
            .expect_begin_delete()
            .withf(|resource_group, resource_name| {
                resource_group == "dev" && resource_name == "mngt-dev01"
            })
            .times(1)
            .returning(|_, _| Ok(OperationFuture::default()));
        builder
            .clusters
            .expect_wait_for_deletion()
            .times(1)
            .returning(|_, _| Ok(()));

        let operation = DecommissionerOperation::new(
            test_credentials(),
            builder.build(),
            decommission_request(),
        );
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;

        assert_eq!(operation.progress(), TaskProgress::Finished);
        let deleted = deleted.lock().unwrap().clone();
        assert!(deleted.contains(&(RecordType::A, "dev01".to_string())));
        assert!(deleted.contains(&(RecordType::A, "*.dev01".to_string())));
        assert!(deleted.contains(&(RecordType::Ns, "ep.dev01.example.tech".to_string())));
        assert!(matches!(
            operation.result().typed,
            TypedResult::Decommission
        ));
    }
}

//! Provisioning workflow for new AKS clusters
//!
//! Drives the full sequence: cluster creation, kubeconfig retrieval,
//! parallel IP reservation inside the node resource group, DNS entries,
//! cert-manager installation and certificate issuance. Failures leave the
//! partially created cloud state in place for a later decommission.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use super::api::AzureApi;
use super::credentials::AzureCredentials;
use super::model::{ManagedCluster, PublicIpAddress};
use super::operation::AzureOperation;
use crate::certmngr::{CertManagerHelper, CertificateBootstrap, IssuerParameters};
use crate::config::Config;
use crate::entities::{
    CompletionCallback, InfrastructureOperation, OperationMetadata, OperationResult,
    OperationType, ProvisionRequest, ProvisionResult, TaskProgress, TypedResult,
    COREDNS_PUBLIC_IP_ADDRESS_NAME, DNS_PUBLIC_IP_ADDRESS_NAME, INGRESS_IP_ADDRESS_NAME,
    VPNSERVER_PUBLIC_IP_ADDRESS_NAME,
};
use crate::{Error, Result};

/// Deadline for the cluster creation request to complete
pub const CLUSTER_CREATE_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Addresses reserved for a management cluster
pub const MANAGEMENT_IP_ADDRESS_NAMES: &[&str] = &[
    INGRESS_IP_ADDRESS_NAME,
    DNS_PUBLIC_IP_ADDRESS_NAME,
    COREDNS_PUBLIC_IP_ADDRESS_NAME,
    VPNSERVER_PUBLIC_IP_ADDRESS_NAME,
];

/// Addresses reserved for an application cluster
pub const APPLICATION_IP_ADDRESS_NAMES: &[&str] = &[INGRESS_IP_ADDRESS_NAME];

/// Operation provisioning a new Kubernetes cluster in Azure
pub struct ProvisionerOperation {
    base: Arc<AzureOperation>,
    request: ProvisionRequest,
    result: Mutex<ProvisionResult>,
    cert_manager: Arc<dyn CertificateBootstrap>,
}

impl ProvisionerOperation {
    /// Create a new provisioning operation.
    pub fn new(
        credentials: AzureCredentials,
        api: AzureApi,
        request: ProvisionRequest,
        config: &Config,
    ) -> Self {
        let cert_manager = Arc::new(CertManagerHelper::new(config.clone()));
        Self::with_bootstrap(credentials, api, request, cert_manager)
    }

    /// Create a provisioning operation with a specific bootstrap helper.
    pub fn with_bootstrap(
        credentials: AzureCredentials,
        api: AzureApi,
        request: ProvisionRequest,
        cert_manager: Arc<dyn CertificateBootstrap>,
    ) -> Self {
        let base = Arc::new(AzureOperation::new(credentials, api));
        let cluster_name = base.get_cluster_name(&request.cluster_name);
        let hostname = format!("{}.{}", cluster_name, request.azure_options.dns_zone_name);
        let result = ProvisionResult {
            cluster_name,
            hostname,
            ..ProvisionResult::default()
        };
        Self {
            base,
            request,
            result: Mutex::new(result),
            cert_manager,
        }
    }

    fn notify_error(&self, err: Error, callback: &CompletionCallback) {
        error!(error = %err, "operation failed");
        self.base.set_error(&err.to_string());
        callback(&self.request.request_id);
    }

    async fn run(&self) -> Result<()> {
        let created_cluster = self.create_aks_cluster().await?;
        let node_resource_group = created_cluster
            .properties
            .node_resource_group
            .clone()
            .ok_or_else(|| Error::internal("AKS cluster is missing its node resource group"))?;
        self.base.add_to_log(format!(
            "New cluster has been created with an associated resource group named as {}",
            node_resource_group
        ));

        debug!("cluster is ready, creating the IP addresses");
        self.create_associated_ip_addresses(&node_resource_group)
            .await?;
        debug!("IP address have been reserved");
        self.base.add_to_log("IP address have been reserved");

        self.base.add_to_log("Obtaining DNS zone information");
        let zone = self
            .base
            .get_dns_zone(&self.request.azure_options.dns_zone_name)
            .await?;
        debug!(zone = %zone.name, "target zone details");
        self.base.add_to_log("Creating DNS entries");
        let dns_zone_resource_group = self.base.get_dns_resource_group_name(&zone)?;

        if self.request.is_management_cluster {
            self.create_management_dns_entries(&dns_zone_resource_group)
                .await?;
        } else {
            self.create_application_dns_entries(&dns_zone_resource_group)
                .await?;
        }
        self.base.add_to_log("DNS entries have been defined");

        self.base.add_to_log("installing cert manager");
        let kubeconfig = self.result.lock().expect("result poisoned").raw_kube_config.clone();
        self.cert_manager.connect(&kubeconfig).await?;
        let bootstrap_result = self.bootstrap_cluster(&dns_zone_resource_group).await;
        self.cert_manager.destroy().await;
        bootstrap_result
    }

    /// Create a new Kubernetes cluster managed by Azure and capture its
    /// kubeconfig.
    async fn create_aks_cluster(&self) -> Result<ManagedCluster> {
        self.base.add_to_log("Creating new cluster");
        let parameters = self.base.get_kubernetes_create_request(
            &self.request.organization_id,
            &self.request.cluster_id,
            &self.request.cluster_name,
            &self.request.kubernetes_version,
            self.request.num_nodes,
            &self.request.node_type,
            &self.request.zone,
            Some(&self.request.azure_options.dns_zone_name),
        )?;

        let resource_name = self
            .base
            .get_resource_name(self.request.is_management_cluster, &self.request.cluster_id);
        let resource_group = &self.request.azure_options.resource_group;
        debug!(resource_group = %resource_group, resource_name = %resource_name, "CreateOrUpdate params");
        let future = self
            .base
            .api
            .clusters
            .begin_create_or_update(resource_group, &resource_name, parameters)
            .await?;
        self.base.add_to_log("waiting for AKS to be created");
        let managed_cluster = self
            .base
            .api
            .clusters
            .wait_for_cluster(future, CLUSTER_CREATE_DEADLINE)
            .await?;
        debug!(
            node_resource_group = ?managed_cluster.properties.node_resource_group,
            "AKS has been created"
        );

        let kubeconfig = self
            .base
            .retrieve_kube_config(resource_group, &resource_name)
            .await?;
        self.result.lock().expect("result poisoned").raw_kube_config = kubeconfig;
        Ok(managed_cluster)
    }

    /// Reserve the public addresses of the cluster, one task per address.
    /// All reservations must complete or the workflow aborts.
    async fn create_associated_ip_addresses(&self, node_resource_group: &str) -> Result<()> {
        self.base.add_to_log("Reserving IP addresses");
        let address_pool: &[&str] = if self.request.is_management_cluster {
            MANAGEMENT_IP_ADDRESS_NAMES
        } else {
            APPLICATION_IP_ADDRESS_NAMES
        };

        let mut handles = Vec::with_capacity(address_pool.len());
        for address_name in address_pool {
            let base = Arc::clone(&self.base);
            let resource_group = node_resource_group.to_string();
            let address_name = address_name.to_string();
            let region = self.request.zone.clone();
            handles.push(tokio::spawn(async move {
                let address = base
                    .create_ip_address(&resource_group, &address_name, &region)
                    .await;
                (address_name, address)
            }));
        }

        for handle in handles {
            let (address_name, address) = handle
                .await
                .map_err(|e| Error::internal(format!("IP reservation task failed: {}", e)))?;
            let address: PublicIpAddress = address?;
            let ip = address
                .properties
                .ip_address
                .ok_or_else(|| Error::internal("reserved address carries no IP"))?;
            self.result
                .lock()
                .expect("result poisoned")
                .static_ip_addresses
                .set_ip_address(&address_name, &ip);
        }
        Ok(())
    }

    /// Create the DNS entries required by a management cluster.
    async fn create_management_dns_entries(&self, resource_group_name: &str) -> Result<()> {
        let dns_cluster_root = self.base.get_cluster_name(&self.request.cluster_name);
        let zone_name = &self.request.azure_options.dns_zone_name;
        let addresses = self
            .result
            .lock()
            .expect("result poisoned")
            .static_ip_addresses
            .clone();

        let to_add = vec![
            (dns_cluster_root.clone(), addresses.ingress.clone()),
            (format!("*.{}", dns_cluster_root), addresses.ingress.clone()),
            (format!("dns.{}", dns_cluster_root), addresses.dns.clone()),
            (
                format!("vpn-server.{}", dns_cluster_root),
                addresses.vpn_server.clone(),
            ),
            (
                format!("app-dns.{}", dns_cluster_root),
                addresses.coredns_ext.clone(),
            ),
        ];
        for (record_name, ip) in to_add {
            let entry = self
                .base
                .create_dns_a_record(resource_group_name, &record_name, zone_name, &ip)
                .await?;
            let fqdn = entry.properties.fqdn.unwrap_or(record_name);
            self.base.add_to_log(format!("DNS entry created {}", fqdn));
        }

        // NS entry for endpoint resolution.
        let entry = self
            .base
            .create_dns_ns_record(
                resource_group_name,
                &format!("ep.{}.{}", dns_cluster_root, zone_name),
                &format!("app-dns.{}", dns_cluster_root),
                zone_name,
            )
            .await?;
        let fqdn = entry
            .properties
            .fqdn
            .unwrap_or_else(|| format!("ep.{}.{}", dns_cluster_root, zone_name));
        self.base.add_to_log(format!("DNS entry created {}", fqdn));
        Ok(())
    }

    /// Create the DNS entries required by an application cluster.
    async fn create_application_dns_entries(&self, resource_group_name: &str) -> Result<()> {
        let dns_cluster_root = self.base.get_cluster_name(&self.request.cluster_name);
        let zone_name = &self.request.azure_options.dns_zone_name;
        let ingress = self
            .result
            .lock()
            .expect("result poisoned")
            .static_ip_addresses
            .ingress
            .clone();

        let to_add = vec![
            (dns_cluster_root.clone(), ingress.clone()),
            (format!("*.{}", dns_cluster_root), ingress),
        ];
        for (record_name, ip) in to_add {
            let entry = self
                .base
                .create_dns_a_record(resource_group_name, &record_name, zone_name, &ip)
                .await?;
            let fqdn = entry.properties.fqdn.unwrap_or(record_name);
            self.base.add_to_log(format!("DNS entry created {}", fqdn));
        }
        Ok(())
    }

    /// Post-provision bootstrap: cert-manager, issuer, certificate and the
    /// CA secret for management clusters.
    async fn bootstrap_cluster(&self, dns_zone_resource_group: &str) -> Result<()> {
        self.cert_manager.install_cert_manager().await?;
        self.base.add_to_log("Cert manager has been installed");

        self.base.add_to_log("requesting certificate");
        self.cert_manager
            .request_certificate_issuer_on_azure(IssuerParameters {
                client_id: self.base.credentials.client_id.clone(),
                client_secret: self.base.credentials.client_secret.clone(),
                subscription_id: self.base.credentials.subscription_id.clone(),
                tenant_id: self.base.credentials.tenant_id.clone(),
                resource_group_name: dns_zone_resource_group.to_string(),
                dns_zone: self.request.azure_options.dns_zone_name.clone(),
                is_production: self.request.is_production,
            })
            .await?;
        self.base.add_to_log("certificate issuer requested");
        self.cert_manager.check_certificate_issuer().await?;
        debug!("certificate issuer available");

        self.cert_manager
            .create_certificate(
                &self.base.get_cluster_name(&self.request.cluster_name),
                &self.request.azure_options.dns_zone_name,
            )
            .await?;
        self.base.add_to_log("validating cluster certificate");
        self.cert_manager.validate_certificate().await?;

        if self.request.is_management_cluster {
            self.base.add_to_log("Adding CA certificate");
            self.cert_manager
                .create_ca_secret(self.request.is_production)
                .await?;
            self.base.add_to_log("Added CA certificate as a secret");
        }
        Ok(())
    }
}

#[async_trait]
impl InfrastructureOperation for ProvisionerOperation {
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
            cluster_name = %self.request.cluster_name,
            "executing provisioning operation"
        );
        self.base.mark_started();
        if let Err(err) = self.run().await {
            self.notify_error(err, &callback);
            return;
        }
        debug!("provisioning finished");
        self.base.mark_finished();
        callback(&self.request.request_id);
    }

    fn cancel(&self) -> Result<()> {
        Err(Error::unimplemented(
            "cancellation of provisioning operations is not supported",
        ))
    }

    fn result(&self) -> OperationResult {
        let (progress, elapsed_nanos, error_message) = self.base.result_snapshot();
        OperationResult {
            request_id: self.request.request_id.clone(),
            operation_type: OperationType::Provision,
            progress,
            elapsed_nanos,
            error_message,
            typed: TypedResult::Provision(self.result.lock().expect("result poisoned").clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;

    use super::*;
    use crate::certmngr::MockCertificateBootstrap;
    use crate::entities::AzureOptions;
    use crate::provider::azure::api::OperationFuture;
    use crate::provider::azure::model::{
        CredentialResult, CredentialResults, DnsZone, ManagedClusterProperties,
        PublicIpAddressProperties, RecordSet, RecordSetProperties, RecordType,
    };
    use crate::provider::azure::operation::tests::{test_credentials, MockApiBuilder};
    use crate::provider::azure::operation::{CREATED_BY_TAG, CREATED_BY_VALUE, DNS_ZONE_TAG};

    fn management_request() -> ProvisionRequest {
        ProvisionRequest {
            request_id: "r1".to_string(),
            organization_id: "nalej".to_string(),
            cluster_id: "Dev 01".to_string(),
            cluster_name: "Dev 01".to_string(),
            kubernetes_version: "1.13.11".to_string(),
            num_nodes: 3,
            node_type: "Standard_DS2_v2".to_string(),
            zone: "westeurope".to_string(),
            is_management_cluster: true,
            is_production: false,
            azure_options: AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: "example.tech".to_string(),
            },
        }
    }

    fn address_for(name: &str) -> &'static str {
        match name {
            INGRESS_IP_ADDRESS_NAME => "1.1.1.1",
            DNS_PUBLIC_IP_ADDRESS_NAME => "1.1.1.2",
            COREDNS_PUBLIC_IP_ADDRESS_NAME => "1.1.1.3",
            VPNSERVER_PUBLIC_IP_ADDRESS_NAME => "1.1.1.4",
            _ => panic!("unexpected address name {}", name),
        }
    }

    fn stub_cloud(expected_resource: &'static str) -> MockApiBuilder {
        let mut builder = MockApiBuilder::new();

        builder
            .clusters
            .expect_begin_create_or_update()
            .withf(move |resource_group, resource_name, parameters| {
                resource_group == "dev"
                    && resource_name == expected_resource
                    && parameters.tags.get(CREATED_BY_TAG).map(String::as_str)
                        == Some(CREATED_BY_VALUE)
                    && parameters.tags.get(DNS_ZONE_TAG).map(String::as_str)
                        == Some("example.tech")
            })
            .returning(|_, _, _| Ok(OperationFuture::default()));
        builder.clusters.expect_wait_for_cluster().returning(|_, _| {
            let mut tags = BTreeMap::new();
            tags.insert(CREATED_BY_TAG.to_string(), CREATED_BY_VALUE.to_string());
            Ok(ManagedCluster {
                name: Some("mngt-dev01".to_string()),
                location: "westeurope".to_string(),
                tags,
                properties: ManagedClusterProperties {
                    node_resource_group: Some("MC_dev_mngt-dev01_westeurope".to_string()),
                    ..ManagedClusterProperties::default()
                },
                ..ManagedCluster::default()
            })
        });
        let encoded = base64::engine::general_purpose::STANDARD.encode("apiVersion: v1\nkind: Config");
        builder
            .clusters
            .expect_list_cluster_user_credentials()
            .returning(move |_, _| {
                Ok(CredentialResults {
                    kubeconfigs: vec![CredentialResult {
                        name: "clusterUser".to_string(),
                        value: encoded.clone(),
                    }],
                })
            });

        builder
            .network
            .expect_begin_create_or_update()
            .withf(|resource_group, _, parameters| {
                resource_group == "MC_dev_mngt-dev01_westeurope"
                    && parameters.properties.public_ip_allocation_method == "Static"
                    && parameters.properties.idle_timeout_in_minutes == 4
            })
            .returning(|_, address_name, _| {
                Ok(OperationFuture {
                    monitor_url: None,
                    resource_url: format!("https://cloud.invalid/{}", address_name),
                })
            });
        builder.network.expect_wait_for_address().returning(|future, _| {
            let name = future
                .resource_url
                .rsplit('/')
                .next()
                .unwrap()
                .to_string();
            let ip = address_for(&name);
            Ok(PublicIpAddress {
                name: Some(name),
                properties: PublicIpAddressProperties {
                    ip_address: Some(ip.to_string()),
                    ..PublicIpAddressProperties::default()
                },
                ..PublicIpAddress::default()
            })
        });

        builder.dns.expect_list_zones().returning(|| {
            Ok(vec![DnsZone {
                id: "/subscriptions/sub-1/resourceGroups/dns-rg/providers/Microsoft.Network/dnszones/example.tech".to_string(),
                name: "example.tech".to_string(),
            }])
        });
        builder
    }

    fn full_bootstrap() -> MockCertificateBootstrap {
        let mut bootstrap = MockCertificateBootstrap::new();
        bootstrap
            .expect_connect()
            .withf(|kubeconfig| kubeconfig.contains("apiVersion: v1"))
            .times(1)
            .returning(|_| Ok(()));
        bootstrap
            .expect_install_cert_manager()
            .times(1)
            .returning(|| Ok(()));
        bootstrap
            .expect_request_certificate_issuer_on_azure()
            .withf(|parameters| {
                parameters.resource_group_name == "dns-rg"
                    && parameters.dns_zone == "example.tech"
                    && !parameters.is_production
            })
            .times(1)
            .returning(|_| Ok(()));
        bootstrap
            .expect_check_certificate_issuer()
            .times(1)
            .returning(|| Ok(()));
        bootstrap
            .expect_create_certificate()
            .withf(|cluster_name, dns_zone| cluster_name == "dev01" && dns_zone == "example.tech")
            .times(1)
            .returning(|_, _| Ok(()));
        bootstrap
            .expect_validate_certificate()
            .times(1)
            .returning(|| Ok(()));
        bootstrap
            .expect_create_ca_secret()
            .withf(|is_production| !is_production)
            .times(1)
            .returning(|_| Ok(()));
        bootstrap.expect_destroy().times(1).returning(|| ());
        bootstrap
    }

    #[tokio::test]
    async fn management_provision_completes_the_full_workflow() {
        let mut builder = stub_cloud("mngt-dev01");
        let created_records = Arc::new(Mutex::new(Vec::new()));
        let records = Arc::clone(&created_records);
        builder
            .dns
            .expect_create_or_update_record_set()
            .times(6)
            .returning(move |resource_group, zone, record_type, name, _| {
                assert_eq!(resource_group, "dns-rg");
                assert_eq!(zone, "example.tech");
                records
                    .lock()
                    .unwrap()
                    .push((record_type, name.to_string()));
                Ok(RecordSet {
                    name: Some(name.to_string()),
                    properties: RecordSetProperties {
                        fqdn: Some(format!("{}.example.tech.", name)),
                        ..RecordSetProperties::default()
                    },
                    ..RecordSet::default()
                })
            });

        let operation = ProvisionerOperation::with_bootstrap(
            test_credentials(),
            builder.build(),
            management_request(),
            Arc::new(full_bootstrap()),
        );

        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&callbacks);
        let callback: CompletionCallback = Arc::new(move |request_id: &str| {
            assert_eq!(request_id, "r1");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        operation.execute(callback).await;

        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(operation.progress(), TaskProgress::Finished);

        let result = operation.result();
        assert_eq!(result.progress, TaskProgress::Finished);
        assert!(result.error_message.is_empty());
        let TypedResult::Provision(provision) = result.typed else {
            panic!("expected a provision result");
        };
        assert_eq!(provision.cluster_name, "dev01");
        assert_eq!(provision.hostname, "dev01.example.tech");
        assert!(provision.raw_kube_config.contains("apiVersion: v1"));
        assert_eq!(provision.static_ip_addresses.ingress, "1.1.1.1");
        assert_eq!(provision.static_ip_addresses.dns, "1.1.1.2");
        assert_eq!(provision.static_ip_addresses.coredns_ext, "1.1.1.3");
        assert_eq!(provision.static_ip_addresses.vpn_server, "1.1.1.4");
        assert_eq!(provision.static_ip_addresses.zt_planet, "");

        let records = created_records.lock().unwrap().clone();
        let a_records: Vec<_> = records
            .iter()
            .filter(|(record_type, _)| *record_type == RecordType::A)
            .map(|(_, name)| name.clone())
            .collect();
        assert_eq!(
            a_records,
            vec!["dev01", "*.dev01", "dns.dev01", "vpn-server.dev01", "app-dns.dev01"]
        );
        let ns_records: Vec<_> = records
            .iter()
            .filter(|(record_type, _)| *record_type == RecordType::Ns)
            .map(|(_, name)| name.clone())
            .collect();
        assert_eq!(ns_records, vec!["ep.dev01.example.tech"]);

        let log = operation.log();
        for expected in [
            "Creating new cluster",
            "IP address have been reserved",
            "DNS entries have been defined",
            "Cert manager has been installed",
            "Added CA certificate as a secret",
        ] {
            assert!(
                log.iter().any(|entry| entry.contains(expected)),
                "log missing entry: {}",
                expected
            );
        }
    }

    #[tokio::test]
    async fn application_provision_reserves_the_ingress_address_only() {
        let mut builder = stub_cloud("appcluster-c-1");
        builder
            .dns
            .expect_create_or_update_record_set()
            .times(2)
            .returning(|_, _, record_type, name, _| {
                assert_eq!(record_type, RecordType::A);
                assert!(name == "dev01" || name == "*.dev01");
                Ok(RecordSet::default())
            });

        let mut bootstrap = MockCertificateBootstrap::new();
        bootstrap.expect_connect().returning(|_| Ok(()));
        bootstrap.expect_install_cert_manager().returning(|| Ok(()));
        bootstrap
            .expect_request_certificate_issuer_on_azure()
            .returning(|_| Ok(()));
        bootstrap.expect_check_certificate_issuer().returning(|| Ok(()));
        bootstrap.expect_create_certificate().returning(|_, _| Ok(()));
        bootstrap.expect_validate_certificate().returning(|| Ok(()));
        // No CA secret on application clusters.
        bootstrap.expect_create_ca_secret().times(0);
        bootstrap.expect_destroy().times(1).returning(|| ());

        let mut request = management_request();
        request.is_management_cluster = false;
        request.cluster_id = "c-1".to_string();
        let operation = ProvisionerOperation::with_bootstrap(
            test_credentials(),
            builder.build(),
            request,
            Arc::new(bootstrap),
        );

        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;
        assert_eq!(operation.progress(), TaskProgress::Finished);

        let TypedResult::Provision(provision) = operation.result().typed else {
            panic!("expected a provision result");
        };
        assert_eq!(provision.static_ip_addresses.ingress, "1.1.1.1");
        assert_eq!(provision.static_ip_addresses.dns, "");
        assert_eq!(provision.static_ip_addresses.vpn_server, "");
    }

    #[tokio::test]
    async fn cluster_creation_failure_marks_the_operation_as_error() {
        let mut builder = MockApiBuilder::new();
        builder
            .clusters
            .expect_begin_create_or_update()
            .returning(|_, _, _| Err(Error::internal("cannot create AKS cluster")));
        // No IP, DNS or bootstrap call may happen after the failure; the
        // remaining mocks carry no expectations and would panic if used.

        let operation = ProvisionerOperation::with_bootstrap(
            test_credentials(),
            builder.build(),
            management_request(),
            Arc::new(MockCertificateBootstrap::new()),
        );

        let callbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&callbacks);
        let callback: CompletionCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        operation.execute(callback).await;

        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(operation.progress(), TaskProgress::Error);
        let result = operation.result();
        assert!(result.error_message.contains("cannot create AKS cluster"));
    }

    #[tokio::test]
    async fn bootstrap_failure_still_tears_down_the_helper() {
        let mut builder = stub_cloud("mngt-dev01");
        builder
            .dns
            .expect_create_or_update_record_set()
            .returning(|_, _, _, _, _| Ok(RecordSet::default()));

        let mut bootstrap = MockCertificateBootstrap::new();
        bootstrap.expect_connect().returning(|_| Ok(()));
        bootstrap
            .expect_install_cert_manager()
            .returning(|| Err(Error::failed_precondition("cert manager configuration could not be found")));
        bootstrap.expect_destroy().times(1).returning(|| ());

        let operation = ProvisionerOperation::with_bootstrap(
            test_credentials(),
            builder.build(),
            management_request(),
            Arc::new(bootstrap),
        );
        let callback: CompletionCallback = Arc::new(|_| {});
        operation.execute(callback).await;
        assert_eq!(operation.progress(), TaskProgress::Error);
    }
}

//! Shared state and primitives for the Azure operations

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::api::AzureApi;
use super::credentials::AzureCredentials;
use super::model::{
    Application, ApplicationCreateParameters, DnsZone, ManagedCluster,
    ManagedClusterAgentPoolProfile, ManagedClusterProperties,
    ManagedClusterServicePrincipalProfile, NetworkProfile, NsRecord, PasswordCredential,
    PublicIpAddress, PublicIpAddressProperties, RecordSet, RecordSetProperties, RecordType,
    RoleAssignmentParameters, RoleAssignmentProperties, ServicePrincipal,
    ServicePrincipalCreateParameters, ARecord, POSSIBLE_VM_SIZES,
};
use crate::entities::TaskProgress;
use crate::{Error, Result};

/// Tag with the organization that created the cluster
pub const ORGANIZATION_ID_TAG: &str = "organizationID";
/// Tag with the cluster identifier assigned to the cluster
pub const CLUSTER_ID_TAG: &str = "clusterID";
/// Tag with the initial name of the cluster. Maintained for reference even
/// if the cluster is renamed.
pub const CLUSTER_NAME_TAG: &str = "clusterName";
/// Tag with the DNS zone whose entries belong to the cluster
pub const DNS_ZONE_TAG: &str = "dnsZone";
/// Tag marking the creator of a resource
pub const CREATED_BY_TAG: &str = "created-by";
/// Value of the creator tag authorizing destructive operations
pub const CREATED_BY_VALUE: &str = "Nalej";

/// Role granted to service principals managing DNS zones
pub const CONTRIBUTOR_ROLE: &str = "Contributor";

/// Operating system provisioned on agent nodes
pub const OS_TYPE: &str = "Linux";

/// Deadline for a static IP reservation to complete
pub const IP_ADDRESS_CREATE_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Number of times a retryable Azure operation is attempted. The value is
/// taken from the CLI implementation.
pub const AZURE_RETRIES: usize = 36;

const SERVICE_PRINCIPAL_RETRY_DELAY: Duration = Duration::from_secs(5);

struct OperationState {
    progress: TaskProgress,
    log: Vec<String>,
    error_msg: String,
    started: Option<Instant>,
    elapsed_nanos: i64,
}

/// Common state and primitives shared among the Azure operations.
///
/// Log and progress are guarded so pollers can read them while the
/// operation body runs.
pub struct AzureOperation {
    pub(crate) credentials: AzureCredentials,
    pub(crate) api: AzureApi,
    state: Mutex<OperationState>,
}

impl AzureOperation {
    /// Create the shared operation state for a set of credentials.
    pub fn new(credentials: AzureCredentials, api: AzureApi) -> Self {
        Self {
            credentials,
            api,
            state: Mutex::new(OperationState {
                progress: TaskProgress::Init,
                log: Vec::new(),
                error_msg: String::new(),
                started: None,
                elapsed_nanos: 0,
            }),
        }
    }

    /// Snapshot of the operation log.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().expect("operation state poisoned").log.clone()
    }

    /// Append a new entry to the operation log.
    pub fn add_to_log(&self, entry: impl Into<String>) {
        let mut state = self.state.lock().expect("operation state poisoned");
        state.log.push(entry.into());
    }

    /// Current progress of the operation.
    pub fn progress(&self) -> TaskProgress {
        self.state.lock().expect("operation state poisoned").progress
    }

    /// Set the progress of the ongoing operation.
    pub fn set_progress(&self, progress: TaskProgress) {
        let mut state = self.state.lock().expect("operation state poisoned");
        state.progress = progress;
    }

    /// Record the start of the operation body.
    pub(crate) fn mark_started(&self) {
        let mut state = self.state.lock().expect("operation state poisoned");
        state.started = Some(Instant::now());
        state.progress = TaskProgress::InProgress;
    }

    /// Record a successful completion.
    pub(crate) fn mark_finished(&self) {
        let mut state = self.state.lock().expect("operation state poisoned");
        if let Some(started) = state.started {
            state.elapsed_nanos = started.elapsed().as_nanos() as i64;
        }
        state.progress = TaskProgress::Finished;
    }

    /// Update all fields to indicate that an error occurred.
    pub(crate) fn set_error(&self, error_msg: &str) {
        let mut state = self.state.lock().expect("operation state poisoned");
        debug!(previous = %state.progress, error = error_msg, "setting error");
        if let Some(started) = state.started {
            state.elapsed_nanos = started.elapsed().as_nanos() as i64;
        }
        state.progress = TaskProgress::Error;
        state.error_msg = error_msg.to_string();
    }

    /// Snapshot of progress, elapsed time and error message for results.
    /// While the operation runs the elapsed time is computed on the fly.
    pub(crate) fn result_snapshot(&self) -> (TaskProgress, i64, String) {
        let state = self.state.lock().expect("operation state poisoned");
        let mut elapsed = state.elapsed_nanos;
        if elapsed == 0 && state.progress == TaskProgress::InProgress {
            if let Some(started) = state.started {
                elapsed = started.elapsed().as_nanos() as i64;
            }
        }
        (state.progress, elapsed, state.error_msg.clone())
    }

    /// Normalize a user-supplied cluster name into a value usable for cloud
    /// resources: lowercase, spaces removed, dots replaced with hyphens.
    pub fn get_cluster_name(&self, cluster_name: &str) -> String {
        normalize_cluster_name(cluster_name)
    }

    /// Name of the Azure resource backing a cluster.
    pub fn get_resource_name(&self, is_management: bool, cluster_id: &str) -> String {
        if is_management {
            // When installing a management cluster, the clusterID matches
            // the clusterName.
            format!("mngt-{}", self.get_cluster_name(cluster_id))
        } else {
            format!("appcluster-{}", cluster_id)
        }
    }

    /// DNS prefix for a new cluster.
    pub fn get_dns_prefix(&self, cluster_id: &str) -> String {
        format!("nalej-{}", cluster_id)
    }

    /// Resolve a node type against the set of supported VM sizes.
    pub fn get_azure_vm_size(&self, node_type: &str) -> Result<String> {
        for size in POSSIBLE_VM_SIZES {
            if *size == node_type {
                return Ok(size.to_string());
            }
        }
        warn!(node_type, "user requested an unsupported node type");
        Err(Error::not_found("invalid node type for Azure"))
    }

    /// Find a DNS zone by name among the zones of the subscription.
    pub async fn get_dns_zone(&self, zone_name: &str) -> Result<DnsZone> {
        let zones = self.api.dns.list_zones().await?;
        for zone in zones {
            if zone.name == zone_name {
                debug!(id = %zone.id, name = %zone.name, "target zone");
                return Ok(zone);
            }
        }
        Err(Error::not_found("unable to find target DNS zone on Azure"))
    }

    /// Extract the resource group name from a zone identifier.
    pub fn get_dns_resource_group_name(&self, zone: &DnsZone) -> Result<String> {
        const GROUP_MARKER: &str = "resourceGroups/";
        const PROVIDER_MARKER: &str = "/providers";
        let first = zone.id.find(GROUP_MARKER);
        let second = zone.id.find(PROVIDER_MARKER);
        match (first, second) {
            (Some(first), Some(second)) if first + GROUP_MARKER.len() <= second => {
                Ok(zone.id[first + GROUP_MARKER.len()..second].to_string())
            }
            _ => Err(Error::invalid_argument("invalid DNS zone ID")),
        }
    }

    /// Reserve a static IP address and wait until the allocation completes.
    pub async fn create_ip_address(
        &self,
        resource_group_name: &str,
        address_name: &str,
        region: &str,
    ) -> Result<PublicIpAddress> {
        let mut tags = BTreeMap::new();
        tags.insert(CREATED_BY_TAG.to_string(), CREATED_BY_VALUE.to_string());
        let parameters = PublicIpAddress {
            name: None,
            location: region.to_string(),
            tags,
            properties: PublicIpAddressProperties {
                public_ip_allocation_method: "Static".to_string(),
                // Default idle timeout of the CLI.
                idle_timeout_in_minutes: 4,
                ip_address: None,
            },
        };
        let future = self
            .api
            .network
            .begin_create_or_update(resource_group_name, address_name, parameters)
            .await?;
        let address = self
            .api
            .network
            .wait_for_address(future, IP_ADDRESS_CREATE_DEADLINE)
            .await?;
        debug!(address_name, ip = ?address.properties.ip_address, "ip address created");
        Ok(address)
    }

    /// Retrieve the kubeconfig of a cluster as text.
    pub async fn retrieve_kube_config(
        &self,
        resource_group_name: &str,
        resource_name: &str,
    ) -> Result<String> {
        self.add_to_log("retrieving kubeConfig");
        let credentials = self
            .api
            .clusters
            .list_cluster_user_credentials(resource_group_name, resource_name)
            .await?;
        if credentials.kubeconfigs.is_empty() {
            return Err(Error::internal("empty kubeconfig returned"));
        }
        if credentials.kubeconfigs.len() > 1 {
            return Err(Error::internal(
                "credentials returned more than one KubeConfig file",
            ));
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(credentials.kubeconfigs[0].value.as_bytes())
            .map_err(|e| Error::internal(format!("cannot decode kubeconfig contents: {}", e)))?;
        String::from_utf8(decoded)
            .map_err(|e| Error::internal(format!("kubeconfig is not valid UTF-8: {}", e)))
    }

    /// Create a DNS A record pointing a name at an address.
    pub async fn create_dns_a_record(
        &self,
        resource_group_name: &str,
        record_name: &str,
        dns_zone: &str,
        ip_address: &str,
    ) -> Result<RecordSet> {
        let parameters = RecordSet {
            id: None,
            name: None,
            properties: RecordSetProperties {
                ttl: 3600,
                fqdn: None,
                a_records: Some(vec![ARecord {
                    ipv4_address: ip_address.to_string(),
                }]),
                ns_records: None,
            },
        };
        debug!(resource_group_name, dns_zone, record_name, "creating entry");
        self.api
            .dns
            .create_or_update_record_set(
                resource_group_name,
                dns_zone,
                RecordType::A,
                record_name,
                parameters,
            )
            .await
    }

    /// Create a DNS NS record delegating a name to a name server.
    pub async fn create_dns_ns_record(
        &self,
        resource_group_name: &str,
        record_name: &str,
        ns_name: &str,
        dns_zone: &str,
    ) -> Result<RecordSet> {
        let parameters = RecordSet {
            id: None,
            name: None,
            properties: RecordSetProperties {
                ttl: 3600,
                fqdn: None,
                a_records: None,
                ns_records: Some(vec![NsRecord {
                    nsdname: ns_name.to_string(),
                }]),
            },
        };
        debug!(resource_group_name, dns_zone, record_name, "creating entry");
        self.api
            .dns
            .create_or_update_record_set(
                resource_group_name,
                dns_zone,
                RecordType::Ns,
                record_name,
                parameters,
            )
            .await
    }

    /// Delete a single DNS record set.
    pub async fn delete_dns_record_set(
        &self,
        resource_group_name: &str,
        record_name: &str,
        dns_zone: &str,
        record_type: RecordType,
    ) -> Result<()> {
        self.api
            .dns
            .delete_record_set(resource_group_name, dns_zone, record_type, record_name)
            .await
    }

    /// Retrieve the information of an existing cluster.
    pub async fn get_cluster_details(
        &self,
        is_management_cluster: bool,
        resource_group_name: &str,
        cluster_id: &str,
    ) -> Result<ManagedCluster> {
        let resource_name = self.get_resource_name(is_management_cluster, cluster_id);
        self.api
            .clusters
            .get_cluster(resource_group_name, &resource_name)
            .await
            .map_err(|e| Error::not_found(format!("cannot retrieve managed cluster: {}", e)))
    }

    /// Assemble the payload to create or update an AKS cluster.
    ///
    /// The DNS zone tag is only written on provisioning requests.
    #[allow(clippy::too_many_arguments)]
    pub fn get_kubernetes_create_request(
        &self,
        organization_id: &str,
        cluster_id: &str,
        cluster_name: &str,
        kubernetes_version: &str,
        num_nodes: i64,
        node_type: &str,
        zone: &str,
        dns_zone_name: Option<&str>,
    ) -> Result<ManagedCluster> {
        let mut tags = BTreeMap::new();
        tags.insert(
            ORGANIZATION_ID_TAG.to_string(),
            organization_id.to_string(),
        );
        tags.insert(CLUSTER_ID_TAG.to_string(), cluster_id.to_string());
        tags.insert(
            CLUSTER_NAME_TAG.to_string(),
            self.get_cluster_name(cluster_name),
        );
        tags.insert(CREATED_BY_TAG.to_string(), CREATED_BY_VALUE.to_string());
        if let Some(dns_zone_name) = dns_zone_name {
            tags.insert(DNS_ZONE_TAG.to_string(), dns_zone_name.to_string());
        }

        let num_nodes = i64_to_i32(num_nodes)?;
        let vm_size = self.get_azure_vm_size(node_type)?;

        let agent_profile = ManagedClusterAgentPoolProfile {
            name: "nalejpool".to_string(),
            count: num_nodes,
            vm_size,
            // Zero selects the provider default disk size.
            os_disk_size_gb: 0,
            os_type: OS_TYPE.to_string(),
            // MaxPods not set to obtain the default value.
            max_pods: None,
            enable_auto_scaling: false,
            pool_type: "AvailabilitySet".to_string(),
            orchestrator_version: kubernetes_version.to_string(),
            enable_node_public_ip: false,
            node_taints: None,
        };

        let properties = ManagedClusterProperties {
            provisioning_state: None,
            kubernetes_version: kubernetes_version.to_string(),
            dns_prefix: self.get_dns_prefix(cluster_id),
            fqdn: None,
            agent_pool_profiles: vec![agent_profile],
            service_principal_profile: Some(ManagedClusterServicePrincipalProfile {
                client_id: self.credentials.client_id.clone(),
                secret: self.credentials.client_secret.clone(),
            }),
            // NodeResourceGroup is an output value.
            node_resource_group: None,
            enable_rbac: false,
            network_profile: Some(NetworkProfile {
                network_plugin: "Kubenet".to_string(),
                load_balancer_sku: "Basic".to_string(),
            }),
        };

        Ok(ManagedCluster {
            id: None,
            name: None,
            location: zone.to_string(),
            tags,
            properties,
        })
    }

    /// Modify an existing cluster payload changing the number of nodes.
    ///
    /// Refuses clusters without the lineage tag and clusters with more than
    /// one agent pool.
    pub fn get_kubernetes_update_request(
        &self,
        mut existing_cluster: ManagedCluster,
        num_nodes: i64,
    ) -> Result<ManagedCluster> {
        match existing_cluster.tags.get(CREATED_BY_TAG) {
            Some(value) if value == CREATED_BY_VALUE => {}
            _ => {
                return Err(Error::invalid_argument(
                    "cannot manage non Nalej created clusters",
                ));
            }
        }
        if existing_cluster.properties.agent_pool_profiles.len() != 1 {
            return Err(Error::internal("expecting a single agent pool profile"));
        }
        existing_cluster.properties.agent_pool_profiles[0].count = i64_to_i32(num_nodes)?;
        Ok(existing_cluster)
    }

    /// Password credential with a one year validity for a new application.
    fn get_password_credentials_for_new_app(&self) -> Vec<PasswordCredential> {
        let start = Utc::now();
        let end = start + chrono::Duration::days(365);
        vec![PasswordCredential {
            start_date: start.to_rfc3339(),
            end_date: end.to_rfc3339(),
            key_id: Uuid::new_v4().to_string(),
            value: Uuid::new_v4().to_string(),
        }]
    }

    /// Create an application entity on the directory service.
    pub async fn create_application(&self, cluster_id: &str) -> Result<Application> {
        let time_mark = Utc::now().format("%Y%m%d-%H%M%S");
        let display_name = format!("nalej-{}-{}", cluster_id, time_mark);
        let parameters = ApplicationCreateParameters {
            display_name: display_name.clone(),
            identifier_uris: vec![format!("http://{}", display_name)],
            available_to_other_tenants: false,
            homepage: format!("https://nalej-{}", cluster_id),
            password_credentials: self.get_password_credentials_for_new_app(),
        };
        debug!(display_name = %display_name, "creating application");
        let application = self.api.directory.create_application(parameters).await?;
        debug!(app_id = %application.app_id, "application entity has been created");
        Ok(application)
    }

    /// Create a service principal associated with an application.
    ///
    /// Directory propagation is eventually consistent: creation is retried
    /// while the provider reports the application as unknown.
    pub async fn create_service_principal(
        &self,
        app_id: &str,
        _cluster_id: &str,
    ) -> Result<ServicePrincipal> {
        let parameters = ServicePrincipalCreateParameters {
            app_id: app_id.to_string(),
            account_enabled: true,
            tags: vec!["created-by-nalej".to_string()],
        };
        for retry in 0..AZURE_RETRIES {
            debug!(retry, "attempting to create sp");
            match self
                .api
                .directory
                .create_service_principal(parameters.clone())
                .await
            {
                Ok(principal) => return Ok(principal),
                Err(err) => {
                    let message = err.to_string();
                    if message.contains("does not reference") || message.contains("does not exist")
                    {
                        debug!("creation of service principal failed, retrying in 5 seconds");
                        tokio::time::sleep(SERVICE_PRINCIPAL_RETRY_DELAY).await;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
        Err(Error::internal(
            "unable to create service principal after retries",
        ))
    }

    /// Obtain the identifier of a role by name at a scope.
    pub async fn get_role_id(&self, role_name: &str, scope: &str) -> Result<String> {
        debug!(role_name, scope, "obtaining role ID");
        let roles = self.api.directory.list_role_definitions(scope).await?;
        for role in roles {
            if role.properties.role_name == role_name {
                debug!(id = %role.id, "target role found");
                return Ok(role.id);
            }
        }
        Err(Error::not_found("role not found in scope"))
    }

    /// Authorize the management of a DNS zone to a service principal.
    pub async fn authorize_dns_to_sp(&self, app_id: &str, dns_zone: &str) -> Result<()> {
        debug!(app_id, zone = dns_zone, "authorizing SP for DNS zone management");
        let zone = self.get_dns_zone(dns_zone).await?;
        let scope = zone.id;
        let role_id = self.get_role_id(CONTRIBUTOR_ROLE, &scope).await?;
        debug!(role_id = %role_id, role_name = CONTRIBUTOR_ROLE, "role ID resolved");
        let parameters = RoleAssignmentParameters {
            properties: RoleAssignmentProperties {
                role_definition_id: role_id,
                principal_id: app_id.to_string(),
            },
        };
        let assignment_name = Uuid::new_v4().to_string();
        let assignment = self
            .api
            .directory
            .create_role_assignment(&scope, &assignment_name, parameters)
            .await?;
        debug!(id = %assignment.id, "role has been assigned");
        Ok(())
    }
}

/// Normalize a cluster name: lowercase, spaces removed, dots replaced with
/// hyphens.
pub fn normalize_cluster_name(cluster_name: &str) -> String {
    cluster_name.replace(' ', "").replace('.', "-").to_lowercase()
}

fn i64_to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::internal("number of nodes is out of range"))
}

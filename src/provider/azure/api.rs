//! Capability traits over the Azure API surface
//!
//! The workflows talk to Azure exclusively through these traits, allowing
//! tests to mock the cloud while production code uses the REST client.
//! Long-running operations follow the submit-then-wait pattern: a `begin_*`
//! call returns an [`OperationFuture`] that a `wait_*` call drives to
//! completion under a bounded deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::credentials::AzureCredentials;
use super::model::{
    Application, ApplicationCreateParameters, CredentialResults, DnsZone, ManagedCluster,
    PublicIpAddress, RecordSet, RecordType, RoleAssignment, RoleAssignmentParameters,
    RoleDefinition, ServicePrincipal, ServicePrincipalCreateParameters,
};
use super::rest::ArmRestClient;
use crate::Result;

/// Tracking handle of a long-running provider operation.
///
/// On deadline expiry the caller must not assume any rollback; the
/// underlying resource may still converge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFuture {
    /// Status-monitor URL returned by the provider, if any
    pub monitor_url: Option<String>,
    /// URL of the resource being mutated
    pub resource_url: String,
}

/// Operations over AKS managed clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagedClusterService: Send + Sync {
    /// Retrieve an existing managed cluster
    async fn get_cluster(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<ManagedCluster>;

    /// Submit the creation or update of a managed cluster
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        resource_name: &str,
        parameters: ManagedCluster,
    ) -> Result<OperationFuture>;

    /// Submit the deletion of a managed cluster
    async fn begin_delete(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<OperationFuture>;

    /// Wait until a submitted create or update completes and return the
    /// resulting cluster
    async fn wait_for_cluster(
        &self,
        future: OperationFuture,
        deadline: Duration,
    ) -> Result<ManagedCluster>;

    /// Wait until a submitted deletion completes
    async fn wait_for_deletion(&self, future: OperationFuture, deadline: Duration) -> Result<()>;

    /// Retrieve the user credentials of a managed cluster
    async fn list_cluster_user_credentials(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<CredentialResults>;
}

/// Operations over public IP addresses
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PublicIpService: Send + Sync {
    /// Submit the reservation of a public IP address
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        address_name: &str,
        parameters: PublicIpAddress,
    ) -> Result<OperationFuture>;

    /// Wait until a submitted reservation completes and return the address
    async fn wait_for_address(
        &self,
        future: OperationFuture,
        deadline: Duration,
    ) -> Result<PublicIpAddress>;
}

/// Operations over DNS zones and record sets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DnsService: Send + Sync {
    /// Enumerate the DNS zones of the subscription
    async fn list_zones(&self) -> Result<Vec<DnsZone>>;

    /// Create or update a record set in a zone
    async fn create_or_update_record_set(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        record_name: &str,
        parameters: RecordSet,
    ) -> Result<RecordSet>;

    /// Delete a record set from a zone
    async fn delete_record_set(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        record_name: &str,
    ) -> Result<()>;

    /// Enumerate the record sets of a type whose names end with the given
    /// suffix
    async fn list_record_sets_by_suffix(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        name_suffix: &str,
    ) -> Result<Vec<RecordSet>>;
}

/// Operations over directory (graph) identity objects and role assignments
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Create an application entity
    async fn create_application(
        &self,
        parameters: ApplicationCreateParameters,
    ) -> Result<Application>;

    /// Create a service principal associated with an application
    async fn create_service_principal(
        &self,
        parameters: ServicePrincipalCreateParameters,
    ) -> Result<ServicePrincipal>;

    /// Enumerate the role definitions visible at a scope
    async fn list_role_definitions(&self, scope: &str) -> Result<Vec<RoleDefinition>>;

    /// Assign a role to a principal at a scope
    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_name: &str,
        parameters: RoleAssignmentParameters,
    ) -> Result<RoleAssignment>;
}

/// Handles to the Azure API surface used by the operations
#[derive(Clone)]
pub struct AzureApi {
    /// Managed cluster operations
    pub clusters: Arc<dyn ManagedClusterService>,
    /// Public IP operations
    pub network: Arc<dyn PublicIpService>,
    /// DNS operations
    pub dns: Arc<dyn DnsService>,
    /// Directory operations
    pub directory: Arc<dyn DirectoryService>,
}

impl AzureApi {
    /// Build the API handles backed by the REST client.
    ///
    /// Fails only on credential preparation problems; tokens themselves are
    /// acquired lazily on first use.
    pub fn connect(credentials: &AzureCredentials) -> Result<Self> {
        let client = Arc::new(ArmRestClient::new(credentials.clone())?);
        Ok(Self {
            clusters: client.clone(),
            network: client.clone(),
            dns: client.clone(),
            directory: client,
        })
    }
}

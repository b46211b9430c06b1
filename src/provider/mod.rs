//! Infrastructure provider abstraction layer
//!
//! The [`InfrastructureProvider`] trait is the seam between the requests
//! sent by the user and the specifics of how each operation is performed on
//! a given platform. Providers build ready-to-schedule operations.

pub mod azure;

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::entities::{
    DecommissionRequest, InfrastructureOperation, ManagementRequest, Platform, ProvisionRequest,
    ScaleRequest,
};
use crate::provider::azure::{AzureCredentials, AzureInfrastructureProvider};
use crate::{Error, Result};

/// Operations a cloud or baremetal infrastructure provider must support.
///
/// Each factory may fail synchronously only on credential preparation
/// errors; everything else surfaces through the returned operation.
pub trait InfrastructureProvider: Send + Sync {
    /// Create an operation to provision a new cluster
    fn provision(&self, request: ProvisionRequest) -> Result<Arc<dyn InfrastructureOperation>>;

    /// Create an operation to scale a cluster
    fn scale(&self, request: ScaleRequest) -> Result<Arc<dyn InfrastructureOperation>>;

    /// Create an operation to decommission a cluster
    fn decommission(
        &self,
        request: DecommissionRequest,
    ) -> Result<Arc<dyn InfrastructureOperation>>;

    /// Create an operation to retrieve the kubeconfig of a cluster
    fn get_kube_config(
        &self,
        request: ManagementRequest,
    ) -> Result<Arc<dyn InfrastructureOperation>>;
}

/// Create a provider for a given target platform. Extra parameters are
/// optional depending on the type of provider to be created.
pub fn new_infrastructure_provider(
    target_platform: Platform,
    azure_credentials: Option<&AzureCredentials>,
    config: &Config,
) -> Result<Box<dyn InfrastructureProvider>> {
    match target_platform {
        Platform::Azure => {
            let credentials = azure_credentials.ok_or_else(|| {
                Error::invalid_argument("azure_credentials must be set when type is Azure")
            })?;
            let provider =
                AzureInfrastructureProvider::new(credentials.clone(), config.clone())?;
            Ok(Box::new(provider))
        }
        other => {
            debug!(target_platform = %other, "unsupported target platform for creating a provider");
            Err(Error::unimplemented(format!(
                "unsupported target platform for creating a provider [{}]",
                other
            )))
        }
    }
}

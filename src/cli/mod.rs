//! CLI front-ends driving operations without the API service
//!
//! Each driver builds the operation through the provider, schedules it on
//! the executor and polls it every fifteen seconds, printing newly appended
//! log entries while the operation runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::entities::{
    ClusterRequest, DecommissionClusterRequest, DecommissionRequest, InfrastructureOperation,
    ManagementRequest, OperationResult, ProvisionClusterRequest, ProvisionRequest,
    ScaleClusterRequest, ScaleRequest, TaskProgress, TypedResult,
};
use crate::executor::Executor;
use crate::provider::new_infrastructure_provider;
use crate::{Error, Result};

/// Interval between progress checks of a CLI managed operation
pub const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Shared behavior of the CLI drivers: incremental log printing and
/// kubeconfig output.
struct CliCommon {
    last_log_entry: usize,
    kube_config_output_path: PathBuf,
}

impl CliCommon {
    fn new(kube_config_output_path: &str) -> Self {
        Self {
            last_log_entry: 0,
            kube_config_output_path: PathBuf::from(kube_config_output_path),
        }
    }

    /// Print the log entries appended since the last check.
    fn print_operation_log(&mut self, log_pool: &[String]) {
        for entry in &log_pool[self.last_log_entry.min(log_pool.len())..] {
            info!("{}", entry);
        }
        self.last_log_entry = log_pool.len();
    }

    /// Write the resulting kubeconfig to `<output>/<clusterName>.yaml` with
    /// owner-only permissions.
    fn write_kube_config(&self, cluster_name: &str, raw_kube_config: &str) -> Result<PathBuf> {
        let file_path = self
            .kube_config_output_path
            .join(format!("{}.yaml", cluster_name));
        write_restricted(&file_path, raw_kube_config)?;
        Ok(file_path)
    }

    /// Poll the executor until the operation leaves it, surfacing log
    /// entries as they become available.
    async fn watch_operation(
        &mut self,
        executor: &Arc<Executor>,
        operation: &Arc<dyn InfrastructureOperation>,
        kind: &str,
    ) {
        let start = Instant::now();
        let mut checks: u32 = 0;
        while executor.is_managed(&operation.request_id()) {
            tokio::time::sleep(OPERATION_POLL_INTERVAL).await;
            self.print_operation_log(&operation.log());
            if checks % 4 == 0 {
                println!(
                    "{} operation {} - {:?}",
                    kind,
                    operation.progress(),
                    start.elapsed()
                );
            }
            checks += 1;
        }
        self.print_operation_log(&operation.log());
        println!("{} took {:?}", kind, start.elapsed());
    }
}

fn write_restricted(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .map_err(|e| Error::internal(format!("cannot write kubeConfig: {}", e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::internal(format!("cannot restrict kubeConfig: {}", e)))?;
    }
    Ok(())
}

fn check_result(result: &OperationResult) -> Result<()> {
    if result.progress == TaskProgress::Error {
        return Err(Error::internal(result.error_message.clone()));
    }
    Ok(())
}

/// CLI driver watching a provisioning operation
pub struct CliProvisioner {
    request: ProvisionClusterRequest,
    executor: Arc<Executor>,
    common: CliCommon,
    config: Config,
}

impl CliProvisioner {
    /// Create a CLI managed provisioner without a service.
    pub fn new(
        request: ProvisionClusterRequest,
        kube_config_output_path: &str,
        config: Config,
    ) -> Self {
        Self {
            request,
            executor: Executor::global(),
            common: CliCommon::new(kube_config_output_path),
            config,
        }
    }

    /// Trigger the provisioning of a cluster and wait for its completion.
    pub async fn run(mut self) -> Result<()> {
        self.config.validate()?;
        self.config.print();
        debug!(
            target_platform = %self.request.target_platform,
            is_production = self.request.is_production,
            "Provision request received"
        );
        let provider = new_infrastructure_provider(
            self.request.target_platform,
            self.request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.provision(ProvisionRequest::from(&self.request))?;
        self.executor.schedule_operation(Arc::clone(&operation));
        self.common
            .watch_operation(&self.executor, &operation, "Provision")
            .await;

        let result = operation.result();
        check_result(&result)?;
        let TypedResult::Provision(provision) = &result.typed else {
            return Err(Error::internal("expecting provisioning result"));
        };
        let kube_config_path = self
            .common
            .write_kube_config(&provision.cluster_name, &provision.raw_kube_config)?;
        info!(
            request_id = %result.request_id,
            kubeconfig = %kube_config_path.display(),
            hostname = %provision.hostname,
            ingress_ip = %provision.static_ip_addresses.ingress,
            dns_ip = %provision.static_ip_addresses.dns,
            coredns_ip = %provision.static_ip_addresses.coredns_ext,
            vpnserver_ip = %provision.static_ip_addresses.vpn_server,
            "Finished provision operation"
        );
        Ok(())
    }
}

/// CLI driver watching a scaling operation
pub struct CliScaler {
    request: ScaleClusterRequest,
    executor: Arc<Executor>,
    common: CliCommon,
    config: Config,
}

impl CliScaler {
    /// Create a CLI managed scaler without a service.
    pub fn new(request: ScaleClusterRequest, config: Config) -> Self {
        Self {
            request,
            executor: Executor::global(),
            common: CliCommon::new("/tmp/"),
            config,
        }
    }

    /// Trigger the scaling of a cluster and wait for its completion.
    pub async fn run(mut self) -> Result<()> {
        self.config.validate()?;
        self.config.print();
        let provider = new_infrastructure_provider(
            self.request.target_platform,
            self.request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.scale(ScaleRequest::from(&self.request))?;
        self.executor.schedule_operation(Arc::clone(&operation));
        self.common
            .watch_operation(&self.executor, &operation, "Scale")
            .await;

        let result = operation.result();
        check_result(&result)?;
        info!(request_id = %result.request_id, "Finished scale operation");
        Ok(())
    }
}

/// CLI driver watching a decommission operation
pub struct CliDecommissioner {
    request: DecommissionClusterRequest,
    executor: Arc<Executor>,
    common: CliCommon,
    config: Config,
}

impl CliDecommissioner {
    /// Create a CLI managed decommissioner without a service.
    pub fn new(request: DecommissionClusterRequest, config: Config) -> Self {
        Self {
            request,
            executor: Executor::global(),
            common: CliCommon::new("/tmp/"),
            config,
        }
    }

    /// Trigger the decommission of a cluster and wait for its completion.
    pub async fn run(mut self) -> Result<()> {
        self.config.validate()?;
        self.config.print();
        let provider = new_infrastructure_provider(
            self.request.target_platform,
            self.request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.decommission(DecommissionRequest::from(&self.request))?;
        self.executor.schedule_operation(Arc::clone(&operation));
        self.common
            .watch_operation(&self.executor, &operation, "Decommission")
            .await;

        let result = operation.result();
        check_result(&result)?;
        info!(request_id = %result.request_id, "Finished decommission operation");
        Ok(())
    }
}

/// CLI driver retrieving the kubeconfig of an existing cluster
pub struct CliManagement {
    request: ClusterRequest,
    common: CliCommon,
    config: Config,
}

impl CliManagement {
    /// Create a CLI managed kubeconfig retrieval without a service.
    pub fn new(request: ClusterRequest, kube_config_output_path: &str, config: Config) -> Self {
        Self {
            request,
            common: CliCommon::new(kube_config_output_path),
            config,
        }
    }

    /// Retrieve the kubeconfig and write it next to the other outputs.
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        self.config.print();
        let provider = new_infrastructure_provider(
            self.request.target_platform,
            self.request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.get_kube_config(ManagementRequest::from(&self.request))?;

        // Management operations are bounded in duration, so they run to
        // completion without the executor.
        let callback: crate::entities::CompletionCallback = Arc::new(|request_id: &str| {
            debug!(request_id, "management operation finished");
        });
        operation.set_progress(TaskProgress::InProgress);
        operation.execute(callback).await;

        let result = operation.result();
        check_result(&result)?;
        let TypedResult::Management(management) = &result.typed else {
            return Err(Error::internal("expecting management result"));
        };
        let kube_config_path = self
            .common
            .write_kube_config(&self.request.cluster_id, &management.raw_kube_config)?;
        info!(kubeconfig = %kube_config_path.display(), "KubeConfig retrieved");
        Ok(())
    }
}

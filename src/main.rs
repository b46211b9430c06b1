//! Command line entry point for the cluster provisioner

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use cluster_provisioner::cli::{CliDecommissioner, CliManagement, CliProvisioner, CliScaler};
use cluster_provisioner::config::Config;
use cluster_provisioner::entities::{
    ClusterRequest, DecommissionClusterRequest, Platform, ProvisionClusterRequest,
    ScaleClusterRequest,
};
use cluster_provisioner::provider::azure::AzureCredentials;
use cluster_provisioner::service::Service;
use cluster_provisioner::{Error, Result};

/// Lifecycle operations for managed Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "cluster-provisioner", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision a new cluster using a specific infrastructure provider
    Provision(ProvisionArgs),
    /// Scale an existing cluster
    Scale(ScaleArgs),
    /// Decommission an existing cluster and its DNS entries
    Decommission(DecommissionArgs),
    /// Management operations over existing clusters
    Management {
        #[command(subcommand)]
        command: ManagementCommands,
    },
    /// Launch the API service
    Server(ServerArgs),
}

#[derive(Subcommand, Debug)]
enum ManagementCommands {
    /// Retrieve the kubeconfig of an existing cluster
    Kubeconfig(ManagementArgs),
}

#[derive(Args, Debug)]
struct PlatformArgs {
    /// Target platform determining the provider: AZURE or BAREMETAL
    #[arg(long)]
    platform: String,
    /// Path to the file containing the azure credentials
    #[arg(long = "azureCredentialsPath", default_value = "")]
    azure_credentials_path: String,
    /// Target resource group. Only for the Azure platform.
    #[arg(long = "resourceGroup", default_value = "")]
    resource_group: String,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// Directory where temporal files may be created
    #[arg(long = "tempPath", default_value = "/tmp/")]
    temp_path: String,
    /// Directory with the YAML resources required by some operations
    #[arg(long = "resourcesPath", default_value = "./resources")]
    resources_path: String,
}

#[derive(Args, Debug)]
struct ProvisionArgs {
    /// Name of the cluster
    #[arg(long)]
    name: String,
    /// Kubernetes version to be installed. The available versions depend on
    /// the target platform.
    #[arg(long = "kubernetesVersion", default_value = "1.13.11")]
    kubernetes_version: String,
    /// Number of nodes in the cluster
    #[arg(long = "numNodes", default_value_t = 3)]
    num_nodes: i64,
    /// Type of node to be requested
    #[arg(long = "nodeType")]
    node_type: String,
    /// Zone where the cluster must be created
    #[arg(long, default_value = "")]
    zone: String,
    /// Name of the DNS zone where the entries will be added
    #[arg(long = "dnsZoneName", default_value = "")]
    dns_zone_name: String,
    /// Whether the provisioning is for a production cluster
    #[arg(long = "isProduction")]
    is_production: bool,
    /// Path where the kubeconfig file is stored after provisioning
    #[arg(long = "kubeConfigOutputPath", default_value = "/tmp/")]
    kube_config_output_path: String,
    #[command(flatten)]
    platform: PlatformArgs,
    #[command(flatten)]
    paths: PathArgs,
}

#[derive(Args, Debug)]
struct ScaleArgs {
    /// Name of the cluster
    #[arg(long)]
    name: String,
    /// Target number of nodes in the cluster
    #[arg(long = "numNodes")]
    num_nodes: i64,
    #[command(flatten)]
    platform: PlatformArgs,
    #[command(flatten)]
    paths: PathArgs,
}

#[derive(Args, Debug)]
struct DecommissionArgs {
    /// Name of the cluster
    #[arg(long)]
    name: String,
    #[command(flatten)]
    platform: PlatformArgs,
    #[command(flatten)]
    paths: PathArgs,
}

#[derive(Args, Debug)]
struct ManagementArgs {
    /// Name of the cluster
    #[arg(long)]
    name: String,
    /// Target an application cluster instead of a management cluster
    #[arg(long = "appCluster")]
    app_cluster: bool,
    /// Path where the kubeconfig file is stored
    #[arg(long = "kubeConfigOutputPath", default_value = "/tmp/")]
    kube_config_output_path: String,
    #[command(flatten)]
    platform: PlatformArgs,
    #[command(flatten)]
    paths: PathArgs,
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Port where the API service listens
    #[arg(long, default_value_t = 8930)]
    port: u16,
    #[command(flatten)]
    paths: PathArgs,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "cluster_provisioner=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Resolve the platform and load credentials when the platform needs them.
fn platform_options(args: &PlatformArgs) -> Result<(Platform, Option<AzureCredentials>)> {
    let platform: Platform = args.platform.parse()?;
    if platform != Platform::Azure {
        return Ok((platform, None));
    }
    if args.azure_credentials_path.is_empty() {
        return Err(Error::invalid_argument("azureCredentialsPath must be specified"));
    }
    if args.resource_group.is_empty() {
        return Err(Error::invalid_argument("resourceGroup must be specified"));
    }
    let credentials = AzureCredentials::from_file(&args.azure_credentials_path)?;
    Ok((platform, Some(credentials)))
}

fn cli_config(paths: &PathArgs, debug: bool) -> Config {
    Config {
        launch_service: false,
        debug,
        temp_path: paths.temp_path.clone(),
        resources_path: paths.resources_path.clone(),
        ..Config::default()
    }
}

async fn provision(args: ProvisionArgs, debug: bool) -> Result<()> {
    let (target_platform, azure_credentials) = platform_options(&args.platform)?;
    if target_platform == Platform::Azure && args.dns_zone_name.is_empty() {
        return Err(Error::invalid_argument("dnsZoneName must be specified"));
    }
    let request = ProvisionClusterRequest {
        request_id: format!("cli-provision-{}", Uuid::new_v4()),
        organization_id: "nalej".to_string(),
        // The clusterID matches the clusterName on clusters created from
        // the CLI.
        cluster_id: args.name.clone(),
        cluster_name: args.name,
        kubernetes_version: args.kubernetes_version,
        num_nodes: args.num_nodes,
        node_type: args.node_type,
        zone: args.zone,
        // Only management clusters may be provisioned from the CLI.
        is_management_cluster: true,
        is_production: args.is_production,
        target_platform,
        azure_credentials,
        azure_options: Some(cluster_provisioner::entities::AzureOptions {
            resource_group: args.platform.resource_group.clone(),
            dns_zone_name: args.dns_zone_name,
        }),
    };
    let config = cli_config(&args.paths, debug);
    CliProvisioner::new(request, &args.kube_config_output_path, config)
        .run()
        .await
}

async fn scale(args: ScaleArgs, debug: bool) -> Result<()> {
    let (target_platform, azure_credentials) = platform_options(&args.platform)?;
    let request = ScaleClusterRequest {
        request_id: format!("cli-scale-{}", Uuid::new_v4()),
        organization_id: "nalej".to_string(),
        cluster_id: args.name,
        num_nodes: args.num_nodes,
        // Only management clusters may be scaled from the CLI.
        is_management_cluster: true,
        target_platform,
        azure_credentials,
        azure_options: Some(cluster_provisioner::entities::AzureOptions {
            resource_group: args.platform.resource_group.clone(),
            dns_zone_name: String::new(),
        }),
    };
    let config = cli_config(&args.paths, debug);
    CliScaler::new(request, config).run().await
}

async fn decommission(args: DecommissionArgs, debug: bool) -> Result<()> {
    let (target_platform, azure_credentials) = platform_options(&args.platform)?;
    let request = DecommissionClusterRequest {
        request_id: format!("cli-decommission-{}", Uuid::new_v4()),
        organization_id: "nalej".to_string(),
        cluster_id: args.name,
        // Only management clusters may be decommissioned from the CLI.
        is_management_cluster: true,
        target_platform,
        azure_credentials,
        azure_options: Some(cluster_provisioner::entities::AzureOptions {
            resource_group: args.platform.resource_group.clone(),
            dns_zone_name: String::new(),
        }),
    };
    let config = cli_config(&args.paths, debug);
    CliDecommissioner::new(request, config).run().await
}

async fn management_kubeconfig(args: ManagementArgs, debug: bool) -> Result<()> {
    let (target_platform, azure_credentials) = platform_options(&args.platform)?;
    let request = ClusterRequest {
        request_id: format!("cli-management-{}", Uuid::new_v4()),
        organization_id: "nalej".to_string(),
        cluster_id: args.name,
        is_management_cluster: !args.app_cluster,
        target_platform,
        azure_credentials,
        azure_options: Some(cluster_provisioner::entities::AzureOptions {
            resource_group: args.platform.resource_group.clone(),
            dns_zone_name: String::new(),
        }),
    };
    let config = cli_config(&args.paths, debug);
    CliManagement::new(request, &args.kube_config_output_path, config)
        .run()
        .await
}

async fn server(args: ServerArgs, debug: bool) -> Result<()> {
    let config = Config {
        launch_service: true,
        debug,
        port: args.port,
        temp_path: args.paths.temp_path.clone(),
        resources_path: args.paths.resources_path.clone(),
    };
    Service::new(config).run().await
}

async fn run(cli: Cli) -> Result<()> {
    let debug = cli.debug;
    match cli.command {
        Commands::Provision(args) => provision(args, debug).await,
        Commands::Scale(args) => scale(args, debug).await,
        Commands::Decommission(args) => decommission(args, debug).await,
        Commands::Management {
            command: ManagementCommands::Kubeconfig(args),
        } => management_kubeconfig(args, debug).await,
        Commands::Server(args) => server(args, debug).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(1)
        }
    }
}

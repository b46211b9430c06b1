//! Certificate bootstrap for freshly provisioned clusters
//!
//! Installs cert-manager from its multi-document YAML, creates the
//! templated ClusterIssuer and Certificate resources, checks their
//! readiness and publishes the CA secret for management clusters. The
//! kubeconfig of the new cluster is spilled to a temporal file because the
//! client library takes a path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::config::Config;
use crate::k8s::{split_yaml_documents, KubernetesClient};
use crate::{Error, Result};

/// Name used by both the Certificate resource and the Secret for the TLS
/// client certificate
pub const CLIENT_CERTIFICATE: &str = "tls-client-certificate";

/// Name used by the Secret resource for the TLS CA certificate
pub const CA_CERTIFICATE: &str = "ca-certificate";

/// File with the cert-manager configuration
pub const CERT_MANAGER_YAML_FILE: &str = "cert-manager.yaml";

/// File with the cert-completer configuration
pub const CERT_COMPLETER_YAML_FILE: &str = "cert-completer.yaml";

/// Let's Encrypt directory for production accounts
pub const PRODUCTION_LETS_ENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// CA certificate file for the Let's Encrypt production environment
pub const PRODUCTION_LETS_ENCRYPT_CA: &str = "letsencrypt_prod.pem";

/// Let's Encrypt directory for staging accounts
pub const STAGING_LETS_ENCRYPT_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// CA certificate file for the Let's Encrypt staging environment
pub const STAGING_LETS_ENCRYPT_CA: &str = "letsencrypt_staging.pem";

/// Namespace where cert-manager lives
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

/// Namespace where the platform components live
pub const PLATFORM_NAMESPACE: &str = "nalej";

const CRD_GROUP: &str = "certmanager.k8s.io";
const CRD_VERSION: &str = "v1alpha1";
const ISSUER_STATUS_PATH: &[&str] = &["status", "conditions", "0", "reason"];

const CERT_COMPLETER_DEPLOYMENT: &str = "cert-completer-controller-manager";
const CERT_COMPLETER_CHECK_INTERVAL: Duration = Duration::from_secs(20);
const CERT_COMPLETER_READY_TIMEOUT: Duration = Duration::from_secs(3 * 60);

const AZURE_CERTIFICATE_ISSUER_TEMPLATE: &str = r#"
apiVersion: certmanager.k8s.io/v1alpha1
kind: ClusterIssuer
metadata:
  name: letsencrypt
spec:
  acme:
    server: {{ lets_encrypt_url }}
    email: jarvis@nalej.com
    privateKeySecretRef:
      name: letsencrypt
    dns01:
      providers:
        - name: azuredns
          azuredns:
            clientID: {{ client_id }}
            clientSecretSecretRef:
              name: k8s-service-principal
              key: client-secret
            subscriptionID: {{ subscription_id }}
            tenantID: {{ tenant_id }}
            resourceGroupName: {{ resource_group_name }}
            hostedZoneName: {{ dns_zone }}
"#;

const CERTIFICATE_TEMPLATE: &str = r#"
apiVersion: certmanager.k8s.io/v1alpha1
kind: Certificate
metadata:
  name: {{ certificate_name }}
  namespace: nalej
spec:
  secretName: {{ certificate_name }}
  issuerRef:
    name: letsencrypt
    kind: ClusterIssuer
  dnsNames:
    - '*.{{ cluster_name }}.{{ dns_zone }}'
  acme:
    config:
      - dns01:
          provider: azuredns
        domains:
          - '*.{{ cluster_name }}.{{ dns_zone }}'
"#;

/// Parameters of an ACME issuer backed by Azure DNS
#[derive(Debug, Clone)]
pub struct IssuerParameters {
    /// Service principal client identifier
    pub client_id: String,
    /// Service principal secret
    pub client_secret: String,
    /// Subscription owning the DNS zone
    pub subscription_id: String,
    /// Tenant of the service principal
    pub tenant_id: String,
    /// Resource group of the DNS zone
    pub resource_group_name: String,
    /// Name of the DNS zone
    pub dns_zone: String,
    /// Whether the production Let's Encrypt environment is used
    pub is_production: bool,
}

/// Certificate bootstrap steps run after a cluster has been provisioned
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertificateBootstrap: Send + Sync {
    /// Establish the connection with the target cluster
    async fn connect(&self, raw_kube_config: &str) -> Result<()>;

    /// Install cert-manager on the connected cluster
    async fn install_cert_manager(&self) -> Result<()>;

    /// Create the service principal secret and the ClusterIssuer
    async fn request_certificate_issuer_on_azure(&self, parameters: IssuerParameters)
        -> Result<()>;

    /// Wait for the issuer to register its ACME account
    async fn check_certificate_issuer(&self) -> Result<()>;

    /// Request the TLS client certificate for a cluster
    async fn create_certificate(&self, cluster_name: &str, dns_zone: &str) -> Result<()>;

    /// Wait for the certificate to be issued
    async fn validate_certificate(&self) -> Result<()>;

    /// Publish the CA certificate as a secret
    async fn create_ca_secret(&self, is_production: bool) -> Result<()>;

    /// Clean up the temporal structures of the helper
    async fn destroy(&self);
}

struct Connection {
    kubernetes: KubernetesClient,
    kubeconfig_path: PathBuf,
}

/// Installs the certificate manager on a freshly provisioned cluster
pub struct CertManagerHelper {
    config: Config,
    connection: Mutex<Option<Connection>>,
}

impl CertManagerHelper {
    /// Create a helper bound to the process configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    async fn kubernetes(&self) -> Result<KubernetesClient> {
        let guard = self.connection.lock().await;
        guard
            .as_ref()
            .map(|connection| connection.kubernetes.clone())
            .ok_or_else(|| Error::failed_precondition("not connected to the target cluster"))
    }
}

#[async_trait]
impl CertificateBootstrap for CertManagerHelper {
    async fn connect(&self, raw_kube_config: &str) -> Result<()> {
        let kubeconfig_path = write_temp_kubeconfig(&self.config.temp_path, raw_kube_config)?;
        let kubernetes = KubernetesClient::from_kubeconfig(&kubeconfig_path).await?;
        let mut guard = self.connection.lock().await;
        *guard = Some(Connection {
            kubernetes,
            kubeconfig_path,
        });
        Ok(())
    }

    async fn install_cert_manager(&self) -> Result<()> {
        let kubernetes = self.kubernetes().await?;
        let file_path = Path::new(&self.config.resources_path).join(CERT_MANAGER_YAML_FILE);
        if !file_path.exists() {
            error!(path = %file_path.display(), "cert manager configuration could not be found");
            return Err(Error::failed_precondition(
                "cert manager configuration could not be found",
            ));
        }
        let content = tokio::fs::read_to_string(&file_path)
            .await
            .map_err(|e| Error::internal(format!("error reading cert-manager configuration file: {}", e)))?;
        let chunks = split_yaml_documents(&content);
        debug!(chunks = chunks.len(), "number of chunks in the file");
        for chunk in &chunks {
            kubernetes.apply_manifest(chunk).await?;
        }
        Ok(())
    }

    async fn request_certificate_issuer_on_azure(
        &self,
        parameters: IssuerParameters,
    ) -> Result<()> {
        let kubernetes = self.kubernetes().await?;

        // First the secret the issuer validates against, then the issuer
        // that consumes it.
        let mut data = BTreeMap::new();
        data.insert(
            "client-secret".to_string(),
            parameters.client_secret.clone().into_bytes(),
        );
        kubernetes
            .create_opaque_secret(CERT_MANAGER_NAMESPACE, "k8s-service-principal", data)
            .await?;

        let lets_encrypt_url = if parameters.is_production {
            PRODUCTION_LETS_ENCRYPT_URL
        } else {
            STAGING_LETS_ENCRYPT_URL
        };
        let manifest = render_issuer_manifest(lets_encrypt_url, &parameters)?;
        kubernetes.apply_manifest(&manifest).await
    }

    async fn check_certificate_issuer(&self) -> Result<()> {
        let kubernetes = self.kubernetes().await?;
        let issued = kubernetes
            .match_crd_status(
                None,
                CRD_GROUP,
                CRD_VERSION,
                "clusterissuers",
                "letsencrypt",
                ISSUER_STATUS_PATH,
                "ACMEAccountRegistered",
            )
            .await?;
        debug!(issued, "certificate issuer");
        if !issued {
            return Err(Error::failed_precondition(
                "invalid state for certificate issuer",
            ));
        }
        Ok(())
    }

    async fn create_certificate(&self, cluster_name: &str, dns_zone: &str) -> Result<()> {
        let kubernetes = self.kubernetes().await?;
        kubernetes
            .create_namespace_if_not_exists(PLATFORM_NAMESPACE)
            .await?;
        let manifest = render_certificate_manifest(cluster_name, dns_zone)?;
        kubernetes.apply_manifest(&manifest).await
    }

    async fn validate_certificate(&self) -> Result<()> {
        let kubernetes = self.kubernetes().await?;
        let issued = kubernetes
            .match_crd_status(
                Some(PLATFORM_NAMESPACE),
                CRD_GROUP,
                CRD_VERSION,
                "certificates",
                CLIENT_CERTIFICATE,
                ISSUER_STATUS_PATH,
                "Ready",
            )
            .await?;
        debug!(issued, "cluster certificate");
        if !issued {
            return Err(Error::failed_precondition(
                "invalid state for cluster certificate",
            ));
        }
        Ok(())
    }

    async fn create_ca_secret(&self, is_production: bool) -> Result<()> {
        let kubernetes = self.kubernetes().await?;
        let ca_path = ca_file_path(&self.config.resources_path, is_production);
        let ca_contents = tokio::fs::read(&ca_path)
            .await
            .map_err(|e| Error::internal(format!("cannot read CA certificate file: {}", e)))?;
        kubernetes
            .create_namespace_if_not_exists(PLATFORM_NAMESPACE)
            .await?;
        let mut data = BTreeMap::new();
        data.insert("ca.crt".to_string(), ca_contents);
        kubernetes
            .create_opaque_secret(PLATFORM_NAMESPACE, CA_CERTIFICATE, data)
            .await
    }

    async fn destroy(&self) {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.take() {
            remove_temp_file(&connection.kubeconfig_path);
        }
    }
}

/// Installs the cert-completer workaround that fills the `ca.crt` field in
/// secrets generated with ACME. Standalone helper, not part of the
/// provision path.
pub struct CertCompleterHelper {
    config: Config,
    connection: Mutex<Option<Connection>>,
}

impl CertCompleterHelper {
    /// Create a helper bound to the process configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Establish the connection with the target cluster.
    pub async fn connect(&self, raw_kube_config: &str) -> Result<()> {
        let kubeconfig_path = write_temp_kubeconfig(&self.config.temp_path, raw_kube_config)?;
        let kubernetes = KubernetesClient::from_kubeconfig(&kubeconfig_path).await?;
        let mut guard = self.connection.lock().await;
        *guard = Some(Connection {
            kubernetes,
            kubeconfig_path,
        });
        Ok(())
    }

    /// Apply the cert-completer configuration chunk by chunk and wait for
    /// its controller deployment to become available.
    pub async fn install_cert_completer(&self) -> Result<()> {
        let kubernetes = {
            let guard = self.connection.lock().await;
            guard
                .as_ref()
                .map(|connection| connection.kubernetes.clone())
                .ok_or_else(|| Error::failed_precondition("not connected to the target cluster"))?
        };
        let file_path = Path::new(&self.config.resources_path).join(CERT_COMPLETER_YAML_FILE);
        if !file_path.exists() {
            return Err(Error::failed_precondition(
                "cert completer configuration could not be found",
            ));
        }
        let content = tokio::fs::read_to_string(&file_path)
            .await
            .map_err(|e| {
                Error::internal(format!("error reading cert-completer configuration file: {}", e))
            })?;
        for chunk in split_yaml_documents(&content) {
            kubernetes.apply_manifest(&chunk).await?;
        }
        info!("waiting for cert-completer to be up and ready...");
        kubernetes
            .wait_crd_status(
                Some("default"),
                "apps",
                "v1",
                "deployments",
                CERT_COMPLETER_DEPLOYMENT,
                &["status", "conditions", "0", "type"],
                "Available",
                CERT_COMPLETER_CHECK_INTERVAL,
                CERT_COMPLETER_READY_TIMEOUT,
            )
            .await
    }

    /// Clean up the temporal structures of the helper.
    pub async fn destroy(&self) {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.take() {
            remove_temp_file(&connection.kubeconfig_path);
        }
    }
}

fn render_issuer_manifest(lets_encrypt_url: &str, parameters: &IssuerParameters) -> Result<String> {
    let env = minijinja::Environment::new();
    env.render_str(
        AZURE_CERTIFICATE_ISSUER_TEMPLATE,
        minijinja::context! {
            lets_encrypt_url => lets_encrypt_url,
            client_id => parameters.client_id,
            subscription_id => parameters.subscription_id,
            tenant_id => parameters.tenant_id,
            resource_group_name => parameters.resource_group_name,
            dns_zone => parameters.dns_zone,
        },
    )
    .map_err(|e| Error::internal(format!("cannot render issuer manifest: {}", e)))
}

fn render_certificate_manifest(cluster_name: &str, dns_zone: &str) -> Result<String> {
    let env = minijinja::Environment::new();
    env.render_str(
        CERTIFICATE_TEMPLATE,
        minijinja::context! {
            certificate_name => CLIENT_CERTIFICATE,
            cluster_name => cluster_name,
            dns_zone => dns_zone,
        },
    )
    .map_err(|e| Error::internal(format!("cannot render certificate manifest: {}", e)))
}

fn ca_file_path(resources_path: &str, is_production: bool) -> PathBuf {
    let file_name = if is_production {
        PRODUCTION_LETS_ENCRYPT_CA
    } else {
        STAGING_LETS_ENCRYPT_CA
    };
    Path::new(resources_path).join("ca").join(file_name)
}

/// Write a kubeconfig to a temporal file. The client library requires a
/// path, so the in-memory contents are spilled to disk until teardown.
fn write_temp_kubeconfig(temp_path: &str, content: &str) -> Result<PathBuf> {
    let path = Path::new(temp_path).join(format!("kc-{}", Uuid::new_v4()));
    std::fs::write(&path, content)
        .map_err(|e| Error::internal(format!("cannot create temporal file: {}", e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::internal(format!("cannot restrict temporal file: {}", e)))?;
    }
    Ok(path)
}

fn remove_temp_file(path: &Path) {
    debug!(path = %path.display(), "removing temporal file");
    if let Err(e) = std::fs::remove_file(path) {
        error!(error = %e, "cannot delete temporal file");
    }
}

//! Kubernetes helper built on kube-rs
//!
//! Provides the operations the bootstrap flow needs without shelling out to
//! kubectl: applying untyped manifests, ensuring namespaces, creating
//! secrets and polling custom resource status fields.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Number of polls against a custom resource status field
pub const CRD_POLL_RETRIES: usize = 36;
/// Interval between polls against a custom resource status field
pub const CRD_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Client wrapper for the operations used during cluster bootstrap
#[derive(Clone)]
pub struct KubernetesClient {
    client: Client,
}

impl KubernetesClient {
    /// Connect to the cluster described by a kubeconfig file.
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .map_err(|e| Error::internal(format!("failed to read kubeconfig: {}", e)))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::internal(format!("failed to load kubeconfig: {}", e)))?;
        let client = Client::try_from(config)
            .map_err(|e| Error::internal(format!("failed to create client: {}", e)))?;
        Ok(Self { client })
    }

    /// Create a namespace, tolerating one that already exists.
    pub async fn create_namespace_if_not_exists(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(namespace = name, "namespace already exists");
                Ok(())
            }
            Err(e) => Err(Error::internal(format!(
                "failed to create namespace {}: {}",
                name, e
            ))),
        }
    }

    /// Create an opaque secret, replacing its data when it already exists.
    pub async fn create_opaque_secret(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.into_iter()
                    .map(|(key, value)| (key, ByteString(value)))
                    .collect(),
            ),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        match secrets.create(&PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                secrets
                    .replace(name, &PostParams::default(), &secret)
                    .await
                    .map_err(|e| {
                        Error::internal(format!(
                            "failed to update secret {}/{}: {}",
                            namespace, name, e
                        ))
                    })?;
                Ok(())
            }
            Err(e) => Err(Error::internal(format!(
                "failed to create secret {}/{}: {}",
                namespace, name, e
            ))),
        }
    }

    /// Apply a single YAML or JSON manifest using server-side apply.
    pub async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        let metadata = parse_manifest(manifest)?;
        let patch_params = PatchParams::apply("cluster-provisioner").force();

        if let Some(ns) = &metadata.namespace {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), ns, &metadata.api_resource);
            api.patch(&metadata.name, &patch_params, &Patch::Apply(&metadata.value))
                .await
                .map_err(|e| {
                    Error::internal(format!(
                        "failed to apply {}/{}: {}",
                        metadata.api_resource.kind, metadata.name, e
                    ))
                })?;
        } else {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &metadata.api_resource);
            api.patch(&metadata.name, &patch_params, &Patch::Apply(&metadata.value))
                .await
                .map_err(|e| {
                    Error::internal(format!(
                        "failed to apply {}/{}: {}",
                        metadata.api_resource.kind, metadata.name, e
                    ))
                })?;
        }
        Ok(())
    }

    /// Read a resource once and compare a status field with an expected
    /// value. Retrieval errors are logged and count as a mismatch.
    async fn check_resource_status(
        &self,
        namespace: Option<&str>,
        group: &str,
        version: &str,
        plural: &str,
        name: &str,
        field_path: &[&str],
        expected: &str,
    ) -> Result<bool> {
        let api_resource = custom_api_resource(group, version, plural);
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        };
        match api.get(name).await {
            Ok(resource) => {
                let value = serde_json::to_value(&resource).map_err(|e| {
                    Error::internal(format!("cannot encode resource {}: {}", name, e))
                })?;
                Ok(match_json_field(&value, field_path, expected))
            }
            Err(e) => {
                warn!(resource = name, error = %e, "unable to retrieve resource");
                Ok(false)
            }
        }
    }

    /// Read a custom resource and compare a status field with an expected
    /// value, polling until it matches or the retries are exhausted.
    ///
    /// Returns the result of the last comparison.
    pub async fn match_crd_status(
        &self,
        namespace: Option<&str>,
        group: &str,
        version: &str,
        plural: &str,
        name: &str,
        field_path: &[&str],
        expected: &str,
    ) -> Result<bool> {
        for retry in 0..CRD_POLL_RETRIES {
            let matches = self
                .check_resource_status(namespace, group, version, plural, name, field_path, expected)
                .await?;
            debug!(retry, matches, resource = name, "CRD status");
            if matches {
                return Ok(true);
            }
            if retry + 1 < CRD_POLL_RETRIES {
                tokio::time::sleep(CRD_POLL_INTERVAL).await;
            }
        }
        Ok(false)
    }

    /// Poll a resource status field on an interval until it matches the
    /// expected value, failing when the timeout elapses first.
    #[allow(clippy::too_many_arguments)]
    pub async fn wait_crd_status(
        &self,
        namespace: Option<&str>,
        group: &str,
        version: &str,
        plural: &str,
        name: &str,
        field_path: &[&str],
        expected: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > timeout {
                return Err(Error::internal(format!(
                    "timeout reached when waiting for status of {}",
                    name
                )));
            }
            let matches = self
                .check_resource_status(namespace, group, version, plural, name, field_path, expected)
                .await?;
            debug!(matches, resource = name, "checking resource status");
            if matches {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Parsed manifest metadata for applying to Kubernetes
#[derive(Debug, Clone)]
pub(crate) struct ManifestMetadata {
    pub value: serde_json::Value,
    pub name: String,
    pub namespace: Option<String>,
    pub api_resource: ApiResource,
}

/// Parse a manifest and extract the coordinates needed to apply it.
pub(crate) fn parse_manifest(manifest: &str) -> Result<ManifestMetadata> {
    let value: serde_json::Value = if manifest.trim_start().starts_with('{') {
        serde_json::from_str(manifest)
            .map_err(|e| Error::invalid_argument(format!("cannot parse manifest as JSON: {}", e)))?
    } else {
        serde_yaml::from_str(manifest)
            .map_err(|e| Error::invalid_argument(format!("cannot parse manifest as YAML: {}", e)))?
    };

    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_argument("manifest missing apiVersion"))?
        .to_string();
    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_argument("manifest missing kind"))?
        .to_string();
    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_argument("manifest missing metadata.name"))?
        .to_string();
    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let (group, version) = parse_api_version(&api_version);
    let plural = pluralize(&kind);
    let api_resource = ApiResource {
        group,
        version,
        kind,
        api_version,
        plural,
    };

    Ok(ManifestMetadata {
        value,
        name,
        namespace,
        api_resource,
    })
}

fn custom_api_resource(group: &str, version: &str, plural: &str) -> ApiResource {
    let api_version = if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    };
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        kind: plural.to_string(),
        api_version,
        plural: plural.to_string(),
    }
}

/// Parse apiVersion into (group, version)
fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

fn pluralize(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        format!("{}es", lower)
    } else if let Some(stem) = lower.strip_suffix('y') {
        format!("{}ies", stem)
    } else {
        format!("{}s", lower)
    }
}

/// Walk a JSON value along a path of object keys and array indexes and
/// compare the reached field with an expected string.
pub(crate) fn match_json_field(value: &serde_json::Value, path: &[&str], expected: &str) -> bool {
    let mut current = value;
    for segment in path {
        current = match current {
            serde_json::Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => match items.get(index) {
                    Some(item) => item,
                    None => return false,
                },
                Err(_) => return false,
            },
            serde_json::Value::Object(map) => match map.get(*segment) {
                Some(item) => item,
                None => return false,
            },
            _ => return false,
        };
    }
    match current {
        serde_json::Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

/// Split a multi-document YAML stream on lines equal to `---`.
///
/// Empty chunks are dropped, so a leading separator is accepted.
pub fn split_yaml_documents(content: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim_end() == "---" {
            if !current.trim().is_empty() {
                documents.push(current.clone());
            }
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        documents.push(current);
    }
    documents
}

//! Azure service principal credentials

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Credentials of the service principal used against the Azure APIs.
///
/// Matches the JSON document produced by the Azure CLI when creating a
/// service principal with the `--sdk-auth` flag. Endpoint fields missing
/// from the document default to empty strings and fall back to the public
/// cloud endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCredentials {
    /// Application (client) identifier
    #[serde(default)]
    pub client_id: String,
    /// Client secret associated with the application
    #[serde(default)]
    pub client_secret: String,
    /// Subscription that owns the managed resources
    #[serde(default)]
    pub subscription_id: String,
    /// Directory (tenant) identifier
    #[serde(default)]
    pub tenant_id: String,
    /// Active directory endpoint used to obtain tokens
    #[serde(default)]
    pub active_directory_endpoint_url: String,
    /// Resource manager endpoint for management operations
    #[serde(default)]
    pub resource_manager_endpoint_url: String,
    /// SQL management endpoint
    #[serde(default)]
    pub sql_management_endpoint_url: String,
    /// Gallery endpoint
    #[serde(default)]
    pub gallery_endpoint_url: String,
    /// Classic management endpoint
    #[serde(default)]
    pub management_endpoint_url: String,
}

impl AzureCredentials {
    /// Load credentials from a JSON file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::invalid_argument(format!(
                "cannot read credentials file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse credentials from a JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::invalid_argument(format!("cannot parse azure credentials: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sdk_auth_document() {
        let content = r#"{
            "clientId": "11111111-2222-3333-4444-555555555555",
            "clientSecret": "s3cr3t",
            "subscriptionId": "66666666-7777-8888-9999-000000000000",
            "tenantId": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
            "activeDirectoryEndpointUrl": "https://login.microsoftonline.com",
            "resourceManagerEndpointUrl": "https://management.azure.com/"
        }"#;
        let credentials = AzureCredentials::from_json(content).unwrap();
        assert_eq!(credentials.client_id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(credentials.client_secret, "s3cr3t");
        // Endpoints missing from the document default to empty strings.
        assert_eq!(credentials.sql_management_endpoint_url, "");
        assert_eq!(credentials.gallery_endpoint_url, "");
        assert_eq!(credentials.management_endpoint_url, "");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            AzureCredentials::from_json("not json"),
            Err(Error::InvalidArgument(_))
        ));
    }
}

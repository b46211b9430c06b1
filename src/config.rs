//! Runtime configuration shared by the service and the CLI front-ends

use tracing::info;

use crate::{Error, Result};

/// Configuration for the provisioner process
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether the HTTP service is being launched (CLI front-ends leave this off)
    pub launch_service: bool,
    /// Whether debug logging is enabled
    pub debug: bool,
    /// Port where the API service listens
    pub port: u16,
    /// Directory where temporal files may be created
    pub temp_path: String,
    /// Directory with extra YAML resources required by some operations
    pub resources_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            launch_service: false,
            debug: false,
            port: 8930,
            temp_path: "/tmp/".to_string(),
            resources_path: "./resources".to_string(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.launch_service && self.port == 0 {
            return Err(Error::invalid_argument("port must be valid"));
        }
        if self.temp_path.is_empty() {
            return Err(Error::invalid_argument("temp_path must be set"));
        }
        if self.resources_path.is_empty() {
            return Err(Error::invalid_argument("resources_path must be set"));
        }
        Ok(())
    }

    /// Log the effective settings at startup
    pub fn print(&self) {
        if self.launch_service {
            info!(port = self.port, "API port");
        }
        info!(path = %self.temp_path, "Temporal files");
        info!(path = %self.resources_path, "Resources");
    }
}

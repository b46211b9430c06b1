//! Cluster provisioner - lifecycle operations for managed Kubernetes clusters
//!
//! The provisioner accepts asynchronous cluster lifecycle requests,
//! schedules each one as an operation and drives a provider specific
//! workflow against the cloud APIs. Clients poll the operation progress by
//! request identifier and retrieve a structured result: kubeconfig, static
//! IP addresses, hostname, DNS records and an issued TLS certificate.
//!
//! # Modules
//!
//! - [`entities`] - Requests, responses, operation contract and results
//! - [`executor`] - Bounded FIFO scheduler for infrastructure operations
//! - [`provider`] - Infrastructure provider abstraction and the Azure implementation
//! - [`k8s`] - Kubernetes helper used during cluster bootstrap
//! - [`certmngr`] - cert-manager installation and certificate issuance
//! - [`service`] - Request managers and the HTTP API
//! - [`cli`] - CLI front-ends driving operations without a service
//! - [`config`] - Runtime configuration
//! - [`error`] - Error taxonomy shared across the crate

#![deny(missing_docs)]

pub mod certmngr;
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod executor;
pub mod k8s;
pub mod provider;
pub mod service;

pub use error::Error;

/// Result type alias using the crate error type
pub type Result<T> = std::result::Result<T, Error>;

//! # Test Environment
//!
//! The API server the console is tested against, and the controller that owns
//! its lifecycle.
//!
//! Backends implement `TestEnvironment`; `EnvironmentController` enforces that
//! a backend is started at most once and stopped exactly once after a
//! successful start.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use zeroize::Zeroizing;

pub mod controller;
pub mod crd;
pub mod credentials;
pub mod existing_cluster;

pub use controller::EnvironmentController;
pub use credentials::{persist_credentials, CredentialPaths};
pub use existing_cluster::ExistingClusterEnvironment;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("test environment was already started")]
    AlreadyStarted,
    #[error("CRD path does not exist: {path}")]
    CrdPathMissing { path: String },
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),
    #[error("Kubernetes API error: {0}")]
    Client(#[from] kube::Error),
    #[error("CRD {name} was not established within {timeout_secs}s")]
    CrdNotEstablished { name: String, timeout_secs: u64 },
    #[error("waiting for CRD {name} failed: {reason}")]
    Wait { name: String, reason: String },
}

/// How the environment should be started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOptions {
    /// CRD manifests (files or directories) installed on start
    pub crd_directory_paths: Vec<String>,
    /// Fail the start when any of `crd_directory_paths` does not exist
    pub error_if_crd_path_missing: bool,
}

/// Client TLS material issued by the environment, as raw PEM
#[derive(Clone)]
pub struct TlsClientConfig {
    pub cert_data: Vec<u8>,
    pub key_data: Zeroizing<Vec<u8>>,
    pub ca_data: Vec<u8>,
}

impl std::fmt::Debug for TlsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClientConfig")
            .field("cert_data", &format_args!("{} bytes", self.cert_data.len()))
            .field("key_data", &"<redacted>")
            .field("ca_data", &format_args!("{} bytes", self.ca_data.len()))
            .finish()
    }
}

/// How to reach a started environment
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// API server URL, e.g. `https://127.0.0.1:6443`
    pub host: String,
    pub tls: TlsClientConfig,
}

/// A startable, stoppable API server
#[async_trait]
pub trait TestEnvironment: Send {
    /// Start the API server and return how to reach it
    async fn start(
        &mut self,
        options: &EnvironmentOptions,
    ) -> Result<ConnectionConfig, EnvironmentError>;

    /// Tear the API server down
    async fn stop(&mut self) -> Result<(), EnvironmentError>;
}

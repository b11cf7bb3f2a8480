//! # Existing Cluster Environment
//!
//! A `TestEnvironment` backed by an API server that is already running
//! locally (for example one launched from kubebuilder test assets, or a kind
//! cluster). Starting it validates and installs the CRDs, stopping it
//! optionally removes them again.
//!
//! The server is described by its URL plus three PEM files: client
//! certificate, client key and CA certificate. These are the same files a
//! previous run persists to `/tmp`.

use super::crd::{install_crds, read_crds, uninstall_crds};
use super::{
    ConnectionConfig, EnvironmentError, EnvironmentOptions, TestEnvironment, TlsClientConfig,
};
use crate::config::ExistingClusterConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zeroize::Zeroizing;

const KUBECONFIG_ENTRY: &str = "console-testenv";

pub struct ExistingClusterEnvironment {
    config: ExistingClusterConfig,
    client: Option<Client>,
    installed_crds: Vec<String>,
}

impl std::fmt::Debug for ExistingClusterEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistingClusterEnvironment")
            .field("api_server", &self.config.api_server)
            .field("connected", &self.client.is_some())
            .field("installed_crds", &self.installed_crds)
            .finish()
    }
}

impl ExistingClusterEnvironment {
    pub fn new(config: ExistingClusterConfig) -> Self {
        Self {
            config,
            client: None,
            installed_crds: Vec::new(),
        }
    }

    /// Names of the CRDs installed by `start`
    pub fn installed_crds(&self) -> &[String] {
        &self.installed_crds
    }

    /// Read the TLS bundle from the configured PEM files
    async fn load_tls(&self) -> Result<TlsClientConfig, EnvironmentError> {
        let cert = required_path(self.config.client_cert.as_ref(), "TEST_ENV_CLIENT_CERT")?;
        let key = required_path(self.config.client_key.as_ref(), "TEST_ENV_CLIENT_KEY")?;
        let ca = required_path(self.config.ca_cert.as_ref(), "TEST_ENV_CA_CERT")?;

        Ok(TlsClientConfig {
            cert_data: read_pem(cert).await?,
            key_data: Zeroizing::new(read_pem(key).await?),
            ca_data: read_pem(ca).await?,
        })
    }
}

#[async_trait]
impl TestEnvironment for ExistingClusterEnvironment {
    async fn start(
        &mut self,
        options: &EnvironmentOptions,
    ) -> Result<ConnectionConfig, EnvironmentError> {
        // Fail fast before touching the API server
        if options.error_if_crd_path_missing {
            if let Some(missing) = options
                .crd_directory_paths
                .iter()
                .find(|p| !Path::new(p.as_str()).exists())
            {
                return Err(EnvironmentError::CrdPathMissing {
                    path: missing.clone(),
                });
            }
        }

        let host = self
            .config
            .api_server
            .clone()
            .ok_or(EnvironmentError::MissingSetting("TEST_ENV_API_SERVER"))?;
        let connection = ConnectionConfig {
            host,
            tls: self.load_tls().await?,
        };

        let client = kube_client(&connection).await?;
        let manifests = read_crds(
            &options.crd_directory_paths,
            options.error_if_crd_path_missing,
        )?;
        info!(
            "Installing {} CRD(s) into {}",
            manifests.len(),
            connection.host
        );
        let timeout = self.config.crd_establish_timeout();
        self.installed_crds = install_crds(&client, &manifests, timeout).await?;
        self.client = Some(client);

        Ok(connection)
    }

    async fn stop(&mut self) -> Result<(), EnvironmentError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        if self.config.cleanup_crds && !self.installed_crds.is_empty() {
            info!("Removing {} installed CRD(s)", self.installed_crds.len());
            uninstall_crds(&client, &self.installed_crds).await?;
        } else if !self.installed_crds.is_empty() {
            warn!(
                "Leaving {} CRD(s) installed (set TEST_ENV_CLEANUP_CRDS=true to remove them)",
                self.installed_crds.len()
            );
        }
        self.installed_crds.clear();

        Ok(())
    }
}

fn required_path<'a>(
    path: Option<&'a PathBuf>,
    setting: &'static str,
) -> Result<&'a PathBuf, EnvironmentError> {
    path.ok_or(EnvironmentError::MissingSetting(setting))
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, EnvironmentError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| EnvironmentError::ReadFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Build a kubeconfig carrying the bundle inline
pub fn kubeconfig_for(connection: &ConnectionConfig) -> Result<Kubeconfig, EnvironmentError> {
    let tls = &connection.tls;
    let document = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": KUBECONFIG_ENTRY,
            "cluster": {
                "server": connection.host,
                "certificate-authority-data": general_purpose::STANDARD.encode(&tls.ca_data),
            },
        }],
        "users": [{
            "name": KUBECONFIG_ENTRY,
            "user": {
                "client-certificate-data": general_purpose::STANDARD.encode(&tls.cert_data),
                "client-key-data": general_purpose::STANDARD.encode(tls.key_data.as_slice()),
            },
        }],
        "contexts": [{
            "name": KUBECONFIG_ENTRY,
            "context": {
                "cluster": KUBECONFIG_ENTRY,
                "user": KUBECONFIG_ENTRY,
            },
        }],
        "current-context": KUBECONFIG_ENTRY,
    });

    serde_json::from_value(document)
        .map_err(|e| EnvironmentError::Kubeconfig(e.to_string()))
}

async fn kube_client(connection: &ConnectionConfig) -> Result<Client, EnvironmentError> {
    let kubeconfig = kubeconfig_for(connection)?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| EnvironmentError::Kubeconfig(e.to_string()))?;
    Ok(Client::try_from(config)?)
}

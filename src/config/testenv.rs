//! # Test Environment Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::constants::{DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS, DEFAULT_FRAMEWORK_HOME};
use crate::environment::CredentialPaths;
use std::path::PathBuf;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Test environment configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct TestEnvConfig {
    /// Running in continuous integration (`CI=true`)
    /// Switches the proxy to an OS-assigned port and the console to loopback
    pub ci: bool,
    /// Base directory of the resource watcher framework (`TEST_ENV_FRAMEWORK_HOME`)
    pub framework_home: PathBuf,
    /// Directory for persisted credentials (`TEST_ENV_CREDENTIALS_DIR`), `/tmp` files when unset
    pub credentials_dir: Option<PathBuf>,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Settings for the existing-cluster environment backend
    pub existing_cluster: ExistingClusterConfig,
}

/// Where to find the API server the existing-cluster backend attaches to
#[derive(Debug, Clone)]
pub struct ExistingClusterConfig {
    /// API server URL (`TEST_ENV_API_SERVER`)
    pub api_server: Option<String>,
    /// Client certificate PEM file (`TEST_ENV_CLIENT_CERT`)
    pub client_cert: Option<PathBuf>,
    /// Client key PEM file (`TEST_ENV_CLIENT_KEY`)
    pub client_key: Option<PathBuf>,
    /// CA certificate PEM file (`TEST_ENV_CA_CERT`)
    pub ca_cert: Option<PathBuf>,
    /// Delete installed CRDs on stop (`TEST_ENV_CLEANUP_CRDS`)
    pub cleanup_crds: bool,
    /// Upper bound for CRDs to become established (`TEST_ENV_CRD_TIMEOUT_SECS`)
    pub crd_establish_timeout_secs: u64,
}

impl Default for ExistingClusterConfig {
    fn default() -> Self {
        Self {
            api_server: None,
            client_cert: None,
            client_key: None,
            ca_cert: None,
            cleanup_crds: false,
            crd_establish_timeout_secs: DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS,
        }
    }
}

impl ExistingClusterConfig {
    /// Get CRD establish timeout duration
    pub fn crd_establish_timeout(&self) -> Duration {
        Duration::from_secs(self.crd_establish_timeout_secs)
    }
}

impl Default for TestEnvConfig {
    fn default() -> Self {
        Self {
            ci: false,
            framework_home: PathBuf::from(DEFAULT_FRAMEWORK_HOME),
            credentials_dir: None,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Text,
            existing_cluster: ExistingClusterConfig::default(),
        }
    }
}

impl TestEnvConfig {
    /// Where the environment's TLS material is written
    pub fn credential_paths(&self) -> CredentialPaths {
        self.credentials_dir
            .as_deref()
            .map_or_else(CredentialPaths::default, CredentialPaths::in_dir)
    }

    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            // Only the exact string "true" counts
            ci: lookup("CI").is_some_and(|v| v == "true"),
            framework_home: PathBuf::from(non_empty_or_default(
                &lookup,
                "TEST_ENV_FRAMEWORK_HOME",
                DEFAULT_FRAMEWORK_HOME,
            )),
            credentials_dir: non_empty(&lookup, "TEST_ENV_CREDENTIALS_DIR")
                .map(PathBuf::from),
            log_level: non_empty_or_default(&lookup, "LOG_LEVEL", "INFO"),
            log_format: LogFormat::parse(&non_empty_or_default(&lookup, "LOG_FORMAT", "text")),
            existing_cluster: ExistingClusterConfig {
                api_server: non_empty(&lookup, "TEST_ENV_API_SERVER"),
                client_cert: non_empty(&lookup, "TEST_ENV_CLIENT_CERT").map(PathBuf::from),
                client_key: non_empty(&lookup, "TEST_ENV_CLIENT_KEY").map(PathBuf::from),
                ca_cert: non_empty(&lookup, "TEST_ENV_CA_CERT").map(PathBuf::from),
                cleanup_crds: bool_or_default(&lookup, "TEST_ENV_CLEANUP_CRDS", false),
                crd_establish_timeout_secs: lookup("TEST_ENV_CRD_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS),
            },
        }
    }
}

/// Read a variable, treating an empty value as unset
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.is_empty())
}

/// Read a variable or return default (empty counts as unset)
fn non_empty_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or_else(|| default.to_string())
}

/// Read a variable as boolean or return default
fn bool_or_default<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

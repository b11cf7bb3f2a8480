//! # Console Reconfiguration
//!
//! Points the console at the proxy instead of a real cluster.
//!
//! The console reads its connection settings from named flags. In test-env
//! mode user authentication is disabled and the Kubernetes endpoint becomes the
//! proxy, which accepts any bearer token. This has to run before the console
//! reads its flags.

use crate::constants::{
    CI_CONSOLE_LISTEN_URL, DEFAULT_CONSOLE_LISTEN_URL, PLACEHOLDER_BEARER_TOKEN,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const FLAG_LISTEN: &str = "listen";
pub const FLAG_USER_AUTH: &str = "user-auth";
pub const FLAG_K8S_MODE: &str = "k8s-mode";
pub const FLAG_K8S_ENDPOINT: &str = "k8s-mode-off-cluster-endpoint";
pub const FLAG_K8S_AUTH: &str = "k8s-auth";
pub const FLAG_K8S_BEARER_TOKEN: &str = "k8s-auth-bearer-token";

/// Named console flags, ordered by name
///
/// Setting a flag again replaces the previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleFlags {
    values: BTreeMap<String, String>,
}

impl ConsoleFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag, returning the value it replaced
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render as `--name=value` command-line arguments
    pub fn to_args(&self) -> Vec<String> {
        self.iter()
            .map(|(name, value)| format!("--{name}={value}"))
            .collect()
    }
}

/// Flag values for running the console against the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleReconfiguration {
    listen: &'static str,
    proxy_url: String,
}

impl ConsoleReconfiguration {
    pub fn new(proxy_url: impl Into<String>, ci: bool) -> Self {
        let listen = if ci {
            CI_CONSOLE_LISTEN_URL
        } else {
            DEFAULT_CONSOLE_LISTEN_URL
        };
        Self {
            listen,
            proxy_url: proxy_url.into(),
        }
    }

    pub fn listen_url(&self) -> &str {
        self.listen
    }

    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    /// Overwrite the connection flags, whatever they were set to before
    pub fn apply(&self, flags: &mut ConsoleFlags) {
        warn!(
            "Automatically reconfigure bridge in test-env mode: Disable auth and use proxied k8s endpoint!"
        );

        flags.set(FLAG_LISTEN, self.listen);
        flags.set(FLAG_USER_AUTH, "disabled");
        flags.set(FLAG_K8S_MODE, "off-cluster");
        flags.set(FLAG_K8S_ENDPOINT, self.proxy_url.as_str());
        flags.set(FLAG_K8S_AUTH, "bearer-token");
        flags.set(FLAG_K8S_BEARER_TOKEN, PLACEHOLDER_BEARER_TOKEN);

        info!("Proxy server (no auth is needed): {}", self.proxy_url);
        info!("Console UI will run on: {}", self.listen);
    }
}

//! # Constants
//!
//! Shared constants used throughout the test environment.
//!
//! These values mirror what the console and the resource watcher expect and
//! can be overridden via configuration or environment variables where applicable.

/// Fixed proxy listen address used outside of CI
pub const DEFAULT_PROXY_LISTEN_ADDR: &str = "127.0.0.1:8092";

/// Proxy listen address used in CI (OS-assigned port to avoid collisions between parallel runs)
pub const CI_PROXY_LISTEN_ADDR: &str = "127.0.0.1:0";

/// Console listen URL outside of CI
pub const DEFAULT_CONSOLE_LISTEN_URL: &str = "http://0.0.0.0:9091";

/// Console listen URL in CI
pub const CI_CONSOLE_LISTEN_URL: &str = "http://127.0.0.1:9091";

/// Placeholder bearer token handed to the console; the proxy authenticates with mTLS instead
pub const PLACEHOLDER_BEARER_TOKEN: &str = "ignored-by-proxy";

/// Where the client certificate issued by the environment is persisted
pub const CLIENT_CERT_PATH: &str = "/tmp/cert.cert";

/// Where the CA certificate issued by the environment is persisted
pub const CA_CERT_PATH: &str = "/tmp/ca.cert";

/// Where the client key issued by the environment is persisted
pub const CLIENT_KEY_PATH: &str = "/tmp/key.key";

/// File mode for persisted credentials
pub const CREDENTIAL_FILE_MODE: u32 = 0o664;

/// Default location of the resource watcher framework (relative to the working directory)
pub const DEFAULT_FRAMEWORK_HOME: &str = "test-env/test-env-framework";

/// Watcher executable, relative to the framework home
pub const WATCHER_EXECUTABLE: &str = "node_modules/.bin/ts-node";

/// Watcher CLI entry point, relative to the framework home
pub const WATCHER_CLI_ENTRY: &str = "cli";

/// Field manager used for server-side apply of CRDs
pub const FIELD_MANAGER: &str = "console-testenv";

/// How long to wait for installed CRDs to become established (seconds)
pub const DEFAULT_CRD_ESTABLISH_TIMEOUT_SECS: u64 = 10;

/// Filename suffixes (lowercase) that mark a CRD manifest
pub const CRD_SUFFIXES: &[&str] = &[
    "-crd.json",
    "-crd.yaml",
    "-crd.yml",
    "-crds.json",
    "-crds.yaml",
    "-crds.yml",
];

/// Filename suffixes (lowercase) that mark any other resource the watcher understands
pub const RESOURCE_SUFFIXES: &[&str] = &[".json", ".yaml", ".yml", ".js", ".ts"];

/// Extensions of manifest files read from a CRD directory
pub const MANIFEST_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Exit status for environment start, key pair and proxy bind failures
pub const EXIT_ENVIRONMENT_FAILURE: i32 = 127;

/// Exit status for configuration errors and a missing watcher executable
pub const EXIT_CONFIGURATION_FAILURE: i32 = 1;

/// How long the proxy waits for in-flight requests (watches included) before aborting them
pub const PROXY_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Largest request body the proxy buffers before forwarding (10 MB)
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

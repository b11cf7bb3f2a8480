//! # console-testenv
//!
//! Starts a test environment for the console and keeps it running until
//! interrupted.
//!
//! ```bash
//! # Load CRDs and resources from a directory
//! console-testenv test-env/resources
//!
//! # Explicit files, printing the console flags to use
//! console-testenv widgets-crd.yaml,widgets.yaml --print-flags
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use console_testenv::config::TestEnvConfig;
use console_testenv::console::ConsoleFlags;
use console_testenv::environment::ExistingClusterEnvironment;
use console_testenv::observability;
use console_testenv::runtime::{setup, spawn_interrupt_handler};
use std::path::PathBuf;
use tracing::{error, info};

/// Test environment for the console
#[derive(Parser, Debug)]
#[command(name = "console-testenv", version, long_about = None)]
struct Cli {
    /// CRD manifests, resource files and directories (comma-separated lists accepted)
    #[arg(value_name = "FILES", value_delimiter = ',')]
    files: Vec<String>,

    /// API server URL (overrides TEST_ENV_API_SERVER)
    #[arg(long)]
    api_server: Option<String>,

    /// Client certificate PEM file (overrides TEST_ENV_CLIENT_CERT)
    #[arg(long)]
    client_cert: Option<PathBuf>,

    /// Client key PEM file (overrides TEST_ENV_CLIENT_KEY)
    #[arg(long)]
    client_key: Option<PathBuf>,

    /// CA certificate PEM file (overrides TEST_ENV_CA_CERT)
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Delete the installed CRDs on shutdown
    #[arg(long)]
    cleanup_crds: bool,

    /// Print the rewritten console flags to stdout once ready
    #[arg(long)]
    print_flags: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut TestEnvConfig) {
        let cluster = &mut config.existing_cluster;
        if let Some(api_server) = &self.api_server {
            cluster.api_server = Some(api_server.clone());
        }
        if let Some(path) = &self.client_cert {
            cluster.client_cert = Some(path.clone());
        }
        if let Some(path) = &self.client_key {
            cluster.client_key = Some(path.clone());
        }
        if let Some(path) = &self.ca_cert {
            cluster.ca_cert = Some(path.clone());
        }
        if self.cleanup_crds {
            cluster.cleanup_crds = true;
        }
    }
}

fn init(cli: &Cli) -> Result<TestEnvConfig> {
    // Err only means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = TestEnvConfig::from_env();
    cli.apply_overrides(&mut config);

    observability::init_tracing(&config).context("Failed to initialize tracing")?;
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match init(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    let mut flags = ConsoleFlags::new();
    let environment = ExistingClusterEnvironment::new(config.existing_cluster.clone());
    let handle = match setup(&cli.files, &mut flags, &config, environment).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    if cli.print_flags {
        for arg in flags.to_args() {
            println!("{arg}");
        }
    }

    spawn_interrupt_handler(handle.shutdown_trigger());
    info!("Test environment ready, press Ctrl+C to stop");

    if let Err(e) = handle.run_until_shutdown().await {
        error!("Shutdown failed: {}", e);
        std::process::exit(e.exit_code());
    }
}

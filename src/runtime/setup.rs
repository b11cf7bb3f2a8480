//! # Setup
//!
//! Brings the test environment up in order:
//!
//! 1. classify the inputs
//! 2. start the environment with the CRDs found
//! 3. persist its credentials
//! 4. start the proxy
//! 5. point the console flags at the proxy
//! 6. launch the resource watcher for everything else
//!
//! Once the environment is running, a later failure stops it again before the
//! error is returned.

use super::lifecycle::ShutdownTrigger;
use crate::classifier::{classify_resources, ClassifiedResources};
use crate::config::TestEnvConfig;
use crate::console::{ConsoleFlags, ConsoleReconfiguration};
use crate::environment::{
    persist_credentials, ConnectionConfig, EnvironmentController, EnvironmentError,
    TestEnvironment,
};
use crate::error::SetupError;
use crate::proxy::{bind_proxy_listener, Mangler, ProxyError, ProxyServer, UpstreamTransport};
use crate::watcher::{launch_resource_watcher, WatcherHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// A running test environment
#[derive(Debug)]
pub struct TestEnvHandle<E> {
    controller: EnvironmentController<E>,
    connection: Arc<ConnectionConfig>,
    proxy: ProxyServer,
    watcher: Option<WatcherHandle>,
    shutdown: ShutdownTrigger,
}

/// Start the test environment and reconfigure `flags` for it
pub async fn setup<E, S>(
    files: &[S],
    flags: &mut ConsoleFlags,
    config: &TestEnvConfig,
    environment: E,
) -> Result<TestEnvHandle<E>, SetupError>
where
    E: TestEnvironment,
    S: AsRef<str>,
{
    info!("Test environment enabled. Will automatically load this files: ");
    let resources = classify_resources(files)?;

    let mut controller = EnvironmentController::new(environment);
    let connection = controller.start(&resources.crd_paths).await?;

    match expose(&connection, flags, config, &resources).await {
        Ok((proxy, watcher)) => Ok(TestEnvHandle {
            controller,
            connection,
            proxy,
            watcher,
            shutdown: ShutdownTrigger::new(),
        }),
        Err(e) => {
            if let Err(stop_err) = controller.stop().await {
                warn!(
                    "Failed to stop test environment after setup error: {}",
                    stop_err
                );
            }
            Err(e)
        }
    }
}

/// Everything that depends on a running environment
async fn expose(
    connection: &ConnectionConfig,
    flags: &mut ConsoleFlags,
    config: &TestEnvConfig,
    resources: &ClassifiedResources,
) -> Result<(ProxyServer, Option<WatcherHandle>), SetupError> {
    let failed = persist_credentials(&connection.tls, &config.credential_paths());
    if !failed.is_empty() {
        warn!("{} credential file(s) were not written", failed.len());
    }

    info!("API server (requires auth): {}", connection.host);

    let mangler = Mangler::new(connection)?;
    let transport = UpstreamTransport::new(&connection.tls)?;
    let listener = bind_proxy_listener(config.ci).await?;
    let proxy = ProxyServer::start(listener, mangler, transport)?;
    let proxy_url = proxy.url();

    let reconfiguration = ConsoleReconfiguration::new(proxy_url.as_str(), config.ci);
    reconfiguration.apply(flags);

    match launch_resource_watcher(&config.framework_home, &proxy_url, &resources.other_paths) {
        Ok(watcher) => Ok((proxy, watcher)),
        Err(e) => {
            if let Err(stop_err) = proxy.shutdown().await {
                warn!("Failed to stop proxy after setup error: {}", stop_err);
            }
            Err(e.into())
        }
    }
}

impl<E: TestEnvironment> TestEnvHandle<E> {
    /// Base URL of the proxy, as handed to the console
    pub fn proxy_url(&self) -> String {
        self.proxy.url()
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy.local_addr()
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Trigger that ends `run_until_shutdown`
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown.clone()
    }

    /// Take the watcher handle to await it; the handle stays detached otherwise
    pub fn take_watcher(&mut self) -> Option<WatcherHandle> {
        self.watcher.take()
    }

    pub fn environment(&self) -> &E {
        self.controller.environment()
    }

    /// Block until shutdown is triggered, then tear down
    pub async fn run_until_shutdown(self) -> Result<(), SetupError> {
        let mut signal = self.shutdown.subscribe();
        signal.wait().await;
        self.shutdown().await
    }

    /// Stop the proxy, then the environment
    ///
    /// The environment is stopped even when the proxy fails to stop; the first
    /// error is returned.
    pub async fn shutdown(self) -> Result<(), SetupError> {
        let TestEnvHandle {
            mut controller,
            proxy,
            watcher,
            ..
        } = self;

        let proxy_result = proxy.shutdown().await;
        if let Err(e) = &proxy_result {
            warn!("Proxy shutdown failed: {}", e);
        }

        let stop_result = controller.stop().await;
        if watcher.is_some() {
            info!("Leaving resource watcher to exit on its own");
        }

        if first_error(proxy_result, stop_result)? {
            info!("Test environment stopped");
        }
        Ok(())
    }
}

/// Proxy errors win over environment errors, matching teardown order
fn first_error(
    proxy: Result<(), ProxyError>,
    environment: Result<bool, EnvironmentError>,
) -> Result<bool, SetupError> {
    proxy?;
    Ok(environment?)
}

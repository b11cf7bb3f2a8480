//! # Environment Controller
//!
//! Owns a `TestEnvironment` and enforces its lifecycle.

use super::{ConnectionConfig, EnvironmentError, EnvironmentOptions, TestEnvironment};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug)]
enum EnvironmentState {
    Created,
    Started(Arc<ConnectionConfig>),
    Failed,
    Stopped,
}

/// Lifecycle owner for a single test environment
#[derive(Debug)]
pub struct EnvironmentController<E> {
    environment: E,
    state: EnvironmentState,
}

impl<E: TestEnvironment> EnvironmentController<E> {
    pub fn new(environment: E) -> Self {
        Self {
            environment,
            state: EnvironmentState::Created,
        }
    }

    /// Start the environment with the given CRD paths
    ///
    /// Every CRD path must exist. A failed start is final: the environment
    /// cannot be started again.
    pub async fn start(
        &mut self,
        crd_paths: &[String],
    ) -> Result<Arc<ConnectionConfig>, EnvironmentError> {
        if !matches!(self.state, EnvironmentState::Created) {
            return Err(EnvironmentError::AlreadyStarted);
        }

        let options = EnvironmentOptions {
            crd_directory_paths: crd_paths.to_vec(),
            error_if_crd_path_missing: true,
        };

        info!("Start kubernetes test environment");
        info!(
            "  ErrorIfCRDPathMissing: {}",
            options.error_if_crd_path_missing
        );
        info!("  CRDDirectoryPaths: {:?}", options.crd_directory_paths);

        match self.environment.start(&options).await {
            Ok(config) => {
                let config = Arc::new(config);
                self.state = EnvironmentState::Started(Arc::clone(&config));
                Ok(config)
            }
            Err(e) => {
                error!("Test environment failed to start: {}", e);
                self.state = EnvironmentState::Failed;
                Err(e)
            }
        }
    }

    /// Connection config of the running environment
    pub fn connection_config(&self) -> Option<Arc<ConnectionConfig>> {
        match &self.state {
            EnvironmentState::Started(config) => Some(Arc::clone(config)),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, EnvironmentState::Started(_))
    }

    /// Stop the environment
    ///
    /// Returns `Ok(true)` when this call stopped it and `Ok(false)` when there
    /// was nothing to stop (never started, failed, or already stopped).
    pub async fn stop(&mut self) -> Result<bool, EnvironmentError> {
        if !self.is_running() {
            return Ok(false);
        }
        // Marked stopped before the call so a failing stop is never retried
        self.state = EnvironmentState::Stopped;
        self.environment.stop().await?;
        Ok(true)
    }

    /// The wrapped backend
    pub fn environment(&self) -> &E {
        &self.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::TlsClientConfig;
    use async_trait::async_trait;
    use zeroize::Zeroizing;

    #[derive(Debug, Default)]
    struct CountingEnvironment {
        starts: usize,
        stops: usize,
        fail_start: bool,
        last_options: Option<EnvironmentOptions>,
    }

    #[async_trait]
    impl TestEnvironment for CountingEnvironment {
        async fn start(
            &mut self,
            options: &EnvironmentOptions,
        ) -> Result<ConnectionConfig, EnvironmentError> {
            self.starts += 1;
            self.last_options = Some(options.clone());
            if self.fail_start {
                return Err(EnvironmentError::MissingSetting("TEST_ENV_API_SERVER"));
            }
            Ok(ConnectionConfig {
                host: "https://127.0.0.1:6443".to_string(),
                tls: TlsClientConfig {
                    cert_data: b"cert".to_vec(),
                    key_data: Zeroizing::new(b"key".to_vec()),
                    ca_data: b"ca".to_vec(),
                },
            })
        }

        async fn stop(&mut self) -> Result<(), EnvironmentError> {
            self.stops += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_requires_crd_paths_to_exist() {
        let mut controller = EnvironmentController::new(CountingEnvironment::default());
        let config = controller
            .start(&["widgets-crd.yaml".to_string()])
            .await
            .unwrap();
        assert_eq!(config.host, "https://127.0.0.1:6443");

        let options = controller.environment().last_options.clone().unwrap();
        assert!(options.error_if_crd_path_missing);
        assert_eq!(
            options.crd_directory_paths,
            vec!["widgets-crd.yaml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let mut controller = EnvironmentController::new(CountingEnvironment::default());
        controller.start(&[]).await.unwrap();
        let err = controller.start(&[]).await.unwrap_err();
        assert!(matches!(err, EnvironmentError::AlreadyStarted));
        assert_eq!(controller.environment().starts, 1);
    }

    #[tokio::test]
    async fn test_stop_happens_exactly_once() {
        let mut controller = EnvironmentController::new(CountingEnvironment::default());
        assert!(
            !controller.stop().await.unwrap(),
            "nothing to stop before start"
        );

        controller.start(&[]).await.unwrap();
        assert!(controller.stop().await.unwrap());
        assert!(!controller.stop().await.unwrap());
        assert_eq!(controller.environment().stops, 1);
        assert!(controller.connection_config().is_none());
    }

    #[tokio::test]
    async fn test_failed_start_is_never_stopped() {
        let mut controller = EnvironmentController::new(CountingEnvironment {
            fail_start: true,
            ..CountingEnvironment::default()
        });
        assert!(controller.start(&[]).await.is_err());
        assert!(!controller.stop().await.unwrap());
        assert_eq!(controller.environment().stops, 0);
        assert!(matches!(
            controller.start(&[]).await,
            Err(EnvironmentError::AlreadyStarted)
        ));
    }
}

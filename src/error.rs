//! # Errors
//!
//! Top-level setup error and the mapping from failure class to process exit status.
//!
//! Each component owns its error type; `SetupError` aggregates them so the
//! binary can decide how the process terminates. Library code never exits.

use crate::classifier::ClassifyError;
use crate::constants::{EXIT_CONFIGURATION_FAILURE, EXIT_ENVIRONMENT_FAILURE};
use crate::environment::EnvironmentError;
use crate::proxy::ProxyError;
use crate::watcher::WatcherError;
use thiserror::Error;

/// Fatal error raised while bringing the test environment up
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("Failed to start test environment: {0}")]
    Environment(#[from] EnvironmentError),
    #[error("Proxy setup failed: {0}")]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
}

impl SetupError {
    /// Process exit status for this failure
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            SetupError::Classify(_) | SetupError::Watcher(_) => EXIT_CONFIGURATION_FAILURE,
            SetupError::Environment(_) | SetupError::Proxy(_) => EXIT_ENVIRONMENT_FAILURE,
        }
    }
}

//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use console_testenv::prelude::*;
//! ```

pub use crate::classifier::{classify_resources, ClassifiedResources, ClassifyError};
pub use crate::config::{ExistingClusterConfig, LogFormat, TestEnvConfig};
pub use crate::console::{ConsoleFlags, ConsoleReconfiguration};
pub use crate::environment::{
    ConnectionConfig, EnvironmentController, EnvironmentError, EnvironmentOptions,
    ExistingClusterEnvironment, TestEnvironment, TlsClientConfig,
};
pub use crate::error::SetupError;
pub use crate::proxy::{ProxyError, ProxyServer};
pub use crate::runtime::{setup, ShutdownTrigger, TestEnvHandle};
pub use crate::watcher::{WatcherError, WatcherHandle, WatcherOutcome};

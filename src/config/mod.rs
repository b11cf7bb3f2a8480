//! # Configuration
//!
//! Test environment settings loaded from environment variables, with CLI
//! overrides applied by the binary.

mod testenv;

pub use testenv::{ExistingClusterConfig, LogFormat, TestEnvConfig};

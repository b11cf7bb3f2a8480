//! # Console Test Environment
//!
//! Runs the console against a local Kubernetes API server instead of a real
//! cluster.
//!
//! ## Overview
//!
//! 1. **Classify inputs** - CRD manifests go to the API server, everything else to the resource watcher
//! 2. **Start the environment** - An API server with the CRDs installed
//! 3. **Persist credentials** - Client certificate, CA and key are written to disk
//! 4. **Proxy** - A loopback HTTP proxy authenticates to the API server with the client certificate
//! 5. **Reconfigure the console** - Auth disabled, Kubernetes endpoint pointed at the proxy
//! 6. **Resource watcher** - An external process applies and watches the remaining resources
//!
//! ## Quick Start
//!
//! ```rust
//! use console_testenv::prelude::*;
//! ```

pub mod classifier;
pub mod config;
pub mod console;
pub mod constants;
pub mod environment;
pub mod error;
pub mod observability;
pub mod prelude;
pub mod proxy;
pub mod runtime;
pub mod watcher;

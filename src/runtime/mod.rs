//! # Runtime
//!
//! Bringing the test environment up and tearing it down again.

pub mod lifecycle;
pub mod setup;

pub use lifecycle::{spawn_interrupt_handler, ShutdownSignal, ShutdownTrigger};
pub use setup::{setup, TestEnvHandle};

//! # Resource Watcher
//!
//! Launches the external resource watcher for every input that is not a CRD.
//!
//! The watcher is a TypeScript CLI run through `ts-node` from the framework
//! home. It applies the given resources through the proxy and keeps them in
//! sync. It runs in the background with inherited stdout/stderr; once it is
//! spawned its outcome is only logged, never escalated.

use crate::constants::{WATCHER_CLI_ENTRY, WATCHER_EXECUTABLE};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(
        "{} not found. Please run:\n\ncd {}\nyarn install",
        .executable.display(),
        .framework_home.display()
    )]
    ExecutableMissing {
        executable: PathBuf,
        framework_home: PathBuf,
    },
    #[error("failed to start {}: {source}", .executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fully resolved watcher invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherCommand {
    framework_home: PathBuf,
    executable: PathBuf,
    args: Vec<String>,
}

impl WatcherCommand {
    pub fn new<S: AsRef<str>>(framework_home: &Path, api_server: &str, resources: &[S]) -> Self {
        let resources = resources
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(",");

        Self {
            framework_home: framework_home.to_path_buf(),
            executable: framework_home.join(WATCHER_EXECUTABLE),
            args: vec![
                framework_home.join(WATCHER_CLI_ENTRY).display().to_string(),
                "--api-server".to_string(),
                api_server.trim_end_matches('/').to_string(),
                "--resources".to_string(),
                resources,
            ],
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn framework_home(&self) -> &Path {
        &self.framework_home
    }
}

/// How the watcher process ended
#[derive(Debug)]
pub enum WatcherOutcome {
    Exited(ExitStatus),
    Failed(std::io::Error),
    /// Supervision task was cancelled or panicked
    Lost,
}

impl WatcherOutcome {
    pub fn success(&self) -> bool {
        matches!(self, WatcherOutcome::Exited(status) if status.success())
    }
}

/// Handle on the supervision task of a running watcher
///
/// Dropping it detaches the watcher; it keeps running in the background.
#[derive(Debug)]
pub struct WatcherHandle {
    pid: Option<u32>,
    task: JoinHandle<WatcherOutcome>,
}

impl WatcherHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the watcher to exit
    pub async fn wait(self) -> WatcherOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Watcher supervision task ended: {}", e);
                WatcherOutcome::Lost
            }
        }
    }
}

/// Start the watcher for `resources`
///
/// Returns `Ok(None)` when there is nothing to watch.
pub fn launch_resource_watcher<S: AsRef<str>>(
    framework_home: &Path,
    api_server: &str,
    resources: &[S],
) -> Result<Option<WatcherHandle>, WatcherError> {
    if resources.is_empty() {
        return Ok(None);
    }

    let command = WatcherCommand::new(framework_home, api_server, resources);
    spawn_watcher(&command).map(Some)
}

/// Spawn a resolved watcher command
pub fn spawn_watcher(command: &WatcherCommand) -> Result<WatcherHandle, WatcherError> {
    if !command.executable.is_file() {
        error!("{} not found", command.executable.display());
        return Err(WatcherError::ExecutableMissing {
            executable: command.executable.clone(),
            framework_home: command.framework_home.clone(),
        });
    }

    info!(
        "Starting {} {}...",
        command.executable.display(),
        command.args.join(" ")
    );

    let mut child = Command::new(&command.executable)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| WatcherError::Spawn {
            executable: command.executable.clone(),
            source,
        })?;

    let pid = child.id();
    let task = tokio::spawn(async move {
        let outcome = match child.wait().await {
            Ok(status) => WatcherOutcome::Exited(status),
            Err(e) => WatcherOutcome::Failed(e),
        };

        info!("Done!");
        match &outcome {
            WatcherOutcome::Exited(status) if !status.success() => {
                info!("ts-node failed: {}", status);
            }
            WatcherOutcome::Failed(e) => info!("ts-node failed: {}", e),
            _ => {}
        }
        outcome
    });

    Ok(WatcherHandle { pid, task })
}

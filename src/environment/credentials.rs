//! # Credential Persistence
//!
//! Writes the environment's TLS material to well-known paths so tooling
//! outside this process (kubectl, curl, the watcher) can talk to the API
//! server directly. Best-effort: failures are logged and reported, never fatal.

use super::TlsClientConfig;
use crate::constants::{CA_CERT_PATH, CLIENT_CERT_PATH, CLIENT_KEY_PATH, CREDENTIAL_FILE_MODE};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Destination files for the persisted credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub cert: PathBuf,
    pub ca: PathBuf,
    pub key: PathBuf,
}

impl Default for CredentialPaths {
    fn default() -> Self {
        Self {
            cert: PathBuf::from(CLIENT_CERT_PATH),
            ca: PathBuf::from(CA_CERT_PATH),
            key: PathBuf::from(CLIENT_KEY_PATH),
        }
    }
}

impl CredentialPaths {
    /// Same file names under another directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cert: dir.join("cert.cert"),
            ca: dir.join("ca.cert"),
            key: dir.join("key.key"),
        }
    }
}

/// Persist client certificate, CA certificate and client key
///
/// Returns the paths that could not be written.
pub fn persist_credentials(tls: &TlsClientConfig, paths: &CredentialPaths) -> Vec<PathBuf> {
    let files: [(&Path, &[u8]); 3] = [
        (paths.cert.as_path(), tls.cert_data.as_slice()),
        (paths.ca.as_path(), tls.ca_data.as_slice()),
        (paths.key.as_path(), tls.key_data.as_slice()),
    ];

    let mut failed = Vec::new();
    for (path, data) in files {
        match write_credential(path, data) {
            Ok(()) => debug!("Wrote {}", path.display()),
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                failed.push(path.to_path_buf());
            }
        }
    }
    failed
}

fn write_credential(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)?;

    // Set explicitly so the result does not depend on the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(CREDENTIAL_FILE_MODE))?;
    }

    Ok(())
}

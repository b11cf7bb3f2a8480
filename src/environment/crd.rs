//! # CRD Installation
//!
//! Reads CRD manifests from files or directories, installs them with
//! server-side apply and waits until the API server serves them.

use super::EnvironmentError;
use crate::constants::{FIELD_MANAGER, MANIFEST_EXTENSIONS};
use futures::future::try_join_all;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use kube_runtime::wait::{await_condition, conditions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CRD_KIND: &str = "CustomResourceDefinition";

/// A CRD read from disk
#[derive(Debug, Clone)]
pub struct CrdManifest {
    pub name: String,
    pub source: PathBuf,
    pub crd: CustomResourceDefinition,
}

/// Manifest files behind a CRD path
///
/// A file stands for itself; a directory contributes its immediate
/// `.json`/`.yaml`/`.yml` children, sorted by name.
pub fn manifest_files(path: &Path) -> Result<Vec<PathBuf>, EnvironmentError> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|source| EnvironmentError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| EnvironmentError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file = entry.path();
        let is_manifest = file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if is_manifest && file.is_file() {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every CRD found under `paths`
///
/// Missing paths are an error when `error_if_missing` is set and skipped otherwise.
pub fn read_crds(
    paths: &[String],
    error_if_missing: bool,
) -> Result<Vec<CrdManifest>, EnvironmentError> {
    let mut manifests = Vec::new();

    for path in paths {
        let path = Path::new(path);
        if !path.exists() {
            if error_if_missing {
                return Err(EnvironmentError::CrdPathMissing {
                    path: path.display().to_string(),
                });
            }
            warn!("CRD path does not exist, skipping: {}", path.display());
            continue;
        }

        for file in manifest_files(path)? {
            let text =
                std::fs::read_to_string(&file).map_err(|source| EnvironmentError::ReadFile {
                    path: file.clone(),
                    source,
                })?;
            manifests.extend(parse_crds(&text, &file)?);
        }
    }

    Ok(manifests)
}

/// Parse a (multi-document) YAML or JSON manifest, keeping only CRDs
pub fn parse_crds(text: &str, source: &Path) -> Result<Vec<CrdManifest>, EnvironmentError> {
    let invalid = |reason: String| EnvironmentError::InvalidManifest {
        path: source.to_path_buf(),
        reason,
    };

    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| invalid(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let kind = value.get("kind").and_then(serde_yaml::Value::as_str);
        if kind != Some(CRD_KIND) {
            debug!(
                "Skipping non-CRD document ({}) in {}",
                kind.unwrap_or("no kind"),
                source.display()
            );
            continue;
        }

        let crd: CustomResourceDefinition = serde_yaml::from_value(value)
            .map_err(|e| invalid(e.to_string()))?;
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| invalid("CRD has no metadata.name".to_string()))?;

        manifests.push(CrdManifest {
            name,
            source: source.to_path_buf(),
            crd,
        });
    }

    Ok(manifests)
}

/// Apply every CRD, then wait until each one is established
///
/// Returns the names of the installed CRDs.
pub async fn install_crds(
    client: &Client,
    manifests: &[CrdManifest],
    timeout: Duration,
) -> Result<Vec<String>, EnvironmentError> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let patch_params = PatchParams::apply(FIELD_MANAGER).force();

    let mut installed = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        api.patch(&manifest.name, &patch_params, &Patch::Apply(&manifest.crd))
            .await?;
        info!(
            "Installed CRD {} from {}",
            manifest.name,
            manifest.source.display()
        );
        installed.push(manifest.name.clone());
    }

    // Waited on concurrently, each bounded by `timeout`
    try_join_all(
        installed
            .iter()
            .map(|name| wait_established(&api, name, timeout)),
    )
    .await?;

    Ok(installed)
}

async fn wait_established(
    api: &Api<CustomResourceDefinition>,
    name: &str,
    timeout: Duration,
) -> Result<(), EnvironmentError> {
    let established = await_condition(api.clone(), name, conditions::is_crd_established());
    match tokio::time::timeout(timeout, established).await {
        Ok(Ok(_)) => {
            debug!("CRD {} is established", name);
            Ok(())
        }
        Ok(Err(e)) => Err(EnvironmentError::Wait {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(EnvironmentError::CrdNotEstablished {
            name: name.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Delete previously installed CRDs; already-deleted ones are ignored
pub async fn uninstall_crds(client: &Client, names: &[String]) -> Result<(), EnvironmentError> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());

    for name in names {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleted CRD {}", name),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!("CRD {} already gone", name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

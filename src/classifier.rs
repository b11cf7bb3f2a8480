//! # Resource Classifier
//!
//! Partitions test environment inputs into CRD manifests and other resources.
//!
//! Classification is a preflight step: any input that cannot be classified
//! aborts the whole run before an environment is started.
//!
//! Rules, applied to the lowercased path:
//! - empty input: skipped
//! - `-crd(s).json|yaml|yml` suffix: CRD manifest
//! - `.json|.yaml|.yml|.js|.ts` suffix: other resource
//! - directory: every immediate child is classified in its place
//! - anything else: error

use crate::constants::{CRD_SUFFIXES, RESOURCE_SUFFIXES};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Unsupported test environment configuration: {path}")]
    Unsupported { path: String },
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}

/// What a single input path turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Crd,
    Resource,
    Directory,
    Unsupported,
}

/// Result of classifying the inputs, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedResources {
    pub crd_paths: Vec<String>,
    pub other_paths: Vec<String>,
}

impl ClassifiedResources {
    pub fn is_empty(&self) -> bool {
        self.crd_paths.is_empty() && self.other_paths.is_empty()
    }
}

/// Decide what kind of input `path` is
///
/// Suffix rules win over the filesystem: a directory named `foo.yaml` is a resource.
pub fn classify_path(path: &str) -> PathKind {
    let lowercase = path.to_lowercase();
    if CRD_SUFFIXES.iter().any(|suffix| lowercase.ends_with(suffix)) {
        PathKind::Crd
    } else if RESOURCE_SUFFIXES
        .iter()
        .any(|suffix| lowercase.ends_with(suffix))
    {
        PathKind::Resource
    } else if is_directory(path) {
        PathKind::Directory
    } else {
        PathKind::Unsupported
    }
}

/// Classify every input, expanding directories depth-first in place
///
/// Results from all inputs are merged; a directory never discards what was
/// classified before it.
pub fn classify_resources<S: AsRef<str>>(
    paths: &[S],
) -> Result<ClassifiedResources, ClassifyError> {
    let mut resources = ClassifiedResources::default();
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

    // Reversed so that popping yields input order
    let mut pending: Vec<String> = paths
        .iter()
        .rev()
        .map(|p| p.as_ref().to_string())
        .collect();

    while let Some(path) = pending.pop() {
        if path.is_empty() {
            continue;
        }

        match classify_path(&path) {
            PathKind::Crd => {
                info!(" - {}", path);
                resources.crd_paths.push(path);
            }
            PathKind::Resource => {
                info!(" - {}", path);
                resources.other_paths.push(path);
            }
            PathKind::Directory => {
                let canonical = std::fs::canonicalize(&path)
                    .unwrap_or_else(|_| PathBuf::from(&path));
                if !visited_dirs.insert(canonical) {
                    warn!("Skipping directory already expanded: {}", path);
                    continue;
                }
                let children = list_children(&path)?;
                pending.extend(children.into_iter().rev());
            }
            PathKind::Unsupported => {
                return Err(ClassifyError::Unsupported { path });
            }
        }
    }

    Ok(resources)
}

/// Immediate children of `dir` as `<dir>/<name>`, sorted by file name
fn list_children(dir: &str) -> Result<Vec<String>, ClassifyError> {
    let base = dir.trim_end_matches('/');
    let mut children = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ClassifyError::ReadDirectory {
            path: dir.to_string(),
            source,
        })?;
        children.push(format!("{}/{}", base, entry.file_name().to_string_lossy()));
    }

    Ok(children)
}

fn is_directory(path: &str) -> bool {
    std::fs::metadata(Path::new(path)).is_ok_and(|m| m.is_dir())
}

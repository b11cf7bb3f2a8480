//! # Classifier Integration Tests
//!
//! Realistic input layouts: several directories, nested directories and
//! files mixed with directories.

use console_testenv::classifier::{classify_resources, ClassifyError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), "").unwrap();
}

#[test]
fn test_multiple_directories_are_merged_in_order() {
    let root = TempDir::new().unwrap();
    let crds = root.path().join("crds");
    let resources = root.path().join("resources");
    fs::create_dir(&crds).unwrap();
    fs::create_dir(&resources).unwrap();
    touch(&crds, "widgets-crd.yaml");
    touch(&crds, "Gadgets-CRDS.JSON");
    touch(&resources, "widget.yaml");
    touch(&resources, "generator.ts");

    let crds_dir = crds.display().to_string();
    let resources_dir = resources.display().to_string();
    let classified = classify_resources(&[crds_dir.clone(), resources_dir.clone()]).unwrap();

    assert_eq!(
        classified.crd_paths,
        vec![
            format!("{crds_dir}/Gadgets-CRDS.JSON"),
            format!("{crds_dir}/widgets-crd.yaml"),
        ]
    );
    assert_eq!(
        classified.other_paths,
        vec![
            format!("{resources_dir}/generator.ts"),
            format!("{resources_dir}/widget.yaml"),
        ]
    );
}

#[test]
fn test_nested_directories_and_trailing_files() {
    let root = TempDir::new().unwrap();
    let outer = root.path().join("outer");
    let inner = outer.join("inner");
    fs::create_dir_all(&inner).unwrap();
    touch(&outer, "a.json");
    touch(&inner, "b-crd.yml");
    touch(root.path(), "c.js");

    let outer_dir = outer.display().to_string();
    let trailing = root.path().join("c.js").display().to_string();
    let inputs = [outer_dir.clone(), String::new(), trailing.clone()];
    let classified = classify_resources(&inputs).unwrap();

    assert_eq!(classified.crd_paths, vec![format!("{outer_dir}/inner/b-crd.yml")]);
    assert_eq!(
        classified.other_paths,
        vec![format!("{outer_dir}/a.json"), trailing]
    );
}

#[test]
fn test_unsupported_file_inside_directory_fails_the_run() {
    let root = TempDir::new().unwrap();
    touch(root.path(), "widgets-crd.yaml");
    touch(root.path(), "README.md");

    let err = classify_resources(&[root.path().display().to_string()]).unwrap_err();
    match err {
        ClassifyError::Unsupported { path } => assert!(path.ends_with("/README.md")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_empty_directory_contributes_nothing() {
    let root = TempDir::new().unwrap();
    let classified = classify_resources(&[root.path().display().to_string()]).unwrap();
    assert!(classified.is_empty());
}

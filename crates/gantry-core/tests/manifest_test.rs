use std::path::Path;

use gantry_core::{DependencyManifest, Error};
use tempfile::TempDir;

#[test]
fn load_reads_manifest_relative_to_project() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("deps")).unwrap();
    std::fs::write(
        tmp.path().join("deps/requirements.txt"),
        "flask==1.1.2\nboto3==1.14.31\n",
    )
    .unwrap();

    let manifest = DependencyManifest::load(tmp.path(), Path::new("deps/requirements.txt")).unwrap();

    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(manifest.entries[0].name, "boto3");
    assert!(manifest.path.ends_with("deps/requirements.txt"));
}

#[test]
fn missing_manifest_is_an_error() {
    let tmp = TempDir::new().unwrap();

    let err = DependencyManifest::load(tmp.path(), Path::new("requirements.txt")).unwrap_err();

    assert!(matches!(err, Error::ManifestMissing { .. }));
    assert!(err.to_string().contains("requirements.txt"));
}

#[test]
fn unpinned_entry_names_the_file_and_line() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("requirements.txt"),
        "# pinned\nflask==1.1.2\nwerkzeug\n",
    )
    .unwrap();

    let err = DependencyManifest::load(tmp.path(), Path::new("requirements.txt")).unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("requirements.txt:3"), "got: {msg}");
    assert!(msg.contains("werkzeug"), "got: {msg}");
}

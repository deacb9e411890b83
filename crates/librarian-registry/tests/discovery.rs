//! Directory discovery: depth limits, corruption detection and loading
//! discovered modules through the file unit loader.

mod common;

use std::path::Path;

use common::write_json;
use librarian_registry::source::scan_catalog;
use librarian_registry::{
    DirectoryScanner, Library, LibraryOptions, LoadState, PathStyle, Registry, RegistryError,
    RegistrySettings, ScanOptions,
};
use serde_json::json;
use tempfile::TempDir;

fn doc(id: &str) -> serde_json::Value {
    json!({"@context": "Library", "@id": id, "@type": "Package"})
}

/// `/r/config.json`, `/r/x/config.json`, `/r/x/y/config.json`.
fn nested_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "config.json", &doc("lib"));
    write_json(dir.path(), "x/config.json", &doc("lib.x"));
    write_json(dir.path(), "x/y/config.json", &doc("lib.x.y"));
    dir
}

async fn scanned_ids(root: &Path, depth: i32) -> Vec<String> {
    let scanner = DirectoryScanner::local(ScanOptions::new("Library"));
    let mut ids: Vec<String> = scanner
        .scan(root, depth)
        .await
        .unwrap()
        .into_iter()
        .map(|config| config.id.to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_scan_depth_limits() {
    let tree = nested_tree();
    assert_eq!(scanned_ids(tree.path(), 1).await, vec!["lib", "lib.x"]);
    assert_eq!(scanned_ids(tree.path(), 0).await, vec!["lib"]);
    assert!(scanned_ids(tree.path(), -1).await.is_empty());
    assert_eq!(
        scanned_ids(tree.path(), 3).await,
        vec!["lib", "lib.x", "lib.x.y"]
    );
}

#[tokio::test]
async fn test_duplicate_ids_corrupt_the_catalog() {
    let dir = TempDir::new().unwrap();
    write_json(dir.path(), "config.json", &doc("lib"));
    write_json(dir.path(), "a/config.json", &doc("lib.dup"));
    write_json(dir.path(), "b/config.json", &doc("lib.dup"));

    let scanner = DirectoryScanner::local(ScanOptions::new("Library"));
    let err = scan_catalog(&scanner, dir.path(), 3).await.unwrap_err();
    assert_eq!(err, RegistryError::CorruptedCatalog(vec!["lib.dup".into()]));

    let reg = Registry::new(RegistrySettings::default())
        .with_builtin_types()
        .unwrap();
    let err = reg.load_available(&scanner, dir.path(), 3).await.unwrap_err();
    assert!(matches!(err, RegistryError::CorruptedCatalog(_)));
    assert!(reg.available().is_empty());
}

#[tokio::test]
async fn test_discovered_module_loads_from_disk() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "config.json",
        &json!({
            "@context": "Library",
            "@graph": [
                {"@id": "lib", "@type": "Package"},
                {"@id": "lib.core", "@type": "Package"},
            ]
        }),
    );
    write_json(
        dir.path(),
        "core/is/config.json",
        &json!({
            "@context": "Library",
            "@graph": [
                {"@id": "lib.core.is:0.1.0", "@type": "Module", "path": "src/is_0.1.0.json"},
                {"@id": "lib.core.is", "@type": "Alias", "target": "lib.core.is:0.1.0"},
            ]
        }),
    );
    write_json(dir.path(), "core/is/src/is_0.1.0.json", &json!({"version": "0.1.0"}));
    // never scanned: lives under an excluded `src` directory
    write_json(dir.path(), "core/is/src/config.json", &doc("lib.core.hidden"));

    let reg = Registry::new(RegistrySettings::default())
        .with_builtin_types()
        .unwrap();
    let scanner = DirectoryScanner::local(ScanOptions::new("Library"));
    let count = reg.load_available(&scanner, dir.path(), 3).await.unwrap();
    assert_eq!(count, 4);
    assert!(!reg.is_available("lib.core.hidden"));

    let alias = reg.load_entry("lib.core.is").await.unwrap().unwrap();
    let exports = alias.load(&reg).await.unwrap().unwrap();
    assert_eq!(exports.as_value(), Some(&json!({"version": "0.1.0"})));

    let versioned = reg.get_entry("lib.core.is:0.1.0").unwrap().unwrap();
    assert_eq!(versioned.state(), LoadState::Loaded);
    let root = reg.get_entry("lib").unwrap().unwrap().exports().unwrap();
    let core = root.as_namespace().unwrap().get("core").unwrap();
    assert!(core.as_namespace().unwrap().contains("is:0.1.0"));
}

#[tokio::test]
async fn test_relative_url_paths() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "core/config.json",
        &json!({"@context": "Web-Library", "@id": "lib.core.m", "@type": "Module", "path": "src/m.js"}),
    );

    let options = ScanOptions::new("Web-Library").with_path_style(PathStyle::RelativeUrl {
        root: dir.path().to_path_buf(),
    });
    let configs = DirectoryScanner::local(options)
        .scan(dir.path(), 3)
        .await
        .unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].path(), Some("core/src/m.js"));
}

#[tokio::test]
async fn test_library_bootstraps_over_scanned_catalog() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "config.json",
        &json!({
            "@context": "Library",
            "@graph": [
                {"@id": "lib.core", "@type": "Package"},
                {"@id": "lib.core.settings", "@type": "Config", "@value": {"debug": true}},
                {"@id": "lib.core.data", "@type": "Module", "path": "data.json"},
            ]
        }),
    );
    write_json(dir.path(), "data.json", &json!([1, 2, 3]));

    let library = Library::new(LibraryOptions::local(dir.path(), 3)).unwrap();
    assert!(library.get("lib.core.data").is_none());

    let exports = library
        .load(&["lib.core.data", "lib.core.settings", "lib.core.unknown"])
        .await
        .unwrap();
    assert_eq!(exports[0].as_ref().unwrap().as_value(), Some(&json!([1, 2, 3])));
    assert_eq!(
        exports[1].as_ref().unwrap().as_value(),
        Some(&json!({"debug": true}))
    );
    assert!(exports[2].is_none());

    assert!(library.get("lib.core.data").is_some());
    let data = library.root().lookup("core.data").unwrap();
    assert_eq!(data.as_value(), Some(&json!([1, 2, 3])));
}

#[tokio::test]
async fn test_library_reports_discovery_failure() {
    let library =
        Library::new(LibraryOptions::local("/nonexistent/librarian/catalog", 3)).unwrap();
    let first = library.ready().await.unwrap_err();
    let second = library.load(&["lib.anything"]).await.unwrap_err();
    assert!(matches!(first, RegistryError::Io { .. }));
    assert_eq!(first, second);
}

//! Integration tests for artifact resolution and the artifact list cache.

use jacoco_coverage_exporter::resolver::ArtifactSpec;
use jacoco_coverage_exporter::{ArtifactResolver, ProviderConfig};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"x").unwrap();
}

fn spec(root: &Path, exclude: &[&str], cache: bool) -> ArtifactSpec {
    let mut config = ProviderConfig::remote("shop", "localhost", 6300);
    config.classes_locations = vec![root.to_path_buf()];
    config.exclude_patterns = exclude.iter().map(|s| s.to_string()).collect();
    config.enable_classes_cache = cache;
    ArtifactSpec::from_config(&config).unwrap()
}

fn file_names(files: &[std::path::PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn test_default_includes_and_excludes() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "com/acme/Shop.class");
    touch(dir.path(), "lib/acme.jar");
    touch(dir.path(), "maps/shop.classmap.json");
    touch(dir.path(), "generated/Proxy.class");
    touch(dir.path(), "README.md");

    let resolver = ArtifactResolver::new(None);
    let files = resolver.resolve(&spec(dir.path(), &["glob:**/generated/**"], true));

    let mut names = file_names(&files);
    names.sort();
    assert_eq!(names, vec!["Shop.class", "acme.jar", "shop.classmap.json"]);
    assert!(files.iter().all(|p| p.is_absolute()));
}

#[test]
fn test_cached_list_survives_new_files() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "A.class");
    let resolver = ArtifactResolver::new(None);
    let spec = spec(dir.path(), &[], true);

    assert_eq!(resolver.resolve(&spec).len(), 1);
    touch(dir.path(), "B.class");
    assert_eq!(resolver.resolve(&spec).len(), 1);
    assert_eq!(resolver.cached_len("shop"), Some(1));

    resolver.invalidate("shop");
    assert_eq!(resolver.cached_len("shop"), None);
    assert_eq!(resolver.resolve(&spec).len(), 2);
}

#[test]
fn test_disabled_cache_walks_every_time() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "A.class");
    let resolver = ArtifactResolver::new(None);
    let spec = spec(dir.path(), &[], false);

    assert_eq!(resolver.resolve(&spec).len(), 1);
    touch(dir.path(), "B.class");
    assert_eq!(resolver.resolve(&spec).len(), 2);
    assert_eq!(resolver.cached_len("shop"), None);
}

#[test]
fn test_empty_list_is_not_kept() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = ArtifactResolver::new(None);
    let spec = spec(dir.path(), &[], true);

    assert!(resolver.resolve(&spec).is_empty());
    // Deployed later, picked up on the next request
    touch(dir.path(), "A.class");
    assert_eq!(resolver.resolve(&spec).len(), 1);
}

#[test]
fn test_expired_list_is_resolved_again() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "A.class");
    let resolver = ArtifactResolver::new(Some(Duration::from_millis(20)));
    let spec = spec(dir.path(), &[], true);

    assert_eq!(resolver.resolve(&spec).len(), 1);
    touch(dir.path(), "B.class");
    thread::sleep(Duration::from_millis(40));
    assert_eq!(resolver.resolve(&spec).len(), 2);
}

#[test]
fn test_single_file_location() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "app.jar");
    let mut config = ProviderConfig::local("self");
    config.classes_locations = vec![dir.path().join("app.jar"), dir.path().join("missing")];

    let resolver = ArtifactResolver::new(None);
    let files = resolver.resolve(&ArtifactSpec::from_config(&config).unwrap());
    assert_eq!(file_names(&files), vec!["app.jar"]);
}

#[test]
fn test_invalidate_all_drops_every_provider() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "A.class");
    let resolver = ArtifactResolver::new(None);

    let mut other = ProviderConfig::remote("billing", "localhost", 6301);
    other.classes_locations = vec![dir.path().to_path_buf()];
    let other = ArtifactSpec::from_config(&other).unwrap();

    resolver.resolve(&spec(dir.path(), &[], true));
    resolver.resolve(&other);
    assert_eq!(resolver.cached_len("shop"), Some(1));
    assert_eq!(resolver.cached_len("billing"), Some(1));

    resolver.invalidate_all();
    assert_eq!(resolver.cached_len("shop"), None);
    assert_eq!(resolver.cached_len("billing"), None);
}

#[test]
fn test_walk_descends_nested_directories() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a/b/c/d/Deep.class");
    touch(dir.path(), "a/Top.class");

    let files = jacoco_coverage_exporter::resolver::walk_artifacts(
        &[dir.path().to_path_buf()],
        &jacoco_coverage_exporter::resolver::ArtifactFilter::default(),
    );
    let mut names = file_names(&files);
    names.sort();
    assert_eq!(names, vec!["Deep.class", "Top.class"]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_not_followed() {
    let outside = tempfile::tempdir().unwrap();
    touch(outside.path(), "Foreign.class");
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "Own.class");
    std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

    let resolver = ArtifactResolver::new(None);
    let files = resolver.resolve(&spec(dir.path(), &[], false));
    assert_eq!(file_names(&files), vec!["Own.class"]);
}

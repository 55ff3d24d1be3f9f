//! Unit tests for building catalog sources from registry entries

use catalog_crawler::catalog::{create_source, CatalogError, CatalogSource, SourceOptions};
use catalog_crawler::registry::StoreRegistry;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_credentials(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("credentials.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_fdroid_needs_no_credentials() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("F-Droid").unwrap();
    let dir = TempDir::new().unwrap();

    let source = create_source(store, SourceOptions::new(dir.path())).unwrap();
    assert_eq!(source.store(), "fdroid");
}

#[test]
fn test_rest_without_credentials_fails_before_any_request() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("rest").unwrap();
    let dir = TempDir::new().unwrap();

    let result = create_source(store, SourceOptions::new(dir.path()));
    assert!(matches!(result, Err(CatalogError::MissingCredentials(name)) if name == "rest"));
}

#[test]
fn test_rest_with_credentials_file() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("catalog-api").unwrap();
    let dir = TempDir::new().unwrap();
    let credentials = write_credentials(
        &dir,
        "token = \"abc\"\nbase_url = \"https://catalog.example.com/api\"\n",
    );

    let options = SourceOptions::new(dir.path()).with_credentials(Some(credentials));
    let source = create_source(store, options).unwrap();
    assert_eq!(source.store(), "rest");
}

#[test]
fn test_rest_without_any_base_url_fails() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("rest").unwrap();
    let dir = TempDir::new().unwrap();
    let credentials = write_credentials(&dir, "token = \"abc\"\n");

    let options = SourceOptions::new(dir.path()).with_credentials(Some(credentials));
    let result = create_source(store, options);
    assert!(matches!(result, Err(CatalogError::MissingBaseUrl(_))));
}

#[test]
fn test_base_url_flag_overrides_credentials_file() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("rest").unwrap();
    let dir = TempDir::new().unwrap();
    let credentials = write_credentials(&dir, "token = \"abc\"\n");

    let options = SourceOptions::new(dir.path())
        .with_credentials(Some(credentials))
        .with_base_url(Some("http://127.0.0.1:1/api".to_string()));
    assert!(create_source(store, options).is_ok());
}

#[test]
fn test_empty_token_is_rejected() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("rest").unwrap();
    let dir = TempDir::new().unwrap();
    let credentials = write_credentials(&dir, "token = \"  \"\nbase_url = \"https://x\"\n");

    let options = SourceOptions::new(dir.path()).with_credentials(Some(credentials));
    let result = create_source(store, options);
    assert!(matches!(result, Err(CatalogError::InvalidCredentials(_))));
}

#[test]
fn test_missing_credentials_file_is_rejected() {
    let registry = StoreRegistry::load().unwrap();
    let store = registry.get("rest").unwrap();
    let dir = TempDir::new().unwrap();

    let options =
        SourceOptions::new(dir.path()).with_credentials(Some(dir.path().join("absent.toml")));
    let result = create_source(store, options);
    assert!(matches!(result, Err(CatalogError::InvalidCredentials(_))));
}

#[test]
fn test_page_size_floor() {
    let options = SourceOptions::new("/tmp").with_page_size(0);
    assert_eq!(options.page_size, 1);
}

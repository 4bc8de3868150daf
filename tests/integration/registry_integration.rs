//! Registry Integration Tests
//!
//! Complete workflows through the public API: configuration to service,
//! package submit and sync, bulk add, lookup, delete and export.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use rhino_plugins::config::ConfigManager;
use rhino_plugins::plugin::{
    ActionAttribute, PackageUpload, PluginSourceKind, RegistryService, RegistrySettings, StaticActionProvider,
    StatusCode,
};

fn specification(name: &str) -> String {
    format!(
        "[test-id] {}\n[test-scenario] Integration plugin {}\n[test-actions]\n1. click on {{{{$ --locator:id}}}}\n",
        name, name
    )
}

fn archive(entries: &[(&str, String)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn upload(id: &str, entries: &[(&str, String)]) -> PackageUpload {
    PackageUpload {
        id: id.to_string(),
        file_data: STANDARD.encode(archive(entries)),
    }
}

fn service(settings: RegistrySettings) -> RegistryService {
    RegistryService::builder()
        .settings(settings)
        .code_provider(Arc::new(StaticActionProvider::new(vec![
            ActionAttribute::new("OpenBrowser", "Opens a browser"),
            ActionAttribute::new("Click", "Clicks an element"),
        ])))
        .build()
        .unwrap()
}

fn archive_paths(bytes: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut paths = Vec::new();
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        paths.push(entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string());
    }
    paths
}

#[tokio::test]
async fn test_submit_then_sync_publishes_package() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));

    let before = registry.get_all().await.unwrap();
    assert_eq!(before.len(), 2);

    let result = registry
        .submit(upload("Sample", &[("ClickButton/ClickButton.rhino", specification("ClickButton"))]))
        .await;
    assert_eq!(result.status_code, StatusCode::Created);
    assert!(temp_dir.path().join("RhinoSample/ClickButton/ClickButton.rhino").exists());

    // Not visible until the cache is synchronized
    assert!(registry.find_by_id("ClickButton").await.unwrap().is_none());

    let synced = registry.sync().await;
    assert_eq!(synced.status_code, StatusCode::Ok);

    let listing = registry.get_all_text().await.unwrap();
    assert!(listing.contains("RhinoSample\tClickButton\tclick button\tDirectory"));
    assert!(listing.starts_with("Gravity\t"));
}

#[tokio::test]
async fn test_bulk_add_lookup_and_delete() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));
    let payload = format!("{}>>>\n{}", specification("LoginUser"), specification("LogoutUser"));

    let outcome = registry.add(&payload, false).await.unwrap();
    assert_eq!(outcome.affected, 2);
    assert!(!outcome.is_stale());

    let entry = registry.get_by_id("loginuser").await.unwrap();
    assert_eq!(entry.descriptor().key(), "LoginUser");
    assert_eq!(entry.descriptor().literal(), "login user");
    assert_eq!(entry.directory(), Some("RhinoPlugins"));
    assert!(entry.specification().unwrap().contains("[test-id] LoginUser"));

    let outcome = registry.delete("LOGINUSER").await.unwrap();
    assert_eq!(outcome.affected, 1);
    assert!(registry.get_by_id("LoginUser").await.unwrap_err().is_not_found());
    assert!(registry.get_by_id("LogoutUser").await.is_ok());
}

#[tokio::test]
async fn test_file_plugin_shadows_code_action() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));

    registry.add(&specification("click"), false).await.unwrap();

    let entry = registry.get_by_id("Click").await.unwrap();
    assert_eq!(entry.descriptor().source(), PluginSourceKind::Directory);

    // Both remain in the listing under their own packages
    let listings = registry.get_all().await.unwrap();
    let clicks: Vec<_> = listings.iter().filter(|l| l.key.eq_ignore_ascii_case("click")).collect();
    assert_eq!(clicks.len(), 2);
    assert_eq!(clicks[0].package, "Gravity");
    assert_eq!(clicks[1].package, "RhinoPlugins");
}

#[tokio::test]
async fn test_invalid_file_is_skipped_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let broken = temp_dir.path().join("RhinoBroken/Nameless");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("Nameless.rhino"), "[test-actions]\n1. nothing\n").unwrap();

    let registry = service(RegistrySettings::with_root(temp_dir.path()));
    registry.add(&specification("Healthy"), false).await.unwrap();

    let status = registry.status().await.unwrap();
    assert_eq!(status.skipped, 1);
    assert_eq!(status.file_backed_actions, 1);
    assert!(registry.get_by_id("Healthy").await.is_ok());
}

#[tokio::test]
async fn test_private_add_with_configured_key() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let root = temp_dir.path().join("Plugins");
    std::fs::write(
        &config_path,
        format!(
            "[plugins]\nroot = {:?}\nencryption-key = \"integration-key\"\n",
            root.to_string_lossy()
        ),
    )
    .unwrap();

    let settings = ConfigManager::load_from_file(config_path).unwrap().get_registry_settings().unwrap();
    assert_eq!(settings.root, root);
    let registry = service(settings);

    registry.add(&specification("SecretLogin"), true).await.unwrap();

    let stored = std::fs::read(root.join("RhinoPrivate/SecretLogin/SecretLogin.rhino")).unwrap();
    assert!(!String::from_utf8_lossy(&stored).contains("[test-id]"));

    let entry = registry.get_by_id("secretlogin").await.unwrap();
    assert!(entry.specification().unwrap().contains("[test-id] SecretLogin"));
}

#[tokio::test]
async fn test_export_contains_every_package() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));

    assert!(registry.export().await.unwrap_err().is_not_found());

    registry.add(&specification("PublicOne"), false).await.unwrap();
    registry
        .submit(upload("RhinoExtra", &[("ExtraOne/ExtraOne.rhino", specification("ExtraOne"))]))
        .await;

    let exported = registry.export().await.unwrap();
    let paths = archive_paths(&exported);
    assert!(paths.contains(&"RhinoPlugins/PublicOne/PublicOne.rhino".to_string()));
    assert!(paths.contains(&"RhinoExtra/ExtraOne/ExtraOne.rhino".to_string()));

    assert_eq!(&exported[..2], &[0x1f, 0x8b]);
}

#[tokio::test]
async fn test_delete_all_leaves_code_actions() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));
    registry.add(&specification("One"), false).await.unwrap();
    registry.add(&specification("Two"), true).await.unwrap();

    let outcome = registry.delete_all().await.unwrap();
    assert_eq!(outcome.affected, 2);
    assert!(!Path::new(&temp_dir.path().join("RhinoPlugins")).exists());

    let listings = registry.get_all().await.unwrap();
    assert_eq!(listings.len(), 2);
    assert!(listings.iter().all(|l| l.source == PluginSourceKind::Code));
}

#[test]
fn test_blocking_caller_can_drive_the_service() {
    let temp_dir = TempDir::new().unwrap();
    let registry = service(RegistrySettings::with_root(temp_dir.path()));

    let result = tokio_test::block_on(registry.sync());
    assert!(result.is_success());
    assert_eq!(result.to_json().unwrap(), format!(
        "{{\"statusCode\":200,\"message\":{:?}}}",
        result.message
    ));
}

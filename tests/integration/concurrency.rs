//! Concurrency Tests
//!
//! Readers running alongside a slow rebuild must always see one complete
//! generation, and concurrent writers must all end up published.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tempfile::TempDir;

use rhino_plugins::plugin::discovery::ScanItem;
use rhino_plugins::plugin::{
    ActionAttribute, ActionListing, FileSystemSource, PassThroughCipher, RegistryService, RegistrySettings,
    SpecificationSource, StaticActionProvider,
};

/// Filesystem source that stalls on every package read
struct SlowSource {
    inner: FileSystemSource,
    delay: Duration,
    reads: AtomicUsize,
}

impl SlowSource {
    fn new(root: &Path, delay: Duration) -> Self {
        Self {
            inner: FileSystemSource::new(root, "Rhino", Arc::new(PassThroughCipher), ""),
            delay,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpecificationSource for SlowSource {
    async fn list_package_directories(&self) -> Vec<PathBuf> {
        self.inner.list_package_directories().await
    }

    async fn read_package_specifications(&self, directory: &Path) -> Vec<ScanItem> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.read_package_specifications(directory).await
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }
}

fn specification(name: &str) -> String {
    format!("[test-id] {}\n[test-actions]\n1. open {{{{$ --url:home}}}}\n", name)
}

fn write_package(root: &Path, package: &str, plugins: &[&str]) {
    for plugin in plugins {
        let dir = root.join(package).join(plugin);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.rhino", plugin)), specification(plugin)).unwrap();
    }
}

fn registry(root: &Path, source: Arc<SlowSource>) -> Arc<RegistryService> {
    Arc::new(
        RegistryService::builder()
            .settings(RegistrySettings::with_root(root))
            .source(source)
            .code_provider(Arc::new(StaticActionProvider::new(vec![ActionAttribute::new(
                "OpenBrowser",
                "Opens a browser",
            )])))
            .build()
            .unwrap(),
    )
}

/// Packages appear as contiguous runs: code package first, then by name
fn assert_package_order(listings: &[ActionListing]) {
    let mut runs: Vec<&str> = Vec::new();
    for listing in listings {
        if runs.last() != Some(&listing.package.as_str()) {
            assert!(!runs.contains(&listing.package.as_str()), "package {} split", listing.package);
            runs.push(&listing.package);
        }
    }
    assert_eq!(runs.first(), Some(&"Gravity"));
    let file_packages: Vec<String> = runs[1..].iter().map(|name| name.to_lowercase()).collect();
    let mut sorted = file_packages.clone();
    sorted.sort();
    assert_eq!(file_packages, sorted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_generations_during_sync() {
    let temp_dir = TempDir::new().unwrap();
    write_package(temp_dir.path(), "RhinoAlpha", &["AlphaOne", "AlphaTwo"]);
    write_package(temp_dir.path(), "RhinoBeta", &["BetaOne", "BetaTwo"]);

    let source = Arc::new(SlowSource::new(temp_dir.path(), Duration::from_millis(25)));
    let service = registry(temp_dir.path(), source.clone());

    let before = service.get_all().await.unwrap();
    assert_eq!(before.len(), 5);
    let generation = service.store().generation();

    write_package(temp_dir.path(), "RhinoGamma", &["GammaOne", "GammaTwo"]);

    let sync = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.sync().await })
    };

    let readers = (0..16).map(|i| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5 * i)).await;
            service.get_all().await.unwrap()
        })
    });

    for listing in join_all(readers).await {
        let listing = listing.unwrap();
        assert!(listing.len() == 5 || listing.len() == 7, "partial generation of {}", listing.len());
        assert_package_order(&listing);
    }

    assert!(sync.await.unwrap().is_success());
    assert_eq!(service.store().generation(), generation + 1);

    let after = service.get_all().await.unwrap();
    assert_eq!(after.len(), 7);
    assert_package_order(&after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_are_all_published() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(SlowSource::new(temp_dir.path(), Duration::from_millis(5)));
    let service = registry(temp_dir.path(), source.clone());

    let names: Vec<String> = (0..8).map(|i| format!("Concurrent{}", i)).collect();
    let adds = names.iter().map(|name| {
        let service = Arc::clone(&service);
        let text = specification(name);
        tokio::spawn(async move { service.add(&text, false).await })
    });

    for outcome in join_all(adds).await {
        let outcome = outcome.unwrap().unwrap();
        assert_eq!(outcome.affected, 1);
        assert!(!outcome.is_stale());
    }

    for name in &names {
        let entry = service.get_by_id(name).await.unwrap();
        assert_eq!(entry.directory(), Some("RhinoPlugins"));
    }
    // one initial build plus at most one rebuild per add
    assert!(service.store().generation() <= names.len() as u64 + 1);
    assert!(source.reads.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_simultaneous_first_reads_build_once() {
    let temp_dir = TempDir::new().unwrap();
    write_package(temp_dir.path(), "RhinoAlpha", &["AlphaOne"]);
    let source = Arc::new(SlowSource::new(temp_dir.path(), Duration::from_millis(20)));
    let service = registry(temp_dir.path(), source.clone());

    let reads = (0..6).map(|_| {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.snapshot().await.unwrap() })
    });
    let snapshots: Vec<_> = join_all(reads).await.into_iter().map(|s| s.unwrap()).collect();

    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    assert_eq!(service.store().generation(), 1);
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);
}

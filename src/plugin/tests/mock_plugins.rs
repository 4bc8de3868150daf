//! Mock Collaborators and Fixtures for Testing
//!
//! Code action providers, sources and parsers with controllable behaviour,
//! plus helpers that lay out package trees and package archives.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::plugin::builtin::StaticActionProvider;
use crate::plugin::cache::CacheBuilder;
use crate::plugin::crypto::PassThroughCipher;
use crate::plugin::discovery::{FileSystemSource, ScanItem, SpecificationSource};
use crate::plugin::error::{RegistryError, RegistryResult};
use crate::plugin::parser::RhinoSpecParser;
use crate::plugin::service::RegistryService;
use crate::plugin::settings::RegistrySettings;
use crate::plugin::traits::{ActionAttribute, CodeActionProvider, Encryptor, ParsedPlugin, PluginParser};

/// Code actions used by most fixtures
pub fn code_actions() -> Vec<ActionAttribute> {
    vec![
        ActionAttribute::new("OpenBrowser", "Opens a browser"),
        ActionAttribute::new("Click", "Clicks an element"),
    ]
}

/// A minimal valid specification named `name`
pub fn specification(name: &str) -> String {
    format!(
        "[test-id] {}\n[test-scenario] Fixture plugin {}\n[test-actions]\n1. click on {{{{$ --locator:id}}}}\n",
        name, name
    )
}

/// Write `text` to `<root>/<package>/<plugin>/<plugin>.rhino`
pub fn write_spec(root: &Path, package: &str, plugin: &str, text: &str) -> PathBuf {
    let dir = root.join(package).join(plugin);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}.rhino", plugin));
    std::fs::write(&path, text).unwrap();
    path
}

/// Gzip tar holding `(path, content)` regular file entries
pub fn package_archive(entries: &[(&str, &str)]) -> Vec<u8> {
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

/// Gzip tar with one entry whose name is written verbatim, bypassing the
/// path checks of the tar builder
pub fn raw_tar_gz(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder.append(&header, data).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// Code action provider that can be switched into failure
pub struct ToggleActionProvider {
    actions: Vec<ActionAttribute>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl ToggleActionProvider {
    pub fn new(actions: Vec<ActionAttribute>) -> Self {
        Self {
            actions,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeActionProvider for ToggleActionProvider {
    fn list_actions(&self) -> RegistryResult<Vec<ActionAttribute>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::internal("reflection unavailable"));
        }
        Ok(self.actions.clone())
    }
}

/// Encryptor that always fails
pub struct FailingEncryptor;

impl Encryptor for FailingEncryptor {
    fn encrypt(&self, _bytes: &[u8], _key: &str) -> RegistryResult<Vec<u8>> {
        Err(RegistryError::internal("cipher unavailable"))
    }
}

/// Parser that counts invocations
#[derive(Default)]
pub struct CountingParser {
    inner: RhinoSpecParser,
    calls: AtomicUsize,
}

impl CountingParser {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PluginParser for CountingParser {
    fn parse(&self, raw_text: &str) -> RegistryResult<ParsedPlugin> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(raw_text)
    }
}

/// Source wrapper that delays package reads and counts scans
pub struct InstrumentedSource {
    inner: Arc<dyn SpecificationSource>,
    delay: Duration,
    scans: AtomicUsize,
}

impl InstrumentedSource {
    pub fn new(inner: Arc<dyn SpecificationSource>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            scans: AtomicUsize::new(0),
        }
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpecificationSource for InstrumentedSource {
    async fn list_package_directories(&self) -> Vec<PathBuf> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.list_package_directories().await
    }

    async fn read_package_specifications(&self, directory: &Path) -> Vec<ScanItem> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.read_package_specifications(directory).await
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }
}

/// Plain filesystem source over `root`
pub fn plain_source(root: &Path) -> Arc<FileSystemSource> {
    Arc::new(FileSystemSource::new(root, "Rhino", Arc::new(PassThroughCipher), ""))
}

/// Cache builder over `root` with the given code provider
pub fn cache_builder(source: Arc<dyn SpecificationSource>, provider: Arc<dyn CodeActionProvider>) -> CacheBuilder {
    CacheBuilder::new(source, Arc::new(RhinoSpecParser::new()), provider, "Gravity")
}

/// Service over `root` with the fixture code actions
pub fn service_at(root: &Path) -> RegistryService {
    RegistryService::builder()
        .settings(RegistrySettings::with_root(root))
        .code_provider(Arc::new(StaticActionProvider::new(code_actions())))
        .build()
        .unwrap()
}

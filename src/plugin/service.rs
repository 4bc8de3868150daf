//! Plugin Registry Service
//!
//! Operation surface over the registry: reads are served from the published
//! snapshot, writes go to package storage first and then rebuild.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::plugin::builtin::InventoryActionProvider;
use crate::plugin::cache::{render_listing, ActionListing, CacheBuilder, PluginCacheEntry, Snapshot};
use crate::plugin::crypto::AesGcmCipher;
use crate::plugin::discovery::{FileSystemSource, SpecificationSource};
use crate::plugin::error::{RegistryError, RegistryResult, StatusCode};
use crate::plugin::parser::{specification_label, split_specifications, RhinoSpecParser};
use crate::plugin::registry::{RebuildState, RegistryStore};
use crate::plugin::repository::{PluginRepository, StagedPackage};
use crate::plugin::settings::RegistrySettings;
use crate::plugin::traits::{CodeActionProvider, Decryptor, Encryptor, ParsedPlugin, PluginParser};

/// Result of a write that reached storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Specifications or packages written or removed
    pub affected: usize,
    /// Set when the rebuild after the write failed; the cache is behind storage
    pub stale: Option<String>,
}

impl MutationOutcome {
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }
}

/// Status and message returned by submit and sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub status_code: StatusCode,
    pub message: String,
}

impl OperationResult {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn from_error(error: &RegistryError) -> Self {
        Self::new(error.status(), error.message())
    }

    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    pub fn to_json(&self) -> RegistryResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An uploaded package: `file_data` is base64 of a gzip tar of `<Plugin>/<file>` entries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageUpload {
    pub id: String,
    pub file_data: String,
}

/// Point-in-time summary of the registry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub root: PathBuf,
    pub generation: u64,
    pub built_at: Option<DateTime<Local>>,
    pub state: String,
    pub packages: usize,
    pub actions: usize,
    pub file_backed_actions: usize,
    pub skipped: usize,
    pub stale: Option<String>,
}

/// The plugin registry
pub struct RegistryService {
    settings: RegistrySettings,
    store: RegistryStore,
    builder: CacheBuilder,
    repository: PluginRepository,
    decryptor: Arc<dyn Decryptor>,
    writes: tokio::sync::Mutex<()>,
}

impl RegistryService {
    pub fn builder() -> RegistryServiceBuilder {
        RegistryServiceBuilder::new()
    }

    /// Service over `settings` with the default collaborators
    pub fn with_settings(settings: RegistrySettings) -> RegistryResult<Self> {
        RegistryServiceBuilder::new().settings(settings).build()
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn state(&self) -> RebuildState {
        self.store.state()
    }

    pub fn stale_reason(&self) -> Option<String> {
        self.store.stale_reason()
    }

    /// Drop the published snapshot; the next read rebuilds
    pub fn reset(&self) {
        self.store.reset();
    }

    /// Published snapshot, built on first use.
    ///
    /// A stale snapshot triggers a rebuild first; if that fails too the
    /// stale snapshot is served.
    pub async fn snapshot(&self) -> RegistryResult<Arc<Snapshot>> {
        let current = match self.store.load() {
            None => return self.store.rebuild(&self.builder, Some(0)).await,
            Some(current) => current,
        };

        if !self.store.is_stale() {
            return Ok(current);
        }

        match self.store.rebuild(&self.builder, Some(self.store.write_sequence())).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("Serving stale generation {}: {}", current.generation(), e);
                Ok(current)
            }
        }
    }

    /// Every action, by package then by key
    pub async fn get_all(&self) -> RegistryResult<Vec<ActionListing>> {
        Ok(self.snapshot().await?.listings())
    }

    /// Plain-text listing, one line per action
    pub async fn get_all_text(&self) -> RegistryResult<String> {
        Ok(render_listing(&self.get_all().await?))
    }

    /// Case-insensitive lookup by key
    pub async fn find_by_id(&self, id: &str) -> RegistryResult<Option<PluginCacheEntry>> {
        Ok(self.snapshot().await?.find(id).cloned())
    }

    pub async fn get_by_id(&self, id: &str) -> RegistryResult<PluginCacheEntry> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("plugin '{}' was not found", id)))
    }

    /// Parse and store one or more `>>>`-separated specifications.
    ///
    /// Nothing is written unless every specification parses.
    pub async fn add(&self, specifications: &str, is_private: bool) -> RegistryResult<MutationOutcome> {
        let texts = split_specifications(specifications);
        if texts.is_empty() {
            return Err(RegistryError::bad_request("no specifications were supplied"));
        }

        let parser = self.builder.parser();
        let mut plugins: Vec<ParsedPlugin> = Vec::with_capacity(texts.len());
        for (position, text) in texts.iter().enumerate() {
            let plugin = parser.parse(text).map_err(|e| {
                RegistryError::bad_request(format!(
                    "specification #{} ({}) is invalid: {}",
                    position + 1,
                    specification_label(text),
                    e.message()
                ))
            })?;
            plugins.push(plugin);
        }

        let package = if is_private {
            &self.settings.private_package
        } else {
            &self.settings.public_package
        };

        let seq = {
            let _writes = self.writes.lock().await;
            let published = match self.snapshot().await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!("No published snapshot to resolve replaced files: {}", e);
                    None
                }
            };

            let mut written = 0;
            for plugin in &plugins {
                let previous: Vec<PathBuf> = published
                    .as_deref()
                    .and_then(|snapshot| snapshot.package(package))
                    .and_then(|cache| cache.find(&plugin.name))
                    .and_then(|entry| entry.path().map(|p| p.to_path_buf()))
                    .into_iter()
                    .collect();

                let result = match self
                    .repository
                    .write_plugin(package, &plugin.name, &plugin.specification, is_private)
                    .await
                {
                    Ok(path) => {
                        written += 1;
                        self.repository.retire_replaced(&path, &previous).await.map(|_| ())
                    }
                    Err(e) => Err(e),
                };

                if let Err(e) = result {
                    if written > 0 {
                        self.store.record_write();
                        self.store.mark_stale(format!(
                            "add stopped after {} of {} writes: {}",
                            written,
                            plugins.len(),
                            e.message()
                        ));
                    }
                    return Err(e);
                }
            }
            self.store.record_write()
        };

        info!("Added {} specifications to {}", plugins.len(), package);
        Ok(self.refresh_after_write(seq, plugins.len()).await)
    }

    /// Remove one file-backed specification by key
    pub async fn delete(&self, id: &str) -> RegistryResult<MutationOutcome> {
        let snapshot = self.snapshot().await?;
        let path = snapshot
            .find_file_backed(id)
            .and_then(|entry| entry.path().map(|p| p.to_path_buf()))
            .ok_or_else(|| RegistryError::not_found(format!("plugin '{}' was not found in any package", id)))?;

        let seq = {
            let _writes = self.writes.lock().await;
            self.repository.delete_plugin(&path).await?;
            self.store.record_write()
        };

        info!("Deleted plugin {}", id);
        Ok(self.refresh_after_write(seq, 1).await)
    }

    /// Remove every file-backed package; code actions are untouched
    pub async fn delete_all(&self) -> RegistryResult<MutationOutcome> {
        let (seq, removed) = {
            let _writes = self.writes.lock().await;
            let directories = self.builder.source().list_package_directories().await;
            let removed = self.repository.delete_all_packages(&directories).await?;
            (self.store.record_write(), removed)
        };

        Ok(self.refresh_after_write(seq, removed).await)
    }

    /// Create or replace a whole package. The cache is not refreshed; call
    /// [`RegistryService::sync`] afterwards.
    pub async fn submit(&self, upload: PackageUpload) -> OperationResult {
        match self.submit_package(upload).await {
            Ok(message) => OperationResult::new(StatusCode::Created, message),
            Err(e) => {
                warn!("Package submit failed: {}", e);
                OperationResult::from_error(&e)
            }
        }
    }

    async fn submit_package(&self, upload: PackageUpload) -> RegistryResult<String> {
        let package = self.repository.package_name_for(&upload.id)?;
        let archive = STANDARD.decode(upload.file_data.trim())?;
        if archive.is_empty() {
            return Err(RegistryError::bad_request(format!("package '{}' has no content", package)));
        }

        let _writes = self.writes.lock().await;
        let staged = self.repository.stage_package(&package, archive).await?;

        if let Err(e) = self.validate_staged(&staged).await {
            self.repository.discard_package(staged).await;
            return Err(e);
        }

        let count = staged.files.len();
        self.repository.commit_package(staged).await?;
        self.store.record_write();

        Ok(format!(
            "Package {} was created with {} specifications; sync the cache to apply it",
            package, count
        ))
    }

    async fn validate_staged(&self, staged: &StagedPackage) -> RegistryResult<()> {
        for relative in &staged.files {
            let bytes = fs::read(staged.staging_dir.join(relative)).await?;
            let invalid = |reason: String| {
                RegistryError::bad_request(format!(
                    "package entry {} is invalid: {}",
                    relative.display(),
                    reason
                ))
            };

            let decrypted = self
                .decryptor
                .decrypt(&bytes, &self.settings.encryption_key)
                .map_err(|e| invalid(e.message().to_string()))?;
            let text = String::from_utf8(decrypted).map_err(|_| invalid("content is not valid UTF-8".to_string()))?;
            self.builder
                .parser()
                .parse(&text)
                .map_err(|e| invalid(e.message().to_string()))?;
        }
        debug!("Validated {} staged specifications for {}", staged.files.len(), staged.package);
        Ok(())
    }

    /// Unconditional full rebuild
    pub async fn sync(&self) -> OperationResult {
        match self.store.rebuild(&self.builder, None).await {
            Ok(snapshot) => OperationResult::new(
                StatusCode::Ok,
                format!(
                    "Plugins cache synchronized: generation {}, {} actions, {} skipped",
                    snapshot.generation(),
                    snapshot.descriptor_count(),
                    snapshot.skipped().len()
                ),
            ),
            Err(e) => OperationResult::new(StatusCode::InternalError, format!("sync failed: {}", e.message())),
        }
    }

    /// Gzip tar of every package directory
    pub async fn export(&self) -> RegistryResult<Vec<u8>> {
        let directories = self.builder.source().list_package_directories().await;
        if directories.is_empty() {
            return Err(RegistryError::not_found("there are no plugin packages to export"));
        }
        self.repository.export_archive(directories).await
    }

    pub async fn status(&self) -> RegistryResult<RegistryStatus> {
        let snapshot = self.snapshot().await?;
        Ok(RegistryStatus {
            root: self.settings.root.clone(),
            generation: snapshot.generation(),
            built_at: Some(snapshot.built_at()),
            state: self.store.state().to_string(),
            packages: snapshot.packages().len(),
            actions: snapshot.descriptor_count(),
            file_backed_actions: snapshot.file_backed_count(),
            skipped: snapshot.skipped().len(),
            stale: self.store.stale_reason(),
        })
    }

    async fn refresh_after_write(&self, seq: u64, affected: usize) -> MutationOutcome {
        match self.store.rebuild(&self.builder, Some(seq)).await {
            Ok(_) => MutationOutcome { affected, stale: None },
            Err(e) => {
                let reason = format!("rebuild after write {} failed: {}", seq, e.message());
                self.store.mark_stale(reason.clone());
                MutationOutcome {
                    affected,
                    stale: Some(reason),
                }
            }
        }
    }
}

/// Builder for [`RegistryService`]
pub struct RegistryServiceBuilder {
    settings: Option<RegistrySettings>,
    source: Option<Arc<dyn SpecificationSource>>,
    parser: Option<Arc<dyn PluginParser>>,
    decryptor: Option<Arc<dyn Decryptor>>,
    encryptor: Option<Arc<dyn Encryptor>>,
    code_provider: Option<Arc<dyn CodeActionProvider>>,
}

impl RegistryServiceBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            source: None,
            parser: None,
            decryptor: None,
            encryptor: None,
            code_provider: None,
        }
    }

    pub fn settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Replace the filesystem scanner
    pub fn source(mut self, source: Arc<dyn SpecificationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn PluginParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn code_provider(mut self, provider: Arc<dyn CodeActionProvider>) -> Self {
        self.code_provider = Some(provider);
        self
    }

    pub fn build(self) -> RegistryResult<RegistryService> {
        let settings = self.settings.unwrap_or_default();
        settings
            .validate()
            .map_err(|e| RegistryError::bad_request(format!("invalid registry settings: {}", e)))?;

        let decryptor = self.decryptor.unwrap_or_else(|| Arc::new(AesGcmCipher));
        let encryptor = self.encryptor.unwrap_or_else(|| Arc::new(AesGcmCipher));
        let parser = self.parser.unwrap_or_else(|| Arc::new(RhinoSpecParser::new()));
        let code_provider = self.code_provider.unwrap_or_else(|| Arc::new(InventoryActionProvider));
        let source = match self.source {
            Some(source) => source,
            None => Arc::new(FileSystemSource::new(
                &settings.root,
                settings.package_prefix.clone(),
                Arc::clone(&decryptor),
                settings.encryption_key.clone(),
            )),
        };

        debug!("Plugin registry rooted at {}", settings.root.display());

        Ok(RegistryService {
            builder: CacheBuilder::new(source, parser, code_provider, settings.code_package.clone()),
            repository: PluginRepository::new(settings.clone(), encryptor),
            store: RegistryStore::new(),
            decryptor,
            settings,
            writes: tokio::sync::Mutex::new(()),
        })
    }
}

impl Default for RegistryServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

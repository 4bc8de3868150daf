//! Plugin Package Storage
//!
//! Writes, removes, stages and archives the package tree under the plugin
//! root. Nothing here touches the published snapshot; callers rebuild after
//! a successful write.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tar::{Archive, Builder, EntryType};
use tokio::fs;

use crate::plugin::descriptor::canonical_key;
use crate::plugin::discovery::{has_package_prefix, is_hidden, leaf_name};
use crate::plugin::error::{RegistryError, RegistryResult};
use crate::plugin::settings::{is_single_component, RegistrySettings};
use crate::plugin::traits::Encryptor;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden sibling name used for staging and retiring packages
fn scratch_name(kind: &str, package: &str) -> String {
    format!(
        ".{}-{}-{}-{}",
        kind,
        package,
        std::process::id(),
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Reject absolute paths and parent traversal; drop `.` components
pub fn sanitize_archive_path(path: &Path) -> RegistryResult<PathBuf> {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(RegistryError::bad_request(format!(
                    "archive entry escapes destination: {}",
                    path.display()
                )));
            }
            Component::CurDir => {}
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(RegistryError::bad_request("archive entry has empty path"));
    }
    Ok(cleaned)
}

/// A package extracted next to the root, not yet visible to scans
#[derive(Debug)]
pub struct StagedPackage {
    pub package: String,
    pub staging_dir: PathBuf,
    /// Extracted specification files, relative to `staging_dir`
    pub files: Vec<PathBuf>,
}

/// Filesystem storage for file-backed packages
pub struct PluginRepository {
    settings: RegistrySettings,
    encryptor: Arc<dyn Encryptor>,
}

impl PluginRepository {
    pub fn new(settings: RegistrySettings, encryptor: Arc<dyn Encryptor>) -> Self {
        Self { settings, encryptor }
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Package name for an upload id, adding the family prefix when missing
    pub fn package_name_for(&self, id: &str) -> RegistryResult<String> {
        let id = id.trim();
        if !is_single_component(id) {
            return Err(RegistryError::bad_request(format!("invalid package id '{}'", id)));
        }
        if has_package_prefix(id, &self.settings.package_prefix) {
            Ok(id.to_string())
        } else {
            Ok(format!("{}{}", self.settings.package_prefix, id))
        }
    }

    /// Existing child directory of `parent` whose name matches case-insensitively
    async fn find_child_dir(parent: &Path, name: &str) -> RegistryResult<Option<PathBuf>> {
        if !fs::try_exists(parent).await? {
            return Ok(None);
        }
        let wanted = canonical_key(name);
        let mut entries = fs::read_dir(parent).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() && canonical_key(&leaf_name(&path)) == wanted {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Write one specification as `<package>/<name>/<name>.<ext>`.
    ///
    /// An existing plugin directory with the same name in any case is
    /// reused. On error nothing under the root has changed apart from a
    /// possibly created empty directory; older files are left for
    /// [`PluginRepository::retire_replaced`].
    pub async fn write_plugin(&self, package: &str, name: &str, text: &str, is_private: bool) -> RegistryResult<PathBuf> {
        let content = if is_private {
            self.encryptor.encrypt(text.as_bytes(), &self.settings.encryption_key)?
        } else {
            text.as_bytes().to_vec()
        };

        let package_dir = match Self::find_child_dir(&self.settings.root, package).await? {
            Some(dir) => dir,
            None => self.settings.root.join(package),
        };
        let plugin_dir = match Self::find_child_dir(&package_dir, name).await? {
            Some(dir) => dir,
            None => package_dir.join(name),
        };
        fs::create_dir_all(&plugin_dir).await?;

        let target = plugin_dir.join(format!("{}.{}", name, self.settings.file_extension));
        let temporary = plugin_dir.join(scratch_name("write", name));
        if let Err(e) = fs::write(&temporary, &content).await {
            let _ = fs::remove_file(&temporary).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temporary, &target).await {
            let _ = fs::remove_file(&temporary).await;
            return Err(e.into());
        }

        debug!("Wrote specification {}", target.display());
        Ok(target)
    }

    /// Remove what a freshly written specification replaces: every other
    /// visible file in its plugin directory, plus `previous` files that
    /// carried the same id elsewhere in the package.
    pub async fn retire_replaced(&self, written: &Path, previous: &[PathBuf]) -> RegistryResult<usize> {
        let mut retired = 0;

        if let Some(plugin_dir) = written.parent() {
            let mut entries = fs::read_dir(plugin_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path != written && !is_hidden(&path) && entry.file_type().await?.is_file() {
                    debug!("Replacing previous specification {}", path.display());
                    fs::remove_file(&path).await?;
                    retired += 1;
                }
            }
        }

        for path in previous {
            if path == written || !path.starts_with(&self.settings.root) {
                continue;
            }
            match self.delete_plugin(path).await {
                Ok(()) => retired += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        Ok(retired)
    }

    /// Remove one specification file, then its plugin and package
    /// directories when they are left empty
    pub async fn delete_plugin(&self, path: &Path) -> RegistryResult<()> {
        if !path.starts_with(&self.settings.root) {
            return Err(RegistryError::internal(format!(
                "refusing to delete {} outside the plugin root",
                path.display()
            )));
        }

        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::not_found(format!("specification {} no longer exists", path.display())));
            }
            Err(e) => return Err(e.into()),
        }

        let plugin_dir = path.parent();
        let package_dir = plugin_dir.and_then(Path::parent);
        for dir in [plugin_dir, package_dir].into_iter().flatten() {
            if dir == self.settings.root.as_path() || !dir.starts_with(&self.settings.root) {
                break;
            }
            if !Self::remove_if_empty(dir).await? {
                break;
            }
        }

        debug!("Deleted specification {}", path.display());
        Ok(())
    }

    async fn remove_if_empty(dir: &Path) -> RegistryResult<bool> {
        let mut entries = fs::read_dir(dir).await?;
        if entries.next_entry().await?.is_some() {
            return Ok(false);
        }
        fs::remove_dir(dir).await?;
        debug!("Removed empty directory {}", dir.display());
        Ok(true)
    }

    /// Remove the given package directories; returns how many were removed
    pub async fn delete_all_packages(&self, directories: &[PathBuf]) -> RegistryResult<usize> {
        let mut removed = 0;
        for directory in directories {
            if !directory.starts_with(&self.settings.root) {
                warn!("Skipping package {} outside the plugin root", directory.display());
                continue;
            }
            fs::remove_dir_all(directory).await?;
            removed += 1;
        }
        info!("Removed {} package directories", removed);
        Ok(removed)
    }

    /// Extract a gzip tar archive of `<Plugin>/<file>` entries into a
    /// hidden staging directory under the root
    pub async fn stage_package(&self, package: &str, archive: Vec<u8>) -> RegistryResult<StagedPackage> {
        fs::create_dir_all(&self.settings.root).await?;
        let staging_dir = self.settings.root.join(scratch_name("staging", package));
        fs::create_dir(&staging_dir).await?;

        let destination = staging_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_package(&archive, &destination)).await;

        let files = match extracted {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                let _ = fs::remove_dir_all(&staging_dir).await;
                return Err(e);
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging_dir).await;
                return Err(e.into());
            }
        };

        debug!("Staged {} files for package {}", files.len(), package);
        Ok(StagedPackage {
            package: package.to_string(),
            staging_dir,
            files,
        })
    }

    /// Swap a staged package in place of any existing package of that name
    pub async fn commit_package(&self, staged: StagedPackage) -> RegistryResult<PathBuf> {
        let existing = Self::find_child_dir(&self.settings.root, &staged.package).await?;
        let target = self.settings.root.join(&staged.package);

        let retired = match existing {
            Some(current) => {
                let retired = self.settings.root.join(scratch_name("retired", &staged.package));
                fs::rename(&current, &retired).await?;
                Some((current, retired))
            }
            None => None,
        };

        if let Err(e) = fs::rename(&staged.staging_dir, &target).await {
            if let Some((current, retired)) = &retired {
                let _ = fs::rename(retired, current).await;
            }
            let _ = fs::remove_dir_all(&staged.staging_dir).await;
            return Err(e.into());
        }

        if let Some((_, retired)) = retired {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!("Failed to remove retired package {}: {}", retired.display(), e);
            }
        }

        info!("Committed package {} ({} files)", staged.package, staged.files.len());
        Ok(target)
    }

    pub async fn discard_package(&self, staged: StagedPackage) {
        if let Err(e) = fs::remove_dir_all(&staged.staging_dir).await {
            warn!("Failed to discard staging directory {}: {}", staged.staging_dir.display(), e);
        }
    }

    /// Gzip tar of the given package directories, rooted at their leaf names
    pub async fn export_archive(&self, directories: Vec<PathBuf>) -> RegistryResult<Vec<u8>> {
        let bytes = tokio::task::spawn_blocking(move || -> RegistryResult<Vec<u8>> {
            let encoder = GzEncoder::new(Vec::new(), Compression::default());
            let mut builder = Builder::new(encoder);
            for directory in &directories {
                builder.append_dir_all(leaf_name(directory), directory)?;
            }
            let encoder = builder.into_inner()?;
            Ok(encoder.finish()?)
        })
        .await??;

        debug!("Exported {} bytes", bytes.len());
        Ok(bytes)
    }
}

fn extract_package(archive: &[u8], destination: &Path) -> RegistryResult<Vec<PathBuf>> {
    let malformed = |e: std::io::Error| RegistryError::bad_request(format!("malformed package archive: {}", e));

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(archive)));
    let mut files = Vec::new();

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let raw_path = entry.path().map_err(malformed)?.to_path_buf();
        let relative = sanitize_archive_path(&raw_path)?;
        let depth = relative.components().count();
        let out = destination.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                if depth > 1 {
                    return Err(RegistryError::bad_request(format!(
                        "archive entry {} is nested too deep; expected <Plugin>/<file>",
                        raw_path.display()
                    )));
                }
                std::fs::create_dir_all(&out)?;
            }
            EntryType::Regular => {
                if depth != 2 {
                    return Err(RegistryError::bad_request(format!(
                        "archive entry {} must be laid out as <Plugin>/<file>",
                        raw_path.display()
                    )));
                }
                if let Some(parent) = out.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                entry.unpack(&out)?;
                files.push(relative);
            }
            other => {
                return Err(RegistryError::bad_request(format!(
                    "archive entry {} has unsupported type {:?}",
                    raw_path.display(),
                    other
                )));
            }
        }
    }

    if files.is_empty() {
        return Err(RegistryError::bad_request("package archive contains no specifications"));
    }

    files.sort();
    Ok(files)
}

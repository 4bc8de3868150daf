//! Plugin Source Discovery
//!
//! Enumerates package directories under the configured root and reads the
//! raw specification files they hold, decrypting each one on the way in.
//!
//! Layout: `<root>/<Package>/<Plugin>/<file>`; only package directories whose
//! leaf name starts with the package-family prefix are considered.

use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::plugin::descriptor::canonical_key;
use crate::plugin::traits::Decryptor;

/// Raw text of one specification file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpecification {
    /// Leaf name of the owning package directory
    pub package: String,
    /// File the text was read from
    pub path: PathBuf,
    /// Decrypted specification text
    pub text: String,
}

/// A single file that could not be turned into specification text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of reading one file
pub type ScanItem = Result<RawSpecification, ScanFailure>;

/// Source of file-backed plugin specifications
#[async_trait]
pub trait SpecificationSource: Send + Sync {
    /// Package directories under the root, ordered by canonical leaf name.
    ///
    /// Never fails: a missing or unreadable root yields an empty list.
    async fn list_package_directories(&self) -> Vec<PathBuf>;

    /// Every file under every immediate subdirectory of `directory`.
    ///
    /// A missing directory yields an empty list; a failure on one file is
    /// reported for that file only.
    async fn read_package_specifications(&self, directory: &Path) -> Vec<ScanItem>;

    /// Root directory being scanned
    fn root(&self) -> &Path;
}

/// Leaf name of a directory path
pub fn leaf_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Dot-files are scratch space for in-progress writes
pub fn is_hidden(path: &Path) -> bool {
    leaf_name(path).starts_with('.')
}

/// True when `name` belongs to the package family identified by `prefix`
pub fn has_package_prefix(name: &str, prefix: &str) -> bool {
    canonical_key(name).starts_with(&canonical_key(prefix))
}

/// Filesystem-backed specification source
pub struct FileSystemSource {
    root: PathBuf,
    prefix: String,
    decryptor: Arc<dyn Decryptor>,
    encryption_key: String,
}

impl FileSystemSource {
    /// Create a new source over `root`
    pub fn new<P: AsRef<Path>>(
        root: P,
        prefix: impl Into<String>,
        decryptor: Arc<dyn Decryptor>,
        encryption_key: impl Into<String>,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            prefix: prefix.into(),
            decryptor,
            encryption_key: encryption_key.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Immediate children of `dir` of the wanted kind that satisfy `keep`,
    /// sorted by path. Symlinks are judged by what they point at.
    async fn sorted_children(
        dir: &Path,
        want_dirs: bool,
        keep: impl Fn(&Path) -> bool,
    ) -> std::io::Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !keep(&path) {
                continue;
            }

            let mut file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                match fs::metadata(&path).await {
                    Ok(metadata) => file_type = metadata.file_type(),
                    Err(e) => {
                        debug!("Skipping dangling link {}: {}", path.display(), e);
                        continue;
                    }
                }
            }

            let wanted = if want_dirs { file_type.is_dir() } else { file_type.is_file() };
            if wanted {
                children.push(path);
            }
        }
        children.sort();
        Ok(children)
    }

    async fn read_file(&self, package: &str, path: PathBuf) -> ScanItem {
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(ScanFailure {
                    path,
                    reason: format!("read failed: {}", e),
                })
            }
        };

        let decrypted = match self.decryptor.decrypt(&bytes, &self.encryption_key) {
            Ok(decrypted) => decrypted,
            Err(e) => {
                return Err(ScanFailure {
                    path,
                    reason: format!("decrypt failed: {}", e.message()),
                })
            }
        };

        match String::from_utf8(decrypted) {
            Ok(text) => Ok(RawSpecification {
                package: package.to_string(),
                path,
                text,
            }),
            Err(_) => Err(ScanFailure {
                path,
                reason: "content is not valid UTF-8".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SpecificationSource for FileSystemSource {
    async fn list_package_directories(&self) -> Vec<PathBuf> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            debug!("Plugin root {} does not exist", self.root.display());
            return Vec::new();
        }

        let prefix = self.prefix.clone();
        let children =
            Self::sorted_children(&self.root, true, |path| has_package_prefix(&leaf_name(path), &prefix)).await;

        match children {
            Ok(mut directories) => {
                directories.sort_by_key(|path| canonical_key(&leaf_name(path)));
                debug!("Found {} package directories under {}", directories.len(), self.root.display());
                directories
            }
            Err(e) => {
                warn!("Failed to read plugin root {}: {}", self.root.display(), e);
                Vec::new()
            }
        }
    }

    async fn read_package_specifications(&self, directory: &Path) -> Vec<ScanItem> {
        if !fs::try_exists(directory).await.unwrap_or(false) {
            return Vec::new();
        }

        let package = leaf_name(directory);
        let plugin_dirs = match Self::sorted_children(directory, true, |_| true).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Failed to read package directory {}: {}", directory.display(), e);
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for plugin_dir in plugin_dirs {
            let files = match Self::sorted_children(&plugin_dir, false, |path| !is_hidden(path)).await {
                Ok(files) => files,
                Err(e) => {
                    items.push(Err(ScanFailure {
                        path: plugin_dir.clone(),
                        reason: format!("read failed: {}", e),
                    }));
                    continue;
                }
            };

            for file in files {
                items.push(self.read_file(&package, file).await);
            }
        }

        items
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

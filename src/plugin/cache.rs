//! Plugin Cache
//!
//! Immutable snapshot of every known action grouped by owning package, and
//! the builder that assembles one from the code provider and package storage.

use chrono::{DateTime, Local};
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::plugin::descriptor::{canonical_key, ActionDescriptor, PluginSourceKind};
use crate::plugin::discovery::{leaf_name, ScanItem, SpecificationSource};
use crate::plugin::error::{RegistryError, RegistryResult};
use crate::plugin::registry::RebuildState;
use crate::plugin::traits::{CodeActionProvider, PluginParser};

/// Where a cache entry came from; only directory entries carry storage details
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOrigin {
    Code,
    Directory {
        /// Leaf name of the owning package directory
        directory: String,
        /// Specification file
        path: PathBuf,
        /// Plugin body text
        specification: String,
    },
}

/// One cached action with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCacheEntry {
    descriptor: ActionDescriptor,
    origin: CacheOrigin,
}

impl PluginCacheEntry {
    pub fn new(descriptor: ActionDescriptor, origin: CacheOrigin) -> Self {
        Self { descriptor, origin }
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    pub fn origin(&self) -> &CacheOrigin {
        &self.origin
    }

    pub fn directory(&self) -> Option<&str> {
        match &self.origin {
            CacheOrigin::Directory { directory, .. } => Some(directory),
            CacheOrigin::Code => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            CacheOrigin::Directory { path, .. } => Some(path),
            CacheOrigin::Code => None,
        }
    }

    pub fn specification(&self) -> Option<&str> {
        match &self.origin {
            CacheOrigin::Directory { specification, .. } => Some(specification),
            CacheOrigin::Code => None,
        }
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.origin, CacheOrigin::Directory { .. })
    }
}

/// Sealed collection of the actions of one package
#[derive(Debug, Clone)]
pub struct PackageCache {
    name: String,
    is_code: bool,
    descriptors: Vec<ActionDescriptor>,
    entries: HashMap<String, PluginCacheEntry>,
}

impl PackageCache {
    /// Seal a package from entries in read order.
    ///
    /// A repeated key keeps the entry that came last; descriptors end up
    /// sorted ascending by canonical key.
    pub fn seal(name: impl Into<String>, is_code: bool, entries: Vec<PluginCacheEntry>) -> Self {
        let mut by_key: HashMap<String, PluginCacheEntry> = HashMap::with_capacity(entries.len());
        for entry in entries {
            by_key.insert(entry.descriptor.canonical_key(), entry);
        }

        let mut descriptors: Vec<ActionDescriptor> = by_key.values().map(|e| e.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| {
            a.canonical_key()
                .cmp(&b.canonical_key())
                .then_with(|| a.key().cmp(b.key()))
        });

        Self {
            name: name.into(),
            is_code,
            descriptors,
            entries: by_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_code(&self) -> bool {
        self.is_code
    }

    /// Descriptors sorted ascending by key
    pub fn descriptors(&self) -> &[ActionDescriptor] {
        &self.descriptors
    }

    pub fn entries(&self) -> impl Iterator<Item = &PluginCacheEntry> {
        self.entries.values()
    }

    /// Case-insensitive lookup inside this package
    pub fn find(&self, id: &str) -> Option<&PluginCacheEntry> {
        self.entries.get(&canonical_key(id))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A specification left out of a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSpecification {
    pub package: String,
    pub path: PathBuf,
    pub reason: String,
}

/// One line of the bulk listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionListing {
    pub package: String,
    pub key: String,
    pub literal: String,
    pub source: PluginSourceKind,
}

impl fmt::Display for ActionListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.package, self.key, self.literal, self.source)
    }
}

/// Newline-joined listing text
pub fn render_listing(listings: &[ActionListing]) -> String {
    listings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// One published generation of the registry.
///
/// Packages are held in processing order: the code package first, then file
/// packages by canonical name. The global index is filled in that order so a
/// later package wins a key collision.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    built_at: DateTime<Local>,
    packages: Vec<PackageCache>,
    by_package: HashMap<String, usize>,
    index: HashMap<String, usize>,
    skipped: Vec<SkippedSpecification>,
}

impl Snapshot {
    pub fn new(
        generation: u64,
        code_package: PackageCache,
        mut file_packages: Vec<PackageCache>,
        skipped: Vec<SkippedSpecification>,
    ) -> Self {
        file_packages.sort_by_key(|p| canonical_key(p.name()));

        let mut packages = Vec::with_capacity(file_packages.len() + 1);
        packages.push(code_package);
        packages.extend(file_packages);

        let mut by_package = HashMap::with_capacity(packages.len());
        let mut index = HashMap::new();
        for (position, package) in packages.iter().enumerate() {
            by_package.insert(canonical_key(package.name()), position);
            for descriptor in package.descriptors() {
                index.insert(descriptor.canonical_key(), position);
            }
        }

        Self {
            generation,
            built_at: Local::now(),
            packages,
            by_package,
            index,
            skipped,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Local> {
        self.built_at
    }

    /// Packages in processing order
    pub fn packages(&self) -> &[PackageCache] {
        &self.packages
    }

    /// Case-insensitive package lookup
    pub fn package(&self, name: &str) -> Option<&PackageCache> {
        self.by_package.get(&canonical_key(name)).map(|&i| &self.packages[i])
    }

    pub fn code_package(&self) -> &PackageCache {
        &self.packages[0]
    }

    pub fn file_packages(&self) -> &[PackageCache] {
        &self.packages[1..]
    }

    /// Resolve an id across all packages
    pub fn find(&self, id: &str) -> Option<&PluginCacheEntry> {
        let key = canonical_key(id);
        self.index
            .get(&key)
            .and_then(|&i| self.packages[i].entries.get(&key))
    }

    /// Resolve an id among file-backed packages only
    pub fn find_file_backed(&self, id: &str) -> Option<&PluginCacheEntry> {
        let key = canonical_key(id);
        self.file_packages()
            .iter()
            .rev()
            .find_map(|package| package.entries.get(&key))
    }

    /// Listing of every descriptor, by package then by key
    pub fn listings(&self) -> Vec<ActionListing> {
        self.packages
            .iter()
            .flat_map(|package| {
                package.descriptors().iter().map(move |descriptor| ActionListing {
                    package: package.name().to_string(),
                    key: descriptor.key().to_string(),
                    literal: descriptor.literal().to_string(),
                    source: descriptor.source(),
                })
            })
            .collect()
    }

    pub fn descriptor_count(&self) -> usize {
        self.packages.iter().map(PackageCache::len).sum()
    }

    pub fn file_backed_count(&self) -> usize {
        self.file_packages().iter().map(PackageCache::len).sum()
    }

    pub fn skipped(&self) -> &[SkippedSpecification] {
        &self.skipped
    }
}

/// Assembles snapshots from the configured collaborators
pub struct CacheBuilder {
    source: Arc<dyn SpecificationSource>,
    parser: Arc<dyn PluginParser>,
    code_provider: Arc<dyn CodeActionProvider>,
    code_package: String,
}

impl CacheBuilder {
    pub fn new(
        source: Arc<dyn SpecificationSource>,
        parser: Arc<dyn PluginParser>,
        code_provider: Arc<dyn CodeActionProvider>,
        code_package: impl Into<String>,
    ) -> Self {
        Self {
            source,
            parser,
            code_provider,
            code_package: code_package.into(),
        }
    }

    pub fn source(&self) -> &Arc<dyn SpecificationSource> {
        &self.source
    }

    pub fn parser(&self) -> &Arc<dyn PluginParser> {
        &self.parser
    }

    /// Build a complete snapshot.
    ///
    /// Only a code provider failure or a failed blocking task fails the
    /// build; single bad specifications land in `skipped`.
    pub async fn build(
        &self,
        generation: u64,
        on_phase: &(dyn Fn(RebuildState) + Send + Sync),
    ) -> RegistryResult<Snapshot> {
        on_phase(RebuildState::Scanning);

        let attributes = self
            .code_provider
            .list_actions()
            .map_err(|e| RegistryError::internal(format!("code action provider failed: {}", e.message())))?;
        let code_entries: Vec<PluginCacheEntry> = attributes
            .into_iter()
            .map(|attribute| PluginCacheEntry::new(ActionDescriptor::from_code_attribute(attribute), CacheOrigin::Code))
            .collect();
        let code_package = PackageCache::seal(self.code_package.clone(), true, code_entries);

        let mut scanned: Vec<(String, Vec<ScanItem>)> = Vec::new();
        for directory in self.source.list_package_directories().await {
            let items = self.source.read_package_specifications(&directory).await;
            debug!("Read {} specifications from {}", items.len(), directory.display());
            scanned.push((leaf_name(&directory), items));
        }

        on_phase(RebuildState::Parsing);

        let parser = Arc::clone(&self.parser);
        let (file_packages, skipped) = tokio::task::spawn_blocking(move || parse_packages(parser.as_ref(), scanned)).await?;

        for failure in &skipped {
            warn!(
                "Skipped specification {} in package {}: {}",
                failure.path.display(),
                failure.package,
                failure.reason
            );
        }

        Ok(Snapshot::new(generation, code_package, file_packages, skipped))
    }
}

fn parse_packages(
    parser: &dyn PluginParser,
    scanned: Vec<(String, Vec<ScanItem>)>,
) -> (Vec<PackageCache>, Vec<SkippedSpecification>) {
    let mut packages = Vec::with_capacity(scanned.len());
    let mut skipped = Vec::new();

    for (package, items) in scanned {
        let parsed: Vec<Result<PluginCacheEntry, SkippedSpecification>> = items
            .into_par_iter()
            .map(|item| -> Result<PluginCacheEntry, SkippedSpecification> {
                let raw = item.map_err(|failure| SkippedSpecification {
                    package: package.clone(),
                    path: failure.path,
                    reason: failure.reason,
                })?;
                match parser.parse(&raw.text) {
                    Ok(plugin) => Ok(PluginCacheEntry::new(
                        ActionDescriptor::from_plugin(&plugin),
                        CacheOrigin::Directory {
                            directory: raw.package,
                            path: raw.path,
                            specification: plugin.specification,
                        },
                    )),
                    Err(e) => Err(SkippedSpecification {
                        package: package.clone(),
                        path: raw.path,
                        reason: format!("parse failed: {}", e.message()),
                    }),
                }
            })
            .collect();

        let mut entries = Vec::with_capacity(parsed.len());
        for result in parsed {
            match result {
                Ok(entry) => entries.push(entry),
                Err(failure) => skipped.push(failure),
            }
        }
        packages.push(PackageCache::seal(package, false, entries));
    }

    (packages, skipped)
}

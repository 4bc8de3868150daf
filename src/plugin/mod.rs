//! Plugin Registry Module
//!
//! Discovers automation actions compiled into the process and plugin
//! specifications stored in on-disk packages, and serves them from one
//! consistent, concurrently readable snapshot.
//!
//! # Example Usage
//!
//! ```no_run
//! use rhino_plugins::plugin::{RegistryService, RegistrySettings};
//!
//! # async fn example() -> rhino_plugins::plugin::RegistryResult<()> {
//! let registry = RegistryService::with_settings(RegistrySettings::with_root("./Plugins"))?;
//! for listing in registry.get_all().await? {
//!     println!("{}", listing);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod cache;
pub mod crypto;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod parser;
pub mod registry;
pub mod repository;
pub mod service;
pub mod settings;
pub mod traits;

#[cfg(test)]
pub mod tests;

pub use builtin::{InventoryActionProvider, StaticActionProvider};
pub use cache::{ActionListing, CacheBuilder, CacheOrigin, PackageCache, PluginCacheEntry, SkippedSpecification, Snapshot};
pub use crypto::{AesGcmCipher, PassThroughCipher};
pub use descriptor::{ActionDescriptor, PluginSourceKind, Verb};
pub use discovery::{FileSystemSource, RawSpecification, SpecificationSource};
pub use error::{RegistryError, RegistryResult, StatusCode};
pub use parser::RhinoSpecParser;
pub use registry::{RebuildState, RegistryStore};
pub use repository::PluginRepository;
pub use service::{MutationOutcome, OperationResult, PackageUpload, RegistryService, RegistryServiceBuilder, RegistryStatus};
pub use settings::{RegistrySettings, SettingsError};
pub use traits::{ActionAttribute, CodeActionProvider, Decryptor, Encryptor, ParsedPlugin, PluginParser};

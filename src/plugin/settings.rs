//! Registry Settings
//!
//! Locations and naming rules the registry works with. Built from the
//! `[plugins]` configuration section or constructed directly by embedders.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::plugin::discovery::has_package_prefix;

pub const DEFAULT_ROOT: &str = "Plugins";
pub const DEFAULT_PACKAGE_PREFIX: &str = "Rhino";
pub const DEFAULT_CODE_PACKAGE: &str = "Gravity";
pub const DEFAULT_PUBLIC_PACKAGE: &str = "RhinoPlugins";
pub const DEFAULT_PRIVATE_PACKAGE: &str = "RhinoPrivate";
pub const DEFAULT_FILE_EXTENSION: &str = "rhino";

/// Settings validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Package prefix must not be empty")]
    EmptyPrefix,

    #[error("Package name '{name}' must be a single path component")]
    InvalidPackageName { name: String },

    #[error("Package '{name}' must start with the package prefix '{prefix}'")]
    MissingPrefix { name: String, prefix: String },

    #[error("Code package '{name}' must not start with the package prefix '{prefix}'")]
    CodePackageShadowsFiles { name: String, prefix: String },

    #[error("File extension '{extension}' is invalid")]
    InvalidExtension { extension: String },
}

/// Settings for the plugin registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Directory holding the package directories
    pub root: PathBuf,
    /// Case-insensitive prefix every package directory name starts with
    pub package_prefix: String,
    /// Reserved package name holding code actions
    pub code_package: String,
    /// Package receiving public additions
    pub public_package: String,
    /// Package receiving private additions
    pub private_package: String,
    /// Data encryption key; empty disables encryption
    pub encryption_key: String,
    /// Extension of specification files written by the registry
    pub file_extension: String,
}

impl RegistrySettings {
    /// Default settings rooted at `root`
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = key.into();
        self
    }

    /// Validate naming rules
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.package_prefix.trim().is_empty() {
            return Err(SettingsError::EmptyPrefix);
        }

        for name in [&self.public_package, &self.private_package] {
            if !is_single_component(name) {
                return Err(SettingsError::InvalidPackageName { name: name.clone() });
            }
            if !has_package_prefix(name, &self.package_prefix) {
                return Err(SettingsError::MissingPrefix {
                    name: name.clone(),
                    prefix: self.package_prefix.clone(),
                });
            }
        }

        if !is_single_component(&self.code_package) {
            return Err(SettingsError::InvalidPackageName { name: self.code_package.clone() });
        }
        if has_package_prefix(&self.code_package, &self.package_prefix) {
            return Err(SettingsError::CodePackageShadowsFiles {
                name: self.code_package.clone(),
                prefix: self.package_prefix.clone(),
            });
        }

        if self.file_extension.is_empty() || !self.file_extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SettingsError::InvalidExtension {
                extension: self.file_extension.clone(),
            });
        }

        Ok(())
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
            code_package: DEFAULT_CODE_PACKAGE.to_string(),
            public_package: DEFAULT_PUBLIC_PACKAGE.to_string(),
            private_package: DEFAULT_PRIVATE_PACKAGE.to_string(),
            encryption_key: String::new(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }
}

/// True for a non-empty name that is not `.`/`..` and has no separators
pub fn is_single_component(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

//! Collaborator Contracts
//!
//! Interfaces the registry core consumes but does not own: the specification
//! parser, the at-rest cipher and the in-process code action provider.

use serde::{Deserialize, Serialize};

use crate::plugin::error::RegistryResult;

/// Metadata describing one automation action.
///
/// Code actions carry this straight from their registration; file-backed
/// plugins derive it from the parsed specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAttribute {
    /// Declared action name, used verbatim as the descriptor key
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Alternative names accepted by the automation engine
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ActionAttribute {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }
}

/// A declared parameter of a file-backed plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginParameter {
    pub name: String,
    pub description: String,
}

/// Structured result of parsing one raw specification document.
///
/// Lives only for the duration of a rebuild or validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlugin {
    /// Declared plugin name
    pub name: String,
    /// Optional scenario text describing what the plugin does
    pub scenario: Option<String>,
    /// Action lines of the plugin body
    pub actions: Vec<String>,
    /// Declared parameters
    pub parameters: Vec<PluginParameter>,
    /// The raw specification text the plugin was parsed from
    pub specification: String,
}

impl ParsedPlugin {
    /// Attribute view of the plugin, used as the descriptor entity
    pub fn to_attribute(&self) -> ActionAttribute {
        ActionAttribute::new(self.name.clone(), self.scenario.clone().unwrap_or_default())
    }
}

/// Converts raw specification text into a structured plugin
pub trait PluginParser: Send + Sync {
    /// Parse one specification document; a malformed document is a `BadRequest`
    fn parse(&self, raw_text: &str) -> RegistryResult<ParsedPlugin>;
}

/// Opaque at-rest decryption.
///
/// An empty key must behave as the identity transform.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, bytes: &[u8], key: &str) -> RegistryResult<Vec<u8>>;
}

/// Counterpart of [`Decryptor`] used when writing private specifications
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, bytes: &[u8], key: &str) -> RegistryResult<Vec<u8>>;
}

/// Enumerates actions compiled into the process.
///
/// The result is assumed stable between explicit syncs. A failure here is
/// fatal to the rebuild that asked.
pub trait CodeActionProvider: Send + Sync {
    fn list_actions(&self) -> RegistryResult<Vec<ActionAttribute>>;
}

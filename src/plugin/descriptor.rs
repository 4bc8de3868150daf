//! Action Descriptors
//!
//! Canonical, queryable form of a single automation action regardless of
//! whether it was compiled into the process or read from a package.

use serde::Serialize;

use crate::plugin::traits::{ActionAttribute, ParsedPlugin};

/// Where an action was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluginSourceKind {
    /// Compiled into the process; never backed by a file
    Code,
    /// Read from a package directory
    Directory,
}

impl std::fmt::Display for PluginSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginSourceKind::Code => write!(f, "Code"),
            PluginSourceKind::Directory => write!(f, "Directory"),
        }
    }
}

/// Semantic verb classification of an action.
///
/// Classification is not implemented yet; every descriptor carries the
/// explicit undetermined marker rather than a guessed verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verb {
    #[default]
    Undetermined,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Undetermined => "TBD",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Verb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical descriptor of one action.
///
/// The key is taken verbatim from the declared name when the descriptor is
/// built and the literal is derived from it at the same time; neither is
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    key: String,
    literal: String,
    source: PluginSourceKind,
    verb: Verb,
    entity: ActionAttribute,
}

impl ActionDescriptor {
    /// Descriptor for an action compiled into the process
    pub fn from_code_attribute(attribute: ActionAttribute) -> Self {
        Self::build(attribute, PluginSourceKind::Code)
    }

    /// Descriptor for a plugin parsed from a package file
    pub fn from_plugin(plugin: &ParsedPlugin) -> Self {
        Self::build(plugin.to_attribute(), PluginSourceKind::Directory)
    }

    fn build(entity: ActionAttribute, source: PluginSourceKind) -> Self {
        let key = entity.name.clone();
        let literal = to_literal(&key);
        Self {
            key,
            literal,
            source,
            verb: Verb::Undetermined,
            entity,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lower-cased key used for every comparison and lookup
    pub fn canonical_key(&self) -> String {
        canonical_key(&self.key)
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn source(&self) -> PluginSourceKind {
        self.source
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn entity(&self) -> &ActionAttribute {
        &self.entity
    }
}

/// Canonical form of a key or package name for case-insensitive matching
pub fn canonical_key(value: &str) -> String {
    value.to_lowercase()
}

/// Human-readable literal of a key: space separated and lower-cased
pub fn to_literal(key: &str) -> String {
    to_space_case(key).to_lowercase()
}

/// Split a PascalCase / camelCase / snake_case identifier into words.
///
/// A break is inserted before an upper-case letter that follows a lower-case
/// letter or digit, and before the last capital of an acronym run that is
/// followed by a lower-case letter (`HTTPRequest` -> `HTTP Request`).
pub fn to_space_case(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c.is_whitespace() {
            out.push(' ');
            continue;
        }

        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        out.push(c);
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Namespaced identifiers (`namespace:path`) and registry keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Namespace assumed when an identifier is written without one.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Opaque namespaced key used to name objects, tags and domains.
///
/// Ordering is `(namespace, path)`, so maps keyed by `Identifier` iterate
/// deterministically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    namespace: String,
    path: String,
}

impl Identifier {
    /// Build an identifier from already separated parts.
    pub fn new(namespace: &str, path: &str) -> Result<Self, IdentifierError> {
        if namespace.is_empty() {
            return Err(IdentifierError::EmptyNamespace(format!("{namespace}:{path}")));
        }
        if path.is_empty() {
            return Err(IdentifierError::EmptyPath(format!("{namespace}:{path}")));
        }
        if let Some(c) = namespace.chars().find(|&c| !is_namespace_char(c)) {
            return Err(IdentifierError::InvalidNamespace {
                id: format!("{namespace}:{path}"),
                found: c,
            });
        }
        if let Some(c) = path.chars().find(|&c| !is_path_char(c)) {
            return Err(IdentifierError::InvalidPath {
                id: format!("{namespace}:{path}"),
                found: c,
            });
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    /// Parse `namespace:path`, or a bare `path` in [`DEFAULT_NAMESPACE`].
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        match input.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, input),
        }
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn is_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')
}

fn is_path_char(c: char) -> bool {
    is_namespace_char(c) || c == '/'
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors produced while parsing an [`Identifier`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier '{0}' has an empty namespace")]
    EmptyNamespace(String),
    #[error("identifier '{0}' has an empty path")]
    EmptyPath(String),
    #[error("non [a-z0-9_.-] character '{found}' in namespace of '{id}'")]
    InvalidNamespace { id: String, found: char },
    #[error("non [a-z0-9/._-] character '{found}' in path of '{id}'")]
    InvalidPath { id: String, found: char },
}

/// Names one object domain (blocks, items, fluids, ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryKey(Identifier);

impl RegistryKey {
    pub fn new(id: Identifier) -> Self {
        Self(id)
    }

    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        Identifier::parse(input).map(Self)
    }

    #[inline]
    pub fn id(&self) -> &Identifier {
        &self.0
    }

    /// Resource prefix the tag documents of this domain live under.
    ///
    /// ```text
    /// minecraft:block       → tags/blocks
    /// minecraft:entity_type → tags/entity_types
    /// ```
    pub fn tag_directory(&self) -> String {
        format!("tags/{}s", self.0.path())
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Identifier> for RegistryKey {
    fn from(id: Identifier) -> Self {
        Self(id)
    }
}

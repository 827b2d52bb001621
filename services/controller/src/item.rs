//! Work item model: resource keys and change events.
//!
//! A [`WorkItem`] is an immutable `(key, event type)` pair representing
//! one unit of pending reconciliation. Equality and hashing cover both
//! fields, which is what the work queue deduplicates on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing or decomposing resource keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key string is empty.
    #[error("resource key cannot be empty")]
    Empty,

    /// The key does not have the `namespace/name` shape.
    #[error("malformed resource key '{0}': expected namespace/name")]
    Malformed(String),
}

/// Stable identifier for a watched object: `namespace/name`.
///
/// Keys are constructed from parts and never mutated. A key that
/// arrives from the outside is validated with [`ResourceKey::split`]
/// before use; a key that fails to split can never be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Build a key from its namespace and name components.
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}/{name}"))
    }

    /// Decompose the key into `(namespace, name)`.
    pub fn split(&self) -> Result<(&str, &str), KeyError> {
        if self.0.is_empty() {
            return Err(KeyError::Empty);
        }
        match self.0.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok((namespace, name))
            }
            _ => Err(KeyError::Malformed(self.0.clone())),
        }
    }

    /// The canonical string form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = Self(s.to_string());
        key.split()?;
        Ok(key)
    }
}

/// The kind of change a work item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    /// Stable lowercase name, used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of pending reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub key: ResourceKey,
    pub event_type: EventType,
}

impl WorkItem {
    /// Build a work item for the given key and change kind.
    pub fn new(key: ResourceKey, event_type: EventType) -> Self {
        Self { key, event_type }
    }
}

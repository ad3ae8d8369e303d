//! Metadata deltas: a batch of set/delete operations on [`Meta`].
//!
//! On the wire a delta is a `map<string, string | null>` where `null`
//! means "delete this key". Internally each entry is a [`MetaChange`] so a
//! present-but-empty value (`Set("")`) can never be confused with a delete.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MetaError;
use crate::node::Meta;

/// A single change to one metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaChange {
    /// Insert or overwrite the key with this value.
    Set(String),
    /// Remove the key if present; no-op otherwise.
    Delete,
}

impl MetaChange {
    /// Convert from the wire representation (`None` means delete).
    pub fn from_optional(value: Option<String>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Delete,
        }
    }

    /// Convert to the wire representation.
    pub fn as_optional(&self) -> Option<&str> {
        match self {
            Self::Set(v) => Some(v),
            Self::Delete => None,
        }
    }
}

/// A batch of metadata changes applied as one unit.
///
/// Applying a delta is idempotent: applying the same delta twice yields
/// the same mapping as applying it once.
///
/// ```
/// use stratus_core::{Meta, MetaDelta};
///
/// let mut meta = Meta::from([("env".to_owned(), "prod".to_owned())]);
/// let delta = MetaDelta::new().set("zone", "us-east").delete("env");
///
/// delta.apply_to(&mut meta);
/// assert_eq!(meta, Meta::from([("zone".to_owned(), "us-east".to_owned())]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDelta {
    changes: BTreeMap<String, MetaChange>,
}

impl MetaDelta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `Set` change.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.changes.insert(key.into(), MetaChange::Set(value.into()));
        self
    }

    /// Add a `Delete` change.
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.changes.insert(key.into(), MetaChange::Delete);
        self
    }

    /// Insert a change, replacing any earlier change for the same key.
    pub fn insert(&mut self, key: impl Into<String>, change: MetaChange) {
        self.changes.insert(key.into(), change);
    }

    /// Build a delta from the wire form.
    pub fn from_optional_map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        Self {
            changes: entries
                .into_iter()
                .map(|(k, v)| (k.into(), MetaChange::from_optional(v)))
                .collect(),
        }
    }

    /// Check that every key is non-empty.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.changes.contains_key("") {
            return Err(MetaError::EmptyKey);
        }
        Ok(())
    }

    /// Merge this delta into `meta` in place.
    pub fn apply_to(&self, meta: &mut Meta) {
        for (key, change) in &self.changes {
            match change {
                MetaChange::Set(value) => {
                    meta.insert(key.clone(), value.clone());
                }
                MetaChange::Delete => {
                    meta.remove(key);
                }
            }
        }
    }

    /// Return a new mapping with this delta merged into `meta`.
    pub fn applied(&self, meta: &Meta) -> Meta {
        let mut out = meta.clone();
        self.apply_to(&mut out);
        out
    }

    /// Look up the change for a key.
    pub fn get(&self, key: &str) -> Option<&MetaChange> {
        self.changes.get(key)
    }

    /// Iterate over `(key, change)` pairs in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, MetaChange> {
        self.changes.iter()
    }

    /// Number of `Set` changes.
    pub fn keys_set(&self) -> usize {
        self.changes
            .values()
            .filter(|c| matches!(c, MetaChange::Set(_)))
            .count()
    }

    /// Number of `Delete` changes.
    pub fn keys_deleted(&self) -> usize {
        self.changes.len() - self.keys_set()
    }

    /// Number of keys touched.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the delta touches no keys.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl<'a> IntoIterator for &'a MetaDelta {
    type Item = (&'a String, &'a MetaChange);
    type IntoIter = btree_map::Iter<'a, String, MetaChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, MetaChange)> for MetaDelta {
    fn from_iter<T: IntoIterator<Item = (K, MetaChange)>>(iter: T) -> Self {
        Self {
            changes: iter.into_iter().map(|(k, c)| (k.into(), c)).collect(),
        }
    }
}

impl Serialize for MetaDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.changes.iter().map(|(k, c)| (k, c.as_optional())))
    }
}

impl<'de> Deserialize<'de> for MetaDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<String>>::deserialize(deserializer)?;
        Ok(Self::from_optional_map(raw))
    }
}

//! Display labels.
//!
//! Labels never take part in identity: two [`LabeledIdentifier`]s with the
//! same identifier are equal whatever their labels say. Label-bearing
//! collaborators fill a [`LabelMap`] that only the compendium writer reads.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// An identifier paired with an optional display label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledIdentifier {
    /// The identifier.
    pub id: Identifier,

    /// Display label, if the source had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl LabeledIdentifier {
    /// Creates a labeled identifier.
    #[must_use]
    pub fn new(id: Identifier, label: impl Into<String>) -> Self {
        Self {
            id,
            label: Some(label.into()),
        }
    }

    /// Creates an identifier with no label.
    #[must_use]
    pub fn bare(id: Identifier) -> Self {
        Self { id, label: None }
    }
}

impl PartialEq for LabeledIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LabeledIdentifier {}

impl Hash for LabeledIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<Identifier> for LabeledIdentifier {
    fn from(id: Identifier) -> Self {
        Self::bare(id)
    }
}

/// Identifier to label lookup.
///
/// Later inserts overwrite earlier ones, so collaborators should feed the
/// most trusted label source last. Blank labels are ignored.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: HashMap<Identifier, String>,
}

impl LabelMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label for `id`. Returns false if the label was blank.
    pub fn insert(&mut self, id: Identifier, label: impl Into<String>) -> bool {
        let label = label.into();
        if label.trim().is_empty() {
            return false;
        }
        self.labels.insert(id, label);
        true
    }

    /// Absorbs every labeled identifier that carries a label.
    pub fn extend_labeled<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = LabeledIdentifier>,
    {
        for item in items {
            if let Some(label) = item.label {
                self.insert(item.id, label);
            }
        }
    }

    /// Absorbs another map; its labels win.
    pub fn merge(&mut self, other: LabelMap) {
        self.labels.extend(other.labels);
    }

    /// Looks up a label.
    #[must_use]
    pub fn get(&self, id: &Identifier) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Number of labeled identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if no labels are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<(Identifier, String)> for LabelMap {
    fn from_iter<T: IntoIterator<Item = (Identifier, String)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (id, label) in iter {
            map.insert(id, label);
        }
        map
    }
}

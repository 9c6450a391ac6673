//! The compendium: one output record per resolved entity.
//!
//! The writer reads the store once after the last batch and never mutates
//! it. Primary identifiers and labels are chosen by a fixed namespace
//! priority order, and records come out sorted by primary identifier, so
//! identical input always yields byte-identical output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::label::LabelMap;
use crate::namespace::NamespacePriority;
use crate::store::{EquivalenceClass, EquivalenceStore};

/// Category tag attached to every record of a compendium.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// `biolink:ChemicalSubstance`.
    ChemicalSubstance,
    /// `biolink:MolecularActivity`.
    MolecularActivity,
    /// `biolink:BiologicalProcess`.
    BiologicalProcess,
    /// `biolink:Gene`.
    Gene,
    /// `biolink:Protein`.
    Protein,
    /// `biolink:Disease`.
    Disease,
    /// `biolink:PhenotypicFeature`.
    PhenotypicFeature,
    /// `biolink:AnatomicalEntity`.
    AnatomicalEntity,
    /// A category without a dedicated variant, rendered verbatim.
    Custom(String),
}

impl EntityType {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "biolink:ChemicalSubstance" => Self::ChemicalSubstance,
            "biolink:MolecularActivity" => Self::MolecularActivity,
            "biolink:BiologicalProcess" => Self::BiologicalProcess,
            "biolink:Gene" => Self::Gene,
            "biolink:Protein" => Self::Protein,
            "biolink:Disease" => Self::Disease,
            "biolink:PhenotypicFeature" => Self::PhenotypicFeature,
            "biolink:AnatomicalEntity" => Self::AnatomicalEntity,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChemicalSubstance => write!(f, "biolink:ChemicalSubstance"),
            Self::MolecularActivity => write!(f, "biolink:MolecularActivity"),
            Self::BiologicalProcess => write!(f, "biolink:BiologicalProcess"),
            Self::Gene => write!(f, "biolink:Gene"),
            Self::Protein => write!(f, "biolink:Protein"),
            Self::Disease => write!(f, "biolink:Disease"),
            Self::PhenotypicFeature => write!(f, "biolink:PhenotypicFeature"),
            Self::AnatomicalEntity => write!(f, "biolink:AnatomicalEntity"),
            Self::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

impl From<String> for EntityType {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<&str> for EntityType {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.to_string()
    }
}

/// One resolved entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompendiumRecord {
    /// Highest-priority member of the class.
    pub primary_identifier: Identifier,

    /// Empty when no member has a label.
    pub label: String,

    /// Every member of the class in priority order, primary first.
    pub synonyms: Vec<Identifier>,

    /// Category of the record.
    pub entity_type: EntityType,
}

/// The full output of a run for one entity category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compendium {
    /// Category shared by every record.
    pub entity_type: EntityType,
    /// Records sorted by primary identifier.
    pub records: Vec<CompendiumRecord>,
}

impl Compendium {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Finds the record whose synonyms include `id`.
    #[must_use]
    pub fn record_for(&self, id: &Identifier) -> Option<&CompendiumRecord> {
        self.records.iter().find(|r| r.synonyms.contains(id))
    }

    /// One JSON object per line, in record order.
    ///
    /// # Errors
    /// Propagates serialization failures.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// BLAKE3 hex digest of [`Compendium::to_json_lines`].
    ///
    /// # Errors
    /// Propagates serialization failures.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let lines = self.to_json_lines()?;
        Ok(blake3::hash(lines.as_bytes()).to_hex().to_string())
    }
}

/// Builds compendium records from a finished store.
#[derive(Debug, Clone, Default)]
pub struct CompendiumWriter {
    priority: NamespacePriority,
}

impl CompendiumWriter {
    /// Creates a writer using `priority` for primary and label selection.
    #[must_use]
    pub fn new(priority: NamespacePriority) -> Self {
        Self { priority }
    }

    /// Emits one record per distinct class, sorted by primary identifier.
    #[must_use]
    pub fn write(&self, store: &EquivalenceStore, labels: &LabelMap, entity_type: EntityType) -> Compendium {
        let mut records: Vec<CompendiumRecord> = store
            .all_classes()
            .into_iter()
            .filter_map(|class| self.record(class, labels, &entity_type))
            .collect();
        records.sort_by(|a, b| a.primary_identifier.cmp(&b.primary_identifier));

        tracing::info!(
            entity_type = %entity_type,
            records = records.len(),
            identifiers = store.identifier_count(),
            "compendium written"
        );
        Compendium {
            entity_type,
            records,
        }
    }

    /// Builds the record for a single class. `None` for an empty class.
    #[must_use]
    pub fn record(
        &self,
        class: &EquivalenceClass,
        labels: &LabelMap,
        entity_type: &EntityType,
    ) -> Option<CompendiumRecord> {
        let mut synonyms: Vec<Identifier> = class.iter().cloned().collect();
        synonyms.sort_by(|a, b| self.priority.compare(a, b));

        let primary_identifier = synonyms.first()?.clone();
        let label = synonyms
            .iter()
            .find_map(|id| labels.get(id))
            .unwrap_or_default()
            .to_string();

        Some(CompendiumRecord {
            primary_identifier,
            label,
            synonyms,
            entity_type: entity_type.clone(),
        })
    }
}

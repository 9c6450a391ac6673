//! Relation groups and batches: the engine's input contract.
//!
//! Collaborators (file parsers, API clients) turn whatever they fetch into
//! [`RelationBatch`]es. Each [`RelationGroup`] asserts that its members denote
//! one entity; a single-member group only registers the identifier.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identifier::Identifier;
use crate::namespace::{Namespace, NamespaceRewriter};

/// Why a group was skipped without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedGroup {
    /// No members (possibly after namespace rewriting dropped them all).
    Empty,
    /// Two or more entries that are all the same identifier.
    DuplicateOnly,
}

impl fmt::Display for MalformedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::DuplicateOnly => write!(f, "duplicate_only"),
        }
    }
}

/// An ordered assertion that all members are the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationGroup(Vec<Identifier>);

impl RelationGroup {
    /// Wraps members as given. Validity is checked when the group is applied.
    #[must_use]
    pub fn new(members: Vec<Identifier>) -> Self {
        Self(members)
    }

    /// A group that only registers `id`.
    #[must_use]
    pub fn singleton(id: Identifier) -> Self {
        Self(vec![id])
    }

    /// A two-member group.
    #[must_use]
    pub fn pair(a: Identifier, b: Identifier) -> Self {
        Self(vec![a, b])
    }

    /// Parses every member from `NAMESPACE:local_id` form.
    ///
    /// # Errors
    /// Returns the first member that fails to parse.
    pub fn parse<S: AsRef<str>>(members: &[S]) -> Result<Self, ValidationError> {
        members
            .iter()
            .map(|m| Identifier::parse(m.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Members in assertion order, duplicates included.
    #[must_use]
    pub fn members(&self) -> &[Identifier] {
        &self.0
    }

    /// Number of entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the group has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Members with duplicates removed, first occurrence kept.
    #[must_use]
    pub fn distinct(&self) -> Vec<Identifier> {
        let mut seen = HashSet::with_capacity(self.0.len());
        self.0.iter().filter(|id| seen.insert(*id)).cloned().collect()
    }

    /// Returns why this group cannot be applied, if it cannot.
    #[must_use]
    pub fn malformation(&self) -> Option<MalformedGroup> {
        if self.0.is_empty() {
            return Some(MalformedGroup::Empty);
        }
        if self.0.len() > 1 && self.0.iter().all(|id| id == &self.0[0]) {
            return Some(MalformedGroup::DuplicateOnly);
        }
        None
    }

    /// Returns true if any member is in `ns`.
    #[must_use]
    pub fn touches(&self, ns: &Namespace) -> bool {
        self.0.iter().any(|id| id.in_namespace(ns))
    }

    /// Applies namespace aliases and drops ignored members.
    #[must_use]
    pub fn rewrite(&self, rewriter: &NamespaceRewriter) -> Self {
        Self(self.0.iter().filter_map(|id| rewriter.rewrite(id)).collect())
    }
}

impl fmt::Display for RelationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Identifier>> for RelationGroup {
    fn from(members: Vec<Identifier>) -> Self {
        Self(members)
    }
}

impl FromIterator<Identifier> for RelationGroup {
    fn from_iter<T: IntoIterator<Item = Identifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An ordered run of groups from one source, applied under one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationBatch {
    /// Name of the producing source; keys the batch into a source plan.
    pub source: String,

    /// Used only to pick a conflict policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_hint: Option<Namespace>,

    /// Groups in source order.
    #[serde(default)]
    pub groups: Vec<RelationGroup>,
}

impl RelationBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            namespace_hint: None,
            groups: Vec::new(),
        }
    }

    /// Sets the namespace hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<Namespace>) -> Self {
        self.namespace_hint = Some(hint.into());
        self
    }

    /// Appends a group.
    #[must_use]
    pub fn with_group(mut self, group: RelationGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Appends a group in place.
    pub fn push(&mut self, group: RelationGroup) {
        self.groups.push(group);
    }

    /// Builds a batch of two-member groups.
    #[must_use]
    pub fn from_pairs<I>(source: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (Identifier, Identifier)>,
    {
        let mut batch = Self::new(source);
        batch.groups = pairs.into_iter().map(|(a, b)| RelationGroup::pair(a, b)).collect();
        batch
    }

    /// Builds a batch that only registers identifiers.
    #[must_use]
    pub fn registrations<I>(source: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
    {
        let mut batch = Self::new(source);
        batch.groups = ids.into_iter().map(RelationGroup::singleton).collect();
        batch
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if the batch has no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Rewrites every group's namespaces.
    #[must_use]
    pub fn rewrite(self, rewriter: &NamespaceRewriter) -> Self {
        if rewriter.is_identity() {
            return self;
        }
        let groups = self.groups.iter().map(|g| g.rewrite(rewriter)).collect();
        Self { groups, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        s.parse().unwrap()
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let group = RelationGroup::new(vec![id("A:1"), id("B:1"), id("A:1"), id("C:1")]);
        let rendered: Vec<String> = group.distinct().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["A:1", "B:1", "C:1"]);
    }

    #[test]
    fn test_malformation() {
        assert_eq!(RelationGroup::default().malformation(), Some(MalformedGroup::Empty));
        assert_eq!(
            RelationGroup::new(vec![id("A:1"), id("A:1")]).malformation(),
            Some(MalformedGroup::DuplicateOnly)
        );
        assert_eq!(RelationGroup::singleton(id("A:1")).malformation(), None);
        assert_eq!(RelationGroup::pair(id("A:1"), id("A:2")).malformation(), None);
    }

    #[test]
    fn test_parse_group() {
        let group = RelationGroup::parse(&["MESH:D014867", "UNII:059QF0KO0R"]).unwrap();
        assert_eq!(group.len(), 2);
        assert!(group.touches(&Namespace::Unii));
        assert!(!group.touches(&Namespace::Chebi));
        assert!(RelationGroup::parse(&["MESH:D1", "broken"]).is_err());
    }

    #[test]
    fn test_rewrite_can_empty_a_group() {
        let rewriter = NamespaceRewriter::new().ignore(Namespace::Pmid).ignore(Namespace::Ec);
        let group = RelationGroup::parse(&["PMID:1", "EC:1.1.1.1"]).unwrap();
        assert_eq!(group.rewrite(&rewriter).malformation(), Some(MalformedGroup::Empty));
    }

    #[test]
    fn test_batch_builders() {
        let batch = RelationBatch::from_pairs(
            "mesh_unii",
            vec![(id("MESH:D1"), id("UNII:X")), (id("MESH:D2"), id("UNII:Y"))],
        )
        .with_hint(Namespace::Mesh);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.namespace_hint, Some(Namespace::Mesh));

        let regs = RelationBatch::registrations("kegg", vec![id("KEGG.COMPOUND:C00001")]);
        assert_eq!(regs.groups[0].len(), 1);
    }

    #[test]
    fn test_group_display() {
        let group = RelationGroup::pair(id("A:1"), id("B:2"));
        assert_eq!(group.to_string(), "(A:1, B:2)");
    }

    #[test]
    fn test_batch_json() {
        let json = r#"{"source":"chebi_xrefs","namespace_hint":"CHEBI","groups":[["CHEBI:1","KEGG.COMPOUND:C1"]]}"#;
        let batch: RelationBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.namespace_hint, Some(Namespace::Chebi));
        assert_eq!(batch.groups[0].members()[1].namespace(), &Namespace::Kegg);
    }
}

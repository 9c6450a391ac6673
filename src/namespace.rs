//! Identifier namespaces and their priority order.
//!
//! A namespace is the vocabulary an identifier comes from ("CHEBI", "MESH",
//! ...). Well-known vocabularies get their own variant so the engine never
//! branches on raw prefix strings. Everything else lands in
//! [`Namespace::Other`]. Equality, hashing and ordering all go through the
//! canonical prefix string, so `Other("CHEBI".into())` and `Chebi` are the
//! same namespace.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// A source vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Namespace {
    /// `INCHIKEY`, hashed chemical structure.
    InchiKey,
    /// `CHEBI`.
    Chebi,
    /// `CHEMBL.COMPOUND`.
    Chembl,
    /// `DRUGBANK`.
    Drugbank,
    /// `PUBCHEM.COMPOUND`.
    PubchemCompound,
    /// `UNII`, FDA substance registration.
    Unii,
    /// `MESH`.
    Mesh,
    /// `KEGG.COMPOUND`.
    Kegg,
    /// IUPHAR Guide to Pharmacology ligands.
    GtoPdb,
    /// `UniProtKB`.
    UniProtKb,
    /// `GO`, Gene Ontology.
    Go,
    /// `REACT`.
    Reactome,
    /// `MetaCyc`.
    MetaCyc,
    /// `PMID`, literature references.
    Pmid,
    /// `EC`, enzyme classification.
    Ec,
    /// Any namespace without a dedicated variant.
    Other(String),
}

impl Namespace {
    /// Canonical prefix string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InchiKey => "INCHIKEY",
            Self::Chebi => "CHEBI",
            Self::Chembl => "CHEMBL.COMPOUND",
            Self::Drugbank => "DRUGBANK",
            Self::PubchemCompound => "PUBCHEM.COMPOUND",
            Self::Unii => "UNII",
            Self::Mesh => "MESH",
            Self::Kegg => "KEGG.COMPOUND",
            Self::GtoPdb => "gtpo",
            Self::UniProtKb => "UniProtKB",
            Self::Go => "GO",
            Self::Reactome => "REACT",
            Self::MetaCyc => "MetaCyc",
            Self::Pmid => "PMID",
            Self::Ec => "EC",
            Self::Other(prefix) => prefix,
        }
    }

    /// Maps a prefix string onto a namespace. Never fails.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "INCHIKEY" => Self::InchiKey,
            "CHEBI" => Self::Chebi,
            "CHEMBL.COMPOUND" => Self::Chembl,
            "DRUGBANK" => Self::Drugbank,
            "PUBCHEM.COMPOUND" => Self::PubchemCompound,
            "UNII" => Self::Unii,
            "MESH" => Self::Mesh,
            "KEGG.COMPOUND" => Self::Kegg,
            "gtpo" => Self::GtoPdb,
            "UniProtKB" => Self::UniProtKb,
            "GO" => Self::Go,
            "REACT" => Self::Reactome,
            "MetaCyc" => Self::MetaCyc,
            "PMID" => Self::Pmid,
            "EC" => Self::Ec,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns true if this namespace has no dedicated variant.
    #[must_use]
    pub fn is_other(&self) -> bool {
        matches!(Self::from_prefix(self.as_str()), Self::Other(_))
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Namespace {}

impl Hash for Namespace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for Namespace {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Namespace {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Namespace {
    fn from(prefix: &str) -> Self {
        Self::from_prefix(prefix)
    }
}

impl From<String> for Namespace {
    fn from(prefix: String) -> Self {
        Self::from_prefix(&prefix)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.as_str().to_string()
    }
}

/// Total order over namespaces used to pick primary identifiers and labels.
///
/// Listed namespaces rank by position. Unlisted namespaces rank after every
/// listed one, ordered by prefix string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespacePriority(Vec<Namespace>);

impl NamespacePriority {
    /// Builds a priority list. Later duplicates are ignored.
    #[must_use]
    pub fn new(order: Vec<Namespace>) -> Self {
        let mut seen = BTreeSet::new();
        let deduped = order.into_iter().filter(|ns| seen.insert(ns.clone())).collect();
        Self(deduped)
    }

    /// Sort key for a namespace: listed position first, prefix string second.
    #[must_use]
    pub fn rank<'a>(&self, ns: &'a Namespace) -> (usize, &'a str) {
        let pos = self.0.iter().position(|p| p == ns).unwrap_or(self.0.len());
        (pos, ns.as_str())
    }

    /// Orders two identifiers by namespace rank, then local id.
    #[must_use]
    pub fn compare(&self, a: &Identifier, b: &Identifier) -> Ordering {
        self.rank(a.namespace())
            .cmp(&self.rank(b.namespace()))
            .then_with(|| a.local_id().cmp(b.local_id()))
    }

    /// The listed namespaces, highest priority first.
    #[must_use]
    pub fn as_slice(&self) -> &[Namespace] {
        &self.0
    }
}

impl Default for NamespacePriority {
    fn default() -> Self {
        Self::new(vec![
            Namespace::InchiKey,
            Namespace::Chebi,
            Namespace::Chembl,
            Namespace::Drugbank,
            Namespace::PubchemCompound,
            Namespace::Unii,
            Namespace::Mesh,
            Namespace::Kegg,
            Namespace::GtoPdb,
            Namespace::UniProtKb,
            Namespace::Go,
            Namespace::Reactome,
            Namespace::MetaCyc,
        ])
    }
}

/// Rewrites legacy namespace spellings and drops ignored namespaces before
/// groups reach the engine.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRewriter {
    aliases: BTreeMap<String, Namespace>,
    ignored: BTreeSet<Namespace>,
}

impl NamespaceRewriter {
    /// Creates a rewriter with no aliases and nothing ignored.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `from` to `to`.
    #[must_use]
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<Namespace>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    /// Drops every identifier in `ns`.
    #[must_use]
    pub fn ignore(mut self, ns: impl Into<Namespace>) -> Self {
        self.ignored.insert(ns.into());
        self
    }

    /// Applies aliases, then returns `None` if the result is ignored.
    #[must_use]
    pub fn rewrite(&self, id: &Identifier) -> Option<Identifier> {
        let rewritten = match self.aliases.get(id.namespace().as_str()) {
            Some(target) => Identifier::new(target.clone(), id.local_id()),
            None => id.clone(),
        };
        if self.ignored.contains(rewritten.namespace()) {
            return None;
        }
        Some(rewritten)
    }

    /// Returns true if nothing would ever be rewritten or dropped.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.aliases.is_empty() && self.ignored.is_empty()
    }
}

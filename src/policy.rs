//! Conflict policy: which merges are vetoed.
//!
//! Policies are pure. Every check takes the members of the classes a group
//! would fuse plus the group itself and never looks at the store, so a
//! verdict can be reproduced from its inputs alone.
//!
//! Composition order: the namespace-uniqueness check runs first and its
//! rejection is total (no existing class is touched). The low-confidence
//! check only runs on groups that pass uniqueness, and its rejection is
//! partial (the group may still attach to one class).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identifier::Identifier;
use crate::namespace::Namespace;

/// When the uniqueness check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    /// Only when a group would fuse two or more existing classes.
    #[default]
    Fusion,
    /// On every group, including ones that extend a single class or form a
    /// new one.
    Always,
}

/// What happens to not-yet-known members of a group rejected for uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionFallback {
    /// Unknown members form one fresh class, or singletons when that class
    /// would itself hold two members of a unique namespace.
    #[default]
    RegisterStandalone,
    /// Unknown members are dropped.
    Drop,
}

/// Outcome of evaluating a proposed merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PolicyVerdict {
    /// Merge may proceed.
    Accept,
    /// The union would hold 2+ members of a unique namespace.
    RejectUniqueness {
        /// The first offending namespace, in namespace order.
        namespace: Namespace,
    },
    /// A low-confidence assertion would fuse established clusters.
    RejectLowConfidence,
}

impl PolicyVerdict {
    /// Returns true for [`PolicyVerdict::Accept`].
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

impl fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::RejectUniqueness { namespace } => write!(f, "reject_uniqueness({namespace})"),
            Self::RejectLowConfidence => write!(f, "reject_low_confidence"),
        }
    }
}

/// Merge rules for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictPolicy {
    /// Namespaces a class may hold at most one member of.
    #[serde(default)]
    pub unique_namespaces: BTreeSet<Namespace>,

    /// Namespace whose cross-references are known to be noisy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_confidence_namespace: Option<Namespace>,

    /// When uniqueness is checked.
    #[serde(default)]
    pub uniqueness_scope: UniquenessScope,

    /// Fate of unknown members after a uniqueness rejection.
    #[serde(default)]
    pub rejection_fallback: RejectionFallback,
}

impl ConflictPolicy {
    /// A policy that accepts everything.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Structure-keyed sources: one InChIKey per class.
    #[must_use]
    pub fn structure_authority() -> Self {
        Self::permissive().unique(Namespace::InchiKey)
    }

    /// Adds a unique namespace.
    #[must_use]
    pub fn unique(mut self, ns: impl Into<Namespace>) -> Self {
        self.unique_namespaces.insert(ns.into());
        self
    }

    /// Marks the batch as sourced from a low-confidence namespace.
    #[must_use]
    pub fn low_confidence(mut self, ns: impl Into<Namespace>) -> Self {
        self.low_confidence_namespace = Some(ns.into());
        self
    }

    /// Sets the uniqueness scope.
    #[must_use]
    pub fn scope(mut self, scope: UniquenessScope) -> Self {
        self.uniqueness_scope = scope;
        self
    }

    /// Sets the rejection fallback.
    #[must_use]
    pub fn fallback(mut self, fallback: RejectionFallback) -> Self {
        self.rejection_fallback = fallback;
        self
    }

    /// Checks that no namespace in the policy is blank.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidPolicy`] naming the blank entry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.unique_namespaces.iter().any(|ns| ns.as_str().trim().is_empty()) {
            return Err(ValidationError::InvalidPolicy {
                reason: "unique_namespaces contains a blank namespace".to_string(),
            });
        }
        if self
            .low_confidence_namespace
            .as_ref()
            .is_some_and(|ns| ns.as_str().trim().is_empty())
        {
            return Err(ValidationError::InvalidPolicy {
                reason: "low_confidence_namespace is blank".to_string(),
            });
        }
        Ok(())
    }

    /// Returns true if the batch this policy governs is low confidence.
    /// Every fusing group in such a batch is guarded, whatever namespaces
    /// it mentions.
    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence_namespace.is_some()
    }

    /// Evaluates a proposed merge of `existing` classes through `group`.
    ///
    /// Composition: uniqueness first, low confidence second.
    #[must_use]
    pub fn evaluate(&self, existing: &[&BTreeSet<Identifier>], group: &[Identifier]) -> PolicyVerdict {
        let fusing = existing.len() >= 2;

        if fusing || self.uniqueness_scope == UniquenessScope::Always {
            if let Some(namespace) = uniqueness_violation(&self.unique_namespaces, existing, group) {
                return PolicyVerdict::RejectUniqueness { namespace };
            }
        }

        if fusing && self.is_low_confidence() && fuses_established_clusters(existing) {
            return PolicyVerdict::RejectLowConfidence;
        }

        PolicyVerdict::Accept
    }
}

/// Returns the first unique namespace that would appear on two or more
/// distinct identifiers in the union of `existing` and `group`.
#[must_use]
pub fn uniqueness_violation(
    unique: &BTreeSet<Namespace>,
    existing: &[&BTreeSet<Identifier>],
    group: &[Identifier],
) -> Option<Namespace> {
    if unique.is_empty() {
        return None;
    }
    let union: BTreeSet<&Identifier> = existing
        .iter()
        .flat_map(|class| class.iter())
        .chain(group.iter())
        .collect();

    unique
        .iter()
        .find(|ns| union.iter().filter(|id| id.in_namespace(ns)).count() >= 2)
        .cloned()
}

/// Returns true if two or more of `existing` already hold 2+ members.
#[must_use]
pub fn fuses_established_clusters(existing: &[&BTreeSet<Identifier>]) -> bool {
    existing.iter().filter(|class| class.len() >= 2).count() >= 2
}

/// Picks a conflict policy from a batch's namespace hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Used when the hint has no entry.
    #[serde(default)]
    pub default: ConflictPolicy,

    /// Policies keyed by namespace hint.
    #[serde(default)]
    pub by_hint: BTreeMap<Namespace, ConflictPolicy>,
}

impl PolicyTable {
    /// Creates a table that falls back to `default`.
    #[must_use]
    pub fn new(default: ConflictPolicy) -> Self {
        Self {
            default,
            by_hint: BTreeMap::new(),
        }
    }

    /// Registers the policy for a hint.
    #[must_use]
    pub fn with(mut self, hint: impl Into<Namespace>, policy: ConflictPolicy) -> Self {
        self.by_hint.insert(hint.into(), policy);
        self
    }

    /// The policy for `hint`, or the default.
    #[must_use]
    pub fn resolve(&self, hint: Option<&Namespace>) -> &ConflictPolicy {
        hint.and_then(|h| self.by_hint.get(h)).unwrap_or(&self.default)
    }

    /// Validates every policy in the table.
    ///
    /// # Errors
    /// Returns the first invalid policy's error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.default.validate()?;
        self.by_hint.values().try_for_each(ConflictPolicy::validate)
    }
}

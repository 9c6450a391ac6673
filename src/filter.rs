//! Authority prefilter for noisy cross-reference sources.
//!
//! Some sources link identifiers on little more than a shared name. Their
//! assertions are useful only while nothing better is known: once the
//! subject identifier already sits in a class anchored by an authority
//! namespace (a structure key, a curated registry), the noisy link is
//! ignored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::namespace::Namespace;
use crate::relation::RelationBatch;
use crate::store::EquivalenceStore;

/// Drops groups whose subject member is already anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityFilter {
    /// Namespace of the member whose current class is inspected.
    pub subject: Namespace,

    /// A class holding any of these namespaces counts as anchored.
    pub authorities: BTreeSet<Namespace>,
}

impl AuthorityFilter {
    /// Creates a filter for `subject` with no authorities.
    #[must_use]
    pub fn new(subject: impl Into<Namespace>) -> Self {
        Self {
            subject: subject.into(),
            authorities: BTreeSet::new(),
        }
    }

    /// Adds an authority namespace.
    #[must_use]
    pub fn authority(mut self, ns: impl Into<Namespace>) -> Self {
        self.authorities.insert(ns.into());
        self
    }

    /// Removes anchored groups from `batch`; returns how many were removed.
    ///
    /// Groups with no member in the subject namespace, or whose subject
    /// members are all unknown, pass through.
    pub fn apply(&self, store: &EquivalenceStore, batch: &mut RelationBatch) -> usize {
        let before = batch.groups.len();
        batch.groups.retain(|group| {
            let anchored = group
                .members()
                .iter()
                .filter(|id| id.in_namespace(&self.subject))
                .filter_map(|id| store.get(id))
                .any(|class| class.has_any_namespace(&self.authorities));
            !anchored
        });
        let removed = before - batch.groups.len();
        if removed > 0 {
            tracing::debug!(
                source = %batch.source,
                subject = %self.subject,
                removed,
                "prefilter dropped anchored groups"
            );
        }
        removed
    }
}

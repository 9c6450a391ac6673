//! Source plans: the prioritized order in which batches are applied.
//!
//! Order matters. Earlier sources establish classes that later, noisier
//! sources are checked against, so the plan is always explicit and
//! injected, never discovered.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::filter::AuthorityFilter;
use crate::namespace::Namespace;
use crate::policy::ConflictPolicy;

/// One planned source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Matches [`RelationBatch::source`](crate::relation::RelationBatch::source).
    pub name: String,

    /// Overrides the batch's own hint when picking a policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_hint: Option<Namespace>,

    /// Takes precedence over any hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ConflictPolicy>,

    /// Drops noisy groups before the batch is glommed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefilter: Option<AuthorityFilter>,
}

impl SourceSpec {
    /// Creates a spec that uses the batch's hint and the policy table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace_hint: None,
            policy: None,
            prefilter: None,
        }
    }

    /// Sets the namespace hint.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<Namespace>) -> Self {
        self.namespace_hint = Some(hint.into());
        self
    }

    /// Pins an explicit policy.
    #[must_use]
    pub fn policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Attaches an authority prefilter.
    #[must_use]
    pub fn prefilter(mut self, filter: AuthorityFilter) -> Self {
        self.prefilter = Some(filter);
        self
    }
}

/// A validated, non-empty list of uniquely named sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SourceSpec>", into = "Vec<SourceSpec>")]
pub struct SourcePlan {
    sources: Vec<SourceSpec>,
}

impl SourcePlan {
    /// Validates and builds a plan.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidPlan`] for an empty plan, a blank or
    /// duplicate source name, or an invalid pinned policy.
    pub fn new(sources: Vec<SourceSpec>) -> Result<Self, ValidationError> {
        if sources.is_empty() {
            return Err(ValidationError::InvalidPlan {
                reason: "plan has no sources".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for spec in &sources {
            if spec.name.trim().is_empty() {
                return Err(ValidationError::InvalidPlan {
                    reason: "source name cannot be blank".to_string(),
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ValidationError::InvalidPlan {
                    reason: format!("source '{}' is planned twice", spec.name),
                });
            }
            if let Some(policy) = &spec.policy {
                policy.validate().map_err(|e| ValidationError::InvalidPlan {
                    reason: format!("source '{}': {e}", spec.name),
                })?;
            }
        }

        Ok(Self { sources })
    }

    /// The planned sources, highest priority first.
    #[must_use]
    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Position of `name` in the plan.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name == name)
    }

    /// The spec named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Number of planned sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Always false for a constructed plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl TryFrom<Vec<SourceSpec>> for SourcePlan {
    type Error = ValidationError;

    fn try_from(sources: Vec<SourceSpec>) -> Result<Self, Self::Error> {
        Self::new(sources)
    }
}

impl From<SourcePlan> for Vec<SourceSpec> {
    fn from(plan: SourcePlan) -> Self {
        plan.sources
    }
}

//! Error types for the concordance engine.
//!
//! All errors are strongly typed using thiserror. Rejected merges and
//! malformed groups are *not* errors: they are ordinary outcomes recorded in
//! a [`BatchReport`](crate::glom::BatchReport). Only an [`InvariantViolation`]
//! means the run must stop.

use std::fmt;

use thiserror::Error;

use crate::identifier::Identifier;

/// Validation errors raised at the collaborator boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A `NAMESPACE:LOCAL_ID` string could not be parsed.
    #[error("Identifier '{value}' is malformed: {reason}")]
    InvalidIdentifier {
        /// The raw input.
        value: String,
        /// Why it was refused.
        reason: String,
    },

    /// The namespace part is blank.
    #[error("Namespace cannot be empty")]
    EmptyNamespace,

    /// The local id part is blank.
    #[error("Local id cannot be empty (namespace {namespace})")]
    EmptyLocalId {
        /// Namespace the empty id was given for.
        namespace: String,
    },

    /// A conflict policy names a blank namespace.
    #[error("Invalid conflict policy: {reason}")]
    InvalidPolicy {
        /// Why the policy was refused.
        reason: String,
    },

    /// The source plan is empty or names a source twice.
    #[error("Invalid source plan: {reason}")]
    InvalidPlan {
        /// Why the plan was refused.
        reason: String,
    },

    /// A batch or collaborator names a source the plan does not list.
    #[error("Batch from source '{source_name}' is not part of the source plan")]
    UnplannedSource {
        /// The unknown source name.
        source_name: String,
    },

    /// Engine configuration failed validation.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was refused.
        reason: String,
    },
}

/// Which part of the partition invariant was broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The index points at a class slot that is no longer live.
    DanglingHandle,
    /// The index points at a live class that does not contain the identifier.
    MissingFromClass,
    /// A class holds a member that the index binds to a different class.
    SharedMember {
        /// Rendering of the class the index actually points to.
        indexed_class: String,
    },
    /// A class holds a member the index has never seen.
    Unindexed,
    /// A live class with no members.
    EmptyClass,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingHandle => write!(f, "index points at a retired class"),
            Self::MissingFromClass => write!(f, "indexed class does not contain the identifier"),
            Self::SharedMember { indexed_class } => {
                write!(f, "member of two classes (indexed to {indexed_class})")
            }
            Self::Unindexed => write!(f, "class member missing from the index"),
            Self::EmptyClass => write!(f, "live class has no members"),
        }
    }
}

/// The partition invariant no longer holds.
///
/// This is an engine defect, not a data problem. Callers must abort the run
/// before any output is written.
#[derive(Debug, Clone, Error)]
#[error("Partition invariant violated at {}: {kind}", violation_target(.identifier))]
pub struct InvariantViolation {
    /// The offending identifier, if the violation is tied to one.
    pub identifier: Option<Identifier>,
    /// What was wrong.
    pub kind: ViolationKind,
}

fn violation_target(identifier: &Option<Identifier>) -> String {
    identifier
        .as_ref()
        .map_or_else(|| "<class>".to_string(), ToString::to_string)
}

impl InvariantViolation {
    /// Creates a violation tied to an identifier.
    #[must_use]
    pub fn at(identifier: Identifier, kind: ViolationKind) -> Self {
        Self {
            identifier: Some(identifier),
            kind,
        }
    }
}

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum ConcordanceError {
    /// Bad input at the boundary.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store is no longer a partition. The run must stop.
    #[error("Fatal: {0}")]
    Invariant(#[from] InvariantViolation),

    /// Configuration JSON could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl ConcordanceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the run must abort without producing output.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Returns the offending identifier of an invariant violation.
    #[must_use]
    pub fn offending_identifier(&self) -> Option<&Identifier> {
        match self {
            Self::Invariant(v) => v.identifier.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias for concordance operations.
pub type ConcordanceResult<T> = Result<T, ConcordanceError>;

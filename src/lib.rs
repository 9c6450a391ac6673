//! # Concordance - Entity resolution over cross-referenced identifiers
//!
//! Concordance folds noisy cross-reference assertions from many sources into
//! a partition of namespaced identifiers: every identifier belongs to exactly
//! one equivalence class, and each class becomes one record of a compendium.
//!
//! ## Core Concepts
//!
//! - **Identifier**: a `NAMESPACE:local` string such as `CHEBI:15377`
//! - **Relation group**: an assertion that a set of identifiers name the same entity
//! - **Equivalence store**: the single owner of every class and the identifier index
//! - **Conflict policy**: vetoes merges that would break namespace uniqueness
//!   or let a low-confidence source fuse established clusters
//! - **Compendium**: one record per class, with a primary identifier chosen
//!   by namespace priority
//!
//! ## Usage
//!
//! ```rust
//! use concordance::{
//!     Concordance, EngineConfig, EntityType, LabelMap, RelationBatch, RelationGroup, SourcePlan,
//!     SourceSpec,
//! };
//!
//! let plan = SourcePlan::new(vec![SourceSpec::new("unichem")])?;
//! let batch = RelationBatch::new("unichem")
//!     .with_group(RelationGroup::parse(&["CHEBI:15377", "MESH:D014867"])?);
//!
//! let mut run = Concordance::new(EngineConfig::default())?;
//! run.apply_plan(&plan, vec![batch])?;
//! let compendium = run.finish(&LabelMap::new(), EntityType::ChemicalSubstance)?;
//!
//! assert_eq!(compendium.records[0].primary_identifier.to_string(), "CHEBI:15377");
//! # Ok::<(), concordance::ConcordanceError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod identifier;
pub mod label;
pub mod namespace;
pub mod relation;

// Engine
pub mod filter;
pub mod glom;
pub mod policy;
pub mod store;
pub mod validator;

// Output and orchestration
pub mod compendium;
pub mod config;
pub mod pipeline;

// Re-export primary types at crate root for convenience
pub use compendium::{Compendium, CompendiumRecord, CompendiumWriter, EntityType};
pub use config::EngineConfig;
pub use error::{ConcordanceError, ConcordanceResult, InvariantViolation, ValidationError, ViolationKind};
pub use filter::AuthorityFilter;
pub use glom::{apply_group, glom, BatchReport, GroupOutcome, RejectedMerge};
pub use identifier::Identifier;
pub use label::{LabelMap, LabeledIdentifier};
pub use namespace::{Namespace, NamespacePriority, NamespaceRewriter};
pub use pipeline::{gather, Concordance, RelationSource, RunId, RunReport, SourceError, SourcePlan, SourceSpec};
pub use policy::{ConflictPolicy, PolicyTable, PolicyVerdict, RejectionFallback, UniquenessScope};
pub use relation::{MalformedGroup, RelationBatch, RelationGroup};
pub use store::{ClassId, EquivalenceClass, EquivalenceStore};
pub use validator::validate;

//! Run orchestration.
//!
//! A [`Concordance`] owns one store for one run. Batches are normalized,
//! optionally prefiltered, glommed under their resolved policy, and the
//! partition invariant is proven after every batch. A violation stops the
//! run before any compendium exists.

mod gather;
mod plan;
mod report;

use std::collections::BTreeMap;

pub use gather::{gather, RelationSource, SourceError};
pub use plan::{SourcePlan, SourceSpec};
pub use report::{RunId, RunReport};

use chrono::Utc;

use crate::compendium::{Compendium, CompendiumWriter, EntityType};
use crate::config::EngineConfig;
use crate::error::{ConcordanceResult, ValidationError};
use crate::glom::{glom, BatchReport};
use crate::label::LabelMap;
use crate::namespace::NamespaceRewriter;
use crate::policy::PolicyTable;
use crate::relation::RelationBatch;
use crate::store::EquivalenceStore;
use crate::validator;

/// One concordance run.
#[derive(Debug)]
pub struct Concordance {
    config: EngineConfig,
    policies: PolicyTable,
    rewriter: NamespaceRewriter,
    store: EquivalenceStore,
    report: RunReport,
}

impl Concordance {
    /// Starts a run with a validated configuration.
    ///
    /// # Errors
    /// Returns the configuration's validation error.
    pub fn new(config: EngineConfig) -> ConcordanceResult<Self> {
        let config = config.validate()?;
        let report = RunReport::new();
        tracing::info!(run_id = %report.run_id, "concordance run started");
        Ok(Self {
            policies: config.policy_table(),
            rewriter: config.rewriter(),
            config,
            store: EquivalenceStore::new(),
            report,
        })
    }

    /// The current store.
    #[must_use]
    pub fn store(&self) -> &EquivalenceStore {
        &self.store
    }

    /// The run so far.
    #[must_use]
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Applies one batch and validates the store.
    ///
    /// Policy resolution: the planned source's pinned policy, else its hint,
    /// else the batch's own hint, else the default.
    ///
    /// # Errors
    /// Returns [`ConcordanceError::Invariant`](crate::ConcordanceError::Invariant)
    /// if the store no longer partitions its identifiers. The batch report
    /// is still recorded.
    pub fn apply_batch(&mut self, planned: Option<&SourceSpec>, batch: RelationBatch) -> ConcordanceResult<&BatchReport> {
        let mut batch = batch.rewrite(&self.rewriter);

        let prefiltered = planned
            .and_then(|s| s.prefilter.as_ref())
            .map_or(0, |filter| filter.apply(&self.store, &mut batch));

        let policy = match planned.and_then(|s| s.policy.as_ref()) {
            Some(pinned) => pinned,
            None => {
                let hint = planned
                    .and_then(|s| s.namespace_hint.as_ref())
                    .or(batch.namespace_hint.as_ref());
                self.policies.resolve(hint)
            }
        };

        let mut report = glom(&mut self.store, &batch, policy);
        report.prefiltered = prefiltered;

        let checked = validator::validate(&self.store);
        let recorded = self.report.record(report);
        checked?;
        Ok(recorded)
    }

    /// Applies `batches` in plan order.
    ///
    /// # Errors
    /// Fails before touching the store if a batch names an unplanned source
    /// or two batches name the same source. Fails mid-run on an invariant
    /// violation.
    pub fn apply_plan(&mut self, plan: &SourcePlan, batches: Vec<RelationBatch>) -> ConcordanceResult<()> {
        let mut by_source: BTreeMap<String, RelationBatch> = BTreeMap::new();
        for batch in batches {
            if plan.get(&batch.source).is_none() {
                return Err(ValidationError::UnplannedSource {
                    source_name: batch.source,
                }
                .into());
            }
            if by_source.contains_key(&batch.source) {
                return Err(ValidationError::InvalidPlan {
                    reason: format!("two batches for source '{}'", batch.source),
                }
                .into());
            }
            by_source.insert(batch.source.clone(), batch);
        }

        for source in plan.sources() {
            self.apply_planned(source, by_source.remove(&source.name))?;
        }
        Ok(())
    }

    /// Gathers `sources` concurrently and applies each batch as soon as
    /// every earlier planned batch has been applied or given up on.
    ///
    /// # Errors
    /// Same as [`gather`] and [`Concordance::apply_plan`].
    pub fn run(&mut self, plan: &SourcePlan, sources: Vec<Box<dyn RelationSource>>) -> ConcordanceResult<()> {
        let capacity = self.config.channel_capacity;
        gather::drive(plan, sources, capacity, |position, batch| {
            self.apply_planned(&plan.sources()[position], batch)
        })
    }

    fn apply_planned(&mut self, source: &SourceSpec, batch: Option<RelationBatch>) -> ConcordanceResult<()> {
        match batch {
            Some(batch) => {
                self.apply_batch(Some(source), batch)?;
            }
            None => {
                tracing::warn!(source = %source.name, "planned batch is absent; skipping");
                self.report.absent.push(source.name.clone());
            }
        }
        Ok(())
    }

    /// Final validation, then the compendium.
    ///
    /// # Errors
    /// Returns the invariant violation instead of any output.
    pub fn finish(&mut self, labels: &LabelMap, entity_type: EntityType) -> ConcordanceResult<Compendium> {
        validator::validate(&self.store)?;
        let writer = CompendiumWriter::new(self.config.namespace_priority.clone());
        let compendium = writer.write(&self.store, labels, entity_type);
        self.report.finished_at = Some(Utc::now());
        tracing::info!(
            run_id = %self.report.run_id,
            batches = self.report.batches.len(),
            absent = self.report.absent.len(),
            rejected = self.report.total_rejected(),
            "concordance run finished"
        );
        Ok(compendium)
    }

    /// Ends the run, keeping the store.
    #[must_use]
    pub fn into_parts(self) -> (EquivalenceStore, RunReport) {
        (self.store, self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConcordanceError;
    use crate::filter::AuthorityFilter;
    use crate::identifier::Identifier;
    use crate::namespace::Namespace;
    use crate::policy::ConflictPolicy;
    use crate::relation::RelationGroup;

    fn id(s: &str) -> Identifier {
        s.parse().unwrap()
    }

    fn batch(source: &str, groups: &[&[&str]]) -> RelationBatch {
        groups.iter().fold(RelationBatch::new(source), |b, g| {
            b.with_group(RelationGroup::parse(g).unwrap())
        })
    }

    #[test]
    fn test_apply_plan_uses_plan_order() {
        let plan = SourcePlan::new(vec![
            SourceSpec::new("structures"),
            SourceSpec::new("names").policy(ConflictPolicy::permissive().low_confidence(Namespace::Mesh)),
        ])
        .unwrap();
        let structures = batch(
            "structures",
            &[&["CHEBI:1", "UNII:U1"], &["MESH:D1", "KEGG.COMPOUND:C1"]],
        );
        let names = batch("names", &[&["MESH:D1", "CHEBI:1"]]);

        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        // Supplied out of order on purpose.
        run.apply_plan(&plan, vec![names, structures]).unwrap();

        assert_eq!(run.store().class_count(), 2);
        assert_eq!(run.report().batches[0].source, "structures");
        assert_eq!(run.report().batch("names").unwrap().rejected_count(), 1);
    }

    #[test]
    fn test_unplanned_batch_fails_before_anything_is_applied() {
        let plan = SourcePlan::new(vec![SourceSpec::new("a")]).unwrap();
        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        let err = run
            .apply_plan(&plan, vec![batch("a", &[&["A:1"]]), batch("b", &[&["B:1"]])])
            .unwrap_err();
        assert!(err.is_validation());
        assert!(run.store().is_empty());
        assert!(run.report().batches.is_empty());
    }

    #[test]
    fn test_missing_batch_is_recorded_as_absent() {
        let plan = SourcePlan::new(vec![SourceSpec::new("a"), SourceSpec::new("b")]).unwrap();
        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        run.apply_plan(&plan, vec![batch("b", &[&["B:1"]])]).unwrap();
        assert_eq!(run.report().absent, vec!["a".to_string()]);
        assert_eq!(run.report().batches.len(), 1);
    }

    #[test]
    fn test_rewriter_and_prefilter_run_before_glom() {
        let config = EngineConfig::default().with_ontology_xref_rules();
        let plan = SourcePlan::new(vec![
            SourceSpec::new("seed"),
            SourceSpec::new("xrefs").prefilter(AuthorityFilter::new(Namespace::Mesh).authority(Namespace::Unii)),
        ])
        .unwrap();
        let seed = batch("seed", &[&["MESH:D1", "UNII:U1"]]);
        let xrefs = batch(
            "xrefs",
            &[&["MESH:D1", "CHEBI:1"], &["GO:1", "REACTOME:R-1", "PMID:99"]],
        );

        let mut run = Concordance::new(config).unwrap();
        run.apply_plan(&plan, vec![seed, xrefs]).unwrap();

        let report = run.report().batch("xrefs").unwrap();
        assert_eq!(report.prefiltered, 1);
        assert!(!run.store().contains(&id("CHEBI:1")));
        assert!(run.store().contains(&id("REACT:R-1")));
        assert!(!run.store().contains(&id("PMID:99")));
    }

    #[test]
    fn test_hint_selects_policy() {
        let mut config = EngineConfig::default();
        config.default_policy = ConflictPolicy::permissive();
        config
            .policies
            .insert(Namespace::GtoPdb, ConflictPolicy::permissive().unique(Namespace::GtoPdb));

        let mut run = Concordance::new(config).unwrap();
        run.apply_batch(None, batch("seed", &[&["gtpo:1", "CHEBI:1"], &["gtpo:2", "CHEBI:2"]]))
            .unwrap();
        let report = run
            .apply_batch(None, batch("link", &[&["CHEBI:1", "CHEBI:2"]]).with_hint(Namespace::GtoPdb))
            .unwrap();
        assert_eq!(report.rejected_count(), 1);
        assert_eq!(run.store().class_count(), 2);
    }

    #[test]
    fn test_finish_writes_compendium_and_closes_report() {
        let plan = SourcePlan::new(vec![SourceSpec::new("a")]).unwrap();
        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        run.apply_plan(&plan, vec![batch("a", &[&["MESH:D1", "CHEBI:1"]])]).unwrap();

        let mut labels = LabelMap::new();
        labels.insert(id("MESH:D1"), "thing");
        let compendium = run.finish(&labels, EntityType::ChemicalSubstance).unwrap();
        assert_eq!(compendium.len(), 1);
        assert_eq!(compendium.records[0].primary_identifier, id("CHEBI:1"));
        assert_eq!(compendium.records[0].label, "thing");
        assert!(run.report().is_finished());
    }

    #[test]
    fn test_corrupted_store_aborts_finish() {
        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        run.apply_batch(None, batch("a", &[&["A:1", "B:1"], &["C:1"]])).unwrap();
        let other = run.store.class_of(&id("C:1")).unwrap();
        run.store.class_mut(other).unwrap().insert(id("A:1"));

        let err = run.finish(&LabelMap::new(), EntityType::Gene).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.offending_identifier(), Some(&id("A:1")));
        assert!(!run.report().is_finished());
    }

    #[test]
    fn test_planned_hint_overrides_batch_hint() {
        let mut config = EngineConfig::default();
        config.default_policy = ConflictPolicy::permissive();
        config
            .policies
            .insert(Namespace::GtoPdb, ConflictPolicy::permissive().unique(Namespace::GtoPdb));

        let mut run = Concordance::new(config).unwrap();
        run.apply_batch(None, batch("seed", &[&["gtpo:1", "CHEBI:1"], &["gtpo:2", "CHEBI:2"]]))
            .unwrap();

        let guarded = SourceSpec::new("link").hint(Namespace::GtoPdb);
        let link = batch("link", &[&["CHEBI:1", "CHEBI:2"]]).with_hint(Namespace::Chebi);
        let report = run.apply_batch(Some(&guarded), link.clone()).unwrap();
        assert_eq!(report.rejected_count(), 1);
        assert_eq!(run.store().class_count(), 2);

        let relaxed = SourceSpec::new("link").hint(Namespace::Chebi);
        let report = run
            .apply_batch(Some(&relaxed), link.with_hint(Namespace::GtoPdb))
            .unwrap();
        assert_eq!(report.fused, 1);
        assert_eq!(run.store().class_count(), 1);
    }

    fn corrupted_run() -> Concordance {
        let mut run = Concordance::new(EngineConfig::default()).unwrap();
        run.apply_batch(None, batch("seed", &[&["A:1", "B:1"], &["C:1"]])).unwrap();
        let other = run.store.class_of(&id("C:1")).unwrap();
        run.store.class_mut(other).unwrap().insert(id("A:1"));
        run
    }

    #[test]
    fn test_invariant_violation_stops_apply_plan_mid_plan() {
        let plan = SourcePlan::new(vec![SourceSpec::new("a"), SourceSpec::new("b")]).unwrap();
        let mut run = corrupted_run();

        let err = run
            .apply_plan(&plan, vec![batch("a", &[&["D:1"]]), batch("b", &[&["E:1"]])])
            .unwrap_err();
        assert!(err.is_fatal());
        // "a" is applied and recorded, "b" never runs.
        assert_eq!(run.report().batches.len(), 2);
        assert_eq!(run.report().batches[1].source, "a");
        assert!(run.report().batch("b").is_none());
        assert!(!run.store().contains(&id("E:1")));
    }

    struct Ready(RelationBatch);

    impl RelationSource for Ready {
        fn name(&self) -> &str {
            &self.0.source
        }

        fn fetch(&mut self) -> Result<RelationBatch, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_invariant_violation_stops_run_mid_plan() {
        let plan = SourcePlan::new(vec![SourceSpec::new("a"), SourceSpec::new("b")]).unwrap();
        let mut run = corrupted_run();
        let sources: Vec<Box<dyn RelationSource>> = vec![
            Box::new(Ready(batch("b", &[&["E:1"]]))),
            Box::new(Ready(batch("a", &[&["D:1"]]))),
        ];

        let err = run.run(&plan, sources).unwrap_err();
        assert!(err.is_fatal());
        assert!(run.report().batch("a").is_some());
        assert!(run.report().batch("b").is_none());
        assert!(!run.store().contains(&id("E:1")));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Concordance::new(config),
            Err(ConcordanceError::Validation(ValidationError::InvalidConfig { .. }))
        ));
    }
}

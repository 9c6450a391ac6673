use std::collections::BTreeSet;

use concordance::{
    glom, validate, CompendiumWriter, ConflictPolicy, EntityType, EquivalenceStore, Identifier, LabelMap,
    Namespace, RelationBatch, RelationGroup, UniquenessScope,
};
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = Identifier> {
    (prop::sample::select(vec!["X", "Y", "MESH", "CHEBI"]), 0u8..6)
        .prop_map(|(ns, n)| Identifier::new(ns, n.to_string()))
}

fn group() -> impl Strategy<Value = RelationGroup> {
    prop::collection::vec(identifier(), 0..5).prop_map(RelationGroup::new)
}

fn batch() -> impl Strategy<Value = RelationBatch> {
    prop::collection::vec(group(), 0..24).prop_map(|groups| {
        let mut batch = RelationBatch::new("prop");
        batch.groups = groups;
        batch
    })
}

fn policy() -> impl Strategy<Value = ConflictPolicy> {
    prop_oneof![
        Just(ConflictPolicy::permissive()),
        Just(ConflictPolicy::permissive().unique("X")),
        Just(ConflictPolicy::permissive().low_confidence(Namespace::Mesh)),
        Just(
            ConflictPolicy::permissive()
                .unique("X")
                .unique("Y")
                .low_confidence(Namespace::Mesh)
        ),
        Just(
            ConflictPolicy::permissive()
                .unique("X")
                .scope(UniquenessScope::Always)
        ),
    ]
}

fn well_formed_members(batches: &[RelationBatch]) -> BTreeSet<Identifier> {
    batches
        .iter()
        .flat_map(|b| b.groups.iter())
        .filter(|g| g.malformation().is_none())
        .flat_map(|g| g.members().iter().cloned())
        .collect()
}

proptest! {
    #[test]
    fn store_stays_a_partition(batches in prop::collection::vec(batch(), 1..4), policy in policy()) {
        let mut store = EquivalenceStore::new();
        for b in &batches {
            glom(&mut store, b, &policy);
            prop_assert!(validate(&store).is_ok());
        }

        let expected = well_formed_members(&batches);
        let mut covered = BTreeSet::new();
        for class in store.partition() {
            for member in class {
                // Disjoint: no identifier appears in two classes.
                prop_assert!(covered.insert(member));
            }
        }
        prop_assert_eq!(covered, expected);
    }

    #[test]
    fn reapplying_is_idempotent(batches in prop::collection::vec(batch(), 1..4), policy in policy()) {
        let mut store = EquivalenceStore::new();
        for b in &batches {
            glom(&mut store, b, &policy);
            let settled = store.partition();

            let again = glom(&mut store, b, &policy);
            prop_assert_eq!(again.registered + again.extended + again.fused, 0);
            prop_assert_eq!(store.partition(), settled);
        }
    }

    #[test]
    fn always_scope_keeps_unique_namespace_unique(b in batch()) {
        let policy = ConflictPolicy::permissive()
            .unique("X")
            .scope(UniquenessScope::Always);
        let mut store = EquivalenceStore::new();
        glom(&mut store, &b, &policy);

        let x = Namespace::from("X");
        for (_, class) in store.classes() {
            prop_assert!(class.count_in(&x) <= 1);
        }
    }

    #[test]
    fn identical_input_gives_identical_compendium(b in batch(), policy in policy()) {
        let writer = CompendiumWriter::default();
        let mut first = EquivalenceStore::new();
        glom(&mut first, &b, &policy);
        let mut second = EquivalenceStore::new();
        glom(&mut second, &b, &policy);

        let a = writer.write(&first, &LabelMap::new(), EntityType::ChemicalSubstance);
        let c = writer.write(&second, &LabelMap::new(), EntityType::ChemicalSubstance);
        prop_assert_eq!(a.to_json_lines().unwrap(), c.to_json_lines().unwrap());
        prop_assert_eq!(a.len(), first.class_count());
    }
}

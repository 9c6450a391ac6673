//! Post-hoc proof of the partition invariant.
//!
//! Every indexed identifier must point at a live class that contains it,
//! and every member of every live class must be indexed to that class. The
//! second half is what catches a merge that forgot to rebind a member: the
//! stale binding leaves one identifier claimed by two classes.

use crate::error::{InvariantViolation, ViolationKind};
use crate::store::EquivalenceStore;

/// Checks the partition invariant.
///
/// # Errors
/// Returns the first [`InvariantViolation`] found. Scans identifiers in
/// sorted order so the reported identifier is stable across runs.
pub fn validate(store: &EquivalenceStore) -> Result<(), InvariantViolation> {
    let mut bindings: Vec<_> = store.bindings().collect();
    bindings.sort_by(|a, b| a.0.cmp(b.0));

    for (id, cid) in bindings {
        let Some(class) = store.class(cid) else {
            return Err(fail(InvariantViolation::at(id.clone(), ViolationKind::DanglingHandle)));
        };
        if !class.contains(id) {
            return Err(fail(InvariantViolation::at(id.clone(), ViolationKind::MissingFromClass)));
        }
    }

    for (cid, class) in store.classes() {
        if class.is_empty() {
            return Err(fail(InvariantViolation {
                identifier: None,
                kind: ViolationKind::EmptyClass,
            }));
        }
        for member in class.iter() {
            match store.class_of(member) {
                Some(bound) if bound == cid => {}
                Some(bound) => {
                    let indexed_class = store
                        .class(bound)
                        .map_or_else(|| bound.to_string(), ToString::to_string);
                    return Err(fail(InvariantViolation::at(
                        member.clone(),
                        ViolationKind::SharedMember { indexed_class },
                    )));
                }
                None => {
                    return Err(fail(InvariantViolation::at(member.clone(), ViolationKind::Unindexed)));
                }
            }
        }
    }

    Ok(())
}

fn fail(violation: InvariantViolation) -> InvariantViolation {
    tracing::error!(%violation, "partition invariant violated; run must abort");
    violation
}

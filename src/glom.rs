//! The merge engine ("glom").
//!
//! Folds relation groups into the equivalence store, one group at a time, in
//! the order given. Rejection decisions read the current store, so the same
//! groups in a different order may legitimately end in a different
//! partition when conflicts are present.
//!
//! # Algorithm
//!
//! For each group `G`:
//! 1. `existing` = distinct classes already holding a member of `G`, in
//!    order of first appearance in `G`.
//! 2. The conflict policy judges the union of `existing` and `G`.
//! 3. Accepted: unknown members of `G` and every other class are folded into
//!    the largest existing class (or a new class when none exists).
//! 4. Rejected for uniqueness: no existing class is touched; unknown members
//!    follow the policy's [`RejectionFallback`].
//! 5. Rejected for low confidence: unknown members attach to the first
//!    existing class only, and the other classes stay as they are.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::policy::{uniqueness_violation, ConflictPolicy, PolicyVerdict, RejectionFallback};
use crate::relation::{MalformedGroup, RelationBatch, RelationGroup};
use crate::store::{ClassId, EquivalenceStore};

/// A group the conflict policy refused.
///
/// Rejections are expected outcomes, kept for observability only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedMerge {
    /// Position of the group in its batch.
    pub position: usize,

    /// The group as it appeared in the batch.
    pub group: RelationGroup,

    /// Why the merge was refused.
    pub verdict: PolicyVerdict,

    /// Unknown members attached to an existing class (low-confidence path).
    pub attached: usize,

    /// Unknown members registered outside the existing classes.
    pub registered: usize,

    /// Unknown members dropped by [`RejectionFallback::Drop`].
    pub dropped: usize,

    /// When the rejection happened.
    pub detected_at: DateTime<Utc>,
}

/// What applying one group did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// No member was known; a new class was created.
    Registered {
        /// The new class.
        class: ClassId,
    },
    /// One class already held members; the rest joined it.
    Extended {
        /// The extended class.
        class: ClassId,
        /// Members that were unknown before.
        added: usize,
    },
    /// Every member was already in the same class.
    Unchanged {
        /// The class holding every member.
        class: ClassId,
    },
    /// Two or more classes were merged through the group.
    Fused {
        /// The surviving class.
        class: ClassId,
        /// Classes folded into it.
        absorbed: usize,
        /// Members that were unknown before.
        added: usize,
    },
    /// The conflict policy vetoed the merge.
    Rejected(RejectedMerge),
    /// The group was skipped.
    Malformed(MalformedGroup),
}

impl GroupOutcome {
    /// Returns true if the store was changed.
    #[must_use]
    pub fn changed_store(&self) -> bool {
        match self {
            Self::Registered { .. } | Self::Fused { .. } => true,
            Self::Extended { added, .. } => *added > 0,
            Self::Rejected(r) => r.attached + r.registered > 0,
            Self::Unchanged { .. } | Self::Malformed(_) => false,
        }
    }
}

/// Tally of one batch application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Source the batch came from.
    pub source: String,
    /// Groups seen, malformed ones included.
    pub groups: usize,
    /// Groups that formed a new class.
    pub registered: usize,
    /// Groups that added members to one class.
    pub extended: usize,
    /// Groups whose members already shared a class.
    pub unchanged: usize,
    /// Groups that merged two or more classes.
    pub fused: usize,
    /// Groups the conflict policy refused.
    pub rejected: Vec<RejectedMerge>,

    /// Positions and reasons of skipped groups.
    pub malformed: Vec<(usize, MalformedGroup)>,

    /// Groups removed by an authority prefilter before application.
    #[serde(default)]
    pub prefiltered: usize,
}

impl BatchReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, position: usize, outcome: GroupOutcome) {
        self.groups += 1;
        match outcome {
            GroupOutcome::Registered { .. } => self.registered += 1,
            GroupOutcome::Unchanged { .. } => self.unchanged += 1,
            GroupOutcome::Extended { .. } => self.extended += 1,
            GroupOutcome::Fused { .. } => self.fused += 1,
            GroupOutcome::Rejected(r) => self.rejected.push(r),
            GroupOutcome::Malformed(m) => self.malformed.push((position, m)),
        }
    }

    /// Number of rejected groups.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Applies every group of `batch` under `policy`, in order.
pub fn glom(store: &mut EquivalenceStore, batch: &RelationBatch, policy: &ConflictPolicy) -> BatchReport {
    let span = tracing::info_span!("glom", source = %batch.source, groups = batch.len());
    let _enter = span.enter();

    let mut report = BatchReport::new(&batch.source);
    for (position, group) in batch.groups.iter().enumerate() {
        let outcome = apply_group(store, position, group, policy);
        report.record(position, outcome);
    }

    tracing::info!(
        registered = report.registered,
        extended = report.extended,
        fused = report.fused,
        unchanged = report.unchanged,
        rejected = report.rejected.len(),
        malformed = report.malformed.len(),
        classes = store.class_count(),
        identifiers = store.identifier_count(),
        "batch applied"
    );
    report
}

/// Applies a single group. `position` is only used for reporting.
pub fn apply_group(
    store: &mut EquivalenceStore,
    position: usize,
    group: &RelationGroup,
    policy: &ConflictPolicy,
) -> GroupOutcome {
    if let Some(malformed) = group.malformation() {
        tracing::warn!(position, group = %group, reason = %malformed, "skipping malformed group");
        return GroupOutcome::Malformed(malformed);
    }

    let members = group.distinct();
    let mut existing: Vec<ClassId> = Vec::new();
    let mut unknown: Vec<Identifier> = Vec::new();
    for id in &members {
        match store.class_of(id) {
            Some(cid) if !existing.contains(&cid) => existing.push(cid),
            Some(_) => {}
            None => unknown.push(id.clone()),
        }
    }

    let verdict = {
        let classes: Vec<&BTreeSet<Identifier>> = existing
            .iter()
            .filter_map(|cid| store.class(*cid).map(|c| c.members()))
            .collect();
        policy.evaluate(&classes, &members)
    };

    match verdict {
        PolicyVerdict::Accept => commit(store, &existing, unknown),
        PolicyVerdict::RejectUniqueness { .. } => {
            let mut rejected = rejection(position, group, verdict);
            match policy.rejection_fallback {
                RejectionFallback::RegisterStandalone => {
                    rejected.registered = register_standalone(store, unknown, policy);
                }
                RejectionFallback::Drop => rejected.dropped = unknown.len(),
            }
            log_rejection(&rejected);
            GroupOutcome::Rejected(rejected)
        }
        PolicyVerdict::RejectLowConfidence => {
            let mut rejected = rejection(position, group, verdict);
            if let Some(&first) = existing.first() {
                attach_to_first(store, first, unknown, &mut rejected);
            }
            log_rejection(&rejected);
            GroupOutcome::Rejected(rejected)
        }
    }
}

fn commit(store: &mut EquivalenceStore, existing: &[ClassId], unknown: Vec<Identifier>) -> GroupOutcome {
    match existing {
        [] => GroupOutcome::Registered {
            class: store.create_class(unknown),
        },
        [only] => {
            let added = store.fuse(*only, &[], unknown);
            if added == 0 {
                GroupOutcome::Unchanged { class: *only }
            } else {
                GroupOutcome::Extended { class: *only, added }
            }
        }
        _ => {
            // Fold into the largest class so the fewest identifiers rebind.
            let target = first_largest(store, existing).unwrap_or(existing[0]);
            let absorbed: Vec<ClassId> = existing.iter().copied().filter(|c| *c != target).collect();
            let added = unknown.len();
            store.fuse(target, &absorbed, unknown);
            GroupOutcome::Fused {
                class: target,
                absorbed: absorbed.len(),
                added,
            }
        }
    }
}

fn first_largest(store: &EquivalenceStore, existing: &[ClassId]) -> Option<ClassId> {
    let mut best: Option<(ClassId, usize)> = None;
    for &cid in existing {
        let len = store.class(cid).map_or(0, |c| c.len());
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((cid, len));
        }
    }
    best.map(|(cid, _)| cid)
}

fn rejection(position: usize, group: &RelationGroup, verdict: PolicyVerdict) -> RejectedMerge {
    RejectedMerge {
        position,
        group: group.clone(),
        verdict,
        attached: 0,
        registered: 0,
        dropped: 0,
        detected_at: Utc::now(),
    }
}

/// Unknown members of a uniqueness-rejected group form one fresh class,
/// unless that class would itself break uniqueness; then each stands alone.
fn register_standalone(store: &mut EquivalenceStore, unknown: Vec<Identifier>, policy: &ConflictPolicy) -> usize {
    let count = unknown.len();
    if count == 0 {
        return 0;
    }
    if uniqueness_violation(&policy.unique_namespaces, &[], &unknown).is_none() {
        store.create_class(unknown);
    } else {
        for id in unknown {
            store.create_class([id]);
        }
    }
    count
}

/// Low-confidence path: unknown members join `target` and nothing else
/// moves. The full union already passed the uniqueness check, so this
/// subset cannot violate it.
fn attach_to_first(
    store: &mut EquivalenceStore,
    target: ClassId,
    unknown: Vec<Identifier>,
    rejected: &mut RejectedMerge,
) {
    rejected.attached = store.fuse(target, &[], unknown);
}

fn log_rejection(rejected: &RejectedMerge) {
    tracing::debug!(
        position = rejected.position,
        group = %rejected.group,
        verdict = %rejected.verdict,
        attached = rejected.attached,
        registered = rejected.registered,
        dropped = rejected.dropped,
        "rejected merge"
    );
}

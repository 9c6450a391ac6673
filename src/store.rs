//! The equivalence store.
//!
//! Classes live in an arena and are addressed by [`ClassId`]. The index maps
//! every identifier ever seen to the handle of its class. Merging moves
//! members between arena slots and rebinds their handles; class objects are
//! never shared, so ownership stays with the store.
//!
//! The store has exactly one writer, the merge engine, which holds it by
//! `&mut`. Readers (validator, compendium writer) take `&self` between
//! batches.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::identifier::Identifier;
use crate::namespace::Namespace;

/// Handle of a class slot in the store's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

impl ClassId {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// A set of identifiers believed to denote one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EquivalenceClass {
    members: BTreeSet<Identifier>,
}

impl EquivalenceClass {
    /// Members in identifier order.
    #[must_use]
    pub fn members(&self) -> &BTreeSet<Identifier> {
        &self.members
    }

    /// Iterates members in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.members.iter()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the class has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: &Identifier) -> bool {
        self.members.contains(id)
    }

    /// Number of members in `ns`.
    #[must_use]
    pub fn count_in(&self, ns: &Namespace) -> usize {
        self.members.iter().filter(|id| id.in_namespace(ns)).count()
    }

    /// Returns true if any member is in one of `namespaces`.
    #[must_use]
    pub fn has_any_namespace<'a, I>(&self, namespaces: I) -> bool
    where
        I: IntoIterator<Item = &'a Namespace>,
    {
        namespaces.into_iter().any(|ns| self.count_in(ns) > 0)
    }

    pub(crate) fn insert(&mut self, id: Identifier) -> bool {
        self.members.insert(id)
    }
}

impl fmt::Display for EquivalenceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "}}")
    }
}

/// Identifier to class mapping plus the class arena.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceStore {
    slots: Vec<Option<EquivalenceClass>>,
    free: Vec<ClassId>,
    index: HashMap<Identifier, ClassId>,
}

impl EquivalenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The class containing `id`, if `id` has been seen.
    #[must_use]
    pub fn get(&self, id: &Identifier) -> Option<&EquivalenceClass> {
        self.class_of(id).and_then(|cid| self.class(cid))
    }

    /// Handle of the class containing `id`.
    #[must_use]
    pub fn class_of(&self, id: &Identifier) -> Option<ClassId> {
        self.index.get(id).copied()
    }

    /// The live class behind a handle.
    #[must_use]
    pub fn class(&self, cid: ClassId) -> Option<&EquivalenceClass> {
        self.slots.get(cid.0).and_then(Option::as_ref)
    }

    /// Returns true if `id` has been seen.
    #[must_use]
    pub fn contains(&self, id: &Identifier) -> bool {
        self.index.contains_key(id)
    }

    /// Live classes with their handles, in slot order. One entry per class.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &EquivalenceClass)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (ClassId(i), c)))
    }

    /// Every distinct class, one entry per class rather than per identifier.
    #[must_use]
    pub fn all_classes(&self) -> Vec<&EquivalenceClass> {
        self.classes().map(|(_, c)| c).collect()
    }

    /// Every indexed identifier with the handle it is bound to.
    pub fn bindings(&self) -> impl Iterator<Item = (&Identifier, ClassId)> {
        self.index.iter().map(|(id, cid)| (id, *cid))
    }

    /// Number of identifiers seen.
    #[must_use]
    pub fn identifier_count(&self) -> usize {
        self.index.len()
    }

    /// Number of live classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Order-independent view of the partition, for comparing stores.
    #[must_use]
    pub fn partition(&self) -> BTreeSet<BTreeSet<Identifier>> {
        self.classes().map(|(_, c)| c.members.clone()).collect()
    }

    /// Binds `id` to `cid` in the index without touching any class.
    pub(crate) fn put(&mut self, id: Identifier, cid: ClassId) {
        self.index.insert(id, cid);
    }

    /// Allocates a class holding `members` and binds them to it.
    pub(crate) fn create_class<I>(&mut self, members: I) -> ClassId
    where
        I: IntoIterator<Item = Identifier>,
    {
        let class = EquivalenceClass {
            members: members.into_iter().collect(),
        };
        let cid = match self.free.pop() {
            Some(cid) => cid,
            None => {
                self.slots.push(None);
                ClassId(self.slots.len() - 1)
            }
        };
        for id in &class.members {
            self.put(id.clone(), cid);
        }
        self.slots[cid.0] = Some(class);
        cid
    }

    /// Moves every member of `absorbed` and every `extra` identifier into
    /// `target`, retiring the absorbed slots. Returns the number of
    /// identifiers whose binding changed.
    ///
    /// `absorbed` must not contain `target`; handles that are not live are
    /// skipped.
    pub(crate) fn fuse<I>(&mut self, target: ClassId, absorbed: &[ClassId], extra: I) -> usize
    where
        I: IntoIterator<Item = Identifier>,
    {
        if self.class(target).is_none() {
            return 0;
        }
        let mut moved: Vec<Identifier> = Vec::new();
        for &cid in absorbed {
            if cid == target {
                continue;
            }
            if let Some(class) = self.slots.get_mut(cid.0).and_then(Option::take) {
                moved.extend(class.members);
                self.free.push(cid);
            }
        }
        moved.extend(extra);

        let Some(Some(class)) = self.slots.get_mut(target.0) else {
            return 0;
        };
        let mut rebound = Vec::with_capacity(moved.len());
        for id in moved {
            if class.insert(id.clone()) {
                rebound.push(id);
            }
        }
        let count = rebound.len();
        for id in rebound {
            self.put(id, target);
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn class_mut(&mut self, cid: ClassId) -> Option<&mut EquivalenceClass> {
        self.slots.get_mut(cid.0).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        s.parse().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let mut store = EquivalenceStore::new();
        let cid = store.create_class(vec![id("A:1"), id("B:1")]);

        assert_eq!(store.class_of(&id("A:1")), Some(cid));
        assert_eq!(store.class_of(&id("B:1")), Some(cid));
        assert!(store.get(&id("A:1")).unwrap().contains(&id("B:1")));
        assert!(store.get(&id("C:1")).is_none());
        assert_eq!(store.identifier_count(), 2);
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn test_all_classes_is_one_per_class() {
        let mut store = EquivalenceStore::new();
        store.create_class(vec![id("A:1"), id("B:1"), id("C:1")]);
        store.create_class(vec![id("A:2")]);

        assert_eq!(store.identifier_count(), 4);
        assert_eq!(store.all_classes().len(), 2);
    }

    #[test]
    fn test_fuse_rebinds_and_retires() {
        let mut store = EquivalenceStore::new();
        let big = store.create_class(vec![id("A:1"), id("B:1")]);
        let small = store.create_class(vec![id("C:1")]);

        let rebound = store.fuse(big, &[small], vec![id("D:1"), id("A:1")]);
        assert_eq!(rebound, 2);
        assert!(store.class(small).is_none());
        assert_eq!(store.class_of(&id("C:1")), Some(big));
        assert_eq!(store.class_of(&id("D:1")), Some(big));
        assert_eq!(store.class(big).unwrap().len(), 4);
        assert_eq!(store.class_count(), 1);
    }

    #[test]
    fn test_retired_slots_are_reused() {
        let mut store = EquivalenceStore::new();
        let a = store.create_class(vec![id("A:1")]);
        let b = store.create_class(vec![id("B:1")]);
        store.fuse(a, &[b], Vec::new());

        let c = store.create_class(vec![id("C:1")]);
        assert_eq!(c, b);
        assert_eq!(store.class_count(), 2);
    }

    #[test]
    fn test_fuse_ignores_target_in_absorbed() {
        let mut store = EquivalenceStore::new();
        let a = store.create_class(vec![id("A:1")]);
        store.fuse(a, &[a], Vec::new());
        assert!(store.class(a).is_some());
    }

    #[test]
    fn test_count_in_namespace() {
        let mut store = EquivalenceStore::new();
        let cid = store.create_class(vec![id("CHEBI:1"), id("CHEBI:2"), id("MESH:D1")]);
        let class = store.class(cid).unwrap();
        assert_eq!(class.count_in(&Namespace::Chebi), 2);
        assert_eq!(class.count_in(&Namespace::Unii), 0);
        assert!(class.has_any_namespace(&[Namespace::Unii, Namespace::Mesh]));
    }

    #[test]
    fn test_partition_ignores_slot_layout() {
        let mut left = EquivalenceStore::new();
        left.create_class(vec![id("A:1")]);
        left.create_class(vec![id("B:1"), id("C:1")]);

        let mut right = EquivalenceStore::new();
        right.create_class(vec![id("C:1"), id("B:1")]);
        right.create_class(vec![id("A:1")]);

        assert_eq!(left.partition(), right.partition());
    }
}

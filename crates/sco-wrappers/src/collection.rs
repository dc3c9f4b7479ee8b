//! The unbacked set wrapper.

use std::collections::HashSet;
use std::fmt;
use std::slice;

use sco_context::DetachState;
use sco_types::{FieldOrdinal, ObjectId, ScoElement};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::attach::{attach_elements, attach_unordered, detach_elements};
use crate::error::ScoResult;
use crate::owner::OwnerHandle;
use crate::sco::{Sco, ScoContainer};
use crate::tracker::ChangeTracker;

/// A set-valued field whose content lives entirely in memory.
///
/// The wrapper is always loaded. Mutations are reported to the owner:
/// relationship bookkeeping, then queueing (queued-update mode) or cascade
/// deletion of dependent elements, then dirty marking.
pub struct ScoCollection<E: ScoElement> {
    tracker: ChangeTracker<E>,
    delegate: HashSet<E>,
}

impl<E: ScoElement> ScoCollection<E> {
    pub fn new(owner: OwnerHandle<E>) -> Self {
        Self {
            tracker: ChangeTracker::unbacked(owner),
            delegate: HashSet::new(),
        }
    }

    pub fn unowned() -> Self {
        Self {
            tracker: ChangeTracker::unowned(),
            delegate: HashSet::new(),
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Start from an empty set.
    pub fn initialise(&mut self) {
        self.initialise_from(std::iter::empty());
    }

    /// Seed the set with a copy of `value`, without marking dirty.
    pub fn initialise_from(&mut self, value: impl IntoIterator<Item = E>) {
        self.delegate = value.into_iter().collect();
        debug!(
            field = %self.tracker.describe(),
            size = self.delegate.len(),
            queued = self.tracker.is_queued(),
            "initialised collection wrapper"
        );
    }

    pub fn initialise_with(&mut self, new: impl IntoIterator<Item = E>, old: Option<&HashSet<E>>) {
        debug!(previous = old.map(HashSet::len), "replacing collection value");
        self.initialise_from(new);
    }

    /// A copy of the current content.
    pub fn value(&self) -> HashSet<E> {
        self.delegate.clone()
    }

    /// An embedded element changed one of its fields.
    pub fn update_embedded_element(&self, element: &E, field: FieldOrdinal, make_dirty: bool) {
        debug!(element = ?element, field = %field, "embedded element updated");
        if make_dirty {
            self.tracker.make_dirty();
        }
    }

    /// A disconnected copy with every element detached through the owner.
    pub fn detach_copy(&self, state: &mut DetachState) -> HashSet<E> {
        detach_elements(self.tracker.owner(), &self.delegate, state)
            .into_iter()
            .collect()
    }

    /// Reconcile with a detached set: drop what it lacks, add what it adds.
    pub fn attach_copy(&mut self, value: &HashSet<E>) -> ScoResult<()> {
        let detached: Vec<E> = value.iter().cloned().collect();
        let attached = attach_elements(self.tracker.owner(), &detached);
        attach_unordered(self, attached)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.delegate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegate.is_empty()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.delegate.contains(element)
    }

    pub fn contains_all(&self, elements: &[E]) -> bool {
        elements.iter().all(|e| self.delegate.contains(e))
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.delegate.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.delegate.iter().cloned().collect()
    }

    // ---------------------------------------------------------------
    // Mutators
    // ---------------------------------------------------------------

    /// Add an element. Returns `false` if it was already present.
    pub fn add(&mut self, element: E) -> ScoResult<bool> {
        self.tracker.check_element(&element)?;
        if !self.delegate.insert(element.clone()) {
            return Ok(false);
        }
        self.tracker.added(slice::from_ref(&element));
        self.tracker.changed();
        Ok(true)
    }

    /// Add several elements. Nothing is added if any element is rejected.
    pub fn add_all(&mut self, elements: impl IntoIterator<Item = E>) -> ScoResult<bool> {
        let elements: Vec<E> = elements.into_iter().collect();
        self.tracker.check_elements(&elements)?;
        let added: Vec<E> = elements
            .into_iter()
            .filter(|e| self.delegate.insert(e.clone()))
            .collect();
        if added.is_empty() {
            return Ok(false);
        }
        self.tracker.added(&added);
        self.tracker.changed();
        Ok(true)
    }

    pub fn remove(&mut self, element: &E) -> bool {
        self.remove_with(element, true)
    }

    /// Remove an element, optionally suppressing cascade deletion.
    pub fn remove_with(&mut self, element: &E, allow_cascade_delete: bool) -> bool {
        if !self.delegate.remove(element) {
            return false;
        }
        self.tracker
            .removed(slice::from_ref(element), allow_cascade_delete);
        self.tracker.changed();
        true
    }

    pub fn remove_all(&mut self, elements: &[E]) -> bool {
        let removed: Vec<E> = elements
            .iter()
            .filter(|e| self.delegate.remove(*e))
            .cloned()
            .collect();
        self.finish_removal(removed)
    }

    /// Keep only elements in `keep`.
    pub fn retain_all(&mut self, keep: &[E]) -> bool {
        let keep: HashSet<&E> = keep.iter().collect();
        let dropped: Vec<E> = self
            .delegate
            .iter()
            .filter(|e| !keep.contains(e))
            .cloned()
            .collect();
        for element in &dropped {
            self.delegate.remove(element);
        }
        self.finish_removal(dropped)
    }

    pub fn clear(&mut self) {
        let cleared: Vec<E> = self.delegate.drain().collect();
        if !cleared.is_empty() {
            self.tracker.cleared(&cleared);
        }
        self.tracker.changed();
    }

    fn finish_removal(&mut self, removed: Vec<E>) -> bool {
        if removed.is_empty() {
            return false;
        }
        self.tracker.removed(&removed, true);
        self.tracker.changed();
        true
    }
}

impl<E: ScoElement> Sco for ScoCollection<E> {
    type Snapshot = HashSet<E>;

    fn owner_id(&self) -> Option<ObjectId> {
        self.tracker.owner_id()
    }

    fn field_name(&self) -> Option<&str> {
        self.tracker.field_name()
    }

    fn unset_owner(&mut self) {
        self.tracker.unset_owner();
    }

    fn make_dirty(&self) {
        self.tracker.make_dirty();
    }

    fn export_snapshot(&self) -> ScoResult<HashSet<E>> {
        Ok(self.value())
    }
}

impl<E: ScoElement> ScoContainer<E> for ScoCollection<E> {
    fn is_loaded(&self) -> bool {
        true
    }

    fn load(&self) -> ScoResult<()> {
        Ok(())
    }

    fn elements(&self) -> ScoResult<Vec<E>> {
        Ok(self.to_vec())
    }

    fn contains_element(&self, element: &E) -> ScoResult<bool> {
        Ok(self.contains(element))
    }

    fn add_element(&mut self, element: E) -> ScoResult<bool> {
        self.add(element)
    }

    fn remove_element(&mut self, element: &E, allow_cascade_delete: bool) -> ScoResult<bool> {
        Ok(self.remove_with(element, allow_cascade_delete))
    }
}

impl<E: ScoElement> Default for ScoCollection<E> {
    fn default() -> Self {
        Self::unowned()
    }
}

impl<E: ScoElement> PartialEq for ScoCollection<E> {
    fn eq(&self, other: &Self) -> bool {
        self.delegate == other.delegate
    }
}

impl<E: ScoElement> Eq for ScoCollection<E> {}

impl<E: ScoElement> PartialEq<HashSet<E>> for ScoCollection<E> {
    fn eq(&self, other: &HashSet<E>) -> bool {
        self.delegate == *other
    }
}

impl<E: ScoElement> fmt::Debug for ScoCollection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoCollection")
            .field("field", &self.tracker.field_name())
            .field("elements", &self.delegate)
            .finish()
    }
}

impl<E: ScoElement + Serialize> Serialize for ScoCollection<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export_snapshot()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoError;
    use crate::testing::{dependent_member, values_member, Fixture};
    use sco_context::{OperationKind, RelationEvent};
    use sco_store::{BackingStore, InMemoryBackingStore};
    use sco_types::{ScoConfig, EXT_ALLOW_NULLS};
    use std::rc::Rc;

    fn values(config: ScoConfig) -> (Fixture<i32>, ScoCollection<i32>) {
        let fixture = Fixture::new(config, values_member());
        let mut set = ScoCollection::new(fixture.owner());
        set.initialise();
        (fixture, set)
    }

    fn books(config: ScoConfig) -> (Fixture<ObjectId>, ScoCollection<ObjectId>) {
        let fixture = Fixture::new(config, dependent_member());
        let mut set = ScoCollection::new(fixture.owner());
        set.initialise();
        (fixture, set)
    }

    // ----------------------------------------------------------------
    // Dirty propagation
    // ----------------------------------------------------------------

    #[test]
    fn every_mutator_marks_dirty() {
        let (fixture, mut set) = values(ScoConfig::default());

        set.add(1).unwrap();
        assert_eq!(fixture.dirty(), 1);
        set.add_all([2, 3, 4]).unwrap();
        assert_eq!(fixture.dirty(), 2);
        set.remove(&1);
        assert_eq!(fixture.dirty(), 3);
        set.remove_all(&[2]);
        assert_eq!(fixture.dirty(), 4);
        set.retain_all(&[3]);
        assert_eq!(fixture.dirty(), 5);
        set.clear();
        assert_eq!(fixture.dirty(), 6);
        assert_eq!(fixture.ctx.nontransactional_updates(), 6);
    }

    #[test]
    fn no_op_mutations_leave_owner_clean() {
        let (fixture, mut set) = values(ScoConfig::default());
        set.add(1).unwrap();
        assert!(!set.add(1).unwrap());
        assert!(!set.remove(&9));
        assert!(!set.remove_all(&[9]));
        assert!(!set.retain_all(&[1]));
        assert_eq!(fixture.dirty(), 1);
    }

    #[test]
    fn ownerless_mutations_touch_only_the_delegate() {
        let (fixture, mut set) = books(ScoConfig::default());
        let x = ObjectId::new();
        set.add(x).unwrap();
        set.unset_owner();

        set.remove(&x);
        set.add(ObjectId::new()).unwrap();
        set.clear();

        assert!(set.is_empty());
        assert_eq!(set.owner_id(), None);
        assert_eq!(fixture.dirty(), 1);
        assert!(fixture.ctx.deleted().is_empty());
    }

    // ----------------------------------------------------------------
    // Cascade and relationships
    // ----------------------------------------------------------------

    #[test]
    fn removing_dependent_element_deletes_it_once() {
        let (fixture, mut set) = books(ScoConfig::default());
        let x = ObjectId::new();
        set.add(x).unwrap();

        assert!(set.remove(&x));
        assert!(!set.remove(&x));
        assert_eq!(fixture.ctx.deleted(), vec![x]);
    }

    #[test]
    fn cascade_can_be_suppressed() {
        let (fixture, mut set) = books(ScoConfig::default());
        let x = ObjectId::new();
        set.add(x).unwrap();
        assert!(set.remove_with(&x, false));
        assert!(fixture.ctx.deleted().is_empty());
    }

    #[test]
    fn retain_all_deletes_exactly_the_dropped_elements() {
        let (fixture, mut set) = books(ScoConfig::default());
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        set.add_all([a, b, c]).unwrap();

        set.retain_all(&[b, ObjectId::new()]);
        let mut deleted = fixture.ctx.deleted();
        deleted.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(deleted, expected);
        assert_eq!(set.to_vec(), vec![b]);
    }

    #[test]
    fn clear_deletes_dependent_elements() {
        let (fixture, mut set) = books(ScoConfig::default());
        let (a, b) = (ObjectId::new(), ObjectId::new());
        set.add_all([a, b]).unwrap();
        set.clear();
        assert_eq!(fixture.ctx.deleted().len(), 2);
    }

    #[test]
    fn plain_values_never_cascade() {
        let (fixture, mut set) = values(ScoConfig::default());
        set.add_all([1, 2]).unwrap();
        set.remove(&1);
        set.clear();
        assert!(fixture.ctx.deleted().is_empty());
    }

    #[test]
    fn relationships_follow_actual_changes() {
        let (fixture, mut set) = books(ScoConfig::default());
        let x = ObjectId::new();
        set.add(x).unwrap();
        set.add(x).unwrap();
        set.remove(&x);

        let field = fixture.member.field();
        assert_eq!(
            fixture.ctx.relation_events(fixture.owner_id()),
            vec![
                RelationEvent::Added { field, element: x },
                RelationEvent::Removed { field, element: x },
            ]
        );
    }

    #[test]
    fn relationships_can_be_disabled() {
        let config = ScoConfig {
            manage_relationships: false,
            ..Default::default()
        };
        let (fixture, mut set) = books(config);
        set.add(ObjectId::new()).unwrap();
        assert!(fixture.ctx.relation_events(fixture.owner_id()).is_empty());
    }

    // ----------------------------------------------------------------
    // Queued updates
    // ----------------------------------------------------------------

    #[test]
    fn queued_add_then_clear_flushes_in_order() {
        let (fixture, mut set) = books(ScoConfig::queued());
        let x = ObjectId::new();
        set.add(x).unwrap();
        set.clear();

        assert_eq!(
            fixture.ctx.queued(),
            vec![
                OperationKind::CollectionAdd { element: x },
                OperationKind::CollectionClear,
            ]
        );
        assert!(fixture.ctx.deleted().is_empty());

        let store = Rc::new(InMemoryBackingStore::new().with_dependent_elements());
        let shared: Rc<dyn BackingStore<ObjectId>> = store.clone();
        assert_eq!(fixture.ctx.flush(Some(&shared)).unwrap(), 2);
        assert!(store.contents(fixture.owner_id()).is_empty());
        assert_eq!(store.deleted(), vec![x]);
    }

    #[test]
    fn queued_remove_carries_cascade_flag() {
        let (fixture, mut set) = books(ScoConfig::queued());
        let x = ObjectId::new();
        set.add(x).unwrap();
        set.remove_with(&x, false);

        assert_eq!(
            fixture.ctx.queued()[1],
            OperationKind::CollectionRemove {
                element: x,
                allow_cascade_delete: false,
            }
        );
    }

    // ----------------------------------------------------------------
    // Input checks
    // ----------------------------------------------------------------

    #[test]
    fn null_elements_are_rejected_unless_allowed() {
        let fixture = Fixture::new(ScoConfig::default(), values_member());
        let mut set: ScoCollection<Option<i32>> = ScoCollection::new(fixture.owner());
        set.add(Some(1)).unwrap();

        let err = set.add_all([Some(2), None]).unwrap_err();
        assert_eq!(
            err,
            ScoError::NullElement {
                field: "scores".to_string()
            }
        );
        assert_eq!(set.len(), 1);
        assert_eq!(fixture.dirty(), 1);

        let lenient = Fixture::new(
            ScoConfig::default(),
            values_member().with_extension(EXT_ALLOW_NULLS, "true"),
        );
        let mut set: ScoCollection<Option<i32>> = ScoCollection::new(lenient.owner());
        assert!(set.add(None).unwrap());
    }

    // ----------------------------------------------------------------
    // Detach, attach and export
    // ----------------------------------------------------------------

    #[test]
    fn detached_copy_is_disconnected() {
        let (_fixture, mut set) = books(ScoConfig::default());
        let (a, b) = (ObjectId::new(), ObjectId::new());
        set.add(a).unwrap();

        let mut state = DetachState::new();
        let mut detached = set.detach_copy(&mut state);
        assert!(state.is_detached(&a));

        set.add(b).unwrap();
        assert_eq!(detached, HashSet::from([a]));
        detached.clear();
        assert!(set.contains(&a));
    }

    #[test]
    fn attach_reconciles_by_difference() {
        let (fixture, mut set) = books(ScoConfig::default());
        let (a, b, c) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        set.add_all([a, b]).unwrap();
        let before = fixture.dirty();

        set.attach_copy(&HashSet::from([b, c])).unwrap();
        assert_eq!(set, HashSet::from([b, c]));
        assert!(fixture.ctx.deleted().is_empty());
        assert_eq!(fixture.dirty(), before + 2);
    }

    #[test]
    fn serializes_as_plain_set() {
        let (_fixture, mut set) = values(ScoConfig::default());
        set.add_all([3, 1]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let plain: HashSet<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(set, plain);
    }

    #[test]
    fn unowned_collection_keeps_working() {
        let mut set = ScoCollection::unowned();
        set.add_all(["a".to_string(), "b".to_string()]).unwrap();
        set.remove(&"a".to_string());
        set.update_embedded_element(&"b".to_string(), FieldOrdinal::new(0), true);
        assert_eq!(set.to_vec(), vec!["b".to_string()]);
        assert_eq!(set.field_name(), None);
    }
}

//! The unbacked list wrapper.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::slice;

use sco_context::{DetachState, OperationKind};
use sco_types::{FieldOrdinal, ObjectId, ScoElement};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::attach::{attach_elements, detach_elements, same_element};
use crate::error::{ScoError, ScoResult};
use crate::owner::OwnerHandle;
use crate::sco::{Sco, ScoContainer};
use crate::tracker::ChangeTracker;

/// A list-valued field whose content lives entirely in memory.
///
/// Positional mutations are queued as positional operations, so a flush
/// replays them against the store in the order they happened. A removed
/// dependent element is only deleted once no position holds it any more.
pub struct ScoList<E: ScoElement> {
    tracker: ChangeTracker<E>,
    delegate: Vec<E>,
}

fn out_of_bounds(index: usize, len: usize) -> ScoError {
    ScoError::IndexOutOfBounds { index, len }
}

impl<E: ScoElement> ScoList<E> {
    pub fn new(owner: OwnerHandle<E>) -> Self {
        Self {
            tracker: ChangeTracker::unbacked(owner),
            delegate: Vec::new(),
        }
    }

    pub fn unowned() -> Self {
        Self {
            tracker: ChangeTracker::unowned(),
            delegate: Vec::new(),
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    pub fn initialise(&mut self) {
        self.initialise_from(std::iter::empty());
    }

    /// Seed the list with a copy of `value`, without marking dirty.
    pub fn initialise_from(&mut self, value: impl IntoIterator<Item = E>) {
        self.delegate = value.into_iter().collect();
        debug!(
            field = %self.tracker.describe(),
            size = self.delegate.len(),
            queued = self.tracker.is_queued(),
            "initialised list wrapper"
        );
    }

    pub fn initialise_with(&mut self, new: impl IntoIterator<Item = E>, old: Option<&[E]>) {
        debug!(previous = old.map(<[E]>::len), "replacing list value");
        self.initialise_from(new);
    }

    pub fn value(&self) -> Vec<E> {
        self.delegate.clone()
    }

    pub fn update_embedded_element(&self, element: &E, field: FieldOrdinal, make_dirty: bool) {
        debug!(element = ?element, field = %field, "embedded element updated");
        if make_dirty {
            self.tracker.make_dirty();
        }
    }

    pub fn detach_copy(&self, state: &mut DetachState) -> Vec<E> {
        detach_elements(self.tracker.owner(), &self.delegate, state)
    }

    /// Reconcile with a detached list.
    ///
    /// Surplus copies are removed and new elements inserted at their
    /// positions; the remaining elements are then moved into place without
    /// relationship events. None of these steps cascade-deletes.
    pub fn attach_copy(&mut self, value: &[E]) -> ScoResult<()> {
        let attached = attach_elements(self.tracker.owner(), value);
        let count = |elements: &[E], element: &E| {
            elements.iter().filter(|e| same_element(*e, element)).count()
        };

        for index in (0..self.delegate.len()).rev() {
            let current = &self.delegate[index];
            if count(&self.delegate, current) > count(&attached, current) {
                self.remove_at_with(index, false)?;
            }
        }

        for (index, element) in attached.iter().enumerate() {
            if count(&self.delegate, element) < count(&attached, element) {
                self.insert(index.min(self.delegate.len()), element.clone())?;
            }
        }

        let mut reordered = self.delegate.clone();
        for (slot, element) in reordered.iter_mut().zip(&attached) {
            if !same_element(slot, element) {
                *slot = element.clone();
            }
        }
        self.reorder(reordered);
        Ok(())
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

    pub fn get(&self, index: usize) -> Option<&E> {
        self.delegate.get(index)
    }

    pub fn contains(&self, element: &E) -> bool {
        self.delegate.contains(element)
    }

    pub fn contains_all(&self, elements: &[E]) -> bool {
        elements.iter().all(|e| self.delegate.contains(e))
    }

    pub fn index_of(&self, element: &E) -> Option<usize> {
        self.delegate.iter().position(|e| e == element)
    }

    pub fn last_index_of(&self, element: &E) -> Option<usize> {
        self.delegate.iter().rposition(|e| e == element)
    }

    /// A copy of the elements in `range`.
    pub fn slice(&self, range: Range<usize>) -> ScoResult<Vec<E>> {
        if range.start > range.end || range.end > self.delegate.len() {
            return Err(out_of_bounds(range.end, self.delegate.len()));
        }
        Ok(self.delegate[range].to_vec())
    }

    pub fn iter(&self) -> slice::Iter<'_, E> {
        self.delegate.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.delegate.clone()
    }

    // ---------------------------------------------------------------
    // Mutators
    // ---------------------------------------------------------------

    /// Append an element.
    pub fn add(&mut self, element: E) -> ScoResult<bool> {
        self.tracker.check_element(&element)?;
        self.delegate.push(element.clone());
        self.tracker.added(slice::from_ref(&element));
        self.tracker.changed();
        Ok(true)
    }

    /// Append several elements. Nothing is added if any element is rejected.
    pub fn add_all(&mut self, elements: impl IntoIterator<Item = E>) -> ScoResult<bool> {
        let elements: Vec<E> = elements.into_iter().collect();
        self.tracker.check_elements(&elements)?;
        if elements.is_empty() {
            return Ok(false);
        }
        self.delegate.extend(elements.iter().cloned());
        self.tracker.added(&elements);
        self.tracker.changed();
        Ok(true)
    }

    /// Insert an element at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, element: E) -> ScoResult<()> {
        if index > self.delegate.len() {
            return Err(out_of_bounds(index, self.delegate.len()));
        }
        self.tracker.check_element(&element)?;
        self.delegate.insert(index, element.clone());
        self.tracker.relation_added(slice::from_ref(&element));
        self.tracker.enqueue(OperationKind::ListAddAt { index, element });
        self.tracker.changed();
        Ok(())
    }

    pub fn insert_all(&mut self, index: usize, elements: impl IntoIterator<Item = E>) -> ScoResult<bool> {
        if index > self.delegate.len() {
            return Err(out_of_bounds(index, self.delegate.len()));
        }
        let elements: Vec<E> = elements.into_iter().collect();
        self.tracker.check_elements(&elements)?;
        if elements.is_empty() {
            return Ok(false);
        }
        let tail = self.delegate.split_off(index);
        self.delegate.extend(elements.iter().cloned());
        self.delegate.extend(tail);
        self.tracker.relation_added(&elements);
        for (offset, element) in elements.into_iter().enumerate() {
            self.tracker.enqueue(OperationKind::ListAddAt {
                index: index + offset,
                element,
            });
        }
        self.tracker.changed();
        Ok(true)
    }

    /// Remove the first occurrence of `element`.
    pub fn remove(&mut self, element: &E) -> bool {
        self.remove_with(element, true)
    }

    pub fn remove_with(&mut self, element: &E, allow_cascade_delete: bool) -> bool {
        let Some(index) = self.index_of(element) else {
            return false;
        };
        let removed = self.delegate.remove(index);
        let queued = OperationKind::CollectionRemove {
            element: removed.clone(),
            allow_cascade_delete,
        };
        self.report_removal(&removed, queued, allow_cascade_delete);
        self.tracker.changed();
        true
    }

    /// Remove and return the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> ScoResult<E> {
        self.remove_at_with(index, true)
    }

    fn remove_at_with(&mut self, index: usize, allow_cascade_delete: bool) -> ScoResult<E> {
        if index >= self.delegate.len() {
            return Err(out_of_bounds(index, self.delegate.len()));
        }
        let removed = self.delegate.remove(index);
        self.report_removal(&removed, OperationKind::ListRemoveAt { index }, allow_cascade_delete);
        self.tracker.changed();
        Ok(removed)
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, element: E) -> ScoResult<E> {
        self.set_with(index, element, true)
    }

    /// Replace the element at `index`. With `allow_dependent_field` off the
    /// previous element is never cascade-deleted, as when elements only
    /// change position.
    pub fn set_with(&mut self, index: usize, element: E, allow_dependent_field: bool) -> ScoResult<E> {
        let len = self.delegate.len();
        let slot = self
            .delegate
            .get_mut(index)
            .ok_or(out_of_bounds(index, len))?;
        self.tracker.check_element(&element)?;
        let previous = std::mem::replace(slot, element.clone());

        if previous != element {
            self.tracker.relation_removed(slice::from_ref(&previous));
            self.tracker.relation_added(slice::from_ref(&element));
        }
        if self.tracker.is_queued() {
            self.tracker.enqueue(OperationKind::ListSet {
                index,
                element,
                allow_cascade_delete: allow_dependent_field,
            });
        } else if allow_dependent_field && !self.delegate.contains(&previous) {
            self.tracker.cascade_delete(slice::from_ref(&previous));
        }
        self.tracker.changed();
        Ok(previous)
    }

    /// Remove every occurrence of each listed element.
    pub fn remove_all(&mut self, elements: &[E]) -> bool {
        let doomed: HashSet<&E> = elements.iter().collect();
        self.remove_where(|e| doomed.contains(e))
    }

    /// Keep only elements in `keep`.
    pub fn retain_all(&mut self, keep: &[E]) -> bool {
        let keep: HashSet<&E> = keep.iter().collect();
        self.remove_where(|e| !keep.contains(e))
    }

    pub fn clear(&mut self) {
        let cleared = std::mem::take(&mut self.delegate);
        if !cleared.is_empty() {
            self.tracker.cleared(&cleared);
        }
        self.tracker.changed();
    }

    /// Reorder the list. Reordering never cascade-deletes.
    pub fn sort_by(&mut self, compare: impl FnMut(&E, &E) -> Ordering) {
        let mut sorted = self.delegate.clone();
        sorted.sort_by(compare);
        self.reorder(sorted);
    }

    /// Replace the content with a permutation of itself. Moved positions
    /// are queued as overwrites that never cascade.
    fn reorder(&mut self, order: Vec<E>) {
        let before = std::mem::replace(&mut self.delegate, order);
        let moved: Vec<usize> = (0..before.len())
            .filter(|&i| before[i] != self.delegate[i])
            .collect();
        if moved.is_empty() {
            return;
        }
        for index in moved {
            self.tracker.enqueue(OperationKind::ListSet {
                index,
                element: self.delegate[index].clone(),
                allow_cascade_delete: false,
            });
        }
        self.tracker.changed();
    }

    pub fn sort(&mut self)
    where
        E: Ord,
    {
        self.sort_by(Ord::cmp);
    }

    fn remove_where(&mut self, mut doomed: impl FnMut(&E) -> bool) -> bool {
        let mut removed = Vec::new();
        self.delegate.retain(|e| {
            if doomed(e) {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return false;
        }
        self.tracker.removed(&removed, true);
        self.tracker.changed();
        true
    }

    fn report_removal(&self, element: &E, queued: OperationKind<E>, allow_cascade_delete: bool) {
        self.tracker.relation_removed(slice::from_ref(element));
        if self.tracker.is_queued() {
            self.tracker.enqueue(queued);
        } else if allow_cascade_delete && !self.delegate.contains(element) {
            self.tracker.cascade_delete(slice::from_ref(element));
        }
    }
}

impl<E: ScoElement> Sco for ScoList<E> {
    type Snapshot = Vec<E>;

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

    fn export_snapshot(&self) -> ScoResult<Vec<E>> {
        Ok(self.value())
    }
}

impl<E: ScoElement> ScoContainer<E> for ScoList<E> {
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

impl<E: ScoElement> Default for ScoList<E> {
    fn default() -> Self {
        Self::unowned()
    }
}

impl<E: ScoElement> PartialEq for ScoList<E> {
    fn eq(&self, other: &Self) -> bool {
        self.delegate == other.delegate
    }
}

impl<E: ScoElement> Eq for ScoList<E> {}

impl<E: ScoElement> PartialEq<Vec<E>> for ScoList<E> {
    fn eq(&self, other: &Vec<E>) -> bool {
        self.delegate == *other
    }
}

impl<E: ScoElement> PartialEq<[E]> for ScoList<E> {
    fn eq(&self, other: &[E]) -> bool {
        self.delegate.as_slice() == other
    }
}

impl<E: ScoElement> Hash for ScoList<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.delegate.hash(state);
    }
}

impl<E: ScoElement> fmt::Debug for ScoList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoList")
            .field("field", &self.tracker.field_name())
            .field("elements", &self.delegate)
            .finish()
    }
}

impl<E: ScoElement + Serialize> Serialize for ScoList<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export_snapshot()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

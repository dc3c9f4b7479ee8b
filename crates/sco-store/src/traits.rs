use sco_types::{FieldOrdinal, ObjectId, ScoElement};

use crate::error::StoreResult;

/// Datastore-facing channel for one container field.
///
/// All implementations must satisfy these invariants:
/// - Every call is scoped to the container identified by `owner`.
/// - Positional calls use the store's own ordering; `get(owner, 0)` is the
///   head of an ordered container.
/// - `size` hints passed by callers are the container size before the call
///   when known, `None` otherwise. Stores may use them for index
///   bookkeeping and must not rely on them.
/// - Operations that cascade-delete dependent elements only do so when the
///   caller allows it.
pub trait BackingStore<E: ScoElement> {
    fn size(&self, owner: ObjectId) -> StoreResult<usize>;

    fn contains(&self, owner: ObjectId, element: &E) -> StoreResult<bool>;

    /// Iterate the whole container, in store order.
    fn elements(&self, owner: ObjectId) -> StoreResult<Vec<E>>;

    /// Element at `position`, or `None` past the end.
    fn get(&self, owner: ObjectId, position: usize) -> StoreResult<Option<E>>;

    /// Append an element. Returns `true` if the container changed.
    fn add(&self, owner: ObjectId, element: &E, size: Option<usize>) -> StoreResult<bool>;

    /// Append several elements. Returns `true` if the container changed.
    ///
    /// Default implementation calls `add()` for each element.
    fn add_all(&self, owner: ObjectId, elements: &[E], size: Option<usize>) -> StoreResult<bool> {
        let mut changed = false;
        for (offset, element) in elements.iter().enumerate() {
            changed |= self.add(owner, element, size.map(|s| s + offset))?;
        }
        Ok(changed)
    }

    /// Insert an element at `position`, shifting later elements.
    fn insert(&self, owner: ObjectId, position: usize, element: &E) -> StoreResult<()>;

    /// Remove the first occurrence of `element`. Returns `true` if found.
    fn remove(
        &self,
        owner: ObjectId,
        element: &E,
        size: Option<usize>,
        allow_cascade_delete: bool,
    ) -> StoreResult<bool>;

    /// Remove the element at `position`, returning it.
    fn remove_at(
        &self,
        owner: ObjectId,
        position: usize,
        size: Option<usize>,
    ) -> StoreResult<Option<E>>;

    /// Remove every listed element. Returns `true` if the container changed.
    ///
    /// Default implementation calls `remove()` for each element.
    fn remove_all(&self, owner: ObjectId, elements: &[E], size: Option<usize>) -> StoreResult<bool> {
        let mut changed = false;
        for element in elements {
            changed |= self.remove(owner, element, size, true)?;
        }
        Ok(changed)
    }

    /// Replace the element at `position`, returning the previous one.
    fn set(
        &self,
        owner: ObjectId,
        position: usize,
        element: &E,
        allow_cascade_delete: bool,
    ) -> StoreResult<E>;

    fn clear(&self, owner: ObjectId) -> StoreResult<()>;

    /// Write through a change to one field of an embedded element.
    ///
    /// Returns `true` if the store performed an update. Stores without
    /// embedded elements keep the default no-op.
    fn update_embedded_element(
        &self,
        _owner: ObjectId,
        _element: &E,
        _field: FieldOrdinal,
    ) -> StoreResult<bool> {
        Ok(false)
    }
}

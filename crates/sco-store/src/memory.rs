use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use sco_types::{ObjectId, ScoElement};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::BackingStore;

/// Ordering applied by an ordered store after every write.
pub type ElementOrder<E> = Rc<dyn Fn(&E, &E) -> Ordering>;

/// In-memory, HashMap-based backing store.
///
/// Intended for tests and embedding. Each owner's container is a `Vec`
/// held behind a `RefCell`; stores are single-threaded like the wrappers
/// that use them. An ordered store keeps every container sorted, so
/// position 0 is always the head.
///
/// Besides the [`BackingStore`] contract the store records what happened
/// to it: how many full iterations were served, how many mutations were
/// attempted, and which dependent elements were cascade-deleted. Mutations
/// can be made to fail on demand.
pub struct InMemoryBackingStore<E: ScoElement> {
    containers: RefCell<HashMap<ObjectId, Vec<E>>>,
    order: Option<ElementOrder<E>>,
    dependent: bool,
    deleted: RefCell<Vec<E>>,
    failing: Cell<bool>,
    iterations: Cell<usize>,
    mutations: Cell<usize>,
}

impl<E: ScoElement> InMemoryBackingStore<E> {
    /// Create an empty store keeping insertion order.
    pub fn new() -> Self {
        Self {
            containers: RefCell::new(HashMap::new()),
            order: None,
            dependent: false,
            deleted: RefCell::new(Vec::new()),
            failing: Cell::new(false),
            iterations: Cell::new(0),
            mutations: Cell::new(0),
        }
    }

    /// Create an empty store that keeps containers sorted by `order`.
    pub fn ordered(order: ElementOrder<E>) -> Self {
        Self {
            order: Some(order),
            ..Self::new()
        }
    }

    /// Treat elements as dependent: removing them deletes their records.
    pub fn with_dependent_elements(mut self) -> Self {
        self.dependent = true;
        self
    }

    /// Replace an owner's container without counting a mutation.
    pub fn seed(&self, owner: ObjectId, elements: impl IntoIterator<Item = E>) {
        let mut elements: Vec<E> = elements.into_iter().collect();
        self.sort(&mut elements);
        debug!(owner = %owner, count = elements.len(), "seeded backing store");
        self.containers.borrow_mut().insert(owner, elements);
    }

    /// Current content of an owner's container, without counting an iteration.
    pub fn contents(&self, owner: ObjectId) -> Vec<E> {
        self.containers
            .borrow()
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every subsequent mutation fail with a datastore error.
    pub fn fail_mutations(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Number of full iterations served by [`BackingStore::elements`].
    pub fn iterations(&self) -> usize {
        self.iterations.get()
    }

    /// Number of mutations attempted, failed ones included.
    pub fn mutations(&self) -> usize {
        self.mutations.get()
    }

    /// Dependent elements deleted by cascading removals, in order.
    pub fn deleted(&self) -> Vec<E> {
        self.deleted.borrow().clone()
    }

    fn sort(&self, elements: &mut [E]) {
        if let Some(order) = &self.order {
            elements.sort_by(|a, b| order(a, b));
        }
    }

    fn mutate<T>(
        &self,
        owner: ObjectId,
        apply: impl FnOnce(&mut Vec<E>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.mutations.set(self.mutations.get() + 1);
        if self.failing.get() {
            return Err(StoreError::Datastore(format!(
                "write rejected for owner {owner}"
            )));
        }
        let mut containers = self.containers.borrow_mut();
        let elements = containers.entry(owner).or_default();
        let result = apply(&mut *elements)?;
        self.sort(elements);
        Ok(result)
    }

    fn cascade(&self, element: E, remaining: &[E], allow_cascade_delete: bool) {
        if self.dependent && allow_cascade_delete && !remaining.contains(&element) {
            self.deleted.borrow_mut().push(element);
        }
    }
}

impl<E: ScoElement> Default for InMemoryBackingStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScoElement> BackingStore<E> for InMemoryBackingStore<E> {
    fn size(&self, owner: ObjectId) -> StoreResult<usize> {
        Ok(self.containers.borrow().get(&owner).map_or(0, Vec::len))
    }

    fn contains(&self, owner: ObjectId, element: &E) -> StoreResult<bool> {
        Ok(self
            .containers
            .borrow()
            .get(&owner)
            .is_some_and(|elements| elements.contains(element)))
    }

    fn elements(&self, owner: ObjectId) -> StoreResult<Vec<E>> {
        self.iterations.set(self.iterations.get() + 1);
        Ok(self.contents(owner))
    }

    fn get(&self, owner: ObjectId, position: usize) -> StoreResult<Option<E>> {
        Ok(self
            .containers
            .borrow()
            .get(&owner)
            .and_then(|elements| elements.get(position).cloned()))
    }

    fn add(&self, owner: ObjectId, element: &E, _size: Option<usize>) -> StoreResult<bool> {
        self.mutate(owner, |elements| {
            elements.push(element.clone());
            Ok(true)
        })
    }

    fn insert(&self, owner: ObjectId, position: usize, element: &E) -> StoreResult<()> {
        self.mutate(owner, |elements| {
            if position > elements.len() {
                return Err(StoreError::PositionOutOfRange {
                    position,
                    size: elements.len(),
                });
            }
            elements.insert(position, element.clone());
            Ok(())
        })
    }

    fn remove(
        &self,
        owner: ObjectId,
        element: &E,
        _size: Option<usize>,
        allow_cascade_delete: bool,
    ) -> StoreResult<bool> {
        let removed = self.mutate(owner, |elements| {
            Ok(match elements.iter().position(|e| e == element) {
                Some(position) => Some((elements.remove(position), elements.clone())),
                None => None,
            })
        })?;
        Ok(match removed {
            Some((element, remaining)) => {
                self.cascade(element, &remaining, allow_cascade_delete);
                true
            }
            None => false,
        })
    }

    fn remove_at(
        &self,
        owner: ObjectId,
        position: usize,
        _size: Option<usize>,
    ) -> StoreResult<Option<E>> {
        let removed = self.mutate(owner, |elements| {
            if position >= elements.len() {
                return Ok(None);
            }
            let element = elements.remove(position);
            Ok(Some((element, elements.clone())))
        })?;
        Ok(removed.map(|(element, remaining)| {
            self.cascade(element.clone(), &remaining, true);
            element
        }))
    }

    fn set(
        &self,
        owner: ObjectId,
        position: usize,
        element: &E,
        allow_cascade_delete: bool,
    ) -> StoreResult<E> {
        let (previous, remaining) = self.mutate(owner, |elements| {
            let size = elements.len();
            let slot = elements
                .get_mut(position)
                .ok_or(StoreError::PositionOutOfRange { position, size })?;
            let previous = std::mem::replace(slot, element.clone());
            Ok((previous, elements.clone()))
        })?;
        self.cascade(previous.clone(), &remaining, allow_cascade_delete);
        Ok(previous)
    }

    fn clear(&self, owner: ObjectId) -> StoreResult<()> {
        let cleared = self.mutate(owner, |elements| Ok(std::mem::take(elements)))?;
        for element in cleared {
            self.cascade(element, &[], true);
        }
        Ok(())
    }
}

impl<E: ScoElement> fmt::Debug for InMemoryBackingStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBackingStore")
            .field("owners", &self.containers.borrow().len())
            .field("ordered", &self.order.is_some())
            .field("dependent", &self.dependent)
            .finish()
    }
}

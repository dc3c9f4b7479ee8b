use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::slice;

use sco_context::{DetachState, OperationKind};
use sco_store::BackingStore;
use sco_types::{FieldOrdinal, ObjectId, ScoElement};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::attach::{attach_elements, attach_unordered, detach_elements};
use crate::error::ScoResult;
use crate::owner::OwnerHandle;
use crate::sco::{Sco, ScoContainer};
use crate::tracker::{ChangeTracker, Dispatch, Mirror};

/// Ordering of a priority queue; the least element is the head.
pub type Comparator<E> = Rc<dyn Fn(&E, &E) -> Ordering>;

struct QueueState<E> {
    /// Kept sorted by the comparator, head first.
    delegate: Vec<E>,
    loaded: bool,
}

/// A priority-queue field with an optional backing store.
///
/// With caching on, the store is iterated once and every later read is
/// served from memory. With caching off, reads go to the store on every
/// call and the delegate only shadows the changes made through this
/// wrapper.
///
/// Store failures while mirroring a change are logged and swallowed: the
/// in-memory change stands, and the mutator reports `false` (or `None` for
/// [`poll`](Self::poll)).
pub struct BackedPriorityQueue<E: ScoElement> {
    tracker: ChangeTracker<E>,
    comparator: Comparator<E>,
    use_cache: bool,
    lazy: bool,
    state: RefCell<QueueState<E>>,
}

fn insert_sorted<E>(comparator: &Comparator<E>, delegate: &mut Vec<E>, element: E) {
    let position = delegate.partition_point(|e| comparator(e, &element) != Ordering::Greater);
    delegate.insert(position, element);
}

fn outcome(mirrored: Mirror<bool>, delegate: bool) -> bool {
    match mirrored {
        Mirror::Skipped => delegate,
        Mirror::Applied(changed) => changed,
        Mirror::Failed => false,
    }
}

impl<E: ScoElement + Ord> BackedPriorityQueue<E> {
    /// A queue in the elements' natural order.
    pub fn new(owner: OwnerHandle<E>) -> Self {
        Self::with_comparator(owner, Rc::new(|a: &E, b: &E| a.cmp(b)))
    }
}

impl<E: ScoElement> BackedPriorityQueue<E> {
    pub fn with_comparator(owner: OwnerHandle<E>, comparator: Comparator<E>) -> Self {
        let config = owner.context().config();
        let use_cache = config.use_container_cache(owner.member());
        let lazy = config.use_cached_lazy_loading(owner.member());
        let store = ChangeTracker::resolve_store(&owner);
        let queue = Self {
            tracker: ChangeTracker::backed(owner, store),
            comparator,
            use_cache,
            lazy,
            state: RefCell::new(QueueState {
                delegate: Vec::new(),
                loaded: false,
            }),
        };
        debug!(
            field = %queue.tracker.describe(),
            use_cache,
            lazy,
            backed = queue.tracker.store_channel().is_some(),
            queued = queue.tracker.is_queued(),
            "created backed priority queue"
        );
        queue
    }

    pub fn unowned(comparator: Comparator<E>) -> Self {
        Self {
            tracker: ChangeTracker::unowned(),
            comparator,
            use_cache: true,
            lazy: false,
            state: RefCell::new(QueueState {
                delegate: Vec::new(),
                loaded: false,
            }),
        }
    }

    pub fn comparator(&self) -> &Comparator<E> {
        &self.comparator
    }

    pub fn backing_store(&self) -> Option<&Rc<dyn BackingStore<E>>> {
        self.tracker.store_channel().map(|(store, _)| store)
    }

    // ---------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------

    /// Fill the delegate from the store, once.
    pub fn load_from_store(&self) -> ScoResult<()> {
        let Some((store, owner)) = self.tracker.store_channel() else {
            return Ok(());
        };
        if self.state.borrow().loaded {
            return Ok(());
        }
        debug!(field = %self.tracker.describe(), "loading priority queue from backing store");
        let mut elements = store.elements(owner)?;
        elements.sort_by(|a, b| (self.comparator)(a, b));
        let mut state = self.state.borrow_mut();
        state.delegate = elements;
        state.loaded = true;
        Ok(())
    }

    fn ensure_loaded(&self) -> ScoResult<()> {
        if self.use_cache {
            self.load_from_store()?;
        }
        Ok(())
    }

    /// Whether the delegate holds the full content.
    fn authoritative(&self) -> bool {
        self.tracker.store_channel().is_none() || (self.use_cache && self.state.borrow().loaded)
    }

    /// Size hint passed to store mutations.
    fn size_hint(&self) -> Option<usize> {
        self.use_cache.then(|| self.state.borrow().delegate.len())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Prepare a freshly created wrapper, loading it now unless it loads
    /// lazily.
    pub fn initialise(&mut self) -> ScoResult<()> {
        if self.use_cache && !self.lazy {
            self.load_from_store()?;
        }
        Ok(())
    }

    /// Seed the delegate from an already persisted value. Nothing is
    /// mirrored and the owner is not marked dirty.
    pub fn initialise_from(&mut self, value: impl IntoIterator<Item = E>) {
        let mut elements: Vec<E> = value.into_iter().collect();
        elements.sort_by(|a, b| (self.comparator)(a, b));
        debug!(field = %self.tracker.describe(), size = elements.len(), "initialised priority queue");
        let state = self.state.get_mut();
        state.delegate = elements;
        if self.use_cache {
            state.loaded = true;
        }
    }

    /// Replace the whole value.
    ///
    /// For an owner whose state already reached the datastore, the store
    /// content is replaced as a clear followed by one add per element,
    /// queued or applied right away depending on the update mode.
    pub fn initialise_with(&mut self, new: impl IntoIterator<Item = E>, old: Option<&[E]>) {
        let mut elements: Vec<E> = new.into_iter().collect();
        debug!(
            field = %self.tracker.describe(),
            size = elements.len(),
            previous = old.map(<[E]>::len),
            "replacing priority queue value"
        );
        if self.mirrors_replacement() {
            match self.tracker.dispatch() {
                Dispatch::Queued(_) => {
                    self.tracker.enqueue(OperationKind::CollectionClear);
                    for element in &elements {
                        self.tracker.enqueue(OperationKind::CollectionAdd {
                            element: element.clone(),
                        });
                    }
                }
                Dispatch::Immediate(_) => {
                    let size = self.use_cache.then_some(0);
                    self.tracker.mirror("clear", |store, owner| store.clear(owner));
                    self.tracker
                        .mirror("add-all", |store, owner| store.add_all(owner, &elements, size));
                }
                Dispatch::Memory => {}
            }
        }
        elements.sort_by(|a, b| (self.comparator)(a, b));
        let state = self.state.get_mut();
        state.delegate = elements;
        state.loaded = true;
        self.tracker.make_dirty();
    }

    fn mirrors_replacement(&self) -> bool {
        if self.tracker.store_channel().is_none() {
            return false;
        }
        let Some(sm) = self.tracker.owner().and_then(OwnerHandle::state_manager) else {
            return false;
        };
        if self.tracker.is_queued() || !sm.lifecycle_is_new() {
            sm.is_flushed_to_datastore()
        } else {
            true
        }
    }

    /// Disconnected copy of the full, ordered content.
    pub fn value(&self) -> ScoResult<Vec<E>> {
        self.export_snapshot()
    }

    pub fn update_embedded_element(&self, element: &E, field: FieldOrdinal, make_dirty: bool) {
        self.tracker.call_store("update-embedded-element", |store, owner| {
            store.update_embedded_element(owner, element, field)
        });
        if make_dirty {
            self.tracker.make_dirty();
        }
    }

    pub fn detach_copy(&self, state: &mut DetachState) -> ScoResult<Vec<E>> {
        let elements = self.export_snapshot()?;
        Ok(detach_elements(self.tracker.owner(), &elements, state))
    }

    /// Reconcile with a detached value by adding and removing the
    /// difference, without cascading.
    pub fn attach_copy(&mut self, value: &[E]) -> ScoResult<()> {
        let attached = attach_elements(self.tracker.owner(), value);
        attach_unordered(self, attached)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn len(&self) -> ScoResult<usize> {
        if !self.authoritative() {
            if let Some((store, owner)) = self.tracker.store_channel() {
                return Ok(store.size(owner)?);
            }
        }
        Ok(self.state.borrow().delegate.len())
    }

    pub fn is_empty(&self) -> ScoResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, element: &E) -> ScoResult<bool> {
        if !self.authoritative() {
            if let Some((store, owner)) = self.tracker.store_channel() {
                return Ok(store.contains(owner, element)?);
            }
        }
        Ok(self.state.borrow().delegate.contains(element))
    }

    pub fn contains_all(&self, elements: &[E]) -> ScoResult<bool> {
        let current = self.to_vec()?;
        Ok(elements.iter().all(|e| current.contains(e)))
    }

    /// Current elements; in the store's order when read from the store.
    pub fn to_vec(&self) -> ScoResult<Vec<E>> {
        self.ensure_loaded()?;
        if !self.use_cache {
            if let Some((store, owner)) = self.tracker.store_channel() {
                return Ok(store.elements(owner)?);
            }
        }
        Ok(self.state.borrow().delegate.clone())
    }

    /// The head of the queue, without removing it.
    pub fn peek(&self) -> ScoResult<Option<E>> {
        self.ensure_loaded()?;
        if !self.use_cache {
            if let Some((store, owner)) = self.tracker.store_channel() {
                return Ok(store.get(owner, 0)?);
            }
        }
        Ok(self.state.borrow().delegate.first().cloned())
    }

    // ---------------------------------------------------------------
    // Mutators
    // ---------------------------------------------------------------

    pub fn add(&mut self, element: E) -> ScoResult<bool> {
        self.tracker.check_element(&element)?;
        self.ensure_loaded()?;
        let size = self.size_hint();
        let mirrored = self
            .tracker
            .mirror("add", |store, owner| store.add(owner, &element, size));
        insert_sorted(&self.comparator, &mut self.state.get_mut().delegate, element.clone());
        self.tracker.added(slice::from_ref(&element));
        self.tracker.changed();
        Ok(outcome(mirrored, true))
    }

    pub fn offer(&mut self, element: E) -> ScoResult<bool> {
        self.add(element)
    }

    pub fn add_all(&mut self, elements: impl IntoIterator<Item = E>) -> ScoResult<bool> {
        let elements: Vec<E> = elements.into_iter().collect();
        self.tracker.check_elements(&elements)?;
        if elements.is_empty() {
            return Ok(false);
        }
        self.ensure_loaded()?;
        let size = self.size_hint();
        let mirrored = self
            .tracker
            .mirror("add-all", |store, owner| store.add_all(owner, &elements, size));
        let delegate = &mut self.state.get_mut().delegate;
        for element in &elements {
            insert_sorted(&self.comparator, delegate, element.clone());
        }
        self.tracker.added(&elements);
        self.tracker.changed();
        Ok(outcome(mirrored, true))
    }

    /// Remove and return the head.
    ///
    /// When changes are mirrored right away the store's head is returned,
    /// or `None` if the store failed.
    pub fn poll(&mut self) -> ScoResult<Option<E>> {
        self.ensure_loaded()?;
        let size = self.size_hint();
        let authoritative = self.authoritative();
        let polled = {
            let delegate = &mut self.state.get_mut().delegate;
            (!delegate.is_empty()).then(|| delegate.remove(0))
        };

        let result = match self.tracker.dispatch() {
            Dispatch::Queued(_) => {
                if let Some(element) = &polled {
                    self.tracker.relation_removed(slice::from_ref(element));
                }
                if polled.is_some() || !authoritative {
                    self.tracker.enqueue(OperationKind::ListRemoveAt { index: 0 });
                }
                polled
            }
            Dispatch::Immediate(_) => {
                let mirrored = self
                    .tracker
                    .mirror("poll", |store, owner| store.remove_at(owner, 0, size));
                // The store's head is what left the queue; on failure the
                // delegate change still stands.
                let left = match &mirrored {
                    Mirror::Applied(head) => head.as_ref(),
                    Mirror::Skipped | Mirror::Failed => polled.as_ref(),
                };
                if let Some(element) = left {
                    self.tracker.relation_removed(slice::from_ref(element));
                }
                match mirrored {
                    Mirror::Applied(head) => head,
                    Mirror::Skipped | Mirror::Failed => None,
                }
            }
            Dispatch::Memory => {
                if let Some(element) = &polled {
                    self.tracker.relation_removed(slice::from_ref(element));
                    if !self.state.get_mut().delegate.contains(element) {
                        self.tracker.cascade_delete(slice::from_ref(element));
                    }
                }
                polled
            }
        };
        self.tracker.changed();
        Ok(result)
    }

    pub fn remove(&mut self, element: &E) -> ScoResult<bool> {
        self.remove_with(element, true)
    }

    pub fn remove_with(&mut self, element: &E, allow_cascade_delete: bool) -> ScoResult<bool> {
        self.ensure_loaded()?;
        let size = self.size_hint();
        let removed = {
            let delegate = &mut self.state.get_mut().delegate;
            delegate
                .iter()
                .position(|e| e == element)
                .map(|index| delegate.remove(index))
        };
        // Queued adds are only visible in the delegate until the flush.
        let queued_present = self.tracker.is_queued()
            && (removed.is_some() || (!self.authoritative() && self.contains(element)?));

        let result = match self.tracker.dispatch() {
            Dispatch::Queued(_) => {
                if queued_present {
                    self.tracker.relation_removed(slice::from_ref(element));
                    self.tracker.enqueue(OperationKind::CollectionRemove {
                        element: element.clone(),
                        allow_cascade_delete,
                    });
                }
                queued_present
            }
            Dispatch::Immediate(_) => {
                let mirrored = self.tracker.mirror("remove", |store, owner| {
                    store.remove(owner, element, size, allow_cascade_delete)
                });
                let gone = match &mirrored {
                    Mirror::Applied(changed) => *changed,
                    Mirror::Skipped | Mirror::Failed => removed.is_some(),
                };
                if gone {
                    self.tracker.relation_removed(slice::from_ref(element));
                }
                outcome(mirrored, removed.is_some())
            }
            Dispatch::Memory => match removed {
                Some(removed) => {
                    let still_present = self.state.get_mut().delegate.contains(&removed);
                    self.tracker.relation_removed(slice::from_ref(&removed));
                    if allow_cascade_delete && !still_present {
                        self.tracker.cascade_delete(slice::from_ref(&removed));
                    }
                    true
                }
                None => false,
            },
        };
        self.tracker.changed();
        Ok(result)
    }

    /// Remove every occurrence of each listed element.
    pub fn remove_all(&mut self, elements: &[E]) -> ScoResult<bool> {
        if elements.is_empty() {
            return Ok(false);
        }
        self.remove_elements(elements)
    }

    /// Keep only elements in `keep`.
    pub fn retain_all(&mut self, keep: &[E]) -> ScoResult<bool> {
        let keep: HashSet<&E> = keep.iter().collect();
        let mut current = self.to_vec()?;
        if self.tracker.is_queued() && !self.authoritative() {
            current.extend(self.state.get_mut().delegate.iter().cloned());
        }
        let dropped: Vec<E> = current.into_iter().filter(|e| !keep.contains(e)).collect();
        if dropped.is_empty() {
            return Ok(false);
        }
        self.remove_elements(&dropped)
    }

    fn remove_elements(&mut self, doomed: &[E]) -> ScoResult<bool> {
        self.ensure_loaded()?;
        let size = self.size_hint();
        let authoritative = self.authoritative();
        let lookup: HashSet<&E> = doomed.iter().collect();

        // Every copy the store holds, when the delegate does not hold them all.
        let mut stored = Vec::new();
        if !authoritative {
            if let Some((store, owner)) = self.tracker.store_channel() {
                stored = store
                    .elements(owner)?
                    .into_iter()
                    .filter(|e| lookup.contains(e))
                    .collect();
            }
        }

        let mut removed = Vec::new();
        self.state.get_mut().delegate.retain(|e| {
            if lookup.contains(e) {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });

        let result = match self.tracker.dispatch() {
            Dispatch::Queued(_) => {
                // Stored copies plus unflushed ones; a surplus remove replays
                // as a no-op.
                let mut copies = stored;
                copies.extend(removed);
                self.tracker.removed(&copies, true);
                !copies.is_empty()
            }
            Dispatch::Immediate(_) => {
                let copies = if authoritative { removed } else { stored };
                self.tracker.relation_removed(&copies);
                let mirrored = self
                    .tracker
                    .mirror("remove-all", |store, owner| store.remove_all(owner, &copies, size));
                outcome(mirrored, !copies.is_empty())
            }
            Dispatch::Memory => {
                self.tracker.removed(&removed, true);
                !removed.is_empty()
            }
        };
        self.tracker.changed();
        Ok(result)
    }

    pub fn clear(&mut self) {
        let state = self.state.get_mut();
        let cleared = std::mem::take(&mut state.delegate);
        if self.use_cache {
            state.loaded = true;
        }
        self.tracker.cleared(&cleared);
        self.tracker.mirror("clear", |store, owner| store.clear(owner));
        self.tracker.changed();
    }
}

impl<E: ScoElement> Sco for BackedPriorityQueue<E> {
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

    /// The full content in queue order, read from the store if the
    /// delegate does not hold it.
    fn export_snapshot(&self) -> ScoResult<Vec<E>> {
        let mut elements = self.to_vec()?;
        elements.sort_by(|a, b| (self.comparator)(a, b));
        Ok(elements)
    }
}

impl<E: ScoElement> ScoContainer<E> for BackedPriorityQueue<E> {
    fn is_loaded(&self) -> bool {
        self.authoritative()
    }

    fn load(&self) -> ScoResult<()> {
        self.ensure_loaded()
    }

    fn elements(&self) -> ScoResult<Vec<E>> {
        self.to_vec()
    }

    fn contains_element(&self, element: &E) -> ScoResult<bool> {
        self.contains(element)
    }

    fn add_element(&mut self, element: E) -> ScoResult<bool> {
        self.add(element)
    }

    fn remove_element(&mut self, element: &E, allow_cascade_delete: bool) -> ScoResult<bool> {
        self.remove_with(element, allow_cascade_delete)
    }
}

impl<E: ScoElement> fmt::Debug for BackedPriorityQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("BackedPriorityQueue")
            .field("field", &self.tracker.field_name())
            .field("use_cache", &self.use_cache)
            .field("loaded", &state.loaded)
            .field("delegate", &state.delegate)
            .finish()
    }
}

impl<E: ScoElement + Serialize> Serialize for BackedPriorityQueue<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.export_snapshot()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

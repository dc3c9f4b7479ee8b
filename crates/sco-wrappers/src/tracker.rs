//! The mutation protocol shared by every container wrapper.
//!
//! After a wrapper has changed its delegate it reports the change here:
//! relationship bookkeeping, queueing or cascade deletion, dirty marking and
//! non-transactional processing all happen in one place. How store
//! operations are dispatched is decided once, when the tracker is built.

use std::collections::HashSet;
use std::rc::Rc;

use sco_context::{Operation, OperationKind, RelationshipManager};
use sco_store::{BackingStore, StoreResult};
use sco_types::{ObjectId, ScoElement};
use tracing::warn;

use crate::error::{ScoError, ScoResult};
use crate::owner::OwnerHandle;

/// How a wrapper's changes reach the datastore.
pub(crate) enum Dispatch<E: ScoElement> {
    /// No store channel; the delegate is the only source of truth.
    Memory,
    /// Changes are queued and replayed at flush, against the store if known.
    Queued(Option<Rc<dyn BackingStore<E>>>),
    /// Changes are mirrored to the store synchronously.
    Immediate(Rc<dyn BackingStore<E>>),
}

/// Outcome of a synchronous store call.
#[derive(Debug)]
pub(crate) enum Mirror<T> {
    /// No store call was made.
    Skipped,
    Applied(T),
    /// The store failed; the failure has been logged.
    Failed,
}

pub(crate) struct ChangeTracker<E: ScoElement> {
    owner: Option<OwnerHandle<E>>,
    dispatch: Dispatch<E>,
    allow_nulls: bool,
}

impl<E: ScoElement> ChangeTracker<E> {
    /// Tracker of a wrapper that holds all of its state in memory.
    pub(crate) fn unbacked(owner: OwnerHandle<E>) -> Self {
        let dispatch = if owner.context().delay_datastore_operations() {
            Dispatch::Queued(None)
        } else {
            Dispatch::Memory
        };
        Self::with_dispatch(owner, dispatch)
    }

    /// Tracker of a wrapper that mirrors changes into `store` when present.
    pub(crate) fn backed(owner: OwnerHandle<E>, store: Option<Rc<dyn BackingStore<E>>>) -> Self {
        let dispatch = match store {
            None => Dispatch::Memory,
            Some(store) if owner.context().delay_datastore_operations() => {
                Dispatch::Queued(Some(store))
            }
            Some(store) => Dispatch::Immediate(store),
        };
        Self::with_dispatch(owner, dispatch)
    }

    pub(crate) fn unowned() -> Self {
        Self {
            owner: None,
            dispatch: Dispatch::Memory,
            allow_nulls: false,
        }
    }

    fn with_dispatch(owner: OwnerHandle<E>, dispatch: Dispatch<E>) -> Self {
        Self {
            allow_nulls: owner.member().allows_nulls(),
            owner: Some(owner),
            dispatch,
        }
    }

    /// The store a backed wrapper should use for its owner's field.
    ///
    /// Only persistent fields whose elements are not serialized into the
    /// owner have one.
    pub(crate) fn resolve_store(owner: &OwnerHandle<E>) -> Option<Rc<dyn BackingStore<E>>> {
        let member = owner.member();
        if !member.is_persistent() || member.has_serialised_elements() {
            return None;
        }
        owner.context().backing_store(owner.id(), member)
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub(crate) fn owner(&self) -> Option<&OwnerHandle<E>> {
        self.owner.as_ref()
    }

    pub(crate) fn owner_id(&self) -> Option<ObjectId> {
        self.owner.as_ref().map(OwnerHandle::id)
    }

    pub(crate) fn field_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|owner| owner.member().name.as_str())
    }

    pub(crate) fn dispatch(&self) -> &Dispatch<E> {
        &self.dispatch
    }

    pub(crate) fn is_queued(&self) -> bool {
        matches!(self.dispatch, Dispatch::Queued(_))
    }

    /// The store channel with the owner it is scoped to.
    pub(crate) fn store_channel(&self) -> Option<(&Rc<dyn BackingStore<E>>, ObjectId)> {
        let store = match &self.dispatch {
            Dispatch::Queued(Some(store)) | Dispatch::Immediate(store) => store,
            Dispatch::Memory | Dispatch::Queued(None) => return None,
        };
        Some((store, self.owner_id()?))
    }

    /// Drop the owner. Later changes touch only the delegate.
    pub(crate) fn unset_owner(&mut self) {
        self.owner = None;
        self.dispatch = Dispatch::Memory;
    }

    pub(crate) fn describe(&self) -> String {
        self.owner.as_ref().map_or_else(
            || "unowned".to_string(),
            |owner| format!("{}.{}", owner.printable(), owner.member().name),
        )
    }

    // ---------------------------------------------------------------
    // Input checks
    // ---------------------------------------------------------------

    pub(crate) fn check_element(&self, element: &E) -> ScoResult<()> {
        if element.is_null() && !self.allow_nulls {
            return Err(ScoError::NullElement {
                field: self.field_name().unwrap_or("unowned").to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_elements<'a>(&self, elements: impl IntoIterator<Item = &'a E>) -> ScoResult<()>
    where
        E: 'a,
    {
        elements
            .into_iter()
            .try_for_each(|element| self.check_element(element))
    }

    // ---------------------------------------------------------------
    // Change protocol
    // ---------------------------------------------------------------

    pub(crate) fn relation_added(&self, elements: &[E]) {
        self.with_relations(|manager, owner| {
            for element in elements {
                manager.relation_add(owner.field(), element);
            }
        });
    }

    pub(crate) fn relation_removed(&self, elements: &[E]) {
        self.with_relations(|manager, owner| {
            for element in elements {
                manager.relation_remove(owner.field(), element);
            }
        });
    }

    fn with_relations(
        &self,
        apply: impl FnOnce(&dyn RelationshipManager<E>, &OwnerHandle<E>),
    ) {
        let Some(owner) = &self.owner else { return };
        if let Some(manager) = owner.context().relationship_manager(owner.id()) {
            apply(&*manager, owner);
        }
    }

    /// Queue an operation. Does nothing unless changes are queued.
    pub(crate) fn enqueue(&self, kind: OperationKind<E>) {
        let (Dispatch::Queued(store), Some(owner)) = (&self.dispatch, &self.owner) else {
            return;
        };
        owner.context().enqueue(
            Operation::new(owner.id(), owner.field(), kind).with_store(store.clone()),
        );
    }

    /// Delete dependent elements right away. Only applies when there is no
    /// store channel; queued and mirrored removals cascade in the store.
    pub(crate) fn cascade_delete(&self, elements: &[E]) {
        let (Dispatch::Memory, Some(owner)) = (&self.dispatch, &self.owner) else {
            return;
        };
        if !owner.member().has_dependent_element() {
            return;
        }
        let mut seen = HashSet::new();
        for element in elements.iter().filter(|e| seen.insert(*e)) {
            owner.context().delete_object_internal(element);
        }
    }

    /// Report elements added to the delegate.
    pub(crate) fn added(&self, elements: &[E]) {
        self.relation_added(elements);
        for element in elements {
            self.enqueue(OperationKind::CollectionAdd {
                element: element.clone(),
            });
        }
    }

    /// Report elements that are no longer in the delegate.
    pub(crate) fn removed(&self, elements: &[E], allow_cascade_delete: bool) {
        self.relation_removed(elements);
        if self.is_queued() {
            for element in elements {
                self.enqueue(OperationKind::CollectionRemove {
                    element: element.clone(),
                    allow_cascade_delete,
                });
            }
        } else if allow_cascade_delete {
            self.cascade_delete(elements);
        }
    }

    /// Report a clear of the delegate, which held `elements`.
    pub(crate) fn cleared(&self, elements: &[E]) {
        self.relation_removed(elements);
        if self.is_queued() {
            self.enqueue(OperationKind::CollectionClear);
        } else {
            self.cascade_delete(elements);
        }
    }

    pub(crate) fn make_dirty(&self) {
        if let Some(owner) = &self.owner {
            owner.make_dirty();
        }
    }

    /// Finish a mutation: mark dirty and process it outside a transaction.
    pub(crate) fn changed(&self) {
        if let Some(owner) = &self.owner {
            owner.changed();
        }
    }

    // ---------------------------------------------------------------
    // Store calls
    // ---------------------------------------------------------------

    /// Call the store synchronously, whatever the dispatch mode.
    ///
    /// A store failure is logged and reported as [`Mirror::Failed`].
    pub(crate) fn call_store<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&dyn BackingStore<E>, ObjectId) -> StoreResult<T>,
    ) -> Mirror<T> {
        let Some((store, owner)) = self.store_channel() else {
            return Mirror::Skipped;
        };
        match apply(&**store, owner) {
            Ok(value) => Mirror::Applied(value),
            Err(error) => {
                warn!(
                    operation,
                    field = %self.describe(),
                    error = %error,
                    "backing store update failed; keeping in-memory change"
                );
                Mirror::Failed
            }
        }
    }

    /// Mirror a change to the store when changes are applied immediately.
    pub(crate) fn mirror<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&dyn BackingStore<E>, ObjectId) -> StoreResult<T>,
    ) -> Mirror<T> {
        match self.dispatch {
            Dispatch::Immediate(_) => self.call_store(operation, apply),
            Dispatch::Memory | Dispatch::Queued(_) => Mirror::Skipped,
        }
    }
}

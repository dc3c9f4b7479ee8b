use std::fmt;
use std::rc::Rc;

use sco_store::{BackingStore, StoreError, StoreResult};
use sco_types::{FieldOrdinal, ObjectId, ScoElement};
use tracing::debug;

use crate::error::ContextError;

/// A logical container mutation, recorded for replay at flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationKind<E> {
    CollectionAdd {
        element: E,
    },
    CollectionRemove {
        element: E,
        allow_cascade_delete: bool,
    },
    CollectionClear,
    ListAddAt {
        index: usize,
        element: E,
    },
    ListRemoveAt {
        index: usize,
    },
    ListSet {
        index: usize,
        element: E,
        allow_cascade_delete: bool,
    },
}

impl<E> OperationKind<E> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CollectionAdd { .. } => "collection-add",
            Self::CollectionRemove { .. } => "collection-remove",
            Self::CollectionClear => "collection-clear",
            Self::ListAddAt { .. } => "list-add-at",
            Self::ListRemoveAt { .. } => "list-remove-at",
            Self::ListSet { .. } => "list-set",
        }
    }
}

/// A queued operation against one owner's container field.
pub struct Operation<E: ScoElement> {
    pub owner: ObjectId,
    pub field: FieldOrdinal,
    /// Store the operation replays against; `None` defers to the store
    /// supplied at flush.
    pub store: Option<Rc<dyn BackingStore<E>>>,
    pub kind: OperationKind<E>,
}

impl<E: ScoElement> Operation<E> {
    pub fn new(owner: ObjectId, field: FieldOrdinal, kind: OperationKind<E>) -> Self {
        Self {
            owner,
            field,
            store: None,
            kind,
        }
    }

    pub fn with_store(mut self, store: Option<Rc<dyn BackingStore<E>>>) -> Self {
        self.store = store;
        self
    }

    /// Apply the operation to `store`.
    pub fn perform(&self, store: &dyn BackingStore<E>) -> StoreResult<()> {
        let owner = self.owner;
        match &self.kind {
            OperationKind::CollectionAdd { element } => {
                store.add(owner, element, None)?;
            }
            OperationKind::CollectionRemove {
                element,
                allow_cascade_delete,
            } => {
                store.remove(owner, element, None, *allow_cascade_delete)?;
            }
            OperationKind::CollectionClear => store.clear(owner)?,
            OperationKind::ListAddAt { index, element } => store.insert(owner, *index, element)?,
            OperationKind::ListRemoveAt { index } => {
                if store.remove_at(owner, *index, None)?.is_none() {
                    return Err(StoreError::PositionOutOfRange {
                        position: *index,
                        size: store.size(owner)?,
                    });
                }
            }
            OperationKind::ListSet {
                index,
                element,
                allow_cascade_delete,
            } => {
                store.set(owner, *index, element, *allow_cascade_delete)?;
            }
        }
        Ok(())
    }
}

impl<E: ScoElement> fmt::Debug for Operation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .field("has_store", &self.store.is_some())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Operations waiting for flush, in enqueue order.
pub struct OperationQueue<E: ScoElement> {
    operations: Vec<Operation<E>>,
}

impl<E: ScoElement> OperationQueue<E> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, operation: Operation<E>) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation<E>> {
        self.operations.iter()
    }

    /// Discard every pending operation.
    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Replay pending operations in enqueue order and return how many ran.
    ///
    /// Each operation uses its own store, or `default_store` when it has
    /// none. Replay stops at the first failure; the failed operation and
    /// everything after it stay queued.
    pub fn perform_all(
        &mut self,
        default_store: Option<&Rc<dyn BackingStore<E>>>,
    ) -> Result<usize, ContextError> {
        let mut performed = 0;
        let outcome = self.operations.iter().try_for_each(|operation| -> Result<(), ContextError> {
            let store = operation
                .store
                .as_ref()
                .or(default_store)
                .ok_or(ContextError::NoBackingStore {
                    operation: operation.kind.name(),
                    owner: operation.owner,
                    field: operation.field,
                })?;
            operation
                .perform(&**store)
                .map_err(|source| ContextError::Replay {
                    operation: operation.kind.name(),
                    field: operation.field,
                    source,
                })?;
            performed += 1;
            Ok(())
        });
        self.operations.drain(..performed);
        debug!(
            performed,
            remaining = self.operations.len(),
            "replayed queued operations"
        );
        outcome.map(|()| performed)
    }
}

impl<E: ScoElement> Default for OperationQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScoElement> fmt::Debug for OperationQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.operations.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sco_store::InMemoryBackingStore;

    const FIELD: FieldOrdinal = FieldOrdinal::new(2);

    fn store() -> (Rc<InMemoryBackingStore<String>>, Rc<dyn BackingStore<String>>) {
        let concrete = Rc::new(InMemoryBackingStore::new());
        let shared: Rc<dyn BackingStore<String>> = concrete.clone();
        (concrete, shared)
    }

    fn queue_of(owner: ObjectId, kinds: Vec<OperationKind<String>>) -> OperationQueue<String> {
        let mut queue = OperationQueue::new();
        for kind in kinds {
            queue.enqueue(Operation::new(owner, FIELD, kind));
        }
        queue
    }

    fn add_at(index: usize, element: &str) -> OperationKind<String> {
        OperationKind::ListAddAt {
            index,
            element: element.to_string(),
        }
    }

    // ----------------------------------------------------------------
    // Replay order
    // ----------------------------------------------------------------

    #[test]
    fn list_operations_replay_in_enqueue_order() {
        let owner = ObjectId::new();
        let (concrete, shared) = store();
        let mut queue = queue_of(
            owner,
            vec![add_at(0, "A"), add_at(1, "B"), OperationKind::ListRemoveAt { index: 0 }],
        );

        assert_eq!(queue.perform_all(Some(&shared)).unwrap(), 3);
        assert_eq!(concrete.contents(owner), vec!["B"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn reordered_list_operations_do_not_converge() {
        let owner = ObjectId::new();
        let (concrete, shared) = store();
        let mut queue = queue_of(
            owner,
            vec![OperationKind::ListRemoveAt { index: 0 }, add_at(0, "A"), add_at(1, "B")],
        );

        let err = queue.perform_all(Some(&shared)).unwrap_err();
        assert!(matches!(
            err,
            ContextError::Replay {
                operation: "list-remove-at",
                ..
            }
        ));
        assert_ne!(concrete.contents(owner), vec!["B"]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn clear_after_add_replays_as_add_then_clear() {
        let owner = ObjectId::new();
        let (concrete, shared) = store();
        concrete.seed(owner, ["old".to_string()]);
        let mut queue = queue_of(
            owner,
            vec![
                OperationKind::CollectionAdd {
                    element: "X".to_string(),
                },
                OperationKind::CollectionClear,
            ],
        );

        let names: Vec<_> = queue.iter().map(|op| op.kind.name()).collect();
        assert_eq!(names, vec!["collection-add", "collection-clear"]);
        queue.perform_all(Some(&shared)).unwrap();
        assert!(concrete.contents(owner).is_empty());
        assert_eq!(concrete.mutations(), 2);
    }

    // ----------------------------------------------------------------
    // Store selection and failures
    // ----------------------------------------------------------------

    #[test]
    fn operation_store_takes_precedence_over_default() {
        let owner = ObjectId::new();
        let (own, own_shared) = store();
        let (default, default_shared) = store();
        let mut queue = OperationQueue::new();
        queue.enqueue(
            Operation::new(
                owner,
                FIELD,
                OperationKind::CollectionAdd {
                    element: "x".to_string(),
                },
            )
            .with_store(Some(own_shared)),
        );

        queue.perform_all(Some(&default_shared)).unwrap();
        assert_eq!(own.contents(owner), vec!["x"]);
        assert!(default.contents(owner).is_empty());
    }

    #[test]
    fn missing_store_is_reported() {
        let owner = ObjectId::new();
        let mut queue = queue_of(owner, vec![OperationKind::CollectionClear]);
        let err = queue.perform_all(None).unwrap_err();
        assert_eq!(
            err,
            ContextError::NoBackingStore {
                operation: "collection-clear",
                owner,
                field: FIELD,
            }
        );
    }

    #[test]
    fn replay_stops_at_first_store_failure() {
        let owner = ObjectId::new();
        let (concrete, shared) = store();
        let mut queue = queue_of(owner, vec![add_at(0, "A"), add_at(5, "B"), add_at(1, "C")]);

        assert!(queue.perform_all(Some(&shared)).is_err());
        assert_eq!(concrete.contents(owner), vec!["A"]);
        assert_eq!(queue.len(), 2);
    }
}

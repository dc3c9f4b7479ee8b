use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use sco_store::BackingStore;
use sco_types::{FieldOrdinal, MemberMetadata, ObjectId, ScoConfig, ScoElement};
use tracing::debug;

use crate::detach::DetachState;
use crate::error::ContextError;
use crate::operation::{Operation, OperationKind, OperationQueue};
use crate::traits::{ElementContext, ExecutionContext, RelationshipManager, StateManager};

/// A state manager that records dirty marks instead of tracking a real
/// lifecycle.
pub struct InMemoryStateManager {
    id: ObjectId,
    type_name: String,
    context: Rc<dyn ExecutionContext>,
    dirty: RefCell<Vec<FieldOrdinal>>,
    flushed: Cell<bool>,
    new: Cell<bool>,
}

impl InMemoryStateManager {
    pub fn new(type_name: impl Into<String>, context: Rc<dyn ExecutionContext>) -> Self {
        Self {
            id: ObjectId::new(),
            type_name: type_name.into(),
            context,
            dirty: RefCell::new(Vec::new()),
            flushed: Cell::new(false),
            new: Cell::new(false),
        }
    }

    pub fn set_flushed_to_datastore(&self, flushed: bool) {
        self.flushed.set(flushed);
    }

    pub fn set_lifecycle_new(&self, new: bool) {
        self.new.set(new);
    }

    /// How many times `field` was marked dirty.
    pub fn dirty_count(&self, field: FieldOrdinal) -> usize {
        self.dirty.borrow().iter().filter(|f| **f == field).count()
    }

    pub fn is_dirty(&self, field: FieldOrdinal) -> bool {
        self.dirty_count(field) > 0
    }

    /// Total dirty marks across all fields.
    pub fn dirty_marks(&self) -> usize {
        self.dirty.borrow().len()
    }

    /// Forget recorded dirty marks, as a flush would.
    pub fn clear_dirty(&self) {
        self.dirty.borrow_mut().clear();
    }
}

impl StateManager for InMemoryStateManager {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn object_as_printable(&self) -> String {
        format!("{}@{}", self.type_name, self.id.short_id())
    }

    fn make_dirty(&self, field: FieldOrdinal) {
        self.dirty.borrow_mut().push(field);
    }

    fn is_flushed_to_datastore(&self) -> bool {
        self.flushed.get()
    }

    fn lifecycle_is_new(&self) -> bool {
        self.new.get()
    }

    fn execution_context(&self) -> Rc<dyn ExecutionContext> {
        Rc::clone(&self.context)
    }
}

impl fmt::Debug for InMemoryStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStateManager")
            .field("object", &self.object_as_printable())
            .field("dirty_marks", &self.dirty_marks())
            .finish()
    }
}

/// A relationship change observed by a [`RecordingRelationshipManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationEvent<E> {
    Added { field: FieldOrdinal, element: E },
    Removed { field: FieldOrdinal, element: E },
}

/// A relationship manager that records changes rather than applying them.
pub struct RecordingRelationshipManager<E: ScoElement> {
    events: RefCell<Vec<RelationEvent<E>>>,
}

impl<E: ScoElement> RecordingRelationshipManager<E> {
    pub fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<RelationEvent<E>> {
        self.events.borrow().clone()
    }
}

impl<E: ScoElement> Default for RecordingRelationshipManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScoElement> RelationshipManager<E> for RecordingRelationshipManager<E> {
    fn relation_add(&self, field: FieldOrdinal, element: &E) {
        self.events.borrow_mut().push(RelationEvent::Added {
            field,
            element: element.clone(),
        });
    }

    fn relation_remove(&self, field: FieldOrdinal, element: &E) {
        self.events.borrow_mut().push(RelationEvent::Removed {
            field,
            element: element.clone(),
        });
    }
}

/// An execution context holding its queue, deletions and stores in memory.
///
/// Backing stores are registered per owner and field with
/// [`register_store`](Self::register_store). Elements are detached and
/// attached by cloning; detaching an identity-bearing element records its
/// identity in the [`DetachState`].
pub struct InMemoryExecutionContext<E: ScoElement> {
    config: ScoConfig,
    transaction_active: Cell<bool>,
    nontransactional_updates: Cell<usize>,
    queue: RefCell<OperationQueue<E>>,
    deleted: RefCell<Vec<E>>,
    relationships: RefCell<HashMap<ObjectId, Rc<RecordingRelationshipManager<E>>>>,
    stores: RefCell<HashMap<(ObjectId, FieldOrdinal), Rc<dyn BackingStore<E>>>>,
}

impl<E: ScoElement> InMemoryExecutionContext<E> {
    pub fn new(config: ScoConfig) -> Self {
        Self {
            config,
            transaction_active: Cell::new(false),
            nontransactional_updates: Cell::new(0),
            queue: RefCell::new(OperationQueue::new()),
            deleted: RefCell::new(Vec::new()),
            relationships: RefCell::new(HashMap::new()),
            stores: RefCell::new(HashMap::new()),
        }
    }

    pub fn set_transaction_active(&self, active: bool) {
        self.transaction_active.set(active);
    }

    pub fn register_store(
        &self,
        owner: ObjectId,
        field: FieldOrdinal,
        store: Rc<dyn BackingStore<E>>,
    ) {
        self.stores.borrow_mut().insert((owner, field), store);
    }

    /// Kinds of the operations waiting for flush, in enqueue order.
    pub fn queued(&self) -> Vec<OperationKind<E>> {
        self.queue
            .borrow()
            .iter()
            .map(|operation| operation.kind.clone())
            .collect()
    }

    /// Replay queued operations in order.
    ///
    /// Operations without a store of their own replay against
    /// `default_store`.
    pub fn flush(
        &self,
        default_store: Option<&Rc<dyn BackingStore<E>>>,
    ) -> Result<usize, ContextError> {
        let mut queue = self.queue.borrow_mut();
        debug!(pending = queue.len(), "flushing queued operations");
        queue.perform_all(default_store)
    }

    /// Elements deleted through [`ElementContext::delete_object_internal`].
    pub fn deleted(&self) -> Vec<E> {
        self.deleted.borrow().clone()
    }

    /// Number of non-transactional updates processed.
    pub fn nontransactional_updates(&self) -> usize {
        self.nontransactional_updates.get()
    }

    /// Relationship changes recorded for `owner`.
    pub fn relation_events(&self, owner: ObjectId) -> Vec<RelationEvent<E>> {
        self.relationships
            .borrow()
            .get(&owner)
            .map(|manager| manager.events())
            .unwrap_or_default()
    }
}

impl<E: ScoElement> Default for InMemoryExecutionContext<E> {
    fn default() -> Self {
        Self::new(ScoConfig::default())
    }
}

impl<E: ScoElement> ExecutionContext for InMemoryExecutionContext<E> {
    fn config(&self) -> &ScoConfig {
        &self.config
    }

    fn transaction_active(&self) -> bool {
        self.transaction_active.get()
    }

    fn process_nontransactional_update(&self) {
        self.nontransactional_updates
            .set(self.nontransactional_updates.get() + 1);
    }
}

impl<E: ScoElement> ElementContext<E> for InMemoryExecutionContext<E> {
    fn relationship_manager(&self, owner: ObjectId) -> Option<Rc<dyn RelationshipManager<E>>> {
        if !self.config.manage_relationships {
            return None;
        }
        let manager = Rc::clone(self.relationships.borrow_mut().entry(owner).or_default());
        Some(manager)
    }

    fn enqueue(&self, operation: Operation<E>) {
        debug!(
            owner = %operation.owner,
            field = %operation.field,
            operation = operation.kind.name(),
            "queued operation"
        );
        self.queue.borrow_mut().enqueue(operation);
    }

    fn delete_object_internal(&self, element: &E) {
        self.deleted.borrow_mut().push(element.clone());
    }

    fn detach_element(&self, element: &E, state: &mut DetachState) -> E {
        if let Some(id) = element.object_id() {
            state.mark_detached(id);
        }
        element.clone()
    }

    fn attach_element(&self, element: &E, _without_identity: bool) -> E {
        element.clone()
    }

    fn backing_store(
        &self,
        owner: ObjectId,
        member: &MemberMetadata,
    ) -> Option<Rc<dyn BackingStore<E>>> {
        self.stores.borrow().get(&(owner, member.field())).cloned()
    }
}

impl<E: ScoElement> fmt::Debug for InMemoryExecutionContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryExecutionContext")
            .field("config", &self.config)
            .field("transaction_active", &self.transaction_active.get())
            .field("queued", &self.queue.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sco_store::InMemoryBackingStore;

    const FIELD: FieldOrdinal = FieldOrdinal::new(1);

    fn context(config: ScoConfig) -> Rc<InMemoryExecutionContext<ObjectId>> {
        Rc::new(InMemoryExecutionContext::new(config))
    }

    // ----------------------------------------------------------------
    // State manager
    // ----------------------------------------------------------------

    #[test]
    fn state_manager_counts_dirty_marks_per_field() {
        let ctx = context(ScoConfig::default());
        let sm = InMemoryStateManager::new("Library", ctx);
        sm.make_dirty(FIELD);
        sm.make_dirty(FIELD);
        sm.make_dirty(FieldOrdinal::new(4));

        assert_eq!(sm.dirty_count(FIELD), 2);
        assert_eq!(sm.dirty_marks(), 3);
        sm.clear_dirty();
        assert!(!sm.is_dirty(FIELD));
        assert!(sm.object_as_printable().starts_with("Library@"));
    }

    #[test]
    fn state_manager_exposes_its_context() {
        let ctx = context(ScoConfig::queued());
        let sm = InMemoryStateManager::new("Library", ctx.clone());
        assert!(sm.execution_context().delay_datastore_operations());

        ctx.set_transaction_active(true);
        assert!(sm.execution_context().transaction_active());
    }

    // ----------------------------------------------------------------
    // Execution context
    // ----------------------------------------------------------------

    #[test]
    fn relationship_manager_follows_config() {
        let owner = ObjectId::new();
        let element = ObjectId::new();
        let managed = context(ScoConfig::default());
        let manager = managed.relationship_manager(owner).unwrap();
        manager.relation_add(FIELD, &element);
        managed
            .relationship_manager(owner)
            .unwrap()
            .relation_remove(FIELD, &element);

        assert_eq!(
            managed.relation_events(owner),
            vec![
                RelationEvent::Added { field: FIELD, element },
                RelationEvent::Removed { field: FIELD, element },
            ]
        );

        let unmanaged = context(ScoConfig {
            manage_relationships: false,
            ..Default::default()
        });
        assert!(unmanaged.relationship_manager(owner).is_none());
    }

    #[test]
    fn stores_are_looked_up_by_owner_and_field() {
        let ctx = context(ScoConfig::default());
        let owner = ObjectId::new();
        let member = MemberMetadata::new("books", FIELD.get());
        ctx.register_store(owner, FIELD, Rc::new(InMemoryBackingStore::<ObjectId>::new()));

        assert!(ctx.backing_store(owner, &member).is_some());
        assert!(ctx.backing_store(ObjectId::new(), &member).is_none());
        assert!(ctx
            .backing_store(owner, &MemberMetadata::new("other", 9))
            .is_none());
    }

    #[test]
    fn flush_drains_queue_into_default_store() {
        let ctx = context(ScoConfig::queued());
        let owner = ObjectId::new();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        ctx.enqueue(Operation::new(owner, FIELD, OperationKind::CollectionAdd { element: a }));
        ctx.enqueue(Operation::new(owner, FIELD, OperationKind::CollectionAdd { element: b }));
        ctx.enqueue(Operation::new(
            owner,
            FIELD,
            OperationKind::CollectionRemove {
                element: a,
                allow_cascade_delete: true,
            },
        ));
        assert_eq!(ctx.queued().len(), 3);

        let store = Rc::new(InMemoryBackingStore::new().with_dependent_elements());
        let shared: Rc<dyn BackingStore<ObjectId>> = store.clone();
        assert_eq!(ctx.flush(Some(&shared)).unwrap(), 3);
        assert_eq!(store.contents(owner), vec![b]);
        assert_eq!(store.deleted(), vec![a]);
        assert!(ctx.queued().is_empty());
    }

    #[test]
    fn detach_records_identities() {
        let ctx = context(ScoConfig::default());
        let element = ObjectId::new();
        let mut state = DetachState::new();
        assert_eq!(ctx.detach_element(&element, &mut state), element);
        assert!(state.is_detached(&element));
    }
}

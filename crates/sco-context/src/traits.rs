use std::rc::Rc;

use sco_store::BackingStore;
use sco_types::{FieldOrdinal, MemberMetadata, ObjectId, ScoConfig, ScoElement};

use crate::detach::DetachState;
use crate::operation::Operation;

/// State manager of the entity owning a tracked field.
///
/// Wrappers hold a weak reference to it; once the entity is gone the
/// wrapper behaves as ownerless.
pub trait StateManager {
    fn object_id(&self) -> ObjectId;

    /// Human-readable form of the owning entity, for logs.
    fn object_as_printable(&self) -> String;

    /// Mark a field of the owning entity as modified.
    fn make_dirty(&self, field: FieldOrdinal);

    /// Whether the owning entity has already been written to the datastore
    /// in the current unit of work.
    fn is_flushed_to_datastore(&self) -> bool;

    /// Whether the owning entity was made persistent in the current unit of work.
    fn lifecycle_is_new(&self) -> bool;

    fn execution_context(&self) -> Rc<dyn ExecutionContext>;
}

/// The unit of work an owning entity belongs to.
pub trait ExecutionContext {
    fn config(&self) -> &ScoConfig;

    fn transaction_active(&self) -> bool;

    /// Persist a change made outside a transaction right away.
    fn process_nontransactional_update(&self);

    /// Whether store operations are queued until flush.
    fn delay_datastore_operations(&self) -> bool {
        self.config().delay_datastore_operations
    }
}

/// Element-typed services of an execution context.
pub trait ElementContext<E: ScoElement>: ExecutionContext {
    /// The relationship manager for `owner`, or `None` when relationships
    /// are not managed.
    fn relationship_manager(&self, owner: ObjectId) -> Option<Rc<dyn RelationshipManager<E>>>;

    /// Append an operation to the queue replayed at flush.
    fn enqueue(&self, operation: Operation<E>);

    /// Delete a dependent element's persisted record.
    fn delete_object_internal(&self, element: &E);

    /// Disconnected copy of an element for use outside the unit of work.
    fn detach_element(&self, element: &E, state: &mut DetachState) -> E;

    /// Managed form of a detached element.
    fn attach_element(&self, element: &E, without_identity: bool) -> E;

    /// Backing store for the container field `member` of `owner`, if the
    /// datastore provides one.
    fn backing_store(
        &self,
        owner: ObjectId,
        member: &MemberMetadata,
    ) -> Option<Rc<dyn BackingStore<E>>>;
}

/// Inverse-side bookkeeping for bidirectional relations of one owner.
pub trait RelationshipManager<E: ScoElement> {
    fn relation_add(&self, field: FieldOrdinal, element: &E);

    fn relation_remove(&self, field: FieldOrdinal, element: &E);
}

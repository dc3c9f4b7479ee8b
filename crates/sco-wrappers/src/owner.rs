//! Lookup-only links from a wrapper to the entity that owns it.
//!
//! A wrapper never keeps its owner alive: the state manager is held through
//! a `Weak` reference, and a wrapper whose owner has been dropped behaves
//! exactly like one whose owner was unset.

use std::fmt;
use std::rc::{Rc, Weak};

use sco_context::{ElementContext, ExecutionContext, StateManager};
use sco_types::{FieldOrdinal, MemberMetadata, ObjectId, ScoElement};

/// Owner of a container wrapper: the state manager, the element-typed
/// execution context, and the descriptor of the owning field.
pub struct OwnerHandle<E: ScoElement> {
    id: ObjectId,
    state_manager: Weak<dyn StateManager>,
    context: Rc<dyn ElementContext<E>>,
    member: Rc<MemberMetadata>,
}

impl<E: ScoElement> OwnerHandle<E> {
    pub fn new<S: StateManager + 'static>(
        state_manager: &Rc<S>,
        context: Rc<dyn ElementContext<E>>,
        member: Rc<MemberMetadata>,
    ) -> Self {
        let weak: Weak<S> = Rc::downgrade(state_manager);
        Self {
            id: state_manager.object_id(),
            state_manager: weak,
            context,
            member,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn member(&self) -> &MemberMetadata {
        &self.member
    }

    pub fn field(&self) -> FieldOrdinal {
        self.member.field()
    }

    pub fn context(&self) -> &Rc<dyn ElementContext<E>> {
        &self.context
    }

    /// The owning state manager, if the entity is still alive.
    pub fn state_manager(&self) -> Option<Rc<dyn StateManager>> {
        self.state_manager.upgrade()
    }

    pub(crate) fn printable(&self) -> String {
        printable(&self.state_manager, self.id)
    }

    pub(crate) fn make_dirty(&self) {
        if let Some(sm) = self.state_manager() {
            sm.make_dirty(self.field());
        }
    }

    /// Mark the field dirty and, outside a transaction, persist right away.
    pub(crate) fn changed(&self) {
        if self.state_manager().is_none() {
            return;
        }
        self.make_dirty();
        notify(&*self.context);
    }
}

impl<E: ScoElement> Clone for OwnerHandle<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state_manager: Weak::clone(&self.state_manager),
            context: Rc::clone(&self.context),
            member: Rc::clone(&self.member),
        }
    }
}

impl<E: ScoElement> fmt::Debug for OwnerHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerHandle")
            .field("owner", &self.id)
            .field("field", &self.member.name)
            .field("alive", &(self.state_manager.strong_count() > 0))
            .finish()
    }
}

/// Owner of a single owned value such as a timestamp.
#[derive(Clone)]
pub struct ValueOwner {
    id: ObjectId,
    state_manager: Weak<dyn StateManager>,
    member: Rc<MemberMetadata>,
}

impl ValueOwner {
    pub fn new<S: StateManager + 'static>(state_manager: &Rc<S>, member: Rc<MemberMetadata>) -> Self {
        let weak: Weak<S> = Rc::downgrade(state_manager);
        Self {
            id: state_manager.object_id(),
            state_manager: weak,
            member,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn member(&self) -> &MemberMetadata {
        &self.member
    }

    pub(crate) fn printable(&self) -> String {
        printable(&self.state_manager, self.id)
    }

    /// Mark the field dirty and, outside a transaction, persist right away.
    pub(crate) fn changed(&self) {
        if let Some(sm) = self.state_manager.upgrade() {
            sm.make_dirty(self.member.field());
            notify(&*sm.execution_context());
        }
    }
}

impl fmt::Debug for ValueOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueOwner")
            .field("owner", &self.id)
            .field("field", &self.member.name)
            .finish()
    }
}

fn printable(state_manager: &Weak<dyn StateManager>, id: ObjectId) -> String {
    state_manager
        .upgrade()
        .map_or_else(|| id.to_string(), |sm| sm.object_as_printable())
}

fn notify<C: ExecutionContext + ?Sized>(context: &C) {
    if !context.transaction_active() {
        context.process_nontransactional_update();
    }
}

//! Shared fixtures for wrapper tests.

use std::rc::Rc;

use sco_context::{InMemoryExecutionContext, InMemoryStateManager, StateManager};
use sco_store::BackingStore;
use sco_types::{ContainerMetadata, ElementMetadata, MemberMetadata, ObjectId, ScoConfig, ScoElement};

use crate::owner::{OwnerHandle, ValueOwner};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A field holding plain values.
pub(crate) fn values_member() -> MemberMetadata {
    MemberMetadata::new("scores", 2)
        .with_container(ContainerMetadata::of(ElementMetadata::new("i32")))
}

/// A field holding dependent persistable elements.
pub(crate) fn dependent_member() -> MemberMetadata {
    MemberMetadata::new("books", 3)
        .with_container(ContainerMetadata::of(ElementMetadata::persistable("Book").dependent()))
}

/// A managed entity owning one container field.
pub(crate) struct Fixture<E: ScoElement> {
    pub ctx: Rc<InMemoryExecutionContext<E>>,
    pub sm: Rc<InMemoryStateManager>,
    pub member: Rc<MemberMetadata>,
}

impl<E: ScoElement> Fixture<E> {
    pub fn new(config: ScoConfig, member: MemberMetadata) -> Self {
        init_tracing();
        let ctx: Rc<InMemoryExecutionContext<E>> = Rc::new(InMemoryExecutionContext::new(config));
        let sm = Rc::new(InMemoryStateManager::new("Library", ctx.clone()));
        Self {
            ctx,
            sm,
            member: Rc::new(member),
        }
    }

    pub fn owner(&self) -> OwnerHandle<E> {
        OwnerHandle::new(&self.sm, self.ctx.clone(), self.member.clone())
    }

    pub fn owner_id(&self) -> ObjectId {
        self.sm.object_id()
    }

    /// Dirty marks recorded for the owning field.
    pub fn dirty(&self) -> usize {
        self.sm.dirty_count(self.member.field())
    }

    pub fn register_store(&self, store: Rc<dyn BackingStore<E>>) {
        self.ctx
            .register_store(self.owner_id(), self.member.field(), store);
    }
}

/// A managed entity owning one timestamp field.
pub(crate) struct ValueFixture {
    pub ctx: Rc<InMemoryExecutionContext<i32>>,
    pub sm: Rc<InMemoryStateManager>,
    pub member: Rc<MemberMetadata>,
}

impl ValueFixture {
    pub fn new() -> Self {
        init_tracing();
        let ctx: Rc<InMemoryExecutionContext<i32>> = Rc::new(InMemoryExecutionContext::default());
        let sm = Rc::new(InMemoryStateManager::new("Event", ctx.clone()));
        Self {
            ctx,
            sm,
            member: Rc::new(MemberMetadata::new("created", 1)),
        }
    }

    pub fn owner(&self) -> ValueOwner {
        ValueOwner::new(&self.sm, self.member.clone())
    }

    pub fn dirty(&self) -> usize {
        self.sm.dirty_count(self.member.field())
    }
}

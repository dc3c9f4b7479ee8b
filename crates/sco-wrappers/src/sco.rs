use sco_types::{ObjectId, ScoElement};

use crate::error::ScoResult;

/// Behaviour shared by every second-class object wrapper.
pub trait Sco {
    /// Disconnected form of the wrapped value.
    type Snapshot;

    /// Identity of the owning entity, or `None` when unowned.
    fn owner_id(&self) -> Option<ObjectId>;

    /// Name of the owning field, or `None` when unowned.
    fn field_name(&self) -> Option<&str>;

    /// Detach the wrapper from its owner. Later mutations change only the
    /// wrapped value.
    fn unset_owner(&mut self);

    /// Mark the owning field dirty.
    fn make_dirty(&self);

    /// A disconnected copy of the full value, loading it first if needed.
    ///
    /// This is what serialization emits; owner information never leaves
    /// the wrapper.
    fn export_snapshot(&self) -> ScoResult<Self::Snapshot>;
}

/// Element-level access to a container wrapper.
pub trait ScoContainer<E: ScoElement>: Sco {
    /// Whether the full content is held in memory.
    fn is_loaded(&self) -> bool;

    /// Load the full content, if the wrapper caches it.
    fn load(&self) -> ScoResult<()>;

    /// Current elements, in container order.
    fn elements(&self) -> ScoResult<Vec<E>>;

    fn contains_element(&self, element: &E) -> ScoResult<bool>;

    fn add_element(&mut self, element: E) -> ScoResult<bool>;

    fn remove_element(&mut self, element: &E, allow_cascade_delete: bool) -> ScoResult<bool>;
}

use std::collections::HashSet;

use sco_types::ObjectId;

/// Bookkeeping for one detach pass over an object graph.
///
/// Elements reachable through several containers are detached once; the
/// state remembers which identities have already been copied.
#[derive(Clone, Debug, Default)]
pub struct DetachState {
    detached: HashSet<ObjectId>,
}

impl DetachState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as detached. Returns `false` if it already was.
    pub fn mark_detached(&mut self, id: ObjectId) -> bool {
        self.detached.insert(id)
    }

    pub fn is_detached(&self, id: &ObjectId) -> bool {
        self.detached.contains(id)
    }

    /// Number of distinct identities detached so far.
    pub fn len(&self) -> usize {
        self.detached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detached.is_empty()
    }
}

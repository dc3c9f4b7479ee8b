//! Owner-side collaborators of second-class object wrappers.
//!
//! A wrapper never talks to the datastore or the transaction directly. It
//! reaches them through its owner: the [`StateManager`] of the entity that
//! holds the field, and the [`ExecutionContext`] (unit of work) that state
//! manager belongs to.
//!
//! # Boundaries
//!
//! - [`StateManager`] -- dirty marking and lifecycle queries for one entity
//! - [`ExecutionContext`] -- transaction state and runtime configuration
//! - [`ElementContext`] -- element-typed services: queueing, cascade
//!   deletion, relationship management, detach/attach, store lookup
//! - [`RelationshipManager`] -- inverse-side bookkeeping for one owner
//!
//! # Queued Updates
//!
//! In queued-update mode wrappers append [`Operation`]s instead of calling
//! the backing store. [`OperationQueue::perform_all`] replays them in
//! enqueue order; index-based list operations are only correct in that
//! order.
//!
//! # In-Memory Implementations
//!
//! [`InMemoryStateManager`] and [`InMemoryExecutionContext`] record every
//! call they receive, for tests and for embedding without a datastore.

pub mod detach;
pub mod error;
pub mod memory;
pub mod operation;
pub mod traits;

pub use detach::DetachState;
pub use error::ContextError;
pub use memory::{
    InMemoryExecutionContext, InMemoryStateManager, RecordingRelationshipManager, RelationEvent,
};
pub use operation::{Operation, OperationKind, OperationQueue};
pub use traits::{ElementContext, ExecutionContext, RelationshipManager, StateManager};

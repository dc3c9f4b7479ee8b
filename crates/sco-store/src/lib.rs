//! Backing-store channel for persistent container fields.
//!
//! A backing store is the datastore-facing side of a container wrapper: it
//! offers per-element add/remove/contains/size/iterate operations scoped to
//! one owning object and field. Wrappers use it to mirror mutations
//! incrementally instead of rewriting the whole container at flush.
//!
//! # Backends
//!
//! All backends implement the [`BackingStore`] trait:
//!
//! - [`InMemoryBackingStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every call is scoped by the owner's [`ObjectId`](sco_types::ObjectId);
//!    one store handle serves one field.
//! 2. Positions are zero-based and refer to the store's own ordering.
//! 3. Datastore faults are returned as [`StoreError`], never swallowed here.
//!    Whether to swallow them is the caller's decision.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBackingStore;
pub use traits::BackingStore;

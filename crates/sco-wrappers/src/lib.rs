//! Second-class object wrappers for mutable fields of managed entities.
//!
//! A managed entity hands out a wrapper instead of a raw value for every
//! mutable field. The wrapper behaves like the value it wraps, and every
//! mutation also marks the owning field dirty, keeps inverse relationships
//! in step, cascades deletion of dependent elements and, for persistent
//! containers, queues or mirrors the change into the field's backing store.
//!
//! # Key Types
//!
//! - [`ScoTimestamp`] -- a mutable timestamp field
//! - [`ScoCollection`] -- an unordered container held entirely in memory
//! - [`ScoList`] -- an ordered container held entirely in memory
//! - [`BackedPriorityQueue`] -- a priority queue mirrored into a backing
//!   store, cached in memory or read through on every access
//! - [`OwnerHandle`] / [`ValueOwner`] -- lookup-only links to the owning
//!   entity
//!
//! # Failure Policy
//!
//! Invalid input (a null element, an index out of bounds) fails before any
//! change is made. A backing-store failure while mirroring a change is
//! logged and swallowed: the in-memory change stands and the next flush is
//! the point of consistency.

pub mod attach;
pub mod backed;
pub mod collection;
pub mod error;
pub mod list;
pub mod owner;
pub mod sco;
pub mod timestamp;

mod tracker;

#[cfg(test)]
mod testing;

pub use attach::{attach_unordered, same_element};
pub use backed::{BackedPriorityQueue, Comparator};
pub use collection::ScoCollection;
pub use error::{ScoError, ScoResult};
pub use list::ScoList;
pub use owner::{OwnerHandle, ValueOwner};
pub use sco::{Sco, ScoContainer};
pub use timestamp::ScoTimestamp;

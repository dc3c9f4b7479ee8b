//! Foundation types for second-class object (SCO) tracking.
//!
//! A second-class object is a mutable field value without identity of its
//! own (a collection, a timestamp) whose changes are tracked through the
//! entity that owns it. Every other `sco-*` crate depends on `sco-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Identity of a persistable object (UUID v7)
//! - [`FieldOrdinal`] -- Absolute position of a field in its owning class
//! - [`MemberMetadata`] -- Read-only descriptor of the owning field
//! - [`ScoElement`] -- Contract for container elements
//! - [`Timestamp`] -- Nanosecond-precision SQL timestamp value
//! - [`ScoConfig`] -- Runtime switches (caching, queued updates, relations)

pub mod config;
pub mod element;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod temporal;

pub use config::ScoConfig;
pub use element::ScoElement;
pub use error::{ConfigError, TypeError};
pub use identity::{FieldOrdinal, ObjectId};
pub use metadata::{
    ContainerMetadata, ElementMetadata, MemberMetadata, PersistenceModifier, EXT_ALLOW_NULLS,
    EXT_CACHE, EXT_CACHE_LAZY_LOADING,
};
pub use temporal::Timestamp;

//! Wrappers that mirror their changes into a backing store.
//!
//! A backed wrapper has two independent switches. Caching decides whether
//! the full content is held in memory (loaded once, then served from the
//! delegate) or read from the store on every access. The store channel
//! decides whether changes are mirrored at all and, if so, whether they are
//! queued for flush or applied right away.

mod priority_queue;

pub use priority_queue::{BackedPriorityQueue, Comparator};

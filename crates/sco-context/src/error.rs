use sco_store::StoreError;
use sco_types::{FieldOrdinal, ObjectId};

/// Errors produced while replaying queued operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no backing store to replay {operation} on field {field} of {owner}")]
    NoBackingStore {
        operation: &'static str,
        owner: ObjectId,
        field: FieldOrdinal,
    },

    #[error("replaying {operation} on field {field} failed: {source}")]
    Replay {
        operation: &'static str,
        field: FieldOrdinal,
        source: StoreError,
    },
}

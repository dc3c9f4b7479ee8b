/// Errors from backing-store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The datastore rejected or failed the operation.
    #[error("datastore error: {0}")]
    Datastore(String),

    /// A positional operation referenced a position past the end.
    #[error("position {position} out of range for container of size {size}")]
    PositionOutOfRange { position: usize, size: usize },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

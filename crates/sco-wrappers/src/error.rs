//! Error types for the wrapper crate.

use sco_store::StoreError;
use sco_types::TypeError;

/// Errors raised to callers of wrapper operations.
///
/// Store failures reach callers only from reads and loads. Failed store
/// writes during a mutation are logged and swallowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoError {
    /// A null element was offered to a container that forbids nulls.
    #[error("null element rejected by field {field}")]
    NullElement { field: String },

    /// An indexed operation referenced a position outside the container.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Reading or loading from the backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A value mutation was out of range.
    #[error("invalid value: {0}")]
    Value(#[from] TypeError),
}

/// Convenience alias for wrapper results.
pub type ScoResult<T> = Result<T, ScoError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn widen(result: Result<(), TypeError>) -> ScoResult<()> {
        Ok(result?)
    }

    #[test]
    fn value_errors_convert_and_clone() {
        let err = widen(Err(TypeError::InvalidField { field: "day", value: 30 })).unwrap_err();
        let copy = err.clone();
        assert_eq!(copy, err);
        assert_eq!(copy.to_string(), "invalid value: invalid day: 30");
    }
}

use thiserror::Error;

/// Errors produced by value-type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("nanos out of range: {0} (expected 0..=999999999)")]
    NanosOutOfRange(i64),

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: i64 },

    #[error("cannot parse timestamp from {0:?}")]
    InvalidTimestamp(String),

    #[error("instant out of range: {0}s")]
    InstantOutOfRange(i64),
}

/// Errors produced while loading a [`crate::ScoConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

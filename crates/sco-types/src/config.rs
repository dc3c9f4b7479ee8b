use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metadata::MemberMetadata;

/// Runtime switches consulted by wrappers and execution contexts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoConfig {
    /// Whether container wrappers keep a full in-memory mirror of their store.
    pub cache_collections: bool,
    /// Whether cached containers load lazily. Unset means "decide per field".
    pub cache_collections_lazy: Option<bool>,
    /// Whether the inverse side of bidirectional relations is maintained.
    pub manage_relationships: bool,
    /// When `true`, store operations are queued and replayed at flush.
    pub delay_datastore_operations: bool,
}

impl Default for ScoConfig {
    fn default() -> Self {
        Self {
            cache_collections: true,
            cache_collections_lazy: None,
            manage_relationships: true,
            delay_datastore_operations: false,
        }
    }
}

impl ScoConfig {
    /// A configuration that queues every store operation until flush.
    pub fn queued() -> Self {
        Self {
            delay_datastore_operations: true,
            ..Default::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Whether a container field keeps an in-memory mirror.
    pub fn use_container_cache(&self, member: &MemberMetadata) -> bool {
        member.cache_extension().unwrap_or(self.cache_collections)
    }

    /// Whether a cached container field defers its load until first access.
    pub fn use_cached_lazy_loading(&self, member: &MemberMetadata) -> bool {
        member
            .cache_lazy_loading_extension()
            .or(self.cache_collections_lazy)
            .unwrap_or(!member.default_fetch_group)
    }
}

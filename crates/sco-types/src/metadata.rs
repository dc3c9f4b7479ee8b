//! Read-only descriptors of the fields that own tracked values.
//!
//! A [`MemberMetadata`] is built once per mapped field and shared by every
//! wrapper created for that field. Wrappers never mutate it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::FieldOrdinal;

/// Extension key permitting null elements in a container.
pub const EXT_ALLOW_NULLS: &str = "allow-nulls";
/// Extension key overriding the container cache switch.
pub const EXT_CACHE: &str = "cache";
/// Extension key overriding lazy loading of a cached container.
pub const EXT_CACHE_LAZY_LOADING: &str = "cache-lazy-loading";

/// How a field participates in persistence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceModifier {
    /// Stored in the datastore.
    #[default]
    Persistent,
    /// Tracked in transactions but never stored.
    Transactional,
    /// Not managed at all.
    None,
}

/// Type information for one component of a container (element, key or value).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMetadata {
    /// Type name of the component.
    pub type_name: String,
    /// Whether the component is a persistable type with its own identity.
    #[serde(default)]
    pub has_identity: bool,
    /// Whether removing the component deletes its persisted record.
    #[serde(default)]
    pub dependent: bool,
    /// Whether the component is serialized into the owner's row.
    #[serde(default)]
    pub serialized: bool,
    /// Whether the component is embedded into the container's table.
    #[serde(default)]
    pub embedded: bool,
}

impl ElementMetadata {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// A persistable component with its own identity.
    pub fn persistable(type_name: impl Into<String>) -> Self {
        Self {
            has_identity: true,
            ..Self::new(type_name)
        }
    }

    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    pub fn serialized(mut self) -> Self {
        self.serialized = true;
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }
}

/// Container shape of a field: element type and, for maps, key/value types.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub element: ElementMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ElementMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ElementMetadata>,
}

impl ContainerMetadata {
    pub fn of(element: ElementMetadata) -> Self {
        Self {
            element,
            key: None,
            value: None,
        }
    }

    pub fn map(key: ElementMetadata, value: ElementMetadata) -> Self {
        Self {
            element: ElementMetadata::default(),
            key: Some(key),
            value: Some(value),
        }
    }

    fn components(&self) -> impl Iterator<Item = &ElementMetadata> {
        let element = (self.key.is_none() && self.value.is_none()).then_some(&self.element);
        element
            .into_iter()
            .chain(self.key.iter())
            .chain(self.value.iter())
    }
}

/// Descriptor of a field owning a tracked value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMetadata {
    /// Field name as declared on the owning class.
    pub name: String,
    /// Ordinal of the field in the owning class.
    pub absolute_field_number: FieldOrdinal,
    #[serde(default)]
    pub persistence_modifier: PersistenceModifier,
    /// Whether the field is loaded with the default fetch group.
    #[serde(default)]
    pub default_fetch_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMetadata>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl MemberMetadata {
    pub fn new(name: impl Into<String>, absolute_field_number: u16) -> Self {
        Self {
            name: name.into(),
            absolute_field_number: FieldOrdinal::new(absolute_field_number),
            persistence_modifier: PersistenceModifier::Persistent,
            default_fetch_group: false,
            container: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_container(mut self, container: ContainerMetadata) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_persistence_modifier(mut self, modifier: PersistenceModifier) -> Self {
        self.persistence_modifier = modifier;
        self
    }

    pub fn in_default_fetch_group(mut self) -> Self {
        self.default_fetch_group = true;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    fn flag_extension(&self, key: &str) -> Option<bool> {
        self.extension(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn field(&self) -> FieldOrdinal {
        self.absolute_field_number
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence_modifier == PersistenceModifier::Persistent
    }

    /// Whether null elements may be stored in the container.
    pub fn allows_nulls(&self) -> bool {
        self.flag_extension(EXT_ALLOW_NULLS).unwrap_or(false)
    }

    /// Whether removing an element deletes the element's persisted record.
    pub fn has_dependent_element(&self) -> bool {
        self.container
            .as_ref()
            .is_some_and(|c| c.components().any(|e| e.dependent && e.has_identity))
    }

    /// Whether any container component lacks independent identity.
    pub fn has_elements_without_identity(&self) -> bool {
        self.container
            .as_ref()
            .is_some_and(|c| c.components().any(|e| !e.has_identity || e.embedded || e.serialized))
    }

    /// Whether container components are serialized into the owner.
    pub fn has_serialised_elements(&self) -> bool {
        self.container
            .as_ref()
            .is_some_and(|c| c.components().any(|e| e.serialized))
    }

    /// Per-field override of the container cache switch.
    pub fn cache_extension(&self) -> Option<bool> {
        self.flag_extension(EXT_CACHE)
    }

    /// Per-field override of lazy loading for a cached container.
    pub fn cache_lazy_loading_extension(&self) -> Option<bool> {
        self.flag_extension(EXT_CACHE_LAZY_LOADING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn books() -> MemberMetadata {
        MemberMetadata::new("books", 3)
            .with_container(ContainerMetadata::of(ElementMetadata::persistable("Book").dependent()))
    }

    #[test]
    fn dependent_requires_identity() {
        assert!(books().has_dependent_element());

        let values = MemberMetadata::new("tags", 1)
            .with_container(ContainerMetadata::of(ElementMetadata::new("String").dependent()));
        assert!(!values.has_dependent_element());
    }

    #[test]
    fn elements_without_identity() {
        assert!(!books().has_elements_without_identity());

        let embedded = MemberMetadata::new("lines", 2)
            .with_container(ContainerMetadata::of(ElementMetadata::persistable("Line").embedded()));
        assert!(embedded.has_elements_without_identity());

        let values = MemberMetadata::new("tags", 1)
            .with_container(ContainerMetadata::of(ElementMetadata::new("String")));
        assert!(values.has_elements_without_identity());
    }

    #[test]
    fn map_uses_key_and_value_components() {
        let map = MemberMetadata::new("index", 4).with_container(ContainerMetadata::map(
            ElementMetadata::new("String"),
            ElementMetadata::persistable("Book").dependent(),
        ));
        assert!(map.has_dependent_element());
        assert!(map.has_elements_without_identity());
    }

    #[test]
    fn flag_extensions() {
        let member = books()
            .with_extension(EXT_ALLOW_NULLS, "TRUE")
            .with_extension(EXT_CACHE, "false");
        assert!(member.allows_nulls());
        assert_eq!(member.cache_extension(), Some(false));
        assert_eq!(member.cache_lazy_loading_extension(), None);
        assert!(!books().allows_nulls());
    }

    #[test]
    fn non_container_has_no_element_flags() {
        let member = MemberMetadata::new("created", 0);
        assert!(!member.has_dependent_element());
        assert!(!member.has_elements_without_identity());
        assert!(!member.has_serialised_elements());
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "name": "books",
            "absolute_field_number": 3,
            "container": { "element": { "type_name": "Book", "has_identity": true } }
        }"#;
        let member: MemberMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(member.field(), FieldOrdinal::new(3));
        assert!(member.is_persistent());
        assert!(!member.default_fetch_group);
        assert!(!member.has_elements_without_identity());
    }
}

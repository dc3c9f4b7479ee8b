//! The contract every container element must satisfy.

use std::fmt::Debug;
use std::hash::Hash;

use crate::identity::ObjectId;

/// An element that can live inside a tracked container.
///
/// `is_null` lets element types with an absent state (`Option<T>`) be
/// rejected by containers whose descriptor forbids nulls. `object_id`
/// returns the identity of persistable elements; plain values have none.
pub trait ScoElement: Clone + Eq + Hash + Debug + 'static {
    fn is_null(&self) -> bool {
        false
    }

    fn object_id(&self) -> Option<ObjectId> {
        None
    }
}

macro_rules! plain_elements {
    ($($ty:ty),* $(,)?) => {
        $(impl ScoElement for $ty {})*
    };
}

plain_elements!(i8, i16, i32, i64, u8, u16, u32, u64, usize, bool, char, String);

impl ScoElement for ObjectId {
    fn object_id(&self) -> Option<ObjectId> {
        Some(*self)
    }
}

impl<T: ScoElement> ScoElement for Option<T> {
    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.as_ref().and_then(ScoElement::object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_never_null() {
        assert!(!5i32.is_null());
        assert!(!String::new().is_null());
        assert_eq!(5i32.object_id(), None);
    }

    #[test]
    fn option_none_is_null() {
        let absent: Option<i32> = None;
        assert!(absent.is_null());
        assert!(!Some(1).is_null());
    }

    #[test]
    fn object_id_elements_carry_identity() {
        let id = ObjectId::new();
        assert_eq!(id.object_id(), Some(id));
        assert_eq!(Some(id).object_id(), Some(id));
        assert_eq!(None::<ObjectId>.object_id(), None);
    }
}

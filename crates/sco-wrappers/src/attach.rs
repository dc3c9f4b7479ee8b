//! Detach and attach of container contents.
//!
//! Detaching copies every element through the owner's execution context so
//! the result shares nothing with the live wrapper. Attaching reconciles a
//! live container against a detached replacement by diffing, so that only
//! real additions and removals are reported to the change tracker.

use sco_context::DetachState;
use sco_types::ScoElement;

use crate::error::ScoResult;
use crate::owner::OwnerHandle;
use crate::sco::ScoContainer;

/// Whether two elements denote the same member of a container.
///
/// Identity-bearing elements match on identity, values on equality.
pub fn same_element<E: ScoElement>(a: &E, b: &E) -> bool {
    match (a.object_id(), b.object_id()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Disconnected copies of `elements`.
pub(crate) fn detach_elements<'a, E: ScoElement>(
    owner: Option<&OwnerHandle<E>>,
    elements: impl IntoIterator<Item = &'a E>,
    state: &mut DetachState,
) -> Vec<E> {
    elements
        .into_iter()
        .map(|element| match owner {
            Some(owner) => owner.context().detach_element(element, state),
            None => element.clone(),
        })
        .collect()
}

/// Managed forms of detached `elements`.
pub(crate) fn attach_elements<E: ScoElement>(owner: Option<&OwnerHandle<E>>, elements: &[E]) -> Vec<E> {
    let Some(owner) = owner else {
        return elements.to_vec();
    };
    let without_identity = owner.member().has_elements_without_identity();
    elements
        .iter()
        .map(|element| owner.context().attach_element(element, without_identity))
        .collect()
}

/// Reconcile an unordered container with `attached`.
///
/// Elements missing from `attached` are removed without cascading, since
/// the replacement decides membership rather than deletion. Elements not yet
/// present are added.
pub fn attach_unordered<E, C>(container: &mut C, attached: Vec<E>) -> ScoResult<()>
where
    E: ScoElement,
    C: ScoContainer<E> + ?Sized,
{
    let current = container.elements()?;
    for element in &current {
        if !attached.iter().any(|a| same_element(element, a)) {
            container.remove_element(element, false)?;
        }
    }
    for element in attached {
        if !current.iter().any(|c| same_element(c, &element)) {
            container.add_element(element)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sco_types::ObjectId;

    #[test]
    fn identity_elements_match_on_identity() {
        let id = ObjectId::new();
        assert!(same_element(&Some(id), &Some(id)));
        assert!(!same_element(&Some(id), &Some(ObjectId::new())));
        assert!(same_element(&3, &3));
        assert!(!same_element(&3, &4));
    }

    #[test]
    fn unowned_detach_clones() {
        let mut state = DetachState::new();
        let owner: Option<&OwnerHandle<i32>> = None;
        let detached = detach_elements(owner, &[1, 2], &mut state);
        assert_eq!(detached, vec![1, 2]);
        assert!(state.is_empty());
    }
}

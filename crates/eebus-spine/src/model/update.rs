//! Generic list-merge algorithm shared by all list functions.
//!
//! Lists merge element-wise by each element's natural key: a keyed incoming
//! element overwrites only the fields it carries (partial update) or is
//! appended when unknown. Keyless elements are only accepted when a partial
//! selector scopes them onto existing elements; otherwise they are rejected
//! with `MissingIdentifier`. A delete filter is applied after the merge and
//! removes the selected subset (or the whole list when it has no selector),
//! so a deleted key wins over an incoming element carrying the same key.
//!
//! Applying the same incoming list twice without a delete filter leaves the
//! list unchanged after the first application.

use crate::error::SpineError;

/// An element of a mergeable list.
pub trait ListElement: Clone {
    /// Natural-key type, e.g. `measurementId`.
    type Key: PartialEq + Copy;

    /// The element's natural key, if any identifier field is present.
    fn identifier(&self) -> Option<Self::Key>;

    /// Overwrite only the fields present in `incoming`.
    fn update_from(&mut self, incoming: &Self);
}

/// Selector matching for a concrete list type.
pub trait SelectorMatch {
    type Element;

    fn matches(&self, item: &Self::Element) -> bool;
}

/// Scope of a filter: the whole list, or the subset a selector names.
#[derive(Debug)]
pub enum FilterScope<'a, S> {
    All,
    Selected(&'a S),
}

// Manual impls: the scope only holds a reference, so it is copyable no
// matter what the selector type is.
impl<S> Clone for FilterScope<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for FilterScope<'_, S> {}

impl<'a, S> FilterScope<'a, S> {
    pub fn from_selector(selector: Option<&'a S>) -> Self {
        match selector {
            Some(s) => FilterScope::Selected(s),
            None => FilterScope::All,
        }
    }
}

/// Merge `incoming` into `current` per the rules above.
pub fn update_list<T, S>(
    current: &mut Vec<T>,
    incoming: &[T],
    partial: Option<FilterScope<'_, S>>,
    delete: Option<FilterScope<'_, S>>,
) -> Result<(), SpineError>
where
    T: ListElement,
    S: SelectorMatch<Element = T>,
{
    for element in incoming {
        match element.identifier() {
            Some(key) => {
                match current
                    .iter_mut()
                    .find(|item| item.identifier() == Some(key))
                {
                    Some(existing) => existing.update_from(element),
                    None => current.push(element.clone()),
                }
            }
            None => {
                // Keyless elements are only meaningful as a patch applied to
                // the subset a partial selector names.
                let Some(FilterScope::Selected(selector)) = partial else {
                    return Err(SpineError::MissingIdentifier);
                };
                for item in current.iter_mut().filter(|item| selector.matches(item)) {
                    item.update_from(element);
                }
            }
        }
    }

    match delete {
        Some(FilterScope::All) => current.clear(),
        Some(FilterScope::Selected(selector)) => current.retain(|item| !selector.matches(item)),
        None => {}
    }

    Ok(())
}

use std::collections::HashSet;
use std::hash::Hash;

use tracing::trace;

/// Identifiers of selected rows. Keyed by record identity, never by page
/// position, so it survives filtering, sorting and page navigation.
#[derive(Debug, Clone)]
pub struct SelectionSet<Id> {
    ids: HashSet<Id>,
}

impl<Id> Default for SelectionSet<Id> {
    fn default() -> Self {
        SelectionSet {
            ids: HashSet::new(),
        }
    }
}

impl<Id: Eq + Hash + Clone> SelectionSet<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds all given ids. Existing selections stay untouched.
    pub fn select_all<I: IntoIterator<Item = Id>>(&mut self, visible: I) {
        self.ids.extend(visible);
    }

    pub fn select_none(&mut self) {
        self.ids.clear();
    }

    /// Flips membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: Id) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn is_selected(&self, id: &Id) -> bool {
        self.ids.contains(id)
    }

    pub fn selected_ids(&self) -> &HashSet<Id> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drops every id that is not in `present`.
    pub fn prune(&mut self, present: &HashSet<Id>) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| present.contains(id));
        let removed = before - self.ids.len();
        if removed > 0 {
            trace!("Pruned {removed} stale ids from selection");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_all_extends() {
        let mut selection = SelectionSet::new();
        selection.toggle(42);
        selection.select_all([1, 2, 3]);
        assert_eq!(selection.len(), 4);
        assert!(selection.is_selected(&42));
    }

    #[test]
    fn toggle_flips_membership() {
        let mut selection = SelectionSet::new();
        assert!(selection.toggle("a"));
        assert!(selection.is_selected(&"a"));
        assert!(!selection.toggle("a"));
        assert!(!selection.is_selected(&"a"));
    }

    #[test]
    fn select_none_and_prune() {
        let mut selection = SelectionSet::new();
        selection.select_all([1, 2, 3, 4]);
        let present: HashSet<i32> = [2, 4, 9].into_iter().collect();
        assert_eq!(selection.prune(&present), 2);
        assert_eq!(
            selection.selected_ids(),
            &[2, 4].into_iter().collect::<HashSet<_>>()
        );

        selection.select_none();
        assert!(selection.is_empty());
    }
}

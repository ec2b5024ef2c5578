//! A client side data view: row store, filters, sort, paging and selection.
//!
//! `DataView` owns the records of one table together with its `ViewState` and
//! keeps the derived row mapping (filtered, then sorted indices into the store)
//! in sync. The engines themselves are the pure functions in `filter`, `sort`
//! and `pagination`; this type only decides when to re-run them.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::filter::{self, Predicate, PredicateKey};
use crate::pagination::{self, PageSize, PageWindow};
use crate::record::Record;
use crate::selection::SelectionSet;
use crate::sort::{self, SortDescriptor};

/// Everything the user can change about a view, as one plain value.
#[derive(Debug, Clone)]
pub struct ViewState<Id> {
    pub predicates: Vec<Predicate>,
    pub sort: Option<SortDescriptor>,
    pub window: PageWindow,
    pub selection: SelectionSet<Id>,
}

impl<Id> Default for ViewState<Id> {
    fn default() -> Self {
        ViewState {
            predicates: Vec::new(),
            sort: None,
            window: PageWindow::default(),
            selection: SelectionSet::default(),
        }
    }
}

impl<Id> ViewState<Id> {
    pub fn with_page_size(size: PageSize) -> Self {
        ViewState {
            window: PageWindow::new(0, size),
            ..Default::default()
        }
    }
}

pub struct DataView<R: Record> {
    records: Vec<R>,
    state: ViewState<R::Id>,
    rows: Arc<Vec<usize>>, // Filtered + sorted mapping of view position to record index
}

impl<R: Record> DataView<R> {
    pub fn new(records: Vec<R>, page_size: PageSize) -> Self {
        let mut view = DataView {
            records,
            state: ViewState::with_page_size(page_size),
            rows: Arc::new(Vec::new()),
        };
        view.refresh();
        view
    }

    pub fn empty(page_size: PageSize) -> Self {
        Self::new(Vec::new(), page_size)
    }

    pub fn state(&self) -> &ViewState<R::Id> {
        &self.state
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Filtered and sorted record indices.
    pub fn rows(&self) -> Arc<Vec<usize>> {
        Arc::clone(&self.rows)
    }

    /// Swap in a freshly fetched row store. Filters, sort and page index go
    /// back to their defaults, the page size is kept and the selection cleared.
    pub fn replace_records(&mut self, records: Vec<R>) {
        debug!(
            "Replacing row store: {} -> {} records",
            self.records.len(),
            records.len()
        );
        self.records = records;
        self.state = ViewState::with_page_size(self.state.window.size);
        self.refresh();
    }

    // Re-run filter and sort, then pull the page index back into range.
    fn refresh(&mut self) {
        let mut rows = filter::filter_rows(&self.records, &self.state.predicates);
        sort::sort_rows(&self.records, &mut rows, self.state.sort.as_ref());
        self.rows = Arc::new(rows);

        let clamped = self.state.window.clamped(self.rows.len());
        if clamped != self.state.window {
            trace!(
                "Clamping page index {} -> {}",
                self.state.window.index, clamped.index
            );
            self.state.window = clamped;
        }
    }

    // ---------------------------- Filtering ------------------------------- //

    /// Install a predicate, replacing any predicate with the same key.
    pub fn set_predicate(&mut self, predicate: Predicate) {
        let key = predicate.key();
        self.state.predicates.retain(|p| p.key() != key);
        if predicate.is_active() {
            self.state.predicates.push(predicate);
        }
        self.refresh();
    }

    pub fn remove_predicate(&mut self, key: &PredicateKey) {
        self.state.predicates.retain(|p| &p.key() != key);
        self.refresh();
    }

    pub fn predicate(&self, key: &PredicateKey) -> Option<&Predicate> {
        self.state.predicates.iter().find(|p| &p.key() == key)
    }

    pub fn clear_predicates(&mut self) {
        self.state.predicates.clear();
        self.refresh();
    }

    /// Value counts of `field` over the rows passing every other predicate.
    /// The field's own categorical filter is left out so values that are not
    /// picked yet still show up.
    pub fn facets(&self, field: &str) -> Vec<(String, usize)> {
        let own = PredicateKey::OneOf(field.to_string());
        let others: Vec<Predicate> = self
            .state
            .predicates
            .iter()
            .filter(|p| p.key() != own)
            .cloned()
            .collect();
        let rows = filter::filter_rows(&self.records, &others);
        filter::facets(&self.records, &rows, field)
    }

    // ----------------------------- Sorting -------------------------------- //

    pub fn set_sort(&mut self, descriptor: SortDescriptor) {
        self.state.sort = Some(descriptor);
        self.refresh();
    }

    /// Back to store order.
    pub fn clear_sort(&mut self) {
        self.state.sort = None;
        self.refresh();
    }

    // ---------------------------- Pagination ------------------------------ //

    pub fn filtered_len(&self) -> usize {
        self.rows.len()
    }

    pub fn page_count(&self) -> usize {
        pagination::page_count(self.rows.len(), self.state.window.size)
    }

    pub fn page_index(&self) -> usize {
        self.state.window.index
    }

    pub fn page_size(&self) -> PageSize {
        self.state.window.size
    }

    pub fn set_page(&mut self, index: usize) {
        self.state.window.index = index.min(self.state.window.last_index(self.rows.len()));
    }

    pub fn next_page(&mut self) {
        self.set_page(self.state.window.index + 1);
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.state.window.index.saturating_sub(1));
    }

    pub fn last_page(&mut self) {
        self.set_page(self.state.window.last_index(self.rows.len()));
    }

    /// Changing the page size always starts over at the first page.
    pub fn set_page_size(&mut self, size: PageSize) {
        self.state.window = PageWindow::new(0, size);
    }

    /// Record indices shown on the current page.
    pub fn page_rows(&self) -> &[usize] {
        pagination::apply(self.rows.as_slice(), self.state.window)
    }

    pub fn page_records(&self) -> Vec<&R> {
        self.page_rows()
            .iter()
            .map(|&ridx| &self.records[ridx])
            .collect()
    }

    pub fn page_ids(&self) -> Vec<R::Id> {
        self.page_rows()
            .iter()
            .map(|&ridx| self.records[ridx].id())
            .collect()
    }

    /// Filtered and sorted records across all pages.
    pub fn filtered_records(&self) -> Vec<&R> {
        self.rows.iter().map(|&ridx| &self.records[ridx]).collect()
    }

    // ----------------------------- Selection ------------------------------ //

    pub fn select_all_visible(&mut self) {
        let ids = self.page_ids();
        self.state.selection.select_all(ids);
    }

    pub fn select_none(&mut self) {
        self.state.selection.select_none();
    }

    pub fn toggle_selection(&mut self, id: R::Id) -> bool {
        self.state.selection.toggle(id)
    }

    pub fn is_selected(&self, id: &R::Id) -> bool {
        self.state.selection.is_selected(id)
    }

    pub fn selected_ids(&self) -> &HashSet<R::Id> {
        self.state.selection.selected_ids()
    }

    /// Selected records in store order.
    pub fn selected_records(&self) -> Vec<&R> {
        self.records
            .iter()
            .filter(|r| self.state.selection.is_selected(&r.id()))
            .collect()
    }

    /// Forget selected ids that are no longer in the row store.
    pub fn prune_selection(&mut self) -> usize {
        let present: HashSet<R::Id> = self.records.iter().map(|r| r.id()).collect();
        self.state.selection.prune(&present)
    }

    /// Swap the row store but keep the selection, minus ids that disappeared.
    pub fn merge_records(&mut self, records: Vec<R>) {
        self.records = records;
        self.prune_selection();
        self.refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{Person, person};

    fn numbered(count: u32) -> Vec<Person> {
        const KINDS: [&str; 3] = ["full-time", "part-time", "freelance"];
        (0..count)
            .map(|i| person(i, "someone", KINDS[i as usize % 3]))
            .collect()
    }

    fn size(n: usize) -> PageSize {
        PageSize::try_from(n).unwrap()
    }

    #[test]
    fn twenty_five_records_in_pages_of_ten() {
        let mut view = DataView::new(numbered(25), size(10));
        assert_eq!(view.page_count(), 3);
        view.set_page(2);
        assert_eq!(view.page_rows().len(), 5);
        assert_eq!(view.page_ids(), vec![20, 21, 22, 23, 24]);
    }

    #[test]
    fn page_index_clamps_when_filter_shrinks() {
        let mut view = DataView::new(numbered(30), size(10));
        view.last_page();
        assert_eq!(view.page_index(), 2);

        view.set_predicate(Predicate::one_of("type", ["freelance"]));
        assert_eq!(view.filtered_len(), 10);
        assert_eq!(view.page_index(), 0);
        assert_eq!(view.page_rows().len(), 10);
    }

    #[test]
    fn page_size_change_resets_index() {
        let mut view = DataView::new(numbered(60), size(10));
        view.set_page(4);
        view.set_page_size(size(25));
        assert_eq!(view.page_index(), 0);
        assert_eq!(view.page_count(), 3);
    }

    #[test]
    fn selection_survives_page_navigation() {
        let mut view = DataView::new(numbered(25), size(10));
        view.toggle_selection(3);
        view.next_page();
        view.select_all_visible();
        view.prev_page();

        assert!(view.is_selected(&3));
        assert!(view.is_selected(&15));
        assert_eq!(view.selected_ids().len(), 11);
    }

    #[test]
    fn same_key_predicate_replaces() {
        let mut view = DataView::new(numbered(9), size(10));
        view.set_predicate(Predicate::one_of("type", ["full-time"]));
        view.set_predicate(Predicate::one_of("type", ["part-time"]));
        assert_eq!(view.state().predicates.len(), 1);
        assert_eq!(view.filtered_len(), 3);

        view.set_predicate(Predicate::one_of("type", Vec::<String>::new()));
        assert!(view.state().predicates.is_empty());
        assert_eq!(view.filtered_len(), 9);
    }

    #[test]
    fn facets_ignore_own_column_filter() {
        let mut view = DataView::new(numbered(9), size(10));
        view.set_predicate(Predicate::one_of("type", ["freelance"]));
        let counts = view.facets("type");
        assert_eq!(counts.len(), 3);
        assert!(counts.iter().all(|(_, count)| *count == 3));

        view.set_predicate(Predicate::search("nobody", ["name"]));
        assert!(view.facets("type").is_empty());
    }

    #[test]
    fn every_facet_value_filters_to_its_count() {
        let records = vec![
            person(1, "Ann", "full-time"),
            person(2, "Bob", ""),
            person(3, "Cid", ""),
            person(4, "Dee", "part-time"),
            person(5, "Eve", "full-time"),
        ];
        let mut view = DataView::new(records, size(10));
        let counts = view.facets("type");
        assert_eq!(counts.len(), 2);

        for (value, count) in counts {
            view.set_predicate(Predicate::one_of("type", [value.as_str()]));
            assert_eq!(view.filtered_len(), count, "value {value:?}");
        }
    }

    #[test]
    fn replace_records_resets_state() {
        let mut view = DataView::new(numbered(30), size(25));
        view.set_predicate(Predicate::search("some", ["name"]));
        view.set_sort(SortDescriptor::descending("id"));
        view.next_page();
        view.toggle_selection(1);

        view.replace_records(numbered(5));
        assert!(view.state().predicates.is_empty());
        assert!(view.state().sort.is_none());
        assert_eq!(view.page_index(), 0);
        assert_eq!(view.page_size(), size(25));
        assert!(view.selected_ids().is_empty());
    }

    #[test]
    fn merge_prunes_stale_selection() {
        let mut view = DataView::new(numbered(10), size(10));
        view.select_all_visible();
        view.merge_records(numbered(4));
        assert_eq!(view.selected_ids().len(), 4);
        assert_eq!(view.selected_records().len(), 4);
    }

    #[test]
    fn sort_then_clear_restores_store_order() {
        let mut view = DataView::new(numbered(5), size(10));
        view.set_sort(SortDescriptor::descending("id"));
        assert_eq!(view.page_ids(), vec![4, 3, 2, 1, 0]);
        view.clear_sort();
        assert_eq!(view.page_ids(), vec![0, 1, 2, 3, 4]);
    }
}

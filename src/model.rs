use arboard::Clipboard;
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::{CMDMode, GridConfig, GridError, HELP_TEXT, Message};
use crate::export::{ExportJob, csv_line};
use crate::filter::{Predicate, PredicateKey};
use crate::inputter::{InputResult, Inputter};
use crate::notify::{NotifyKind, Notifier, StatusLine};
use crate::record::{Record, TableRecord};
use crate::sort::{SortDescriptor, SortDirection};
use crate::source::{Fetched, Loader, RecordBatch, RecordSource};
use crate::ui::{COLUMN_WIDTH_MARGIN, SELECTION_MARKER_WIDTH};
use crate::view::DataView;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    FACETS,
    POPUP,
    CMDINPUT,
}

#[derive(Clone, Debug, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
    pub sort: Option<SortDirection>,
    pub filtered: bool,
}

impl ColumnView {
    fn plain(name: &str, width: usize, data: Vec<String>) -> Self {
        ColumnView {
            name: name.to_string(),
            width,
            data,
            sort: None,
            filtered: false,
        }
    }
}

// Detail view of a single record, `position` indexes the filtered rows.
#[derive(Debug, Default)]
struct RecordView {
    position: usize,
    cursor_row: usize,
}

// Value counts of one column, used to pick categorical filter values.
#[derive(Debug, Default)]
struct FacetView {
    field: String,
    entries: Vec<(String, usize)>,
    cursor_row: usize,
}

/// Everything the ui needs to draw one frame.
#[derive(Debug, Clone)]
pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub marked: Vec<bool>, // Selection marker per row
    pub cursor_row: usize,
    pub cursor_column: usize,
    pub footer: String,
    pub filters: Vec<String>,
    pub show_popup: bool,
    pub popup_title: String,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub status_kind: NotifyKind,
    pub export_progress: Option<u8>,
    pub loading: bool,
    pub last_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            marked: Vec::new(),
            cursor_row: 0,
            cursor_column: 0,
            footer: String::new(),
            filters: Vec::new(),
            show_popup: false,
            popup_title: String::new(),
            popup_message: String::new(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
            status_kind: NotifyKind::Info,
            export_progress: None,
            loading: false,
            last_update: Instant::now(),
        }
    }
}

pub struct Model {
    config: GridConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    loader: Loader<TableRecord>,
    view: DataView<TableRecord>,
    name: String,
    columns: Vec<String>,
    cursor_row: usize,    // Position within the current page
    cursor_column: usize, // Index into columns
    offset_column: usize,
    record_view: RecordView,
    facet_view: FacetView,
    width: usize,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    cmd_fields: Vec<String>, // Fields the open prompt searches
    last_input: InputResult,
    active_cmdinput: bool,
    status_line: StatusLine,
    export: Option<ExportJob>,
    popup: Option<(String, String)>,
}

impl Model {
    pub fn init<S>(config: &GridConfig, source: S, ui_width: usize) -> Self
    where
        S: RecordSource<Record = TableRecord> + 'static,
    {
        let clipboard = match Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                warn!("Clipboard not available: {e}");
                None
            }
        };
        Self::build(config, source, ui_width, clipboard)
    }

    fn build<S>(config: &GridConfig, source: S, ui_width: usize, clipboard: Option<Clipboard>) -> Self
    where
        S: RecordSource<Record = TableRecord> + 'static,
    {
        let loader = Loader::new(source);
        let name = loader.describe();
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            loader,
            view: DataView::empty(config.page_size),
            name,
            columns: Vec::new(),
            cursor_row: 0,
            cursor_column: 0,
            offset_column: 0,
            record_view: RecordView::default(),
            facet_view: FacetView::default(),
            width: ui_width,
            uidata: UIData::empty(),
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            cmd_fields: Vec::new(),
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_line: StatusLine::new("Started hrview!"),
            export: None,
            popup: None,
        };
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn view(&self) -> &DataView<TableRecord> {
        &self.view
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn notify(&mut self, title: &str, message: &str, kind: NotifyKind) {
        self.status_line.notify(title, message, kind);
    }

    // ------------------------------ Loading ------------------------------- //

    /// Ask the source for a fresh row store. The current rows stay visible
    /// until the result arrives.
    pub fn reload(&mut self) -> Result<(), GridError> {
        let generation = self.loader.request()?;
        debug!("Requested reload, generation {generation}");
        self.status = Status::LOADING;
        let name = self.name.clone();
        self.notify(&format!("Loading {name}"), "", NotifyKind::Info);
        self.update_uidata();
        Ok(())
    }

    /// Called once per ui loop iteration: picks up fetch results and advances
    /// a running export.
    pub fn tick(&mut self) {
        let mut changed = false;
        if let Some(fetched) = self.loader.poll() {
            self.apply_fetch(fetched);
            changed = true;
        }
        if self.export.is_some() {
            self.advance_export();
            changed = true;
        }
        if changed {
            self.update_uidata();
        }
    }

    fn apply_fetch(&mut self, fetched: Fetched<TableRecord>) {
        let name = self.name.clone();
        match fetched.result {
            Ok(RecordBatch { fields, records }) => {
                let count = records.len();
                self.columns = if fields.is_empty() {
                    records
                        .first()
                        .map(|r| r.columns().names().to_vec())
                        .unwrap_or_default()
                } else {
                    fields
                };
                self.view.replace_records(records);
                self.cursor_row = 0;
                self.cursor_column = 0;
                self.offset_column = 0;
                self.back_to_table();
                self.status = if count == 0 {
                    Status::EMPTY
                } else {
                    Status::READY
                };
                info!(
                    "Applied fetch generation {} with {count} records",
                    fetched.generation
                );
                self.notify(
                    &format!("Loaded {name}"),
                    &format!("{count} records"),
                    NotifyKind::Success,
                );
                self.apply_initial_sort();
            }
            Err(e) => {
                self.status = if self.view.records().is_empty() {
                    Status::EMPTY
                } else {
                    Status::READY
                };
                self.notify(
                    &format!("Loading {name} failed"),
                    &e.to_string(),
                    NotifyKind::Error,
                );
            }
        }
    }

    // Prompts, facet and record views refer to the replaced store. Close them,
    // a popup stays open but returns to the table.
    fn back_to_table(&mut self) {
        if self.modus == Modus::CMDINPUT {
            self.cancel_cmd_input();
        }
        if self.modus == Modus::POPUP {
            self.previous_modus = Modus::TABLE;
        } else {
            self.modus = Modus::TABLE;
            self.previous_modus = Modus::TABLE;
        }
    }

    // `--sort name` sorts ascending, `--sort -name` descending. Only the first
    // loaded store is sorted, later reloads start unsorted.
    fn apply_initial_sort(&mut self) {
        let Some(spec) = self.config.initial_sort.take() else {
            return;
        };
        let (field, direction) = match spec.strip_prefix('-') {
            Some(field) => (field, SortDirection::Descending),
            None => (spec.as_str(), SortDirection::Ascending),
        };
        if self.columns.iter().any(|c| c == field) {
            self.view.set_sort(SortDescriptor {
                field: field.to_string(),
                direction,
            });
        } else {
            let e = GridError::UnknownColumn(field.to_string());
            self.notify("Cannot sort", &e.to_string(), NotifyKind::Error);
        }
    }

    // ------------------------------ Messages ------------------------------ //

    pub fn update(&mut self, message: Message) -> Result<(), GridError> {
        trace!("Update: Modus {:?}, Message {:?}", self.modus, message);
        match self.modus {
            Modus::TABLE => match message {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_table_selection_down(),
                Message::MoveUp => self.move_table_selection_up(),
                Message::MoveLeft => self.move_table_selection_left(),
                Message::MoveRight => self.move_table_selection_right(),
                Message::NextPage => self.change_page(|view| view.next_page()),
                Message::PrevPage => self.change_page(|view| view.prev_page()),
                Message::FirstPage => self.change_page(|view| view.set_page(0)),
                Message::LastPage => self.change_page(|view| view.last_page()),
                Message::CyclePageSize => self.cycle_page_size(),
                Message::SortAscending => self.sort_current_column(SortDirection::Ascending),
                Message::SortDescending => self.sort_current_column(SortDirection::Descending),
                Message::ClearSort => self.clear_sort(),
                Message::Search => self.enter_cmd_mode(CMDMode::Search),
                Message::FilterColumn => self.enter_cmd_mode(CMDMode::FilterColumn),
                Message::Facets => self.build_facet_view(),
                Message::ClearFilters => self.clear_filters(),
                Message::ToggleSelect => self.toggle_current_selection(),
                Message::SelectAllVisible => self.select_all_visible(),
                Message::SelectNone => self.select_none(),
                Message::CopyRow => self.copy_current_row(),
                Message::Export => self.start_export(),
                Message::Reload => self.reload()?,
                Message::Enter => self.build_record_view(),
                Message::Help => self.show_help(),
                Message::Resize(width, _) => self.ui_resize(width),
                _ => (),
            },
            Modus::RECORD => match message {
                Message::Quit => self.quit(),
                Message::MoveDown => self.record_view_down(),
                Message::MoveUp => {
                    self.record_view.cursor_row = self.record_view.cursor_row.saturating_sub(1)
                }
                Message::MoveLeft => self.previous_record(),
                Message::MoveRight => self.next_record(),
                Message::ToggleSelect => self.toggle_record_selection(),
                Message::CopyRow => self.copy_record_row(),
                Message::Help => self.show_help(),
                Message::Resize(width, _) => self.ui_resize(width),
                Message::Exit => self.exit(),
                _ => (),
            },
            Modus::FACETS => match message {
                Message::Quit => self.quit(),
                Message::MoveDown => {
                    if self.facet_view.cursor_row + 1 < self.facet_view.entries.len() {
                        self.facet_view.cursor_row += 1;
                    }
                }
                Message::MoveUp => {
                    self.facet_view.cursor_row = self.facet_view.cursor_row.saturating_sub(1)
                }
                Message::Enter | Message::ToggleSelect => self.toggle_facet_value(),
                Message::ClearFilters => self.clear_facet_values(),
                Message::Help => self.show_help(),
                Message::Resize(width, _) => self.ui_resize(width),
                Message::Exit => self.exit(),
                _ => (),
            },
            Modus::POPUP => match message {
                Message::Quit => self.quit(),
                Message::Resize(width, _) => self.ui_resize(width),
                Message::Exit | Message::Enter => self.exit(),
                _ => (),
            },
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = message {
                    self.last_input = self.input.read(key);
                    if self.last_input.finished {
                        self.handle_cmd_input();
                    }
                }
            }
        }
        self.update_uidata();
        Ok(())
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::RECORD | Modus::FACETS => {
                self.previous_modus = self.modus;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.popup = None;
            }
            Modus::TABLE | Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup = Some(("Help".to_string(), HELP_TEXT.to_string()));
    }

    fn ui_resize(&mut self, width: usize) {
        trace!("UI was resized! w:{}->{}", self.width, width);
        self.width = width;
    }

    // --------------------------- Command input ---------------------------- //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        if self.columns.is_empty() {
            return;
        }
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.cmd_fields = match mode {
            CMDMode::Search => self.columns.clone(),
            CMDMode::FilterColumn => self.columns.get(self.cursor_column).cloned().into_iter().collect(),
        };

        // Prefill with the term that is currently active for this prompt.
        let current = self
            .view
            .predicate(&PredicateKey::Search(self.cmd_fields.clone()))
            .and_then(|p| match p {
                Predicate::Search { term, .. } => Some(term.clone()),
                Predicate::OneOf { .. } => None,
            })
            .unwrap_or_default();
        self.input.set(&current);
        self.last_input = self.input.get();
    }

    fn cancel_cmd_input(&mut self) {
        trace!("Canceling cmd input");
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        self.cmd_mode = None;
        self.cmd_fields.clear();
        self.input.clear();
        self.last_input = self.input.get();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let mode = self.cmd_mode.take();
        let fields = std::mem::take(&mut self.cmd_fields);
        if self.last_input.canceled {
            return;
        }
        match mode {
            Some(_) => {
                let term = self.last_input.input.clone();
                self.apply_predicate(Predicate::search(term, fields));
            }
            None => info!("Cmd mode is none!"),
        }
    }

    // ------------------------- Filtering & sorting ------------------------ //

    fn apply_predicate(&mut self, predicate: Predicate) {
        let start_time = Instant::now();
        let description = predicate.describe();
        let active = predicate.is_active();
        self.view.set_predicate(predicate);
        self.clamp_cursor_row();
        trace!(
            "Filtering took {}ms",
            start_time.elapsed().as_millis()
        );

        let matches = self.view.filtered_len();
        if !active {
            self.notify("Filter removed", "", NotifyKind::Info);
        } else if matches == 0 {
            self.notify(&description, "found no matches!", NotifyKind::Info);
        } else {
            self.notify(&description, &format!("{matches} matches"), NotifyKind::Info);
        }
    }

    fn clear_filters(&mut self) {
        self.view.clear_predicates();
        self.clamp_cursor_row();
        self.notify("Filters cleared", "", NotifyKind::Info);
    }

    fn sort_current_column(&mut self, direction: SortDirection) {
        let Some(field) = self.columns.get(self.cursor_column).cloned() else {
            return;
        };
        self.view.set_sort(SortDescriptor {
            field: field.clone(),
            direction,
        });
        self.notify(
            &format!("Sorted by {field} {}", direction.arrow()),
            "",
            NotifyKind::Info,
        );
    }

    fn clear_sort(&mut self) {
        self.view.clear_sort();
        self.notify("Sort cleared", "", NotifyKind::Info);
    }

    fn build_facet_view(&mut self) {
        let Some(field) = self.columns.get(self.cursor_column).cloned() else {
            return;
        };
        self.facet_view = FacetView {
            entries: self.view.facets(&field),
            field,
            cursor_row: 0,
        };
        self.previous_modus = self.modus;
        self.modus = Modus::FACETS;
    }

    fn picked_values(&self, field: &str) -> BTreeSet<String> {
        match self.view.predicate(&PredicateKey::OneOf(field.to_string())) {
            Some(Predicate::OneOf { values, .. }) => values.clone(),
            _ => BTreeSet::new(),
        }
    }

    fn toggle_facet_value(&mut self) {
        let field = self.facet_view.field.clone();
        let Some((value, _)) = self.facet_view.entries.get(self.facet_view.cursor_row).cloned()
        else {
            return;
        };
        let mut values = self.picked_values(&field);
        if !values.remove(&value) {
            values.insert(value);
        }
        self.apply_predicate(Predicate::OneOf { field, values });
    }

    fn clear_facet_values(&mut self) {
        let field = self.facet_view.field.clone();
        self.view.remove_predicate(&PredicateKey::OneOf(field));
        self.clamp_cursor_row();
    }

    // ----------------------------- Pagination ----------------------------- //

    fn change_page(&mut self, change: impl FnOnce(&mut DataView<TableRecord>)) {
        let before = self.view.page_index();
        change(&mut self.view);
        if self.view.page_index() != before {
            self.cursor_row = 0;
        }
    }

    fn cycle_page_size(&mut self) {
        let size = self.view.page_size().next();
        self.view.set_page_size(size);
        self.cursor_row = 0;
        self.notify(
            &format!("Page size {}", size.get()),
            "",
            NotifyKind::Info,
        );
    }

    fn clamp_cursor_row(&mut self) {
        let page_len = self.view.page_rows().len();
        self.cursor_row = self.cursor_row.min(page_len.saturating_sub(1));
    }

    fn move_table_selection_up(&mut self) {
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
        } else if self.view.page_index() > 0 {
            // Wrap to the bottom of the previous page
            self.view.prev_page();
            self.cursor_row = self.view.page_rows().len().saturating_sub(1);
        }
    }

    fn move_table_selection_down(&mut self) {
        let page_len = self.view.page_rows().len();
        if self.cursor_row + 1 < page_len {
            self.cursor_row += 1;
        } else if self.view.page_index() + 1 < self.view.page_count() {
            self.view.next_page();
            self.cursor_row = 0;
        }
    }

    fn move_table_selection_left(&mut self) {
        self.cursor_column = self.cursor_column.saturating_sub(1);
    }

    fn move_table_selection_right(&mut self) {
        if self.cursor_column + 1 < self.columns.len() {
            self.cursor_column += 1;
        }
    }

    // ----------------------------- Selection ------------------------------ //

    fn current_record(&self) -> Option<&TableRecord> {
        self.view
            .page_rows()
            .get(self.cursor_row)
            .map(|&ridx| &self.view.records()[ridx])
    }

    fn toggle_current_selection(&mut self) {
        if let Some(id) = self.current_record().map(|r| r.id()) {
            self.view.toggle_selection(id);
            // Space walks down the page like in a file manager
            self.move_table_selection_down();
        }
    }

    fn select_all_visible(&mut self) {
        self.view.select_all_visible();
        let selected = self.view.selected_ids().len();
        self.notify(&format!("{selected} selected"), "", NotifyKind::Info);
    }

    fn select_none(&mut self) {
        self.view.select_none();
        self.notify("Selection cleared", "", NotifyKind::Info);
    }

    // ------------------------------ Actions ------------------------------- //

    fn to_clipboard(&mut self, text: String, what: &str) {
        let result = match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(text).map_err(|e| e.to_string()),
            None => Err("clipboard not available".to_string()),
        };
        match result {
            Ok(_) => self.notify(&format!("Copied {what}"), "", NotifyKind::Success),
            Err(e) => self.notify(&format!("Copying {what} failed"), &e, NotifyKind::Error),
        }
    }

    fn row_as_csv(record: &TableRecord) -> String {
        csv_line(record.values().iter().map(|v| v.as_deref().unwrap_or("")))
    }

    fn copy_current_row(&mut self) {
        if let Some(line) = self.current_record().map(Self::row_as_csv) {
            self.to_clipboard(line, "row");
        }
    }

    fn start_export(&mut self) {
        if self.export.is_some() {
            self.notify("Export already running", "", NotifyKind::Info);
            return;
        }
        let selected = self.view.selected_records();
        let records = if selected.is_empty() {
            self.view.filtered_records()
        } else {
            selected
        };
        let job = ExportJob::new(&self.columns, &records);
        info!("Starting export of {} records", job.total());
        self.export = Some(job);
    }

    fn advance_export(&mut self) {
        let chunk = self.config.export_chunk;
        let Some(job) = self.export.as_mut() else {
            return;
        };
        job.step(chunk);
        if job.is_done()
            && let Some(job) = self.export.take()
        {
            let total = job.total();
            let csv = job.finish();
            self.to_clipboard(csv, &format!("{total} rows as csv"));
        }
    }

    // ---------------------------- Record view ----------------------------- //

    fn build_record_view(&mut self) {
        if self.current_record().is_none() {
            return;
        }
        let window_start = self.view.page_index() * self.view.page_size().get();
        self.record_view = RecordView {
            position: window_start + self.cursor_row,
            cursor_row: 0,
        };
        self.previous_modus = Modus::TABLE;
        self.modus = Modus::RECORD;
    }

    fn shown_record(&self) -> Option<&TableRecord> {
        self.view
            .rows()
            .get(self.record_view.position)
            .map(|&ridx| &self.view.records()[ridx])
    }

    fn record_view_down(&mut self) {
        if self.record_view.cursor_row + 1 < self.columns.len() {
            self.record_view.cursor_row += 1;
        }
    }

    fn previous_record(&mut self) {
        self.record_view.position = self.record_view.position.saturating_sub(1);
    }

    fn next_record(&mut self) {
        if self.record_view.position + 1 < self.view.filtered_len() {
            self.record_view.position += 1;
        }
    }

    fn toggle_record_selection(&mut self) {
        if let Some(id) = self.shown_record().map(|r| r.id()) {
            self.view.toggle_selection(id);
        }
    }

    fn copy_record_row(&mut self) {
        if let Some(line) = self.shown_record().map(Self::row_as_csv) {
            self.to_clipboard(line, "record");
        }
    }

    // ------------------------------ UI data ------------------------------- //

    fn display_cell(value: Option<&str>) -> String {
        match value {
            Some(s) => s.replace("\r\n", " ↵ ").replace('\n', " ↵ "),
            None => String::from("∅"),
        }
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    // Shift the column window so the cursor column is visible and return the
    // visible column indices.
    fn fit_columns(&mut self, widths: &[usize]) -> Vec<usize> {
        let available = self.width.saturating_sub(SELECTION_MARKER_WIDTH + 1);
        let fits_from = |offset: usize| -> Vec<usize> {
            let mut used = 0;
            let mut visible = Vec::new();
            for (cidx, &w) in widths.iter().enumerate().skip(offset) {
                if used + w + 1 > available && !visible.is_empty() {
                    break;
                }
                used += w + 1;
                visible.push(cidx);
            }
            visible
        };

        self.offset_column = self.offset_column.min(self.cursor_column);
        let mut visible = fits_from(self.offset_column);
        while !visible.contains(&self.cursor_column) && self.offset_column < self.cursor_column {
            self.offset_column += 1;
            visible = fits_from(self.offset_column);
        }
        visible
    }

    fn table_columns(&mut self) -> (Vec<ColumnView>, Vec<bool>, usize) {
        let page_rows: Vec<usize> = self.view.page_rows().to_vec();
        let max_width = self.config.max_column_width;

        let cells: Vec<Vec<String>> = (0..self.columns.len())
            .map(|cidx| {
                page_rows
                    .iter()
                    .map(|&ridx| Self::display_cell(self.view.records()[ridx].value(cidx)))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(cells.iter())
            .map(|(name, data)| {
                let data_width = data.iter().map(|s| s.chars().count()).max().unwrap_or(0);
                let header_width = name.chars().count() + 2; // Room for the sort arrow
                (std::cmp::max(header_width, data_width) + COLUMN_WIDTH_MARGIN).min(max_width)
            })
            .collect();

        let visible = self.fit_columns(&widths);
        let sort = self.view.state().sort.clone();
        let filtered: HashSet<String> = self
            .view
            .state()
            .predicates
            .iter()
            .filter_map(|p| match p {
                Predicate::OneOf { field, .. } => Some(field.clone()),
                Predicate::Search { fields, .. } if fields.len() == 1 => Some(fields[0].clone()),
                Predicate::Search { .. } => None,
            })
            .collect();

        let table = visible
            .iter()
            .map(|&cidx| {
                let name = &self.columns[cidx];
                ColumnView {
                    name: Self::get_visible_name(name, widths[cidx].saturating_sub(2)),
                    width: widths[cidx],
                    data: cells[cidx].clone(),
                    sort: sort
                        .as_ref()
                        .filter(|s| &s.field == name)
                        .map(|s| s.direction),
                    filtered: filtered.contains(name),
                }
            })
            .collect();

        let marked = page_rows
            .iter()
            .map(|&ridx| self.view.is_selected(&self.view.records()[ridx].id()))
            .collect();
        let cursor_column = visible
            .iter()
            .position(|&c| c == self.cursor_column)
            .unwrap_or(0);
        (table, marked, cursor_column)
    }

    fn footer(&self) -> String {
        format!(
            "page {}/{} · {} of {} rows · {} selected · {} per page",
            self.view.page_index() + 1,
            self.view.page_count().max(1),
            self.view.filtered_len(),
            self.view.records().len(),
            self.view.selected_ids().len(),
            self.view.page_size().get()
        )
    }

    fn base_modus(&self) -> Modus {
        match self.modus {
            Modus::POPUP | Modus::CMDINPUT => self.previous_modus,
            m => m,
        }
    }

    fn update_uidata(&mut self) {
        let (name, table, marked, cursor_row, cursor_column) = match self.base_modus() {
            Modus::RECORD => {
                let fields = self.columns.clone();
                let values: Vec<String> = match self.shown_record() {
                    Some(record) => (0..fields.len())
                        .map(|cidx| Self::display_cell(record.value(cidx)))
                        .collect(),
                    None => Vec::new(),
                };
                let selected = self.shown_record().is_some_and(|r| self.view.is_selected(&r.id()));
                let header_width = fields.iter().map(|f| f.chars().count()).max().unwrap_or(0);
                let value_width = self.width.saturating_sub(header_width + SELECTION_MARKER_WIDTH + 2);
                (
                    format!(
                        "R[{}] {}/{}{}",
                        self.name,
                        self.record_view.position + 1,
                        self.view.filtered_len(),
                        if selected { " ●" } else { "" }
                    ),
                    vec![
                        ColumnView::plain("Field", header_width, fields),
                        ColumnView::plain("Value", value_width, values),
                    ],
                    Vec::new(),
                    self.record_view.cursor_row,
                    1,
                )
            }
            Modus::FACETS => {
                let field = self.facet_view.field.clone();
                let picked = self.picked_values(&field);
                let total: usize = self.facet_view.entries.iter().map(|(_, c)| c).sum();
                let counts: Vec<String> = self
                    .facet_view
                    .entries
                    .iter()
                    .map(|(_, c)| format!("{:.0}% {}", *c as f64 * 100.0 / total.max(1) as f64, c))
                    .collect();
                let values: Vec<String> = self
                    .facet_view
                    .entries
                    .iter()
                    .map(|(v, _)| if v.is_empty() { "\"\"".to_string() } else { v.clone() })
                    .collect();
                let marked: Vec<bool> = self
                    .facet_view
                    .entries
                    .iter()
                    .map(|(v, _)| picked.contains(v))
                    .collect();
                let count_width = counts.iter().map(|s| s.chars().count()).max().unwrap_or(6);
                let value_width = self.width.saturating_sub(count_width + SELECTION_MARKER_WIDTH + 2);
                (
                    format!("V[{}] {}", self.name, field),
                    vec![
                        ColumnView::plain("Counts", count_width, counts),
                        ColumnView::plain("Values", value_width, values),
                    ],
                    marked,
                    self.facet_view.cursor_row,
                    1,
                )
            }
            _ => {
                let (table, marked, cursor_column) = self.table_columns();
                (
                    self.name.clone(),
                    table,
                    marked,
                    self.cursor_row,
                    cursor_column,
                )
            }
        };

        let (show_popup, popup_title, popup_message) = match (&self.popup, self.status) {
            (Some((title, message)), _) => (true, title.clone(), message.clone()),
            (None, Status::LOADING) if self.view.records().is_empty() => {
                (true, "Loading".to_string(), format!("Loading {} ...", self.name))
            }
            _ => (false, String::new(), String::new()),
        };

        self.uidata = UIData {
            name,
            table,
            marked,
            cursor_row,
            cursor_column,
            footer: self.footer(),
            filters: self
                .view
                .state()
                .predicates
                .iter()
                .map(Predicate::describe)
                .collect(),
            show_popup,
            popup_title,
            popup_message,
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_line.text().to_string(),
            status_kind: self.status_line.kind(),
            export_progress: self.export.as_ref().map(|job| job.percent()),
            loading: self.loader.is_loading(),
            last_update: Instant::now(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Columns;
    use crate::source::MemorySource;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::Arc;
    use std::time::Duration;

    fn staff(count: usize) -> Vec<TableRecord> {
        const TYPES: [&str; 3] = ["full-time", "part-time", "freelance"];
        let columns = Arc::new(Columns::new(["id", "name", "employment_type"]));
        (0..count)
            .map(|i| {
                TableRecord::new(
                    format!("E-{i}"),
                    Arc::clone(&columns),
                    vec![
                        Some(format!("E-{i}")),
                        Some(format!("Person {i}")),
                        Some(TYPES[i % 3].to_string()),
                    ],
                )
            })
            .collect()
    }

    fn loaded_model(count: usize) -> Model {
        let config = GridConfig::default();
        let mut model = Model::build(&config, MemorySource::new("staff", staff(count)), 120, None);
        model.reload().unwrap();
        let started = Instant::now();
        while model.status == Status::LOADING && started.elapsed() < Duration::from_secs(5) {
            model.tick();
            std::thread::sleep(Duration::from_millis(5));
        }
        model
    }

    fn type_input(model: &mut Model, text: &str) {
        for c in text.chars() {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            model.update(Message::RawKey(key)).unwrap();
        }
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        model.update(Message::RawKey(enter)).unwrap();
    }

    #[test]
    fn loads_records_from_source() {
        let model = loaded_model(25);
        assert_eq!(model.status, Status::READY);
        assert_eq!(model.view().records().len(), 25);
        assert_eq!(model.get_uidata().footer, "page 1/3 · 25 of 25 rows · 0 selected · 10 per page");
        assert_eq!(model.get_uidata().table[0].data.len(), 10);
    }

    #[test]
    fn search_prompt_filters_rows() {
        let mut model = loaded_model(25);
        model.update(Message::Search).unwrap();
        assert!(model.raw_keyevents());
        type_input(&mut model, "person 2");

        assert!(!model.raw_keyevents());
        // Person 2, Person 20 .. Person 24
        assert_eq!(model.view().filtered_len(), 6);
        assert_eq!(model.get_uidata().filters.len(), 1);
    }

    #[test]
    fn facets_pick_categorical_values() {
        let mut model = loaded_model(9);
        model.update(Message::MoveRight).unwrap();
        model.update(Message::MoveRight).unwrap();
        model.update(Message::Facets).unwrap();
        assert_eq!(model.get_uidata().table[1].data.len(), 3);

        model.update(Message::Enter).unwrap();
        assert_eq!(model.view().filtered_len(), 3);
        model.update(Message::MoveDown).unwrap();
        model.update(Message::Enter).unwrap();
        assert_eq!(model.view().filtered_len(), 6);
        assert_eq!(model.get_uidata().marked, vec![true, true, false]);

        model.update(Message::Exit).unwrap();
        model.update(Message::ClearFilters).unwrap();
        assert_eq!(model.view().filtered_len(), 9);
    }

    #[test]
    fn selection_kept_while_paging() {
        let mut model = loaded_model(25);
        model.update(Message::ToggleSelect).unwrap();
        model.update(Message::NextPage).unwrap();
        model.update(Message::SelectAllVisible).unwrap();
        model.update(Message::PrevPage).unwrap();

        assert!(model.view().is_selected(&"E-0".to_string()));
        assert!(model.get_uidata().marked[0]);
        assert_eq!(model.view().selected_ids().len(), 11);
    }

    #[test]
    fn cursor_moves_across_pages() {
        let mut model = loaded_model(12);
        for _ in 0..10 {
            model.update(Message::MoveDown).unwrap();
        }
        assert_eq!(model.view().page_index(), 1);
        model.update(Message::MoveUp).unwrap();
        assert_eq!(model.view().page_index(), 0);
        assert_eq!(model.get_uidata().cursor_row, 9);
    }

    #[test]
    fn sort_descending_on_current_column() {
        let mut model = loaded_model(3);
        model.update(Message::MoveRight).unwrap();
        model.update(Message::SortDescending).unwrap();
        assert_eq!(
            model.get_uidata().table[1].data,
            vec!["Person 2", "Person 1", "Person 0"]
        );
        assert_eq!(model.get_uidata().table[1].sort, Some(SortDirection::Descending));
    }

    #[test]
    fn export_runs_in_steps_and_reports() {
        let mut model = loaded_model(5);
        model.update(Message::ToggleSelect).unwrap();
        model.update(Message::ToggleSelect).unwrap();
        model.update(Message::Export).unwrap();
        assert_eq!(model.get_uidata().export_progress, Some(0));

        model.tick();
        assert_eq!(model.get_uidata().export_progress, None);
        // No clipboard in tests, the failure is reported to the user.
        assert_eq!(model.get_uidata().status_kind, NotifyKind::Error);
        assert!(model.get_uidata().status_message.contains("2 rows"));
    }

    #[test]
    fn failed_reload_keeps_rows() {
        struct Flaky {
            calls: std::sync::atomic::AtomicUsize,
        }
        impl RecordSource for Flaky {
            type Record = TableRecord;
            fn describe(&self) -> String {
                "flaky".into()
            }
            fn fetch(&self) -> Result<Vec<TableRecord>, GridError> {
                match self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                    0 => Ok(staff(4)),
                    _ => Err(GridError::LoadingFailed("timeout".into())),
                }
            }
        }

        let source = Flaky {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let mut model = Model::build(&GridConfig::default(), source, 120, None);
        for _ in 0..2 {
            model.reload().unwrap();
            let started = Instant::now();
            while model.status == Status::LOADING && started.elapsed() < Duration::from_secs(5) {
                model.tick();
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        assert_eq!(model.status, Status::READY);
        assert_eq!(model.view().records().len(), 4);
        assert_eq!(model.get_uidata().status_kind, NotifyKind::Error);
    }

    #[test]
    fn initial_sort_only_on_first_load() {
        let config = GridConfig::default().with_initial_sort("-name".to_string());
        let mut model = Model::build(&config, MemorySource::new("staff", staff(3)), 120, None);
        model.reload().unwrap();
        wait_loaded(&mut model);
        assert_eq!(model.view().page_ids(), vec!["E-2", "E-1", "E-0"]);

        model.update(Message::Reload).unwrap();
        wait_loaded(&mut model);
        assert!(model.view().state().sort.is_none());
        assert_eq!(model.view().page_ids(), vec!["E-0", "E-1", "E-2"]);
    }

    // Hands out one batch per fetch, repeating the last one.
    struct BatchSequence {
        calls: std::sync::atomic::AtomicUsize,
        batches: Vec<(Vec<String>, Vec<TableRecord>)>,
    }

    impl BatchSequence {
        fn new(batches: Vec<(Vec<String>, Vec<TableRecord>)>) -> Self {
            BatchSequence {
                calls: std::sync::atomic::AtomicUsize::new(0),
                batches,
            }
        }
    }

    impl RecordSource for BatchSequence {
        type Record = TableRecord;
        fn describe(&self) -> String {
            "sequence".into()
        }
        fn fetch(&self) -> Result<Vec<TableRecord>, GridError> {
            self.fetch_batch().map(|batch| batch.records)
        }
        fn fetch_batch(&self) -> Result<RecordBatch<TableRecord>, GridError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let (fields, records) = &self.batches[call.min(self.batches.len() - 1)];
            Ok(RecordBatch {
                fields: fields.clone(),
                records: records.clone(),
            })
        }
    }

    fn wait_loaded(model: &mut Model) {
        let started = Instant::now();
        while model.status == Status::LOADING && started.elapsed() < Duration::from_secs(5) {
            model.tick();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn key(code: KeyCode) -> Message {
        Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn reload_cancels_open_filter_prompt() {
        let source = BatchSequence::new(vec![(Vec::new(), staff(4)), (Vec::new(), Vec::new())]);
        let mut model = Model::build(&GridConfig::default(), source, 120, None);
        model.reload().unwrap();
        wait_loaded(&mut model);

        model.update(Message::Reload).unwrap();
        model.update(Message::FilterColumn).unwrap();
        assert!(model.raw_keyevents());
        wait_loaded(&mut model);

        assert_eq!(model.status, Status::EMPTY);
        assert!(!model.raw_keyevents());
        assert!(!model.get_uidata().active_cmdinput);
        model.update(key(KeyCode::Char('a'))).unwrap();
        model.update(key(KeyCode::Enter)).unwrap();
        assert!(model.view().state().predicates.is_empty());
    }

    #[test]
    fn reload_under_help_over_facets_returns_to_table() {
        let narrow = Arc::new(Columns::new(["id"]));
        let narrow_rows = (0..2)
            .map(|i| TableRecord::new(format!("N-{i}"), Arc::clone(&narrow), vec![Some(format!("N-{i}"))]))
            .collect();
        let source = BatchSequence::new(vec![(Vec::new(), staff(4)), (Vec::new(), narrow_rows)]);
        let mut model = Model::build(&GridConfig::default(), source, 120, None);
        model.reload().unwrap();
        wait_loaded(&mut model);

        model.update(Message::MoveRight).unwrap();
        model.update(Message::MoveRight).unwrap();
        model.update(Message::Facets).unwrap();
        model.update(Message::Help).unwrap();
        model.reload().unwrap();
        wait_loaded(&mut model);
        assert!(model.get_uidata().show_popup);

        model.update(Message::Exit).unwrap();
        assert!(!model.get_uidata().show_popup);
        assert_eq!(model.get_uidata().name, "sequence");
        assert_eq!(model.get_uidata().table.len(), 1);
    }

    #[test]
    fn filter_prompt_keeps_its_column() {
        let mut model = loaded_model(12);
        model.update(Message::MoveRight).unwrap();
        model.update(Message::FilterColumn).unwrap();
        model.update(Message::MoveLeft).unwrap();
        type_input(&mut model, "person 1");

        let name_search = PredicateKey::Search(vec!["name".to_string()]);
        assert!(model.view().predicate(&name_search).is_some());
        // Person 1, Person 10, Person 11
        assert_eq!(model.view().filtered_len(), 3);
    }

    #[test]
    fn header_only_store_keeps_columns() {
        let source = MemorySource::<TableRecord>::new("empty", Vec::new())
            .with_fields(["employee_id", "name"]);
        let mut model = Model::build(&GridConfig::default(), source, 120, None);
        model.reload().unwrap();
        wait_loaded(&mut model);

        assert_eq!(model.status, Status::EMPTY);
        let names: Vec<&str> = model.get_uidata().table.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["employee_id", "name"]);
    }
}

use std::fmt;
use std::io::Error;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

use crate::pagination::PageSize;

// Crate wide error type. Every fallible operation returns `Result<_, GridError>`.
#[derive(Debug)]
pub enum GridError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    InvalidPageSize(usize),
    UnknownColumn(String),
    DuplicateId(String),
    PathExpansion(String),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::IoError(e) => write!(f, "io error: {e}"),
            GridError::PolarsError(e) => write!(f, "could not read table: {e}"),
            GridError::LoadingFailed(reason) => write!(f, "loading failed: {reason}"),
            GridError::FileNotFound => write!(f, "file not found"),
            GridError::PermissionDenied => write!(f, "permission denied"),
            GridError::UnknownFileType => {
                write!(f, "unknown file type (expected csv, parquet or arrow)")
            }
            GridError::InvalidPageSize(size) => write!(
                f,
                "invalid page size {size}, allowed are {:?}",
                PageSize::ALLOWED
            ),
            GridError::UnknownColumn(name) => write!(f, "unknown column \"{name}\""),
            GridError::DuplicateId(id) => write!(f, "duplicate record id \"{id}\""),
            GridError::PathExpansion(reason) => write!(f, "could not expand path: {reason}"),
        }
    }
}

impl std::error::Error for GridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GridError::IoError(e) => Some(e),
            GridError::PolarsError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for GridError {
    fn from(err: Error) -> Self {
        GridError::IoError(err)
    }
}

impl From<PolarsError> for GridError {
    fn from(err: PolarsError) -> Self {
        GridError::PolarsError(err)
    }
}

/// Runtime configuration of the viewer, built from the command line.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct GridConfig {
    /// Poll timeout for terminal events in milliseconds.
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub page_size: PageSize,
    /// Rows serialized per UI tick while exporting.
    pub export_chunk: usize,
    #[setters(strip_option)]
    pub initial_sort: Option<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            event_poll_time: 100,
            max_column_width: 24,
            page_size: PageSize::default(),
            export_chunk: 200,
            initial_sort: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    FilterColumn,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Search => "/",
            CMDMode::FilterColumn => "filter: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Exit,
    Enter,
    Help,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    CyclePageSize,
    SortAscending,
    SortDescending,
    ClearSort,
    Search,
    FilterColumn,
    Facets,
    ClearFilters,
    ToggleSelect,
    SelectAllVisible,
    SelectNone,
    CopyRow,
    Export,
    Reload,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
 Navigation
   j/k, Up/Down     move row cursor
   h/l, Left/Right  move column cursor
   n/p, PgDn/PgUp   next / previous page
   g/G              first / last page
   z                cycle page size (10, 25, 50, 100)

 Sorting & filtering
   s / S            sort current column ascending / descending
   o                clear sort
   /                search all columns
   f                filter current column by text
   v                value facets of current column (Enter toggles a value)
   c                clear all filters

 Selection & actions
   Space            toggle selection of current row
   a / A            select all visible / select none
   Enter            show record
   y                copy row to clipboard
   e                export selected (or filtered) rows to clipboard as csv
   r                reload

   ?                help      Esc  back      q  quit
";

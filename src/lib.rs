//! hrview: a paged, filterable and sortable terminal viewer for HR record tables.
//!
//! The data view engine (`filter`, `sort`, `pagination`, `selection`, `view`)
//! works on any type implementing [`record::Record`]. The terminal front end
//! (`model`, `controller`, `ui`) drives it for tables loaded by [`table::FileSource`].

pub mod controller;
pub mod domain;
pub mod export;
pub mod filter;
pub mod inputter;
pub mod model;
pub mod notify;
pub mod pagination;
pub mod record;
pub mod selection;
pub mod sort;
pub mod source;
pub mod table;
pub mod ui;
pub mod view;

pub use domain::{GridConfig, GridError};
pub use filter::{Predicate, PredicateKey};
pub use pagination::{PageSize, PageWindow};
pub use record::{Record, TableRecord};
pub use selection::SelectionSet;
pub use sort::{SortDescriptor, SortDirection};
pub use source::{Loader, MemorySource, RecordBatch, RecordSource};
pub use table::FileSource;
pub use view::{DataView, ViewState};

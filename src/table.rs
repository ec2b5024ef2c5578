use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::domain::GridError;
use crate::record::{Columns, TableRecord};
use crate::source::{RecordBatch, RecordSource};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    ARROW,
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// Loads an exported HR table (csv, parquet or arrow ipc) into `TableRecord`s.
///
/// The record id is read from `id_column` when given, otherwise the 1-based
/// row number is used.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    id_column: Option<String>,
}

impl FileSource {
    pub fn new(path: PathBuf, id_column: Option<String>) -> Self {
        Self { path, id_column }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails early if the file is missing, unreadable or of an unknown type.
    pub fn check(&self) -> Result<(), GridError> {
        Self::get_file_info(&self.path).map(|info| {
            debug!("{:?} file of {} bytes", info.file_type, info.file_size);
        })
    }

    pub fn load(&self) -> Result<Vec<TableRecord>, GridError> {
        self.load_batch().map(|batch| batch.records)
    }

    /// Records plus the header names, which survive a file without rows.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_batch(&self) -> Result<RecordBatch<TableRecord>, GridError> {
        let file_info = Self::get_file_info(&self.path)?;
        let frame = match file_info.file_type {
            FileType::CSV => Self::load_csv(&file_info.path)?,
            FileType::PARQUET => Self::load_parquet(&file_info.path)?,
            FileType::ARROW => Self::load_arrow(&file_info.path)?,
        };

        let start_time = Instant::now();
        let df = frame.collect()?;
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        // Every column is converted to strings on its own rayon worker.
        let cells: Vec<Vec<Option<String>>> = names
            .par_iter()
            .map(|name| Self::load_column(&df, name))
            .collect::<Result<_, PolarsError>>()?;

        let columns = Arc::new(Columns::new(names.clone()));
        let ids = self.record_ids(&columns, &cells, df.height())?;

        let records: Vec<TableRecord> = ids
            .into_par_iter()
            .enumerate()
            .map(|(row, id)| {
                let values = cells.iter().map(|column| column[row].clone()).collect();
                TableRecord::new(id, Arc::clone(&columns), values)
            })
            .collect();

        info!(
            "Loaded {} records with {} columns ({} bytes) in {}ms",
            records.len(),
            columns.len(),
            file_info.file_size,
            start_time.elapsed().as_millis()
        );
        Ok(RecordBatch {
            fields: names,
            records,
        })
    }

    fn record_ids(
        &self,
        columns: &Columns,
        cells: &[Vec<Option<String>>],
        nrows: usize,
    ) -> Result<Vec<String>, GridError> {
        let ids: Vec<String> = match &self.id_column {
            None => (1..=nrows).map(|n| n.to_string()).collect(),
            Some(name) => {
                let idx = columns
                    .position(name)
                    .ok_or_else(|| GridError::UnknownColumn(name.clone()))?;
                cells[idx]
                    .iter()
                    .enumerate()
                    .map(|(row, value)| match value.as_deref() {
                        Some(id) if !id.is_empty() => Ok(id.to_string()),
                        _ => Err(GridError::LoadingFailed(format!(
                            "row {} has no value in id column \"{}\"",
                            row + 1,
                            name
                        ))),
                    })
                    .collect::<Result<_, _>>()?
            }
        };

        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids.iter() {
            if !seen.insert(id.as_str()) {
                return Err(GridError::DuplicateId(id.clone()));
            }
        }
        debug!("Resolved {} unique record ids", ids.len());
        Ok(ids)
    }

    fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Option<String>>, PolarsError> {
        let col = df.column(col_name)?.cast(&DataType::String)?;
        let series = col.str()?;
        Ok(series
            .into_iter()
            .map(|value| value.map(|s| s.to_string()))
            .collect())
    }

    fn detect_file_type(path: &Path) -> Result<FileType, GridError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
            Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
            _ => Err(GridError::UnknownFileType),
        }
    }

    fn get_file_info(path: &Path) -> Result<FileInfo, GridError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GridError::FileNotFound,
            ErrorKind::PermissionDenied => GridError::PermissionDenied,
            _ => GridError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(GridError::LoadingFailed("Not a file!".into()));
        }

        Ok(FileInfo {
            path: path.to_path_buf(),
            file_size: metadata.len(),
            file_type: Self::detect_file_type(path)?,
        })
    }

    fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .finish()
    }

    fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
    }

    fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_ipc(
            PlPath::Local(path.into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )
    }
}

impl RecordSource for FileSource {
    type Record = TableRecord;

    fn describe(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string()
    }

    fn fetch(&self) -> Result<Vec<TableRecord>, GridError> {
        self.load()
    }

    fn fetch_batch(&self) -> Result<RecordBatch<TableRecord>, GridError> {
        self.load_batch()
    }
}

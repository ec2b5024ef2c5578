use tracing::trace;

use crate::record::Record;

/// Quote a cell for csv output if needed.
pub fn wrap_cell_content(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c
        .chars()
        .any(|c| c == ' ' || c == '\t' || c == ',' || c == '\n' || c == '\r');
    let mut out = String::from(c);

    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_escaping || needs_wrapping {
        out = format!("\"{out}\"");
    }
    out
}

pub fn csv_line<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells
        .into_iter()
        .map(wrap_cell_content)
        .collect::<Vec<String>>()
        .join(",")
}

/// Incremental csv export of a set of records.
///
/// The cells are captured when the job is created, later changes to the view
/// do not affect it. `step` writes a chunk of rows and reports progress in
/// percent, so the UI can advance it once per tick and show a progress bar.
#[derive(Debug)]
pub struct ExportJob {
    rows: Vec<Vec<String>>,
    written: usize,
    output: String,
}

impl ExportJob {
    pub fn new<R: Record>(columns: &[String], records: &[&R]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.field(c).map(|v| v.into_owned()).unwrap_or_default())
                    .collect()
            })
            .collect();
        let mut output = csv_line(columns.iter().map(String::as_str));
        output.push('\n');
        ExportJob {
            rows,
            written: 0,
            output,
        }
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn percent(&self) -> u8 {
        if self.rows.is_empty() {
            100
        } else {
            (self.written * 100 / self.rows.len()) as u8
        }
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.rows.len()
    }

    /// Serialize up to `chunk` more rows.
    pub fn step(&mut self, chunk: usize) -> u8 {
        let end = (self.written + chunk.max(1)).min(self.rows.len());
        for row in &self.rows[self.written..end] {
            self.output.push_str(&csv_line(row.iter().map(String::as_str)));
            self.output.push('\n');
        }
        self.written = end;
        trace!("Export progress {}/{}", self.written, self.rows.len());
        self.percent()
    }

    /// The csv text, running any remaining steps first.
    pub fn finish(mut self) -> String {
        if !self.is_done() {
            let remaining = self.rows.len() - self.written;
            self.step(remaining);
        }
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{Person, person};

    #[test]
    fn wraps_and_escapes_cells() {
        assert_eq!(wrap_cell_content("plain"), "plain");
        assert_eq!(wrap_cell_content("John Doe"), "\"John Doe\"");
        assert_eq!(wrap_cell_content("a,b"), "\"a,b\"");
        assert_eq!(wrap_cell_content("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn progress_advances_per_chunk() {
        let records: Vec<Person> = (0..4).map(|i| person(i, "x", "full-time")).collect();
        let refs: Vec<&Person> = records.iter().collect();
        let columns = vec!["id".to_string(), "type".to_string()];

        let mut job = ExportJob::new(&columns, &refs);
        assert_eq!(job.percent(), 0);
        assert_eq!(job.step(2), 50);
        assert!(!job.is_done());
        assert_eq!(job.step(2), 100);
        assert!(job.is_done());

        let csv = job.finish();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,type");
        assert_eq!(lines[1], "0,full-time");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn empty_export_is_complete() {
        let job = ExportJob::new::<Person>(&["name".to_string()], &[]);
        assert_eq!(job.percent(), 100);
        assert_eq!(job.finish(), "name\n");
    }
}

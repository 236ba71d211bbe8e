//! Reading a merged dataset back into memory

use crate::errors::Result;
use crate::merge::{MergeReport, DELIMITER};
use csv::{Reader, ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::{Path, PathBuf};

/// The single `;`-delimited CSV produced by a dataset build
#[derive(Debug, Clone)]
pub struct MergedDataset {
    path: PathBuf,
    report: MergeReport,
    artifacts: Vec<PathBuf>,
}

impl MergedDataset {
    pub fn new(path: PathBuf, report: MergeReport, artifacts: Vec<PathBuf>) -> Self {
        Self {
            path,
            report,
            artifacts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn report(&self) -> &MergeReport {
        &self.report
    }

    /// Extracted CSV files that fed the merge
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Load every row
    pub fn read_table(&self) -> Result<Table> {
        let mut reader = open_reader(&self.path)?;
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Table { headers, rows })
    }

    /// Stream rows in batches of `batch_rows`
    pub fn batches(&self, batch_rows: usize) -> Result<RowBatches> {
        let mut reader = open_reader(&self.path)?;
        let headers = reader.headers()?.clone();
        Ok(RowBatches {
            reader,
            headers,
            batch_rows: batch_rows.max(1),
            done: false,
        })
    }
}

fn open_reader(path: &Path) -> Result<Reader<File>> {
    Ok(ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_path(path)?)
}

/// In-memory table with a header row
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of one column, `None` if the column is absent
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).unwrap_or(""))
                .collect(),
        )
    }
}

/// Lazy, finite sequence of row batches. Consumed once.
pub struct RowBatches {
    reader: Reader<File>,
    headers: StringRecord,
    batch_rows: usize,
    done: bool,
}

impl RowBatches {
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }
}

impl Iterator for RowBatches {
    type Item = Result<Vec<StringRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_rows.min(8192));
        let mut record = StringRecord::new();
        while batch.len() < self.batch_rows {
            match self.reader.read_record(&mut record) {
                Ok(true) => batch.push(record.clone()),
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

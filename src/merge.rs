//! Streaming concatenation of large `;`-delimited CSV files

use crate::config::DEFAULT_CHUNK_ROWS;
use crate::errors::{AnsError, Result};
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DELIMITER: u8 = b';';

/// Outcome of a merge run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub files_merged: usize,
    pub files_skipped: Vec<PathBuf>,
    pub rows_written: u64,
    pub rows_skipped: u64,
}

/// Concatenates CSV files in bounded-memory batches of `chunk_rows` rows.
///
/// The header of the first readable file is written once. Malformed rows
/// are dropped; a file that cannot be read is dropped in full, including
/// any rows already written from it.
#[derive(Debug, Clone)]
pub struct CsvMerger {
    chunk_rows: usize,
    delimiter: u8,
}

impl Default for CsvMerger {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_ROWS)
    }
}

enum FileError {
    Skip(String),
    Fatal(AnsError),
}

impl From<csv::Error> for FileError {
    fn from(err: csv::Error) -> Self {
        FileError::Skip(err.to_string())
    }
}

struct FileStats {
    rows: u64,
    skipped: u64,
}

type OutputWriter = Writer<BufWriter<File>>;

impl CsvMerger {
    pub fn new(chunk_rows: usize) -> Self {
        Self {
            chunk_rows: chunk_rows.max(1),
            delimiter: DELIMITER,
        }
    }

    /// Merge `inputs`, in order, into `output`.
    ///
    /// Only failures on the output file are returned as errors. Blocking;
    /// async callers run it on the blocking pool.
    pub fn merge<P: AsRef<Path>>(&self, inputs: &[P], output: &Path) -> Result<MergeReport> {
        let sources = inputs.iter().map(|input| {
            let input = input.as_ref();
            (input.to_path_buf(), File::open(input))
        });
        self.merge_sources(sources, output)
    }

    fn merge_sources<R, I>(&self, sources: I, output: &Path) -> Result<MergeReport>
    where
        R: Read,
        I: IntoIterator<Item = (PathBuf, io::Result<R>)>,
    {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(output)?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            // header agreement is checked per file; a rolled-back file may reset it
            .flexible(true)
            .from_writer(BufWriter::new(file));

        let mut report = MergeReport {
            output: output.to_path_buf(),
            ..MergeReport::default()
        };
        let mut header: Option<StringRecord> = None;

        for (input, source) in sources {
            writer.flush()?;
            let checkpoint = writer.get_ref().get_ref().metadata()?.len();
            let header_before = header.is_some();

            match self.append_source(&input, source, &mut writer, &mut header) {
                Ok(stats) => {
                    info!(
                        "Merged {} ({} rows, {} malformed rows skipped)",
                        input.display(),
                        stats.rows,
                        stats.skipped
                    );
                    report.files_merged += 1;
                    report.rows_written += stats.rows;
                    report.rows_skipped += stats.skipped;
                }
                Err(FileError::Skip(reason)) => {
                    warn!("Skipping {} due to error: {}", input.display(), reason);
                    rollback(&mut writer, checkpoint)?;
                    if !header_before {
                        header = None;
                    }
                    report.files_skipped.push(input);
                }
                Err(FileError::Fatal(err)) => return Err(err),
            }
        }

        writer.flush()?;
        info!(
            "Merged {} files into {} ({} rows, {} files skipped)",
            report.files_merged,
            output.display(),
            report.rows_written,
            report.files_skipped.len()
        );
        Ok(report)
    }

    fn append_source<R: Read>(
        &self,
        input: &Path,
        source: io::Result<R>,
        writer: &mut OutputWriter,
        header: &mut Option<StringRecord>,
    ) -> std::result::Result<FileStats, FileError> {
        let source = source.map_err(|e| FileError::Skip(e.to_string()))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(source);

        let file_header = reader.headers()?.clone();
        if file_header.is_empty() {
            return Err(FileError::Skip("file has no header row".to_string()));
        }

        if let Some(existing) = header.as_ref() {
            if *existing != file_header {
                return Err(FileError::Skip(format!(
                    "header {:?} does not match {:?}",
                    file_header, existing
                )));
            }
        }
        if header.is_none() {
            writer.write_record(&file_header).map_err(fatal)?;
            *header = Some(file_header);
        }

        let mut stats = FileStats {
            rows: 0,
            skipped: 0,
        };
        let mut batch: Vec<StringRecord> = Vec::with_capacity(self.chunk_rows.min(8192));

        for result in reader.records() {
            match result {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= self.chunk_rows {
                        stats.rows += write_batch(writer, &mut batch)?;
                    }
                }
                Err(err) if is_row_error(&err) => {
                    debug!("Skipping malformed row in {}: {}", input.display(), err);
                    stats.skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        stats.rows += write_batch(writer, &mut batch)?;

        if stats.skipped > 0 {
            warn!(
                "Skipped {} malformed rows in {}",
                stats.skipped,
                input.display()
            );
        }
        Ok(stats)
    }
}

fn write_batch(
    writer: &mut OutputWriter,
    batch: &mut Vec<StringRecord>,
) -> std::result::Result<u64, FileError> {
    let count = batch.len() as u64;
    for record in batch.drain(..) {
        writer.write_record(&record).map_err(fatal)?;
    }
    Ok(count)
}

fn fatal(err: csv::Error) -> FileError {
    FileError::Fatal(err.into())
}

fn is_row_error(err: &csv::Error) -> bool {
    matches!(
        err.kind(),
        csv::ErrorKind::UnequalLengths { .. } | csv::ErrorKind::Utf8 { .. }
    )
}

/// Drop everything written after `checkpoint`
fn rollback(writer: &mut OutputWriter, checkpoint: u64) -> Result<()> {
    writer.flush()?;
    let mut file = writer.get_ref().get_ref();
    file.set_len(checkpoint)?;
    file.seek(SeekFrom::Start(checkpoint))?;
    Ok(())
}

/// Convenience wrapper around [`CsvMerger::merge`]
pub fn concat_csv_files<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    chunk_rows: usize,
) -> Result<MergeReport> {
    CsvMerger::new(chunk_rows).merge(inputs, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_csv;
    use tempfile::TempDir;

    const HEADER: &str = "ID;NAME";

    fn csv_of(rows: &[&str]) -> String {
        let mut s = format!("{}\n", HEADER);
        for row in rows {
            s.push_str(row);
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_merge_preserves_order_with_single_header() {
        let dir = TempDir::new().unwrap();
        let a = write_csv(dir.path(), "A.csv", &csv_of(&["1;one", "2;two"]));
        let b = write_csv(dir.path(), "B.csv", &csv_of(&["3;three", "4;four"]));
        let out = dir.path().join("merged.csv");

        let report = CsvMerger::new(1).merge(&[a, b], &out).unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "ID;NAME\n1;one\n2;two\n3;three\n4;four\n"
        );
        assert_eq!(report.files_merged, 2);
        assert_eq!(report.rows_written, 4);
        assert!(report.files_skipped.is_empty());
    }

    #[test]
    fn test_merge_skips_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let a = write_csv(dir.path(), "A.csv", &csv_of(&["1;one", "2;two"]));
        let b = dir.path().join("B.csv");
        let c = write_csv(dir.path(), "C.csv", &csv_of(&["5;five"]));
        let out = dir.path().join("merged.csv");

        let report = CsvMerger::default()
            .merge(&[a, b.clone(), c], &out)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "ID;NAME\n1;one\n2;two\n5;five\n"
        );
        assert_eq!(report.files_skipped, vec![b]);
        assert_eq!(report.rows_written, 3);
    }

    #[test]
    fn test_merge_skips_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let a = write_csv(dir.path(), "A.csv", &csv_of(&["1;one", "2;two"]));
        let b = dir.path().join("B.csv");
        std::fs::write(&b, b"\xff\xfe\xfd garbage\n\x80\x81;\x00\n").unwrap();
        let c = write_csv(dir.path(), "C.csv", &csv_of(&["3;three"]));
        let d = dir.path().join("a_directory");
        std::fs::create_dir(&d).unwrap();
        let out = dir.path().join("merged.csv");

        let report = CsvMerger::default()
            .merge(&[&a, &b, &d, &c], &out)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "ID;NAME\n1;one\n2;two\n3;three\n"
        );
        assert_eq!(report.files_skipped, vec![b, d]);
        assert_eq!(report.files_merged, 2);
    }

    #[test]
    fn test_rollback_discards_partial_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("merged.csv");
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_writer(BufWriter::new(File::create(&out).unwrap()));

        writer.write_record(["ID", "NAME"]).unwrap();
        writer.flush().unwrap();
        let checkpoint = writer.get_ref().get_ref().metadata().unwrap().len();

        writer.write_record(["2", "partial"]).unwrap();
        rollback(&mut writer, checkpoint).unwrap();
        writer.write_record(["3", "kept"]).unwrap();
        writer.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "ID;NAME\n3;kept\n"
        );
    }

    /// Yields `data`, then fails instead of reporting end of file
    struct CutOff(std::io::Cursor<Vec<u8>>);

    impl Read for CutOff {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection cut")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_merge_file_failing_after_header_is_dropped_with_its_header() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("merged.csv");
        let sources: Vec<(PathBuf, io::Result<Box<dyn Read>>)> = vec![
            (
                PathBuf::from("cut.csv"),
                Ok(Box::new(CutOff(std::io::Cursor::new(
                    csv_of(&["1;one", "2;two"]).into_bytes(),
                ))) as Box<dyn Read>),
            ),
            (
                PathBuf::from("other.csv"),
                Ok(Box::new("CODE;VALUE\nx;y\n".as_bytes()) as Box<dyn Read>),
            ),
        ];

        let report = CsvMerger::new(1).merge_sources(sources, &out).unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "CODE;VALUE\nx;y\n"
        );
        assert_eq!(report.files_skipped, vec![PathBuf::from("cut.csv")]);
        assert_eq!(report.files_merged, 1);
        assert_eq!(report.rows_written, 1);
    }

    #[test]
    fn test_merge_skips_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let a = write_csv(
            dir.path(),
            "A.csv",
            "ID;NAME\n1;one\n2;two;extra\n3\n4;\"quoted;value\"\n",
        );
        let out = dir.path().join("merged.csv");

        let report = CsvMerger::default().merge(&[a], &out).unwrap();

        assert_eq!(report.rows_written, 2);
        assert_eq!(report.rows_skipped, 2);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "ID;NAME\n1;one\n4;\"quoted;value\"\n"
        );
    }

    #[test]
    fn test_merge_header_mismatch_skips_file() {
        let dir = TempDir::new().unwrap();
        let a = write_csv(dir.path(), "A.csv", &csv_of(&["1;one"]));
        let b = write_csv(dir.path(), "B.csv", "OTHER;COLUMNS\nx;y\n");
        let out = dir.path().join("merged.csv");

        let report = CsvMerger::default().merge(&[&a, &b], &out).unwrap();
        assert_eq!(report.files_skipped, vec![b.clone()]);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ID;NAME\n1;one\n");
    }

    #[test]
    fn test_merge_header_taken_from_first_readable_file() {
        let dir = TempDir::new().unwrap();
        let empty = write_csv(dir.path(), "empty.csv", "");
        let a = write_csv(dir.path(), "A.csv", &csv_of(&["1;one"]));
        let out = dir.path().join("nested").join("merged.csv");

        let report = concat_csv_files(&[&empty, &a], &out, 10).unwrap();
        assert_eq!(report.files_skipped, vec![empty.clone()]);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ID;NAME\n1;one\n");
    }

    #[test]
    fn test_merge_of_nothing_is_empty_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("merged.csv");
        let inputs: Vec<PathBuf> = Vec::new();
        let report = CsvMerger::default().merge(&inputs, &out).unwrap();
        assert_eq!(report.rows_written, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
    }
}

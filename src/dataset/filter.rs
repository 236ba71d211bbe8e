//! Post-merge filter of financial statements by registration code

use crate::errors::{AnsError, Result};
use crate::merge::DELIMITER;
use crate::models::RegistrationCode;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub rows_scanned: u64,
    pub rows_kept: u64,
}

/// Keep only rows whose `column` holds one of `codes`, rewriting `dataset` in place.
///
/// The file is read twice: once to check that every requested code occurs,
/// then again to write the matching rows to a sibling file that replaces the
/// original. Only the requested codes are tracked, so memory stays bounded.
pub fn filter_by_registration(
    dataset: &Path,
    column: &str,
    codes: &BTreeSet<RegistrationCode>,
) -> Result<FilterReport> {
    let index = column_index(dataset, column)?;

    let mut seen = BTreeSet::new();
    let mut rows_scanned = 0u64;
    let mut reader = open(dataset)?;
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        rows_scanned += 1;
        if let Some(code) = code_at(&record, index) {
            if codes.contains(&code) {
                seen.insert(code);
            }
        }
    }

    let missing: Vec<RegistrationCode> = codes.difference(&seen).copied().collect();
    if !missing.is_empty() {
        return Err(AnsError::UnknownRegistrationCodes(missing));
    }

    let staging = staging_path(dataset);
    let rows_kept = match rewrite(dataset, &staging, index, codes) {
        Ok(kept) => kept,
        Err(e) => {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
    };
    std::fs::rename(&staging, dataset)?;

    info!(
        "Filtered {} to {} of {} rows for {} registration codes",
        dataset.display(),
        rows_kept,
        rows_scanned,
        codes.len()
    );

    Ok(FilterReport {
        rows_scanned,
        rows_kept,
    })
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(ReaderBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .from_path(path)?)
}

fn column_index(dataset: &Path, column: &str) -> Result<usize> {
    let mut reader = open(dataset)?;
    let headers = reader.headers()?;
    debug!("Dataset columns: {:?}", headers);
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| AnsError::MissingIdentifierColumn(column.to_string()))
}

fn code_at(record: &StringRecord, index: usize) -> Option<RegistrationCode> {
    record.get(index)?.trim().parse().ok()
}

fn staging_path(dataset: &Path) -> PathBuf {
    let mut name = dataset.file_name().unwrap_or_default().to_os_string();
    name.push(".filtering");
    dataset.with_file_name(name)
}

fn rewrite(
    source: &Path,
    target: &Path,
    index: usize,
    codes: &BTreeSet<RegistrationCode>,
) -> Result<u64> {
    let mut reader = open(source)?;
    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .from_path(target)?;

    writer.write_record(reader.headers()?)?;

    let mut kept = 0u64;
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        if code_at(&record, index).is_some_and(|code| codes.contains(&code)) {
            writer.write_record(&record)?;
            kept += 1;
        }
    }
    writer.flush()?;
    Ok(kept)
}

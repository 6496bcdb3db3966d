//! Candidate list ingestion.
//!
//! The candidate list is a header-less CSV in the shape of the public
//! top-sites rankings: `rank,domain` per row. Rows are read top to bottom.

use crate::error::ScanError;
use crate::utils::validate_key;
use std::io::Read;
use std::path::Path;

/// Keys read from a candidate list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList {
    /// Keys in file order, trimmed
    pub keys: Vec<String>,
    /// Rows dropped for a missing or invalid field
    pub skipped: usize,
}

/// Read candidate keys from the CSV file at `path`.
///
/// `column` is the zero-based field holding the domain. `limit` truncates
/// the list after that many keys.
///
/// # Errors
///
/// Returns `ScanError::Input` if the file cannot be opened or read, or if no
/// usable key is found.
pub fn read_candidates<P: AsRef<Path>>(
    path: P,
    column: usize,
    limit: Option<usize>,
) -> Result<CandidateList, ScanError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| ScanError::input(path.display().to_string(), e.to_string()))?;

    parse_candidates(file, column, limit)
        .map_err(|e| match e {
            ScanError::Input { message, .. } => ScanError::input(path.display().to_string(), message),
            other => other,
        })
}

/// Parse candidate keys from any CSV reader.
pub fn parse_candidates<R: Read>(
    reader: R,
    column: usize,
    limit: Option<usize>,
) -> Result<CandidateList, ScanError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut list = CandidateList::default();
    let mut invalid_rows = Vec::new();

    for (row, record) in csv_reader.records().enumerate() {
        if limit.is_some_and(|limit| list.keys.len() >= limit) {
            break;
        }

        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                list.skipped += 1;
                invalid_rows.push(format!("row {}: {}", row + 1, e));
                continue;
            }
        };

        let Some(field) = record.get(column).map(str::trim) else {
            list.skipped += 1;
            invalid_rows.push(format!("row {}: missing column {}", row + 1, column));
            continue;
        };

        if let Err(e) = validate_key(field) {
            list.skipped += 1;
            invalid_rows.push(format!("row {}: {}", row + 1, e));
            continue;
        }

        list.keys.push(field.to_string());
    }

    if !invalid_rows.is_empty() {
        tracing::warn!(
            skipped = list.skipped,
            first = ?&invalid_rows[..invalid_rows.len().min(5)],
            "skipped invalid candidate rows"
        );
    }

    if list.keys.is_empty() {
        return Err(ScanError::input("<csv>", "No candidate domains found"));
    }

    Ok(list)
}

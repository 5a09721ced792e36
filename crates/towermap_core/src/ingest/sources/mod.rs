//! Per-dataset source adapters.
//!
//! # Responsibility
//! - Turn each supported external dataset into canonical candidates.
//! - Keep every source-specific heuristic (column names, operator and
//!   service classification, provider labels) as declarative rule data
//!   inside the adapter, never as branches in the matcher.

pub mod agcom;
pub mod aria_veneto;
pub mod arpa_fvg;
pub mod arpat_toscana;
pub mod lte_italy;

use crate::ingest::IngestResult;
use csv::StringRecord;
use std::fs::File;
use std::path::Path;

/// Opens a headered CSV reader. Fields are trimmed and ragged rows are
/// tolerated; per-row problems stay row-local.
pub(crate) fn open_csv_reader(path: &Path) -> IngestResult<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    Ok(reader)
}

/// Looks up a record value by header name, returning `None` for missing
/// columns and empty cells. A UTF-8 BOM on the first header is ignored.
pub(crate) fn field<'rec>(
    headers: &StringRecord,
    record: &'rec StringRecord,
    name: &str,
) -> Option<&'rec str> {
    let index = headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}') == name)?;
    record
        .get(index)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

//! Data-import pipeline: upload -> parse -> per-row validation -> commit.
//!
//! Parsing and validation are pure so the preview and commit endpoints run
//! the exact same pipeline over the same bytes.

pub mod parse;
pub mod validate;

pub use parse::{ImportError, ImportFormat, ParsedSheet};
pub use validate::{ImportKind, ImportReport, RowIssue, ValidRow, validate_sheet};

/// Runs the full pipeline: raw bytes to a report plus the typed valid rows.
pub fn run(
    kind: ImportKind,
    format: ImportFormat,
    bytes: &[u8],
) -> Result<(ImportReport, Vec<ValidRow>), ImportError> {
    let sheet = parse::parse(format, bytes)?;
    Ok(validate_sheet(kind, &sheet))
}

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::app_error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Xlsx,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("the uploaded file is empty")]
    EmptyFile,
    #[error("invalid CSV: {0}")]
    Csv(String),
    #[error("invalid workbook: {0}")]
    Workbook(String),
    #[error("the workbook has no sheets")]
    NoSheet,
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// A tabular file reduced to headers plus string cells, whatever the source
/// format was.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn parse(format: ImportFormat, bytes: &[u8]) -> Result<ParsedSheet, ImportError> {
    if bytes.is_empty() {
        return Err(ImportError::EmptyFile);
    }
    match format {
        ImportFormat::Csv => parse_csv(bytes),
        ImportFormat::Xlsx => parse_xlsx(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<ParsedSheet, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| ImportError::Csv(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|header| header.is_empty()) {
        return Err(ImportError::EmptyFile);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ImportError::Csv(err.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(ParsedSheet { headers, rows })
}

fn parse_xlsx(bytes: &[u8]) -> Result<ParsedSheet, ImportError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = Xlsx::new(cursor).map_err(|err| ImportError::Workbook(err.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoSheet)?
        .map_err(|err| ImportError::Workbook(err.to_string()))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .map(|row| row.iter().map(cell_to_string).collect())
        .unwrap_or_default();

    if headers.is_empty() || headers.iter().all(|header| header.is_empty()) {
        return Err(ImportError::EmptyFile);
    }

    let rows = rows_iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok(ParsedSheet { headers, rows })
}

/// Spreadsheets store most numbers as floats; integral ones normalize to
/// integer strings so "42.0" round-trips as "42".
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.trim().to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_headers_and_rows() {
        let bytes = b"full_name,email\nAda Lovelace,ada@example.com\nGrace Hopper,\n";
        let sheet = parse(ImportFormat::Csv, bytes).unwrap();

        assert_eq!(sheet.headers, vec!["full_name", "email"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], vec!["Ada Lovelace", "ada@example.com"]);
        assert_eq!(sheet.rows[1], vec!["Grace Hopper", ""]);
    }

    #[test]
    fn test_parse_csv_trims_whitespace() {
        let bytes = b"name , phone\n Spot ,  555-1234 \n";
        let sheet = parse(ImportFormat::Csv, bytes).unwrap();

        assert_eq!(sheet.headers, vec!["name", "phone"]);
        assert_eq!(sheet.rows[0], vec!["Spot", "555-1234"]);
    }

    #[test]
    fn test_parse_header_only_csv_yields_zero_rows() {
        let sheet = parse(ImportFormat::Csv, b"sku,name\n").unwrap();
        assert_eq!(sheet.headers, vec!["sku", "name"]);
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_parse_empty_input_is_rejected() {
        assert!(matches!(
            parse(ImportFormat::Csv, b""),
            Err(ImportError::EmptyFile)
        ));
        assert!(matches!(
            parse(ImportFormat::Xlsx, b""),
            Err(ImportError::EmptyFile)
        ));
    }

    #[test]
    fn test_parse_garbage_xlsx_is_rejected() {
        assert!(matches!(
            parse(ImportFormat::Xlsx, b"not a zip archive"),
            Err(ImportError::Workbook(_))
        ));
    }

    #[test]
    fn test_cell_to_string_normalizes_integral_floats() {
        assert_eq!(cell_to_string(&Data::Float(42.0)), "42");
        assert_eq!(cell_to_string(&Data::Float(19.95)), "19.95");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("  x  ".into())), "x");
    }
}

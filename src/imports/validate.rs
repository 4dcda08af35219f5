use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::parse::ParsedSheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Customers,
    Products,
    Suppliers,
}

impl ImportKind {
    pub fn expected_columns(&self) -> &'static [&'static str] {
        match self {
            ImportKind::Customers => &["full_name", "email", "phone", "address", "notes"],
            ImportKind::Products => &[
                "sku",
                "name",
                "cost_price",
                "sale_price",
                "stock_quantity",
                "min_stock",
            ],
            ImportKind::Suppliers => &["name", "contact_name", "email", "phone"],
        }
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            ImportKind::Customers => &["full_name"],
            ImportKind::Products => &["sku", "name", "sale_price"],
            ImportKind::Suppliers => &["name"],
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct CustomerRow {
    #[validate(length(min = 1, message = "full_name is required"))]
    pub full_name: String,
    #[validate(email(message = "not a valid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct ProductRow {
    #[validate(length(min = 1, message = "sku is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    #[validate(range(min = 0, message = "stock_quantity cannot be negative"))]
    pub stock_quantity: i32,
    #[validate(range(min = 0, message = "min_stock cannot be negative"))]
    pub min_stock: i32,
}

#[derive(Debug, Clone, Validate)]
pub struct SupplierRow {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub contact_name: Option<String>,
    #[validate(email(message = "not a valid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ValidRow {
    Customer(CustomerRow),
    Product(ProductRow),
    Supplier(SupplierRow),
}

/// A single cell- or field-level problem, addressed by spreadsheet row number
/// (header is row 1, data starts at row 2).
#[derive(Serialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct RowIssue {
    pub row: usize,
    pub column: String,
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ImportReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub missing_columns: Vec<String>,
    pub unknown_columns: Vec<String>,
    pub issues: Vec<RowIssue>,
}

/// Maps expected column names onto header positions, case-insensitively.
struct ColumnMap {
    indexes: HashMap<&'static str, usize>,
}

impl ColumnMap {
    fn build(kind: ImportKind, headers: &[String]) -> (Self, Vec<String>, Vec<String>) {
        let mut indexes = HashMap::new();
        for column in kind.expected_columns() {
            let found = headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(column));
            if let Some(index) = found {
                indexes.insert(*column, index);
            }
        }

        let missing = kind
            .required_columns()
            .iter()
            .filter(|column| !indexes.contains_key(**column))
            .map(|column| column.to_string())
            .collect();

        let unknown = headers
            .iter()
            .filter(|header| !header.trim().is_empty())
            .filter(|header| {
                !kind
                    .expected_columns()
                    .iter()
                    .any(|column| header.trim().eq_ignore_ascii_case(column))
            })
            .map(|header| header.trim().to_string())
            .collect();

        (Self { indexes }, missing, unknown)
    }

    /// Cell for `column`, with empty cells and missing trailing cells both
    /// collapsing to `None`.
    fn field(&self, row: &[String], column: &'static str) -> Option<String> {
        self.indexes
            .get(column)
            .and_then(|index| row.get(*index))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

fn parse_decimal(
    value: Option<String>,
    column: &'static str,
    row_number: usize,
    issues: &mut Vec<RowIssue>,
) -> Decimal {
    match value {
        None => Decimal::ZERO,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            issues.push(RowIssue {
                row: row_number,
                column: column.to_string(),
                message: format!("'{raw}' is not a valid amount"),
            });
            Decimal::ZERO
        }),
    }
}

fn parse_int(
    value: Option<String>,
    column: &'static str,
    row_number: usize,
    issues: &mut Vec<RowIssue>,
) -> i32 {
    match value {
        None => 0,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            issues.push(RowIssue {
                row: row_number,
                column: column.to_string(),
                message: format!("'{raw}' is not a whole number"),
            });
            0
        }),
    }
}

fn collect_validation_issues<T: Validate>(row: &T, row_number: usize, issues: &mut Vec<RowIssue>) {
    if let Err(errors) = row.validate() {
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .clone()
                    .unwrap_or_else(|| error.code.clone())
                    .to_string();
                issues.push(RowIssue {
                    row: row_number,
                    column: field.to_string(),
                    message,
                });
            }
        }
    }
}

/// Validates every data row, returning the report alongside the rows that
/// passed. Invalid rows are reported, never fatal.
pub fn validate_sheet(kind: ImportKind, sheet: &ParsedSheet) -> (ImportReport, Vec<ValidRow>) {
    let (columns, missing_columns, unknown_columns) = ColumnMap::build(kind, &sheet.headers);

    // Without the required columns no row can be interpreted at all.
    if !missing_columns.is_empty() {
        return (
            ImportReport {
                total_rows: sheet.rows.len(),
                valid_rows: 0,
                invalid_rows: sheet.rows.len(),
                missing_columns,
                unknown_columns,
                issues: Vec::new(),
            },
            Vec::new(),
        );
    }

    let mut issues = Vec::new();
    let mut valid = Vec::new();
    let mut invalid_rows = 0;

    for (index, row) in sheet.rows.iter().enumerate() {
        let row_number = index + 2;
        let mut row_issues = Vec::new();

        let candidate = match kind {
            ImportKind::Customers => ValidRow::Customer(CustomerRow {
                full_name: columns.field(row, "full_name").unwrap_or_default(),
                email: columns.field(row, "email"),
                phone: columns.field(row, "phone"),
                address: columns.field(row, "address"),
                notes: columns.field(row, "notes"),
            }),
            ImportKind::Products => ValidRow::Product(ProductRow {
                sku: columns.field(row, "sku").unwrap_or_default(),
                name: columns.field(row, "name").unwrap_or_default(),
                cost_price: parse_decimal(
                    columns.field(row, "cost_price"),
                    "cost_price",
                    row_number,
                    &mut row_issues,
                ),
                sale_price: parse_decimal(
                    columns.field(row, "sale_price"),
                    "sale_price",
                    row_number,
                    &mut row_issues,
                ),
                stock_quantity: parse_int(
                    columns.field(row, "stock_quantity"),
                    "stock_quantity",
                    row_number,
                    &mut row_issues,
                ),
                min_stock: parse_int(
                    columns.field(row, "min_stock"),
                    "min_stock",
                    row_number,
                    &mut row_issues,
                ),
            }),
            ImportKind::Suppliers => ValidRow::Supplier(SupplierRow {
                name: columns.field(row, "name").unwrap_or_default(),
                contact_name: columns.field(row, "contact_name"),
                email: columns.field(row, "email"),
                phone: columns.field(row, "phone"),
            }),
        };

        match &candidate {
            ValidRow::Customer(row) => collect_validation_issues(row, row_number, &mut row_issues),
            ValidRow::Product(row) => collect_validation_issues(row, row_number, &mut row_issues),
            ValidRow::Supplier(row) => collect_validation_issues(row, row_number, &mut row_issues),
        }

        if row_issues.is_empty() {
            valid.push(candidate);
        } else {
            invalid_rows += 1;
            issues.extend(row_issues);
        }
    }

    let report = ImportReport {
        total_rows: sheet.rows.len(),
        valid_rows: valid.len(),
        invalid_rows,
        missing_columns,
        unknown_columns,
        issues,
    };

    (report, valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> ParsedSheet {
        ParsedSheet {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_valid_customers_pass() {
        let sheet = sheet(
            &["full_name", "email", "phone"],
            &[
                &["Ada Lovelace", "ada@example.com", "555-0001"],
                &["Grace Hopper", "", ""],
            ],
        );

        let (report, valid) = validate_sheet(ImportKind::Customers, &sheet);

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.invalid_rows, 0);
        assert!(report.issues.is_empty());
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn test_invalid_email_is_flagged_with_column_and_row() {
        let sheet = sheet(
            &["full_name", "email"],
            &[&["Ada Lovelace", "not-an-email"], &["Grace Hopper", ""]],
        );

        let (report, valid) = validate_sheet(ImportKind::Customers, &sheet);

        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(valid.len(), 1);
        assert_eq!(
            report.issues,
            vec![RowIssue {
                row: 2,
                column: "email".to_string(),
                message: "not a valid email address".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_required_column_invalidates_everything() {
        let sheet = sheet(&["email", "phone"], &[&["ada@example.com", "555-0001"]]);

        let (report, valid) = validate_sheet(ImportKind::Customers, &sheet);

        assert_eq!(report.missing_columns, vec!["full_name".to_string()]);
        assert_eq!(report.valid_rows, 0);
        assert_eq!(report.invalid_rows, 1);
        assert!(valid.is_empty());
    }

    #[test]
    fn test_unknown_columns_are_surfaced() {
        let sheet = sheet(&["full_name", "favorite_color"], &[&["Ada", "mauve"]]);

        let (report, _) = validate_sheet(ImportKind::Customers, &sheet);

        assert_eq!(report.unknown_columns, vec!["favorite_color".to_string()]);
        assert_eq!(report.valid_rows, 1);
    }

    #[test]
    fn test_headers_match_case_insensitively() {
        let sheet = sheet(&["Full_Name", "EMAIL"], &[&["Ada", "ada@example.com"]]);

        let (report, valid) = validate_sheet(ImportKind::Customers, &sheet);

        assert!(report.missing_columns.is_empty());
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_product_numeric_cells_must_parse() {
        let sheet = sheet(
            &["sku", "name", "sale_price", "stock_quantity"],
            &[
                &["AB-1", "Flea Shampoo", "12.50", "10"],
                &["AB-2", "Worming Tablets", "cheap", "lots"],
            ],
        );

        let (report, valid) = validate_sheet(ImportKind::Products, &sheet);

        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(valid.len(), 1);
        let columns: Vec<&str> = report
            .issues
            .iter()
            .map(|issue| issue.column.as_str())
            .collect();
        assert_eq!(columns, vec!["sale_price", "stock_quantity"]);
        assert!(report.issues.iter().all(|issue| issue.row == 3));
    }

    #[test]
    fn test_short_rows_collapse_to_missing_cells() {
        let sheet = sheet(
            &["sku", "name", "sale_price"],
            &[&["AB-1"]], // row shorter than the header
        );

        let (report, valid) = validate_sheet(ImportKind::Products, &sheet);

        assert!(valid.is_empty());
        assert_eq!(report.invalid_rows, 1);
        assert!(
            report
                .issues
                .iter()
                .any(|issue| issue.column == "name" && issue.row == 2)
        );
    }

    #[test]
    fn test_negative_stock_is_rejected() {
        let sheet = sheet(
            &["sku", "name", "sale_price", "stock_quantity"],
            &[&["AB-1", "Flea Shampoo", "12.50", "-4"]],
        );

        let (report, valid) = validate_sheet(ImportKind::Products, &sheet);

        assert!(valid.is_empty());
        assert_eq!(report.issues[0].column, "stock_quantity");
    }
}

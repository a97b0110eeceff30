//! Record-set models, decoded fiscal facts, options, reports and errors.

use thiserror::Error;

use crate::conf::{C_MSG_INVALID_PAYLOAD, C_MSG_NO_DATA_FOUND};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format settings for output workbooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,

    /// Number format code. `"@"` stores the cell as text.
    pub num_format: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
        }
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only (default).
    #[default]
    Header,
    /// Infer width from both header and body cells.
    All,
}

/// Autofit policy for one written sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::Header,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordSet

/// Single spreadsheet value as read from, or written to, a workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
}

impl EnumCellValue {
    /// Build a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        EnumCellValue::String(value.into())
    }

    /// Empty-string cell, the default fill of every output column.
    pub fn empty() -> Self {
        EnumCellValue::String(String::new())
    }

    /// Whether the cell is blank or holds an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            EnumCellValue::None => true,
            EnumCellValue::String(val) => val.is_empty(),
            EnumCellValue::Number(_) => false,
        }
    }
}

/// Ordered rows sharing one fully-defined, unique column set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<EnumCellValue>>,
}

impl SpecRecordSet {
    /// Build a record set, rejecting duplicate columns and ragged rows.
    pub fn try_new(
        columns: Vec<String>,
        rows: Vec<Vec<EnumCellValue>>,
    ) -> Result<Self, ConvertError> {
        crate::util::validate_unique_columns(&columns).map_err(ConvertError::Schema)?;
        let n_width = columns.len();
        if let Some((n_idx_row, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n_width)
        {
            return Err(ConvertError::Schema(format!(
                "Row {n_idx_row} has {} cells, expected {n_width}.",
                row.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in source order.
    pub fn rows(&self) -> &[Vec<EnumCellValue>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of an exactly named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c_col| c_col == name)
    }

    /// Cell at `(row, column name)`; `None` when either is out of range.
    pub fn cell(&self, n_idx_row: usize, name: &str) -> Option<&EnumCellValue> {
        let n_idx_col = self.column_index(name)?;
        self.rows.get(n_idx_row)?.get(n_idx_col)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FiscalCode

/// Holder sex encoded in the day field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumSex {
    Male,
    Female,
}

impl EnumSex {
    /// Single-letter code written to the registry output.
    pub fn code(&self) -> &'static str {
        match self {
            EnumSex::Male => "M",
            EnumSex::Female => "F",
        }
    }
}

/// Structural fields of a valid fiscal code. Never depends on the place registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFiscalCodeFacts {
    /// Holder sex.
    pub sex: EnumSex,
    /// Day of month, 1-based, after the female offset is removed.
    pub day: u32,
    /// Month, 1-based.
    pub month: u32,
    /// Four-digit birth year after century resolution.
    pub year: i32,
    /// Opaque cadastral place code (positions 11..15).
    pub place_code: String,
}

impl SpecFiscalCodeFacts {
    /// Birth date as `DDMMYYYY`.
    pub fn birth_date_text(&self) -> String {
        format!("{:02}{:02}{}", self.day, self.month, self.year)
    }
}

/// Place resolved by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecPlace {
    /// Municipality or foreign state name.
    pub name: String,
    /// Province/region code.
    pub region: String,
}

/// Facts emitted for one decoded identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFiscalCodeInfo {
    pub sex: EnumSex,
    /// `DDMMYYYY`.
    pub birth_date: String,
    /// Resolved place name, or the `Da Codice: {code}` fallback.
    pub place_name: String,
    /// Resolved region; empty on fallback.
    pub place_region: String,
    /// Whether the place came from the fallback path.
    pub if_place_fallback: bool,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Per-call conversion options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecConvertOptions {
    /// Named table region to look for.
    pub table_name: String,
    /// Reference calendar year: certification year and century pivot.
    pub year_current: i32,
}

impl SpecConvertOptions {
    /// Competency year written to the ledger.
    pub fn year_previous(&self) -> i32 {
        self.year_current - 1
    }
}

impl Default for SpecConvertOptions {
    fn default() -> Self {
        crate::conf::derive_default_convert_options()
    }
}

/// Request handler configuration, injected by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHandlerConfig {
    /// Registry credential used when the request carries none.
    pub registry_credential: Option<String>,
    /// Named table region to look for.
    pub table_name: String,
    /// Pinned reference year; the local clock's year when `None`.
    pub year_current: Option<i32>,
}

impl SpecHandlerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        crate::conf::derive_handler_config_from_env()
    }

    /// Conversion options for one request.
    pub fn convert_options(&self) -> SpecConvertOptions {
        let mut cfg_options = SpecConvertOptions {
            table_name: self.table_name.clone(),
            ..SpecConvertOptions::default()
        };
        if let Some(n_year) = self.year_current {
            cfg_options.year_current = n_year;
        }
        cfg_options
    }
}

impl Default for SpecHandlerConfig {
    fn default() -> Self {
        Self {
            registry_credential: None,
            table_name: crate::conf::C_TABLE_NAME_DEFAULT.to_string(),
            year_current: None,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LocatorSpecification

/// Where the source table was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumTableSource {
    /// Declared table region on the named sheet.
    NamedTable {
        /// Sheet declaring the table.
        sheet_name: String,
    },
    /// Used range of the first worksheet.
    FirstSheet,
}

/// Located source table, headers verbatim apart from uniqueness suffixes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecLocatedTable {
    /// Origin of the table.
    pub source: EnumTableSource,
    /// Header-plus-rows content.
    pub records: SpecRecordSet,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Counters collected while projecting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecProjectionReport {
    /// Source rows with a non-empty identifier.
    pub rows_qualifying: usize,
    /// Identifiers decoded into facts.
    pub codes_decoded: usize,
    /// Decoded identifiers whose place used the fallback text.
    pub places_fallback: usize,
    /// Registry rows removed as exact duplicates.
    pub rows_duplicate_removed: usize,
    /// Whether the registry got the placeholder row.
    pub if_placeholder_used: bool,
}

/// Both projected record sets.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecProjectedOutputs {
    /// Registry (anagrafiche) rows.
    pub registry: SpecRecordSet,
    /// Ledger (compensi) rows.
    pub ledger: SpecRecordSet,
    pub report: SpecProjectionReport,
}

/// Whole-conversion report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecConvertReport {
    /// Origin of the source table.
    pub source: EnumTableSource,
    pub projection: SpecProjectionReport,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecConvertReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

/// Serialized output workbooks.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecConvertOutput {
    /// Registry workbook bytes.
    pub registry_xlsx: Vec<u8>,
    /// Ledger workbook bytes.
    pub ledger_xlsx: Vec<u8>,
    pub report: SpecConvertReport,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Conversion failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Missing or undecodable request payload.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// No usable table, or a table without data rows.
    #[error("no data found")]
    NoDataFound,
    /// Workbook bytes could not be read.
    #[error("failed to read workbook: {0}")]
    Workbook(String),
    /// Package part could not be inspected.
    #[error("failed to inspect workbook package: {0}")]
    Package(String),
    /// Output workbook could not be produced.
    #[error("xlsx write error: {0}")]
    Write(String),
    /// Malformed record set.
    #[error("invalid record set: {0}")]
    Schema(String),
}

impl ConvertError {
    /// HTTP-style status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ConvertError::InvalidPayload(_) => 400,
            ConvertError::NoDataFound => 404,
            _ => 500,
        }
    }

    /// Message placed in the error body.
    pub fn public_message(&self) -> String {
        match self {
            ConvertError::InvalidPayload(_) => C_MSG_INVALID_PAYLOAD.to_string(),
            ConvertError::NoDataFound => C_MSG_NO_DATA_FOUND.to_string(),
            other => other.to_string(),
        }
    }
}

/// Place registry fault. Unknown codes are not faults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry could not be reached at all.
    #[error("place registry unavailable: {0}")]
    Unavailable(String),
    /// A single lookup failed.
    #[error("place lookup failed for {code}: {message}")]
    Lookup {
        /// Place code being resolved.
        code: String,
        /// Underlying failure.
        message: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_set_rejects_ragged_rows() {
        let err = SpecRecordSet::try_new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![EnumCellValue::None]],
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Schema(_)));
    }

    #[test]
    fn test_record_set_rejects_duplicate_columns() {
        let err =
            SpecRecordSet::try_new(vec!["a".to_string(), "a".to_string()], vec![]).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_record_set_cell_lookup_by_name() {
        let records = SpecRecordSet::try_new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![EnumCellValue::Number(1.0), EnumCellValue::text("x")]],
        )
        .unwrap();
        assert_eq!(records.cell(0, "b"), Some(&EnumCellValue::text("x")));
        assert_eq!(records.cell(1, "b"), None);
        assert_eq!(records.cell(0, "c"), None);
    }

    #[test]
    fn test_error_status_and_public_message() {
        assert_eq!(ConvertError::InvalidPayload("x".into()).status_code(), 400);
        assert_eq!(
            ConvertError::InvalidPayload("x".into()).public_message(),
            C_MSG_INVALID_PAYLOAD
        );
        assert_eq!(ConvertError::NoDataFound.status_code(), 404);
        assert_eq!(
            ConvertError::Workbook("bad zip".into()).public_message(),
            "failed to read workbook: bad zip"
        );
    }

    #[test]
    fn test_birth_date_text_is_zero_padded() {
        let facts = SpecFiscalCodeFacts {
            sex: EnumSex::Female,
            day: 1,
            month: 4,
            year: 1999,
            place_code: "H501".to_string(),
        };
        assert_eq!(facts.birth_date_text(), "01041999");
    }

    #[test]
    fn test_handler_config_pins_year() {
        let cfg = SpecHandlerConfig {
            year_current: Some(2025),
            ..SpecHandlerConfig::default()
        };
        let cfg_options = cfg.convert_options();
        assert_eq!(cfg_options.year_current, 2025);
        assert_eq!(cfg_options.year_previous(), 2024);
        assert_eq!(cfg_options.table_name, "TableA2");
    }
}

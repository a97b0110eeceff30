//! Stateless cell normalizers and record-set helpers.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::EnumCellValue;

static RE_COUNTRY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*IT").expect("valid regex"));
static RE_DECIMAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

/// Magnitude below which integral numbers render without a fractional part.
const N_INTEGRAL_DISPLAY_MAX: f64 = 1e15;

////////////////////////////////////////////////////////////////////////////////
// #region CellDisplay

/// Render a cell as the text a spreadsheet user would see.
pub fn derive_display_text(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(val) => val.clone(),
        EnumCellValue::Number(n) => derive_number_text(*n),
    }
}

fn derive_number_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < N_INTEGRAL_DISPLAY_MAX {
        return format!("{}", n as i64);
    }
    n.to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ValueNormalizer

/// Trim and map `none`/`nan` markers to the empty string.
pub fn normalize_display_text(value: &EnumCellValue) -> String {
    let c_text = derive_display_text(value);
    let c_trimmed = c_text.trim();
    if c_trimmed.eq_ignore_ascii_case("nan") || c_trimmed.eq_ignore_ascii_case("none") {
        return String::new();
    }
    c_trimmed.to_string()
}

/// Remove a leading `IT` country prefix from a VAT-like identifier.
pub fn strip_country_prefix(value: &EnumCellValue) -> String {
    let c_text = normalize_display_text(value);
    RE_COUNTRY_PREFIX.replace(&c_text, "").trim().to_string()
}

/// Strip a formula marker, unify the decimal separator and drop `%`.
pub fn clean_numeric_token(value: &EnumCellValue) -> String {
    if matches!(value, EnumCellValue::None) {
        return String::new();
    }
    let c_text = derive_display_text(value);
    let c_trimmed = c_text.trim();
    let c_token = c_trimmed.strip_prefix('=').unwrap_or(c_trimmed);
    c_token.replace(',', ".").replace('%', "").trim().to_string()
}

/// Parse a cleaned decimal token, else hand back the input cell.
pub fn parse_numeric_or_passthrough(value: &EnumCellValue) -> EnumCellValue {
    if let EnumCellValue::Number(n) = value
        && n.is_finite()
    {
        return EnumCellValue::Number(*n);
    }
    let c_token = clean_numeric_token(value);
    if RE_DECIMAL_TOKEN.is_match(&c_token)
        && let Ok(n_value) = c_token.parse::<f64>()
    {
        return EnumCellValue::Number(n_value);
    }
    value.clone()
}

/// Parse as in [`parse_numeric_or_passthrough`] and scale numbers by 100.
pub fn scale_percent_to_units(value: &EnumCellValue) -> EnumCellValue {
    match parse_numeric_or_passthrough(value) {
        EnumCellValue::Number(n) => EnumCellValue::Number(n * 100.0),
        other => other,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordSetUtils

/// Validate that `columns` has no duplicated names.
pub fn validate_unique_columns(columns: &[String]) -> Result<(), String> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter(|(_, l_pos)| l_pos.len() > 1)
        .map(|(c_name, l_pos)| format!("{c_name:?} x{} at indices {:?}", l_pos.len(), l_pos))
        .collect::<Vec<_>>()
        .join("; ");

    Err(format!("Duplicate column names detected: {c_msg}"))
}

/// Make source headers unique: blanks become `Unnamed: {idx}`, repeats get `.1`, `.2`.
pub fn derive_unique_headers(headers: &[String]) -> Vec<String> {
    let mut set_seen: BTreeSet<String> = BTreeSet::new();
    let mut dict_repeat: BTreeMap<String, usize> = BTreeMap::new();
    let mut l_headers = Vec::with_capacity(headers.len());

    for (n_idx, c_header) in headers.iter().enumerate() {
        let c_base = if c_header.trim().is_empty() {
            format!("Unnamed: {n_idx}")
        } else {
            c_header.clone()
        };

        let mut c_candidate = c_base.clone();
        while set_seen.contains(&c_candidate) {
            let n_repeat = dict_repeat.entry(c_base.clone()).or_insert(0);
            *n_repeat += 1;
            c_candidate = format!("{c_base}.{n_repeat}");
        }
        set_seen.insert(c_candidate.clone());
        l_headers.push(c_candidate);
    }

    l_headers
}

/// Hashable identity of a cell, used for exact-duplicate row detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnumCellKey {
    None,
    String(String),
    Number(u64),
}

/// Build the duplicate-detection key of a row.
pub fn derive_row_key(row: &[EnumCellValue]) -> Vec<EnumCellKey> {
    row.iter()
        .map(|value| match value {
            EnumCellValue::None => EnumCellKey::None,
            EnumCellValue::String(val) => EnumCellKey::String(val.clone()),
            // -0.0 and 0.0 compare equal as cells.
            EnumCellValue::Number(n) => EnumCellKey::Number((n + 0.0).to_bits()),
        })
        .collect()
}

/// Drop rows equal to an earlier row, keeping first occurrences in order.
///
/// Returns the kept rows and the number removed.
pub fn dedup_rows(rows: Vec<Vec<EnumCellValue>>) -> (Vec<Vec<EnumCellValue>>, usize) {
    let n_rows_in = rows.len();
    let mut set_keys = BTreeSet::new();
    let l_rows: Vec<_> = rows
        .into_iter()
        .filter(|row| set_keys.insert(derive_row_key(row)))
        .collect();
    let n_removed = n_rows_in - l_rows.len();
    (l_rows, n_removed)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn text(val: &str) -> EnumCellValue {
        EnumCellValue::text(val)
    }

    #[test]
    fn test_display_text_renders_integral_numbers_without_fraction() {
        assert_eq!(derive_display_text(&EnumCellValue::Number(12345678901.0)), "12345678901");
        assert_eq!(derive_display_text(&EnumCellValue::Number(-3.0)), "-3");
        assert_eq!(derive_display_text(&EnumCellValue::Number(12.5)), "12.5");
        assert_eq!(derive_display_text(&EnumCellValue::None), "");
    }

    #[test]
    fn test_normalize_display_text_maps_missing_markers() {
        assert_eq!(normalize_display_text(&text("  Rossi ")), "Rossi");
        assert_eq!(normalize_display_text(&text("NaN")), "");
        assert_eq!(normalize_display_text(&text(" None")), "");
        assert_eq!(normalize_display_text(&EnumCellValue::None), "");
        assert_eq!(normalize_display_text(&EnumCellValue::Number(f64::NAN)), "");
    }

    #[test]
    fn test_strip_country_prefix() {
        assert_eq!(strip_country_prefix(&text("IT12345678901")), "12345678901");
        assert_eq!(strip_country_prefix(&text("  it 01234567890 ")), "01234567890");
        assert_eq!(strip_country_prefix(&text("DE123")), "DE123");
        assert_eq!(strip_country_prefix(&text("nan")), "");
        assert_eq!(strip_country_prefix(&EnumCellValue::None), "");
        assert_eq!(
            strip_country_prefix(&EnumCellValue::Number(12345678901.0)),
            "12345678901"
        );
    }

    #[test]
    fn test_clean_numeric_token() {
        assert_eq!(clean_numeric_token(&text("12,5%")), "12.5");
        assert_eq!(clean_numeric_token(&text(" =42 ")), "42");
        assert_eq!(clean_numeric_token(&EnumCellValue::None), "");
    }

    #[test]
    fn test_parse_numeric_or_passthrough() {
        assert_eq!(parse_numeric_or_passthrough(&text("12,5%")), EnumCellValue::Number(12.5));
        assert_eq!(parse_numeric_or_passthrough(&text("=42")), EnumCellValue::Number(42.0));
        assert_eq!(parse_numeric_or_passthrough(&text("-7")), EnumCellValue::Number(-7.0));
        assert_eq!(parse_numeric_or_passthrough(&text("abc")), text("abc"));
        assert_eq!(parse_numeric_or_passthrough(&text("1.2.3")), text("1.2.3"));
        assert_eq!(parse_numeric_or_passthrough(&text("")), text(""));
        assert_eq!(
            parse_numeric_or_passthrough(&EnumCellValue::Number(3.25)),
            EnumCellValue::Number(3.25)
        );
    }

    #[test]
    fn test_scale_percent_to_units() {
        assert_eq!(scale_percent_to_units(&text("0.2")), EnumCellValue::Number(20.0));
        assert_eq!(
            scale_percent_to_units(&EnumCellValue::Number(0.5)),
            EnumCellValue::Number(50.0)
        );
        assert_eq!(scale_percent_to_units(&text("n/a")), text("n/a"));
    }

    #[test]
    fn test_derive_unique_headers() {
        let l_headers = vec![
            "A".to_string(),
            "".to_string(),
            "A".to_string(),
            "A".to_string(),
            "A.1".to_string(),
        ];
        assert_eq!(
            derive_unique_headers(&l_headers),
            vec!["A", "Unnamed: 1", "A.1", "A.2", "A.1.1"]
        );
    }

    #[test]
    fn test_dedup_rows_keeps_first_occurrence() {
        let rows = vec![
            vec![text("a"), EnumCellValue::Number(1.0)],
            vec![text("b"), EnumCellValue::Number(1.0)],
            vec![text("a"), EnumCellValue::Number(1.0)],
            vec![text("a"), EnumCellValue::None],
        ];
        let (l_rows, n_removed) = dedup_rows(rows);
        assert_eq!(n_removed, 1);
        assert_eq!(l_rows.len(), 3);
        assert_eq!(l_rows[1][0], text("b"));
    }

    #[test]
    fn test_validate_unique_columns_reports_positions() {
        let err = validate_unique_columns(&["x".to_string(), "y".to_string(), "x".to_string()])
            .unwrap_err();
        assert!(err.contains("\"x\" x2 at indices [0, 2]"));
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   ", "_"), "Sheet");
    }
}

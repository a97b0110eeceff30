//! Source table location inside an uploaded workbook.
//!
//! Sheets are scanned in workbook order for a declared table region with the
//! requested name; the first match wins. Table declarations are read from the
//! xlsx package parts and the cells from calamine. When nothing is declared, or
//! the package cannot be read, the first worksheet's used range is read as a
//! header-plus-rows table.

use std::io::{Cursor, Read, Seek};

use calamine::{
    Data, Reader, Xlsx, XlsxError, open_workbook_auto_from_rs, open_workbook_from_rs,
};
use chrono::{NaiveDate, TimeDelta};
use roxmltree::Document;
use tracing::{info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::spec::{ConvertError, EnumCellValue, EnumTableSource, SpecLocatedTable, SpecRecordSet};
use crate::util::{derive_display_text, derive_unique_headers};

const C_NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const C_PART_ROOT_RELS: &str = "_rels/.rels";
const C_PART_WORKBOOK_DEFAULT: &str = "xl/workbook.xml";

////////////////////////////////////////////////////////////////////////////////
// #region Locate

/// Find the source table and read it as a record set.
///
/// Fails with [`ConvertError::NoDataFound`] when the table has no data rows and
/// with [`ConvertError::Workbook`] when the bytes are not a readable workbook.
pub fn locate_table(data: &[u8], table_name: &str) -> Result<SpecLocatedTable, ConvertError> {
    match find_named_table(data, table_name) {
        Ok(Some(table_ref)) => match read_named_table(data, &table_ref) {
            Ok(records) => {
                info!(
                    table = table_name,
                    sheet = %table_ref.sheet_name,
                    rows = records.height(),
                    "located named table"
                );
                return ensure_has_rows(SpecLocatedTable {
                    source: EnumTableSource::NamedTable {
                        sheet_name: table_ref.sheet_name,
                    },
                    records,
                });
            }
            Err(err) => warn!(table = table_name, error = %err, "reading named table failed"),
        },
        Ok(None) => info!(table = table_name, "named table not declared"),
        Err(err) => warn!(table = table_name, error = %err, "probing named tables failed"),
    }

    info!("falling back to first worksheet");
    let records = read_first_sheet(data)?;
    ensure_has_rows(SpecLocatedTable {
        source: EnumTableSource::FirstSheet,
        records,
    })
}

fn ensure_has_rows(table: SpecLocatedTable) -> Result<SpecLocatedTable, ConvertError> {
    if table.records.is_empty() {
        return Err(ConvertError::NoDataFound);
    }
    Ok(table)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region NamedTableDiscovery

/// Declared table region, zero-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecNamedTableRef {
    /// Sheet declaring the table.
    pub sheet_name: String,
    pub row_start: u32,
    pub col_start: u32,
    pub row_end: u32,
    pub col_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpecRelationship {
    id: String,
    type_: String,
    target: String,
}

/// Scan sheets in workbook order for a table whose `name` or `displayName` matches.
pub fn find_named_table(
    data: &[u8],
    table_name: &str,
) -> Result<Option<SpecNamedTableRef>, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|err| ConvertError::Package(format!("not a zip package: {err}")))?;

    let c_part_workbook = match read_part_text(&mut archive, C_PART_ROOT_RELS)? {
        Some(c_xml) => parse_relationships(&c_xml, C_PART_ROOT_RELS)?
            .into_iter()
            .find(|rel| rel.type_.ends_with("/officeDocument"))
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| C_PART_WORKBOOK_DEFAULT.to_string()),
        None => C_PART_WORKBOOK_DEFAULT.to_string(),
    };

    let Some(c_xml_workbook) = read_part_text(&mut archive, &c_part_workbook)? else {
        return Err(ConvertError::Package(format!("missing part {c_part_workbook}")));
    };
    let c_part_workbook_rels = derive_rels_part(&c_part_workbook);
    let l_workbook_rels = match read_part_text(&mut archive, &c_part_workbook_rels)? {
        Some(c_xml) => parse_relationships(&c_xml, &c_part_workbook_rels)?,
        None => vec![],
    };

    for (c_sheet_name, c_rel_id) in parse_workbook_sheets(&c_xml_workbook, &c_part_workbook)? {
        let Some(rel_sheet) = l_workbook_rels.iter().find(|rel| rel.id == c_rel_id) else {
            continue;
        };
        let c_part_sheet = resolve_target(&c_part_workbook, &rel_sheet.target);
        let c_part_sheet_rels = derive_rels_part(&c_part_sheet);
        let l_sheet_rels = match read_relationships_part(&mut archive, &c_part_sheet_rels) {
            Ok(Some(l_rels)) => l_rels,
            Ok(None) => continue,
            Err(err) => {
                warn!(sheet = %c_sheet_name, error = %err, "skipping unreadable sheet rels");
                continue;
            }
        };

        for rel_table in l_sheet_rels {
            if !rel_table.type_.ends_with("/table") {
                continue;
            }
            let c_part_table = resolve_target(&c_part_sheet, &rel_table.target);
            let c_ref = match read_table_ref_if_named(&mut archive, &c_part_table, table_name) {
                Ok(Some(c_ref)) => c_ref,
                Ok(None) => continue,
                Err(err) => {
                    warn!(part = %c_part_table, error = %err, "skipping unreadable table part");
                    continue;
                }
            };
            let Some((row_start, col_start, row_end, col_end)) = parse_range_ref(&c_ref) else {
                return Err(ConvertError::Package(format!(
                    "bad table ref {c_ref:?} in {c_part_table}"
                )));
            };
            return Ok(Some(SpecNamedTableRef {
                sheet_name: c_sheet_name,
                row_start,
                col_start,
                row_end,
                col_end,
            }));
        }
    }

    Ok(None)
}

fn read_part_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part_name: &str,
) -> Result<Option<String>, ConvertError> {
    let mut file = match archive.by_name(part_name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(ConvertError::Package(format!("{part_name}: {err}"))),
    };
    let mut c_text = String::new();
    file.read_to_string(&mut c_text)
        .map_err(|err| ConvertError::Package(format!("{part_name}: {err}")))?;
    Ok(Some(c_text))
}

fn read_relationships_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part_name: &str,
) -> Result<Option<Vec<SpecRelationship>>, ConvertError> {
    match read_part_text(archive, part_name)? {
        Some(c_xml) => parse_relationships(&c_xml, part_name).map(Some),
        None => Ok(None),
    }
}

fn read_table_ref_if_named<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part_name: &str,
    table_name: &str,
) -> Result<Option<String>, ConvertError> {
    match read_part_text(archive, part_name)? {
        Some(c_xml) => parse_table_ref_if_named(&c_xml, part_name, table_name),
        None => Ok(None),
    }
}

fn parse_xml<'a>(c_xml: &'a str, part_name: &str) -> Result<Document<'a>, ConvertError> {
    Document::parse(c_xml).map_err(|err| ConvertError::Package(format!("{part_name}: {err}")))
}

fn parse_relationships(
    c_xml: &str,
    part_name: &str,
) -> Result<Vec<SpecRelationship>, ConvertError> {
    let doc = parse_xml(c_xml, part_name)?;
    let mut l_rels = Vec::new();
    for node in doc.descendants().filter(|node| node.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let Some(id) = node.attribute("Id") else {
            continue;
        };
        l_rels.push(SpecRelationship {
            id: id.to_string(),
            type_: node.attribute("Type").unwrap_or_default().to_string(),
            target: node.attribute("Target").unwrap_or_default().to_string(),
        });
    }
    Ok(l_rels)
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_workbook_sheets(
    c_xml: &str,
    part_name: &str,
) -> Result<Vec<(String, String)>, ConvertError> {
    let doc = parse_xml(c_xml, part_name)?;
    Ok(doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "sheet")
        .filter_map(|node| {
            let c_name = node.attribute("name")?;
            let c_rel_id = node
                .attribute((C_NS_REL, "id"))
                .or_else(|| node.attribute("id"))?;
            Some((c_name.to_string(), c_rel_id.to_string()))
        })
        .collect())
}

/// Table `ref` when the part declares `table_name` as its name or display name.
fn parse_table_ref_if_named(
    c_xml: &str,
    part_name: &str,
    table_name: &str,
) -> Result<Option<String>, ConvertError> {
    let doc = parse_xml(c_xml, part_name)?;
    let node = doc.root_element();
    if node.tag_name().name() != "table" {
        return Ok(None);
    }
    let if_named = [node.attribute("name"), node.attribute("displayName")]
        .into_iter()
        .flatten()
        .any(|c_name| c_name == table_name);
    if !if_named {
        return Ok(None);
    }
    Ok(node.attribute("ref").map(ToString::to_string))
}

fn derive_rels_part(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((c_dir, c_file)) => format!("{c_dir}/_rels/{c_file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against its source part.
fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if let Some(c_absolute) = target.strip_prefix('/') {
        return normalize_part_path(c_absolute);
    }
    let c_dir = source_part.rsplit_once('/').map(|(c_dir, _)| c_dir).unwrap_or("");
    normalize_part_path(&format!("{c_dir}/{target}"))
}

fn normalize_part_path(path: &str) -> String {
    let mut l_segments: Vec<&str> = Vec::new();
    for c_segment in path.split('/') {
        match c_segment {
            "" | "." => {}
            ".." => {
                l_segments.pop();
            }
            other => l_segments.push(other),
        }
    }
    l_segments.join("/")
}

/// Parse `A1` into zero-based `(row, col)`.
pub fn parse_cell_ref(c_ref: &str) -> Option<(u32, u32)> {
    let c_ref = c_ref.trim().replace('$', "");
    let n_split = c_ref.find(|chr: char| chr.is_ascii_digit())?;
    let (c_letters, c_digits) = c_ref.split_at(n_split);
    if c_letters.is_empty() || !c_letters.chars().all(|chr| chr.is_ascii_alphabetic()) {
        return None;
    }

    let mut n_col: u32 = 0;
    for chr in c_letters.chars() {
        let n_digit = chr.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        n_col = n_col.checked_mul(26)?.checked_add(n_digit)?;
    }
    let n_row: u32 = c_digits.parse().ok()?;
    if n_row == 0 {
        return None;
    }
    Some((n_row - 1, n_col - 1))
}

/// Parse `A1:C5` (or a single `A1`) into zero-based `(row0, col0, row1, col1)`.
pub fn parse_range_ref(c_ref: &str) -> Option<(u32, u32, u32, u32)> {
    let (c_start, c_end) = c_ref.split_once(':').unwrap_or((c_ref, c_ref));
    let (n_row_a, n_col_a) = parse_cell_ref(c_start)?;
    let (n_row_b, n_col_b) = parse_cell_ref(c_end)?;
    Some((
        n_row_a.min(n_row_b),
        n_col_a.min(n_col_b),
        n_row_a.max(n_row_b),
        n_col_a.max(n_col_b),
    ))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellExtraction

/// Read a declared table: first row as headers, the rest as data rows.
///
/// Trailing fully blank rows are dropped, so a table holding only its
/// placeholder row reads as empty.
pub fn read_named_table(
    data: &[u8],
    table_ref: &SpecNamedTableRef,
) -> Result<SpecRecordSet, ConvertError> {
    let mut workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(data))
        .map_err(|err: XlsxError| ConvertError::Workbook(err.to_string()))?;
    let range = workbook
        .worksheet_range(&table_ref.sheet_name)
        .map_err(|err| ConvertError::Workbook(err.to_string()))?;
    let (n_row_end, n_col_end) = derive_read_bounds(table_ref, range.end());

    let read_row = |n_row: u32| -> Vec<EnumCellValue> {
        (table_ref.col_start..=n_col_end)
            .map(|n_col| {
                range
                    .get_value((n_row, n_col))
                    .map(derive_cell_value_from_data)
                    .unwrap_or(EnumCellValue::None)
            })
            .collect()
    };

    let l_headers: Vec<String> = read_row(table_ref.row_start)
        .iter()
        .map(derive_display_text)
        .collect();
    let mut l_rows: Vec<Vec<EnumCellValue>> = ((table_ref.row_start + 1)..=n_row_end)
        .map(read_row)
        .collect();
    drop_trailing_blank_rows(&mut l_rows);

    SpecRecordSet::try_new(derive_unique_headers(&l_headers), l_rows)
}

/// Last `(row, col)` worth reading: the declared ref clipped to the sheet's used
/// range and to the Excel grid. Cells past the used range are all empty.
fn derive_read_bounds(
    table_ref: &SpecNamedTableRef,
    used_end: Option<(u32, u32)>,
) -> (u32, u32) {
    let (n_row_used, n_col_used) =
        used_end.unwrap_or((table_ref.row_start, table_ref.col_start));
    let n_row_end = table_ref
        .row_end
        .min(n_row_used)
        .min(N_NROWS_EXCEL_MAX as u32 - 1);
    let n_col_end = table_ref
        .col_end
        .min(n_col_used)
        .min(N_NCOLS_EXCEL_MAX as u32 - 1)
        .max(table_ref.col_start);
    (n_row_end, n_col_end)
}

/// Read the first worksheet of any supported format as header-plus-rows.
///
/// Trailing fully blank rows are dropped.
pub fn read_first_sheet(data: &[u8]) -> Result<SpecRecordSet, ConvertError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|err| ConvertError::Workbook(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConvertError::Workbook("workbook has no worksheet".to_string()))?
        .map_err(|err| ConvertError::Workbook(err.to_string()))?;

    let mut iter_rows = range.rows();
    let Some(row_header) = iter_rows.next() else {
        return SpecRecordSet::try_new(vec![], vec![]);
    };
    let l_headers: Vec<String> = row_header
        .iter()
        .map(|cell| derive_display_text(&derive_cell_value_from_data(cell)))
        .collect();

    let mut l_rows: Vec<Vec<EnumCellValue>> = iter_rows
        .map(|row| row.iter().map(derive_cell_value_from_data).collect())
        .collect();
    drop_trailing_blank_rows(&mut l_rows);

    SpecRecordSet::try_new(derive_unique_headers(&l_headers), l_rows)
}

fn drop_trailing_blank_rows(rows: &mut Vec<Vec<EnumCellValue>>) {
    while rows
        .last()
        .is_some_and(|row| row.iter().all(EnumCellValue::is_blank))
    {
        rows.pop();
    }
}

/// Convert one calamine cell into the pipeline cell model.
pub fn derive_cell_value_from_data(value: &Data) -> EnumCellValue {
    match value {
        Data::Empty => EnumCellValue::None,
        Data::String(val) => EnumCellValue::String(val.clone()),
        Data::Int(val) => EnumCellValue::Number(*val as f64),
        Data::Float(val) => EnumCellValue::Number(*val),
        Data::Bool(val) => EnumCellValue::String(if *val { "True" } else { "False" }.to_string()),
        Data::DateTime(val) => {
            let n_serial = val.as_f64();
            if val.is_duration() {
                return EnumCellValue::Number(n_serial);
            }
            derive_datetime_text(n_serial)
                .map(EnumCellValue::String)
                .unwrap_or(EnumCellValue::Number(n_serial))
        }
        Data::DateTimeIso(val) | Data::DurationIso(val) => EnumCellValue::String(val.clone()),
        Data::Error(err) => EnumCellValue::String(err.to_string()),
    }
}

/// Render an Excel 1900-system serial as `YYYY-MM-DD HH:MM:SS`.
fn derive_datetime_text(n_serial: f64) -> Option<String> {
    if !n_serial.is_finite() || n_serial < 0.0 {
        return None;
    }
    let n_days = n_serial.trunc() as i64;
    let n_secs = (n_serial.fract() * 86_400.0).round() as i64;
    // Serials before 1900-03-01 are shifted by the phantom 1900-02-29.
    let n_days = if n_days < 60 { n_days + 1 } else { n_days };

    let dt_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let dt_value = dt_epoch
        .checked_add_signed(TimeDelta::try_days(n_days)?)?
        .checked_add_signed(TimeDelta::try_seconds(n_secs)?)?;
    Some(dt_value.format("%Y-%m-%d %H:%M:%S").to_string())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

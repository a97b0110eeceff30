//! In-memory XLSX writer for projected record sets.

use std::collections::{BTreeMap, BTreeSet};

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use tracing::debug;

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    derive_default_xlsx_formats,
};
use crate::spec::{
    ConvertError, EnumAutofitColumnsRule, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat,
    SpecRecordSet,
};
use crate::util::{derive_display_text, sanitize_sheet_name};

/// Per-sheet call options.
#[derive(Default, Debug, Clone)]
pub struct SpecXlsxSheetWriteOptions {
    /// Columns stored as text cells; numbers are written as their display text.
    pub cols_text: Vec<String>,
    /// Freeze the header row.
    pub if_freeze_header: bool,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
}

impl SpecXlsxSheetWriteOptions {
    /// Options with the given text columns and a frozen header.
    pub fn with_text_columns(cols_text: &[&str]) -> Self {
        Self {
            cols_text: cols_text.iter().map(|c| c.to_string()).collect(),
            if_freeze_header: true,
            policy_autofit: SpecAutofitCellsPolicy::default(),
        }
    }
}

/// Stateful workbook writer buffered in memory.
pub struct XlsxWriter {
    workbook: Workbook,
    fmt_text: SpecCellFormat,
    fmt_general: SpecCellFormat,
    fmt_header: SpecCellFormat,
    set_sheet_names_existing: BTreeSet<String>,
}

impl XlsxWriter {
    pub fn new(
        fmt_text: SpecCellFormat,
        fmt_general: SpecCellFormat,
        fmt_header: SpecCellFormat,
    ) -> Self {
        Self {
            workbook: Workbook::new(),
            fmt_text,
            fmt_general,
            fmt_header,
            set_sheet_names_existing: BTreeSet::new(),
        }
    }

    /// Writer using the presets from [`derive_default_xlsx_formats`].
    pub fn with_default_formats() -> Self {
        let dict_fmt = derive_default_xlsx_formats();
        let pick = |key: &str| dict_fmt.get(key).cloned().unwrap_or_default();
        Self::new(pick("text"), pick("general"), pick("header"))
    }

    /// Write one sheet: a single header row followed by one line per record.
    pub fn write_sheet(
        &mut self,
        records: &SpecRecordSet,
        sheet_name: &str,
        options: &SpecXlsxSheetWriteOptions,
    ) -> Result<(), ConvertError> {
        validate_policy_autofit(&options.policy_autofit).map_err(ConvertError::Write)?;

        let n_width = records.width();
        let n_height = records.height();
        if n_width > N_NCOLS_EXCEL_MAX {
            return Err(ConvertError::Write(format!(
                "{n_width} columns exceed the Excel limit of {N_NCOLS_EXCEL_MAX}."
            )));
        }
        if n_height + 1 > N_NROWS_EXCEL_MAX {
            return Err(ConvertError::Write(format!(
                "{n_height} rows exceed the Excel limit of {}.",
                N_NROWS_EXCEL_MAX - 1
            )));
        }

        let set_cols_idx_text: BTreeSet<usize> = options
            .cols_text
            .iter()
            .filter_map(|c_col| records.column_index(c_col))
            .collect();
        let dict_fmt_by_col: BTreeMap<usize, Format> = (0..n_width)
            .map(|n_idx_col| {
                let spec = if set_cols_idx_text.contains(&n_idx_col) {
                    &self.fmt_text
                } else {
                    &self.fmt_general
                };
                (n_idx_col, derive_rust_xlsx_format(spec))
            })
            .collect();
        let fmt_header = derive_rust_xlsx_format(&self.fmt_header);

        let sheet_name_unique =
            self.derive_unique_sheet_name(&sanitize_sheet_name(sheet_name, "_"));
        let worksheet = self.workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name_unique)
            .map_err(derive_xlsx_error)?;

        write_header(worksheet, records.columns(), &fmt_header).map_err(ConvertError::Write)?;
        for (n_idx_col, format) in &dict_fmt_by_col {
            if set_cols_idx_text.contains(n_idx_col) {
                let n_col = cast_col_num(*n_idx_col).map_err(ConvertError::Write)?;
                worksheet
                    .set_column_format(n_col, format)
                    .map_err(derive_xlsx_error)?;
            }
        }

        for (n_idx_row, row) in records.rows().iter().enumerate() {
            for (n_idx_col, value_raw) in row.iter().enumerate() {
                let value = if set_cols_idx_text.contains(&n_idx_col) {
                    derive_text_cell_value(value_raw)
                } else {
                    value_raw.clone()
                };
                let Some(format) = dict_fmt_by_col.get(&n_idx_col) else {
                    continue;
                };
                write_cell_with_format(worksheet, n_idx_row + 1, n_idx_col, &value, format)
                    .map_err(ConvertError::Write)?;
            }
        }

        if options.if_freeze_header {
            worksheet.set_freeze_panes(1, 0).map_err(derive_xlsx_error)?;
        }

        if let Some(l_widths) = derive_column_widths(records, &options.policy_autofit) {
            for (n_idx_col, n_width_final) in l_widths.into_iter().enumerate() {
                worksheet
                    .set_column_width(
                        cast_col_num(n_idx_col).map_err(ConvertError::Write)?,
                        n_width_final as f64,
                    )
                    .map_err(derive_xlsx_error)?;
            }
        }

        debug!(
            sheet = %sheet_name_unique,
            rows = n_height,
            columns = n_width,
            "wrote sheet"
        );
        Ok(())
    }

    /// Serialize the workbook to bytes. The writer can keep adding sheets afterwards.
    pub fn save_to_buffer(&mut self) -> Result<Vec<u8>, ConvertError> {
        self.workbook.save_to_buffer().map_err(derive_xlsx_error)
    }

    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if !self.set_sheet_names_existing.contains(name) {
            self.set_sheet_names_existing.insert(name.to_string());
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if !self.set_sheet_names_existing.contains(&candidate) {
                self.set_sheet_names_existing.insert(candidate.clone());
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// Write `records` as a single-sheet workbook and return its bytes.
pub fn write_record_set_xlsx(
    records: &SpecRecordSet,
    sheet_name: &str,
    cols_text: &[&str],
) -> Result<Vec<u8>, ConvertError> {
    let mut writer = XlsxWriter::with_default_formats();
    writer.write_sheet(
        records,
        sheet_name,
        &SpecXlsxSheetWriteOptions::with_text_columns(cols_text),
    )?;
    writer.save_to_buffer()
}

/// Column widths under `policy`, or `None` when autofit is disabled.
///
/// Headers always count; body rows count only under [`EnumAutofitColumnsRule::All`],
/// up to `height_body_inferred_max` rows. Results are padded, then clamped to
/// `[width_cell_min, width_cell_max]` and to Excel's 255 ceiling.
pub fn derive_column_widths(
    records: &SpecRecordSet,
    policy: &SpecAutofitCellsPolicy,
) -> Option<Vec<usize>> {
    let n_rows_body_inferred = match policy.rule_columns {
        EnumAutofitColumnsRule::None => return None,
        EnumAutofitColumnsRule::Header => 0,
        EnumAutofitColumnsRule::All => policy
            .height_body_inferred_max
            .unwrap_or(records.height()),
    };

    let mut l_width_by_col: Vec<usize> = records
        .columns()
        .iter()
        .map(|c_col| estimate_unicode_string_width(c_col))
        .collect();
    for row in records.rows().iter().take(n_rows_body_inferred) {
        for (n_idx_col, value) in row.iter().enumerate() {
            l_width_by_col[n_idx_col] =
                usize::max(l_width_by_col[n_idx_col], estimate_width_len(value));
        }
    }

    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy.width_cell_max));
    Some(
        l_width_by_col
            .into_iter()
            .map(|n_width| {
                usize::min(n_max, usize::max(n_min, n_width + policy.width_cell_padding))
            })
            .collect(),
    )
}

/// Estimate displayed width units for one cell value.
pub fn estimate_width_len(value: &EnumCellValue) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Number(_) => derive_display_text(value).len(),
    }
}

fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

fn derive_text_cell_value(value: &EnumCellValue) -> EnumCellValue {
    match value {
        EnumCellValue::Number(_) => EnumCellValue::String(derive_display_text(value)),
        _ => value.clone(),
    }
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<(), String> {
    if policy_autofit.width_cell_min > policy_autofit.width_cell_max {
        return Err(format!(
            "width_cell_min ({}) must not exceed width_cell_max ({}).",
            policy_autofit.width_cell_min, policy_autofit.width_cell_max
        ));
    }
    Ok(())
}

fn write_header(
    worksheet: &mut Worksheet,
    columns: &[String],
    fmt_header: &Format,
) -> Result<(), String> {
    for (col_idx, cell_value) in columns.iter().enumerate() {
        if cell_value.is_empty() {
            worksheet
                .write_blank(0, cast_col_num(col_idx)?, fmt_header)
                .map_err(derive_xlsx_error_text)?;
        } else {
            worksheet
                .write_string_with_format(0, cast_col_num(col_idx)?, cell_value, fmt_header)
                .map_err(derive_xlsx_error_text)?;
        }
    }
    Ok(())
}

/// Blank values and empty strings become formatted blank cells.
fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), String> {
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(cast_row_num(row_idx)?, cast_col_num(col_idx)?, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::String(val) if val.is_empty() => {
            worksheet
                .write_blank(cast_row_num(row_idx)?, cast_col_num(col_idx)?, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::String(val) => {
            worksheet
                .write_string_with_format(
                    cast_row_num(row_idx)?,
                    cast_col_num(col_idx)?,
                    val,
                    format,
                )
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::Number(val) if !val.is_finite() => {
            worksheet
                .write_blank(cast_row_num(row_idx)?, cast_col_num(col_idx)?, format)
                .map_err(derive_xlsx_error_text)?;
        }
        EnumCellValue::Number(val) => {
            worksheet
                .write_number_with_format(
                    cast_row_num(row_idx)?,
                    cast_col_num(col_idx)?,
                    *val,
                    format,
                )
                .map_err(derive_xlsx_error_text)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

fn derive_xlsx_error_text(err: XlsxError) -> String {
    err.to_string()
}

fn derive_xlsx_error(err: XlsxError) -> ConvertError {
    ConvertError::Write(derive_xlsx_error_text(err))
}

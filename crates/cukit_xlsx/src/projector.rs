//! Projection of the reconciled source rows onto the registry and ledger schemas.

use tracing::info;

use crate::conf::{
    C_COL_LED_COMPETENCE_YEAR, C_COL_LED_EXEMPT_AMOUNT, C_COL_LED_EXEMPT_CODE,
    C_COL_LED_FISCAL_CODE, C_COL_LED_FOREIGN_ID, C_COL_LED_GROSS_AMOUNT, C_COL_LED_ISSUER_ID,
    C_COL_LED_NAME, C_COL_LED_RATE, C_COL_LED_RATE_ADVANCE, C_COL_LED_REASON, C_COL_LED_SURNAME,
    C_COL_LED_TAX_CODE, C_COL_LED_TAXABLE_AMOUNT, C_COL_LED_VAT_NUMBER, C_COL_LED_WITHHELD_AMOUNT,
    C_COL_LED_YEAR, C_COL_REG_BIRTH_DATE, C_COL_REG_BIRTH_PLACE, C_COL_REG_BIRTH_REGION,
    C_COL_REG_FISCAL_CODE, C_COL_REG_ISSUER_ID, C_COL_REG_NAME, C_COL_REG_SEX,
    C_COL_REG_SUBJECT_TYPE, C_COL_REG_SURNAME, C_COL_REG_VAT_NUMBER, C_COL_REG_YEAR,
    C_COL_SRC_EXEMPT_AMOUNT, C_COL_SRC_EXEMPT_CODE, C_COL_SRC_FISCAL_CODE, C_COL_SRC_GROSS_AMOUNT,
    C_COL_SRC_NAME, C_COL_SRC_RATE, C_COL_SRC_REASON, C_COL_SRC_SURNAME, C_COL_SRC_TAX_CODE,
    C_COL_SRC_TAXABLE_AMOUNT, C_COL_SRC_VAT_NUMBER, C_COL_SRC_WITHHELD_AMOUNT,
    C_PLACEHOLDER_FISCAL_CODE, C_PLACEHOLDER_NAME, C_PLACEHOLDER_SURNAME,
    C_PLACEHOLDER_VAT_NUMBER, N_LEN_FISCAL_CODE, TUP_COLS_LEDGER, TUP_COLS_REGISTRY,
};
use crate::fiscal::{CachedPlaceRegistry, PlaceRegistry, decode_fiscal_code};
use crate::spec::{
    ConvertError, EnumCellValue, SpecConvertOptions, SpecProjectedOutputs, SpecProjectionReport,
    SpecRecordSet,
};
use crate::util::{
    dedup_rows, normalize_display_text, parse_numeric_or_passthrough, scale_percent_to_units,
    strip_country_prefix,
};

/// Fields the registry projection reads from one source row.
#[derive(Debug, Clone, PartialEq)]
struct SpecRegistrySource {
    fiscal_code: EnumCellValue,
    vat_number: EnumCellValue,
    surname: EnumCellValue,
    name: EnumCellValue,
}

impl SpecRegistrySource {
    fn placeholder() -> Self {
        Self {
            fiscal_code: EnumCellValue::text(C_PLACEHOLDER_FISCAL_CODE),
            vat_number: EnumCellValue::text(C_PLACEHOLDER_VAT_NUMBER),
            surname: EnumCellValue::text(C_PLACEHOLDER_SURNAME),
            name: EnumCellValue::text(C_PLACEHOLDER_NAME),
        }
    }
}

/// Output row under construction, addressed by schema column name.
struct RowBuilder<'a> {
    schema: &'a [&'a str],
    cells: Vec<EnumCellValue>,
}

impl<'a> RowBuilder<'a> {
    fn new(schema: &'a [&'a str]) -> Self {
        Self {
            schema,
            cells: vec![EnumCellValue::empty(); schema.len()],
        }
    }

    fn set(&mut self, column: &str, value: EnumCellValue) -> Result<(), ConvertError> {
        let n_idx = derive_column_index(self.schema, column)?;
        self.cells[n_idx] = value;
        Ok(())
    }

    fn finish(self) -> Vec<EnumCellValue> {
        self.cells
    }
}

fn derive_column_index(columns: &[&str], name: &str) -> Result<usize, ConvertError> {
    columns
        .iter()
        .position(|c_col| *c_col == name)
        .ok_or_else(|| ConvertError::Schema(format!("Column not found: {name:?}")))
}

/// Source view with checked column positions.
struct SourceColumns<'a> {
    records: &'a SpecRecordSet,
}

impl SourceColumns<'_> {
    fn get<'r>(
        &self,
        row: &'r [EnumCellValue],
        name: &str,
    ) -> Result<&'r EnumCellValue, ConvertError> {
        let n_idx = self
            .records
            .column_index(name)
            .ok_or_else(|| ConvertError::Schema(format!("Column not found: {name:?}")))?;
        Ok(&row[n_idx])
    }
}

/// Whether a source identifier cell counts as present.
fn is_identifier_present(value: &EnumCellValue) -> bool {
    match value {
        EnumCellValue::Number(n) => !n.is_nan(),
        other => !other.is_blank(),
    }
}

/// Project reconciled rows into the registry and ledger record sets.
///
/// Rows without an identifier are skipped by both outputs. When none
/// qualifies, the registry receives one placeholder row and the ledger is
/// built from every reconciled row.
pub fn project_outputs(
    reconciled: &SpecRecordSet,
    options: &SpecConvertOptions,
    registry: &dyn PlaceRegistry,
) -> Result<SpecProjectedOutputs, ConvertError> {
    let source = SourceColumns {
        records: reconciled,
    };
    let n_idx_fiscal_code = reconciled.column_index(C_COL_SRC_FISCAL_CODE).ok_or_else(|| {
        ConvertError::Schema(format!("Column not found: {C_COL_SRC_FISCAL_CODE:?}"))
    })?;

    let l_rows_qualifying: Vec<&Vec<EnumCellValue>> = reconciled
        .rows()
        .iter()
        .filter(|row| is_identifier_present(&row[n_idx_fiscal_code]))
        .collect();

    let mut report = SpecProjectionReport {
        rows_qualifying: l_rows_qualifying.len(),
        if_placeholder_used: l_rows_qualifying.is_empty(),
        ..Default::default()
    };

    let l_registry_sources: Vec<SpecRegistrySource> = if l_rows_qualifying.is_empty() {
        vec![SpecRegistrySource::placeholder()]
    } else {
        l_rows_qualifying
            .iter()
            .map(|row| {
                Ok(SpecRegistrySource {
                    fiscal_code: source.get(row, C_COL_SRC_FISCAL_CODE)?.clone(),
                    vat_number: source.get(row, C_COL_SRC_VAT_NUMBER)?.clone(),
                    surname: source.get(row, C_COL_SRC_SURNAME)?.clone(),
                    name: source.get(row, C_COL_SRC_NAME)?.clone(),
                })
            })
            .collect::<Result<_, ConvertError>>()?
    };

    let registry_cached = CachedPlaceRegistry::new(registry);
    let mut l_registry_rows = Vec::with_capacity(l_registry_sources.len());
    for registry_source in &l_registry_sources {
        l_registry_rows.push(project_registry_row(
            registry_source,
            options,
            &registry_cached,
            &mut report,
        )?);
    }
    let (l_registry_rows, n_removed) = dedup_rows(l_registry_rows);
    report.rows_duplicate_removed = n_removed;

    let l_ledger_sources: Vec<&Vec<EnumCellValue>> = if l_rows_qualifying.is_empty() {
        reconciled.rows().iter().collect()
    } else {
        l_rows_qualifying
    };
    let l_ledger_rows = l_ledger_sources
        .into_iter()
        .map(|row| project_ledger_row(&source, row, options))
        .collect::<Result<Vec<_>, ConvertError>>()?;

    let registry_out = SpecRecordSet::try_new(
        TUP_COLS_REGISTRY.iter().map(|c| c.to_string()).collect(),
        l_registry_rows,
    )?;
    let ledger_out = SpecRecordSet::try_new(
        TUP_COLS_LEDGER.iter().map(|c| c.to_string()).collect(),
        l_ledger_rows,
    )?;

    info!(
        rows_qualifying = report.rows_qualifying,
        codes_decoded = report.codes_decoded,
        places_fallback = report.places_fallback,
        registry_rows = registry_out.height(),
        ledger_rows = ledger_out.height(),
        placeholder = report.if_placeholder_used,
        "projected outputs"
    );

    Ok(SpecProjectedOutputs {
        registry: registry_out,
        ledger: ledger_out,
        report,
    })
}

fn project_registry_row(
    registry_source: &SpecRegistrySource,
    options: &SpecConvertOptions,
    registry: &dyn PlaceRegistry,
    report: &mut SpecProjectionReport,
) -> Result<Vec<EnumCellValue>, ConvertError> {
    let mut row = RowBuilder::new(&TUP_COLS_REGISTRY);
    row.set(C_COL_REG_YEAR, EnumCellValue::text(options.year_current.to_string()))?;
    row.set(C_COL_REG_ISSUER_ID, EnumCellValue::empty())?;
    row.set(C_COL_REG_SUBJECT_TYPE, EnumCellValue::empty())?;
    row.set(
        C_COL_REG_FISCAL_CODE,
        EnumCellValue::text(normalize_display_text(&registry_source.fiscal_code)),
    )?;
    row.set(
        C_COL_REG_VAT_NUMBER,
        EnumCellValue::text(strip_country_prefix(&registry_source.vat_number)),
    )?;
    row.set(C_COL_REG_SURNAME, registry_source.surname.clone())?;
    row.set(C_COL_REG_NAME, registry_source.name.clone())?;

    // Only raw text of exactly 16 characters is submitted to the decoder.
    if let EnumCellValue::String(c_code) = &registry_source.fiscal_code
        && c_code.chars().count() == N_LEN_FISCAL_CODE
        && let Some(info) = decode_fiscal_code(c_code, options.year_current, registry)
    {
        report.codes_decoded += 1;
        if info.if_place_fallback {
            report.places_fallback += 1;
        }
        row.set(C_COL_REG_SEX, EnumCellValue::text(info.sex.code()))?;
        row.set(C_COL_REG_BIRTH_DATE, EnumCellValue::text(info.birth_date))?;
        row.set(C_COL_REG_BIRTH_PLACE, EnumCellValue::text(info.place_name))?;
        row.set(C_COL_REG_BIRTH_REGION, EnumCellValue::text(info.place_region))?;
    }

    Ok(row.finish())
}

fn project_ledger_row(
    source: &SourceColumns<'_>,
    row_source: &[EnumCellValue],
    options: &SpecConvertOptions,
) -> Result<Vec<EnumCellValue>, ConvertError> {
    let get = |name: &str| source.get(row_source, name);

    let mut row = RowBuilder::new(&TUP_COLS_LEDGER);
    row.set(C_COL_LED_YEAR, EnumCellValue::text(options.year_current.to_string()))?;
    row.set(C_COL_LED_ISSUER_ID, EnumCellValue::empty())?;
    row.set(
        C_COL_LED_FISCAL_CODE,
        EnumCellValue::text(normalize_display_text(get(C_COL_SRC_FISCAL_CODE)?)),
    )?;
    row.set(
        C_COL_LED_VAT_NUMBER,
        EnumCellValue::text(strip_country_prefix(get(C_COL_SRC_VAT_NUMBER)?)),
    )?;
    row.set(C_COL_LED_FOREIGN_ID, EnumCellValue::empty())?;
    row.set(C_COL_LED_SURNAME, get(C_COL_SRC_SURNAME)?.clone())?;
    row.set(C_COL_LED_NAME, get(C_COL_SRC_NAME)?.clone())?;
    row.set(C_COL_LED_REASON, get(C_COL_SRC_REASON)?.clone())?;
    row.set(
        C_COL_LED_COMPETENCE_YEAR,
        EnumCellValue::text(options.year_previous().to_string()),
    )?;
    row.set(C_COL_LED_TAX_CODE, get(C_COL_SRC_TAX_CODE)?.clone())?;

    let rate = scale_percent_to_units(get(C_COL_SRC_RATE)?);
    row.set(C_COL_LED_RATE, rate.clone())?;
    row.set(C_COL_LED_RATE_ADVANCE, rate)?;

    row.set(
        C_COL_LED_GROSS_AMOUNT,
        parse_numeric_or_passthrough(get(C_COL_SRC_GROSS_AMOUNT)?),
    )?;
    row.set(C_COL_LED_EXEMPT_CODE, get(C_COL_SRC_EXEMPT_CODE)?.clone())?;
    row.set(
        C_COL_LED_EXEMPT_AMOUNT,
        parse_numeric_or_passthrough(get(C_COL_SRC_EXEMPT_AMOUNT)?),
    )?;
    row.set(
        C_COL_LED_TAXABLE_AMOUNT,
        parse_numeric_or_passthrough(get(C_COL_SRC_TAXABLE_AMOUNT)?),
    )?;
    row.set(
        C_COL_LED_WITHHELD_AMOUNT,
        parse_numeric_or_passthrough(get(C_COL_SRC_WITHHELD_AMOUNT)?),
    )?;

    Ok(row.finish())
}

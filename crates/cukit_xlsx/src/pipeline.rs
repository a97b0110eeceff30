//! End-to-end conversion: locate, reconcile, project, serialize.

use tracing::info;

use crate::conf::{
    C_SHEET_NAME_LEDGER, C_SHEET_NAME_REGISTRY, TUP_COLS_LEDGER_TEXT, TUP_COLS_REGISTRY_TEXT,
    TUP_COLS_REQUIRED,
};
use crate::fiscal::PlaceRegistry;
use crate::locator::locate_table;
use crate::projector::project_outputs;
use crate::reconcile::reconcile_columns;
use crate::spec::{
    ConvertError, EnumTableSource, SpecConvertOptions, SpecConvertOutput, SpecConvertReport,
    SpecProjectedOutputs, SpecRecordSet,
};
use crate::writer::write_record_set_xlsx;

/// Reconcile a located source table and project it onto both output schemas.
pub fn convert_record_set(
    records: &SpecRecordSet,
    options: &SpecConvertOptions,
    registry: &dyn PlaceRegistry,
) -> Result<SpecProjectedOutputs, ConvertError> {
    let reconciled = reconcile_columns(records, &TUP_COLS_REQUIRED)?;
    project_outputs(&reconciled, options, registry)
}

/// Convert one uploaded workbook into the registry and ledger workbooks.
pub fn convert_workbook(
    data: &[u8],
    options: &SpecConvertOptions,
    registry: &dyn PlaceRegistry,
) -> Result<SpecConvertOutput, ConvertError> {
    let located = locate_table(data, &options.table_name)?;
    let projected = convert_record_set(&located.records, options, registry)?;

    let registry_xlsx = write_record_set_xlsx(
        &projected.registry,
        C_SHEET_NAME_REGISTRY,
        &TUP_COLS_REGISTRY_TEXT,
    )?;
    let ledger_xlsx =
        write_record_set_xlsx(&projected.ledger, C_SHEET_NAME_LEDGER, &TUP_COLS_LEDGER_TEXT)?;

    let mut report = SpecConvertReport {
        source: located.source,
        projection: projected.report,
        warnings: vec![],
    };
    if report.source == EnumTableSource::FirstSheet {
        report.warn(format!(
            "Table {:?} not found; read the first worksheet instead.",
            options.table_name
        ));
    }
    if report.projection.if_placeholder_used {
        report.warn("No row carries a fiscal code; the registry holds a placeholder row.");
    }
    if report.projection.places_fallback > 0 {
        report.warn(format!(
            "{} birth place(s) could not be resolved and use the code as name.",
            report.projection.places_fallback
        ));
    }

    info!(
        registry_rows = projected.registry.height(),
        ledger_rows = projected.ledger.height(),
        registry_bytes = registry_xlsx.len(),
        ledger_bytes = ledger_xlsx.len(),
        "conversion finished"
    );

    Ok(SpecConvertOutput {
        registry_xlsx,
        ledger_xlsx,
        report,
    })
}

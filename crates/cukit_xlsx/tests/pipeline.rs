use std::io::{Cursor, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use rust_xlsxwriter::{Table, TableColumn, Workbook};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use cukit_xlsx::conf::{
    C_COL_LED_COMPETENCE_YEAR, C_COL_LED_EXEMPT_AMOUNT, C_COL_LED_EXEMPT_CODE,
    C_COL_LED_FISCAL_CODE, C_COL_LED_GROSS_AMOUNT, C_COL_LED_RATE, C_COL_LED_RATE_ADVANCE,
    C_COL_LED_REASON, C_COL_LED_TAX_CODE, C_COL_LED_VAT_NUMBER, C_COL_LED_WITHHELD_AMOUNT,
    C_COL_LED_YEAR, C_COL_REG_BIRTH_DATE, C_COL_REG_BIRTH_PLACE, C_COL_REG_BIRTH_REGION,
    C_COL_REG_FISCAL_CODE, C_COL_REG_NAME, C_COL_REG_SEX, C_COL_REG_SURNAME, C_COL_REG_VAT_NUMBER,
    C_COL_REG_YEAR, C_SHEET_NAME_LEDGER, C_SHEET_NAME_REGISTRY, TUP_COLS_LEDGER,
    TUP_COLS_REGISTRY, TUP_COLS_REQUIRED,
};
use cukit_xlsx::{
    ConvertError, EnumCellValue, EnumTableSource, MapPlaceRegistry, PlaceRegistry,
    RegistryError, SpecConvertOptions, SpecHandlerConfig, convert_record_set, convert_workbook,
    handle_request, locate_table,
};

struct SheetFixture<'a> {
    name: &'a str,
    table_name: Option<&'a str>,
    row_header: u32,
    headers: Vec<String>,
    rows: Vec<Vec<EnumCellValue>>,
}

fn build_workbook(sheets: &[SheetFixture<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name).unwrap();
        if sheet.row_header > 0 {
            worksheet.write_string(0, 0, "Riepilogo compensi").unwrap();
        }
        for (n_col, c_header) in sheet.headers.iter().enumerate() {
            worksheet
                .write_string(sheet.row_header, n_col as u16, c_header)
                .unwrap();
        }
        for (n_row, row) in sheet.rows.iter().enumerate() {
            let n_row_abs = sheet.row_header + 1 + n_row as u32;
            for (n_col, value) in row.iter().enumerate() {
                match value {
                    EnumCellValue::None => {}
                    EnumCellValue::String(val) => {
                        worksheet.write_string(n_row_abs, n_col as u16, val).unwrap();
                    }
                    EnumCellValue::Number(val) => {
                        worksheet.write_number(n_row_abs, n_col as u16, *val).unwrap();
                    }
                }
            }
        }
        if let Some(c_table_name) = sheet.table_name {
            let l_columns: Vec<TableColumn> = sheet
                .headers
                .iter()
                .map(|c_header| TableColumn::new().set_header(c_header))
                .collect();
            let table = Table::new().set_name(c_table_name).set_columns(&l_columns);
            let n_rows_data = usize::max(1, sheet.rows.len()) as u32;
            worksheet
                .add_table(
                    sheet.row_header,
                    0,
                    sheet.row_header + n_rows_data,
                    sheet.headers.len() as u16 - 1,
                    &table,
                )
                .unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn required_headers() -> Vec<String> {
    TUP_COLS_REQUIRED.iter().map(|c| c.to_string()).collect()
}

fn payee_row(fiscal_code: &str, vat_number: &str, surname: &str, name: &str) -> Vec<EnumCellValue> {
    TUP_COLS_REQUIRED
        .iter()
        .map(|c_col| match *c_col {
            "C. Fisc" => EnumCellValue::text(fiscal_code),
            "P. Iva" => EnumCellValue::text(vat_number),
            "Cognome / Denominazione Percipiente" => EnumCellValue::text(surname),
            "Nome Percipiente" => EnumCellValue::text(name),
            "Causale CU" => EnumCellValue::text("A"),
            "Codice Tributo" => EnumCellValue::text("1040"),
            "AMMONTARE LORDO CORRISPOSTO" => EnumCellValue::text("1000,50"),
            "TOTALE SOMME NON SOGGETTE A RITENUTA D'ACCONTO" => EnumCellValue::text("12,5"),
            "Codice Somme non soggette a RdA" => EnumCellValue::text("3"),
            "IMPONIBILE IRPEF" => EnumCellValue::text("=1000.5"),
            "% RITENUTA D'ACCONTO" => EnumCellValue::Number(0.2),
            "IMPORTO RITENUTA D'ACCONTO" => EnumCellValue::Number(200.1),
            _ => EnumCellValue::None,
        })
        .collect()
}

fn options() -> SpecConvertOptions {
    SpecConvertOptions {
        table_name: "TableA2".to_string(),
        year_current: 2024,
    }
}

fn rome_registry() -> MapPlaceRegistry {
    let mut registry = MapPlaceRegistry::new();
    registry.insert("H501", "ROMA", "RM");
    registry
}

/// Read a single-sheet output as `(headers, rows)`.
fn read_output(bytes: &[u8], sheet_name: &str) -> (Vec<String>, Vec<Vec<Data>>) {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(workbook.sheet_names(), vec![sheet_name.to_string()]);
    let range = workbook.worksheet_range(sheet_name).unwrap();
    let mut iter_rows = range.rows();
    let l_headers = iter_rows
        .next()
        .unwrap()
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    (l_headers, iter_rows.map(|row| row.to_vec()).collect())
}

fn value_at<'a>(headers: &[String], row: &'a [Data], column: &str) -> &'a Data {
    let n_idx = headers.iter().position(|c| c == column).unwrap();
    &row[n_idx]
}

fn text(val: &str) -> Data {
    Data::String(val.to_string())
}

#[test]
fn test_named_table_end_to_end() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Dati",
        table_name: Some("TableA2"),
        row_header: 1,
        headers: required_headers(),
        rows: vec![payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario")],
    }]);

    let output = convert_workbook(&bytes, &options(), &rome_registry()).unwrap();
    assert_eq!(
        output.report.source,
        EnumTableSource::NamedTable {
            sheet_name: "Dati".to_string()
        }
    );
    assert_eq!(output.report.projection.codes_decoded, 1);
    assert!(output.report.warnings.is_empty());

    let (l_headers, l_rows) = read_output(&output.registry_xlsx, C_SHEET_NAME_REGISTRY);
    assert_eq!(l_headers, TUP_COLS_REGISTRY.to_vec());
    assert_eq!(l_rows.len(), 1);
    let row = &l_rows[0];
    assert_eq!(value_at(&l_headers, row, C_COL_REG_YEAR), &text("2024"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_FISCAL_CODE), &text("RSSMRA85M01H501Z"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_VAT_NUMBER), &text("12345678901"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_SURNAME), &text("Rossi"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_NAME), &text("Mario"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_SEX), &text("M"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_BIRTH_DATE), &text("01081985"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_BIRTH_PLACE), &text("ROMA"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_BIRTH_REGION), &text("RM"));

    let (l_headers, l_rows) = read_output(&output.ledger_xlsx, C_SHEET_NAME_LEDGER);
    assert_eq!(l_headers, TUP_COLS_LEDGER.to_vec());
    assert_eq!(l_rows.len(), 1);
    let row = &l_rows[0];
    assert_eq!(value_at(&l_headers, row, C_COL_LED_YEAR), &text("2024"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_COMPETENCE_YEAR), &text("2023"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_FISCAL_CODE), &text("RSSMRA85M01H501Z"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_VAT_NUMBER), &text("12345678901"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_TAX_CODE), &text("1040"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_GROSS_AMOUNT), &Data::Float(1000.5));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_RATE), &Data::Float(20.0));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_RATE_ADVANCE), &Data::Float(20.0));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_WITHHELD_AMOUNT), &Data::Float(200.1));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_REASON), &text("A"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_EXEMPT_CODE), &text("3"));
    assert_eq!(value_at(&l_headers, row, C_COL_LED_EXEMPT_AMOUNT), &Data::Float(12.5));
}

#[test]
fn test_table_on_later_sheet_is_found() {
    let bytes = build_workbook(&[
        SheetFixture {
            name: "Note",
            table_name: None,
            row_header: 0,
            headers: vec!["Istruzioni".to_string()],
            rows: vec![vec![EnumCellValue::text("compilare il foglio Dati")]],
        },
        SheetFixture {
            name: "Dati",
            table_name: Some("TableA2"),
            row_header: 1,
            headers: required_headers(),
            rows: vec![
                payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario"),
                payee_row("VRDLCU80A41F205X", "", "Verdi", "Lucia"),
            ],
        },
    ]);

    let located = locate_table(&bytes, "TableA2").unwrap();
    assert_eq!(
        located.source,
        EnumTableSource::NamedTable {
            sheet_name: "Dati".to_string()
        }
    );
    assert_eq!(located.records.height(), 2);
    assert_eq!(located.records.columns(), required_headers().as_slice());
}

/// Copy an xlsx package, replacing the bytes of one part.
fn replace_part(bytes: &[u8], part_name: &str, content: &[u8]) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for n_idx in 0..archive.len() {
        let mut file = archive.by_index(n_idx).unwrap();
        let c_name = file.name().to_string();
        let mut v_content = Vec::new();
        file.read_to_end(&mut v_content).unwrap();
        writer.start_file(c_name.as_str(), options).unwrap();
        if c_name == part_name {
            writer.write_all(content).unwrap();
        } else {
            writer.write_all(&v_content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_malformed_unrelated_table_part_is_skipped() {
    let bytes = build_workbook(&[
        SheetFixture {
            name: "Note",
            table_name: Some("Notes"),
            row_header: 0,
            headers: vec!["Istruzioni".to_string()],
            rows: vec![vec![EnumCellValue::text("compilare il foglio Dati")]],
        },
        SheetFixture {
            name: "Dati",
            table_name: Some("TableA2"),
            row_header: 1,
            headers: required_headers(),
            rows: vec![payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario")],
        },
    ]);
    let bytes = replace_part(&bytes, "xl/tables/table1.xml", b"<table name=\"Notes\"");

    let located = locate_table(&bytes, "TableA2").unwrap();
    assert_eq!(
        located.source,
        EnumTableSource::NamedTable {
            sheet_name: "Dati".to_string()
        }
    );
    assert_eq!(located.records.height(), 1);
}

#[test]
fn test_first_sheet_fallback_without_table() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Foglio1",
        table_name: None,
        row_header: 0,
        headers: required_headers(),
        rows: vec![payee_row("VRDLCU80A41F205X", "IT00000000001", "Verdi", "Lucia")],
    }]);

    let output = convert_workbook(&bytes, &options(), &MapPlaceRegistry::new()).unwrap();
    assert_eq!(output.report.source, EnumTableSource::FirstSheet);
    assert_eq!(output.report.projection.places_fallback, 1);
    assert_eq!(output.report.warnings.len(), 2);

    let (l_headers, l_rows) = read_output(&output.registry_xlsx, C_SHEET_NAME_REGISTRY);
    let row = &l_rows[0];
    assert_eq!(value_at(&l_headers, row, C_COL_REG_SEX), &text("F"));
    assert_eq!(value_at(&l_headers, row, C_COL_REG_BIRTH_DATE), &text("01011980"));
    assert_eq!(
        value_at(&l_headers, row, C_COL_REG_BIRTH_PLACE),
        &text("Da Codice: F205")
    );
}

#[test]
fn test_table_without_data_rows_is_no_data_found() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Dati",
        table_name: Some("TableA2"),
        row_header: 1,
        headers: required_headers(),
        rows: vec![],
    }]);

    let err = convert_workbook(&bytes, &options(), &MapPlaceRegistry::new()).unwrap_err();
    assert!(matches!(err, ConvertError::NoDataFound));

    let body = serde_json::json!({ "excelBase64": STANDARD.encode(&bytes) }).to_string();
    let connector = |_credential: Option<&str>| -> Result<Box<dyn PlaceRegistry>, RegistryError> {
        Ok(Box::new(MapPlaceRegistry::new()))
    };
    let response = handle_request(body.as_bytes(), &connector, &SpecHandlerConfig::default());
    assert_eq!(response.status, 404);
    assert_eq!(
        response.body,
        serde_json::json!({ "error": "Nessun dato trovato" }).to_string()
    );
}

#[test]
fn test_rows_without_identifier_yield_placeholder_registry() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Dati",
        table_name: Some("TableA2"),
        row_header: 1,
        headers: required_headers(),
        rows: vec![
            payee_row("", "IT12345678901", "Rossi", "Mario"),
            payee_row("", "", "Bianchi", "Luca"),
        ],
    }]);

    let output = convert_workbook(&bytes, &options(), &MapPlaceRegistry::new()).unwrap();
    assert!(output.report.projection.if_placeholder_used);

    let (l_headers, l_rows) = read_output(&output.registry_xlsx, C_SHEET_NAME_REGISTRY);
    assert_eq!(l_rows.len(), 1);
    assert_eq!(
        value_at(&l_headers, &l_rows[0], C_COL_REG_FISCAL_CODE),
        &text("ESEMPIO12345ABCDE")
    );
    assert_eq!(
        value_at(&l_headers, &l_rows[0], C_COL_REG_VAT_NUMBER),
        &text("12345678901")
    );

    let (_, l_rows) = read_output(&output.ledger_xlsx, C_SHEET_NAME_LEDGER);
    assert_eq!(l_rows.len(), 2);
}

#[test]
fn test_conversion_is_repeatable() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Dati",
        table_name: Some("TableA2"),
        row_header: 1,
        headers: required_headers(),
        rows: vec![
            payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario"),
            payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario"),
        ],
    }]);

    let registry = rome_registry();
    let located = locate_table(&bytes, "TableA2").unwrap();
    let first = convert_record_set(&located.records, &options(), &registry).unwrap();
    let second = convert_record_set(&located.records, &options(), &registry).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.registry.height(), 1);
    assert_eq!(first.report.rows_duplicate_removed, 1);
    assert_eq!(first.ledger.height(), 2);
}

#[test]
fn test_handler_success_returns_both_workbooks() {
    let bytes = build_workbook(&[SheetFixture {
        name: "Dati",
        table_name: Some("TableA2"),
        row_header: 1,
        headers: required_headers(),
        rows: vec![payee_row("RSSMRA85M01H501Z", "IT12345678901", "Rossi", "Mario")],
    }]);
    let body = serde_json::json!({
        "excelBase64": STANDARD.encode(&bytes),
        "dbPassword": "per-request",
    })
    .to_string();
    let connector = |credential: Option<&str>| -> Result<Box<dyn PlaceRegistry>, RegistryError> {
        assert_eq!(credential, Some("per-request"));
        Ok(Box::new(rome_registry()))
    };
    let config = SpecHandlerConfig {
        year_current: Some(2024),
        ..Default::default()
    };

    let response = handle_request(body.as_bytes(), &connector, &config);
    assert_eq!(response.status, 200);

    let value: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    let v_registry = STANDARD
        .decode(value["output1Base64"].as_str().unwrap())
        .unwrap();
    let v_ledger = STANDARD
        .decode(value["output2Base64"].as_str().unwrap())
        .unwrap();

    let (l_headers, l_rows) = read_output(&v_registry, C_SHEET_NAME_REGISTRY);
    assert_eq!(value_at(&l_headers, &l_rows[0], C_COL_REG_BIRTH_PLACE), &text("ROMA"));
    let (l_headers, l_rows) = read_output(&v_ledger, C_SHEET_NAME_LEDGER);
    assert_eq!(value_at(&l_headers, &l_rows[0], C_COL_LED_YEAR), &text("2024"));
}

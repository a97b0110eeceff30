//! `cukit_xlsx` v1:
//! Rust-side kernel turning a payee spreadsheet into the two import workbooks
//! (anagrafiche and compensi) of a withholding certification.
//!
//! Modules:
//! - `conf`      : constants, output schemas and default presets
//! - `spec`      : specs/models/options/errors
//! - `util`      : value normalizers and record-set helpers
//! - `fiscal`    : fiscal code decoder and place registry capability
//! - `locator`   : source table discovery inside the uploaded workbook
//! - `reconcile` : required-column reconciliation
//! - `projector` : registry and ledger projections
//! - `writer`    : pure-Rust writer kernel
//! - `pipeline`  : end-to-end conversion
//! - `handler`   : JSON request handler
pub mod conf;
pub mod fiscal;
pub mod handler;
pub mod locator;
pub mod pipeline;
pub mod projector;
pub mod reconcile;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    C_TABLE_NAME_DEFAULT, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    TUP_COLS_LEDGER, TUP_COLS_REGISTRY, TUP_COLS_REQUIRED, TUP_EXCEL_ILLEGAL,
};
pub use fiscal::{
    CachedPlaceRegistry, FnPlaceRegistry, MapPlaceRegistry, PlaceRegistry,
    PlaceRegistryConnector, UnavailablePlaceRegistry, decode_fiscal_code,
    decode_fiscal_code_facts,
};
pub use handler::{SpecHandlerRequest, SpecHandlerResponse, handle_request};
pub use locator::locate_table;
pub use pipeline::{convert_record_set, convert_workbook};
pub use spec::{
    ConvertError, EnumAutofitColumnsRule, EnumCellValue, EnumSex, EnumTableSource,
    RegistryError, SpecAutofitCellsPolicy, SpecCellFormat, SpecConvertOptions,
    SpecConvertOutput, SpecConvertReport, SpecFiscalCodeFacts, SpecFiscalCodeInfo,
    SpecHandlerConfig, SpecLocatedTable, SpecPlace, SpecProjectedOutputs, SpecProjectionReport,
    SpecRecordSet,
};
pub use util::sanitize_sheet_name;
pub use writer::{SpecXlsxSheetWriteOptions, XlsxWriter, write_record_set_xlsx};

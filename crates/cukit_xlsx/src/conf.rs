//! Conversion constants, fixed output schemas and default preset factories.

use std::collections::BTreeMap;

use chrono::Datelike;

use crate::spec::{SpecCellFormat, SpecConvertOptions, SpecHandlerConfig};

////////////////////////////////////////////////////////////////////////////////
// #region ExcelLimits

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SourceTable

/// Identifier of the named table region holding the withholding records.
pub const C_TABLE_NAME_DEFAULT: &str = "TableA2";

pub const C_COL_SRC_SURNAME: &str = "Cognome / Denominazione Percipiente";
pub const C_COL_SRC_NAME: &str = "Nome Percipiente";
pub const C_COL_SRC_VAT_NUMBER: &str = "P. Iva";
pub const C_COL_SRC_FISCAL_CODE: &str = "C. Fisc";
pub const C_COL_SRC_REASON: &str = "Causale CU";
pub const C_COL_SRC_TAX_CODE: &str = "Codice Tributo";
pub const C_COL_SRC_GROSS_AMOUNT: &str = "AMMONTARE LORDO CORRISPOSTO";
pub const C_COL_SRC_EXEMPT_AMOUNT: &str = "TOTALE SOMME NON SOGGETTE A RITENUTA D'ACCONTO";
pub const C_COL_SRC_TAXABLE_AMOUNT: &str = "IMPONIBILE IRPEF";
pub const C_COL_SRC_RATE: &str = "% RITENUTA D'ACCONTO";
pub const C_COL_SRC_WITHHELD_AMOUNT: &str = "IMPORTO RITENUTA D'ACCONTO";
pub const C_COL_SRC_EXEMPT_CODE: &str = "Codice Somme non soggette a RdA";
pub const C_COL_SRC_SUBJECT_SHARE: &str = "% COMPENSO SOGGETTA A RITENUTA D'ACCONTO";

/// Canonical source columns, in reconciliation order.
pub const TUP_COLS_REQUIRED: [&str; 13] = [
    C_COL_SRC_SURNAME,
    C_COL_SRC_NAME,
    C_COL_SRC_VAT_NUMBER,
    C_COL_SRC_FISCAL_CODE,
    C_COL_SRC_REASON,
    C_COL_SRC_TAX_CODE,
    C_COL_SRC_GROSS_AMOUNT,
    C_COL_SRC_EXEMPT_AMOUNT,
    C_COL_SRC_TAXABLE_AMOUNT,
    C_COL_SRC_RATE,
    C_COL_SRC_WITHHELD_AMOUNT,
    C_COL_SRC_EXEMPT_CODE,
    C_COL_SRC_SUBJECT_SHARE,
];

/// Illustrative registry row used when no source row carries an identifier.
pub const C_PLACEHOLDER_FISCAL_CODE: &str = "ESEMPIO12345ABCDE";
pub const C_PLACEHOLDER_VAT_NUMBER: &str = "IT12345678901";
pub const C_PLACEHOLDER_SURNAME: &str = "ESEMPIO COGNOME";
pub const C_PLACEHOLDER_NAME: &str = "ESEMPIO NOME";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FiscalCode

/// Length of a personal fiscal code.
pub const N_LEN_FISCAL_CODE: usize = 16;
/// Month letters, January first.
pub const TUP_MONTH_LETTERS: [char; 12] = [
    'A', 'B', 'C', 'D', 'E', 'H', 'L', 'M', 'P', 'R', 'S', 'T',
];
/// Day offset marking a female holder.
pub const N_DAY_OFFSET_FEMALE: u32 = 40;
/// Prefix of the birth place text emitted when the registry cannot resolve a code.
pub const C_PLACE_FALLBACK_PREFIX: &str = "Da Codice: ";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RegistrySchema

pub const C_SHEET_NAME_REGISTRY: &str = "Anagrafiche";

pub const C_COL_REG_YEAR: &str = "Anno Certificazione Unica";
pub const C_COL_REG_ISSUER_ID: &str = "Codice Fiscale Sostituto";
pub const C_COL_REG_SUBJECT_TYPE: &str = "Tipo soggetto";
pub const C_COL_REG_FISCAL_CODE: &str = "Codice Fiscale Percipiente";
pub const C_COL_REG_VAT_NUMBER: &str = "Partita IVA del Percipiente";
pub const C_COL_REG_SURNAME: &str = "Cognome / Denominazione Percipiente";
pub const C_COL_REG_NAME: &str = "Nome Percipiente";
pub const C_COL_REG_SEX: &str = "Sesso Percipiente";
pub const C_COL_REG_BIRTH_DATE: &str = "Data di nascita Percipiente (GGMMAAAA)";
pub const C_COL_REG_BIRTH_PLACE: &str = "Comune o Stato estero di nascita Percipiente";
pub const C_COL_REG_BIRTH_REGION: &str = "Provincia del comune di nascita Percipiente";

/// Registry (anagrafiche) output columns, in template order.
pub const TUP_COLS_REGISTRY: [&str; 42] = [
    C_COL_REG_YEAR,
    C_COL_REG_ISSUER_ID,
    C_COL_REG_SUBJECT_TYPE,
    C_COL_REG_FISCAL_CODE,
    C_COL_REG_VAT_NUMBER,
    C_COL_REG_SURNAME,
    C_COL_REG_NAME,
    C_COL_REG_SEX,
    C_COL_REG_BIRTH_DATE,
    C_COL_REG_BIRTH_PLACE,
    C_COL_REG_BIRTH_REGION,
    "Domicilio al 01/01/2024 Comune",
    "Domicilio 01/01/2024 Provincia",
    "Domicilio al 01/01/2024 Codice IRPEF",
    "Fusione Comune",
    "Domcilio al 01/01/2025 Comune",
    "Domcilio al 01/01/2025 Provincia",
    "Domcilio al 01/01/2025 Codice IRPEF Comune",
    "Fusione Comune 2",
    "Codice fiscale Rappresentante",
    "Codice identificazione fiscale estero",
    "Località di residenza estera",
    "Luogo di attinenza",
    "Indirizzo di residenza estera",
    "Non residenti Schumacker",
    "Codice stato estero",
    "Frontaliere",
    "Residenza o Sede legale - Indirizzo",
    "Residenza o Sede legale - Stato",
    "Residenza o Sede legale - Comune",
    "Residenza o Sede legale - Provincia",
    "Residenza o Sede legale - CAP",
    "Residenza o Sede legale - Email",
    "Residenza o Sede legale - PEC",
    "Domicilio fiscale - Indirizzo",
    "Domicilio fiscale - Stato",
    "Domicilio fiscale - Comune",
    "Domicilio fiscale - Provincia",
    "Domicilio fiscale - CAP",
    "Domicilio fiscale - Email",
    "Domicilio fiscale - PEC",
    "Docenti ricercatori e impatriati Codice stato estero",
];

/// Registry columns stored as text so identifiers keep leading zeros.
pub const TUP_COLS_REGISTRY_TEXT: [&str; 2] = [C_COL_REG_FISCAL_CODE, C_COL_REG_VAT_NUMBER];

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LedgerSchema

pub const C_SHEET_NAME_LEDGER: &str = "Compensi";

pub const C_COL_LED_YEAR: &str = "Anno Certificazione Unica";
pub const C_COL_LED_ISSUER_ID: &str = "Codice fiscale Sostituto";
pub const C_COL_LED_FISCAL_CODE: &str = "Codice fiscale Percipiente";
pub const C_COL_LED_VAT_NUMBER: &str = "Partita IVA Percipiente";
pub const C_COL_LED_FOREIGN_ID: &str = "Codice identificazione fiscale estero";
pub const C_COL_LED_SURNAME: &str = "Cognome / Denominazione Percipiente";
pub const C_COL_LED_NAME: &str = "Nome Percipiente";
pub const C_COL_LED_REASON: &str = "CU AUTONOMO Tipologia reddituale - Causale (punto 1)";
pub const C_COL_LED_COMPETENCE_YEAR: &str = "Anno di competenza compenso";
pub const C_COL_LED_TAX_CODE: &str = "Codice tributo";
pub const C_COL_LED_RATE: &str = "Aliquota ritenuta";
pub const C_COL_LED_GROSS_AMOUNT: &str = "CU AUTONOMO   Dati fiscali - Ammontare lordo corrisposto (punto 4)";
pub const C_COL_LED_RATE_ADVANCE: &str = "Aliquota ritenuta d'acconto";
pub const C_COL_LED_EXEMPT_CODE: &str = "CU AUTONOMO Dati fiscali - Codice (punto 6)";
pub const C_COL_LED_EXEMPT_AMOUNT: &str = "CU AUTONOMO Dati fiscali - Altre somme non soggette a ritenuta (punto 7)";
pub const C_COL_LED_TAXABLE_AMOUNT: &str = "CU AUTONOMO Dati fiscali - Imponibile (punto 8)";
pub const C_COL_LED_WITHHELD_AMOUNT: &str = "CU AUTONOMO Dati fiscali - Ritenute a titolo d'acconto (punto 9)";

/// Ledger (compensi) output columns, in template order.
///
/// Only a handful are populated; the rest keep the template's column positions.
pub const TUP_COLS_LEDGER: [&str; 116] = [
    C_COL_LED_YEAR,
    C_COL_LED_ISSUER_ID,
    C_COL_LED_FISCAL_CODE,
    C_COL_LED_VAT_NUMBER,
    C_COL_LED_FOREIGN_ID,
    C_COL_LED_SURNAME,
    C_COL_LED_NAME,
    "Categoria particolare",
    "Eventi eccezionali",
    "Esclusione dalla precompilata",
    "Tipo operazione",
    "Protocollo comunicazione da sostituire o da annullare - identificativo invio",
    "Protocollo documento da sostituire o da annullare - progressivo attribuito alla C.U. originaria",
    C_COL_LED_REASON,
    C_COL_LED_COMPETENCE_YEAR,
    "Tipo partitario",
    "Percipiente / partitario",
    "Causale",
    C_COL_LED_TAX_CODE,
    C_COL_LED_RATE,
    "Data documento (GGMMAAAA)",
    "Numero fattura / documento",
    "Tipo documento",
    "Data di pagamento (GGMMAAAA)",
    "Tipo operazione ritenute",
    "CU AUTONOMO Dati fiscali - Anno (punto 2)",
    "CU AUTONOMO Dati fiscali - Anticipazione (punto 3)",
    C_COL_LED_GROSS_AMOUNT,
    "CU AUTONOMO Dati fiscali - Somme non soggette a ritenuta regime convenzionale (punto 5)",
    "Percentuale imponibilita'",
    C_COL_LED_RATE_ADVANCE,
    "Aliquota ritenuta d'imposta",
    "Altre somme non soggette - Deduzioni / provvigioni",
    "Altre somme non soggette - Somme non soggette",
    "Altre somme non soggette - Somme che non concorrono al reddito",
    C_COL_LED_EXEMPT_CODE,
    C_COL_LED_EXEMPT_AMOUNT,
    C_COL_LED_TAXABLE_AMOUNT,
    C_COL_LED_WITHHELD_AMOUNT,
    "CU AUTONOMO  Dati fiscali - Ritenute a titolo d'imposta (punto 10)",
    "CU AUTONOMO Dati fiscali - Ritenute sospese (punto 11)",
    "CU AUTONOMO  Dati fiscali - Addizionale regionale a titolo d'acconto (punto 12)",
    "CU AUTONOMO   Dati fiscali - Addizionale regionale a titolo d'imposta (punto 13)",
    "CU AUTONOMO   Dati fiscali - Addizionale regionale sospesa (punto 14)",
    "CU AUTONOMO   Dati fiscali - Addizionale comunale a titolo d'acconto (punto 15)",
    "CU AUTONOMO   Dati fiscali - Addizionale comunale a titolo d'imposta (punto 16)",
    "CU AUTONOMO   Dati fiscali - Addizionale comunale sospesa (punto 17)",
    "CU AUTONOMO    Dati fiscali - Imponibile anni precedenti (punto 18)",
    "CU AUTONOMO Dati fiscali - Ritenute operate anni precedenti (punto 19)",
    "CU AUTONOMO Dati fiscali - Spese rimborsate (punto 20)",
    "CU AUTONOMO Dati fiscali - Somme restituite al netto della ritenuta subita (punto 22)",
    "CU AUTONOMO Dati previdenziali - Codice Fiscale Ente Previdenziale (punto 29)",
    "CU AUTONOMO Dati previdenziali - Denominazione Ente Previdenziale (punto 30)",
    "CU AUTONOMO Dati previdenziali - Tipo di rapporto (punto 31)",
    "CU AUTONOMO Dati previdenziali - Codice azienda (punto 32)",
    "CU AUTONOMO Dati previdenziali - Categoria (punto 33)",
    "CU AUTONOMO Dati previdenziali - Contributi previdenziali a carico del soggetto erogante (punto 34)",
    "CU AUTONOMO Dati previdenziali - Contributi previdenziali a carico del percipiente (punto 35)",
    "CU AUTONOMO Dati previdenziali - Altri contibuti (punto 36)",
    "CU AUTONOMO Dati previdenziali - Importo altri contributi (punto 37)",
    "CU AUTONOMO Dati previdenziali - Contributi dovuti (punto 38)",
    "CU AUTONOMO Dati previdenziali - Contributi versati (punto 39)",
    "CU AUTONOMO Dati previdenziali - Importo franchigia utilizzata (punto 40)",
    "CU AUTONOMO Fallimento e liquidazione coatta amministrativa - Somme corrisposte prima della data di fallimento (punto 41)",
    "CU AUTONOMO Fallimento e liquidazione coatta amministrativa - Somme corrisposte dal curatore /commissario (punto 42)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Codice fisale (punto 52)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Imponibile (punto 53)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Ritenute a titolo d'acconto (punto 54)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Ritenute a titolo d'imposta (punto 55)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Ritenute sospese (punto 56)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Regionale a titolo d'acconto (punto 57)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Regionale a titolo d'imposta (punto 58)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Regionale sospesa (punto 59)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Comunale a titolo d'acconto (punto 60)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Comunale a titolo d'imposta (punto 61)",
    "CU AUTONOMO Redditi erogati da altri soggetti - Add. Comunale sospesa (punto 62)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Codice Fiscale PPAA/Azienda (punto 52)",
    "CU DIPENDENTE   INPS Gestione separata Parasubordinati - Tipo rapporto (punto 51)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Compensi corrisposti al parasubordinato (punto 45)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Contributi dovuti (punto 46)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Contributi a carico del lavoratore (punto 47)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Contributi versati (punto 48)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Tutti (punto 49)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Gennaio (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Febbraio (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Marzo (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Aprile (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Maggio (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Giugno (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Luglio (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Agosto (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Settembre (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Ottobre (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Novembre (punto 50)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati - Dicembre (punto 50)",
    "CU DIPENDENTE       INPS Gestione separata Parasubordinati Sportivi dilettantistici - Tipo rapporto (punto 61)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Altro tipo rapporto (punto 62)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Compensi totali parasubordinati sportivi e assimilati (punto 53)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Imponibile contributivo (punto 54)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Imponibile IVS (punto 55)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Contributi dovuti (punto 56)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Contributi a carico del parasubordinato (punto 57)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Contributi versati (punto 58)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Tutti (punto 59)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Gennaio (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Febbraio (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Marzo (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Aprile (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Maggio (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Giugno (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici - Luglio (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Agosto (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Settembre (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Ottobre (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Novembre (punto 60)",
    "CU DIPENDENTE INPS Gestione separata Parasubordinati Sportivi dilettantistici- Dicembre (punto 60)",
];

/// Ledger columns stored as text so identifiers keep leading zeros.
pub const TUP_COLS_LEDGER_TEXT: [&str; 2] = [C_COL_LED_FISCAL_CODE, C_COL_LED_VAT_NUMBER];

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Handler

/// Error text for a missing or undecodable payload.
pub const C_MSG_INVALID_PAYLOAD: &str = "Inserire il file Excel in formato base64";
/// Error text when the workbook holds no usable table.
pub const C_MSG_NO_DATA_FOUND: &str = "Nessun dato trovato";

/// Environment variable holding the default registry credential.
pub const C_ENV_REGISTRY_CREDENTIAL: &str = "CUKIT_REGISTRY_CREDENTIAL";
/// Environment variable overriding the source table identifier.
pub const C_ENV_TABLE_NAME: &str = "CUKIT_TABLE_NAME";

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Presets

/// Build default named format presets used by [`crate::writer::XlsxWriter`].
pub fn derive_default_xlsx_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("general".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "text".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("@".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            border: Some(1),
            align: Some("center".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default conversion options pinned to the local calendar year.
pub fn derive_default_convert_options() -> SpecConvertOptions {
    SpecConvertOptions {
        table_name: C_TABLE_NAME_DEFAULT.to_string(),
        year_current: chrono::Local::now().year(),
    }
}

/// Build handler configuration from process environment.
///
/// A missing credential is left as `None`; nothing is embedded as a fallback.
pub fn derive_handler_config_from_env() -> SpecHandlerConfig {
    let registry_credential = std::env::var(C_ENV_REGISTRY_CREDENTIAL)
        .ok()
        .filter(|val| !val.trim().is_empty());
    let table_name = std::env::var(C_ENV_TABLE_NAME)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
        .unwrap_or_else(|| C_TABLE_NAME_DEFAULT.to_string());

    SpecHandlerConfig {
        registry_credential,
        table_name,
        year_current: None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

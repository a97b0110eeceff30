use cukit_xlsx::conf::{C_TABLE_NAME_DEFAULT, derive_default_convert_options};
use cukit_xlsx::fiscal::{
    MapPlaceRegistry, PlaceRegistry, PlaceRegistryConnector, decode_fiscal_code_facts,
};
use cukit_xlsx::spec::{
    ConvertError, RegistryError, SpecConvertOptions, SpecHandlerConfig, SpecPlace,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyBytes, PyDict};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "cukit.xlsx.convert.v1";

/// Registry backed by a Python `lookup(code) -> (name, region) | None` callable.
///
/// An exception raised by the callable, or a malformed return value, is a fault.
struct PyPlaceRegistry {
    lookup: Py<PyAny>,
}

impl PlaceRegistry for PyPlaceRegistry {
    fn lookup_place(&self, code: &str) -> Result<Option<SpecPlace>, RegistryError> {
        Python::with_gil(|py| {
            let derive_fault = |err: PyErr| RegistryError::Lookup {
                code: code.to_string(),
                message: err.to_string(),
            };
            let result = self.lookup.call1(py, (code,)).map_err(derive_fault)?;
            let result = result.bind(py);
            if result.is_none() {
                return Ok(None);
            }
            let (name, region): (String, String) = result.extract().map_err(derive_fault)?;
            Ok(Some(SpecPlace { name, region }))
        })
    }
}

/// Connector backed by a Python `connect(credential) -> lookup` callable.
struct PyPlaceRegistryConnector {
    connect: Option<Py<PyAny>>,
}

impl PlaceRegistryConnector for PyPlaceRegistryConnector {
    fn connect(&self, credential: Option<&str>) -> Result<Box<dyn PlaceRegistry>, RegistryError> {
        let Some(connect) = &self.connect else {
            debug!("no place registry configured");
            return Ok(Box::new(MapPlaceRegistry::new()));
        };
        Python::with_gil(|py| {
            let lookup = connect
                .call1(py, (credential,))
                .map_err(|err| RegistryError::Unavailable(err.to_string()))?;
            Ok(Box::new(PyPlaceRegistry { lookup }) as Box<dyn PlaceRegistry>)
        })
    }
}

fn derive_py_err(err: ConvertError) -> PyErr {
    match err {
        ConvertError::InvalidPayload(_) | ConvertError::NoDataFound => {
            PyValueError::new_err(err.public_message())
        }
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn derive_convert_options(table_name: Option<String>, year: Option<i32>) -> SpecConvertOptions {
    let mut cfg_options = derive_default_convert_options();
    if let Some(c_table_name) = table_name {
        cfg_options.table_name = c_table_name;
    }
    if let Some(n_year) = year {
        cfg_options.year_current = n_year;
    }
    cfg_options
}

/// Handle one JSON request body. Returns `(status, json_body)`.
///
/// The configured credential comes from the process environment; the request's
/// `dbPassword` overrides it.
#[pyfunction]
#[pyo3(signature = (body, connect = None, table_name = None, year = None))]
fn handle_request(
    body: &Bound<'_, PyAny>,
    connect: Option<Py<PyAny>>,
    table_name: Option<String>,
    year: Option<i32>,
) -> PyResult<(u16, String)> {
    let v_body: Vec<u8> = match body.extract::<String>() {
        Ok(c_body) => c_body.into_bytes(),
        Err(_) => body
            .extract::<Vec<u8>>()
            .map_err(|_| PyValueError::new_err("body must be str or bytes"))?,
    };

    let mut cfg_handler = SpecHandlerConfig::from_env();
    if let Some(c_table_name) = table_name {
        cfg_handler.table_name = c_table_name;
    }
    cfg_handler.year_current = year;

    let connector = PyPlaceRegistryConnector { connect };
    let response = cukit_xlsx::handle_request(&v_body, &connector, &cfg_handler);
    Ok((response.status, response.body))
}

/// Convert workbook bytes into `(registry_xlsx, ledger_xlsx)`.
#[pyfunction]
#[pyo3(signature = (data, lookup = None, table_name = None, year = None))]
fn convert_workbook(
    py: Python<'_>,
    data: Vec<u8>,
    lookup: Option<Py<PyAny>>,
    table_name: Option<String>,
    year: Option<i32>,
) -> PyResult<(Py<PyBytes>, Py<PyBytes>)> {
    let cfg_options = derive_convert_options(table_name, year);
    let registry: Box<dyn PlaceRegistry> = match lookup {
        Some(lookup) => Box::new(PyPlaceRegistry { lookup }),
        None => Box::new(MapPlaceRegistry::new()),
    };
    let output = cukit_xlsx::convert_workbook(&data, &cfg_options, registry.as_ref())
        .map_err(derive_py_err)?;
    Ok((
        PyBytes::new(py, &output.registry_xlsx).unbind(),
        PyBytes::new(py, &output.ledger_xlsx).unbind(),
    ))
}

/// Decode the structural fields of a fiscal code, or `None` when invalid.
#[pyfunction]
#[pyo3(signature = (value, year = None))]
fn decode_fiscal_code(
    py: Python<'_>,
    value: &str,
    year: Option<i32>,
) -> PyResult<Option<Py<PyDict>>> {
    let n_year = year.unwrap_or_else(|| derive_default_convert_options().year_current);
    let Some(facts) = decode_fiscal_code_facts(value, n_year) else {
        return Ok(None);
    };
    let dict_facts = PyDict::new(py);
    dict_facts.set_item("sex", facts.sex.code())?;
    dict_facts.set_item("day", facts.day)?;
    dict_facts.set_item("month", facts.month)?;
    dict_facts.set_item("year", facts.year)?;
    dict_facts.set_item("birth_date", facts.birth_date_text())?;
    dict_facts.set_item("place_code", facts.place_code)?;
    Ok(Some(dict_facts.unbind()))
}

/// Install a global `tracing` subscriber. Returns `False` when one already exists.
#[pyfunction]
#[pyo3(signature = (filter = None))]
fn init_logging(filter: Option<String>) -> PyResult<bool> {
    let env_filter = match filter {
        Some(c_filter) => {
            EnvFilter::try_new(c_filter).map_err(|err| PyValueError::new_err(err.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    Ok(tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_ok())
}

#[pymodule]
fn _cukit_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(handle_request, module)?)?;
    module.add_function(wrap_pyfunction!(convert_workbook, module)?)?;
    module.add_function(wrap_pyfunction!(decode_fiscal_code, module)?)?;
    module.add_function(wrap_pyfunction!(init_logging, module)?)?;
    module.add("C_TABLE_NAME_DEFAULT", C_TABLE_NAME_DEFAULT)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    Ok(())
}

//! Personal fiscal code decoding and the place registry capability.
//!
//! Structural fields (sex, birth date, place code) come from the code alone.
//! Only the place name and region need a [`PlaceRegistry`]; any registry fault
//! degrades to the `Da Codice: {code}` placeholder.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::conf::{
    C_PLACE_FALLBACK_PREFIX, N_DAY_OFFSET_FEMALE, N_LEN_FISCAL_CODE, TUP_MONTH_LETTERS,
};
use crate::spec::{EnumSex, RegistryError, SpecFiscalCodeFacts, SpecFiscalCodeInfo, SpecPlace};

static RE_FISCAL_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{6}[0-9]{2}[ABCDEHLMPRST][0-9]{2}[A-Z][0-9]{3}[A-Z]$").expect("valid regex")
});

////////////////////////////////////////////////////////////////////////////////
// #region PlaceRegistry

/// Resolve cadastral place codes to `(name, region)`.
///
/// `Ok(None)` means the code is unknown. `Err` is reserved for faults such as a lost connection.
pub trait PlaceRegistry {
    fn lookup_place(&self, code: &str) -> Result<Option<SpecPlace>, RegistryError>;
}

/// Open a [`PlaceRegistry`] for one request.
pub trait PlaceRegistryConnector {
    /// `credential` is the request override when present, else the configured one.
    fn connect(&self, credential: Option<&str>) -> Result<Box<dyn PlaceRegistry>, RegistryError>;
}

impl<F> PlaceRegistryConnector for F
where
    F: Fn(Option<&str>) -> Result<Box<dyn PlaceRegistry>, RegistryError>,
{
    fn connect(&self, credential: Option<&str>) -> Result<Box<dyn PlaceRegistry>, RegistryError> {
        self(credential)
    }
}

/// Registry backed by a lookup closure.
pub struct FnPlaceRegistry<F>(pub F);

impl<F> PlaceRegistry for FnPlaceRegistry<F>
where
    F: Fn(&str) -> Result<Option<SpecPlace>, RegistryError>,
{
    fn lookup_place(&self, code: &str) -> Result<Option<SpecPlace>, RegistryError> {
        (self.0)(code)
    }
}

#[derive(Debug, Deserialize)]
struct RowPlaceCsv {
    code: String,
    name: String,
    #[serde(default)]
    region: String,
}

/// In-memory registry keyed by upper-cased place code.
#[derive(Debug, Clone, Default)]
pub struct MapPlaceRegistry {
    dict_places: HashMap<String, SpecPlace>,
}

impl MapPlaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one place.
    pub fn insert(&mut self, code: &str, name: impl Into<String>, region: impl Into<String>) {
        self.dict_places.insert(
            code.trim().to_uppercase(),
            SpecPlace {
                name: name.into(),
                region: region.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.dict_places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_places.is_empty()
    }

    /// Load from delimited text with a `code,name,region` header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut registry = Self::new();
        for row in rdr.deserialize::<RowPlaceCsv>() {
            let row =
                row.map_err(|err| RegistryError::Unavailable(format!("bad place row: {err}")))?;
            if row.code.is_empty() {
                continue;
            }
            registry.insert(&row.code, row.name, row.region);
        }
        Ok(registry)
    }

    /// Load from a delimited file on disk.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| {
            RegistryError::Unavailable(format!("cannot open {}: {err}", path.display()))
        })?;
        Self::from_csv_reader(file)
    }
}

impl PlaceRegistry for MapPlaceRegistry {
    fn lookup_place(&self, code: &str) -> Result<Option<SpecPlace>, RegistryError> {
        Ok(self.dict_places.get(&code.trim().to_uppercase()).cloned())
    }
}

/// Registry that faults on every lookup. Used when connecting failed.
#[derive(Debug, Clone)]
pub struct UnavailablePlaceRegistry {
    reason: String,
}

impl UnavailablePlaceRegistry {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PlaceRegistry for UnavailablePlaceRegistry {
    fn lookup_place(&self, _code: &str) -> Result<Option<SpecPlace>, RegistryError> {
        Err(RegistryError::Unavailable(self.reason.clone()))
    }
}

/// Per-request memo over another registry.
///
/// Definitive answers (found or unknown) are cached; faults are not, so the next
/// row retries the lookup.
pub struct CachedPlaceRegistry<'a> {
    inner: &'a dyn PlaceRegistry,
    dict_cache: RefCell<HashMap<String, Option<SpecPlace>>>,
}

impl<'a> CachedPlaceRegistry<'a> {
    pub fn new(inner: &'a dyn PlaceRegistry) -> Self {
        Self {
            inner,
            dict_cache: RefCell::new(HashMap::new()),
        }
    }
}

impl PlaceRegistry for CachedPlaceRegistry<'_> {
    fn lookup_place(&self, code: &str) -> Result<Option<SpecPlace>, RegistryError> {
        if let Some(place) = self.dict_cache.borrow().get(code) {
            return Ok(place.clone());
        }
        let place = self.inner.lookup_place(code)?;
        self.dict_cache
            .borrow_mut()
            .insert(code.to_string(), place.clone());
        Ok(place)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Decoder

/// Decode the structural fields of a fiscal code.
///
/// Input is trimmed and upper-cased first. Returns `None` for anything that is not
/// a well-formed personal code. Two-digit years above `year_current % 100` resolve
/// to 19xx, the rest to 20xx.
pub fn decode_fiscal_code_facts(value: &str, year_current: i32) -> Option<SpecFiscalCodeFacts> {
    let c_code = value.trim().to_uppercase();
    if c_code.len() != N_LEN_FISCAL_CODE || !RE_FISCAL_CODE.is_match(&c_code) {
        debug!(code = %c_code, "rejected fiscal code");
        return None;
    }

    let n_year_2d: i32 = c_code[6..8].parse().ok()?;
    let n_century = if n_year_2d > year_current.rem_euclid(100) {
        1900
    } else {
        2000
    };

    let c_month = c_code[8..9].chars().next()?;
    let n_month = TUP_MONTH_LETTERS.iter().position(|chr| *chr == c_month)? as u32 + 1;

    let n_day_raw: u32 = c_code[9..11].parse().ok()?;
    let (sex, n_day) = if n_day_raw > N_DAY_OFFSET_FEMALE {
        (EnumSex::Female, n_day_raw - N_DAY_OFFSET_FEMALE)
    } else {
        (EnumSex::Male, n_day_raw)
    };

    Some(SpecFiscalCodeFacts {
        sex,
        day: n_day,
        month: n_month,
        year: n_century + n_year_2d,
        place_code: c_code[11..15].to_string(),
    })
}

/// Resolve a place code, falling back to `Da Codice: {code}` with an empty region.
///
/// Returns the place and whether the fallback was used.
pub fn resolve_place(code: &str, registry: &dyn PlaceRegistry) -> (SpecPlace, bool) {
    match registry.lookup_place(code) {
        Ok(Some(place)) => (place, false),
        Ok(None) => (derive_fallback_place(code), true),
        Err(err) => {
            warn!(place_code = %code, error = %err, "place lookup failed, using fallback");
            (derive_fallback_place(code), true)
        }
    }
}

fn derive_fallback_place(code: &str) -> SpecPlace {
    SpecPlace {
        name: format!("{C_PLACE_FALLBACK_PREFIX}{code}"),
        region: String::new(),
    }
}

/// Decode a fiscal code and resolve its birth place.
pub fn decode_fiscal_code(
    value: &str,
    year_current: i32,
    registry: &dyn PlaceRegistry,
) -> Option<SpecFiscalCodeInfo> {
    let facts = decode_fiscal_code_facts(value, year_current)?;
    let (place, if_place_fallback) = resolve_place(&facts.place_code, registry);

    Some(SpecFiscalCodeInfo {
        sex: facts.sex,
        birth_date: facts.birth_date_text(),
        place_name: place.name,
        place_region: place.region,
        if_place_fallback,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

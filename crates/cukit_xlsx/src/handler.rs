//! Transport-agnostic request handler: JSON body in, status plus JSON body out.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::fiscal::{PlaceRegistry, PlaceRegistryConnector, UnavailablePlaceRegistry};
use crate::pipeline::convert_workbook;
use crate::spec::{ConvertError, SpecConvertOutput, SpecHandlerConfig};

/// Incoming request payload. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecHandlerRequest {
    /// Base64-encoded source workbook.
    #[serde(rename = "excelBase64", default)]
    pub excel_base64: Option<String>,
    /// Registry credential override.
    #[serde(rename = "dbPassword", default)]
    pub db_password: Option<String>,
}

/// Status code and serialized JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHandlerResponse {
    pub status: u16,
    pub body: String,
}

impl SpecHandlerResponse {
    fn from_output(output: &SpecConvertOutput) -> Self {
        Self {
            status: 200,
            body: json!({
                "output1Base64": STANDARD.encode(&output.registry_xlsx),
                "output2Base64": STANDARD.encode(&output.ledger_xlsx),
            })
            .to_string(),
        }
    }

    fn from_error(err: &ConvertError) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "error": err.public_message() }).to_string(),
        }
    }
}

/// Handle one conversion request.
///
/// The connector is invoked once with the request credential, or the configured
/// one when the request has none. A failed connection degrades every place
/// lookup to its fallback text; it never fails the request.
pub fn handle_request(
    body: &[u8],
    connector: &dyn PlaceRegistryConnector,
    config: &SpecHandlerConfig,
) -> SpecHandlerResponse {
    match run_request(body, connector, config) {
        Ok(output) => SpecHandlerResponse::from_output(&output),
        Err(err) => {
            if err.status_code() >= 500 {
                error!(error = %err, "conversion failed");
            } else {
                info!(status = err.status_code(), error = %err, "request rejected");
            }
            SpecHandlerResponse::from_error(&err)
        }
    }
}

fn run_request(
    body: &[u8],
    connector: &dyn PlaceRegistryConnector,
    config: &SpecHandlerConfig,
) -> Result<SpecConvertOutput, ConvertError> {
    let (v_workbook, c_credential) = decode_request(body)?;
    let credential = c_credential
        .as_deref()
        .or(config.registry_credential.as_deref());
    let registry = connect_registry(connector, credential);
    let output = convert_workbook(&v_workbook, &config.convert_options(), registry.as_ref())?;
    for c_warning in &output.report.warnings {
        warn!(warning = %c_warning, "conversion warning");
    }
    Ok(output)
}

/// Parse the JSON body and decode the workbook bytes.
pub fn decode_request(body: &[u8]) -> Result<(Vec<u8>, Option<String>), ConvertError> {
    let request: SpecHandlerRequest = serde_json::from_slice(body).map_err(|err| {
        ConvertError::InvalidPayload(format!("body is not a request object: {err}"))
    })?;
    let c_payload = request
        .excel_base64
        .filter(|val| !val.trim().is_empty())
        .ok_or_else(|| ConvertError::InvalidPayload("excelBase64 is missing".to_string()))?;
    let c_compact: String = c_payload.chars().filter(|chr| !chr.is_whitespace()).collect();
    let v_workbook = STANDARD
        .decode(c_compact.as_bytes())
        .map_err(|err| ConvertError::InvalidPayload(format!("excelBase64 is not base64: {err}")))?;
    let db_password = request.db_password.filter(|val| !val.is_empty());
    Ok((v_workbook, db_password))
}

/// Open the registry for one request, degrading to an always-faulting one.
pub fn connect_registry(
    connector: &dyn PlaceRegistryConnector,
    credential: Option<&str>,
) -> Box<dyn PlaceRegistry> {
    match connector.connect(credential) {
        Ok(registry) => registry,
        Err(err) => {
            warn!(error = %err, "place registry connection failed");
            Box::new(UnavailablePlaceRegistry::new(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::fiscal::MapPlaceRegistry;
    use crate::spec::RegistryError;

    fn map_connector(_credential: Option<&str>) -> Result<Box<dyn PlaceRegistry>, RegistryError> {
        Ok(Box::new(MapPlaceRegistry::new()))
    }

    fn body_json(value: serde_json::Value) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    #[test]
    fn test_non_json_body_is_rejected() {
        let response = handle_request(b"not json", &map_connector, &SpecHandlerConfig::default());
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body,
            json!({"error": "Inserire il file Excel in formato base64"}).to_string()
        );
    }

    #[test]
    fn test_missing_or_empty_payload_is_rejected() {
        for body in [json!({}), json!({"excelBase64": ""}), json!({"dbPassword": "x"})] {
            let response =
                handle_request(&body_json(body), &map_connector, &SpecHandlerConfig::default());
            assert_eq!(response.status, 400);
        }
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let body = body_json(json!({"excelBase64": "%%%not-base64%%%"}));
        let response = handle_request(&body, &map_connector, &SpecHandlerConfig::default());
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_decode_request_ignores_whitespace_and_unknown_fields() {
        let body = body_json(json!({
            "excelBase64": "aGVs\nbG8=",
            "dbPassword": "secret",
            "extra": 1,
        }));
        let (v_data, c_credential) = decode_request(&body).unwrap();
        assert_eq!(v_data, b"hello".to_vec());
        assert_eq!(c_credential.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unreadable_workbook_is_a_server_error() {
        let body = body_json(json!({"excelBase64": STANDARD.encode(b"plain text")}));
        let response = handle_request(&body, &map_connector, &SpecHandlerConfig::default());
        assert_eq!(response.status, 500);
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("failed to read workbook"));
    }

    #[test]
    fn test_request_credential_overrides_config() {
        let l_seen: RefCell<Vec<Option<String>>> = RefCell::new(vec![]);
        let connector =
            |credential: Option<&str>| -> Result<Box<dyn PlaceRegistry>, RegistryError> {
                l_seen.borrow_mut().push(credential.map(str::to_string));
                Err(RegistryError::Unavailable("offline".to_string()))
            };
        let config = SpecHandlerConfig {
            registry_credential: Some("configured".to_string()),
            ..Default::default()
        };
        let c_payload = STANDARD.encode(b"plain text");

        handle_request(
            &body_json(json!({"excelBase64": c_payload, "dbPassword": "override"})),
            &connector,
            &config,
        );
        handle_request(&body_json(json!({"excelBase64": c_payload})), &connector, &config);

        assert_eq!(
            *l_seen.borrow(),
            vec![Some("override".to_string()), Some("configured".to_string())]
        );
    }

    #[test]
    fn test_failed_connection_degrades_to_unavailable_registry() {
        let connector =
            |_credential: Option<&str>| -> Result<Box<dyn PlaceRegistry>, RegistryError> {
                Err(RegistryError::Unavailable("offline".to_string()))
            };
        let registry = connect_registry(&connector, None);
        assert!(matches!(
            registry.lookup_place("H501"),
            Err(RegistryError::Unavailable(_))
        ));
    }
}

use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use geomag_store::config::{Config, ConfigLoader, StreamRequest};
use geomag_store::domain::FormatKind;
use geomag_store::error::GeomagError;

const CONFIG: &str = r#"{
  "schema_version": 1,
  "base": "/data/geomag",
  "path": "{{year}}/{{year}}.{{yearday}}/{{year}}.{{yearday}}.{{hour}}{{minute}}.{{second}}.{{tolower .Label}}.raw",
  "truncate": "15m",
  "format": "gsm",
  "streams": [
    "NZ_APIM_51_LFF",
    { "label": " NZ.EYWM.50.LFX ", "format": "raw", "precision": 3 }
  ],
  "fluxgate": { "code": "EYR", "res": [1.0, 1.0, 1.0] }
}"#;

#[test]
fn loads_config_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("geomag.json");
    fs::write(&path, CONFIG).unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();

    assert_eq!(resolved.base, "/data/geomag");
    assert_eq!(resolved.truncate, Duration::from_secs(15 * 60));
    assert_eq!(resolved.format, FormatKind::Gsm);
    assert_eq!(
        resolved.streams,
        vec![
            StreamRequest {
                label: "NZ_APIM_51_LFF".to_string(),
                format: FormatKind::Gsm,
                precision: 0,
            },
            StreamRequest {
                label: "NZ.EYWM.50.LFX".to_string(),
                format: FormatKind::Raw,
                precision: 3,
            },
        ]
    );
    assert_eq!(resolved.calibration.code, "EYR");
    assert_eq!(resolved.calibration.gain, 1280.0);
}

#[test]
fn empty_config_uses_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();

    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.base, ".");
    assert_eq!(resolved.truncate, Duration::from_secs(3600));
    assert_eq!(resolved.format, FormatKind::Raw);
    assert!(resolved.streams.is_empty());
}

#[test]
fn invalid_template_is_rejected() {
    let config: Config = serde_json::from_str(r#"{ "path": "{{nope}}" }"#).unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, GeomagError::Template(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("geomag.json");
    fs::write(&path, "{ \"truncate\": \"soon\" }").unwrap();

    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, GeomagError::ConfigParse(_));
}

#[test]
fn missing_file_is_a_read_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/geomag/geomag.json")).unwrap_err();
    assert_matches!(err, GeomagError::ConfigRead(_));
}

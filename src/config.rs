use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::codec::Calibration;
use crate::domain::FormatKind;
use crate::error::GeomagError;
use crate::template::{DEFAULT_TEMPLATE, PathTemplate};

pub const CONFIG_FILE: &str = "geomag.json";

pub const DEFAULT_TRUNCATE: Duration = Duration::from_secs(3600);

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub truncate: Option<Duration>,
    #[serde(default)]
    pub format: Option<FormatKind>,
    #[serde(default)]
    pub precision: Option<usize>,
    #[serde(default)]
    pub streams: Vec<StreamEntry>,
    #[serde(default)]
    pub fluxgate: Option<Calibration>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StreamEntry {
    Shorthand(String),
    Detailed(StreamEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StreamEntryObject {
    pub label: String,
    #[serde(default)]
    pub format: Option<FormatKind>,
    #[serde(default)]
    pub precision: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub label: String,
    pub format: FormatKind,
    pub precision: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base: Utf8PathBuf,
    pub template: PathTemplate,
    pub truncate: Duration,
    pub format: FormatKind,
    pub precision: usize,
    pub streams: Vec<StreamRequest>,
    pub calibration: Calibration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the named config file, or `geomag.json` from the current
    /// directory and then the user config directory.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GeomagError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(GeomagError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GeomagError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GeomagError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("geomag").join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GeomagError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let format = config.format.unwrap_or(FormatKind::Raw);
        let precision = config.precision.unwrap_or(0);
        let template = PathTemplate::parse(config.path.as_deref().unwrap_or(DEFAULT_TEMPLATE))?;

        let streams = config
            .streams
            .into_iter()
            .map(|entry| match entry {
                StreamEntry::Shorthand(label) => StreamRequest {
                    label: label.trim().to_string(),
                    format,
                    precision,
                },
                StreamEntry::Detailed(obj) => StreamRequest {
                    label: obj.label.trim().to_string(),
                    format: obj.format.unwrap_or(format),
                    precision: obj.precision.unwrap_or(precision),
                },
            })
            .collect();

        Ok(ResolvedConfig {
            schema_version,
            base: Utf8PathBuf::from(config.base.unwrap_or_else(|| ".".to_string())),
            template,
            truncate: config.truncate.unwrap_or(DEFAULT_TRUNCATE),
            format,
            precision,
            streams,
            calibration: config.fluxgate.unwrap_or_default(),
        })
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GeomagError;

/// A single timestamped instrument measurement.
///
/// Readings are immutable once built; multi-channel formats use the tag to
/// record the originating stream, single-channel formats carry it through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    tag: String,
    values: Vec<f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, tag: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            timestamp,
            tag: tag.into(),
            values,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the value at `index`, or zero when the reading is shorter.
    pub fn value(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Raw,
    Gsm,
    Benmore,
    Fluxgate,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Raw => write!(f, "raw"),
            FormatKind::Gsm => write!(f, "gsm"),
            FormatKind::Benmore => write!(f, "benmore"),
            FormatKind::Fluxgate => write!(f, "fluxgate"),
        }
    }
}

impl FromStr for FormatKind {
    type Err = GeomagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "raw" => Ok(FormatKind::Raw),
            "gsm" | "absolute" => Ok(FormatKind::Gsm),
            "benmore" | "value" => Ok(FormatKind::Benmore),
            "fluxgate" | "full" => Ok(FormatKind::Fluxgate),
            _ => Err(GeomagError::InvalidFormat(value.to_string())),
        }
    }
}

/// Millisecond timestamps used by the comma separated observatory formats.
pub const MILLIS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Microsecond timestamps with a trailing zone marker, used by raw files.
pub const MICROS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6fZ";

pub fn format_time(at: DateTime<Utc>, format: &str) -> String {
    at.format(format).to_string()
}

pub fn parse_time_with(value: &str, format: &str, line: usize) -> Result<DateTime<Utc>, GeomagError> {
    NaiveDateTime::parse_from_str(value.trim(), format)
        .map(|naive| naive.and_utc())
        .map_err(|err| GeomagError::decode(line, format!("invalid timestamp {value:?}: {err}")))
}

pub fn parse_value(value: &str, line: usize) -> Result<f64, GeomagError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|err| GeomagError::decode(line, format!("invalid number {value:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_format_kind_aliases() {
        assert_eq!("RAW".parse::<FormatKind>().unwrap(), FormatKind::Raw);
        assert_eq!("absolute".parse::<FormatKind>().unwrap(), FormatKind::Gsm);
        assert_eq!(" full ".parse::<FormatKind>().unwrap(), FormatKind::Fluxgate);
    }

    #[test]
    fn parse_format_kind_invalid() {
        let err = "mseed".parse::<FormatKind>().unwrap_err();
        assert_matches!(err, GeomagError::InvalidFormat(_));
    }

    #[test]
    fn millis_time_roundtrip() {
        let at = parse_time_with("2018-06-23 04:59:56.000", MILLIS_FORMAT, 1).unwrap();
        assert_eq!(format_time(at, MILLIS_FORMAT), "2018-06-23 04:59:56.000");
    }

    #[test]
    fn reading_value_defaults_to_zero() {
        let at = parse_time_with("2018-06-23 04:59:56.000", MILLIS_FORMAT, 1).unwrap();
        let reading = Reading::new(at, "NZ_APIM_51_LFF", vec![1.5]);
        assert_eq!(reading.value(0), 1.5);
        assert_eq!(reading.value(3), 0.0);
    }
}

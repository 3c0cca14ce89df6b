use chrono::{DateTime, Utc};

use crate::codec::{Codec, as_text, join_lines};
use crate::domain::{MILLIS_FORMAT, Reading, format_time, parse_time_with, parse_value};
use crate::error::GeomagError;

/// Absolute total field readings from a proton precession magnetometer.
///
/// Lines look like `NZ_APIM_51_LFF, 2018-06-23 04:59:56.000, 3877896.0, 99.0`
/// holding the field and a quality figure, both to one decimal place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GsmCodec;

impl Codec for GsmCodec {
    fn encode(
        &self,
        _label: &str,
        _at: Option<DateTime<Utc>>,
        readings: &[Reading],
    ) -> Result<Vec<u8>, GeomagError> {
        let lines = readings
            .iter()
            .map(|reading| {
                [
                    reading.tag().to_string(),
                    format_time(reading.at(), MILLIS_FORMAT),
                    format!("{:.1}", reading.value(0)),
                    format!("{:.1}", reading.value(1)),
                ]
                .join(", ")
            })
            .collect();
        Ok(join_lines(lines))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<Reading>, GeomagError> {
        let mut readings = Vec::new();
        for (index, line) in as_text(data)?.lines().enumerate() {
            let parts = line.split(',').collect::<Vec<_>>();
            if parts.len() < 4 {
                continue;
            }
            let number = index + 1;
            let at = parse_time_with(parts[1], MILLIS_FORMAT, number)?;
            let field = parse_value(parts[2], number)?;
            let quality = parse_value(parts[3], number)?;
            readings.push(Reading::new(at, parts[0].trim(), vec![field, quality]));
        }
        Ok(readings)
    }
}

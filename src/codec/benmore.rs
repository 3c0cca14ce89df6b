use chrono::{DateTime, Utc};

use crate::codec::{Codec, as_text, join_lines};
use crate::domain::{MILLIS_FORMAT, Reading, format_time, parse_time_with, parse_value};
use crate::error::GeomagError;

/// Single value readings, such as the Benmore DC correction or a vertical
/// component, written with eight decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenmoreCodec;

impl Codec for BenmoreCodec {
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
                    format!("{:.8}", reading.value(0)),
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
            if parts.len() < 3 {
                continue;
            }
            let number = index + 1;
            let at = parse_time_with(parts[1], MILLIS_FORMAT, number)?;
            let value = parse_value(parts[2], number)?;
            readings.push(Reading::new(at, parts[0].trim(), vec![value]));
        }
        Ok(readings)
    }
}

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};

use crate::codec::Codec;
use crate::domain::{MICROS_FORMAT, Reading, format_time, parse_time_with, parse_value};
use crate::error::GeomagError;

/// Multi-value CSV rows of `timestamp, tag, value...`.
///
/// Values are printed with a fixed number of decimal places, which is zero for
/// plain integer counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCodec {
    precision: usize,
}

impl RawCodec {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl Codec for RawCodec {
    fn encode(
        &self,
        _label: &str,
        _at: Option<DateTime<Utc>>,
        readings: &[Reading],
    ) -> Result<Vec<u8>, GeomagError> {
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        for reading in readings {
            let mut record = vec![format_time(reading.at(), MICROS_FORMAT), reading.tag().to_string()];
            record.extend(
                reading
                    .values()
                    .iter()
                    .map(|value| format!("{value:.prec$}", prec = self.precision)),
            );
            writer
                .write_record(&record)
                .map_err(|err| GeomagError::Filesystem(err.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|err| GeomagError::Filesystem(err.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<Reading>, GeomagError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(data);

        let mut readings = Vec::new();
        let mut record = StringRecord::new();
        loop {
            let more = reader.read_record(&mut record).map_err(|err| {
                let line = err.position().map(|pos| pos.line() as usize).unwrap_or_default();
                GeomagError::decode(line, err.to_string())
            })?;
            if !more {
                break;
            }
            if record.len() < 3 {
                continue;
            }

            let line = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or_default();
            let at = parse_time_with(&record[0], MICROS_FORMAT, line)?;
            let values = record
                .iter()
                .skip(2)
                .map(|field| parse_value(field, line))
                .collect::<Result<Vec<_>, _>>()?;
            readings.push(Reading::new(at, &record[1], values));
        }

        Ok(readings)
    }
}

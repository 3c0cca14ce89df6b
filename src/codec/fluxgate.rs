use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::truncate_time;
use crate::codec::{Codec, as_text};
use crate::domain::{Reading, parse_value};
use crate::error::GeomagError;

/// Number of calibration lines preceding the data rows, including the
/// column title line.
pub const HEADER_LINES: usize = 25;

const DATA_COLUMNS: usize = 14;

const COLUMN_TITLES: &str = "HH MM SS  S Temp D Temp   X Raw     Y Raw    Z Raw     X Calc    Y Calc     Z Calc     F Calc  I Calc  Benmore";

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;
pub const SENSOR: usize = 3;
pub const DRIVER: usize = 4;
pub const BENMORE: usize = 5;

/// Fluxgate magnetometer settings written into every file header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub code: String,
    pub model: String,
    pub sensor: i32,
    pub driver: i32,
    pub bias: [i32; 3],
    pub coil: [f64; 3],
    pub res: [f64; 3],
    pub e: [f64; 5],
    pub step: f64,
    pub gain: f64,
    pub offset: [f64; 3],
    pub polarity: [f64; 3],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            code: String::new(),
            model: String::new(),
            sensor: 0,
            driver: 0,
            bias: [0; 3],
            coil: [0.0; 3],
            res: [0.0; 3],
            e: [0.0; 5],
            step: 0.003922,
            gain: 1280.0,
            offset: [0.0; 3],
            polarity: [1.0, 1.0, -1.0],
        }
    }
}

impl Calibration {
    /// Converts raw components into calibrated units; an axis with no
    /// resolution set stays at zero.
    pub fn to_calc(&self, raw: [f64; 3]) -> [f64; 3] {
        let mut calc = [0.0; 3];
        for i in 0..3 {
            if self.res[i] == 0.0 {
                continue;
            }
            calc[i] = self.polarity[i]
                * (self.coil[i] * (raw[i] / self.res[i] + self.step * f64::from(self.bias[i]))
                    + self.offset[i]);
        }
        calc
    }

    pub fn total_field(calc: [f64; 3]) -> f64 {
        calc.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Angle of the calibrated field in the X-Z plane, in degrees.
    pub fn inclination(calc: [f64; 3]) -> f64 {
        let mut angle = calc[Z].atan2(calc[X]).to_degrees();
        if angle < -180.0 {
            angle += 360.0;
        }
        if angle > 180.0 {
            angle -= 360.0;
        }
        angle
    }
}

/// Full vector fluxgate readings with a calibration header.
///
/// Reading values are ordered `[x, y, z, sensor, driver, benmore]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxgateCodec {
    calibration: Calibration,
}

impl FluxgateCodec {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn header(&self, label: &str, epoch: DateTime<Utc>) -> String {
        let cal = &self.calibration;
        let code = if cal.code.is_empty() { label } else { cal.code.as_str() };

        let lines = [
            format!("e2={:.3}", cal.e[2]),
            format!("zpolarity={}", cal.polarity[Z]),
            format!("xcoil={}", cal.coil[X]),
            format!(
                "date={} ({}) {} GMT",
                epoch.format("%Y/%m/%d"),
                epoch.format("%Y.%j"),
                epoch.format("%H:%M:%S")
            ),
            format!("model={}", cal.model),
            format!("sensor={}", cal.sensor),
            format!("e0={:.3}", cal.e[0]),
            format!("xbias=0x{:02x}", cal.bias[X]),
            format!("zbias=0x{:02x}", cal.bias[Z]),
            format!("zcoil={}", cal.coil[Z]),
            format!("step={}", cal.step),
            format!("e4={:.3}", cal.e[4]),
            format!("e3={:.3}", cal.e[3]),
            format!("code={code}"),
            format!("e1={:.3}", cal.e[1]),
            format!("epoch={}", epoch.timestamp()),
            format!("ycoil={}", cal.coil[Y]),
            format!("ybias=0x{:02x}", cal.bias[Y]),
            format!("zoffset={}", cal.offset[Z]),
            format!("yres={}", cal.res[Y]),
            format!("zres={}", cal.res[Z]),
            format!("xres={}", cal.res[X]),
            format!("scale={}", cal.gain),
            format!("driver={}", cal.driver),
            COLUMN_TITLES.to_string(),
        ];

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn row(&self, reading: &Reading) -> String {
        let raw = [reading.value(X), reading.value(Y), reading.value(Z)];
        let calc = self.calibration.to_calc(raw);

        format!(
            "{} {:7.2} {:6.2} {:7.4} {:9.4} {:8.4} {:10.3} {:9.3} {:10.3} {:10.3} {:7.2} {:8.4}",
            reading.at().format("%H %M %S"),
            reading.value(SENSOR),
            reading.value(DRIVER),
            raw[X],
            raw[Y],
            raw[Z],
            calc[X],
            calc[Y],
            calc[Z],
            Calibration::total_field(calc),
            Calibration::inclination(calc),
            reading.value(BENMORE),
        )
    }
}

impl Codec for FluxgateCodec {
    fn encode(
        &self,
        label: &str,
        at: Option<DateTime<Utc>>,
        readings: &[Reading],
    ) -> Result<Vec<u8>, GeomagError> {
        let epoch = at
            .or_else(|| readings.first().map(Reading::at))
            .unwrap_or(DateTime::UNIX_EPOCH);

        let mut out = self.header(label, epoch);
        for reading in readings {
            out.push_str(&self.row(reading));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<Reading>, GeomagError> {
        let mut lines = as_text(data)?.lines().enumerate();

        let mut epoch = None;
        for (index, line) in lines.by_ref().take(HEADER_LINES) {
            if let Some(ticks) = line.strip_prefix("epoch=") {
                let ticks = ticks.trim().parse::<i64>().map_err(|err| {
                    GeomagError::decode(index + 1, format!("invalid epoch {ticks:?}: {err}"))
                })?;
                let start = DateTime::from_timestamp(ticks, 0).ok_or_else(|| {
                    GeomagError::decode(index + 1, format!("epoch {ticks} out of range"))
                })?;
                epoch = Some(start);
            }
        }
        let epoch = epoch.ok_or_else(|| GeomagError::decode(0, "missing epoch header line"))?;
        let hour = truncate_time(epoch, Duration::from_secs(3600))?;

        let mut readings = Vec::new();
        for (index, line) in lines {
            let number = index + 1;
            let parts = line.split_whitespace().collect::<Vec<_>>();
            if parts.is_empty() {
                continue;
            }
            if parts.len() != DATA_COLUMNS {
                return Err(GeomagError::decode(
                    number,
                    format!("expected {DATA_COLUMNS} columns, found {}", parts.len()),
                ));
            }

            let hh = parse_offset(parts[0], number)?;
            let mm = parse_offset(parts[1], number)?;
            let ss = parse_offset(parts[2], number)?;
            let hours = (hh - i64::from(hour.hour())).rem_euclid(24);
            let at = hour
                + TimeDelta::hours(hours)
                + TimeDelta::minutes(mm)
                + TimeDelta::seconds(ss);

            let sensor = parse_value(parts[3], number)?;
            let driver = parse_value(parts[4], number)?;
            let x = parse_value(parts[5], number)?;
            let y = parse_value(parts[6], number)?;
            let z = parse_value(parts[7], number)?;
            let benmore = parse_value(parts[13], number)?;

            readings.push(Reading::new(at, "", vec![x, y, z, sensor, driver, benmore]));
        }

        Ok(readings)
    }
}

fn parse_offset(value: &str, line: usize) -> Result<i64, GeomagError> {
    value
        .parse::<i64>()
        .map_err(|err| GeomagError::decode(line, format!("invalid time offset {value:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn calibration() -> Calibration {
        Calibration {
            code: "EYR".to_string(),
            coil: [100.0, 100.0, 100.0],
            res: [1.0, 1.0, 1.0],
            ..Calibration::default()
        }
    }

    #[test]
    fn header_has_fixed_line_count() {
        let at = Utc.with_ymd_and_hms(2018, 6, 23, 4, 0, 0).unwrap();
        let header = FluxgateCodec::new(calibration()).header("eyr", at);
        assert_eq!(header.lines().count(), HEADER_LINES);
        assert!(header.contains("epoch=1529726400\n"));
        assert!(header.contains("date=2018/06/23 (2018.174) 04:00:00 GMT\n"));
        assert!(header.contains("code=EYR\n"));
    }

    #[test]
    fn calc_applies_polarity() {
        let calc = calibration().to_calc([1.0, 2.0, 3.0]);
        assert_eq!(calc, [100.0, 200.0, -300.0]);
        assert_eq!(Calibration::total_field([3.0, 0.0, 4.0]), 5.0);
        assert!((Calibration::inclination([1.0, 0.0, 1.0]) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn missing_epoch_fails() {
        let err = FluxgateCodec::default().decode(b"code=EYR\n").unwrap_err();
        assert_matches!(err, GeomagError::Decode { line: 0, .. });
    }

    #[test]
    fn malformed_epoch_fails() {
        let mut data = String::from("code=EYR\nepoch=abc\n");
        data.push_str(COLUMN_TITLES);
        data.push('\n');
        let err = FluxgateCodec::default().decode(data.as_bytes()).unwrap_err();
        assert_matches!(err, GeomagError::Decode { line: 2, .. });
    }

    #[test]
    fn wrong_column_count_fails() {
        let at = Utc.with_ymd_and_hms(2018, 6, 23, 4, 0, 0).unwrap();
        let codec = FluxgateCodec::new(calibration());
        let mut data = codec.header("eyr", at);
        data.push_str("04 10 00 1.0 2.0\n");
        let err = codec.decode(data.as_bytes()).unwrap_err();
        assert_matches!(err, GeomagError::Decode { line: 26, .. });
    }

    #[test]
    fn rows_are_placed_relative_to_epoch() {
        let at = Utc.with_ymd_and_hms(2018, 6, 23, 4, 0, 0).unwrap();
        let codec = FluxgateCodec::new(calibration());
        let readings = vec![
            Reading::new(at + TimeDelta::seconds(61), "", vec![0.5, -0.25, 0.125, 21.5, 30.25, 0.0]),
            Reading::new(at + TimeDelta::seconds(3599), "", vec![0.5, -0.25, 0.125, 21.5, 30.25, 0.0]),
        ];
        let data = codec.encode("eyr", Some(at), &readings).unwrap();
        let decoded = codec.decode(&data).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].at(), at + TimeDelta::seconds(61));
        assert_eq!(decoded[1].at(), at + TimeDelta::seconds(3599));
        assert_eq!(decoded[0].values(), readings[0].values());
    }
}

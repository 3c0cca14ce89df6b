use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::batch::truncate_time;
use crate::error::GeomagError;

pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a command line time such as `2018-06-23T04:00:00` as UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, GeomagError> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|err| GeomagError::InvalidTime(format!("{value}: {err}")))
}

fn to_delta(duration: Duration) -> Result<TimeDelta, GeomagError> {
    TimeDelta::from_std(duration).map_err(|err| GeomagError::InvalidTime(err.to_string()))
}

/// Time to wait from `now` until the next `interval` boundary shifted by
/// `offset`. Zero when no interval is set.
pub fn ticks(now: DateTime<Utc>, interval: Duration, offset: Duration) -> Result<Duration, GeomagError> {
    if interval.is_zero() {
        return Ok(Duration::ZERO);
    }
    let step = to_delta(interval)?;
    let shift = to_delta(offset)?;

    let next = if offset.is_zero() {
        truncate_time(now + step, interval)?
    } else {
        truncate_time(now + step + shift, interval)? + shift
    };

    let span = i64::try_from(interval.as_nanos())
        .map_err(|_| GeomagError::InvalidTime(format!("interval {interval:?} too large")))?;
    let wait = (next - now)
        .num_nanoseconds()
        .ok_or_else(|| GeomagError::InvalidTime("wait out of range".to_string()))?;
    let wait = if offset.is_zero() { wait } else { wait.rem_euclid(span) };

    Ok(Duration::from_nanos(u64::try_from(wait).unwrap_or_default()))
}

/// The span of time covered by one collection pass, `[end - length, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub end: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub length: Duration,
}

impl TimeWindow {
    pub fn new(end: DateTime<Utc>, length: Duration) -> Self {
        Self { end, length }
    }

    /// Works out the window from optional explicit start and end times,
    /// falling back to `now - delay` as the end.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        length: Duration,
        now: DateTime<Utc>,
        delay: Duration,
    ) -> Result<Self, GeomagError> {
        match (start, end) {
            (Some(start), Some(end)) => {
                let length = (end - start).to_std().map_err(|_| {
                    GeomagError::InvalidTime(format!("end {end} is before start {start}"))
                })?;
                Ok(Self::new(end, length))
            }
            (Some(start), None) => Ok(Self::new(start + to_delta(length)?, length)),
            (None, Some(end)) => Ok(Self::new(end, length)),
            (None, None) => Ok(Self::new(now - to_delta(delay)?, length)),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.length)
            .ok()
            .and_then(|length| self.end.checked_sub_signed(length))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start() && at < self.end
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 23, h, m, s).unwrap()
    }

    #[test]
    fn ticks_to_next_boundary() {
        let wait = ticks(at(4, 10, 0), Duration::from_secs(3600), Duration::ZERO).unwrap();
        assert_eq!(wait, Duration::from_secs(50 * 60));
    }

    #[test]
    fn ticks_with_offset() {
        let hour = Duration::from_secs(3600);
        let five = Duration::from_secs(300);
        assert_eq!(ticks(at(4, 2, 0), hour, five).unwrap(), Duration::from_secs(180));
        assert_eq!(ticks(at(4, 10, 0), hour, five).unwrap(), Duration::from_secs(55 * 60));
    }

    #[test]
    fn no_interval_means_no_wait() {
        assert_eq!(ticks(at(4, 10, 0), Duration::ZERO, Duration::ZERO).unwrap(), Duration::ZERO);
    }

    #[test]
    fn window_from_start_and_end() {
        let window = TimeWindow::resolve(
            Some(at(1, 0, 0)),
            Some(at(4, 0, 0)),
            Duration::from_secs(3600),
            at(6, 0, 0),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(window.start(), at(1, 0, 0));
        assert_eq!(window.length, Duration::from_secs(3 * 3600));
        assert!(window.contains(at(1, 0, 0)));
        assert!(!window.contains(at(4, 0, 0)));
    }

    #[test]
    fn window_defaults_to_now_less_delay() {
        let window = TimeWindow::resolve(
            None,
            None,
            Duration::from_secs(3600),
            at(6, 0, 0),
            Duration::from_secs(600),
        )
        .unwrap();
        assert_eq!(window.end, at(5, 50, 0));
        assert_eq!(window.start(), at(4, 50, 0));
    }

    #[test]
    fn parse_time_rejects_garbage() {
        assert!(parse_time("2018-06-23 04:00").is_err());
        assert_eq!(parse_time("2018-06-23T04:00:00").unwrap(), at(4, 0, 0));
    }
}

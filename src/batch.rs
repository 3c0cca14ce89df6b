use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::codec::Codec;
use crate::domain::Reading;
use crate::error::GeomagError;

/// The capability set shared by every stored format.
///
/// The store only ever talks to this trait, so adding a format means writing
/// a [`Codec`] and wrapping it in a [`Batch`].
pub trait Formatter: Sized {
    /// Representative timestamp used when rendering file paths.
    fn at(&self) -> Option<DateTime<Utc>>;
    fn tag(&self) -> &str;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Copy of the batch settings with no readings.
    fn empty(&self) -> Self;
    fn encode(&self) -> Result<Vec<u8>, GeomagError>;
    /// Decodes stored content into a new batch sharing this batch's settings.
    fn decode(&self, data: &[u8]) -> Result<Self, GeomagError>;
    /// Merges `existing` into `self`; readings in `self` win on equal timestamps.
    fn merge(&self, existing: &Self) -> Self;
    fn split(&self, truncate: Duration) -> Result<Vec<Self>, GeomagError>;
}

#[derive(Debug, Clone)]
pub struct Batch<C> {
    label: String,
    timestamp: Option<DateTime<Utc>>,
    readings: Vec<Reading>,
    codec: C,
}

impl<C: Codec> Batch<C> {
    pub fn new(label: impl Into<String>, codec: C) -> Self {
        Self {
            label: label.into(),
            timestamp: None,
            readings: Vec::new(),
            codec,
        }
    }

    pub fn with_readings(label: impl Into<String>, codec: C, readings: Vec<Reading>) -> Self {
        let mut batch = Self::new(label, codec);
        batch.extend(readings);
        batch
    }

    /// Appends a reading, keeping the representative timestamp at the earliest seen.
    pub fn add(&mut self, reading: Reading) {
        let at = reading.at();
        if self.timestamp.is_none_or(|current| current > at) {
            self.timestamp = Some(at);
        }
        self.readings.push(reading);
    }

    pub fn extend(&mut self, readings: impl IntoIterator<Item = Reading>) {
        for reading in readings {
            self.add(reading);
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn with_parts(&self, timestamp: Option<DateTime<Utc>>, readings: Vec<Reading>) -> Self {
        Self {
            label: self.label.clone(),
            timestamp,
            readings,
            codec: self.codec.clone(),
        }
    }
}

impl<C: Codec> Formatter for Batch<C> {
    fn at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn tag(&self) -> &str {
        &self.label
    }

    fn len(&self) -> usize {
        self.readings.len()
    }

    fn empty(&self) -> Self {
        self.with_parts(self.timestamp, Vec::new())
    }

    fn encode(&self) -> Result<Vec<u8>, GeomagError> {
        let mut readings = self.readings.clone();
        readings.sort_by_key(Reading::at);
        self.codec.encode(&self.label, self.timestamp, &readings)
    }

    fn decode(&self, data: &[u8]) -> Result<Self, GeomagError> {
        let readings = self.codec.decode(data)?;
        Ok(self.with_parts(self.timestamp, readings))
    }

    fn merge(&self, existing: &Self) -> Self {
        let mut cache: HashMap<DateTime<Utc>, Reading> =
            HashMap::with_capacity(self.readings.len() + existing.readings.len());
        for reading in &existing.readings {
            cache.insert(reading.at(), reading.clone());
        }
        for reading in &self.readings {
            cache.insert(reading.at(), reading.clone());
        }

        let mut readings = cache.into_values().collect::<Vec<_>>();
        readings.sort_by_key(Reading::at);

        self.with_parts(self.timestamp, readings)
    }

    fn split(&self, truncate: Duration) -> Result<Vec<Self>, GeomagError> {
        let mut cache: HashMap<DateTime<Utc>, Vec<Reading>> = HashMap::new();
        for reading in &self.readings {
            let key = truncate_time(reading.at(), truncate)?;
            cache.entry(key).or_default().push(reading.clone());
        }

        let mut buckets = cache
            .into_iter()
            .map(|(at, mut readings)| {
                readings.sort_by_key(Reading::at);
                self.with_parts(Some(at), readings)
            })
            .collect::<Vec<_>>();
        buckets.sort_by_key(|bucket| bucket.timestamp);

        Ok(buckets)
    }
}

/// Floors `at` to a multiple of `truncate` since the Unix epoch.
///
/// A zero duration leaves the timestamp unchanged.
pub fn truncate_time(at: DateTime<Utc>, truncate: Duration) -> Result<DateTime<Utc>, GeomagError> {
    if truncate.is_zero() {
        return Ok(at);
    }
    let span = i64::try_from(truncate.as_nanos())
        .map_err(|_| GeomagError::Truncate(format!("duration {truncate:?} too large")))?;
    let nanos = at
        .timestamp_nanos_opt()
        .ok_or_else(|| GeomagError::Truncate(format!("timestamp {at} out of range")))?;
    Ok(DateTime::from_timestamp_nanos(nanos - nanos.rem_euclid(span)))
}

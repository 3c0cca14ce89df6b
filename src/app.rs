use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::{Batch, Formatter};
use crate::codec::Codec;
use crate::domain::Reading;
use crate::error::GeomagError;
use crate::schedule::TimeWindow;
use crate::source::{ReadingSource, read_input};
use crate::store::{Store, StoreReport};

/// Label used for readings that carry no tag of their own.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub window: TimeWindow,
    pub readings: usize,
    pub reports: Vec<StoreReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub path: String,
    pub format: String,
    pub readings: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// One collection pass: fetch readings, group them into batches and store them.
pub struct App<S: ReadingSource, C: Codec> {
    source: S,
    codec: C,
    store: Store,
    label: Option<String>,
    streams: Vec<String>,
}

impl<S: ReadingSource, C: Codec> App<S, C> {
    pub fn new(source: S, codec: C, store: Store) -> Self {
        Self {
            source,
            codec,
            store,
            label: None,
            streams: Vec::new(),
        }
    }

    /// Store every reading under a single label instead of grouping by tag.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Restrict the pass to readings with one of these tags.
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.streams = streams;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn batches(&self, readings: Vec<Reading>) -> Vec<Batch<C>> {
        let mut groups: BTreeMap<String, Batch<C>> = BTreeMap::new();
        for reading in readings {
            if !self.streams.is_empty() && !self.streams.iter().any(|s| s == reading.tag()) {
                continue;
            }
            let label = match &self.label {
                Some(label) => label.clone(),
                None if reading.tag().is_empty() => UNKNOWN_LABEL.to_string(),
                None => reading.tag().to_string(),
            };
            groups
                .entry(label.clone())
                .or_insert_with(|| Batch::new(label, self.codec.clone()))
                .add(reading);
        }
        groups.into_values().collect()
    }

    pub fn run(&self, window: &TimeWindow, sink: &dyn ProgressSink) -> Result<RunResult, GeomagError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; window={} .. {}", window.start(), window.end),
            elapsed: None,
        });

        let readings = self.source.fetch(window)?;
        let count = readings.len();

        let mut reports = Vec::new();
        for batch in self.batches(readings) {
            let report = self.store.store(&batch)?;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Store; label={}; buckets={}; written={}",
                    report.label,
                    report.buckets.len(),
                    report.written()
                ),
                elapsed: Some(started.elapsed()),
            });
            reports.push(report);
        }

        Ok(RunResult {
            window: *window,
            readings: count,
            reports,
        })
    }
}

/// Decodes a stored or loose file and summarises its readings.
pub fn check_file<C: Codec>(path: &Utf8Path, codec: &C, format: &str) -> Result<CheckResult, GeomagError> {
    let data = read_input(path)?;
    let batch = Batch::with_readings(UNKNOWN_LABEL, codec.clone(), codec.decode(&data)?);
    let last = batch.readings().iter().map(Reading::at).max();

    Ok(CheckResult {
        path: path.to_string(),
        format: format.to_string(),
        readings: batch.len(),
        first: batch.at(),
        last,
    })
}

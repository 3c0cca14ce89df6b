use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::batch::Formatter;
use crate::error::GeomagError;
use crate::fs_util::{read_existing, write_if_changed};
use crate::template::PathTemplate;

/// Periodic file store rooted at a base directory.
///
/// Buckets are processed in chronological order and the first failure stops
/// the run; files already written for earlier buckets are left in place.
#[derive(Debug, Clone)]
pub struct Store {
    base: Utf8PathBuf,
    template: PathTemplate,
    truncate: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreAction {
    Written,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    pub path: String,
    pub readings: usize,
    pub action: StoreAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreReport {
    pub label: String,
    pub buckets: Vec<BucketReport>,
}

impl StoreReport {
    pub fn written(&self) -> usize {
        self.buckets
            .iter()
            .filter(|bucket| bucket.action == StoreAction::Written)
            .count()
    }
}

impl Store {
    pub fn new(base: Utf8PathBuf, template: &str, truncate: Duration) -> Result<Self, GeomagError> {
        Ok(Self::with_template(base, PathTemplate::parse(template)?, truncate))
    }

    pub fn with_template(base: Utf8PathBuf, template: PathTemplate, truncate: Duration) -> Self {
        Self {
            base,
            template,
            truncate,
        }
    }

    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn truncate(&self) -> Duration {
        self.truncate
    }

    pub fn path_for<F: Formatter>(&self, batch: &F) -> Result<Utf8PathBuf, GeomagError> {
        self.template.build_path(&self.base, batch)
    }

    /// Splits the batch into buckets and merges each one into its file.
    pub fn store<F: Formatter>(&self, batch: &F) -> Result<StoreReport, GeomagError> {
        let mut report = StoreReport {
            label: batch.tag().to_string(),
            buckets: Vec::new(),
        };

        for bucket in batch.split(self.truncate)? {
            let path = self.path_for(&bucket)?;
            debug!(path = %path, readings = bucket.len(), "storing bucket");

            let existing = match read_existing(path.as_std_path())? {
                Some(data) => bucket.decode(&data)?,
                None => bucket.empty(),
            };
            let merged = bucket.merge(&existing);
            let data = merged.encode()?;

            let action = if write_if_changed(path.as_std_path(), &data)? {
                info!(path = %path, readings = merged.len(), "wrote file");
                StoreAction::Written
            } else {
                debug!(path = %path, "file unchanged");
                StoreAction::Unchanged
            };

            report.buckets.push(BucketReport {
                path: path.to_string(),
                readings: merged.len(),
                action,
            });
        }

        Ok(report)
    }
}

pub fn store<F: Formatter>(
    base: &Utf8Path,
    template: &str,
    truncate: Duration,
    batch: &F,
) -> Result<StoreReport, GeomagError> {
    Store::new(base.to_path_buf(), template, truncate)?.store(batch)
}

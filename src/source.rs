use std::fs;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::domain::Reading;
use crate::error::GeomagError;
use crate::schedule::TimeWindow;

/// Where readings come from before they are stored.
///
/// Network clients live outside this crate and plug in here; the bundled
/// [`FileSource`] re-reads loose files that are already in one of the stored
/// formats.
pub trait ReadingSource {
    fn fetch(&self, window: &TimeWindow) -> Result<Vec<Reading>, GeomagError>;
}

#[derive(Debug, Clone)]
pub struct FileSource<C> {
    inputs: Vec<Utf8PathBuf>,
    codec: C,
    filter: bool,
}

impl<C: Codec> FileSource<C> {
    pub fn new(inputs: Vec<Utf8PathBuf>, codec: C) -> Self {
        Self {
            inputs,
            codec,
            filter: false,
        }
    }

    /// Only keep readings that fall inside the requested window.
    pub fn with_window_filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    pub fn inputs(&self) -> &[Utf8PathBuf] {
        &self.inputs
    }
}

impl<C: Codec> ReadingSource for FileSource<C> {
    fn fetch(&self, window: &TimeWindow) -> Result<Vec<Reading>, GeomagError> {
        let mut readings = Vec::new();
        for input in &self.inputs {
            let data = read_input(input)?;
            let decoded = self.codec.decode(&data)?;
            let total = decoded.len();
            readings.extend(
                decoded
                    .into_iter()
                    .filter(|reading| !self.filter || window.contains(reading.at())),
            );
            debug!(input = %input, total, "decoded input");
        }
        if readings.is_empty() {
            warn!(inputs = self.inputs.len(), "no readings found in inputs");
        }
        Ok(readings)
    }
}

/// Reads an input file, transparently inflating `.gz` files.
pub fn read_input(path: &Utf8Path) -> Result<Vec<u8>, GeomagError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| GeomagError::Source(format!("open {path}: {err}")))?;

    let mut data = Vec::new();
    let result = if path.extension() == Some("gz") {
        GzDecoder::new(file).read_to_end(&mut data)
    } else {
        let mut file = file;
        file.read_to_end(&mut data)
    };
    result.map_err(|err| GeomagError::Source(format!("read {path}: {err}")))?;

    Ok(data)
}

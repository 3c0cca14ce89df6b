//! Text encodings for stored batches.
//!
//! Each codec turns sorted readings into file bytes and back. The comma
//! separated formats skip rows that are too short to hold a reading, while the
//! fluxgate format rejects any row with the wrong number of columns.

use chrono::{DateTime, Utc};

use crate::domain::Reading;
use crate::error::GeomagError;

pub mod benmore;
pub mod fluxgate;
pub mod gsm;
pub mod raw;

pub use benmore::BenmoreCodec;
pub use fluxgate::{Calibration, FluxgateCodec};
pub use gsm::GsmCodec;
pub use raw::RawCodec;

pub trait Codec: Clone {
    /// Encodes readings, already sorted by timestamp, for a batch with the
    /// given label and representative timestamp.
    fn encode(
        &self,
        label: &str,
        at: Option<DateTime<Utc>>,
        readings: &[Reading],
    ) -> Result<Vec<u8>, GeomagError>;

    fn decode(&self, data: &[u8]) -> Result<Vec<Reading>, GeomagError>;
}

pub(crate) fn as_text(data: &[u8]) -> Result<&str, GeomagError> {
    std::str::from_utf8(data).map_err(|err| GeomagError::decode(0, err.to_string()))
}

pub(crate) fn join_lines(lines: Vec<String>) -> Vec<u8> {
    let mut out = lines.join("\n");
    out.push('\n');
    out.into_bytes()
}

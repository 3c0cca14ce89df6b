//! Periodic text file storage for geomagnetic observatory readings.
//!
//! Readings are split into fixed duration buckets, merged with whatever is
//! already stored for each bucket, and written back only when the encoded
//! content changes.

pub mod app;
pub mod batch;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod schedule;
pub mod source;
pub mod store;
pub mod template;

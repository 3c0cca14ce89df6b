use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::app::{CheckResult, ProgressEvent, ProgressSink, RunResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Log,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed_millis(elapsed), "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

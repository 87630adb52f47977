use std::io::{self, Write};

use anyhow::Result;
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

/// Line-per-record logger on stderr, the host counterpart of a serial
/// console logger. Stdout stays free for the display and diagnostics.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(
            &Local::now().format("%H:%M:%S%.3f").to_string(),
            record,
        );
        let _ = writeln!(io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn format_record(timestamp: &str, record: &Record<'_>) -> String {
    format!(
        "{timestamp} {:<5} {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

pub fn init_logger(level: LevelFilter) -> Result<()> {
    log::set_logger(&LOGGER)
        .map_err(|err| anyhow::anyhow!("failed to install logger: {err}"))?;
    log::set_max_level(level);
    Ok(())
}

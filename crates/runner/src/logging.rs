//! Process-wide logger
//!
//! `env_logger` with the configured level; `RUST_LOG` overrides it. When a
//! log file is configured every line goes to stderr and to the file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use env_logger::{Builder, Target};
use log::{LevelFilter, info, warn};

use crate::error::{Result, RunnerError};

/// Map a configured level name onto a filter
///
/// Accepts the usual names case-insensitively, plus `WARNING` and
/// `CRITICAL`.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "OFF" => Some(LevelFilter::Off),
        "CRITICAL" | "ERROR" => Some(LevelFilter::Error),
        "WARNING" | "WARN" => Some(LevelFilter::Warn),
        "INFO" => Some(LevelFilter::Info),
        "DEBUG" => Some(LevelFilter::Debug),
        "TRACE" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Install the global logger
pub fn init_logging(level: &str, log_file: Option<&str>) -> Result<()> {
    let filter = parse_level(level);

    let mut builder = Builder::new();
    builder
        .filter_level(filter.unwrap_or(LevelFilter::Info))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {:<8} | {:<20} | {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if let Some(path) = log_file {
        let file = open_log_file(Path::new(path))?;
        builder.target(Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder
        .try_init()
        .map_err(|e| RunnerError::Logging(e.to_string()))?;

    if filter.is_none() {
        warn!("Invalid log level: {}, defaulting to INFO", level);
    }
    if let Some(path) = log_file {
        info!("Logging to file: {}", path);
    }
    info!("Logging initialized at level: {}", level);
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RunnerError::Logging(format!("cannot open {}: {}", path.display(), e)))
}

/// Copies every record to stderr and the log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(parse_level("INFO"), Some(LevelFilter::Info));
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("Warning"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("CRITICAL"), Some(LevelFilter::Error));
        assert_eq!(parse_level("loud"), None);
    }
}

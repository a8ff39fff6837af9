//! Logging
//!
//! Structured logging with text and JSON formats, console and/or file
//! destinations, and independent levels per destination. Installed once as
//! the global boxed logger at startup.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use log::{Level, LevelFilter};
use serde::Serialize;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Valid options: text, json", s)),
        }
    }
}

/// Where log records go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub console_level: LevelFilter,
    pub file_level: Option<LevelFilter>,
    pub format: LogFormat,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: None,
            format: LogFormat::Text,
            destination: LogDestination::Console,
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    level: String,
    message: &'a str,
}

struct LedgerLogger {
    config: LogConfig,
}

impl LedgerLogger {
    fn format_record(&self, level: Level, message: &str) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        match self.config.format {
            LogFormat::Text => format!("{} [{}] {}", timestamp, level.as_str().to_uppercase(), message),
            LogFormat::Json => {
                let record = JsonRecord {
                    timestamp,
                    level: level.as_str().to_uppercase(),
                    message,
                };
                serde_json::to_string(&record)
                    .unwrap_or_else(|_| format!("{{\"level\":\"{}\"}}", level))
            }
        }
    }

    fn console_enabled(&self, level: Level) -> bool {
        matches!(
            self.config.destination,
            LogDestination::Console | LogDestination::Both(_)
        ) && level <= self.config.console_level
    }

    fn file_enabled(&self, level: Level) -> bool {
        matches!(
            self.config.destination,
            LogDestination::File(_) | LogDestination::Both(_)
        ) && self.config.file_level.is_some_and(|filter| level <= filter)
    }

    fn file_path(&self) -> Option<&PathBuf> {
        match &self.config.destination {
            LogDestination::Console => None,
            LogDestination::File(path) | LogDestination::Both(path) => Some(path),
        }
    }

    fn append_to_file(&self, path: &PathBuf, line: &str) {
        let opened = OpenOptions::new().create(true).append(true).open(path);
        match opened {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    eprintln!("File logging error: {}", e);
                }
            }
            Err(e) => eprintln!("Failed to open log file {}: {}", path.display(), e),
        }
    }
}

impl log::Log for LedgerLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.console_enabled(metadata.level()) || self.file_enabled(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format_record(record.level(), &record.args().to_string());
        if self.console_enabled(record.level()) {
            let _ = writeln!(io::stderr(), "{}", line);
        }
        if self.file_enabled(record.level()) {
            if let Some(path) = self.file_path() {
                self.append_to_file(path, &line);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Install the global logger.
pub fn init_logger(config: LogConfig) -> Result<()> {
    let max_level = match config.file_level {
        Some(file_level) if file_level > config.console_level => file_level,
        _ => config.console_level,
    };
    log::set_boxed_logger(Box::new(LedgerLogger { config }))
        .context("Failed to set global logger")?;
    log::set_max_level(max_level);
    Ok(())
}

/// Parse a level name into a filter.
pub fn parse_log_level(level: &str) -> Result<LevelFilter> {
    match level.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(anyhow::anyhow!(
            "Invalid log level: {}. Valid levels: error, warn, info, debug, trace, off",
            level
        )),
    }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Minimal stderr logger for the agent binaries. Lines are RFC 3339
//! timestamped and level-filtered; there is no file output or rotation.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("{}", format_line(record.level(), record.target(), record.args()));
    }

    fn flush(&self) {}
}

fn format_line(level: Level, target: &str, args: &std::fmt::Arguments<'_>) -> String {
    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("-"));
    format!("{ts} {level:<5} {target} | {args}")
}

/// Install the stderr logger as the global `log` backend.
pub fn init(level: Level) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(StderrLogger {
        level: level.to_level_filter(),
    }))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_level_filtering() {
        let logger = StderrLogger {
            level: LevelFilter::Info,
        };
        let info = Metadata::builder().level(Level::Info).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&info));
        assert!(!logger.enabled(&debug));
    }

    #[test]
    fn test_line_format() {
        let line = format_line(Level::Warn, "watcher", &format_args!("cycle skipped"));
        let re = Regex::new(
            r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z WARN\s+watcher \| cycle skipped$",
        )
        .unwrap();
        assert!(re.is_match(&line), "unexpected line: {line}");
    }
}

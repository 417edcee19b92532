// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Resolves `log_format` / `access_log` / `error_log` directives into
//! structured log descriptors.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use glob_match::glob_match;
use log::debug;
use serde::Serialize;

use crate::nginx_conf::Directive;

/// Marker for the Labeled Tab-separated Values layout; kept literal rather
/// than expanded into a format string.
pub const LTSV_MARKER: &str = "ltsv";

/// The predefined `combined` format, used when a directive names no format.
pub const COMBINED_FORMAT: &str = "$remote_addr - $remote_user [$time_local] \
\"$request\" $status $body_bytes_sent \"$http_referer\" \"$http_user_agent\"";

/// Sinks that are never collectable log files.
const IGNORED_SINKS: &[&str] = &["off", "/dev/null", "/dev/stdout", "/dev/stderr"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessLog {
    pub name: String,
    /// Resolved format string; empty when the named format was never
    /// defined upstream.
    pub format: String,
    pub permissions: String,
    pub readable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorLog {
    pub name: String,
    pub log_level: String,
    pub permissions: String,
    pub readable: bool,
}

/// Accumulates `log_format` definitions for one configuration and resolves
/// log directives against them.
pub struct LogResolver {
    formats: std::collections::HashMap<String, String>,
    exclude_patterns: Vec<String>,
}

impl LogResolver {
    /// `exclude` is the colon-separated exclusion-pattern list from the
    /// agent configuration.
    pub fn new(exclude: &str) -> Self {
        LogResolver {
            formats: std::collections::HashMap::new(),
            exclude_patterns: exclude
                .split(':')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Records a `log_format name part...` definition. The parts are
    /// concatenated; an LTSV layout stays the literal marker.
    pub fn record_format(&mut self, directive: &Directive) {
        let Some(name) = directive.args.first() else {
            return;
        };
        if directive.args.len() < 2 {
            return;
        }
        let format = directive
            .args
            .get(1..)
            .map(|parts| parts.concat())
            .unwrap_or_default();
        self.formats.insert(name.clone(), format);
    }

    /// Resolves an `access_log` directive, or None when the target is an
    /// ignored sink or excluded by configuration.
    pub fn access_log(&self, directive: &Directive) -> Option<AccessLog> {
        let path = directive.args.first()?;
        if self.is_ignored(path) {
            debug!("ignoring access_log target {path}");
            return None;
        }

        let format = match directive.args.get(1) {
            None => COMBINED_FORMAT.to_string(),
            Some(name) => match self.formats.get(name) {
                Some(format) => format.clone(),
                None if name == "combined" => COMBINED_FORMAT.to_string(),
                None if name == LTSV_MARKER => LTSV_MARKER.to_string(),
                // A named format that was never defined: left blank.
                None => String::new(),
            },
        };

        let (permissions, readable) = stat_file(path);
        Some(AccessLog {
            name: path.clone(),
            format,
            permissions,
            readable,
        })
    }

    /// Resolves an `error_log` directive: the target path and the optional
    /// level argument.
    pub fn error_log(&self, directive: &Directive) -> Option<ErrorLog> {
        let path = directive.args.first()?;
        if self.is_ignored(path) {
            debug!("ignoring error_log target {path}");
            return None;
        }
        let (permissions, readable) = stat_file(path);
        Some(ErrorLog {
            name: path.clone(),
            log_level: directive.args.get(1).cloned().unwrap_or_default(),
            permissions,
            readable,
        })
    }

    fn is_ignored(&self, path: &str) -> bool {
        if IGNORED_SINKS.contains(&path) || path.starts_with("syslog:") {
            return true;
        }
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern == path || glob_match(pattern, path))
    }
}

/// Octal permission bits and a readability flag for a log target. A failed
/// stat leaves readability false and permissions empty; it never aborts the
/// parse.
fn stat_file(path: &str) -> (String, bool) {
    match fs::metadata(path) {
        Ok(metadata) => {
            let mode = metadata.permissions().mode() & 0o777;
            (format!("{mode:o}"), true)
        }
        Err(_) => (String::new(), false),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn directive(name: &str, args: &[&str]) -> Directive {
        Directive {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_default_format_is_combined() {
        let resolver = LogResolver::new("");
        let log = resolver
            .access_log(&directive("access_log", &["/var/log/nginx/access.log"]))
            .unwrap();
        assert_eq!(log.format, COMBINED_FORMAT);
        assert_eq!(log.name, "/var/log/nginx/access.log");
    }

    #[test]
    fn test_combined_name_resolves_to_predefined() {
        let resolver = LogResolver::new("");
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "combined"]))
            .unwrap();
        assert_eq!(log.format, COMBINED_FORMAT);
    }

    #[test]
    fn test_ltsv_marker_kept_literal() {
        let resolver = LogResolver::new("");
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "ltsv"]))
            .unwrap();
        assert_eq!(log.format, LTSV_MARKER);
    }

    #[test]
    fn test_undefined_named_format_is_blank() {
        let resolver = LogResolver::new("");
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "nosuch"]))
            .unwrap();
        assert_eq!(log.format, "");
    }

    #[test]
    fn test_custom_format_definition_wins() {
        let mut resolver = LogResolver::new("");
        resolver.record_format(&directive(
            "log_format",
            &["main", "$remote_addr ", "$status"],
        ));
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "main"]))
            .unwrap();
        assert_eq!(log.format, "$remote_addr $status");
    }

    #[test]
    fn test_custom_definition_overrides_combined() {
        let mut resolver = LogResolver::new("");
        resolver.record_format(&directive("log_format", &["combined", "$custom"]));
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "combined"]))
            .unwrap();
        assert_eq!(log.format, "$custom");
    }

    #[test]
    fn test_ignored_sinks() {
        let resolver = LogResolver::new("");
        for sink in ["off", "/dev/null", "/dev/stdout", "/dev/stderr", "syslog:server=unix:/run/log"] {
            assert!(
                resolver.access_log(&directive("access_log", &[sink])).is_none(),
                "{sink} should be ignored"
            );
        }
    }

    #[test]
    fn test_exclusion_patterns() {
        let resolver = LogResolver::new("/var/log/private/*:/tmp/skip.log");
        assert!(resolver
            .access_log(&directive("access_log", &["/var/log/private/x.log"]))
            .is_none());
        assert!(resolver
            .access_log(&directive("access_log", &["/tmp/skip.log"]))
            .is_none());
        assert!(resolver
            .access_log(&directive("access_log", &["/var/log/nginx/ok.log"]))
            .is_some());
    }

    #[test]
    fn test_error_log_level_and_missing_stat() {
        let resolver = LogResolver::new("");
        let log = resolver
            .error_log(&directive("error_log", &["/nonexistent/error.log", "warn"]))
            .unwrap();
        assert_eq!(log.log_level, "warn");
        assert!(!log.readable);
        assert_eq!(log.permissions, "");
    }

    #[test]
    fn test_stat_captures_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let resolver = LogResolver::new("");
        let log = resolver
            .access_log(&directive(
                "access_log",
                &[path.to_str().unwrap()],
            ))
            .unwrap();
        assert!(log.readable);
        assert_eq!(log.permissions, "640");
    }

    #[test]
    fn test_log_format_requires_name_and_parts() {
        let mut resolver = LogResolver::new("");
        resolver.record_format(&directive("log_format", &["lonely"]));
        let log = resolver
            .access_log(&directive("access_log", &["/tmp/a.log", "lonely"]))
            .unwrap();
        assert_eq!(log.format, "");
    }
}

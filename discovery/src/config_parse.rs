// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-instance configuration parsing: walks the directive tree once for
//! log formats, once for the remaining directives, then runs endpoint
//! discovery. Produces the Config Context reported upstream.

use std::path::Path;

use log::warn;
use serde::Serialize;

use crate::config::AgentConfig;
use crate::endpoints::{self, EndpointProber};
use crate::instance::Instance;
use crate::logs::{AccessLog, ErrorLog, LogResolver};
use crate::nginx_conf::{self, ParseError, crawl};

/// Structured summary of one instance's live configuration. At most one is
/// cached per instance identity; a re-parse replaces the entry wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigContext {
    pub instance_id: String,
    pub access_logs: Vec<AccessLog>,
    pub error_logs: Vec<ErrorLog>,
    pub stub_status: Option<String>,
    pub plus_api: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssl_certificates: Vec<String>,
    /// The root config file plus every include actually read.
    pub files: Vec<String>,
}

impl ConfigContext {
    /// Every resolved log target, for the instance's runtime summary.
    pub fn log_paths(&self) -> Vec<String> {
        self.access_logs
            .iter()
            .map(|l| l.name.clone())
            .chain(self.error_logs.iter().map(|l| l.name.clone()))
            .collect()
    }

    pub fn endpoint_urls(&self) -> Vec<String> {
        self.stub_status
            .iter()
            .chain(self.plus_api.iter())
            .cloned()
            .collect()
    }
}

/// Parses one instance's configuration file. A config path outside the
/// allowed directories or a malformed file aborts this parse; everything
/// else degrades per-directive.
pub fn parse_config(
    instance: &Instance,
    config: &AgentConfig,
    prober: &dyn EndpointProber,
) -> Result<ConfigContext, ParseError> {
    let parsed = nginx_conf::parse_file(
        Path::new(&instance.config_path),
        &config.allowed_directories,
    )?;

    // Formats first: access_log resolution needs the complete table, and
    // nginx does not require the definition to precede use across includes.
    let mut resolver = LogResolver::new(&config.exclude_logs);
    crawl(&parsed.directives, &mut |_, directive| {
        if directive.name == "log_format" {
            resolver.record_format(directive);
        }
    });

    let mut access_logs: Vec<AccessLog> = Vec::new();
    let mut error_logs: Vec<ErrorLog> = Vec::new();
    let mut ssl_certificates: Vec<String> = Vec::new();
    crawl(&parsed.directives, &mut |_, directive| {
        match directive.name.as_str() {
            "access_log" => {
                if let Some(log) = resolver.access_log(directive) {
                    access_logs.push(log);
                }
            }
            "error_log" => {
                if let Some(log) = resolver.error_log(directive) {
                    error_logs.push(log);
                }
            }
            "ssl_certificate" => {
                for arg in &directive.args {
                    if arg.contains('$') {
                        // Variables can only be expanded by a running nginx.
                        warn!("skipping ssl_certificate with unexpandable variable: {arg}");
                    } else if !ssl_certificates.contains(arg) {
                        ssl_certificates.push(arg.clone());
                    }
                }
            }
            _ => {}
        }
    });

    let discovered = endpoints::discover(&parsed.directives, prober);

    Ok(ConfigContext {
        instance_id: instance.id.clone(),
        access_logs,
        error_logs,
        stub_status: discovered.stub_status,
        plus_api: discovered.plus_api,
        ssl_certificates,
        files: parsed.files,
    })
}

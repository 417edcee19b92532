// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Agent configuration: read-only settings consumed by the watcher and the
//! config parser. Loaded from a YAML file; every field has a default so a
//! missing file just means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "/etc/nginx-discovery/agent.yaml";
const CONFIG_PATH_ENV: &str = "NGINX_DISCOVERY_CONFIG";

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_allowed_directories() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc/nginx"),
        PathBuf::from("/usr/local/etc/nginx"),
        PathBuf::from("/usr/local/nginx"),
        PathBuf::from("/usr/share/nginx"),
    ]
}

fn default_app_protect_version_file() -> PathBuf {
    PathBuf::from("/opt/app_protect/VERSION")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Directories the config parser may read from; config and include
    /// paths outside them are skipped or rejected.
    #[serde(default = "default_allowed_directories")]
    pub allowed_directories: Vec<PathBuf>,

    /// Colon-separated glob patterns for log paths to ignore.
    #[serde(default)]
    pub exclude_logs: String,

    /// Timeout applied uniformly to the nginx binary invocation and the
    /// endpoint probes.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_app_protect_version_file")]
    pub app_protect_version_file: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            poll_interval_secs: default_poll_interval_secs(),
            allowed_directories: default_allowed_directories(),
            exclude_logs: String::new(),
            probe_timeout_secs: default_probe_timeout_secs(),
            app_protect_version_file: default_app_protect_version_file(),
            log_level: default_log_level(),
        }
    }
}

impl AgentConfig {
    /// Loads the configuration file. Resolution order: explicit path, the
    /// `NGINX_DISCOVERY_CONFIG` environment variable, the default path. A
    /// missing file yields defaults with a warning; a malformed file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        if !path.exists() {
            warn!(
                "config file not found at {}, using defaults",
                path.display()
            );
            return Ok(AgentConfig::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(allowed_dir: &Path) -> Self {
        AgentConfig {
            allowed_directories: vec![allowed_dir.to_path_buf()],
            ..AgentConfig::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::load(Some(&dir.path().join("missing.yaml"))).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.log_level, "info");
        assert!(!config.allowed_directories.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(
            &path,
            r#"
poll_interval_secs: 10
allowed_directories:
  - /etc/nginx
  - /srv/nginx
exclude_logs: "/var/log/private/*:/tmp/skip.log"
probe_timeout_secs: 2
app_protect_version_file: /opt/nap/VERSION
log_level: debug
"#,
        )
        .unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.allowed_directories.len(), 2);
        assert_eq!(config.exclude_logs, "/var/log/private/*:/tmp/skip.log");
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
        assert_eq!(
            config.app_protect_version_file,
            PathBuf::from("/opt/nap/VERSION")
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "poll_interval_secs: 5\n").unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.probe_timeout_secs, 5);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "poll_interval_secs: [not an int\n").unwrap();
        assert!(AgentConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_intervals_never_zero() {
        let config = AgentConfig {
            poll_interval_secs: 0,
            probe_timeout_secs: 0,
            ..AgentConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.probe_timeout(), Duration::from_secs(1));
    }
}

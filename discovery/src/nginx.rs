// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Extracts version, install prefix, config path, and module inventory from
//! a running NGINX binary via its `-V` introspection flag.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use log::debug;
use regex::Regex;
use thiserror::Error;

use crate::exec::{CommandRunner, ExecError};

const DEFAULT_PREFIX: &str = "/usr/local/nginx";
const DELETED_SUFFIX: &str = " (deleted)";

// "nginx version: nginx/1.25.3 (nginx-plus-r31-p1)"
const PLUS_VERSION_PATTERN: &str = r"^nginx version: \S+/(\S+) \((nginx-plus[^)]*)\)";
// "nginx version: nginx/1.25.3"
const OSS_VERSION_PATTERN: &str = r"^nginx version: \S+/(\S+)";

fn plus_version_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLUS_VERSION_PATTERN).ok()).as_ref()
}

fn oss_version_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OSS_VERSION_PATTERN).ok()).as_ref()
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no nginx executable could be resolved")]
    NoExecutable,
    #[error("version command failed: {0}")]
    VersionCommand(#[from] ExecError),
    #[error("no version line in output of {exe} -V")]
    VersionMissing { exe: String },
}

/// Parsed `nginx -V` introspection result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NginxInfo {
    pub exe_path: String,
    pub version: String,
    /// Set when the binary identifies as NGINX Plus.
    pub plus: bool,
    pub prefix: String,
    pub conf_path: String,
    pub configure_args: HashMap<String, String>,
    pub loadable_modules: Vec<String>,
    pub builtin_modules: Vec<String>,
}

/// Resolves the binary for a correlated group and runs `-V` through the
/// command runner capability.
pub fn extract(
    exe_hint: &str,
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> Result<NginxInfo, ExtractError> {
    let exe_path = resolve_executable(exe_hint, runner, timeout).ok_or(ExtractError::NoExecutable)?;
    let output = runner.output(&exe_path, &["-V"], timeout)?;
    parse_version_output(exe_path, &output)
}

/// The recorded exe path wins when present; a binary replaced on disk after
/// the process started leaves a " (deleted)" suffix on the symlink target,
/// which is stripped. Fallbacks: a `command -v` shell lookup, then a PATH
/// directory scan.
fn resolve_executable(
    exe_hint: &str,
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> Option<String> {
    if !exe_hint.is_empty() {
        return Some(
            exe_hint
                .strip_suffix(DELETED_SUFFIX)
                .unwrap_or(exe_hint)
                .to_string(),
        );
    }

    if let Ok(output) = runner.output("sh", &["-c", "command -v nginx"], timeout) {
        let path = output.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join("nginx"))
        .find(|candidate| candidate.is_file())
        .and_then(|p| p.to_str().map(str::to_string))
}

fn parse_version_output(exe_path: String, output: &str) -> Result<NginxInfo, ExtractError> {
    let mut version = String::new();
    let mut plus = false;
    let mut configure_args: HashMap<String, String> = HashMap::new();

    for line in output.lines() {
        if line.starts_with("nginx version") {
            // The Plus pattern is stricter, so it takes precedence.
            if let Some(caps) = plus_version_re().and_then(|re| re.captures(line)) {
                version = caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                plus = true;
            } else if let Some(caps) = oss_version_re().and_then(|re| re.captures(line)) {
                version = caps
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
            }
        } else if let Some(rest) = line.strip_prefix("configure arguments:") {
            configure_args = parse_configure_args(rest);
        }
    }

    if version.is_empty() {
        return Err(ExtractError::VersionMissing { exe: exe_path });
    }

    let prefix = configure_args
        .get("prefix")
        .cloned()
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    let conf_path = configure_args
        .get("conf-path")
        .cloned()
        .unwrap_or_else(|| format!("{prefix}/conf/nginx.conf"));
    let loadable_modules = configure_args
        .get("modules-path")
        .map(|dir| loadable_modules(Path::new(dir)))
        .unwrap_or_default();
    let builtin_modules = builtin_modules(&configure_args);

    Ok(NginxInfo {
        exe_path,
        version,
        plus,
        prefix,
        conf_path,
        configure_args,
        loadable_modules,
        builtin_modules,
    })
}

/// Flags are separated by " --"; a flag without '=' is a boolean, with '='
/// a key/value pair.
fn parse_configure_args(rest: &str) -> HashMap<String, String> {
    rest.split(" --")
        .map(str::trim)
        .filter(|flag| !flag.is_empty())
        .map(|flag| match flag.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (flag.to_string(), "true".to_string()),
        })
        .collect()
}

/// Every `.so` in the modules directory, suffix stripped, sorted. A missing
/// or unreadable directory is an empty list, not an error.
fn loadable_modules(modules_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(modules_dir) else {
        debug!("modules path {} is not readable", modules_dir.display());
        return Vec::new();
    };
    let mut modules: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "so"))
        .filter_map(|path: PathBuf| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();
    modules.sort();
    modules
}

/// Compiled-in modules come from configure keys of the form
/// `with-<name>_module`, prefix and suffix stripped, sorted.
fn builtin_modules(configure_args: &HashMap<String, String>) -> Vec<String> {
    let mut modules: Vec<String> = configure_args
        .keys()
        .filter_map(|key| key.strip_prefix("with-"))
        .filter_map(|key| key.strip_suffix("_module"))
        .map(str::to_string)
        .collect();
    modules.sort();
    modules
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Raw OS process snapshots. The watcher never keeps these across cycles; a
//! fresh list is read from procfs on every tick.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Serialize;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Root of the proc filesystem, overridable for containerized deployments
/// where the host's /proc is bind-mounted elsewhere.
pub fn proc_root() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }
        "/proc".into()
    })
}

/// One observed OS process. `cmdline` is the NUL-separated kernel form
/// re-joined with single spaces; `exe` is empty when the symlink is
/// unreadable (insufficient permissions, kernel threads).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Process {
    pub pid: i32,
    pub ppid: i32,
    pub name: String,
    pub cmdline: String,
    pub exe: String,
}

/// Capability trait supplying the flat process list. The watcher takes this
/// at construction so tests can substitute a canned snapshot.
pub trait ProcessLister: Send + Sync {
    fn list(&self) -> std::io::Result<Vec<Process>>;
}

/// Reads the process table from procfs.
pub struct ProcfsLister;

impl ProcessLister for ProcfsLister {
    fn list(&self) -> std::io::Result<Vec<Process>> {
        let mut processes = Vec::new();
        for entry in fs::read_dir(proc_root())? {
            let Ok(entry) = entry else {
                continue;
            };
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i32>().ok())
            else {
                continue;
            };
            // Processes can exit between the readdir and the per-pid reads;
            // a vanished pid is skipped, never an error.
            if let Some(process) = read_process(pid) {
                processes.push(process);
            }
        }
        Ok(processes)
    }
}

fn read_process(pid: i32) -> Option<Process> {
    let dir = proc_root().join(pid.to_string());

    let name = fs::read_to_string(dir.join("comm"))
        .ok()?
        .trim_end()
        .to_string();

    let raw_cmdline = fs::read_to_string(dir.join("cmdline")).ok()?;
    let cmdline = normalize_cmdline(&raw_cmdline);

    let stat = fs::read_to_string(dir.join("stat")).ok()?;
    let ppid = parse_stat_ppid(&stat)?;

    let exe = fs::read_link(dir.join("exe"))
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_default();

    Some(Process {
        pid,
        ppid,
        name,
        cmdline,
        exe,
    })
}

/// /proc/<pid>/cmdline separates arguments with NUL bytes and may carry
/// trailing NULs when the process rewrote its own command line (the NGINX
/// master does exactly this for its "nginx: master process ..." title).
fn normalize_cmdline(raw: &str) -> String {
    raw.trim_end_matches('\0')
        .split('\0')
        .collect::<Vec<_>>()
        .join(" ")
}

/// The ppid is the fourth stat field, but the second field (comm) may itself
/// contain spaces and parentheses, so scan from the last ')'.
fn parse_stat_ppid(stat: &str) -> Option<i32> {
    let (_, after_comm) = stat.rsplit_once(')')?;
    let mut fields = after_comm.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}
